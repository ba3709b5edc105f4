//! Batched n-bit GEMM entry points.
//!
//! A call moves through a fixed sequence: align the workspace, run the
//! variant's workspace initializer to completion, then dispatch compute over
//! the batch. Without a thread pool every instance is computed as one tile;
//! with a pool the partitioner splits the batch into disjoint output tiles
//! that run in parallel.
//!
//! `run_batch` treats an unsupported shape or missing kernels as a programming
//! error and panics. `try_run_batch` checks everything up front and returns a
//! [`GemmError`] instead.

use rayon::prelude::*;
use rayon::ThreadPool;

use crate::compute::{operations, ComputeArgs, GemmInstance};
use crate::config::GemmConfig;
use crate::error::{GemmError, GemmResult};
use crate::kernels::{platform_kernels, QNBitKernels};
use crate::layout::BlockLayout;
use crate::partition::{Tile, TilePlan};
use crate::variant::{ProblemShape, Variant};
use crate::views::{DataParams, OutputView};
use crate::workspace::{
    align_workspace, batch_workspace_size, per_gemm_workspace_alignment, per_gemm_workspace_size,
    per_gemm_workspace_stride,
};

#[derive(Debug, Clone, Copy)]
pub struct QNBitGemmDispatcher<'k> {
    kernels: Option<&'k QNBitKernels>,
    config: GemmConfig,
}

impl Default for QNBitGemmDispatcher<'static> {
    fn default() -> Self {
        Self::new()
    }
}

impl QNBitGemmDispatcher<'static> {
    /// Dispatcher over the process-wide kernel table with default tunables.
    pub fn new() -> Self {
        Self { kernels: platform_kernels(), config: GemmConfig::default() }
    }

    /// Like [`Self::new`], with tunables read from `QNBIT_GEMM_*` variables.
    pub fn from_env() -> GemmResult<Self> {
        Ok(Self { kernels: platform_kernels(), config: GemmConfig::from_env()? })
    }
}

impl<'k> QNBitGemmDispatcher<'k> {
    /// Dispatcher over an explicit kernel table; `None` means no backend.
    pub fn with_kernels(kernels: Option<&'k QNBitKernels>) -> Self {
        Self { kernels, config: GemmConfig::default() }
    }

    pub fn with_config(mut self, config: GemmConfig) -> Self {
        self.config = config;
        self
    }

    #[inline]
    pub fn kernels(&self) -> Option<&'k QNBitKernels> {
        self.kernels
    }

    #[inline]
    pub fn config(&self) -> &GemmConfig {
        &self.config
    }

    /// Whether `shape` maps to a variant whose kernels the backend provides.
    pub fn is_available(&self, shape: &ProblemShape) -> bool {
        match (shape.variant(), self.kernels) {
            (Some(variant), Some(kernels)) => kernels.supports(variant),
            _ => false,
        }
    }

    /// Workspace bytes for a batch of `batch_n` instances; 0 means none is needed.
    #[inline]
    pub fn batch_workspace_size(&self, shape: &ProblemShape, batch_n: usize) -> usize {
        batch_workspace_size(shape, batch_n)
    }

    /// Compute `C = A * B` for every instance in `params`.
    ///
    /// `workspace` must hold at least [`Self::batch_workspace_size`] bytes when
    /// that size is non-zero. Blocks until every tile is written.
    ///
    /// # Panics
    /// If the shape is unsupported, the backend lacks a required kernel, the
    /// config has a zero tunable, or a needed workspace is missing or too small.
    pub fn run_batch(
        &self,
        shape: &ProblemShape,
        params: &mut [DataParams<'_>],
        workspace: Option<&mut [u8]>,
        pool: Option<&ThreadPool>,
    ) {
        let Some(variant) = shape.variant() else {
            panic!("unsupported n-bit gemm configuration: {shape:?}");
        };
        let kernels = match self.kernels {
            Some(kernels) if kernels.supports(variant) => kernels,
            _ => panic!("no kernels available for {}", variant.name()),
        };
        if let Err(err) = self.config.validate() {
            panic!("{err}");
        }
        let batch_n = params.len();
        log::debug!(
            "qnbit gemm {}: m={} n={} k={} blk_len={} batch={}",
            variant.name(),
            shape.m,
            shape.n,
            shape.k,
            shape.blk_len,
            batch_n
        );

        let per_gemm_size = per_gemm_workspace_size(shape);
        let stride = per_gemm_workspace_stride(shape);
        let workspace: &mut [u8] = match workspace {
            Some(ws) => align_workspace(ws, per_gemm_workspace_alignment(variant)),
            None => &mut [],
        };

        let ops = operations(variant);
        if let Some(initialize) = ops.initialize_workspace {
            assert!(
                stride == 0 || workspace.len() >= batch_n * stride,
                "{} needs {} workspace bytes after alignment, got {}",
                variant.name(),
                batch_n * stride,
                workspace.len()
            );
            initialize(shape, kernels, params, workspace, stride, pool);
        }

        let workspace: &[u8] = workspace;
        let instances: Vec<GemmInstance<'_>> = params
            .iter_mut()
            .enumerate()
            .map(|(i, p)| GemmInstance {
                a: p.a,
                lda: p.lda,
                b: p.b,
                workspace: if per_gemm_size == 0 {
                    &[]
                } else {
                    &workspace[i * stride..i * stride + per_gemm_size]
                },
                output: OutputView::new(p.c, p.ldc),
            })
            .collect();

        let args = ComputeArgs {
            layout: BlockLayout::new(shape.blk_bit_width, shape.blk_len, shape.k),
            kernels,
            config: &self.config,
        };
        let compute = ops.compute;

        match pool {
            None => {
                for (i, instance) in instances.iter().enumerate() {
                    let tile = Tile::full(i, shape.m, shape.n);
                    // SAFETY: the tile spans this instance's whole output and
                    // nothing else writes it.
                    let c = unsafe { instance.output.tile(0, shape.m, 0, shape.n) };
                    compute(&args, instance, &tile, c);
                }
            }
            Some(pool) => {
                let plan = TilePlan::new(
                    shape.m,
                    shape.n,
                    shape.k,
                    batch_n,
                    pool.current_num_threads(),
                    &self.config,
                );
                log::debug!(
                    "qnbit gemm plan: {} units, stride_m={} stride_n={} ({}x{} per gemm)",
                    plan.total_units(),
                    plan.stride_m,
                    plan.stride_n,
                    plan.thread_count_m,
                    plan.thread_count_n
                );
                pool.install(|| {
                    (0..plan.total_units()).into_par_iter().for_each(|tid| {
                        let tile = plan.tile(tid);
                        let instance = &instances[tile.gemm_index];
                        // SAFETY: plan tiles of one instance are pairwise disjoint.
                        let c = unsafe {
                            instance.output.tile(
                                tile.start_m,
                                tile.count_m,
                                tile.start_n,
                                tile.count_n,
                            )
                        };
                        compute(&args, instance, &tile, c);
                    });
                });
            }
        }
    }

    /// Checked variant of [`Self::run_batch`].
    pub fn try_run_batch(
        &self,
        shape: &ProblemShape,
        params: &mut [DataParams<'_>],
        workspace: Option<&mut [u8]>,
        pool: Option<&ThreadPool>,
    ) -> GemmResult<()> {
        self.config.validate()?;
        let variant = shape.variant().ok_or(GemmError::UnsupportedConfiguration {
            bit_width: shape.blk_bit_width,
            blk_len: shape.blk_len,
            compute_type: shape.compute_type.name(),
            m: shape.m,
        })?;
        if !self.kernels.is_some_and(|k| k.supports(variant)) {
            return Err(GemmError::KernelUnavailable(variant.name()));
        }
        for p in params.iter() {
            p.validate(shape)?;
        }
        let workspace = check_workspace(shape, variant, params.len(), workspace)?;
        self.run_batch(shape, params, workspace, pool);
        Ok(())
    }
}

fn check_workspace<'w>(
    shape: &ProblemShape,
    variant: Variant,
    batch_n: usize,
    workspace: Option<&'w mut [u8]>,
) -> GemmResult<Option<&'w mut [u8]>> {
    let required = batch_workspace_size(shape, batch_n);
    if required == 0 {
        return Ok(workspace);
    }
    let Some(ws) = workspace else {
        return Err(GemmError::MissingWorkspace(variant.name()));
    };
    let offset = ws.as_ptr().align_offset(per_gemm_workspace_alignment(variant));
    let needed = batch_n * per_gemm_workspace_stride(shape);
    if offset > ws.len() || ws.len() - offset < needed {
        return Err(GemmError::WorkspaceTooSmall { required, actual: ws.len() });
    }
    Ok(Some(ws))
}

// =============================================================================
// Convenience wrappers over the platform kernels
// =============================================================================

/// [`QNBitGemmDispatcher::is_available`] on the platform kernels.
pub fn is_available(shape: &ProblemShape) -> bool {
    QNBitGemmDispatcher::new().is_available(shape)
}

/// [`QNBitGemmDispatcher::run_batch`] on the platform kernels.
pub fn run_batch(
    shape: &ProblemShape,
    params: &mut [DataParams<'_>],
    workspace: Option<&mut [u8]>,
    pool: Option<&ThreadPool>,
) {
    QNBitGemmDispatcher::new().run_batch(shape, params, workspace, pool)
}

/// [`QNBitGemmDispatcher::try_run_batch`] on the platform kernels.
pub fn try_run_batch(
    shape: &ProblemShape,
    params: &mut [DataParams<'_>],
    workspace: Option<&mut [u8]>,
    pool: Option<&ThreadPool>,
) -> GemmResult<()> {
    QNBitGemmDispatcher::new().try_run_batch(shape, params, workspace, pool)
}
