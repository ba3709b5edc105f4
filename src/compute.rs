//! Per-variant compute routines and the operation table that indexes them.
//!
//! A routine receives one tile of one instance and turns it into kernel calls:
//! the single-row kernel when the tile is one row tall, otherwise a
//! dequantize-into-scratch pass followed by the dense kernel.

use std::cell::RefCell;

use rayon::ThreadPool;

use crate::config::GemmConfig;
use crate::kernels::QNBitKernels;
use crate::layout::BlockLayout;
use crate::partition::Tile;
use crate::variant::{ProblemShape, Variant};
use crate::views::{DataParams, OutputView, QuantBView, TileMut};
use crate::workspace::initialize_workspace_int8;

/// Read-only inputs of one instance, shareable across worker threads.
pub(crate) struct GemmInstance<'a> {
    pub a: &'a [f32],
    pub lda: usize,
    pub b: QuantBView<'a>,
    /// This instance's already-initialized workspace region (empty if unused).
    pub workspace: &'a [u8],
    pub output: OutputView,
}

/// Call-wide state handed to every compute invocation.
pub(crate) struct ComputeArgs<'a> {
    pub layout: BlockLayout,
    pub kernels: &'a QNBitKernels,
    pub config: &'a GemmConfig,
}

pub(crate) type InitializeWorkspaceFn = fn(
    shape: &ProblemShape,
    kernels: &QNBitKernels,
    params: &[DataParams<'_>],
    workspace: &mut [u8],
    stride: usize,
    pool: Option<&ThreadPool>,
);

pub(crate) type ComputeFn =
    fn(args: &ComputeArgs<'_>, instance: &GemmInstance<'_>, tile: &Tile, c: TileMut<'_>);

pub(crate) struct Operations {
    pub initialize_workspace: Option<InitializeWorkspaceFn>,
    pub compute: ComputeFn,
}

static OPERATIONS: [Operations; Variant::COUNT] = [
    Operations { initialize_workspace: None, compute: compute_fp32 },
    Operations { initialize_workspace: Some(initialize_workspace_int8), compute: compute_int8 },
];

#[inline]
pub(crate) fn operations(variant: Variant) -> &'static Operations {
    &OPERATIONS[variant.index()]
}

thread_local! {
    static DEQUANT_B: RefCell<Vec<f32>> = const { RefCell::new(Vec::new()) };
}

// ---------------------------------------------------------------------------
// BitWidth4CompFp32
// ---------------------------------------------------------------------------

fn compute_fp32(
    args: &ComputeArgs<'_>,
    instance: &GemmInstance<'_>,
    tile: &Tile,
    mut c: TileMut<'_>,
) {
    let (Some(m1_kernel), Some(dequant_b)) =
        (args.kernels.m1_kernel_fp32, args.kernels.dequant_b_for_sgemm_fp32)
    else {
        panic!("{} kernels cannot run {}", args.kernels.name, Variant::BitWidth4CompFp32.name());
    };
    let layout = &args.layout;
    let k = layout.k;
    if tile.count_m == 0 || tile.count_n == 0 {
        return;
    }
    if k == 0 {
        zero_fill(&mut c);
        return;
    }

    if tile.count_m == 1 {
        let a_row = &instance.a[tile.start_m * instance.lda..][..k];
        let c_row = c.row_mut(0);
        let stride_n = args.config.m1_stride_n;
        for n in (0..tile.count_n).step_by(stride_n) {
            let count_n = stride_n.min(tile.count_n - n);
            let b = instance.b.columns(layout, tile.start_n + n, count_n);
            m1_kernel(layout, a_row, b, &mut c_row[n..n + count_n]);
        }
        return;
    }

    let stride_n = args.config.dequant_stride_n;
    let buffer_len = layout.padded_k() * stride_n;
    DEQUANT_B.with(|cell| {
        let mut buffer = cell.borrow_mut();
        if buffer.len() < buffer_len {
            buffer.resize(buffer_len, 0.0);
        }
        for n in (0..tile.count_n).step_by(stride_n) {
            let count_n = stride_n.min(tile.count_n - n);
            let b = instance.b.columns(layout, tile.start_n + n, count_n);
            let dense_b = &mut buffer[..layout.padded_k() * count_n];
            dequant_b(layout, dense_b, b, count_n);

            let mut c_blk = c.columns(n, count_n);
            let mut a = &instance.a[tile.start_m * instance.lda..];
            loop {
                let rows =
                    (args.kernels.sgemm_kernel)(a, instance.lda, dense_b, &mut c_blk, k, 1.0);
                assert!(rows > 0, "sgemm kernel made no progress");
                c_blk.advance_rows(rows);
                if c_blk.rows() == 0 {
                    break;
                }
                a = &a[rows * instance.lda..];
            }
        }
    });
}

// ---------------------------------------------------------------------------
// BitWidth4CompInt8
// ---------------------------------------------------------------------------

fn compute_int8(
    args: &ComputeArgs<'_>,
    instance: &GemmInstance<'_>,
    tile: &Tile,
    mut c: TileMut<'_>,
) {
    let Some(m1_kernel) = args.kernels.m1_kernel_int8 else {
        panic!("{} kernels cannot run {}", args.kernels.name, Variant::BitWidth4CompInt8.name());
    };
    let layout = &args.layout;
    if tile.count_m == 0 || tile.count_n == 0 {
        return;
    }
    assert!(
        tile.count_m == 1,
        "{} supports a single row per tile, got {}",
        Variant::BitWidth4CompInt8.name(),
        tile.count_m
    );
    if layout.k == 0 {
        zero_fill(&mut c);
        return;
    }

    let row_bytes = layout.quant_a_row_bytes();
    let quant_a_row = &instance.workspace[tile.start_m * row_bytes..][..row_bytes];
    let c_row = c.row_mut(0);
    let stride_n = args.config.m1_stride_n;
    for n in (0..tile.count_n).step_by(stride_n) {
        let count_n = stride_n.min(tile.count_n - n);
        let b = instance.b.columns(layout, tile.start_n + n, count_n);
        m1_kernel(layout, quant_a_row, b, &mut c_row[n..n + count_n]);
    }
}

/// With K == 0 the product is all zeros.
fn zero_fill(c: &mut TileMut<'_>) {
    for r in 0..c.rows() {
        c.row_mut(r).fill(0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quantization::{quantize_b_blockwise, reference_matmul};

    #[allow(clippy::too_many_arguments)]
    fn run_tile(
        variant: Variant,
        layout: BlockLayout,
        a: &[f32],
        b: QuantBView<'_>,
        workspace: &[u8],
        c: &mut [f32],
        tile: Tile,
        n: usize,
    ) {
        let config = GemmConfig::default();
        let args = ComputeArgs { layout, kernels: &QNBitKernels::SCALAR, config: &config };
        let instance =
            GemmInstance { a, lda: layout.k, b, workspace, output: OutputView::new(c, n) };
        let out = unsafe {
            instance.output.tile(tile.start_m, tile.count_m, tile.start_n, tile.count_n)
        };
        (operations(variant).compute)(&args, &instance, &tile, out);
    }

    #[test]
    fn table_matches_variants() {
        assert!(operations(Variant::BitWidth4CompFp32).initialize_workspace.is_none());
        assert!(operations(Variant::BitWidth4CompInt8).initialize_workspace.is_some());
    }

    #[test]
    fn fp32_dense_path_matches_reference() {
        let (m, n, k) = (6, 40, 72);
        let layout = BlockLayout::new(4, 32, k);
        let weights: Vec<f32> =
            (0..k * n).map(|i| ((i * 13 % 29) as f32 - 14.0) * 0.03).collect();
        let qb = quantize_b_blockwise(&weights, n, k, 32, true).unwrap();
        let a: Vec<f32> = (0..m * k).map(|i| ((i * 7 % 11) as f32 - 5.0) * 0.1).collect();
        let expected = reference_matmul(&a, &qb.dequantize(), m, n, k);

        let mut c = vec![f32::NAN; m * n];
        let tile = Tile::full(0, m, n);
        run_tile(Variant::BitWidth4CompFp32, layout, &a, qb.view(), &[], &mut c, tile, n);
        for (x, y) in c.iter().zip(&expected) {
            assert!((x - y).abs() < 1e-4, "{x} vs {y}");
        }
    }

    #[test]
    fn fp32_tile_writes_only_its_rectangle() {
        let (m, n, k) = (5, 48, 32);
        let layout = BlockLayout::new(4, 16, k);
        let weights: Vec<f32> = (0..k * n).map(|i| (i % 5) as f32 - 2.0).collect();
        let qb = quantize_b_blockwise(&weights, n, k, 16, false).unwrap();
        let a = vec![0.5f32; m * k];
        let mut c = vec![f32::NAN; m * n];
        let tile = Tile { gemm_index: 0, start_m: 1, count_m: 3, start_n: 16, count_n: 20 };
        run_tile(Variant::BitWidth4CompFp32, layout, &a, qb.view(), &[], &mut c, tile, n);
        for r in 0..m {
            for col in 0..n {
                let inside = (1..4).contains(&r) && (16..36).contains(&col);
                assert_eq!(c[r * n + col].is_nan(), !inside, "row {r} col {col}");
            }
        }
    }

    #[test]
    fn k_zero_yields_zeros() {
        let layout = BlockLayout::new(4, 32, 0);
        let mut c = vec![3.0f32; 6];
        let view = QuantBView::new(&[], &[], None);
        let tile = Tile::full(0, 2, 3);
        run_tile(Variant::BitWidth4CompFp32, layout, &[], view, &[], &mut c, tile, 3);
        assert!(c.iter().all(|&v| v == 0.0));
    }

    #[test]
    #[should_panic(expected = "single row")]
    fn int8_rejects_multi_row_tile() {
        let layout = BlockLayout::new(4, 32, 32);
        let qb = quantize_b_blockwise(&[0.0; 64], 2, 32, 32, false).unwrap();
        let a = vec![0.0f32; 64];
        let workspace = vec![0u8; 2 * layout.quant_a_row_bytes()];
        let mut c = vec![0.0f32; 4];
        let tile = Tile::full(0, 2, 2);
        run_tile(Variant::BitWidth4CompInt8, layout, &a, qb.view(), &workspace, &mut c, tile, 2);
    }
}
