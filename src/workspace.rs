//! Scratch workspace: sizing, alignment and the int8 pre-pass.
//!
//! One caller-allocated byte buffer is split into `batch_n` regions of
//! `per_gemm_workspace_stride` bytes. Only `BitWidth4CompInt8` needs scratch;
//! it stores the int8-quantized rows of A there before compute starts.

use rayon::prelude::*;
use rayon::ThreadPool;

use crate::kernels::{QNBitKernels, QuantizeARowInt8Fn};
use crate::layout::{q8_blk_alignment, round_up, BlockLayout};
use crate::variant::{ProblemShape, Variant};
use crate::views::DataParams;

/// Alignment of one instance's workspace region.
pub fn per_gemm_workspace_alignment(variant: Variant) -> usize {
    match variant {
        Variant::BitWidth4CompInt8 => q8_blk_alignment(),
        Variant::BitWidth4CompFp32 => 1,
    }
}

/// Scratch bytes needed by one GEMM instance; 0 for unsupported shapes.
pub fn per_gemm_workspace_size(shape: &ProblemShape) -> usize {
    match shape.variant() {
        Some(Variant::BitWidth4CompInt8) => {
            let layout = BlockLayout::new(shape.blk_bit_width, shape.blk_len, shape.k);
            shape.m * layout.quant_a_row_bytes()
        }
        _ => 0,
    }
}

/// Distance between consecutive instance regions.
pub fn per_gemm_workspace_stride(shape: &ProblemShape) -> usize {
    let size = per_gemm_workspace_size(shape);
    match shape.variant() {
        Some(variant) => round_up(size, per_gemm_workspace_alignment(variant)),
        None => size,
    }
}

/// Bytes to allocate for a batch, including slack for aligning the base.
///
/// Returns 0 when the variant needs no workspace.
pub fn batch_workspace_size(shape: &ProblemShape, batch_n: usize) -> usize {
    let stride = per_gemm_workspace_stride(shape);
    if stride == 0 {
        return 0;
    }
    let alignment = shape.variant().map_or(1, per_gemm_workspace_alignment);
    batch_n * stride + alignment - 1
}

/// Skip the unaligned prefix of `workspace`. Never reallocates.
pub fn align_workspace(workspace: &mut [u8], alignment: usize) -> &mut [u8] {
    let offset = workspace.as_ptr().align_offset(alignment).min(workspace.len());
    &mut workspace[offset..]
}

/// Quantize every row of A of every instance into its workspace region.
///
/// `workspace` must already be aligned and hold `params.len() * stride` bytes.
/// Instances are processed in parallel when a pool is given. Returns only
/// after every instance is done.
pub(crate) fn initialize_workspace_int8(
    shape: &ProblemShape,
    kernels: &QNBitKernels,
    params: &[DataParams<'_>],
    workspace: &mut [u8],
    stride: usize,
    pool: Option<&ThreadPool>,
) {
    let Some(quantize) = kernels.quantize_a_row_int8 else {
        panic!("{} kernels lack quantize_a_row_int8", kernels.name);
    };
    if stride == 0 || params.is_empty() {
        return;
    }
    assert!(
        workspace.len() >= params.len() * stride,
        "workspace holds {} bytes, need {}",
        workspace.len(),
        params.len() * stride
    );
    let layout = BlockLayout::new(shape.blk_bit_width, shape.blk_len, shape.k);

    match pool {
        Some(pool) => pool.install(|| {
            workspace
                .par_chunks_mut(stride)
                .zip(params.par_iter())
                .for_each(|(ws, p)| quantize_instance(&layout, quantize, shape.m, p, ws));
        }),
        None => {
            for (ws, p) in workspace.chunks_mut(stride).zip(params) {
                quantize_instance(&layout, quantize, shape.m, p, ws);
            }
        }
    }
}

fn quantize_instance(
    layout: &BlockLayout,
    quantize: QuantizeARowInt8Fn,
    m: usize,
    params: &DataParams<'_>,
    workspace: &mut [u8],
) {
    let row_bytes = layout.quant_a_row_bytes();
    for (row, quant_row) in workspace.chunks_exact_mut(row_bytes).take(m).enumerate() {
        quantize(layout, params.a_row(row, layout.k), quant_row);
    }
}
