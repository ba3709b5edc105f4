//! Kernel table for the n-bit GEMM engine.
//!
//! A backend fills a [`QNBitKernels`] table. The quantized slots are
//! optional: a backend that lacks one of them simply cannot run the variants
//! that need it, which the availability query reports up front instead of
//! failing mid-call.
//!
//! | Variant | Required slots |
//! |---|---|
//! | `BitWidth4CompFp32` | `m1_kernel_fp32`, `dequant_b_for_sgemm_fp32` |
//! | `BitWidth4CompInt8` | `m1_kernel_int8`, `quantize_a_row_int8` |
//!
//! The dense `sgemm_kernel` is always present.

pub mod scalar;

use std::sync::OnceLock;

use crate::layout::BlockLayout;
use crate::variant::Variant;
use crate::views::{QuantBView, TileMut};

/// `c[n] = sum_k a_row[k] * dequant(B)[k, n]` for every column of the view; `c.len()` columns.
pub type M1KernelFp32Fn = fn(layout: &BlockLayout, a_row: &[f32], b: QuantBView<'_>, c: &mut [f32]);

/// Dequantize `count_n` columns of B into a dense `padded_k x count_n` row-major buffer.
pub type DequantBForSgemmFn =
    fn(layout: &BlockLayout, dst: &mut [f32], b: QuantBView<'_>, count_n: usize);

/// Single-row product of an int8-quantized A row against `c.len()` columns of B.
pub type M1KernelInt8Fn =
    fn(layout: &BlockLayout, quant_a_row: &[u8], b: QuantBView<'_>, c: &mut [f32]);

/// Quantize one row of A into `block_count_k` Q8 blocks.
pub type QuantizeARowInt8Fn = fn(layout: &BlockLayout, a_row: &[f32], quant_a_row: &mut [u8]);

/// `C = alpha * A * B` over the leading rows of `c`, with B dense `k x c.cols()`.
///
/// Returns the number of rows written, which may be fewer than `c.rows()`.
pub type SgemmKernelFn =
    fn(a: &[f32], lda: usize, b: &[f32], c: &mut TileMut<'_>, k: usize, alpha: f32) -> usize;

#[derive(Debug, Clone, Copy)]
pub struct QNBitKernels {
    pub name: &'static str,
    pub m1_kernel_fp32: Option<M1KernelFp32Fn>,
    pub dequant_b_for_sgemm_fp32: Option<DequantBForSgemmFn>,
    pub m1_kernel_int8: Option<M1KernelInt8Fn>,
    pub quantize_a_row_int8: Option<QuantizeARowInt8Fn>,
    pub sgemm_kernel: SgemmKernelFn,
}

impl QNBitKernels {
    /// Portable reference kernels.
    pub const SCALAR: QNBitKernels = QNBitKernels {
        name: "scalar",
        m1_kernel_fp32: Some(scalar::m1_kernel_fp32),
        dequant_b_for_sgemm_fp32: Some(scalar::dequant_b_for_sgemm_fp32),
        m1_kernel_int8: Some(scalar::m1_kernel_int8),
        quantize_a_row_int8: Some(scalar::quantize_a_row_int8),
        sgemm_kernel: scalar::sgemm_kernel,
    };

    /// Whether every slot `variant` needs is populated.
    pub fn supports(&self, variant: Variant) -> bool {
        match variant {
            Variant::BitWidth4CompFp32 => {
                self.m1_kernel_fp32.is_some() && self.dequant_b_for_sgemm_fp32.is_some()
            }
            Variant::BitWidth4CompInt8 => {
                self.m1_kernel_int8.is_some() && self.quantize_a_row_int8.is_some()
            }
        }
    }
}

static PLATFORM_KERNELS: OnceLock<Option<QNBitKernels>> = OnceLock::new();

/// Process-wide kernel table, initialised on first use.
pub fn platform_kernels() -> Option<&'static QNBitKernels> {
    PLATFORM_KERNELS.get_or_init(detect_platform_kernels).as_ref()
}

fn detect_platform_kernels() -> Option<QNBitKernels> {
    let kernels = QNBitKernels::SCALAR;
    log::info!("qnbit gemm kernels: {}", kernels.name);
    Some(kernels)
}
