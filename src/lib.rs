//! qnbit-gemm: batched GEMM over block-quantized n-bit weights.
//!
//! Computes `C[M, N] = A[M, K] * B[K, N]` where A is dense f32 and B is
//! stored 4 bits per value, blocked along K with one f32 scale and an
//! optional zero point per block. The crate selects an execution variant for
//! the requested shape and compute precision, sizes the scratch workspace,
//! splits the batch into output tiles and drives the kernels of the active
//! backend over them.
//!
//! - **Variants**: fp32 compute (dequantize B) for any M, int8 compute
//!   (quantize A per block) for single-row problems
//! - **Pluggable kernels**: backends fill a [`QNBitKernels`] table; missing
//!   slots make the matching variants unavailable instead of failing mid-call
//! - **Deterministic tiling**: sequential and pooled runs write bit-identical output
//!
//! # Quick Start
//!
//! ```ignore
//! use qnbit_gemm::{ComputeType, DataParams, ProblemShape, QNBitGemmDispatcher};
//!
//! let shape = ProblemShape::new(m, n, k, 4, 32, ComputeType::Fp32);
//! let dispatcher = QNBitGemmDispatcher::new();
//! assert!(dispatcher.is_available(&shape));
//! let mut params = [DataParams::new(&a, k, quant_b.view(), &mut c, n)];
//! dispatcher.run_batch(&shape, &mut params, None, Some(&pool));
//! ```

#![allow(clippy::needless_range_loop)]

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod kernels;
pub mod layout;
pub mod partition;
pub mod quantization;
pub mod variant;
pub mod views;
pub mod workspace;

mod compute;

#[cfg(test)]
mod tests_batch;

pub use config::GemmConfig;
pub use dispatcher::{is_available, run_batch, try_run_batch, QNBitGemmDispatcher};
pub use error::{GemmError, GemmResult};
pub use kernels::{platform_kernels, QNBitKernels};
pub use layout::{BlockLayout, SUPPORTED_BLK_LENS};
pub use partition::{Tile, TilePlan};
pub use quantization::{dequantize_b, quantize_b_blockwise, reference_matmul, QuantizedB};
pub use variant::{select_variant, ComputeType, ProblemShape, Variant};
pub use views::{DataParams, QuantBView, TileMut};
pub use workspace::{
    batch_workspace_size, per_gemm_workspace_alignment, per_gemm_workspace_size,
    per_gemm_workspace_stride,
};
