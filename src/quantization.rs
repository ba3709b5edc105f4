//! Producer-side helpers: blockwise 4-bit quantization of B and a dense reference.
//!
//! Output follows the layout the kernels consume (see [`BlockLayout`]):
//! per column, `block_count_k` packed blocks with element `2i` in the low
//! nibble, one f32 scale per block, and optionally one zero-point nibble per
//! block. Padding nibbles past K hold the block's zero point.

use crate::error::{GemmError, GemmResult};
use crate::kernels::scalar::dequant_b_for_sgemm_fp32;
use crate::layout::{BlockLayout, DEFAULT_ZERO_POINT_4BIT, SUPPORTED_BLK_LENS};
use crate::views::QuantBView;

const MAX_Q4: f32 = 15.0;

/// Owned block-quantized B (`K x N`, 4-bit).
#[derive(Debug, Clone, PartialEq)]
pub struct QuantizedB {
    pub layout: BlockLayout,
    pub n: usize,
    pub data: Vec<u8>,
    pub scale: Vec<f32>,
    pub zero_point: Option<Vec<u8>>,
}

impl QuantizedB {
    pub fn view(&self) -> QuantBView<'_> {
        QuantBView::new(&self.data, &self.scale, self.zero_point.as_deref())
    }

    /// Dense `K x N` row-major reconstruction.
    pub fn dequantize(&self) -> Vec<f32> {
        dequantize_b(&self.layout, self.view(), self.n)
    }
}

/// Quantize a row-major `K x N` matrix to 4 bits along K.
///
/// With `with_zero_point` each block stores an asymmetric zero point over
/// `[min(v, 0), max(v, 0)]`; otherwise blocks are symmetric around the
/// implied zero point 8.
pub fn quantize_b_blockwise(
    b: &[f32],
    n: usize,
    k: usize,
    blk_len: usize,
    with_zero_point: bool,
) -> GemmResult<QuantizedB> {
    if !SUPPORTED_BLK_LENS.contains(&blk_len) {
        return Err(GemmError::InvalidParams(format!("unsupported block length {blk_len}")));
    }
    if b.len() < k * n {
        return Err(GemmError::InvalidParams(format!(
            "b holds {} elements, need {}",
            b.len(),
            k * n
        )));
    }

    let layout = BlockLayout::new(4, blk_len, k);
    let k_blks = layout.block_count_k;
    let blk_bytes = layout.blk_data_bytes();
    let zp_bytes = layout.zero_point_bytes();
    let mut data = vec![0u8; n * layout.ldb()];
    let mut scale = vec![0.0f32; n * k_blks];
    let mut zero_point = with_zero_point.then(|| vec![0u8; n * zp_bytes]);

    let mut values = vec![0.0f32; blk_len];
    for col in 0..n {
        for blk in 0..k_blks {
            let k_start = blk * blk_len;
            let valid = layout.block_k_len(blk);
            for (i, v) in values[..valid].iter_mut().enumerate() {
                *v = b[(k_start + i) * n + col];
            }

            let (s, zp) = if with_zero_point {
                block_params_asymmetric(&values[..valid])
            } else {
                (block_scale_symmetric(&values[..valid]), DEFAULT_ZERO_POINT_4BIT)
            };
            let inv = if s != 0.0 { 1.0 / s } else { 0.0 };
            scale[col * k_blks + blk] = s;

            let packed = &mut data[col * layout.ldb() + blk * blk_bytes..][..blk_bytes];
            for i in 0..blk_len {
                let q = if i < valid {
                    ((values[i] * inv).round() + zp as f32).clamp(0.0, MAX_Q4) as u8
                } else {
                    zp
                };
                packed[i / 2] |= if i % 2 == 0 { q } else { q << 4 };
            }
            if let Some(zps) = zero_point.as_mut() {
                let byte = &mut zps[col * zp_bytes + blk / 2];
                *byte |= if blk % 2 == 0 { zp } else { zp << 4 };
            }
        }
    }

    Ok(QuantizedB { layout, n, data, scale, zero_point })
}

fn block_scale_symmetric(values: &[f32]) -> f32 {
    let amax = values.iter().fold(0.0f32, |m, v| m.max(v.abs()));
    amax / 7.0
}

fn block_params_asymmetric(values: &[f32]) -> (f32, u8) {
    let (min, max) = values
        .iter()
        .fold((0.0f32, 0.0f32), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let scale = (max - min) / MAX_Q4;
    if scale == 0.0 {
        return (0.0, DEFAULT_ZERO_POINT_4BIT);
    }
    let zp = (-min / scale).round().clamp(0.0, MAX_Q4) as u8;
    (scale, zp)
}

/// Dense `K x N` row-major reconstruction of `n` columns.
pub fn dequantize_b(layout: &BlockLayout, b: QuantBView<'_>, n: usize) -> Vec<f32> {
    let mut dense = vec![0.0f32; layout.padded_k() * n];
    dequant_b_for_sgemm_fp32(layout, &mut dense, b, n);
    dense.truncate(layout.k * n);
    dense
}

/// Row-major `C[M, N] = A[M, K] * B[K, N]`, accumulating in K order.
pub fn reference_matmul(a: &[f32], b: &[f32], m: usize, n: usize, k: usize) -> Vec<f32> {
    let mut c = vec![0.0f32; m * n];
    for i in 0..m {
        for j in 0..n {
            let mut acc = 0.0f32;
            for p in 0..k {
                acc += a[i * k + p] * b[p * n + j];
            }
            c[i * n + j] = acc;
        }
    }
    c
}
