//! Portable scalar kernels.
//!
//! Every output element is accumulated in ascending K order with the weight
//! materialised as `scale * (q - zp)` before the multiply. The single-row
//! kernel and the dequantize + dense path therefore produce bit-identical
//! results, which keeps sequential and pooled runs identical regardless of
//! how columns are partitioned.

use crate::layout::{BlockLayout, DEFAULT_ZERO_POINT_4BIT};
use crate::views::{QuantBView, TileMut};

/// Rows the dense kernel writes per call.
pub const SGEMM_ROWS_PER_CALL: usize = 4;

// ---------------------------------------------------------------------------
// 4-bit unpacking
// ---------------------------------------------------------------------------

/// Element `i` of a packed 4-bit run: even elements in the low nibble.
#[inline(always)]
fn nibble(packed: &[u8], i: usize) -> u8 {
    let byte = packed[i >> 1];
    if i & 1 == 0 {
        byte & 0x0F
    } else {
        byte >> 4
    }
}

#[inline(always)]
fn zero_point(zp: Option<&[u8]>, blk: usize) -> u8 {
    match zp {
        Some(zp) => nibble(zp, blk),
        None => DEFAULT_ZERO_POINT_4BIT,
    }
}

/// Per-column slices of a quantized B view.
#[inline(always)]
fn column<'a>(
    layout: &BlockLayout,
    b: &QuantBView<'a>,
    n: usize,
) -> (&'a [u8], &'a [f32], Option<&'a [u8]>) {
    let ldb = layout.ldb();
    let k_blks = layout.block_count_k;
    let zp_bytes = layout.zero_point_bytes();
    (
        &b.data[n * ldb..(n + 1) * ldb],
        &b.scale[n * k_blks..(n + 1) * k_blks],
        b.zero_point.map(|zp| &zp[n * zp_bytes..(n + 1) * zp_bytes]),
    )
}

// ---------------------------------------------------------------------------
// fp32 compute
// ---------------------------------------------------------------------------

pub fn m1_kernel_fp32(layout: &BlockLayout, a_row: &[f32], b: QuantBView<'_>, c: &mut [f32]) {
    let blk_bytes = layout.blk_data_bytes();
    for (n, out) in c.iter_mut().enumerate() {
        let (data, scales, zps) = column(layout, &b, n);
        let mut acc = 0.0f32;
        for blk in 0..layout.block_count_k {
            let k_start = blk * layout.blk_len;
            let packed = &data[blk * blk_bytes..(blk + 1) * blk_bytes];
            let scale = scales[blk];
            let zp = zero_point(zps, blk) as f32;
            for i in 0..layout.block_k_len(blk) {
                let w = scale * (nibble(packed, i) as f32 - zp);
                acc += a_row[k_start + i] * w;
            }
        }
        *out = acc;
    }
}

/// Rows past K in the tail block are zero-filled.
pub fn dequant_b_for_sgemm_fp32(
    layout: &BlockLayout,
    dst: &mut [f32],
    b: QuantBView<'_>,
    count_n: usize,
) {
    let blk_bytes = layout.blk_data_bytes();
    assert!(dst.len() >= layout.padded_k() * count_n, "dequant buffer too small");
    for n in 0..count_n {
        let (data, scales, zps) = column(layout, &b, n);
        for blk in 0..layout.block_count_k {
            let k_start = blk * layout.blk_len;
            let packed = &data[blk * blk_bytes..(blk + 1) * blk_bytes];
            let scale = scales[blk];
            let zp = zero_point(zps, blk) as f32;
            let valid = layout.block_k_len(blk);
            for i in 0..layout.blk_len {
                dst[(k_start + i) * count_n + n] = if i < valid {
                    scale * (nibble(packed, i) as f32 - zp)
                } else {
                    0.0
                };
            }
        }
    }
}

pub fn sgemm_kernel(
    a: &[f32],
    lda: usize,
    b: &[f32],
    c: &mut TileMut<'_>,
    k: usize,
    alpha: f32,
) -> usize {
    let rows = c.rows().min(SGEMM_ROWS_PER_CALL);
    let ldb = c.cols();
    for r in 0..rows {
        let a_row = &a[r * lda..r * lda + k];
        let c_row = c.row_mut(r);
        for (j, out) in c_row.iter_mut().enumerate() {
            let mut acc = 0.0f32;
            for (p, &av) in a_row.iter().enumerate() {
                acc += av * b[p * ldb + j];
            }
            *out = alpha * acc;
        }
    }
    rows
}

// ---------------------------------------------------------------------------
// int8 compute
// ---------------------------------------------------------------------------

/// Symmetric per-block quantization: `scale = amax / 127`, values clamped to [-127, 127].
///
/// Bytes of a short tail block beyond K are zeroed.
pub fn quantize_a_row_int8(layout: &BlockLayout, a_row: &[f32], quant_a_row: &mut [u8]) {
    let blk_size = crate::layout::q8_blk_size(layout.blk_len);
    for blk in 0..layout.block_count_k {
        let k_start = blk * layout.blk_len;
        let src = &a_row[k_start..k_start + layout.block_k_len(blk)];
        let dst = &mut quant_a_row[blk * blk_size..(blk + 1) * blk_size];

        let amax = src.iter().fold(0.0f32, |m, v| m.max(v.abs()));
        let scale = amax / 127.0;
        let inv_scale = if amax != 0.0 { 127.0 / amax } else { 0.0 };

        let (scale_bytes, values) = dst.split_at_mut(std::mem::size_of::<f32>());
        scale_bytes.copy_from_slice(bytemuck::bytes_of(&scale));
        for (i, q) in values.iter_mut().enumerate() {
            let v = match src.get(i) {
                Some(&x) => (x * inv_scale).round().clamp(-127.0, 127.0) as i8,
                None => 0,
            };
            *q = v as u8;
        }
    }
}

pub fn m1_kernel_int8(layout: &BlockLayout, quant_a_row: &[u8], b: QuantBView<'_>, c: &mut [f32]) {
    let blk_bytes = layout.blk_data_bytes();
    let blk_size = crate::layout::q8_blk_size(layout.blk_len);
    for (n, out) in c.iter_mut().enumerate() {
        let (data, scales, zps) = column(layout, &b, n);
        let mut acc = 0.0f32;
        for blk in 0..layout.block_count_k {
            let qa = &quant_a_row[blk * blk_size..(blk + 1) * blk_size];
            let (scale_bytes, values) = qa.split_at(std::mem::size_of::<f32>());
            let a_scale: f32 = bytemuck::pod_read_unaligned(scale_bytes);
            let values: &[i8] = bytemuck::cast_slice(values);

            let packed = &data[blk * blk_bytes..(blk + 1) * blk_bytes];
            let zp = zero_point(zps, blk) as i32;
            let mut isum = 0i32;
            for (i, &av) in values.iter().take(layout.block_k_len(blk)).enumerate() {
                isum += av as i32 * (nibble(packed, i) as i32 - zp);
            }
            acc += a_scale * scales[blk] * isum as f32;
        }
        *out = acc;
    }
}
