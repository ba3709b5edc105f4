//! Block layout arithmetic shared by every component.
//!
//! K is split into `ceil(K / blk_len)` blocks. Each column of B stores, per
//! block, `blk_len * bit_width / 8` bytes of packed values, one f32 scale and
//! optionally a packed zero point. All byte counts are derived here so the
//! sizing, initializer and compute paths agree on strides.

use std::mem::{align_of, size_of};

/// Block lengths accepted along K.
pub const SUPPORTED_BLK_LENS: [usize; 5] = [16, 32, 64, 128, 256];

/// Zero point implied when a 4-bit matrix carries no zero points.
pub const DEFAULT_ZERO_POINT_4BIT: u8 = 8;

#[inline(always)]
pub const fn div_round_up(value: usize, divisor: usize) -> usize {
    (value + divisor - 1) / divisor
}

#[inline(always)]
pub const fn round_up(value: usize, multiple: usize) -> usize {
    div_round_up(value, multiple) * multiple
}

/// Packed bytes for one block of `blk_len` values at `blk_bit_width` bits.
#[inline(always)]
pub const fn blk_data_size_in_bytes(blk_bit_width: usize, blk_len: usize) -> usize {
    blk_len * blk_bit_width / 8
}

/// Bytes holding the zero points of `blk_count` blocks of one column.
#[inline(always)]
pub const fn zero_points_size_in_bytes(blk_bit_width: usize, blk_count: usize) -> usize {
    div_round_up(blk_count * blk_bit_width, 8)
}

/// Bytes of one int8-quantized A block: f32 scale followed by `blk_len` values.
#[inline(always)]
pub const fn q8_blk_size(blk_len: usize) -> usize {
    size_of::<f32>() + blk_len
}

/// Alignment of a quantized A row (the alignment of its leading f32 scale).
#[inline(always)]
pub const fn q8_blk_alignment() -> usize {
    align_of::<f32>()
}

/// Strides of a block-quantized B matrix for a fixed (bit width, blk_len, K).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockLayout {
    pub blk_bit_width: usize,
    pub blk_len: usize,
    pub k: usize,
    pub block_count_k: usize,
}

impl BlockLayout {
    pub const fn new(blk_bit_width: usize, blk_len: usize, k: usize) -> Self {
        Self {
            blk_bit_width,
            blk_len,
            k,
            block_count_k: div_round_up(k, blk_len),
        }
    }

    /// Packed bytes per block.
    #[inline(always)]
    pub const fn blk_data_bytes(&self) -> usize {
        blk_data_size_in_bytes(self.blk_bit_width, self.blk_len)
    }

    /// Packed bytes per column of B.
    #[inline(always)]
    pub const fn ldb(&self) -> usize {
        self.block_count_k * self.blk_data_bytes()
    }

    /// Zero-point bytes per column of B.
    #[inline(always)]
    pub const fn zero_point_bytes(&self) -> usize {
        zero_points_size_in_bytes(self.blk_bit_width, self.block_count_k)
    }

    /// Bytes of one int8-quantized A row.
    #[inline(always)]
    pub const fn quant_a_row_bytes(&self) -> usize {
        self.block_count_k * q8_blk_size(self.blk_len)
    }

    /// Number of valid K elements in block `blk`; the tail block may be short.
    #[inline(always)]
    pub fn block_k_len(&self, blk: usize) -> usize {
        let start = blk * self.blk_len;
        self.blk_len.min(self.k - start)
    }

    /// Rows of the dense buffer produced by B dequantization (K padded to whole blocks).
    #[inline(always)]
    pub const fn padded_k(&self) -> usize {
        self.block_count_k * self.blk_len
    }
}
