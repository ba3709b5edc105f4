//! Variant selection: maps a problem shape to one execution strategy.

use crate::layout::SUPPORTED_BLK_LENS;

/// Requested precision of the inner product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ComputeType {
    /// Unspecified; treated as `Fp32`.
    #[default]
    Undef,
    Fp32,
    Fp16,
    Bf16,
    Int8,
}

impl ComputeType {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Undef => "undef",
            Self::Fp32 => "fp32",
            Self::Fp16 => "fp16",
            Self::Bf16 => "bf16",
            Self::Int8 => "int8",
        }
    }
}

/// Shape and format of one batched GEMM call: C[M,N] = A[M,K] * B[K,N].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProblemShape {
    pub m: usize,
    pub n: usize,
    pub k: usize,
    pub blk_bit_width: usize,
    pub blk_len: usize,
    pub compute_type: ComputeType,
}

impl ProblemShape {
    pub fn new(
        m: usize,
        n: usize,
        k: usize,
        blk_bit_width: usize,
        blk_len: usize,
        compute_type: ComputeType,
    ) -> Self {
        Self { m, n, k, blk_bit_width, blk_len, compute_type }
    }

    #[inline]
    pub fn variant(&self) -> Option<Variant> {
        select_variant(self.m, self.n, self.k, self.blk_bit_width, self.blk_len, self.compute_type)
    }
}

/// Supported (bit width, compute type, shape constraint) strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Variant {
    BitWidth4CompFp32,
    /// Requires M == 1.
    BitWidth4CompInt8,
}

impl Variant {
    pub const COUNT: usize = 2;
    pub const ALL: [Variant; Self::COUNT] = [Variant::BitWidth4CompFp32, Variant::BitWidth4CompInt8];

    #[inline(always)]
    pub const fn index(self) -> usize {
        match self {
            Self::BitWidth4CompFp32 => 0,
            Self::BitWidth4CompInt8 => 1,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::BitWidth4CompFp32 => "BitWidth4_CompFp32",
            Self::BitWidth4CompInt8 => "BitWidth4_CompInt8",
        }
    }
}

/// Select the variant for a shape, or `None` when no strategy supports it.
///
/// Pure: N and K do not currently influence the choice.
pub fn select_variant(
    m: usize,
    _n: usize,
    _k: usize,
    blk_bit_width: usize,
    blk_len: usize,
    compute_type: ComputeType,
) -> Option<Variant> {
    if blk_bit_width != 4 || !SUPPORTED_BLK_LENS.contains(&blk_len) {
        return None;
    }
    match compute_type {
        ComputeType::Fp32 | ComputeType::Undef => Some(Variant::BitWidth4CompFp32),
        ComputeType::Int8 if m == 1 => Some(Variant::BitWidth4CompInt8),
        _ => None,
    }
}
