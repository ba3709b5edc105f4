//! Borrowed views over caller-owned matrices.
//!
//! The engine never allocates or resizes caller buffers. A and B are read
//! through shared slices; C is written through [`TileMut`] sub-rectangles so
//! that disjoint tiles of one output can be filled from different threads.

use std::marker::PhantomData;

use crate::error::{GemmError, GemmResult};
use crate::layout::BlockLayout;
use crate::variant::ProblemShape;

/// Block-quantized B: packed data, per-block scales and optional packed zero points.
///
/// Columns of B are stored contiguously; see [`BlockLayout`] for the strides.
#[derive(Debug, Clone, Copy)]
pub struct QuantBView<'a> {
    pub data: &'a [u8],
    pub scale: &'a [f32],
    pub zero_point: Option<&'a [u8]>,
}

impl<'a> QuantBView<'a> {
    pub fn new(data: &'a [u8], scale: &'a [f32], zero_point: Option<&'a [u8]>) -> Self {
        Self { data, scale, zero_point }
    }

    /// Restrict the view to columns `[start_n, start_n + count_n)`.
    ///
    /// Panics if the range exceeds the underlying buffers.
    #[inline]
    pub fn columns(&self, layout: &BlockLayout, start_n: usize, count_n: usize) -> QuantBView<'a> {
        let ldb = layout.ldb();
        let k_blks = layout.block_count_k;
        let zp_bytes = layout.zero_point_bytes();
        QuantBView {
            data: &self.data[start_n * ldb..(start_n + count_n) * ldb],
            scale: &self.scale[start_n * k_blks..(start_n + count_n) * k_blks],
            zero_point: self
                .zero_point
                .map(|zp| &zp[start_n * zp_bytes..(start_n + count_n) * zp_bytes]),
        }
    }

    /// Check that the view holds at least `n` columns.
    pub fn validate(&self, layout: &BlockLayout, n: usize) -> GemmResult<()> {
        check_len("quant_b_data", self.data.len(), n * layout.ldb())?;
        check_len("quant_b_scale", self.scale.len(), n * layout.block_count_k)?;
        if let Some(zp) = self.zero_point {
            check_len("quant_b_zero_point", zp.len(), n * layout.zero_point_bytes())?;
        }
        Ok(())
    }
}

/// Per-instance inputs of one GEMM in a batch.
///
/// A is row-major with stride `lda`, C is row-major with stride `ldc`.
#[derive(Debug)]
pub struct DataParams<'a> {
    pub a: &'a [f32],
    pub lda: usize,
    pub b: QuantBView<'a>,
    pub c: &'a mut [f32],
    pub ldc: usize,
}

impl<'a> DataParams<'a> {
    pub fn new(a: &'a [f32], lda: usize, b: QuantBView<'a>, c: &'a mut [f32], ldc: usize) -> Self {
        Self { a, lda, b, c, ldc }
    }

    /// Check buffer extents and strides against the problem shape.
    pub fn validate(&self, shape: &ProblemShape) -> GemmResult<()> {
        let layout = BlockLayout::new(shape.blk_bit_width, shape.blk_len, shape.k);
        if shape.m > 0 && shape.k > 0 {
            if self.lda < shape.k {
                return Err(GemmError::InvalidParams(format!(
                    "lda {} < k {}",
                    self.lda, shape.k
                )));
            }
            check_len("a", self.a.len(), (shape.m - 1) * self.lda + shape.k)?;
        }
        if shape.m > 0 && shape.n > 0 {
            if self.ldc < shape.n {
                return Err(GemmError::InvalidParams(format!(
                    "ldc {} < n {}",
                    self.ldc, shape.n
                )));
            }
            check_len("c", self.c.len(), (shape.m - 1) * self.ldc + shape.n)?;
        }
        self.b.validate(&layout, shape.n)
    }

    /// Row `m` of A, truncated to `k` elements.
    #[inline(always)]
    pub fn a_row(&self, m: usize, k: usize) -> &'a [f32] {
        let start = m * self.lda;
        &self.a[start..start + k]
    }
}

fn check_len(name: &str, actual: usize, required: usize) -> GemmResult<()> {
    if actual < required {
        return Err(GemmError::InvalidParams(format!(
            "{name} holds {actual} elements, need {required}"
        )));
    }
    Ok(())
}

/// Shareable handle to one instance's C buffer.
///
/// Created from a `&mut [f32]` that stays mutably borrowed for the whole
/// batch call; tiles handed out from it must not overlap.
#[derive(Debug, Clone, Copy)]
pub(crate) struct OutputView {
    ptr: *mut f32,
    len: usize,
    ldc: usize,
}

unsafe impl Send for OutputView {}
unsafe impl Sync for OutputView {}

impl OutputView {
    pub(crate) fn new(c: &mut [f32], ldc: usize) -> Self {
        Self { ptr: c.as_mut_ptr(), len: c.len(), ldc }
    }

    /// Carve out the rectangle `[start_m, +count_m) x [start_n, +count_n)`.
    ///
    /// # Safety
    /// No other live tile of this view may overlap the rectangle, and the
    /// source buffer must outlive `'t`.
    pub(crate) unsafe fn tile<'t>(
        &self,
        start_m: usize,
        count_m: usize,
        start_n: usize,
        count_n: usize,
    ) -> TileMut<'t> {
        if count_m > 0 && count_n > 0 {
            assert!(start_n + count_n <= self.ldc, "tile columns exceed ldc");
            assert!(
                (start_m + count_m - 1) * self.ldc + start_n + count_n <= self.len,
                "tile exceeds output buffer"
            );
        }
        TileMut {
            ptr: self.ptr.wrapping_add(start_m * self.ldc + start_n),
            rows: count_m,
            cols: count_n,
            ld: self.ldc,
            _marker: PhantomData,
        }
    }
}

/// Mutable rectangle of a row-major f32 matrix with leading dimension `ld`.
#[derive(Debug)]
pub struct TileMut<'a> {
    ptr: *mut f32,
    rows: usize,
    cols: usize,
    ld: usize,
    _marker: PhantomData<&'a mut f32>,
}

unsafe impl Send for TileMut<'_> {}

impl<'a> TileMut<'a> {
    /// Tile over a whole row-major buffer.
    pub fn from_slice(c: &'a mut [f32], rows: usize, cols: usize, ld: usize) -> Self {
        if rows > 0 && cols > 0 {
            assert!(cols <= ld, "cols exceed ld");
            assert!((rows - 1) * ld + cols <= c.len(), "tile exceeds buffer");
        }
        Self { ptr: c.as_mut_ptr(), rows, cols, ld, _marker: PhantomData }
    }

    #[inline(always)]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline(always)]
    pub fn cols(&self) -> usize {
        self.cols
    }

    #[inline(always)]
    pub fn ld(&self) -> usize {
        self.ld
    }

    #[inline(always)]
    pub fn row_mut(&mut self, r: usize) -> &mut [f32] {
        assert!(r < self.rows, "row {r} out of tile with {} rows", self.rows);
        // SAFETY: bounds were asserted when the tile was constructed.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.add(r * self.ld), self.cols) }
    }

    /// Sub-tile of columns `[start, start + count)` sharing this tile's rows.
    #[inline]
    pub fn columns(&mut self, start: usize, count: usize) -> TileMut<'_> {
        assert!(start + count <= self.cols, "column range out of tile");
        TileMut {
            ptr: self.ptr.wrapping_add(start),
            rows: self.rows,
            cols: count,
            ld: self.ld,
            _marker: PhantomData,
        }
    }

    /// Drop the first `n` rows.
    #[inline]
    pub fn advance_rows(&mut self, n: usize) {
        assert!(n <= self.rows, "cannot advance past the tile");
        self.ptr = self.ptr.wrapping_add(n * self.ld);
        self.rows -= n;
    }
}
