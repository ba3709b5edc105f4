//! Thread partitioner: tiles the (M, N) space of every instance in a batch.
//!
//! The thread budget comes from a cost estimate `M * N * K * batch`, capped
//! by a multiple of the pool size. Rows are tiled with a fixed stride; the
//! column stride shrinks until every instance has roughly its share of
//! threads. The plan is a pure function of its inputs, so a given shape and
//! pool size always produce the same tiles.

use crate::config::GemmConfig;
use crate::layout::{div_round_up, round_up};

/// One unit of parallel work: a rectangle of one instance's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tile {
    pub gemm_index: usize,
    pub start_m: usize,
    pub count_m: usize,
    pub start_n: usize,
    pub count_n: usize,
}

impl Tile {
    /// The whole `m x n` output of instance `gemm_index`.
    pub fn full(gemm_index: usize, m: usize, n: usize) -> Self {
        Self { gemm_index, start_m: 0, count_m: m, start_n: 0, count_n: n }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TilePlan {
    pub m: usize,
    pub n: usize,
    pub batch_n: usize,
    pub stride_m: usize,
    pub stride_n: usize,
    pub thread_count_m: usize,
    pub thread_count_n: usize,
}

impl TilePlan {
    pub fn new(
        m: usize,
        n: usize,
        k: usize,
        batch_n: usize,
        max_threads: usize,
        config: &GemmConfig,
    ) -> Self {
        let stride_m = config.stride_m;
        if m == 0 || n == 0 || batch_n == 0 {
            return Self {
                m,
                n,
                batch_n,
                stride_m,
                stride_n: n,
                thread_count_m: 0,
                thread_count_n: 0,
            };
        }

        let complexity = m as f64 * n as f64 * k as f64 * batch_n as f64;
        let mut target_threads = (complexity / config.thread_complexity as f64) as usize + 1;
        let max_threads = max_threads.max(1) * config.thread_cap_multiplier;
        if target_threads >= max_threads {
            target_threads = max_threads;
        }
        let threads_per_gemm = (target_threads / batch_n).max(1);

        let mut stride_n = n;
        if threads_per_gemm > 1 {
            let blocked_m = div_round_up(m, stride_m);
            let max_nc = div_round_up(n * blocked_m, threads_per_gemm);
            if max_nc < stride_n {
                stride_n = stride_n.min(round_up(max_nc, config.stride_n_thread_align));
            }
        }

        Self {
            m,
            n,
            batch_n,
            stride_m,
            stride_n,
            thread_count_m: div_round_up(m, stride_m),
            thread_count_n: div_round_up(n, stride_n),
        }
    }

    #[inline]
    pub fn threads_per_gemm(&self) -> usize {
        self.thread_count_m * self.thread_count_n
    }

    /// Parallel units across the whole batch.
    #[inline]
    pub fn total_units(&self) -> usize {
        self.threads_per_gemm() * self.batch_n
    }

    /// Decode unit `tid` into its instance and rectangle.
    pub fn tile(&self, tid: usize) -> Tile {
        let per_gemm = self.threads_per_gemm();
        assert!(tid < self.total_units(), "unit {tid} out of {} units", self.total_units());
        let gemm_index = tid / per_gemm;
        let blk_i = tid % per_gemm;
        let thread_id_n = blk_i / self.thread_count_m;
        let thread_id_m = blk_i % self.thread_count_m;

        let start_m = thread_id_m * self.stride_m;
        let start_n = thread_id_n * self.stride_n;
        Tile {
            gemm_index,
            start_m,
            count_m: self.stride_m.min(self.m - start_m),
            start_n,
            count_n: self.stride_n.min(self.n - start_n),
        }
    }

    pub fn tiles(&self) -> impl Iterator<Item = Tile> + '_ {
        (0..self.total_units()).map(move |tid| self.tile(tid))
    }
}
