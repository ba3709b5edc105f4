//! Property-based tests for tiling and workspace sizing.
//!
//! - Tiles of every instance cover its (M, N) output exactly once
//! - Plans are deterministic for a given shape and pool size
//! - Workspace size never shrinks as M, K or the batch grow

use proptest::prelude::*;

use qnbit_gemm::{batch_workspace_size, ComputeType, GemmConfig, ProblemShape, TilePlan};

// ═══════════════════════════════════════════════════════════════════════
// 1. Tiles are exhaustive and disjoint
// ═══════════════════════════════════════════════════════════════════════

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn tiles_cover_each_output_once(
        m in 0usize..300,
        n in 0usize..300,
        k in 0usize..4096,
        batch_n in 0usize..4,
        max_threads in 1usize..32,
        stride_m in 1usize..160,
        align in 1usize..32,
    ) {
        let config = GemmConfig {
            stride_m,
            stride_n_thread_align: align,
            ..GemmConfig::default()
        };
        let plan = TilePlan::new(m, n, k, batch_n, max_threads, &config);
        let mut hits = vec![0u8; batch_n * m * n];
        for tile in plan.tiles() {
            prop_assert!(tile.gemm_index < batch_n);
            prop_assert!(tile.count_m > 0 && tile.count_n > 0);
            prop_assert!(tile.start_m + tile.count_m <= m);
            prop_assert!(tile.start_n + tile.count_n <= n);
            for r in tile.start_m..tile.start_m + tile.count_m {
                for c in tile.start_n..tile.start_n + tile.count_n {
                    hits[tile.gemm_index * m * n + r * n + c] += 1;
                }
            }
        }
        prop_assert!(hits.iter().all(|&h| h == 1));
    }

    #[test]
    fn plan_is_deterministic(
        m in 0usize..1000,
        n in 0usize..5000,
        k in 0usize..5000,
        batch_n in 0usize..8,
        max_threads in 1usize..64,
    ) {
        let config = GemmConfig::default();
        let first = TilePlan::new(m, n, k, batch_n, max_threads, &config);
        let second = TilePlan::new(m, n, k, batch_n, max_threads, &config);
        prop_assert_eq!(first, second);
        prop_assert!(first.total_units() <= batch_n * (m.div_ceil(128).max(1)) * n.max(1));
    }
}

// ═══════════════════════════════════════════════════════════════════════
// 2. Workspace sizing is monotone
// ═══════════════════════════════════════════════════════════════════════

fn blk_len_strategy() -> impl Strategy<Value = usize> {
    prop_oneof![Just(16usize), Just(32), Just(64), Just(128), Just(256)]
}

proptest! {
    #[test]
    fn int8_workspace_grows_with_k_and_batch(
        k in 0usize..2048,
        dk in 0usize..512,
        batch_n in 0usize..16,
        db in 0usize..8,
        blk_len in blk_len_strategy(),
    ) {
        let shape = ProblemShape::new(1, 64, k, 4, blk_len, ComputeType::Int8);
        let bigger_k = ProblemShape::new(1, 64, k + dk, 4, blk_len, ComputeType::Int8);
        let size = batch_workspace_size(&shape, batch_n);
        prop_assert!(batch_workspace_size(&bigger_k, batch_n) >= size);
        prop_assert!(batch_workspace_size(&shape, batch_n + db) >= size);
    }

    #[test]
    fn fp32_workspace_is_always_zero(
        m in 0usize..512,
        k in 0usize..4096,
        batch_n in 0usize..16,
        blk_len in blk_len_strategy(),
    ) {
        let shape = ProblemShape::new(m, 32, k, 4, blk_len, ComputeType::Fp32);
        prop_assert_eq!(batch_workspace_size(&shape, batch_n), 0);
    }
}
