//! Batch-level tests: sequential vs pooled dispatch, tiling edge cases.

use rayon::ThreadPoolBuilder;

use crate::config::GemmConfig;
use crate::dispatcher::QNBitGemmDispatcher;
use crate::quantization::{quantize_b_blockwise, reference_matmul, QuantizedB};
use crate::variant::{ComputeType, ProblemShape};
use crate::views::DataParams;

struct Instance {
    a: Vec<f32>,
    b: QuantizedB,
    c: Vec<f32>,
}

fn make_batch(batch_n: usize, m: usize, n: usize, k: usize, blk_len: usize) -> Vec<Instance> {
    (0..batch_n)
        .map(|g| {
            let a = (0..m * k).map(|i| (((i + g * 31) * 17 % 23) as f32 - 11.0) * 0.05).collect();
            let w: Vec<f32> =
                (0..k * n).map(|i| (((i + g * 7) * 29 % 37) as f32 - 18.0) * 0.02).collect();
            let b = quantize_b_blockwise(&w, n, k, blk_len, g % 2 == 1).unwrap();
            Instance { a, b, c: vec![f32::NAN; m * n] }
        })
        .collect()
}

fn run(
    dispatcher: &QNBitGemmDispatcher<'_>,
    shape: &ProblemShape,
    batch: &mut [Instance],
    threads: Option<usize>,
) -> Vec<Vec<f32>> {
    let pool = threads.map(|t| ThreadPoolBuilder::new().num_threads(t).build().unwrap());
    let mut ws = vec![0u8; dispatcher.batch_workspace_size(shape, batch.len())];
    let mut params: Vec<DataParams<'_>> = batch
        .iter_mut()
        .map(|inst| DataParams::new(&inst.a, shape.k, inst.b.view(), &mut inst.c, shape.n))
        .collect();
    let ws = if ws.is_empty() { None } else { Some(ws.as_mut_slice()) };
    dispatcher.run_batch(shape, &mut params, ws, pool.as_ref());
    drop(params);
    batch.iter().map(|inst| inst.c.clone()).collect()
}

#[test]
fn pooled_matches_sequential_across_row_tiles() {
    // 129 rows leaves a one-row tile at the end, which takes the single-row path.
    for m in [1, 5, 129, 130] {
        let shape = ProblemShape::new(m, 70, 96, 4, 32, ComputeType::Fp32);
        let dispatcher = QNBitGemmDispatcher::new();
        let mut batch = make_batch(3, m, 70, 96, 32);
        let expected = run(&dispatcher, &shape, &mut batch, None);
        for threads in [1, 4, 16] {
            let mut batch = make_batch(3, m, 70, 96, 32);
            assert_eq!(run(&dispatcher, &shape, &mut batch, Some(threads)), expected, "m={m}");
        }
    }
}

#[test]
fn fine_grained_tiling_is_bit_exact() {
    let config = GemmConfig { thread_complexity: 64, stride_m: 3, ..GemmConfig::default() };
    let fine = QNBitGemmDispatcher::new().with_config(config);
    let coarse = QNBitGemmDispatcher::new();
    let shape = ProblemShape::new(10, 100, 50, 4, 16, ComputeType::Undef);

    let mut batch = make_batch(2, 10, 100, 50, 16);
    let expected = run(&coarse, &shape, &mut batch, None);
    let mut batch = make_batch(2, 10, 100, 50, 16);
    assert_eq!(run(&fine, &shape, &mut batch, Some(4)), expected);
}

#[test]
fn batch_results_match_reference() {
    let (m, n, k) = (7, 33, 80);
    let shape = ProblemShape::new(m, n, k, 4, 16, ComputeType::Fp32);
    let mut batch = make_batch(4, m, n, k, 16);
    let out = run(&QNBitGemmDispatcher::new(), &shape, &mut batch, Some(4));
    for (inst, c) in batch.iter().zip(&out) {
        let expected = reference_matmul(&inst.a, &inst.b.dequantize(), m, n, k);
        for (x, y) in c.iter().zip(&expected) {
            assert!((x - y).abs() < 1e-4, "{x} vs {y}");
        }
    }
}

#[test]
fn int8_batch_pooled_matches_sequential() {
    let shape = ProblemShape::new(1, 300, 160, 4, 64, ComputeType::Int8);
    let dispatcher = QNBitGemmDispatcher::new();
    let mut batch = make_batch(5, 1, 300, 160, 64);
    let expected = run(&dispatcher, &shape, &mut batch, None);
    assert!(expected.iter().flatten().all(|v| v.is_finite()));
    for threads in [1, 4, 16] {
        let mut batch = make_batch(5, 1, 300, 160, 64);
        assert_eq!(run(&dispatcher, &shape, &mut batch, Some(threads)), expected);
    }
}

#[test]
fn empty_dimensions_leave_output_untouched() {
    let shape = ProblemShape::new(3, 0, 32, 4, 32, ComputeType::Fp32);
    let mut batch = make_batch(2, 3, 0, 32, 32);
    let out = run(&QNBitGemmDispatcher::new(), &shape, &mut batch, Some(4));
    assert!(out.iter().all(Vec::is_empty));

    let shape = ProblemShape::new(2, 4, 0, 4, 32, ComputeType::Fp32);
    let mut batch = make_batch(1, 2, 4, 0, 32);
    let out = run(&QNBitGemmDispatcher::new(), &shape, &mut batch, Some(2));
    assert_eq!(out[0], vec![0.0; 8]);
}

#[test]
fn strided_output_keeps_padding() {
    let (m, n, k, ldc) = (4, 20, 64, 24);
    let shape = ProblemShape::new(m, n, k, 4, 32, ComputeType::Fp32);
    let mut batch = make_batch(1, m, n, k, 32);
    let inst = &mut batch[0];
    let mut c = vec![-7.0f32; (m - 1) * ldc + n];
    let pool = ThreadPoolBuilder::new().num_threads(4).build().unwrap();
    let mut params = [DataParams::new(&inst.a, k, inst.b.view(), &mut c, ldc)];
    QNBitGemmDispatcher::new().run_batch(&shape, &mut params, None, Some(&pool));

    let expected = reference_matmul(&inst.a, &inst.b.dequantize(), m, n, k);
    for r in 0..m {
        for col in 0..n {
            assert!((c[r * ldc + col] - expected[r * n + col]).abs() < 1e-4);
        }
        if r + 1 < m {
            assert!(c[r * ldc + n..(r + 1) * ldc].iter().all(|&v| v == -7.0));
        }
    }
}
