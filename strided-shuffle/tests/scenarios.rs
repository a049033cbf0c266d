use approx::assert_relative_eq;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use strided_block::{BlockDescriptor, BlockEvaluator, BlockScratch};
use strided_shuffle::{shuffle, Shuffle, ShuffleEvaluator};
use strided_traits::{BlockShape, Layout};
use strided_view::{CpuDevice, StridedArray, TensorEvaluator, TensorEvaluatorMut};

#[test]
fn test_transpose_2d_col_major() {
    let t = StridedArray::<f64>::from_fn_col_major(&[3, 4], |idx| (10 * idx[0] + idx[1]) as f64);
    let s = shuffle(t.evaluator(), &[1, 0]).unwrap();
    assert_eq!(s.dimensions(), &[4, 3]);
    for i in 0..3 {
        for j in 0..4 {
            assert_eq!(s.coeff(j + 4 * i), (10 * i + j) as f64);
        }
    }
}

#[test]
fn test_rank3_row_major_preserves_sum() {
    let t = StridedArray::<f64>::from_fn_row_major(&[2, 3, 4], |idx| {
        (idx[0] * 12 + idx[1] * 4 + idx[2]) as f64 * 0.5 + 1.0
    });
    let s = shuffle(t.evaluator(), &[2, 0, 1]).unwrap();
    assert_eq!(s.dimensions(), &[4, 2, 3]);
    let shuffled: f64 = (0..s.size()).map(|j| s.coeff(j)).sum();
    let original: f64 = t.iter().copied().sum();
    assert_relative_eq!(shuffled, original, epsilon = 1e-12);
}

#[test]
fn test_rank4_reversal_is_bijective() {
    let t = StridedArray::<f32>::col_major(&[5, 5, 5, 5]);
    let s = ShuffleEvaluator::new(t.evaluator(), Shuffle::reversed(4)).unwrap();

    let mut rng = StdRng::seed_from_u64(0);
    for _ in 0..100 {
        let j = rng.gen_range(0..625);
        assert!(s.src_coeff(j) < 625);
    }

    let mut seen: Vec<usize> = (0..625).map(|j| s.src_coeff(j)).collect();
    seen.sort_unstable();
    assert_eq!(seen, (0..625).collect::<Vec<_>>());
}

#[test]
fn test_lvalue_writes_land_transposed() {
    let mut t = StridedArray::<f64>::col_major(&[2, 2]);
    {
        let mut s = shuffle(t.evaluator_mut(), &[1, 0]).unwrap();
        for j in 0..4 {
            *s.coeff_ref(j) = (j + 1) as f64;
        }
    }
    assert_eq!(t.data(), &[1.0, 3.0, 2.0, 4.0]);
}

#[test]
fn test_block_read_whole_tensor_is_transpose() {
    let t = StridedArray::<f64>::from_fn_col_major(&[8, 8], |idx| (idx[0] * 8 + idx[1]) as f64);
    let s = shuffle(t.evaluator(), &[1, 0]).unwrap();
    let device = CpuDevice::default();
    let mut scratch = BlockScratch::new(&device);
    let block = s.block(BlockDescriptor::new(0, &[8, 8]), &mut scratch, false).unwrap();
    let data = block.to_vec(Layout::ColMajor);
    for i in 0..8 {
        for j in 0..8 {
            assert_eq!(data[i + 8 * j], t.get(&[j, i]));
        }
    }
}

#[test]
fn test_resource_requirements_shape_hint() {
    let t = StridedArray::<f64>::col_major(&[4, 5, 6]);
    let mut req = Vec::new();

    shuffle(t.evaluator(), &[2, 1, 0]).unwrap().resource_requirements(&mut req);
    assert_eq!(req.len(), 1);
    assert_eq!(req[0].block_shape, BlockShape::UniformAllDims);
    assert_eq!(req[0].block_total_size, 32 * 1024 / 8);

    req.clear();
    shuffle(t.evaluator(), &[0, 2, 1]).unwrap().resource_requirements(&mut req);
    assert_eq!(req[0].block_shape, BlockShape::SkewedInnerDims);

    // Row-major: the inner axis is the last one.
    let r = StridedArray::<f64>::row_major(&[4, 5, 6]);
    req.clear();
    shuffle(r.evaluator(), &[1, 0, 2]).unwrap().resource_requirements(&mut req);
    assert_eq!(req[0].block_shape, BlockShape::SkewedInnerDims);
    req.clear();
    shuffle(r.evaluator(), &[0, 2, 1]).unwrap().resource_requirements(&mut req);
    assert_eq!(req[0].block_shape, BlockShape::UniformAllDims);
}
