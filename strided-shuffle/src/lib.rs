//! Lazy axis permutation of strided tensors.
//!
//! A [`ShuffleEvaluator`] wraps the evaluator of a source tensor and exposes
//! the tensor with its axes reordered, without moving any data. Output axis
//! `i` is input axis `perm[i]`. Reads and writes go through
//! a precomputed stride table, so each coefficient access is a handful of
//! multiplies and reciprocal divisions.
//!
//! Bulk access goes through the block traits of `strided-block`: a block of
//! the permuted view is copied out of (or into) the source buffer with the
//! axis permutation applied during the copy.
//!
//! # Example
//!
//! ```
//! use strided_shuffle::{evaluate, Shuffle, ShuffleEvaluator};
//! use strided_view::{CpuDevice, StridedArray, TensorEvaluator};
//!
//! let a = StridedArray::<f64>::from_fn_col_major(&[2, 3], |idx| (10 * idx[0] + idx[1]) as f64);
//! let mut t = ShuffleEvaluator::new(a.evaluator(), Shuffle::new(&[1, 0]).unwrap()).unwrap();
//! assert_eq!(t.dimensions(), &[3, 2]);
//!
//! let out = evaluate(&mut t, &CpuDevice::default()).unwrap();
//! assert_eq!(out.get(&[2, 1]), 12.0);
//! ```

pub mod block;
pub mod evaluator;
pub mod executor;
pub mod lvalue;
pub mod shuffle;

pub use evaluator::ShuffleEvaluator;
pub use executor::{
    assign_blockwise, assign_coeffwise, assign_packetwise, choose_strategy, evaluate,
    evaluate_blockwise, Strategy,
};
#[cfg(feature = "parallel")]
pub use executor::assign_coeffwise_par;
pub use shuffle::Shuffle;

use strided_view::{Result, TensorEvaluator};

/// Shuffle `input` by `perm` on the default CPU device.
///
/// # Errors
/// Returns an error if `perm` is not a permutation of `0..input.rank()`.
pub fn shuffle<E: TensorEvaluator>(input: E, perm: &[usize]) -> Result<ShuffleEvaluator<E>> {
    ShuffleEvaluator::new(input, Shuffle::new(perm)?)
}
