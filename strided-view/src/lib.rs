//! Owned strided arrays and the evaluator protocol for strided-rs.
//!
//! This crate sits between `strided-traits` (plain definitions) and the
//! block and shuffle crates:
//!
//! ```text
//! strided-traits -> strided-view -> strided-block -> strided-shuffle
//! ```
//!
//! # Contents
//!
//! - [`FastDivisor`] and the stride helpers in [`strides`]: division-free
//!   index arithmetic for hot loops
//! - [`StridedArray`]: owned dense tensor with a runtime rank and layout
//! - [`TensorEvaluator`] and friends: the capability traits a lazy
//!   expression node implements
//! - [`Device`] / [`CpuDevice`]: host cache sizes and temporary allocation

pub mod array;
pub mod device;
pub mod divisor;
pub mod evaluator;
pub mod strides;

pub use array::StridedArray;
pub use device::{CpuDevice, Device, DEFAULT_L1_CACHE_BYTES, DEFAULT_LLC_BYTES};
pub use divisor::FastDivisor;
pub use evaluator::{
    ArrayEvaluator, ArrayEvaluatorMut, RawAccess, RawAccessMut, TensorEvaluator,
    TensorEvaluatorMut,
};
pub use strides::{col_major_strides, compute_strides, row_major_strides, total_len, Dims};
pub use strided_traits::{Layout, OpCost, ResourceRequirements, Scalar};

/// Errors that can occur while building or evaluating strided expressions.
#[derive(Debug, thiserror::Error)]
pub enum StridedError {
    /// Ranks do not match.
    #[error("rank mismatch: {0} vs {1}")]
    RankMismatch(usize, usize),

    /// Shapes are incompatible for the operation.
    #[error("shape mismatch: {0:?} vs {1:?}")]
    ShapeMismatch(Vec<usize>, Vec<usize>),

    /// Destination and source are laid out differently.
    #[error("layout mismatch: expected {expected:?}, got {got:?}")]
    LayoutMismatch { expected: Layout, got: Layout },

    /// The axis order is not a permutation of `0..rank`.
    #[error("invalid permutation {0:?}")]
    InvalidPermutation(Vec<usize>),

    /// Invalid axis index for the given rank.
    #[error("invalid axis {axis} for rank {rank}")]
    InvalidAxis { axis: usize, rank: usize },

    /// Buffer length does not match the number of coefficients.
    #[error("length mismatch: expected {expected}, got {got}")]
    LengthMismatch { expected: usize, got: usize },

    /// The host could not provide a temporary buffer.
    #[error("failed to allocate {bytes} bytes")]
    AllocationFailed { bytes: usize },

    /// A configuration value could not be used.
    #[error("invalid configuration {key}={value:?}")]
    InvalidConfig { key: &'static str, value: String },
}

/// Result type for strided operations.
pub type Result<T> = std::result::Result<T, StridedError>;
