//! Owned dense tensor with a runtime rank and a fixed layout.

use crate::evaluator::{ArrayEvaluator, ArrayEvaluatorMut};
use crate::strides::{compute_strides, ravel_index, total_len, unravel_index, Dims};
use crate::{Result, StridedError};
use std::ops::{Index, IndexMut};
use strided_traits::{Layout, Scalar};

/// Owned strided multidimensional array.
///
/// Storage is contiguous in `layout` order, so the flattened index of a
/// coefficient is also its position in [`StridedArray::data`].
#[derive(Clone, PartialEq)]
pub struct StridedArray<T> {
    data: Vec<T>,
    dims: Dims,
    strides: Dims,
    layout: Layout,
}

impl<T: std::fmt::Debug> std::fmt::Debug for StridedArray<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StridedArray")
            .field("dims", &self.dims)
            .field("layout", &self.layout)
            .field("data", &self.data)
            .finish()
    }
}

impl<T: Scalar> StridedArray<T> {
    /// Zero-filled array.
    pub fn zeros(dims: &[usize], layout: Layout) -> Self {
        Self {
            data: vec![T::zero(); total_len(dims)],
            dims: Dims::from_slice(dims),
            strides: compute_strides(dims, layout),
            layout,
        }
    }

    /// Zero-filled column-major array.
    pub fn col_major(dims: &[usize]) -> Self {
        Self::zeros(dims, Layout::ColMajor)
    }

    /// Zero-filled row-major array.
    pub fn row_major(dims: &[usize]) -> Self {
        Self::zeros(dims, Layout::RowMajor)
    }

    /// Build an array by calling `f` with the coordinate of every coefficient.
    pub fn from_fn(dims: &[usize], layout: Layout, mut f: impl FnMut(&[usize]) -> T) -> Self {
        let total = total_len(dims);
        let mut coords: Dims = smallvec::smallvec![0usize; dims.len()];
        let mut data = Vec::with_capacity(total);
        for j in 0..total {
            unravel_index(j, dims, layout, &mut coords);
            data.push(f(&coords));
        }
        Self {
            data,
            dims: Dims::from_slice(dims),
            strides: compute_strides(dims, layout),
            layout,
        }
    }

    pub fn from_fn_col_major(dims: &[usize], f: impl FnMut(&[usize]) -> T) -> Self {
        Self::from_fn(dims, Layout::ColMajor, f)
    }

    pub fn from_fn_row_major(dims: &[usize], f: impl FnMut(&[usize]) -> T) -> Self {
        Self::from_fn(dims, Layout::RowMajor, f)
    }

    /// Wrap an existing buffer laid out contiguously in `layout` order.
    ///
    /// # Errors
    /// Returns [`StridedError::LengthMismatch`] if `data` does not hold
    /// exactly one coefficient per index.
    pub fn from_vec(data: Vec<T>, dims: &[usize], layout: Layout) -> Result<Self> {
        let expected = total_len(dims);
        if data.len() != expected {
            return Err(StridedError::LengthMismatch {
                expected,
                got: data.len(),
            });
        }
        Ok(Self {
            data,
            dims: Dims::from_slice(dims),
            strides: compute_strides(dims, layout),
            layout,
        })
    }

    /// Coefficient at a coordinate.
    ///
    /// # Panics
    /// Panics if the coordinate is out of bounds.
    #[inline]
    pub fn get(&self, indices: &[usize]) -> T {
        self.data[self.checked_offset(indices)]
    }

    /// Overwrite the coefficient at a coordinate.
    ///
    /// # Panics
    /// Panics if the coordinate is out of bounds.
    #[inline]
    pub fn set(&mut self, indices: &[usize], value: T) {
        let idx = self.checked_offset(indices);
        self.data[idx] = value;
    }

    /// Read-only evaluator over this array.
    pub fn evaluator(&self) -> ArrayEvaluator<'_, T> {
        ArrayEvaluator::from_parts(&self.data, &self.dims, self.layout)
    }

    /// Read-write evaluator over this array.
    pub fn evaluator_mut(&mut self) -> ArrayEvaluatorMut<'_, T> {
        ArrayEvaluatorMut::from_parts(&mut self.data, &self.dims, self.layout)
    }
}

impl<T> StridedArray<T> {
    #[inline]
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    #[inline]
    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    #[inline]
    pub fn layout(&self) -> Layout {
        self.layout
    }

    #[inline]
    pub fn ndim(&self) -> usize {
        self.dims.len()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Coefficients in flattened (layout) order.
    #[inline]
    pub fn data(&self) -> &[T] {
        &self.data
    }

    #[inline]
    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn into_vec(self) -> Vec<T> {
        self.data
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.data.iter()
    }

    fn checked_offset(&self, indices: &[usize]) -> usize {
        assert_eq!(indices.len(), self.dims.len(), "rank mismatch");
        for (&i, &d) in indices.iter().zip(self.dims.iter()) {
            assert!(i < d, "index out of bounds");
        }
        ravel_index(indices, &self.strides)
    }
}

impl<T> Index<&[usize]> for StridedArray<T> {
    type Output = T;

    fn index(&self, indices: &[usize]) -> &T {
        &self.data[self.checked_offset(indices)]
    }
}

impl<T> IndexMut<&[usize]> for StridedArray<T> {
    fn index_mut(&mut self, indices: &[usize]) -> &mut T {
        let idx = self.checked_offset(indices);
        &mut self.data[idx]
    }
}
