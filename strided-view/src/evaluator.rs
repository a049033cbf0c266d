//! Evaluator protocol for lazy tensor expressions.
//!
//! An evaluator exposes the coefficients of an expression in flattened
//! (layout) order. Capabilities are split across traits:
//!
//! - [`TensorEvaluator`]: shape, scalar and packet reads, preparation hooks,
//!   cost and block hints
//! - [`TensorEvaluatorMut`]: writable coefficients
//! - [`RawAccess`] / [`RawAccessMut`]: the expression is backed by a
//!   contiguous buffer in its own layout
//!
//! Static capability flags are associated constants so wrapping evaluators
//! can forward or override them at compile time.

use crate::strides::total_len;
use crate::{Result, StridedError};
use strided_traits::{Layout, OpCost, ResourceRequirements, Scalar};

/// Read access to the coefficients of an expression.
pub trait TensorEvaluator {
    type Scalar: Scalar;

    /// `packet` is backed by real contiguous loads.
    const PACKET_ACCESS: bool;
    /// The evaluator can produce rectangular blocks in bulk.
    const BLOCK_ACCESS: bool;
    /// [`TensorEvaluator::data`] returns the backing buffer.
    const RAW_ACCESS: bool;

    fn dimensions(&self) -> &[usize];

    fn layout(&self) -> Layout;

    #[inline]
    fn rank(&self) -> usize {
        self.dimensions().len()
    }

    /// Number of coefficients.
    #[inline]
    fn size(&self) -> usize {
        total_len(self.dimensions())
    }

    /// Coefficient at a flattened index.
    fn coeff(&self, index: usize) -> Self::Scalar;

    /// `P` consecutive coefficients starting at `index`.
    ///
    /// The default gathers them one by one. Requires `index + P <= size()`.
    #[inline]
    fn packet<const P: usize>(&self, index: usize) -> [Self::Scalar; P] {
        debug_assert!(index + P <= self.size(), "packet out of range");
        std::array::from_fn(|i| self.coeff(index + i))
    }

    /// Whether [`TensorEvaluator::packet`] is backed by contiguous loads at
    /// run time. Wrappers that only sometimes forward packets override this.
    #[inline]
    fn has_native_packets(&self) -> bool {
        Self::PACKET_ACCESS
    }

    /// Backing buffer, if the expression is materialized.
    #[inline]
    fn data(&self) -> Option<&[Self::Scalar]> {
        None
    }

    /// Prepare sub-expressions. When `dest` is given the evaluator may write
    /// its result there directly, returning `Ok(false)` to signal that no
    /// further evaluation is needed.
    fn eval_subexprs_if_needed(&mut self, _dest: Option<&mut [Self::Scalar]>) -> Result<bool> {
        Ok(true)
    }

    /// Asynchronous variant of [`TensorEvaluator::eval_subexprs_if_needed`].
    ///
    /// `done` may be invoked on any thread. The default completes inline.
    fn eval_subexprs_if_needed_async<F>(&mut self, done: F)
    where
        F: FnOnce(Result<bool>) + Send + 'static,
    {
        done(self.eval_subexprs_if_needed(None));
    }

    /// Release whatever preparation acquired.
    fn cleanup(&mut self) {}

    /// Cost of producing one coefficient.
    fn cost_per_coeff(&self, vectorized: bool) -> OpCost;

    /// Append the block shape and size this node would like.
    fn resource_requirements(&self, _resources: &mut Vec<ResourceRequirements>) {}
}

/// Write access to the coefficients of an expression.
pub trait TensorEvaluatorMut: TensorEvaluator {
    fn coeff_ref(&mut self, index: usize) -> &mut Self::Scalar;

    /// Store `P` consecutive coefficients starting at `index`.
    ///
    /// The default scatters them one by one. Requires `index + P <= size()`.
    #[inline]
    fn write_packet<const P: usize>(&mut self, index: usize, packet: [Self::Scalar; P]) {
        debug_assert!(index + P <= self.size(), "packet out of range");
        for (i, v) in packet.into_iter().enumerate() {
            *self.coeff_ref(index + i) = v;
        }
    }
}

/// Evaluators backed by a contiguous buffer in their own layout.
pub trait RawAccess: TensorEvaluator {
    fn raw_data(&self) -> &[Self::Scalar];
}

/// Evaluators backed by a writable contiguous buffer.
pub trait RawAccessMut: RawAccess + TensorEvaluatorMut {
    fn raw_data_mut(&mut self) -> &mut [Self::Scalar];
}

fn check_len(len: usize, dims: &[usize]) -> Result<()> {
    let expected = total_len(dims);
    if len != expected {
        return Err(StridedError::LengthMismatch { expected, got: len });
    }
    Ok(())
}

#[inline]
fn base_cost<T: Scalar>(vectorized: bool) -> OpCost {
    OpCost::new(
        std::mem::size_of::<T>() as f64,
        0.0,
        0.0,
        vectorized,
        T::PACKET_SIZE,
    )
}

/// Read-only evaluator over a borrowed contiguous buffer.
#[derive(Debug, Clone, Copy)]
pub struct ArrayEvaluator<'a, T> {
    data: &'a [T],
    dims: &'a [usize],
    layout: Layout,
}

impl<'a, T: Scalar> ArrayEvaluator<'a, T> {
    /// # Errors
    /// Returns [`StridedError::LengthMismatch`] if `data` does not hold one
    /// coefficient per index of `dims`.
    pub fn new(data: &'a [T], dims: &'a [usize], layout: Layout) -> Result<Self> {
        check_len(data.len(), dims)?;
        Ok(Self::from_parts(data, dims, layout))
    }

    pub(crate) fn from_parts(data: &'a [T], dims: &'a [usize], layout: Layout) -> Self {
        Self { data, dims, layout }
    }
}

impl<T: Scalar> TensorEvaluator for ArrayEvaluator<'_, T> {
    type Scalar = T;

    const PACKET_ACCESS: bool = T::PACKET_SIZE > 1;
    const BLOCK_ACCESS: bool = true;
    const RAW_ACCESS: bool = true;

    #[inline]
    fn dimensions(&self) -> &[usize] {
        self.dims
    }

    #[inline]
    fn layout(&self) -> Layout {
        self.layout
    }

    #[inline]
    fn coeff(&self, index: usize) -> T {
        self.data[index]
    }

    #[inline]
    fn packet<const P: usize>(&self, index: usize) -> [T; P] {
        let mut out = [T::zero(); P];
        out.copy_from_slice(&self.data[index..index + P]);
        out
    }

    #[inline]
    fn data(&self) -> Option<&[T]> {
        Some(self.data)
    }

    fn eval_subexprs_if_needed(&mut self, dest: Option<&mut [T]>) -> Result<bool> {
        match dest {
            Some(dest) => {
                check_len(dest.len(), self.dims)?;
                dest.copy_from_slice(self.data);
                Ok(false)
            }
            None => Ok(true),
        }
    }

    fn cost_per_coeff(&self, vectorized: bool) -> OpCost {
        base_cost::<T>(vectorized)
    }
}

impl<T: Scalar> RawAccess for ArrayEvaluator<'_, T> {
    #[inline]
    fn raw_data(&self) -> &[T] {
        self.data
    }
}

/// Read-write evaluator over a borrowed contiguous buffer.
#[derive(Debug)]
pub struct ArrayEvaluatorMut<'a, T> {
    data: &'a mut [T],
    dims: &'a [usize],
    layout: Layout,
}

impl<'a, T: Scalar> ArrayEvaluatorMut<'a, T> {
    /// # Errors
    /// Returns [`StridedError::LengthMismatch`] if `data` does not hold one
    /// coefficient per index of `dims`.
    pub fn new(data: &'a mut [T], dims: &'a [usize], layout: Layout) -> Result<Self> {
        check_len(data.len(), dims)?;
        Ok(Self::from_parts(data, dims, layout))
    }

    pub(crate) fn from_parts(data: &'a mut [T], dims: &'a [usize], layout: Layout) -> Self {
        Self { data, dims, layout }
    }
}

impl<T: Scalar> TensorEvaluator for ArrayEvaluatorMut<'_, T> {
    type Scalar = T;

    const PACKET_ACCESS: bool = T::PACKET_SIZE > 1;
    const BLOCK_ACCESS: bool = true;
    const RAW_ACCESS: bool = true;

    #[inline]
    fn dimensions(&self) -> &[usize] {
        self.dims
    }

    #[inline]
    fn layout(&self) -> Layout {
        self.layout
    }

    #[inline]
    fn coeff(&self, index: usize) -> T {
        self.data[index]
    }

    #[inline]
    fn packet<const P: usize>(&self, index: usize) -> [T; P] {
        let mut out = [T::zero(); P];
        out.copy_from_slice(&self.data[index..index + P]);
        out
    }

    #[inline]
    fn data(&self) -> Option<&[T]> {
        Some(&*self.data)
    }

    fn cost_per_coeff(&self, vectorized: bool) -> OpCost {
        base_cost::<T>(vectorized)
    }
}

impl<T: Scalar> TensorEvaluatorMut for ArrayEvaluatorMut<'_, T> {
    #[inline]
    fn coeff_ref(&mut self, index: usize) -> &mut T {
        &mut self.data[index]
    }

    #[inline]
    fn write_packet<const P: usize>(&mut self, index: usize, packet: [T; P]) {
        self.data[index..index + P].copy_from_slice(&packet);
    }
}

impl<T: Scalar> RawAccess for ArrayEvaluatorMut<'_, T> {
    #[inline]
    fn raw_data(&self) -> &[T] {
        &*self.data
    }
}

impl<T: Scalar> RawAccessMut for ArrayEvaluatorMut<'_, T> {
    #[inline]
    fn raw_data_mut(&mut self) -> &mut [T] {
        &mut *self.data
    }
}
