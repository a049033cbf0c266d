//! Rectangular block requests.

use strided_view::strides::total_len;
use strided_view::Dims;

/// Caller-owned memory a block may be written into directly.
///
/// `offset` is the position of the block origin in `data`, and `strides`
/// are the per-axis strides of `data` seen from the block.
#[derive(Debug)]
pub struct BlockDestination<'a, T> {
    pub(crate) data: &'a mut [T],
    pub(crate) offset: usize,
    pub(crate) strides: Dims,
}

impl<'a, T> BlockDestination<'a, T> {
    pub fn new(data: &'a mut [T], offset: usize, strides: &[usize]) -> Self {
        Self {
            data,
            offset,
            strides: Dims::from_slice(strides),
        }
    }

    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }

    #[inline]
    pub fn strides(&self) -> &[usize] {
        &self.strides
    }
}

/// A block request: origin in the flattened index space of the expression
/// and the extent along each axis.
#[derive(Debug)]
pub struct BlockDescriptor<'a, T> {
    offset: usize,
    dims: Dims,
    destination: Option<BlockDestination<'a, T>>,
}

impl<T> BlockDescriptor<'static, T> {
    pub fn new(offset: usize, dims: &[usize]) -> Self {
        Self {
            offset,
            dims: Dims::from_slice(dims),
            destination: None,
        }
    }
}

impl<'a, T> BlockDescriptor<'a, T> {
    /// Attach memory the block may be materialized into.
    pub fn with_destination<'b>(
        self,
        destination: BlockDestination<'b, T>,
    ) -> BlockDescriptor<'b, T> {
        BlockDescriptor {
            offset: self.offset,
            dims: self.dims,
            destination: Some(destination),
        }
    }

    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }

    #[inline]
    pub fn dimensions(&self) -> &[usize] {
        &self.dims
    }

    #[inline]
    pub fn dimension(&self, axis: usize) -> usize {
        self.dims[axis]
    }

    #[inline]
    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Number of coefficients in the block.
    #[inline]
    pub fn size(&self) -> usize {
        total_len(&self.dims)
    }

    #[inline]
    pub fn has_destination(&self) -> bool {
        self.destination.is_some()
    }

    pub(crate) fn into_parts(self) -> (Dims, Option<BlockDestination<'a, T>>) {
        (self.dims, self.destination)
    }
}
