//! Splitting a tensor into blocks that respect a size budget.

use crate::descriptor::BlockDescriptor;
use smallvec::smallvec;
use strided_traits::{BlockShape, Layout, ResourceRequirements};
use strided_view::strides::{compute_strides, ravel_index, total_len, unravel_index};
use strided_view::Dims;

/// Tiles the index space of a tensor into blocks of at most
/// `block_total_size` coefficients, shaped by the requested [`BlockShape`].
#[derive(Debug, Clone)]
pub struct BlockMapper {
    tensor_dims: Dims,
    tensor_strides: Dims,
    layout: Layout,
    block_dims: Dims,
    block_counts: Dims,
    total_blocks: usize,
}

impl BlockMapper {
    pub fn new(dims: &[usize], layout: Layout, requirements: ResourceRequirements) -> Self {
        let block_dims = compute_block_dims(dims, layout, requirements);
        let block_counts: Dims = dims
            .iter()
            .zip(&block_dims)
            .map(|(&d, &b)| d.div_ceil(b.max(1)))
            .collect();
        let total_blocks = total_len(&block_counts);
        tracing::debug!(
            ?dims,
            block_dims = ?block_dims.as_slice(),
            total_blocks,
            "block mapper"
        );
        Self {
            tensor_dims: Dims::from_slice(dims),
            tensor_strides: compute_strides(dims, layout),
            layout,
            block_dims,
            block_counts,
            total_blocks,
        }
    }

    /// Number of blocks covering the tensor. Zero for an empty tensor.
    #[inline]
    pub fn block_count(&self) -> usize {
        self.total_blocks
    }

    /// Extent of a full (non-edge) block.
    #[inline]
    pub fn block_dims(&self) -> &[usize] {
        &self.block_dims
    }

    #[inline]
    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// Descriptor of block `block_index`, counted in layout order.
    /// Edge blocks are clipped to the tensor.
    pub fn descriptor<T>(&self, block_index: usize) -> BlockDescriptor<'static, T> {
        debug_assert!(block_index < self.total_blocks);
        let rank = self.tensor_dims.len();
        let mut coords: Dims = smallvec![0; rank];
        unravel_index(block_index, &self.block_counts, self.layout, &mut coords);
        let mut dims: Dims = smallvec![0; rank];
        for axis in 0..rank {
            coords[axis] *= self.block_dims[axis];
            dims[axis] = self.block_dims[axis].min(self.tensor_dims[axis] - coords[axis]);
        }
        BlockDescriptor::new(ravel_index(&coords, &self.tensor_strides), &dims)
    }
}

fn compute_block_dims(dims: &[usize], layout: Layout, requirements: ResourceRequirements) -> Dims {
    let rank = dims.len();
    let total = total_len(dims);
    let target = requirements.block_total_size.max(1);
    if total <= target {
        return Dims::from_slice(dims);
    }

    let mut block: Dims = smallvec![1; rank];
    match requirements.block_shape {
        BlockShape::UniformAllDims => {
            let edge = integer_root(target, rank);
            for axis in 0..rank {
                block[axis] = edge.min(dims[axis]).max(1);
            }
            // Grow inner axes into the budget left over by clipped axes.
            for axis in layout.inner_to_outer(rank) {
                if block[axis] >= dims[axis] {
                    continue;
                }
                let others = total_len(&block) / block[axis];
                let avail = target / others;
                if avail <= block[axis] {
                    break;
                }
                block[axis] = avail.min(dims[axis]);
            }
        }
        BlockShape::SkewedInnerDims => {
            let mut remaining = target;
            for axis in layout.inner_to_outer(rank) {
                block[axis] = remaining.min(dims[axis]).max(1);
                remaining = (remaining / block[axis]).max(1);
            }
        }
    }
    debug_assert!(total_len(&block) <= target);
    block
}

/// Largest `k` with `k^n <= x`.
fn integer_root(x: usize, n: usize) -> usize {
    if n <= 1 {
        return x;
    }
    let mut k = 1usize;
    while (k + 1).checked_pow(n as u32).is_some_and(|p| p <= x) {
        k += 1;
    }
    k
}
