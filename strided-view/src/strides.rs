//! Stride construction and flattened-index utilities.

use smallvec::SmallVec;
use strided_traits::Layout;

/// Per-axis table, inline up to rank 8.
pub type Dims = SmallVec<[usize; 8]>;

/// Compute column-major strides (first index varies fastest).
pub fn col_major_strides(dims: &[usize]) -> Dims {
    let rank = dims.len();
    let mut strides: Dims = smallvec::smallvec![1usize; rank];
    for i in 1..rank {
        strides[i] = strides[i - 1] * dims[i - 1];
    }
    strides
}

/// Compute row-major strides (last index varies fastest).
pub fn row_major_strides(dims: &[usize]) -> Dims {
    let rank = dims.len();
    let mut strides: Dims = smallvec::smallvec![1usize; rank];
    for i in (0..rank.saturating_sub(1)).rev() {
        strides[i] = strides[i + 1] * dims[i + 1];
    }
    strides
}

/// Contiguous strides for `dims` under `layout`.
#[inline]
pub fn compute_strides(dims: &[usize], layout: Layout) -> Dims {
    match layout {
        Layout::ColMajor => col_major_strides(dims),
        Layout::RowMajor => row_major_strides(dims),
    }
}

/// Total number of coefficients. A rank-0 tensor holds one.
#[inline]
pub fn total_len(dims: &[usize]) -> usize {
    dims.iter().product()
}

/// Flattened index of a coordinate under the given strides.
#[inline]
pub fn ravel_index(coords: &[usize], strides: &[usize]) -> usize {
    coords.iter().zip(strides).map(|(&c, &s)| c * s).sum()
}

/// Coordinate of a flattened index, writing one entry per axis into `coords`.
pub fn unravel_index(mut index: usize, dims: &[usize], layout: Layout, coords: &mut [usize]) {
    debug_assert_eq!(dims.len(), coords.len());
    for axis in layout.inner_to_outer(dims.len()) {
        let d = dims[axis].max(1);
        coords[axis] = index % d;
        index /= d;
    }
}

/// Whether `strides` are the contiguous strides of `dims` under `layout`,
/// ignoring axes of extent 1.
pub fn is_contiguous(dims: &[usize], strides: &[usize], layout: Layout) -> bool {
    if dims.len() != strides.len() {
        return false;
    }
    let mut expected = 1usize;
    for axis in layout.inner_to_outer(dims.len()) {
        if dims[axis] <= 1 {
            continue;
        }
        if strides[axis] != expected {
            return false;
        }
        expected *= dims[axis];
    }
    true
}
