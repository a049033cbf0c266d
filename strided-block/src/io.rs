//! Strided block copies with an axis permutation.
//!
//! [`copy`] moves every coefficient of a destination block from a source
//! buffer whose axes are a permutation of the destination's axes. The copy
//! is planned the way a blocked transpose is:
//!
//! 1. axes of extent 1 are dropped,
//! 2. neighbouring axes contiguous in both buffers are fused,
//! 3. the innermost destination run is copied as a slice when the source is
//!    also unit-stride there, and tiled against the source's unit-stride axis
//!    when it is not.

use smallvec::{smallvec, SmallVec};
use strided_traits::Layout;
use strided_view::strides::total_len;

/// Edge length of the square tiles used when the destination and source
/// are contiguous along different axes.
pub const BLOCK_IO_TILE: usize = 16;

/// Destination side of a block copy.
#[derive(Debug)]
pub struct BlockIoDst<'a, T> {
    dims: &'a [usize],
    strides: &'a [usize],
    data: &'a mut [T],
    offset: usize,
}

impl<'a, T> BlockIoDst<'a, T> {
    pub fn new(dims: &'a [usize], strides: &'a [usize], data: &'a mut [T], offset: usize) -> Self {
        debug_assert_eq!(dims.len(), strides.len());
        Self {
            dims,
            strides,
            data,
            offset,
        }
    }
}

/// Source side of a block copy. `strides` are indexed by source axis.
#[derive(Debug, Clone, Copy)]
pub struct BlockIoSrc<'a, T> {
    strides: &'a [usize],
    data: &'a [T],
    offset: usize,
}

impl<'a, T> BlockIoSrc<'a, T> {
    pub fn new(strides: &'a [usize], data: &'a [T], offset: usize) -> Self {
        Self {
            strides,
            data,
            offset,
        }
    }
}

/// One loop of a copy plan: trip count and the step in each buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CopyLoop {
    size: usize,
    dst_stride: usize,
    src_stride: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CopyMode {
    /// Every axis has extent 1.
    Scalar,
    /// Walk the innermost destination run; slice copy when both sides are unit-stride.
    ConstStride1,
    /// 2D tiled copy between the destination's unit-stride loop and the
    /// source loop at `src_inner` (an index into the outer loops).
    Transpose { src_inner: usize },
}

/// Copy the block described by `dst` out of `src`.
///
/// Destination axis `i` reads source axis `dst_to_src_dim_map[i]`. Returns
/// the number of coefficients copied.
pub fn copy<T: Copy>(
    dst: BlockIoDst<'_, T>,
    src: BlockIoSrc<'_, T>,
    dst_to_src_dim_map: &[usize],
    layout: Layout,
) -> usize {
    let rank = dst.dims.len();
    debug_assert_eq!(dst_to_src_dim_map.len(), rank);
    let total = total_len(dst.dims);
    if total == 0 {
        return 0;
    }

    let loops = build_loops(dst.dims, dst.strides, src.strides, dst_to_src_dim_map, layout);
    let BlockIoDst {
        data: dst_data,
        offset: dst_offset,
        ..
    } = dst;

    match plan_mode(&loops) {
        CopyMode::Scalar => {
            dst_data[dst_offset] = src.data[src.offset];
        }
        CopyMode::ConstStride1 => {
            let inner = loops[0];
            for_each_offset(&loops[1..], dst_offset, src.offset, |d, s| {
                copy_run(dst_data, src.data, d, s, inner);
            });
        }
        CopyMode::Transpose { src_inner } => {
            let a = loops[0];
            let b = loops[1 + src_inner];
            let rest: SmallVec<[CopyLoop; 8]> = loops[1..]
                .iter()
                .enumerate()
                .filter(|&(k, _)| k != src_inner)
                .map(|(_, l)| *l)
                .collect();
            for_each_offset(&rest, dst_offset, src.offset, |d, s| {
                copy_tiled(dst_data, src.data, d, s, a, b);
            });
        }
    }
    total
}

/// Order loops from the destination's innermost axis outwards, dropping
/// unit extents and fusing axes contiguous in both buffers.
fn build_loops(
    dims: &[usize],
    dst_strides: &[usize],
    src_strides: &[usize],
    dst_to_src_dim_map: &[usize],
    layout: Layout,
) -> SmallVec<[CopyLoop; 8]> {
    let mut loops: SmallVec<[CopyLoop; 8]> = SmallVec::new();
    for axis in layout.inner_to_outer(dims.len()) {
        let size = dims[axis];
        if size == 1 {
            continue;
        }
        let next = CopyLoop {
            size,
            dst_stride: dst_strides[axis],
            src_stride: src_strides[dst_to_src_dim_map[axis]],
        };
        if let Some(last) = loops.last_mut() {
            if next.dst_stride == last.dst_stride * last.size
                && next.src_stride == last.src_stride * last.size
            {
                last.size *= size;
                continue;
            }
        }
        loops.push(next);
    }
    loops
}

fn plan_mode(loops: &[CopyLoop]) -> CopyMode {
    let Some((inner, outer)) = loops.split_first() else {
        return CopyMode::Scalar;
    };
    if inner.dst_stride == 1 && inner.src_stride != 1 {
        if let Some(k) = outer.iter().position(|l| l.src_stride == 1) {
            return CopyMode::Transpose { src_inner: k };
        }
    }
    CopyMode::ConstStride1
}

/// Visit the starting offsets of every iteration of `loops` (innermost first).
fn for_each_offset(
    loops: &[CopyLoop],
    dst_offset: usize,
    src_offset: usize,
    mut f: impl FnMut(usize, usize),
) {
    let mut index: SmallVec<[usize; 8]> = smallvec![0; loops.len()];
    let (mut d, mut s) = (dst_offset, src_offset);
    loop {
        f(d, s);
        let mut level = 0;
        loop {
            let Some(l) = loops.get(level) else {
                return;
            };
            index[level] += 1;
            d += l.dst_stride;
            s += l.src_stride;
            if index[level] < l.size {
                break;
            }
            d -= l.dst_stride * l.size;
            s -= l.src_stride * l.size;
            index[level] = 0;
            level += 1;
        }
    }
}

#[inline]
fn copy_run<T: Copy>(dst: &mut [T], src: &[T], d: usize, s: usize, run: CopyLoop) {
    if run.dst_stride == 1 && run.src_stride == 1 {
        dst[d..d + run.size].copy_from_slice(&src[s..s + run.size]);
    } else {
        for k in 0..run.size {
            dst[d + k * run.dst_stride] = src[s + k * run.src_stride];
        }
    }
}

fn copy_tiled<T: Copy>(dst: &mut [T], src: &[T], d: usize, s: usize, a: CopyLoop, b: CopyLoop) {
    for jb in (0..b.size).step_by(BLOCK_IO_TILE) {
        let j_end = (jb + BLOCK_IO_TILE).min(b.size);
        for ib in (0..a.size).step_by(BLOCK_IO_TILE) {
            let i_end = (ib + BLOCK_IO_TILE).min(a.size);
            for j in jb..j_end {
                let dj = d + j * b.dst_stride;
                let sj = s + j * b.src_stride;
                for i in ib..i_end {
                    dst[dj + i] = src[sj + i * a.src_stride];
                }
            }
        }
    }
}
