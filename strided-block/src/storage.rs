//! Block storage: where the coefficients of a requested block live.

use crate::descriptor::BlockDescriptor;
use crate::io::{copy, BlockIoDst, BlockIoSrc};
use smallvec::SmallVec;
use strided_traits::{Layout, Scalar};
use strided_view::strides::{compute_strides, is_contiguous, total_len, unravel_index};
use strided_view::{Device, Dims, Result};

/// Read-only view of a block's coefficients.
pub trait TensorBlock<T: Scalar> {
    fn dimensions(&self) -> &[usize];

    /// Coefficients in `layout` order, if they are stored that way.
    fn data(&self, layout: Layout) -> Option<&[T]>;

    /// Write every coefficient into `buf` in `layout` order.
    fn materialize_into(&self, layout: Layout, buf: &mut [T]);

    fn size(&self) -> usize {
        total_len(self.dimensions())
    }
}

/// Run `f` over the coefficients of `block` in `layout` order.
///
/// Blocks that expose no buffer in `layout` are materialized into a
/// temporary from `device`, which is handed back once `f` returns. The
/// temporary is allocated before `f` runs, so an allocation failure leaves
/// whatever `f` would write untouched.
///
/// # Errors
/// Returns [`strided_view::StridedError::AllocationFailed`] if the
/// temporary cannot be allocated.
pub fn with_block_data<T, B, D, R>(
    block: &B,
    layout: Layout,
    device: &D,
    f: impl FnOnce(&[T]) -> R,
) -> Result<R>
where
    T: Scalar,
    B: TensorBlock<T> + ?Sized,
    D: Device,
{
    if let Some(data) = block.data(layout) {
        return Ok(f(data));
    }
    let mut buf = device.allocate(block.size())?;
    block.materialize_into(layout, &mut buf);
    tracing::debug!(len = buf.len(), "materialized block expression");
    let out = f(&buf);
    device.deallocate(buf);
    Ok(out)
}

/// Whether a [`MaterializedBlock`] is densely packed or a strided window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Contiguous,
    Strided,
}

#[derive(Debug)]
enum BlockBuffer<'a, T> {
    Owned(Vec<T>),
    Borrowed { data: &'a mut [T], offset: usize },
}

/// A block whose coefficients are held in memory, either in a scratch
/// buffer or directly in a caller-provided destination.
#[derive(Debug)]
pub struct MaterializedBlock<'a, T> {
    dims: Dims,
    strides: Dims,
    layout: Layout,
    kind: BlockKind,
    buffer: BlockBuffer<'a, T>,
}

impl<'a, T: Scalar> MaterializedBlock<'a, T> {
    /// Choose storage for the block described by `desc`.
    ///
    /// The descriptor's destination is used when it is contiguous in
    /// `layout`, or when `allow_strided_storage` is set. Otherwise a
    /// contiguous buffer is taken from `scratch`.
    pub fn prepare_storage<D: Device>(
        desc: BlockDescriptor<'a, T>,
        layout: Layout,
        scratch: &mut BlockScratch<'_, T, D>,
        allow_strided_storage: bool,
    ) -> Result<Self> {
        let (dims, destination) = desc.into_parts();
        if let Some(dest) = destination {
            let contiguous = is_contiguous(&dims, &dest.strides, layout);
            if contiguous || allow_strided_storage {
                return Ok(Self {
                    dims,
                    strides: dest.strides,
                    layout,
                    kind: if contiguous {
                        BlockKind::Contiguous
                    } else {
                        BlockKind::Strided
                    },
                    buffer: BlockBuffer::Borrowed {
                        data: dest.data,
                        offset: dest.offset,
                    },
                });
            }
        }
        let buf = scratch.allocate(total_len(&dims))?;
        Ok(Self {
            strides: compute_strides(&dims, layout),
            dims,
            layout,
            kind: BlockKind::Contiguous,
            buffer: BlockBuffer::Owned(buf),
        })
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
    pub fn kind(&self) -> BlockKind {
        self.kind
    }

    /// Whether the coefficients were written straight into the descriptor's destination.
    #[inline]
    pub fn is_in_destination(&self) -> bool {
        matches!(self.buffer, BlockBuffer::Borrowed { .. })
    }

    /// Destination side of a [`copy`] that fills this block.
    pub fn io_dst(&mut self) -> BlockIoDst<'_, T> {
        let Self {
            dims,
            strides,
            buffer,
            ..
        } = self;
        match buffer {
            BlockBuffer::Owned(v) => BlockIoDst::new(dims, strides, v, 0),
            BlockBuffer::Borrowed { data, offset } => BlockIoDst::new(dims, strides, data, *offset),
        }
    }

    fn io_src(&self) -> BlockIoSrc<'_, T> {
        match &self.buffer {
            BlockBuffer::Owned(v) => BlockIoSrc::new(&self.strides, v, 0),
            BlockBuffer::Borrowed { data, offset } => BlockIoSrc::new(&self.strides, data, *offset),
        }
    }

    /// Coefficients in this block's layout order, or `None` for a strided window.
    pub fn contiguous_data(&self) -> Option<&[T]> {
        if self.kind != BlockKind::Contiguous {
            return None;
        }
        let len = total_len(&self.dims);
        match &self.buffer {
            BlockBuffer::Owned(v) => Some(&v[..len]),
            BlockBuffer::Borrowed { data, offset } => Some(&data[*offset..*offset + len]),
        }
    }

    /// Coefficients copied out in `layout` order.
    pub fn to_vec(&self, layout: Layout) -> Vec<T> {
        let mut out = vec![T::zero(); total_len(&self.dims)];
        self.materialize_into(layout, &mut out);
        out
    }

    /// Give back the scratch buffer, if the block owns one.
    pub fn into_buffer(self) -> Option<Vec<T>> {
        match self.buffer {
            BlockBuffer::Owned(v) => Some(v),
            BlockBuffer::Borrowed { .. } => None,
        }
    }
}

impl<T: Scalar> TensorBlock<T> for MaterializedBlock<'_, T> {
    #[inline]
    fn dimensions(&self) -> &[usize] {
        &self.dims
    }

    fn data(&self, layout: Layout) -> Option<&[T]> {
        if layout != self.layout && self.dims.iter().filter(|&&d| d > 1).count() > 1 {
            return None;
        }
        self.contiguous_data()
    }

    fn materialize_into(&self, layout: Layout, buf: &mut [T]) {
        let out_strides = compute_strides(&self.dims, layout);
        let identity: SmallVec<[usize; 8]> = (0..self.dims.len()).collect();
        copy(
            BlockIoDst::new(&self.dims, &out_strides, buf, 0),
            self.io_src(),
            &identity,
            layout,
        );
    }
}

/// A block defined by a function of its coordinates.
///
/// Lets callers hand arbitrary expressions to a block writer without
/// materializing them first.
pub struct BlockExpr<F> {
    dims: Dims,
    f: F,
}

impl<F> BlockExpr<F> {
    pub fn new(dims: &[usize], f: F) -> Self {
        Self {
            dims: Dims::from_slice(dims),
            f,
        }
    }
}

impl<T: Scalar, F: Fn(&[usize]) -> T> TensorBlock<T> for BlockExpr<F> {
    #[inline]
    fn dimensions(&self) -> &[usize] {
        &self.dims
    }

    fn data(&self, _layout: Layout) -> Option<&[T]> {
        None
    }

    fn materialize_into(&self, layout: Layout, buf: &mut [T]) {
        let mut coords: SmallVec<[usize; 8]> = SmallVec::from_elem(0, self.dims.len());
        for (j, slot) in buf.iter_mut().enumerate().take(total_len(&self.dims)) {
            unravel_index(j, &self.dims, layout, &mut coords);
            *slot = (self.f)(&coords);
        }
    }
}

/// Per-evaluation pool of temporary block buffers.
///
/// Buffers are obtained from the device, reused across blocks, and handed
/// back to the device on [`BlockScratch::reset`] or drop.
pub struct BlockScratch<'d, T: Scalar, D: Device> {
    device: &'d D,
    pool: Vec<Vec<T>>,
    allocations: usize,
}

impl<'d, T: Scalar, D: Device> BlockScratch<'d, T, D> {
    pub fn new(device: &'d D) -> Self {
        Self {
            device,
            pool: Vec::new(),
            allocations: 0,
        }
    }

    #[inline]
    pub fn device(&self) -> &'d D {
        self.device
    }

    /// A zeroed buffer of `len` coefficients, reusing a pooled one if it is large enough.
    pub fn allocate(&mut self, len: usize) -> Result<Vec<T>> {
        if let Some(pos) = self.pool.iter().position(|b| b.capacity() >= len) {
            let mut buf = self.pool.swap_remove(pos);
            buf.clear();
            buf.resize(len, T::zero());
            return Ok(buf);
        }
        self.allocations += 1;
        self.device.allocate(len)
    }

    /// Return a buffer to the pool.
    pub fn release(&mut self, buf: Vec<T>) {
        self.pool.push(buf);
    }

    /// Return a block's buffer to the pool, if it owns one.
    pub fn recycle(&mut self, block: MaterializedBlock<'_, T>) {
        if let Some(buf) = block.into_buffer() {
            self.release(buf);
        }
    }

    /// Hand every pooled buffer back to the device.
    pub fn reset(&mut self) {
        for buf in self.pool.drain(..) {
            self.device.deallocate(buf);
        }
    }

    /// Number of buffers requested from the device so far.
    #[inline]
    pub fn allocations(&self) -> usize {
        self.allocations
    }
}

impl<T: Scalar, D: Device> Drop for BlockScratch<'_, T, D> {
    fn drop(&mut self) {
        self.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::BlockDestination;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use strided_view::{CpuDevice, StridedError};

    /// Host device that counts the temporaries it hands out and gets back.
    #[derive(Default)]
    struct TallyDevice {
        allocated: AtomicUsize,
        returned: AtomicUsize,
        fail: bool,
    }

    impl Device for TallyDevice {
        fn first_level_cache_size(&self) -> usize {
            1024
        }

        fn last_level_cache_size(&self) -> usize {
            1 << 20
        }

        fn allocate<T: Scalar>(&self, len: usize) -> Result<Vec<T>> {
            if self.fail {
                return Err(StridedError::AllocationFailed { bytes: len });
            }
            self.allocated.fetch_add(1, Ordering::SeqCst);
            Ok(vec![T::zero(); len])
        }

        fn deallocate<T: Scalar>(&self, buf: Vec<T>) {
            self.returned.fetch_add(1, Ordering::SeqCst);
            drop(buf);
        }
    }

    #[test]
    fn test_prepare_storage_without_destination_allocates() {
        let device = CpuDevice::default();
        let mut scratch = BlockScratch::<f64, _>::new(&device);
        let block = MaterializedBlock::prepare_storage(
            BlockDescriptor::new(0, &[3, 4]),
            Layout::ColMajor,
            &mut scratch,
            false,
        )
        .unwrap();
        assert_eq!(block.kind(), BlockKind::Contiguous);
        assert!(!block.is_in_destination());
        assert_eq!(block.strides(), &[1, 3]);
        assert_eq!(scratch.allocations(), 1);
        assert_eq!(block.contiguous_data().unwrap().len(), 12);
    }

    #[test]
    fn test_prepare_storage_uses_contiguous_destination() {
        let device = CpuDevice::default();
        let mut scratch = BlockScratch::<f64, _>::new(&device);
        let mut out = vec![0.0; 20];
        let desc = BlockDescriptor::new(0, &[2, 3])
            .with_destination(BlockDestination::new(&mut out, 4, &[3, 1]));
        let block =
            MaterializedBlock::prepare_storage(desc, Layout::RowMajor, &mut scratch, false)
                .unwrap();
        assert!(block.is_in_destination());
        assert_eq!(block.kind(), BlockKind::Contiguous);
        assert_eq!(scratch.allocations(), 0);
    }

    #[test]
    fn test_prepare_storage_strided_destination() {
        let device = CpuDevice::default();
        let mut scratch = BlockScratch::<f64, _>::new(&device);

        let mut out = vec![0.0; 20];
        let desc = BlockDescriptor::new(0, &[2, 2])
            .with_destination(BlockDestination::new(&mut out, 0, &[1, 5]));
        let block =
            MaterializedBlock::prepare_storage(desc, Layout::ColMajor, &mut scratch, true)
                .unwrap();
        assert!(block.is_in_destination());
        assert_eq!(block.kind(), BlockKind::Strided);
        assert!(block.contiguous_data().is_none());

        let mut out = vec![0.0; 20];
        let desc = BlockDescriptor::new(0, &[2, 2])
            .with_destination(BlockDestination::new(&mut out, 0, &[1, 5]));
        let block =
            MaterializedBlock::prepare_storage(desc, Layout::ColMajor, &mut scratch, false)
                .unwrap();
        assert!(!block.is_in_destination());
        assert_eq!(scratch.allocations(), 1);
    }

    #[test]
    fn test_materialize_strided_window() {
        let device = CpuDevice::default();
        let mut scratch = BlockScratch::<f64, _>::new(&device);
        let mut out: Vec<f64> = (0..10).map(|x| x as f64).collect();
        let desc = BlockDescriptor::new(0, &[2, 2])
            .with_destination(BlockDestination::new(&mut out, 1, &[1, 5]));
        let block =
            MaterializedBlock::prepare_storage(desc, Layout::ColMajor, &mut scratch, true)
                .unwrap();
        assert_eq!(block.to_vec(Layout::ColMajor), vec![1.0, 2.0, 6.0, 7.0]);
        assert_eq!(block.to_vec(Layout::RowMajor), vec![1.0, 6.0, 2.0, 7.0]);
    }

    #[test]
    fn test_block_expr_materialize() {
        let expr = BlockExpr::new(&[2, 3], |c: &[usize]| (c[0] * 10 + c[1]) as f64);
        let mut buf = vec![0.0; 6];
        expr.materialize_into(Layout::RowMajor, &mut buf);
        assert_eq!(buf, vec![0.0, 1.0, 2.0, 10.0, 11.0, 12.0]);
        assert!(TensorBlock::<f64>::data(&expr, Layout::RowMajor).is_none());
        assert_eq!(TensorBlock::<f64>::size(&expr), 6);
    }

    #[test]
    fn test_scratch_reuses_buffers() {
        let device = CpuDevice::default();
        let mut scratch = BlockScratch::<f32, _>::new(&device);
        let a = scratch.allocate(64).unwrap();
        scratch.release(a);
        let b = scratch.allocate(32).unwrap();
        assert_eq!(b.len(), 32);
        assert_eq!(scratch.allocations(), 1);
        scratch.release(b);
        let _c = scratch.allocate(128).unwrap();
        assert_eq!(scratch.allocations(), 2);
    }

    #[test]
    fn test_recycle_returns_owned_buffer() {
        let device = CpuDevice::default();
        let mut scratch = BlockScratch::<f64, _>::new(&device);
        let block = MaterializedBlock::prepare_storage(
            BlockDescriptor::new(0, &[4]),
            Layout::ColMajor,
            &mut scratch,
            false,
        )
        .unwrap();
        scratch.recycle(block);
        let _again = scratch.allocate(4).unwrap();
        assert_eq!(scratch.allocations(), 1);
    }

    #[test]
    fn test_with_block_data_borrows_materialized_buffer() {
        let device = TallyDevice::default();
        let mut scratch = BlockScratch::<f64, _>::new(&device);
        let mut block = MaterializedBlock::prepare_storage(
            BlockDescriptor::new(0, &[2, 3]),
            Layout::ColMajor,
            &mut scratch,
            false,
        )
        .unwrap();
        let src: Vec<f64> = (1..=6).map(f64::from).collect();
        copy(block.io_dst(), BlockIoSrc::new(&[1, 2], &src, 0), &[0, 1], Layout::ColMajor);
        let sum = with_block_data(&block, Layout::ColMajor, &device, |d| d.iter().sum::<f64>());
        assert_eq!(sum.unwrap(), 21.0);
        // Only the scratch buffer itself came from the device.
        assert_eq!(device.allocated.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_with_block_data_expression_uses_device_temporary() {
        let device = TallyDevice::default();
        let expr = BlockExpr::new(&[2, 2], |c: &[usize]| (c[0] + 2 * c[1]) as f32);
        let seen = with_block_data(&expr, Layout::ColMajor, &device, |d| d.to_vec()).unwrap();
        assert_eq!(seen, vec![0.0, 1.0, 2.0, 3.0]);
        assert_eq!(device.allocated.load(Ordering::SeqCst), 1);
        assert_eq!(device.returned.load(Ordering::SeqCst), 1);

        let failing = TallyDevice {
            fail: true,
            ..TallyDevice::default()
        };
        let mut called = false;
        let err = with_block_data(&expr, Layout::ColMajor, &failing, |_| called = true);
        assert!(matches!(err, Err(StridedError::AllocationFailed { .. })));
        assert!(!called);
    }
}
