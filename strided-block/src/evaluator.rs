//! Block-level evaluator protocol.

use crate::descriptor::BlockDescriptor;
use crate::io::{copy, BlockIoDst, BlockIoSrc};
use crate::storage::{with_block_data, BlockScratch, MaterializedBlock, TensorBlock};
use smallvec::SmallVec;
use strided_traits::Scalar;
use strided_view::strides::compute_strides;
use strided_view::{
    ArrayEvaluator, ArrayEvaluatorMut, CpuDevice, Device, Dims, RawAccess, RawAccessMut, Result,
    TensorEvaluator, TensorEvaluatorMut,
};

/// Evaluators that can produce a rectangular block of coefficients at once.
pub trait BlockEvaluator: TensorEvaluator {
    /// Materialize the block described by `desc`.
    ///
    /// `root_of_expr_ast` is set when the block goes straight to the final
    /// output, in which case writing through a strided destination is
    /// allowed.
    fn block<'a, D: Device>(
        &self,
        desc: BlockDescriptor<'a, Self::Scalar>,
        scratch: &mut BlockScratch<'_, Self::Scalar, D>,
        root_of_expr_ast: bool,
    ) -> Result<MaterializedBlock<'a, Self::Scalar>>;
}

/// Evaluators that accept a block of coefficients at once.
pub trait BlockWriter: BlockEvaluator + TensorEvaluatorMut {
    /// Store `block` at the region described by `desc`.
    fn write_block<B: TensorBlock<Self::Scalar>>(
        &mut self,
        desc: &BlockDescriptor<'_, Self::Scalar>,
        block: &B,
    ) -> Result<()>;
}

/// Read a block straight out of a contiguous buffer.
fn read_raw_block<'a, E: RawAccess, D: Device>(
    eval: &E,
    desc: BlockDescriptor<'a, E::Scalar>,
    scratch: &mut BlockScratch<'_, E::Scalar, D>,
    root_of_expr_ast: bool,
) -> Result<MaterializedBlock<'a, E::Scalar>> {
    let layout = eval.layout();
    let src_strides = compute_strides(eval.dimensions(), layout);
    let offset = desc.offset();
    let identity: SmallVec<[usize; 8]> = (0..desc.rank()).collect();
    let mut block = MaterializedBlock::prepare_storage(desc, layout, scratch, root_of_expr_ast)?;
    copy(
        block.io_dst(),
        BlockIoSrc::new(&src_strides, eval.raw_data(), offset),
        &identity,
        layout,
    );
    Ok(block)
}

impl<T: Scalar> BlockEvaluator for ArrayEvaluator<'_, T> {
    fn block<'a, D: Device>(
        &self,
        desc: BlockDescriptor<'a, T>,
        scratch: &mut BlockScratch<'_, T, D>,
        root_of_expr_ast: bool,
    ) -> Result<MaterializedBlock<'a, T>> {
        read_raw_block(self, desc, scratch, root_of_expr_ast)
    }
}

impl<T: Scalar> BlockEvaluator for ArrayEvaluatorMut<'_, T> {
    fn block<'a, D: Device>(
        &self,
        desc: BlockDescriptor<'a, T>,
        scratch: &mut BlockScratch<'_, T, D>,
        root_of_expr_ast: bool,
    ) -> Result<MaterializedBlock<'a, T>> {
        read_raw_block(self, desc, scratch, root_of_expr_ast)
    }
}

impl<T: Scalar> BlockWriter for ArrayEvaluatorMut<'_, T> {
    fn write_block<B: TensorBlock<T>>(
        &mut self,
        desc: &BlockDescriptor<'_, T>,
        block: &B,
    ) -> Result<()> {
        debug_assert_eq!(block.dimensions(), desc.dimensions());
        let layout = self.layout();
        let dims = Dims::from_slice(desc.dimensions());
        let dst_strides = compute_strides(self.dimensions(), layout);
        let block_strides = compute_strides(&dims, layout);
        let identity: SmallVec<[usize; 8]> = (0..dims.len()).collect();
        // Host buffers take their temporaries from the host device.
        with_block_data(block, layout, &CpuDevice::default(), |src| {
            copy(
                BlockIoDst::new(&dims, &dst_strides, self.raw_data_mut(), desc.offset()),
                BlockIoSrc::new(&block_strides, src, 0),
                &identity,
                layout,
            );
        })
    }
}
