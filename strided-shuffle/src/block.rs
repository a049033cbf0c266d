//! Block read and write through the shuffle.
//!
//! Both directions are a single permuting [`copy`] between a block buffer
//! laid out in output axis order and the input's raw buffer. Only inputs
//! backed by a raw buffer get these impls.

use crate::evaluator::ShuffleEvaluator;
use smallvec::smallvec;
use strided_block::{
    copy, with_block_data, BlockDescriptor, BlockEvaluator, BlockIoDst, BlockIoSrc, BlockScratch,
    BlockWriter, MaterializedBlock, TensorBlock,
};
use strided_view::strides::compute_strides;
use strided_view::{Device, Dims, RawAccess, RawAccessMut, Result, TensorEvaluator};

impl<E: RawAccess, D: Device> BlockEvaluator for ShuffleEvaluator<E, D> {
    fn block<'a, S: Device>(
        &self,
        desc: BlockDescriptor<'a, E::Scalar>,
        scratch: &mut BlockScratch<'_, E::Scalar, S>,
        root_of_expr_ast: bool,
    ) -> Result<MaterializedBlock<'a, E::Scalar>> {
        debug_assert_eq!(desc.rank(), self.rank());
        debug_assert!(desc.size() == 0 || desc.offset() < self.size());
        let src_offset = self.src_coeff(desc.offset());
        tracing::debug!(
            offset = desc.offset(),
            dims = ?desc.dimensions(),
            src_offset,
            "shuffle block read"
        );
        let mut block =
            MaterializedBlock::prepare_storage(desc, self.layout, scratch, root_of_expr_ast)?;
        copy(
            block.io_dst(),
            BlockIoSrc::new(&self.unshuffled_input_strides, self.input.raw_data(), src_offset),
            self.shuffle.as_slice(),
            self.layout,
        );
        Ok(block)
    }
}

impl<E: RawAccessMut, D: Device> BlockWriter for ShuffleEvaluator<E, D> {
    fn write_block<B: TensorBlock<E::Scalar>>(
        &mut self,
        desc: &BlockDescriptor<'_, E::Scalar>,
        block: &B,
    ) -> Result<()> {
        debug_assert_eq!(block.dimensions(), desc.dimensions());
        let rank = self.rank();
        let layout = self.layout;

        // The block's box in input axis order.
        let mut input_dims: Dims = smallvec![0; rank];
        for i in 0..rank {
            input_dims[self.shuffle[i]] = desc.dimension(i);
        }
        let block_strides = compute_strides(desc.dimensions(), layout);
        let dst_offset = self.src_coeff(desc.offset());
        tracing::debug!(
            offset = desc.offset(),
            dims = ?desc.dimensions(),
            dst_offset,
            "shuffle block write"
        );
        let input = &mut self.input;
        let input_strides = &self.unshuffled_input_strides;
        let shuffle = &self.shuffle;
        with_block_data(block, layout, &self.device, |src| {
            copy(
                BlockIoDst::new(&input_dims, input_strides, input.raw_data_mut(), dst_offset),
                BlockIoSrc::new(&block_strides, src, 0),
                shuffle.inverse(),
                layout,
            );
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::{Shuffle, ShuffleEvaluator};
    use strided_block::{
        BlockDescriptor, BlockDestination, BlockEvaluator, BlockExpr, BlockKind, BlockScratch,
        BlockWriter,
    };
    use strided_traits::Layout;
    use strided_view::{CpuDevice, StridedArray, TensorEvaluator};

    #[test]
    fn test_block_read_transpose() {
        let a = StridedArray::<f64>::from_fn_col_major(&[3, 5], |idx| {
            (idx[0] * 10 + idx[1]) as f64
        });
        let s = ShuffleEvaluator::new(a.evaluator(), Shuffle::new(&[1, 0]).unwrap()).unwrap();
        let device = CpuDevice::default();
        let mut scratch = BlockScratch::new(&device);
        // Output block at (1, 1) of extent 3x2 in the 5x3 view.
        let offset = 1 + 5;
        let block = s.block(BlockDescriptor::new(offset, &[3, 2]), &mut scratch, false).unwrap();
        assert_eq!(block.kind(), BlockKind::Contiguous);
        let expected: Vec<f64> = (0..6).map(|k| s.coeff(offset + (k % 3) + 5 * (k / 3))).collect();
        assert_eq!(block.to_vec(Layout::ColMajor), expected);
    }

    #[test]
    fn test_block_read_into_strided_destination() {
        let a = StridedArray::<f32>::from_fn_row_major(&[4, 6], |idx| (idx[0] * 6 + idx[1]) as f32);
        let s = ShuffleEvaluator::new(a.evaluator(), Shuffle::new(&[1, 0]).unwrap()).unwrap();
        let device = CpuDevice::default();
        let mut scratch = BlockScratch::new(&device);
        let mut out = StridedArray::<f32>::row_major(&[6, 4]);
        // Lower 3x4 half of the output, written in place.
        let strides = out.strides().to_vec();
        let desc = BlockDescriptor::new(12, &[3, 4])
            .with_destination(BlockDestination::new(out.data_mut(), 12, &strides));
        let block = s.block(desc, &mut scratch, true).unwrap();
        assert!(block.is_in_destination());
        drop(block);
        for r in 3..6 {
            for c in 0..4 {
                assert_eq!(out.get(&[r, c]), a.get(&[c, r]));
            }
        }
        assert_eq!(scratch.allocations(), 0);
    }

    #[test]
    fn test_write_block_from_materialized() {
        let src = StridedArray::<f64>::from_fn_col_major(&[4, 3], |idx| {
            (idx[0] + 4 * idx[1]) as f64 + 1.0
        });
        let mut dst = StridedArray::<f64>::col_major(&[3, 4]);
        let device = CpuDevice::default();
        let mut scratch = BlockScratch::new(&device);
        let block = src
            .evaluator()
            .block(BlockDescriptor::new(0, &[4, 3]), &mut scratch, false)
            .unwrap();
        {
            let perm = Shuffle::new(&[1, 0]).unwrap();
            let mut s = ShuffleEvaluator::new(dst.evaluator_mut(), perm).unwrap();
            s.write_block(&BlockDescriptor::new(0, &[4, 3]), &block).unwrap();
        }
        for i in 0..4 {
            for j in 0..3 {
                assert_eq!(dst.get(&[j, i]), src.get(&[i, j]));
            }
        }
    }

    #[test]
    fn test_write_block_expr() {
        let mut dst = StridedArray::<f64>::row_major(&[2, 3, 4]);
        {
            let perm = Shuffle::new(&[2, 0, 1]).unwrap();
            let mut s = ShuffleEvaluator::new(dst.evaluator_mut(), perm).unwrap();
            assert_eq!(s.dimensions(), &[4, 2, 3]);
            let expr = BlockExpr::new(&[4, 2, 3], |c: &[usize]| {
                (100 * c[0] + 10 * c[1] + c[2]) as f64
            });
            s.write_block(&BlockDescriptor::new(0, &[4, 2, 3]), &expr).unwrap();
        }
        // Output (k, i, j) is input (i, j, k).
        for i in 0..2 {
            for j in 0..3 {
                for k in 0..4 {
                    assert_eq!(dst.get(&[i, j, k]), (100 * k + 10 * i + j) as f64);
                }
            }
        }
    }
}
