//! Write side of the shuffle: stores propagate to the input through the
//! inverse permutation.

use crate::evaluator::ShuffleEvaluator;
use strided_view::{Device, TensorEvaluator, TensorEvaluatorMut};

impl<E: TensorEvaluatorMut, D: Device> TensorEvaluatorMut for ShuffleEvaluator<E, D> {
    #[inline]
    fn coeff_ref(&mut self, index: usize) -> &mut E::Scalar {
        let src = if self.is_identity() {
            index
        } else {
            self.src_coeff(index)
        };
        self.input.coeff_ref(src)
    }

    /// Scatters the packet one coefficient at a time; consecutive output
    /// coefficients are generally not consecutive in the input.
    #[inline]
    fn write_packet<const P: usize>(&mut self, index: usize, packet: [E::Scalar; P]) {
        debug_assert!(index + P <= self.size(), "packet out of range");
        for (i, v) in packet.into_iter().enumerate() {
            *self.coeff_ref(index + i) = v;
        }
    }
}
