//! Read side of the shuffle: index remapping, packets, cost and block hints.

use crate::shuffle::Shuffle;
use smallvec::SmallVec;
use strided_traits::{BlockShape, Layout, OpCost, ResourceRequirements, Scalar};
use strided_view::strides::compute_strides;
use strided_view::{CpuDevice, Device, Dims, FastDivisor, Result, StridedError, TensorEvaluator};

/// Lazy view of an input expression with its axes permuted.
///
/// Owns its stride tables; the input evaluator is held by value and is
/// expected to borrow (not own) the source data.
#[derive(Debug, Clone)]
pub struct ShuffleEvaluator<E, D = CpuDevice> {
    pub(crate) input: E,
    pub(crate) device: D,
    pub(crate) shuffle: Shuffle,
    pub(crate) layout: Layout,
    /// Output dimensions, `dims[i] = input_dims[shuffle[i]]`.
    dims: Dims,
    /// Input strides in input axis order.
    pub(crate) unshuffled_input_strides: Dims,
    /// Input strides addressed by output axis.
    input_strides: Dims,
    output_strides: Dims,
    fast_output_strides: SmallVec<[FastDivisor; 8]>,
}

impl<E: TensorEvaluator> ShuffleEvaluator<E> {
    /// Shuffle `input` on the default CPU device.
    ///
    /// # Errors
    /// Returns [`StridedError::RankMismatch`] if `shuffle` and `input` have
    /// different ranks.
    pub fn new(input: E, shuffle: Shuffle) -> Result<Self> {
        Self::with_device(input, shuffle, CpuDevice::default())
    }
}

impl<E: TensorEvaluator, D: Device> ShuffleEvaluator<E, D> {
    /// Shuffle `input`, taking cache sizes and temporaries from `device`.
    ///
    /// # Errors
    /// Returns [`StridedError::RankMismatch`] if `shuffle` and `input` have
    /// different ranks.
    pub fn with_device(input: E, shuffle: Shuffle, device: D) -> Result<Self> {
        let rank = input.rank();
        if shuffle.rank() != rank {
            return Err(StridedError::RankMismatch(shuffle.rank(), rank));
        }
        let layout = input.layout();
        let dims = shuffle.apply(input.dimensions());
        let unshuffled_input_strides = compute_strides(input.dimensions(), layout);
        let input_strides: Dims = shuffle
            .as_slice()
            .iter()
            .map(|&p| unshuffled_input_strides[p])
            .collect();
        let output_strides = compute_strides(&dims, layout);
        // Strides collapse to 0 past an empty axis; no index is ever divided then.
        let fast_output_strides = output_strides
            .iter()
            .map(|&s| FastDivisor::new(s.max(1)))
            .collect();

        tracing::debug!(
            rank,
            is_identity = shuffle.is_identity(),
            ?layout,
            perm = ?shuffle.as_slice(),
            "shuffle evaluator"
        );

        Ok(Self {
            input,
            device,
            shuffle,
            layout,
            dims,
            unshuffled_input_strides,
            input_strides,
            output_strides,
            fast_output_strides,
        })
    }

    /// Flattened input index of flattened output index `index`.
    #[inline]
    pub fn src_coeff(&self, index: usize) -> usize {
        let rank = self.dims.len();
        if rank == 0 {
            return index;
        }
        let mut input_index = 0;
        let mut rem = index;
        match self.layout {
            Layout::ColMajor => {
                for i in (1..rank).rev() {
                    let q = self.fast_output_strides[i].divide(rem);
                    input_index += q * self.input_strides[i];
                    rem -= q * self.output_strides[i];
                }
                input_index + rem * self.input_strides[0]
            }
            Layout::RowMajor => {
                for i in 0..rank - 1 {
                    let q = self.fast_output_strides[i].divide(rem);
                    input_index += q * self.input_strides[i];
                    rem -= q * self.output_strides[i];
                }
                input_index + rem * self.input_strides[rank - 1]
            }
        }
    }

    #[inline]
    pub fn is_identity(&self) -> bool {
        self.shuffle.is_identity()
    }

    #[inline]
    pub fn shuffle(&self) -> &Shuffle {
        &self.shuffle
    }

    #[inline]
    pub fn input(&self) -> &E {
        &self.input
    }

    #[inline]
    pub fn device(&self) -> &D {
        &self.device
    }

    /// Input strides indexed by output axis.
    #[inline]
    pub fn input_strides(&self) -> &[usize] {
        &self.input_strides
    }

    #[inline]
    pub fn output_strides(&self) -> &[usize] {
        &self.output_strides
    }

    pub fn into_input(self) -> E {
        self.input
    }
}

impl<E: TensorEvaluator, D: Device> TensorEvaluator for ShuffleEvaluator<E, D> {
    type Scalar = E::Scalar;

    const PACKET_ACCESS: bool = <E::Scalar as Scalar>::PACKET_SIZE > 1;
    const BLOCK_ACCESS: bool = E::RAW_ACCESS;
    const RAW_ACCESS: bool = false;

    #[inline]
    fn dimensions(&self) -> &[usize] {
        &self.dims
    }

    #[inline]
    fn layout(&self) -> Layout {
        self.layout
    }

    #[inline]
    fn coeff(&self, index: usize) -> E::Scalar {
        if self.is_identity() {
            self.input.coeff(index)
        } else {
            self.input.coeff(self.src_coeff(index))
        }
    }

    /// Only the identity forwards packets to the input; any other
    /// permutation gathers.
    #[inline]
    fn has_native_packets(&self) -> bool {
        self.is_identity() && self.input.has_native_packets()
    }

    #[inline]
    fn packet<const P: usize>(&self, index: usize) -> [E::Scalar; P] {
        debug_assert!(index + P <= self.size(), "packet out of range");
        if self.has_native_packets() {
            self.input.packet::<P>(index)
        } else {
            std::array::from_fn(|i| self.coeff(index + i))
        }
    }

    fn eval_subexprs_if_needed(&mut self, _dest: Option<&mut [E::Scalar]>) -> Result<bool> {
        self.input.eval_subexprs_if_needed(None)?;
        Ok(true)
    }

    fn eval_subexprs_if_needed_async<F>(&mut self, done: F)
    where
        F: FnOnce(Result<bool>) + Send + 'static,
    {
        self.input
            .eval_subexprs_if_needed_async(move |ready| done(ready.map(|_| true)));
    }

    fn cleanup(&mut self) {
        self.input.cleanup();
    }

    fn cost_per_coeff(&self, vectorized: bool) -> OpCost {
        let compute = if self.is_identity() {
            OpCost::INDEX_ADD_COST
        } else {
            let per_axis = 2.0 * OpCost::INDEX_ADD_COST
                + 2.0 * OpCost::INDEX_MUL_COST
                + OpCost::INDEX_DIV_COST;
            self.rank() as f64 * per_axis
        };
        self.input.cost_per_coeff(vectorized)
            + OpCost::new(
                0.0,
                0.0,
                compute,
                self.is_identity(),
                <E::Scalar as Scalar>::PACKET_SIZE,
            )
    }

    fn resource_requirements(&self, resources: &mut Vec<ResourceRequirements>) {
        let rank = self.rank();
        let inner = self.layout.inner_axis(rank);
        let shape = if rank > 0 && self.shuffle[inner] != inner {
            BlockShape::UniformAllDims
        } else {
            BlockShape::SkewedInnerDims
        };
        let scalar_bytes = std::mem::size_of::<E::Scalar>().max(1);
        let size = (self.device.first_level_cache_size() / scalar_bytes).max(1);
        resources.push(ResourceRequirements::new(shape, size));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strided_view::StridedArray;

    #[test]
    fn test_dimensions_are_permuted() {
        let a = StridedArray::<f64>::col_major(&[2, 3, 4]);
        let s = ShuffleEvaluator::new(a.evaluator(), Shuffle::new(&[2, 0, 1]).unwrap()).unwrap();
        assert_eq!(s.dimensions(), &[4, 2, 3]);
        assert_eq!(s.size(), 24);
        assert_eq!(s.layout(), Layout::ColMajor);
    }

    #[test]
    fn test_stride_tables_col_major() {
        let a = StridedArray::<f64>::col_major(&[2, 3, 4]);
        let s = ShuffleEvaluator::new(a.evaluator(), Shuffle::new(&[2, 0, 1]).unwrap()).unwrap();
        assert_eq!(s.unshuffled_input_strides.as_slice(), &[1, 2, 6]);
        assert_eq!(s.input_strides(), &[6, 1, 2]);
        assert_eq!(s.output_strides(), &[1, 4, 8]);
    }

    #[test]
    fn test_stride_tables_row_major() {
        let a = StridedArray::<f64>::row_major(&[2, 3, 4]);
        let s = ShuffleEvaluator::new(a.evaluator(), Shuffle::new(&[2, 0, 1]).unwrap()).unwrap();
        assert_eq!(s.unshuffled_input_strides.as_slice(), &[12, 4, 1]);
        assert_eq!(s.input_strides(), &[1, 12, 4]);
        assert_eq!(s.output_strides(), &[6, 3, 1]);
    }

    #[test]
    fn test_rank_mismatch() {
        let a = StridedArray::<f64>::col_major(&[2, 3]);
        let perm = Shuffle::new(&[0, 1, 2]).unwrap();
        let err = ShuffleEvaluator::new(a.evaluator(), perm).unwrap_err();
        assert!(matches!(err, StridedError::RankMismatch(3, 2)));
    }

    #[test]
    fn test_src_coeff_matches_unravel() {
        use strided_view::strides::{ravel_index, unravel_index};
        for layout in [Layout::ColMajor, Layout::RowMajor] {
            let a = StridedArray::<f32>::zeros(&[3, 4, 5], layout);
            let perm = Shuffle::new(&[1, 2, 0]).unwrap();
            let s = ShuffleEvaluator::new(a.evaluator(), perm).unwrap();
            let mut coords = [0usize; 3];
            for j in 0..s.size() {
                unravel_index(j, s.dimensions(), layout, &mut coords);
                assert_eq!(s.src_coeff(j), ravel_index(&coords, s.input_strides()));
            }
        }
    }

    #[test]
    fn test_rank_zero() {
        let a = StridedArray::<f64>::from_vec(vec![3.5], &[], Layout::ColMajor).unwrap();
        let s = ShuffleEvaluator::new(a.evaluator(), Shuffle::identity(0)).unwrap();
        assert_eq!(s.size(), 1);
        assert_eq!(s.src_coeff(0), 0);
        assert_eq!(s.coeff(0), 3.5);
    }

    #[test]
    fn test_empty_axis() {
        let a = StridedArray::<f64>::col_major(&[3, 0, 2]);
        let s = ShuffleEvaluator::new(a.evaluator(), Shuffle::new(&[2, 1, 0]).unwrap()).unwrap();
        assert_eq!(s.dimensions(), &[2, 0, 3]);
        assert_eq!(s.size(), 0);
    }

    #[test]
    fn test_capability_flags() {
        type ArrayEval<'a> = strided_view::ArrayEvaluator<'a, f64>;
        assert!(<ShuffleEvaluator<ArrayEval<'static>> as TensorEvaluator>::PACKET_ACCESS);
        assert!(<ShuffleEvaluator<ArrayEval<'static>> as TensorEvaluator>::BLOCK_ACCESS);
        assert!(!<ShuffleEvaluator<ArrayEval<'static>> as TensorEvaluator>::RAW_ACCESS);

        let a = StridedArray::<f64>::col_major(&[4, 4]);
        let id = ShuffleEvaluator::new(a.evaluator(), Shuffle::identity(2)).unwrap();
        assert!(id.has_native_packets());
        let t = ShuffleEvaluator::new(a.evaluator(), Shuffle::reversed(2)).unwrap();
        assert!(!t.has_native_packets());
        assert!(t.data().is_none());
    }

    #[test]
    fn test_cost_per_coeff() {
        let a = StridedArray::<f64>::col_major(&[4, 4, 4]);
        let id = ShuffleEvaluator::new(a.evaluator(), Shuffle::identity(3)).unwrap();
        let c = id.cost_per_coeff(false);
        assert_eq!(c.bytes_loaded(), 8.0);
        // Identity always amortizes its 1 add over the 4 lanes of an f64
        // packet, whichever way it is asked.
        assert_eq!(c.compute_cycles(), 0.25);
        assert_eq!(id.cost_per_coeff(true), c);

        let t = ShuffleEvaluator::new(a.evaluator(), Shuffle::new(&[2, 1, 0]).unwrap()).unwrap();
        // 3 * (2 + 2 + 24)
        assert_eq!(t.cost_per_coeff(false).compute_cycles(), 84.0);
        assert_eq!(t.cost_per_coeff(true).compute_cycles(), 84.0);
    }

    #[test]
    fn test_resource_budget_uses_device_cache() {
        let a = StridedArray::<f64>::col_major(&[4, 4]);
        let device = CpuDevice::new(4096, 1 << 20);
        let s = ShuffleEvaluator::with_device(a.evaluator(), Shuffle::identity(2), device).unwrap();
        let mut req = Vec::new();
        s.resource_requirements(&mut req);
        assert_eq!(req, vec![ResourceRequirements::new(BlockShape::SkewedInnerDims, 512)]);
    }
}
