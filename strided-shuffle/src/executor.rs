//! Materializing an evaluator into a [`StridedArray`].
//!
//! The executor is the scheduler side of the evaluator protocol: it asks the
//! expression for its cost and block hints, picks one of three assignment
//! loops, and drives preparation and cleanup around it.

use smallvec::SmallVec;
use strided_block::{
    copy, BlockDestination, BlockEvaluator, BlockIoDst, BlockIoSrc, BlockMapper, BlockScratch,
};
use strided_traits::{merge_resource_requirements, BlockShape, Layout, ResourceRequirements, Scalar};
use strided_view::strides::{compute_strides, total_len};
use strided_view::{Device, Dims, Result, StridedArray, StridedError, TensorEvaluator};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Minimum number of coefficients before parallel assignment splits work.
#[cfg(feature = "parallel")]
const MINTHREADLENGTH: usize = 1 << 15;

/// How an assignment loop reads the evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Coefficient,
    Packet,
    Block,
}

/// Pick an assignment loop for `eval`.
///
/// Blocks win when asked for and available. Otherwise packets are used when
/// the evaluator loads them natively, or when its amortized vectorized cost
/// is strictly lower than scalar reads.
pub fn choose_strategy<E: TensorEvaluator>(eval: &E, prefer_blocks: bool) -> Strategy {
    let strategy = if prefer_blocks && E::BLOCK_ACCESS {
        Strategy::Block
    } else if eval.has_native_packets() || (E::PACKET_ACCESS && packet_is_cheaper(eval)) {
        Strategy::Packet
    } else {
        Strategy::Coefficient
    };
    tracing::debug!(?strategy, prefer_blocks, size = eval.size(), "assignment strategy");
    strategy
}

fn packet_is_cheaper<E: TensorEvaluator>(eval: &E) -> bool {
    let scalar = eval.cost_per_coeff(false).total_cost(1.0, 1.0, 1.0);
    let vector = eval.cost_per_coeff(true).total_cost(1.0, 1.0, 1.0);
    vector < scalar
}

fn check_destination<T: Scalar, E: TensorEvaluator<Scalar = T>>(
    dst: &StridedArray<T>,
    eval: &E,
) -> Result<()> {
    if dst.dims() != eval.dimensions() {
        return Err(StridedError::ShapeMismatch(
            dst.dims().to_vec(),
            eval.dimensions().to_vec(),
        ));
    }
    if dst.layout() != eval.layout() {
        return Err(StridedError::LayoutMismatch {
            expected: eval.layout(),
            got: dst.layout(),
        });
    }
    Ok(())
}

/// `dst[j] = eval.coeff(j)` for every flattened index.
///
/// # Errors
/// Returns an error if `dst` does not match the evaluator's dimensions and layout.
pub fn assign_coeffwise<T: Scalar, E: TensorEvaluator<Scalar = T>>(
    dst: &mut StridedArray<T>,
    eval: &E,
) -> Result<()> {
    check_destination(dst, eval)?;
    for (j, v) in dst.data_mut().iter_mut().enumerate() {
        *v = eval.coeff(j);
    }
    Ok(())
}

/// Assign `P` coefficients at a time, finishing the tail one by one.
///
/// # Errors
/// Returns an error if `dst` does not match the evaluator's dimensions and layout.
pub fn assign_packetwise<const P: usize, T: Scalar, E: TensorEvaluator<Scalar = T>>(
    dst: &mut StridedArray<T>,
    eval: &E,
) -> Result<()> {
    check_destination(dst, eval)?;
    let data = dst.data_mut();
    let vectorized_end = data.len() / P * P;
    for (k, chunk) in data[..vectorized_end].chunks_exact_mut(P).enumerate() {
        chunk.copy_from_slice(&eval.packet::<P>(k * P));
    }
    for (j, v) in data.iter_mut().enumerate().skip(vectorized_end) {
        *v = eval.coeff(j);
    }
    Ok(())
}

/// Assign block by block, following the expression's block hints and
/// writing each block straight into `dst`.
///
/// # Errors
/// Returns an error if `dst` does not match the evaluator's dimensions and
/// layout, or if a block buffer cannot be allocated.
pub fn assign_blockwise<T: Scalar, E: BlockEvaluator<Scalar = T>, D: Device>(
    dst: &mut StridedArray<T>,
    eval: &E,
    device: &D,
) -> Result<()> {
    check_destination(dst, eval)?;
    let layout = eval.layout();
    let dims = Dims::from_slice(eval.dimensions());
    let dst_strides = Dims::from_slice(dst.strides());

    let mut resources = Vec::new();
    eval.resource_requirements(&mut resources);
    let requirements = merge_resource_requirements(&resources).unwrap_or_else(|| {
        ResourceRequirements::new(
            BlockShape::SkewedInnerDims,
            (device.first_level_cache_size() / std::mem::size_of::<T>().max(1)).max(1),
        )
    });
    let mapper = BlockMapper::new(&dims, layout, requirements);
    let mut scratch = BlockScratch::new(device);

    for b in 0..mapper.block_count() {
        let desc = mapper.descriptor::<T>(b);
        let offset = desc.offset();
        let block_dims = Dims::from_slice(desc.dimensions());
        let destination = BlockDestination::new(dst.data_mut(), offset, &dst_strides);
        let desc = desc.with_destination(destination);
        let block = eval.block(desc, &mut scratch, true)?;
        if let Some(buf) = block.into_buffer() {
            // The evaluator ignored the destination; copy its buffer over.
            let block_strides = compute_strides(&block_dims, layout);
            let identity: SmallVec<[usize; 8]> = (0..block_dims.len()).collect();
            copy(
                BlockIoDst::new(&block_dims, &dst_strides, dst.data_mut(), offset),
                BlockIoSrc::new(&block_strides, &buf, 0),
                &identity,
                layout,
            );
            scratch.release(buf);
        }
    }
    Ok(())
}

/// Parallel [`assign_coeffwise`] over disjoint chunks of `dst`.
///
/// # Errors
/// Returns an error if `dst` does not match the evaluator's dimensions and layout.
#[cfg(feature = "parallel")]
pub fn assign_coeffwise_par<T: Scalar, E: TensorEvaluator<Scalar = T> + Sync>(
    dst: &mut StridedArray<T>,
    eval: &E,
) -> Result<()> {
    check_destination(dst, eval)?;
    let total = dst.len();
    if total <= MINTHREADLENGTH {
        return assign_coeffwise(dst, eval);
    }
    let chunk = total.div_ceil(rayon::current_num_threads()).max(MINTHREADLENGTH / 8);
    dst.data_mut()
        .par_chunks_mut(chunk)
        .enumerate()
        .for_each(|(c, part)| {
            let base = c * chunk;
            for (k, v) in part.iter_mut().enumerate() {
                *v = eval.coeff(base + k);
            }
        });
    Ok(())
}

fn assign_packet_dispatch<T: Scalar, E: TensorEvaluator<Scalar = T>>(
    dst: &mut StridedArray<T>,
    eval: &E,
) -> Result<()> {
    match T::PACKET_SIZE {
        2 => assign_packetwise::<2, T, E>(dst, eval),
        4 => assign_packetwise::<4, T, E>(dst, eval),
        8 => assign_packetwise::<8, T, E>(dst, eval),
        16 => assign_packetwise::<16, T, E>(dst, eval),
        32 => assign_packetwise::<32, T, E>(dst, eval),
        _ => assign_coeffwise(dst, eval),
    }
}

/// Prepare `eval`, materialize it into a new array and clean up.
///
/// Uses scalar or packet reads; see [`evaluate_blockwise`] for block reads.
///
/// # Errors
/// Propagates preparation errors and allocation failures from `device`.
pub fn evaluate<T: Scalar, E: TensorEvaluator<Scalar = T>, D: Device>(
    eval: &mut E,
    device: &D,
) -> Result<StridedArray<T>> {
    run(eval, device, |dst, eval| match choose_strategy(eval, false) {
        Strategy::Packet => assign_packet_dispatch(dst, eval),
        _ => assign_coeffwise(dst, eval),
    })
}

/// [`evaluate`] for expressions with block access, assigning block by block.
///
/// # Errors
/// Propagates preparation errors and allocation failures from `device`.
pub fn evaluate_blockwise<T: Scalar, E: BlockEvaluator<Scalar = T>, D: Device>(
    eval: &mut E,
    device: &D,
) -> Result<StridedArray<T>> {
    run(eval, device, |dst, eval| match choose_strategy(eval, true) {
        Strategy::Block => assign_blockwise(dst, eval, device),
        Strategy::Packet => assign_packet_dispatch(dst, eval),
        Strategy::Coefficient => assign_coeffwise(dst, eval),
    })
}

fn run<T: Scalar, E: TensorEvaluator<Scalar = T>, D: Device>(
    eval: &mut E,
    device: &D,
    assign: impl FnOnce(&mut StridedArray<T>, &E) -> Result<()>,
) -> Result<StridedArray<T>> {
    let dims = Dims::from_slice(eval.dimensions());
    let layout: Layout = eval.layout();
    let mut out = StridedArray::from_vec(device.allocate(total_len(&dims))?, &dims, layout)?;
    let result = eval
        .eval_subexprs_if_needed(Some(out.data_mut()))
        .and_then(|needs_assign| if needs_assign { assign(&mut out, eval) } else { Ok(()) });
    eval.cleanup();
    result.map(|()| out)
}
