//! Block resource hints reported by evaluators.

/// Preferred shape of the blocks a scheduler cuts an expression into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockShape {
    /// Roughly equal extent along every axis.
    UniformAllDims,
    /// Fill the inner axes first, leaving outer axes short.
    SkewedInnerDims,
}

/// Block shape and size budget one evaluator asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceRequirements {
    pub block_shape: BlockShape,
    /// Maximum number of coefficients per block.
    pub block_total_size: usize,
}

impl ResourceRequirements {
    pub fn new(block_shape: BlockShape, block_total_size: usize) -> Self {
        Self {
            block_shape,
            block_total_size,
        }
    }
}

/// Merge the requirements reported by every node of an expression.
///
/// Any skewed request wins over uniform, and the largest size budget wins.
/// Returns `None` when nothing was reported.
pub fn merge_resource_requirements(
    resources: &[ResourceRequirements],
) -> Option<ResourceRequirements> {
    let first = resources.first()?;
    let mut merged = *first;
    for r in &resources[1..] {
        if r.block_shape == BlockShape::SkewedInnerDims {
            merged.block_shape = BlockShape::SkewedInnerDims;
        }
        merged.block_total_size = merged.block_total_size.max(r.block_total_size);
    }
    Some(merged)
}
