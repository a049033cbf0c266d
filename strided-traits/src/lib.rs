//! Shared definitions for the strided-rs evaluator crates.
//!
//! This crate holds the plain-data vocabulary that every evaluator speaks:
//! the scalar bound, the storage layout, the per-coefficient cost record and
//! the block resource hints a scheduler collects before evaluation.
//!
//! External crates can depend on `strided-traits` alone to describe their
//! own evaluators without pulling in storage or block machinery.

pub mod cost;
pub mod layout;
pub mod resource;
pub mod scalar;

pub use cost::OpCost;
pub use layout::Layout;
pub use resource::{merge_resource_requirements, BlockShape, ResourceRequirements};
pub use scalar::{Scalar, SIMD_REGISTER_BYTES};
