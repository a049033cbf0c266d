//! Block-wise bulk access for strided evaluators.
//!
//! Schedulers that evaluate an expression block by block use this crate to
//! describe blocks ([`BlockDescriptor`]), hold their data
//! ([`MaterializedBlock`], [`BlockScratch`]), and move data between blocks
//! and tensors with [`io::copy`], which permutes axes while it copies.
//!
//! # Dependency graph
//!
//! ```text
//! strided-view -> strided-block -> strided-shuffle
//! ```

pub mod descriptor;
pub mod evaluator;
pub mod io;
pub mod mapper;
pub mod storage;

pub use descriptor::{BlockDescriptor, BlockDestination};
pub use evaluator::{BlockEvaluator, BlockWriter};
pub use io::{copy, BlockIoDst, BlockIoSrc, BLOCK_IO_TILE};
pub use mapper::BlockMapper;
pub use storage::{
    with_block_data, BlockExpr, BlockKind, BlockScratch, MaterializedBlock, TensorBlock,
};
