//! Arena-based control-flow graph of typed, SSA-like instructions.
//!
//! Blocks and instructions live in per-graph arenas and refer to each other
//! by [`BlockId`] / [`InstId`] indices, so cyclic structure (phis feeding
//! loop headers, blocks listing phis that reference them back) needs no
//! shared ownership.

pub mod block;
pub mod dominators;
pub mod dump;
pub mod graph;
pub mod inst;
pub mod loops;
pub mod types;

pub use block::{BasicBlock, BlockFlags, BlockId, Edge, INVALID_PC};
pub use dominators::DominatorTree;
pub use graph::Graph;
pub use inst::{Inst, InstId, InstKind, IrOpcode};
pub use loops::LoopInfo;
pub use types::{ConditionCode, ConstValue, DataType};
