use std::fmt;

use bitflags::bitflags;

use crate::inst::InstId;

/// PC of blocks that have no bytecode of their own.
pub const INVALID_PC: u32 = u32::MAX;

/// Index of a basic block within its graph's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub(crate) u32);

impl BlockId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BlockFlags: u16 {
        const START       = 1 << 0;
        const END         = 1 << 1;
        const TRY_BEGIN   = 1 << 2;
        const TRY_END     = 1 << 3;
        const CATCH_BEGIN = 1 << 4;
        /// Reachable from Start only through exceptional edges.
        const CATCH       = 1 << 5;
        const LOOP_HEADER = 1 << 6;
        const PREHEADER   = 1 << 7;
        /// Covered by at least one try region.
        const TRY         = 1 << 8;
    }
}

/// A control-flow edge endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Edge {
    pub block: BlockId,
    /// Try-begin/try-end to catch-begin wiring.
    pub exceptional: bool,
}

#[derive(Debug, Clone)]
pub struct BasicBlock {
    pub(crate) id: BlockId,
    pub(crate) pc: u32,
    pub(crate) end_pc: u32,
    pub(crate) flags: BlockFlags,
    pub(crate) preds: Vec<Edge>,
    pub(crate) succs: Vec<Edge>,
    pub(crate) phis: Vec<InstId>,
    pub(crate) insts: Vec<InstId>,
}

impl BasicBlock {
    pub(crate) fn new(id: BlockId, pc: u32, end_pc: u32, flags: BlockFlags) -> Self {
        Self {
            id,
            pc,
            end_pc,
            flags,
            preds: Vec::new(),
            succs: Vec::new(),
            phis: Vec::new(),
            insts: Vec::new(),
        }
    }

    #[inline]
    pub fn id(&self) -> BlockId {
        self.id
    }

    /// Offset of the first bytecode instruction, or [`INVALID_PC`].
    #[inline]
    pub fn pc(&self) -> u32 {
        self.pc
    }

    /// Offset just past the block's last bytecode instruction.
    #[inline]
    pub fn end_pc(&self) -> u32 {
        self.end_pc
    }

    #[inline]
    pub fn flags(&self) -> BlockFlags {
        self.flags
    }

    #[inline]
    pub fn is_synthetic(&self) -> bool {
        self.pc == INVALID_PC
    }

    pub fn is_start(&self) -> bool {
        self.flags.contains(BlockFlags::START)
    }

    pub fn is_end(&self) -> bool {
        self.flags.contains(BlockFlags::END)
    }

    pub fn is_try_begin(&self) -> bool {
        self.flags.contains(BlockFlags::TRY_BEGIN)
    }

    pub fn is_try_end(&self) -> bool {
        self.flags.contains(BlockFlags::TRY_END)
    }

    pub fn is_catch_begin(&self) -> bool {
        self.flags.contains(BlockFlags::CATCH_BEGIN)
    }

    pub fn is_catch(&self) -> bool {
        self.flags.contains(BlockFlags::CATCH)
    }

    pub fn is_loop_header(&self) -> bool {
        self.flags.contains(BlockFlags::LOOP_HEADER)
    }

    pub fn preds(&self) -> &[Edge] {
        &self.preds
    }

    pub fn succs(&self) -> &[Edge] {
        &self.succs
    }

    pub fn pred_blocks(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.preds.iter().map(|e| e.block)
    }

    pub fn succ_blocks(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.succs.iter().map(|e| e.block)
    }

    /// Position of `pred` in the predecessor list; phi inputs use the same order.
    pub fn pred_index(&self, pred: BlockId) -> Option<usize> {
        self.preds.iter().position(|e| e.block == pred)
    }

    pub fn phis(&self) -> &[InstId] {
        &self.phis
    }

    /// Non-phi instructions in program order.
    pub fn insts(&self) -> &[InstId] {
        &self.insts
    }

    /// Phis followed by the other instructions.
    pub fn all_insts(&self) -> impl Iterator<Item = InstId> + '_ {
        self.phis.iter().chain(&self.insts).copied()
    }
}
