use crate::block::{BasicBlock, BlockFlags, BlockId, Edge, INVALID_PC};
use crate::inst::{Inst, InstId, InstKind, IrOpcode};
use crate::types::DataType;

/// Control-flow graph of one method.
///
/// Blocks and instructions are stored in arenas. Removed instructions stay
/// in the arena as tombstones so ids remain stable; removed blocks are
/// compacted away by [`remove_unreachable`](Self::remove_unreachable),
/// which runs before any instruction is emitted.
#[derive(Debug, Clone)]
pub struct Graph {
    blocks: Vec<BasicBlock>,
    insts: Vec<Inst>,
    start: BlockId,
    end: BlockId,
    num_vregs: usize,
    num_args: usize,
}

impl Graph {
    /// An empty graph holding only the Start and End blocks.
    pub fn new(num_vregs: usize, num_args: usize) -> Self {
        let mut graph = Self {
            blocks: Vec::new(),
            insts: Vec::new(),
            start: BlockId(0),
            end: BlockId(0),
            num_vregs,
            num_args,
        };
        graph.start = graph.create_synthetic_block(BlockFlags::START);
        graph.end = graph.create_synthetic_block(BlockFlags::END);
        graph
    }

    #[inline]
    pub fn start(&self) -> BlockId {
        self.start
    }

    #[inline]
    pub fn end(&self) -> BlockId {
        self.end
    }

    #[inline]
    pub fn num_vregs(&self) -> usize {
        self.num_vregs
    }

    #[inline]
    pub fn num_args(&self) -> usize {
        self.num_args
    }

    /// Register slot of argument `index`.
    #[inline]
    pub fn arg_slot(&self, index: usize) -> usize {
        self.num_vregs + index
    }

    /// Register slot of the accumulator.
    #[inline]
    pub fn acc_slot(&self) -> usize {
        self.num_vregs + self.num_args
    }

    /// Size of a definition table: registers, arguments and the accumulator.
    #[inline]
    pub fn num_slots(&self) -> usize {
        self.num_vregs + self.num_args + 1
    }

    // ----- blocks -----

    #[inline]
    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id.index()]
    }

    #[inline]
    fn block_mut(&mut self, id: BlockId) -> &mut BasicBlock {
        &mut self.blocks[id.index()]
    }

    pub fn blocks(&self) -> impl Iterator<Item = &BasicBlock> {
        self.blocks.iter()
    }

    pub fn block_ids(&self) -> impl Iterator<Item = BlockId> + use<> {
        (0..self.blocks.len() as u32).map(BlockId)
    }

    #[inline]
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Create a block covering bytecode `[pc, end_pc)`.
    pub fn create_block(&mut self, pc: u32, end_pc: u32) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks
            .push(BasicBlock::new(id, pc, end_pc, BlockFlags::empty()));
        id
    }

    /// Create a block with no bytecode.
    pub fn create_synthetic_block(&mut self, flags: BlockFlags) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks
            .push(BasicBlock::new(id, INVALID_PC, INVALID_PC, flags));
        id
    }

    pub fn add_flags(&mut self, block: BlockId, flags: BlockFlags) {
        self.block_mut(block).flags.insert(flags);
    }

    pub fn remove_flags(&mut self, block: BlockId, flags: BlockFlags) {
        self.block_mut(block).flags.remove(flags);
    }

    pub fn has_edge(&self, from: BlockId, to: BlockId) -> bool {
        self.block(from).succs.iter().any(|e| e.block == to)
    }

    /// Add `from -> to`. A repeated edge is ignored; returns whether one was added.
    pub fn add_edge(&mut self, from: BlockId, to: BlockId, exceptional: bool) -> bool {
        if self.has_edge(from, to) {
            return false;
        }
        self.block_mut(from).succs.push(Edge {
            block: to,
            exceptional,
        });
        self.block_mut(to).preds.push(Edge {
            block: from,
            exceptional,
        });
        true
    }

    pub fn remove_edge(&mut self, from: BlockId, to: BlockId) {
        self.block_mut(from).succs.retain(|e| e.block != to);
        self.block_mut(to).preds.retain(|e| e.block != from);
    }

    /// Retarget `from -> old` to `from -> new`, keeping its position in the
    /// successor list.
    pub fn redirect_edge(&mut self, from: BlockId, old: BlockId, new: BlockId) {
        let Some(slot) = self.block(from).succs.iter().position(|e| e.block == old) else {
            return;
        };
        let exceptional = self.block(from).succs[slot].exceptional;
        if self.has_edge(from, new) {
            self.block_mut(from).succs.remove(slot);
        } else {
            self.block_mut(from).succs[slot].block = new;
            self.block_mut(new).preds.push(Edge {
                block: from,
                exceptional,
            });
        }
        self.block_mut(old).preds.retain(|e| e.block != from);
    }

    /// Insert a synthetic block in front of `target`. Normal predecessors
    /// selected by `redirect` are moved to the new block.
    pub fn insert_block_before(
        &mut self,
        target: BlockId,
        flags: BlockFlags,
        mut redirect: impl FnMut(BlockId) -> bool,
    ) -> BlockId {
        let new = self.create_synthetic_block(flags);
        let moved: Vec<BlockId> = self
            .block(target)
            .preds
            .iter()
            .filter(|e| !e.exceptional && redirect(e.block))
            .map(|e| e.block)
            .collect();
        for pred in moved {
            self.redirect_edge(pred, target, new);
        }
        self.add_edge(new, target, false);
        new
    }

    /// Insert a synthetic block after `source`, taking over its normal
    /// successors in order.
    pub fn insert_block_after(&mut self, source: BlockId, flags: BlockFlags) -> BlockId {
        let new = self.create_synthetic_block(flags);
        let (moved, kept): (Vec<Edge>, Vec<Edge>) = self
            .block(source)
            .succs
            .iter()
            .partition(|e| !e.exceptional);
        self.block_mut(source).succs = kept;
        for edge in &moved {
            for pred in &mut self.blocks[edge.block.index()].preds {
                if pred.block == source && !pred.exceptional {
                    pred.block = new;
                }
            }
        }
        self.block_mut(new).succs = moved;
        self.add_edge(source, new, false);
        new
    }

    /// Blocks reachable from Start over all edges.
    pub fn reachable(&self) -> Vec<bool> {
        let mut seen = vec![false; self.blocks.len()];
        let mut stack = vec![self.start];
        seen[self.start.index()] = true;
        while let Some(block) = stack.pop() {
            for succ in self.block(block).succ_blocks() {
                if !seen[succ.index()] {
                    seen[succ.index()] = true;
                    stack.push(succ);
                }
            }
        }
        seen
    }

    /// Physically remove every block unreachable from Start. Start and End
    /// always survive. Returns the old-to-new block id mapping; removed
    /// blocks map to `None`.
    pub fn remove_unreachable(&mut self) -> Vec<Option<BlockId>> {
        let mut keep = self.reachable();
        keep[self.start.index()] = true;
        keep[self.end.index()] = true;

        let mut remap = vec![None; self.blocks.len()];
        let mut next = 0u32;
        for (i, &k) in keep.iter().enumerate() {
            if k {
                remap[i] = Some(BlockId(next));
                next += 1;
            }
        }
        if next as usize == self.blocks.len() {
            return remap;
        }

        let dead: Vec<InstId> = self
            .blocks
            .iter()
            .filter(|b| !keep[b.id.index()])
            .flat_map(|b| b.all_insts().collect::<Vec<_>>())
            .collect();
        for inst in dead {
            self.replace_all_uses_with_nothing(inst);
            self.remove_inst(inst);
        }

        let old = std::mem::take(&mut self.blocks);
        for mut block in old {
            let Some(id) = remap[block.id.index()] else {
                continue;
            };
            block.id = id;
            let fix = |edges: &mut Vec<Edge>| {
                edges.retain_mut(|e| match remap[e.block.index()] {
                    Some(to) => {
                        e.block = to;
                        true
                    }
                    None => false,
                });
            };
            fix(&mut block.preds);
            fix(&mut block.succs);
            self.blocks.push(block);
        }
        for inst in &mut self.insts {
            if let Some(id) = remap.get(inst.block.index()).copied().flatten() {
                inst.block = id;
            }
        }
        self.start = remap[self.start.index()].unwrap_or(self.start);
        self.end = remap[self.end.index()].unwrap_or(self.end);
        remap
    }

    /// Blocks reachable from Start in reverse postorder.
    pub fn reverse_postorder(&self) -> Vec<BlockId> {
        let mut visited = vec![false; self.blocks.len()];
        let mut order = Vec::with_capacity(self.blocks.len());
        let mut stack: Vec<(BlockId, usize)> = vec![(self.start, 0)];
        visited[self.start.index()] = true;
        while let Some((block, next)) = stack.last_mut() {
            let block = *block;
            if let Some(edge) = self.block(block).succs.get(*next) {
                *next += 1;
                let succ = edge.block;
                if !visited[succ.index()] {
                    visited[succ.index()] = true;
                    stack.push((succ, 0));
                }
            } else {
                order.push(block);
                stack.pop();
            }
        }
        order.reverse();
        order
    }

    // ----- instructions -----

    #[inline]
    pub fn inst(&self, id: InstId) -> &Inst {
        &self.insts[id.index()]
    }

    /// Arena size, tombstones included.
    #[inline]
    pub fn inst_capacity(&self) -> usize {
        self.insts.len()
    }

    /// Live instructions in creation order.
    pub fn insts(&self) -> impl Iterator<Item = (InstId, &Inst)> {
        self.insts
            .iter()
            .enumerate()
            .filter(|(_, i)| !i.removed)
            .map(|(n, i)| (InstId(n as u32), i))
    }

    fn push_inst(&mut self, block: BlockId, kind: InstKind, ty: DataType, pc: u32) -> InstId {
        let id = InstId(self.insts.len() as u32);
        let inst = Inst {
            kind,
            ty,
            pc,
            block,
            users: Vec::new(),
            removed: false,
        };
        let inputs: Vec<InstId> = inst.inputs().collect();
        self.insts.push(inst);
        for input in inputs {
            self.insts[input.index()].users.push(id);
        }
        id
    }

    /// Append an operation to the end of `block`.
    pub fn append_inst(
        &mut self,
        block: BlockId,
        opcode: IrOpcode,
        ty: DataType,
        pc: u32,
        inputs: Vec<InstId>,
    ) -> InstId {
        let id = self.push_inst(block, InstKind::Op { opcode, inputs }, ty, pc);
        self.block_mut(block).insts.push(id);
        id
    }

    /// Append a SaveState capturing `inputs` held in register slots `vregs`.
    pub fn append_save_state(
        &mut self,
        block: BlockId,
        pc: u32,
        inputs: Vec<InstId>,
        vregs: Vec<usize>,
    ) -> InstId {
        debug_assert_eq!(inputs.len(), vregs.len());
        let kind = InstKind::SaveState { inputs, vregs };
        let id = self.push_inst(block, kind, DataType::Void, pc);
        self.block_mut(block).insts.push(id);
        id
    }

    /// Create an untyped phi for `vreg` with no inputs yet.
    pub fn create_phi(&mut self, block: BlockId, vreg: usize, pc: u32) -> InstId {
        let kind = InstKind::Phi {
            vreg,
            inputs: Vec::new(),
        };
        let id = self.push_inst(block, kind, DataType::NoType, pc);
        self.block_mut(block).phis.push(id);
        id
    }

    /// Create a catch-phi for `vreg` with no inputs yet.
    pub fn create_catch_phi(
        &mut self,
        block: BlockId,
        vreg: usize,
        ty: DataType,
        pc: u32,
    ) -> InstId {
        let kind = InstKind::CatchPhi {
            vreg,
            inputs: Vec::new(),
            throwers: Vec::new(),
        };
        let id = self.push_inst(block, kind, ty, pc);
        self.block_mut(block).phis.push(id);
        id
    }

    /// Append the input for the next predecessor edge of `phi`.
    pub fn append_phi_input(&mut self, phi: InstId, input: Option<InstId>) {
        if let InstKind::Phi { inputs, .. } = &mut self.insts[phi.index()].kind {
            inputs.push(input);
            if let Some(input) = input {
                self.insts[input.index()].users.push(phi);
            }
        }
    }

    /// Append `input` as contributed by the throwing instruction at `thrower`.
    pub fn append_catch_phi_input(&mut self, phi: InstId, input: InstId, thrower: u32) {
        if let InstKind::CatchPhi {
            inputs, throwers, ..
        } = &mut self.insts[phi.index()].kind
        {
            inputs.push(input);
            throwers.push(thrower);
            self.insts[input.index()].users.push(phi);
        }
    }

    pub fn set_type(&mut self, inst: InstId, ty: DataType) {
        self.insts[inst.index()].ty = ty;
    }

    /// Rewrite every use of `old` to `new`.
    pub fn replace_all_uses(&mut self, old: InstId, new: InstId) {
        let mut users = std::mem::take(&mut self.insts[old.index()].users);
        users.sort_unstable();
        users.dedup();
        for user in users {
            let count = self.insts[user.index()].replace_input(old, new);
            for _ in 0..count {
                self.insts[new.index()].users.push(user);
            }
        }
    }

    /// Drop every use of `value` from SaveState inputs, with its register tag.
    pub fn strip_from_save_states(&mut self, value: InstId) {
        let mut users = self.insts[value.index()].users.clone();
        users.sort_unstable();
        users.dedup();
        for user in users {
            if let InstKind::SaveState { inputs, vregs } = &mut self.insts[user.index()].kind {
                let mut keep = inputs.iter().map(|&i| i != value);
                vregs.retain(|_| keep.next().unwrap_or(true));
                inputs.retain(|&i| i != value);
                self.insts[value.index()].users.retain(|&u| u != user);
            }
        }
    }

    /// Drop the input at `pos` of a SaveState.
    pub fn remove_save_state_input(&mut self, save_state: InstId, pos: usize) {
        let removed = match &mut self.insts[save_state.index()].kind {
            InstKind::SaveState { inputs, vregs } if pos < inputs.len() => {
                vregs.remove(pos);
                inputs.remove(pos)
            }
            _ => return,
        };
        let users = &mut self.insts[removed.index()].users;
        if let Some(at) = users.iter().position(|&u| u == save_state) {
            users.swap_remove(at);
        }
    }

    fn replace_all_uses_with_nothing(&mut self, inst: InstId) {
        for user in std::mem::take(&mut self.insts[inst.index()].users) {
            if let InstKind::Phi { inputs, .. } = &mut self.insts[user.index()].kind {
                for slot in inputs.iter_mut().filter(|s| **s == Some(inst)) {
                    *slot = None;
                }
            } else {
                self.strip_input(user, inst);
            }
        }
    }

    fn strip_input(&mut self, user: InstId, value: InstId) {
        match &mut self.insts[user.index()].kind {
            InstKind::Op { inputs, .. } => inputs.retain(|&i| i != value),
            InstKind::CatchPhi {
                inputs, throwers, ..
            } => {
                let mut keep = inputs.iter().map(|&i| i != value);
                throwers.retain(|_| keep.next().unwrap_or(true));
                inputs.retain(|&i| i != value);
            }
            InstKind::SaveState { inputs, vregs } => {
                let mut keep = inputs.iter().map(|&i| i != value);
                vregs.retain(|_| keep.next().unwrap_or(true));
                inputs.retain(|&i| i != value);
            }
            InstKind::Phi { .. } => {}
        }
    }

    /// Remove `inst` from its block and detach it from its inputs. The
    /// instruction must have no remaining users.
    pub fn remove_inst(&mut self, inst: InstId) {
        debug_assert!(
            self.insts[inst.index()].users.is_empty(),
            "removing {inst} which still has users"
        );
        if self.insts[inst.index()].removed {
            return;
        }
        let inputs: Vec<InstId> = self.insts[inst.index()].inputs().collect();
        for input in inputs {
            let users = &mut self.insts[input.index()].users;
            if let Some(at) = users.iter().position(|&u| u == inst) {
                users.swap_remove(at);
            }
        }
        let block = self.insts[inst.index()].block;
        let b = self.block_mut(block);
        b.phis.retain(|&i| i != inst);
        b.insts.retain(|&i| i != inst);
        let node = &mut self.insts[inst.index()];
        node.removed = true;
        node.kind = InstKind::Op {
            opcode: IrOpcode::ReturnVoid,
            inputs: Vec::new(),
        };
    }

    /// Remove a group of instructions whose remaining users all belong to
    /// the group, such as a cycle of dead phis.
    pub fn remove_inst_group(&mut self, group: &[InstId]) {
        for &inst in group {
            let inputs: Vec<InstId> = self.insts[inst.index()].inputs().collect();
            for input in inputs {
                let users = &mut self.insts[input.index()].users;
                if let Some(at) = users.iter().position(|&u| u == inst) {
                    users.swap_remove(at);
                }
            }
            match &mut self.insts[inst.index()].kind {
                InstKind::Op { inputs, .. }
                | InstKind::CatchPhi { inputs, .. }
                | InstKind::SaveState { inputs, .. } => inputs.clear(),
                InstKind::Phi { inputs, .. } => inputs.clear(),
            }
        }
        for &inst in group {
            self.remove_inst(inst);
        }
    }

    /// Position of a live instruction inside its block; phis come first.
    pub fn position_in_block(&self, inst: InstId) -> Option<usize> {
        let block = self.block(self.inst(inst).block);
        block.all_insts().position(|i| i == inst)
    }
}
