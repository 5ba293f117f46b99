//! Definition propagation: walks blocks in reverse postorder, lowers each
//! bytecode instruction to IR and tracks, per block, which node defines
//! every register slot.

use std::collections::{HashMap, HashSet};

use abir_ir::{
    BlockId, ConditionCode, ConstValue, DataType, Graph, InstId, IrOpcode, LoopInfo,
};
use abir_isa::{BytecodeInstruction, InstructionStream, Opcode};

use crate::cfg_builder::CfgInfo;
use crate::error::BuildError;
use crate::method::{CalleeResolver, MethodDescriptor};
use crate::regions::RegionTracker;

type DefTable = Vec<Option<InstId>>;

pub(crate) struct Propagator<'a> {
    graph: &'a mut Graph,
    method: &'a MethodDescriptor<'a>,
    resolver: &'a dyn CalleeResolver,
    tracker: &'a RegionTracker,
    info: &'a CfgInfo,
    loops: &'a LoopInfo,
    /// Final table of every emitted block.
    defs: Vec<Option<DefTable>>,
    cur: DefTable,
    block: BlockId,
    constants: HashMap<ConstValue, InstId>,
    catch_phis: HashMap<BlockId, Vec<InstId>>,
    /// Loop-header and irreducible-entry phis, filled after the walk.
    placeholders: Vec<InstId>,
}

impl<'a> Propagator<'a> {
    pub(crate) fn new(
        graph: &'a mut Graph,
        method: &'a MethodDescriptor<'a>,
        resolver: &'a dyn CalleeResolver,
        tracker: &'a RegionTracker,
        info: &'a CfgInfo,
        loops: &'a LoopInfo,
    ) -> Self {
        let blocks = graph.block_count();
        let start = graph.start();
        Self {
            graph,
            method,
            resolver,
            tracker,
            info,
            loops,
            defs: vec![None; blocks],
            cur: Vec::new(),
            block: start,
            constants: HashMap::new(),
            catch_phis: HashMap::new(),
            placeholders: Vec::new(),
        }
    }

    pub(crate) fn run(mut self) -> Result<(), BuildError> {
        self.create_catch_phis();
        let end = self.graph.end();
        for block in self.graph.reverse_postorder() {
            if block == end {
                continue;
            }
            self.block = block;
            self.enter_block(block);
            self.emit_block(block)?;
            self.defs[block.index()] = Some(std::mem::take(&mut self.cur));
        }
        self.fill_placeholders();
        Ok(())
    }

    // ----- block entry -----

    fn create_catch_phis(&mut self) {
        let acc = self.graph.acc_slot();
        for &catch_begin in self.info.catch_begins.values() {
            let pc = anchor_pc(self.graph, catch_begin);
            let phis = (0..self.graph.num_slots())
                .map(|slot| {
                    // The accumulator holds the caught exception.
                    let ty = if slot == acc {
                        DataType::Reference
                    } else {
                        DataType::NoType
                    };
                    self.graph.create_catch_phi(catch_begin, slot, ty, pc)
                })
                .collect();
            self.catch_phis.insert(catch_begin, phis);
        }
    }

    fn enter_block(&mut self, block: BlockId) {
        let slots = self.graph.num_slots();
        if block == self.graph.start() {
            self.cur = vec![None; slots];
            for i in 0..self.method.num_args {
                let ty = self.method.arg_type(i);
                let param = self.graph.append_inst(
                    block,
                    IrOpcode::Parameter(i as u16),
                    ty,
                    0,
                    Vec::new(),
                );
                let slot = self.graph.arg_slot(i);
                self.cur[slot] = Some(param);
            }
            return;
        }

        if let Some(phis) = self.catch_phis.get(&block) {
            self.cur = phis.iter().copied().map(Some).collect();
            return;
        }

        let preds: Vec<BlockId> = self.graph.block(block).pred_blocks().collect();
        let visited: Vec<&DefTable> = preds
            .iter()
            .filter_map(|p| self.defs[p.index()].as_ref())
            .collect();

        if self.loops.is_header(block) {
            let seed = match self.loops.preheader(block) {
                Some(pre) => self.defs[pre.index()].clone(),
                None => None,
            }
            .unwrap_or_else(|| union(&visited, slots));
            self.cur = self.placeholder_phis(block, &seed);
            return;
        }

        if visited.len() < preds.len() || self.loops.irreducible_entries().contains(&block) {
            // Entered from a block not yet visited: irreducible flow.
            let seed = union(&visited, slots);
            self.cur = self.placeholder_phis(block, &seed);
            return;
        }

        if let [single] = visited.as_slice() {
            self.cur = (*single).clone();
            return;
        }

        let tables: Vec<DefTable> = visited.into_iter().cloned().collect();
        let pc = anchor_pc(self.graph, block);
        self.cur = vec![None; slots];
        for slot in 0..slots {
            let first = tables[0][slot];
            if tables.iter().all(|t| t[slot] == first) {
                self.cur[slot] = first;
                continue;
            }
            let phi = self.graph.create_phi(block, slot, pc);
            for table in &tables {
                self.graph.append_phi_input(phi, table[slot]);
            }
            self.cur[slot] = Some(phi);
        }
    }

    fn placeholder_phis(&mut self, block: BlockId, seed: &DefTable) -> DefTable {
        let pc = anchor_pc(self.graph, block);
        seed.iter()
            .enumerate()
            .map(|(slot, def)| {
                def.map(|_| {
                    let phi = self.graph.create_phi(block, slot, pc);
                    self.placeholders.push(phi);
                    phi
                })
            })
            .collect()
    }

    fn fill_placeholders(&mut self) {
        for phi in std::mem::take(&mut self.placeholders) {
            let inst = self.graph.inst(phi);
            let (block, Some(slot)) = (inst.block(), inst.vreg()) else {
                continue;
            };
            let preds: Vec<BlockId> = self.graph.block(block).pred_blocks().collect();
            for pred in preds {
                let input = self.defs[pred.index()].as_ref().and_then(|t| t[slot]);
                self.graph.append_phi_input(phi, input);
            }
        }
    }

    // ----- emission -----

    fn emit_block(&mut self, block: BlockId) -> Result<(), BuildError> {
        if let Some(types) = self.info.try_types.get(&block) {
            let pc = anchor_pc(self.graph, block);
            self.graph
                .append_inst(block, IrOpcode::Try(types.clone()), DataType::Void, pc, Vec::new());
        }
        let b = self.graph.block(block);
        if b.is_synthetic() {
            return Ok(());
        }
        let code = self.method.code;
        for insn in InstructionStream::range(code, b.pc(), b.end_pc()) {
            let insn = insn.map_err(|e| BuildError::from_decode(code, e))?;
            self.lower(&insn)?;
        }
        Ok(())
    }

    fn lower(&mut self, insn: &BytecodeInstruction<'_>) -> Result<(), BuildError> {
        use Opcode::*;

        let pc = insn.pc();
        let acc = self.graph.acc_slot();
        match insn.opcode() {
            Nop | Jmp | JmpWide | JmpFar => {}

            Mov | Mov64 | MovObj => {
                let (dst, src) = (self.reg(insn, 0)?, self.reg(insn, 1)?);
                self.cur[dst] = Some(self.read(src, pc)?);
            }
            Movi | MoviWide | Movi64 => {
                let dst = self.reg(insn, 0)?;
                self.cur[dst] = Some(self.constant(ConstValue::Int(self.imm(insn))));
            }
            Fmovi64 => {
                let dst = self.reg(insn, 0)?;
                self.cur[dst] = Some(self.constant(ConstValue::float(self.float_imm(insn))));
            }
            MovNull => {
                let dst = self.reg(insn, 0)?;
                self.cur[dst] = Some(self.constant(ConstValue::Null));
            }

            Lda | Lda64 | LdaObj => {
                let src = self.read(self.reg(insn, 0)?, pc)?;
                self.cur[acc] = Some(src);
            }
            Ldai | Ldai64 => {
                self.cur[acc] = Some(self.constant(ConstValue::Int(self.imm(insn))));
            }
            Fldai64 => {
                self.cur[acc] = Some(self.constant(ConstValue::float(self.float_imm(insn))));
            }
            LdaNull => self.cur[acc] = Some(self.constant(ConstValue::Null)),
            LdaStr => {
                let ss = self.throwing_prologue(pc, None);
                let id = insn.id(0).unwrap_or_default();
                let s = self.append(IrOpcode::LoadString(id), DataType::Reference, pc, vec![ss]);
                self.cur[acc] = Some(s);
            }
            Sta | Sta64 | StaObj => {
                let dst = self.reg(insn, 0)?;
                self.cur[dst] = Some(self.read(acc, pc)?);
            }

            Add2 => self.binary(insn, IrOpcode::Add, DataType::Int32)?,
            Sub2 => self.binary(insn, IrOpcode::Sub, DataType::Int32)?,
            Mul2 => self.binary(insn, IrOpcode::Mul, DataType::Int32)?,
            Add2I64 => self.binary(insn, IrOpcode::Add, DataType::Int64)?,
            Sub2I64 => self.binary(insn, IrOpcode::Sub, DataType::Int64)?,
            Mul2I64 => self.binary(insn, IrOpcode::Mul, DataType::Int64)?,
            Fadd2F64 => self.binary(insn, IrOpcode::Add, DataType::Float64)?,
            Fsub2F64 => self.binary(insn, IrOpcode::Sub, DataType::Float64)?,
            Fmul2F64 => self.binary(insn, IrOpcode::Mul, DataType::Float64)?,
            Fdiv2F64 => self.binary(insn, IrOpcode::Div, DataType::Float64)?,
            Div2 => self.checked_division(insn, IrOpcode::Div, DataType::Int32)?,
            Mod2 => self.checked_division(insn, IrOpcode::Mod, DataType::Int32)?,
            Div2I64 => self.checked_division(insn, IrOpcode::Div, DataType::Int64)?,
            Mod2I64 => self.checked_division(insn, IrOpcode::Mod, DataType::Int64)?,
            Addi | Subi => {
                let lhs = self.read(acc, pc)?;
                self.expect(lhs, DataType::Int32, pc)?;
                let rhs = self.constant(ConstValue::Int(self.imm(insn)));
                let op = if insn.opcode() == Addi {
                    IrOpcode::Add
                } else {
                    IrOpcode::Sub
                };
                let v = self.append(op, DataType::Int32, pc, vec![lhs, rhs]);
                self.cur[acc] = Some(v);
            }
            Neg | NegI64 => {
                let ty = if insn.opcode() == Neg {
                    DataType::Int32
                } else {
                    DataType::Int64
                };
                let v = self.read(acc, pc)?;
                self.expect(v, ty, pc)?;
                let neg = self.append(IrOpcode::Neg, ty, pc, vec![v]);
                self.cur[acc] = Some(neg);
            }
            Cmp64 => self.compare(insn, IrOpcode::Cmp, DataType::Int64)?,
            Fcmpl64 => self.compare(insn, IrOpcode::Fcmp, DataType::Float64)?,

            Jeqz => self.branch_zero(pc, ConditionCode::Eq, DataType::Int32)?,
            Jnez => self.branch_zero(pc, ConditionCode::Ne, DataType::Int32)?,
            Jltz => self.branch_zero(pc, ConditionCode::Lt, DataType::Int32)?,
            Jgtz => self.branch_zero(pc, ConditionCode::Gt, DataType::Int32)?,
            Jlez => self.branch_zero(pc, ConditionCode::Le, DataType::Int32)?,
            Jgez => self.branch_zero(pc, ConditionCode::Ge, DataType::Int32)?,
            JeqzObj => self.branch_zero(pc, ConditionCode::Eq, DataType::Reference)?,
            JnezObj => self.branch_zero(pc, ConditionCode::Ne, DataType::Reference)?,
            Jeq => self.branch(insn, ConditionCode::Eq)?,
            Jne => self.branch(insn, ConditionCode::Ne)?,
            Jlt => self.branch(insn, ConditionCode::Lt)?,
            Jgt => self.branch(insn, ConditionCode::Gt)?,
            Jle => self.branch(insn, ConditionCode::Le)?,
            Jge => self.branch(insn, ConditionCode::Ge)?,

            CallShort => self.call(insn)?,
            NewObj => {
                let ss = self.throwing_prologue(pc, None);
                let id = insn.id(0).unwrap_or_default();
                let dst = self.reg(insn, 0)?;
                let obj = self.append(IrOpcode::NewObject(id), DataType::Reference, pc, vec![ss]);
                self.cur[dst] = Some(obj);
            }
            Ldarr => {
                let array = self.read(self.reg(insn, 0)?, pc)?;
                let index = self.read(acc, pc)?;
                self.expect(array, DataType::Reference, pc)?;
                self.expect(index, DataType::Int32, pc)?;
                let ss = self.throwing_prologue(pc, None);
                let checked = self.append(IrOpcode::NullCheck, DataType::Reference, pc, vec![array, ss]);
                let load = self.append(IrOpcode::LoadArray, DataType::Any, pc, vec![checked, index]);
                self.cur[acc] = Some(load);
            }
            Starr => {
                let array = self.read(self.reg(insn, 0)?, pc)?;
                let index = self.read(self.reg(insn, 1)?, pc)?;
                let value = self.read(acc, pc)?;
                self.expect(array, DataType::Reference, pc)?;
                self.expect(index, DataType::Int32, pc)?;
                let ss = self.throwing_prologue(pc, None);
                let checked = self.append(IrOpcode::NullCheck, DataType::Reference, pc, vec![array, ss]);
                self.append(IrOpcode::StoreArray, DataType::Void, pc, vec![checked, index, value]);
            }

            Throw => {
                let exception = self.read(self.reg(insn, 0)?, pc)?;
                self.expect(exception, DataType::Reference, pc)?;
                let ss = self.throwing_prologue(pc, Some(exception));
                self.append(IrOpcode::Throw, DataType::Void, pc, vec![exception, ss]);
            }
            Return => self.ret(pc, DataType::Int32)?,
            Return64 => self.ret(pc, DataType::Int64)?,
            ReturnObj => self.ret(pc, DataType::Reference)?,
            ReturnVoid => {
                self.append(IrOpcode::ReturnVoid, DataType::Void, pc, Vec::new());
            }
        }
        Ok(())
    }

    // ----- lowering helpers -----

    fn append(&mut self, opcode: IrOpcode, ty: DataType, pc: u32, inputs: Vec<InstId>) -> InstId {
        self.graph.append_inst(self.block, opcode, ty, pc, inputs)
    }

    fn read(&self, slot: usize, pc: u32) -> Result<InstId, BuildError> {
        self.cur
            .get(slot)
            .copied()
            .flatten()
            .ok_or(BuildError::UnresolvedDefinition {
                pc,
                vreg: Some(slot),
            })
    }

    /// Register slot of the `n`-th register operand.
    fn reg(&self, insn: &BytecodeInstruction<'_>, n: usize) -> Result<usize, BuildError> {
        let reg = insn.vreg(n).map(usize::from);
        match reg {
            Some(r) if r < self.graph.acc_slot() => Ok(r),
            _ => Err(BuildError::UnsupportedInstruction {
                pc: insn.pc(),
                opcode: format!("{insn} (register out of range)"),
            }),
        }
    }

    fn imm(&self, insn: &BytecodeInstruction<'_>) -> i64 {
        insn.imm(0).unwrap_or_default()
    }

    fn float_imm(&self, insn: &BytecodeInstruction<'_>) -> f64 {
        insn.float_imm(0).unwrap_or_default()
    }

    /// The graph-wide constant for `value`, created in the Start block.
    fn constant(&mut self, value: ConstValue) -> InstId {
        if let Some(&c) = self.constants.get(&value) {
            return c;
        }
        let start = self.graph.start();
        let c = self
            .graph
            .append_inst(start, IrOpcode::Constant(value), value.data_type(), 0, Vec::new());
        self.constants.insert(value, c);
        c
    }

    /// A consumer expecting `ty` types an untyped phi input.
    fn expect(&mut self, input: InstId, ty: DataType, pc: u32) -> Result<(), BuildError> {
        let inst = self.graph.inst(input);
        let Some(vreg) = inst.vreg() else {
            return Ok(());
        };
        match inst.ty() {
            DataType::NoType => {
                self.graph.set_type(input, ty);
                Ok(())
            }
            t if t == ty => Ok(()),
            _ => Err(BuildError::AmbiguousPhiType { pc, vreg }),
        }
    }

    /// SaveState of the live slots, then catch-phi inputs for every handler
    /// covering `pc`. `thrown` feeds the accumulator catch-phis.
    fn throwing_prologue(&mut self, pc: u32, thrown: Option<InstId>) -> InstId {
        let (inputs, vregs): (Vec<InstId>, Vec<usize>) = self
            .cur
            .iter()
            .enumerate()
            .filter_map(|(slot, def)| def.map(|d| (d, slot)))
            .unzip();
        let ss = self.graph.append_save_state(self.block, pc, inputs, vregs);

        let acc = self.graph.acc_slot();
        let mut seen: HashSet<BlockId> = HashSet::new();
        for region in self.tracker.enumerate_covering(pc).filter(|r| r.throwing) {
            for handler in &region.handlers {
                let Some(&catch_begin) = self.info.catch_begins.get(&handler.pc) else {
                    continue;
                };
                if !seen.insert(catch_begin) {
                    continue;
                }
                let Some(phis) = self.catch_phis.get(&catch_begin) else {
                    continue;
                };
                for (slot, &phi) in phis.iter().enumerate() {
                    let def = if slot == acc { thrown } else { self.cur[slot] };
                    match def {
                        Some(def) if def != phi => {
                            self.graph.append_catch_phi_input(phi, def, pc);
                        }
                        _ => {}
                    }
                }
            }
        }
        ss
    }

    fn binary(
        &mut self,
        insn: &BytecodeInstruction<'_>,
        op: IrOpcode,
        ty: DataType,
    ) -> Result<(), BuildError> {
        let pc = insn.pc();
        let acc = self.graph.acc_slot();
        let lhs = self.read(acc, pc)?;
        let rhs = self.read(self.reg(insn, 0)?, pc)?;
        self.expect(lhs, ty, pc)?;
        self.expect(rhs, ty, pc)?;
        let v = self.append(op, ty, pc, vec![lhs, rhs]);
        self.cur[acc] = Some(v);
        Ok(())
    }

    fn checked_division(
        &mut self,
        insn: &BytecodeInstruction<'_>,
        op: IrOpcode,
        ty: DataType,
    ) -> Result<(), BuildError> {
        let pc = insn.pc();
        let acc = self.graph.acc_slot();
        let lhs = self.read(acc, pc)?;
        let rhs = self.read(self.reg(insn, 0)?, pc)?;
        self.expect(lhs, ty, pc)?;
        self.expect(rhs, ty, pc)?;
        let ss = self.throwing_prologue(pc, None);
        let divisor = self.append(IrOpcode::ZeroCheck, ty, pc, vec![rhs, ss]);
        let v = self.append(op, ty, pc, vec![lhs, divisor]);
        self.cur[acc] = Some(v);
        Ok(())
    }

    fn compare(
        &mut self,
        insn: &BytecodeInstruction<'_>,
        op: IrOpcode,
        operand_ty: DataType,
    ) -> Result<(), BuildError> {
        let pc = insn.pc();
        let acc = self.graph.acc_slot();
        let lhs = self.read(acc, pc)?;
        let rhs = self.read(self.reg(insn, 0)?, pc)?;
        self.expect(lhs, operand_ty, pc)?;
        self.expect(rhs, operand_ty, pc)?;
        let v = self.append(op, DataType::Int32, pc, vec![lhs, rhs]);
        self.cur[acc] = Some(v);
        Ok(())
    }

    fn branch_zero(&mut self, pc: u32, cc: ConditionCode, ty: DataType) -> Result<(), BuildError> {
        let v = self.read(self.graph.acc_slot(), pc)?;
        self.expect(v, ty, pc)?;
        self.append(IrOpcode::IfImm(cc), DataType::Void, pc, vec![v]);
        Ok(())
    }

    fn branch(&mut self, insn: &BytecodeInstruction<'_>, cc: ConditionCode) -> Result<(), BuildError> {
        let pc = insn.pc();
        let lhs = self.read(self.graph.acc_slot(), pc)?;
        let rhs = self.read(self.reg(insn, 0)?, pc)?;
        self.expect(lhs, DataType::Int32, pc)?;
        self.expect(rhs, DataType::Int32, pc)?;
        self.append(IrOpcode::If(cc), DataType::Void, pc, vec![lhs, rhs]);
        Ok(())
    }

    fn call(&mut self, insn: &BytecodeInstruction<'_>) -> Result<(), BuildError> {
        let pc = insn.pc();
        let id = insn.id(0).unwrap_or_default();
        let unsupported = |why: &str| BuildError::UnsupportedInstruction {
            pc,
            opcode: format!("{insn} ({why})"),
        };
        let callee = self
            .resolver
            .resolve_callee(id)
            .ok_or_else(|| unsupported("unknown callee"))?;
        if callee.num_args > 2 {
            return Err(unsupported("too many arguments for short form"));
        }
        let mut inputs = Vec::with_capacity(callee.num_args + 1);
        for n in 0..callee.num_args {
            inputs.push(self.read(self.reg(insn, n)?, pc)?);
        }
        let ss = self.throwing_prologue(pc, None);
        inputs.push(ss);
        let call = self.append(IrOpcode::CallStatic(id), callee.return_type, pc, inputs);
        if callee.return_type != DataType::Void {
            let acc = self.graph.acc_slot();
            self.cur[acc] = Some(call);
        }
        Ok(())
    }

    fn ret(&mut self, pc: u32, ty: DataType) -> Result<(), BuildError> {
        let v = self.read(self.graph.acc_slot(), pc)?;
        self.expect(v, ty, pc)?;
        self.append(IrOpcode::Return, ty, pc, vec![v]);
        Ok(())
    }
}

/// Slots defined in any of `tables`; the first definition wins.
fn union(tables: &[&DefTable], slots: usize) -> DefTable {
    let mut seed = vec![None; slots];
    for table in tables {
        for (slot, def) in table.iter().enumerate() {
            if seed[slot].is_none() {
                seed[slot] = *def;
            }
        }
    }
    seed
}

/// PC used for nodes of `block`; synthetic blocks borrow the PC of the
/// first real block they lead to.
pub(crate) fn anchor_pc(graph: &Graph, block: BlockId) -> u32 {
    let mut cur = block;
    for _ in 0..graph.block_count() {
        let b = graph.block(cur);
        if !b.is_synthetic() {
            return b.pc();
        }
        match b.succs().iter().find(|e| !e.exceptional) {
            Some(edge) => cur = edge.block,
            None => break,
        }
    }
    0
}
