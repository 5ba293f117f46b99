use std::fmt;

use crate::block::BlockId;
use crate::types::{ConditionCode, ConstValue, DataType};

/// Index of an instruction within its graph's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstId(pub(crate) u32);

impl InstId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for InstId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Operation of a plain (non-phi, non-bookkeeping) instruction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IrOpcode {
    /// Method argument by index.
    Parameter(u16),
    Constant(ConstValue),
    /// Try-region marker; lists handler exception type ids in handler order.
    Try(Vec<u32>),
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Neg,
    Cmp,
    Fcmp,
    ZeroCheck,
    NullCheck,
    LoadString(u32),
    LoadArray,
    StoreArray,
    NewObject(u32),
    CallStatic(u32),
    /// Compare two values and branch.
    If(ConditionCode),
    /// Compare a value against zero (or null) and branch.
    IfImm(ConditionCode),
    Throw,
    Return,
    ReturnVoid,
}

impl IrOpcode {
    pub fn name(&self) -> &'static str {
        match self {
            IrOpcode::Parameter(_) => "Parameter",
            IrOpcode::Constant(_) => "Constant",
            IrOpcode::Try(_) => "Try",
            IrOpcode::Add => "Add",
            IrOpcode::Sub => "Sub",
            IrOpcode::Mul => "Mul",
            IrOpcode::Div => "Div",
            IrOpcode::Mod => "Mod",
            IrOpcode::Neg => "Neg",
            IrOpcode::Cmp => "Cmp",
            IrOpcode::Fcmp => "Fcmp",
            IrOpcode::ZeroCheck => "ZeroCheck",
            IrOpcode::NullCheck => "NullCheck",
            IrOpcode::LoadString(_) => "LoadString",
            IrOpcode::LoadArray => "LoadArray",
            IrOpcode::StoreArray => "StoreArray",
            IrOpcode::NewObject(_) => "NewObject",
            IrOpcode::CallStatic(_) => "CallStatic",
            IrOpcode::If(_) => "If",
            IrOpcode::IfImm(_) => "IfImm",
            IrOpcode::Throw => "Throw",
            IrOpcode::Return => "Return",
            IrOpcode::ReturnVoid => "ReturnVoid",
        }
    }

    /// Whether the instruction ends its block.
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            IrOpcode::If(_)
                | IrOpcode::IfImm(_)
                | IrOpcode::Throw
                | IrOpcode::Return
                | IrOpcode::ReturnVoid
        )
    }
}

impl fmt::Display for IrOpcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())?;
        match self {
            IrOpcode::Parameter(i) => write!(f, " a{i}"),
            IrOpcode::Constant(v) => write!(f, " {v}"),
            IrOpcode::Try(types) => {
                f.write_str(" [")?;
                for (i, t) in types.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{t:#x}")?;
                }
                f.write_str("]")
            }
            IrOpcode::LoadString(id) | IrOpcode::NewObject(id) | IrOpcode::CallStatic(id) => {
                write!(f, " @{id:#x}")
            }
            IrOpcode::If(cc) | IrOpcode::IfImm(cc) => write!(f, " {cc}"),
            _ => Ok(()),
        }
    }
}

/// Shape of an instruction and its inputs.
#[derive(Debug, Clone, PartialEq)]
pub enum InstKind {
    /// An ordinary operation.
    Op {
        opcode: IrOpcode,
        inputs: Vec<InstId>,
    },
    /// Merge of `vreg` at a join; one input per predecessor edge in edge
    /// order. `None` marks a gap: no definition along that edge.
    Phi {
        vreg: usize,
        inputs: Vec<Option<InstId>>,
    },
    /// Merge of `vreg` at a handler entry; `throwers[i]` is the PC of the
    /// throwing instruction that contributed `inputs[i]`.
    CatchPhi {
        vreg: usize,
        inputs: Vec<InstId>,
        throwers: Vec<u32>,
    },
    /// Live register state at a point that may leave the method.
    /// `vregs[i]` is the register slot holding `inputs[i]`.
    SaveState {
        inputs: Vec<InstId>,
        vregs: Vec<usize>,
    },
}

/// One IR instruction. Owned by the graph arena; referenced by [`InstId`].
#[derive(Debug, Clone)]
pub struct Inst {
    pub(crate) kind: InstKind,
    pub(crate) ty: DataType,
    pub(crate) pc: u32,
    pub(crate) block: BlockId,
    pub(crate) users: Vec<InstId>,
    pub(crate) removed: bool,
}

impl Inst {
    #[inline]
    pub fn kind(&self) -> &InstKind {
        &self.kind
    }

    /// The operation, for [`InstKind::Op`] instructions.
    pub fn opcode(&self) -> Option<&IrOpcode> {
        match &self.kind {
            InstKind::Op { opcode, .. } => Some(opcode),
            _ => None,
        }
    }

    #[inline]
    pub fn ty(&self) -> DataType {
        self.ty
    }

    #[inline]
    pub fn pc(&self) -> u32 {
        self.pc
    }

    #[inline]
    pub fn block(&self) -> BlockId {
        self.block
    }

    /// Instructions consuming this one; repeated once per use.
    #[inline]
    pub fn users(&self) -> &[InstId] {
        &self.users
    }

    #[inline]
    pub fn is_removed(&self) -> bool {
        self.removed
    }

    pub fn is_phi(&self) -> bool {
        matches!(self.kind, InstKind::Phi { .. })
    }

    pub fn is_catch_phi(&self) -> bool {
        matches!(self.kind, InstKind::CatchPhi { .. })
    }

    pub fn is_any_phi(&self) -> bool {
        self.is_phi() || self.is_catch_phi()
    }

    pub fn is_save_state(&self) -> bool {
        matches!(self.kind, InstKind::SaveState { .. })
    }

    /// Integer constants stay flexible during phi typing.
    pub fn is_int_constant(&self) -> bool {
        matches!(
            self.kind,
            InstKind::Op {
                opcode: IrOpcode::Constant(ConstValue::Int(_)),
                ..
            }
        )
    }

    /// Register slot of a phi or catch-phi.
    pub fn vreg(&self) -> Option<usize> {
        match self.kind {
            InstKind::Phi { vreg, .. } | InstKind::CatchPhi { vreg, .. } => Some(vreg),
            _ => None,
        }
    }

    /// Whether a phi still has an edge with no definition.
    pub fn has_gap(&self) -> bool {
        match &self.kind {
            InstKind::Phi { inputs, .. } => inputs.iter().any(Option::is_none),
            _ => false,
        }
    }

    /// Number of input slots, gaps included.
    pub fn input_count(&self) -> usize {
        match &self.kind {
            InstKind::Op { inputs, .. }
            | InstKind::CatchPhi { inputs, .. }
            | InstKind::SaveState { inputs, .. } => inputs.len(),
            InstKind::Phi { inputs, .. } => inputs.len(),
        }
    }

    /// Present inputs in order; gaps are skipped.
    pub fn inputs(&self) -> impl Iterator<Item = InstId> + '_ {
        let (plain, optional): (&[InstId], &[Option<InstId>]) = match &self.kind {
            InstKind::Op { inputs, .. }
            | InstKind::CatchPhi { inputs, .. }
            | InstKind::SaveState { inputs, .. } => (inputs.as_slice(), &[]),
            InstKind::Phi { inputs, .. } => (&[], inputs.as_slice()),
        };
        plain
            .iter()
            .copied()
            .chain(optional.iter().flatten().copied())
    }

    pub(crate) fn replace_input(&mut self, old: InstId, new: InstId) -> usize {
        let mut count = 0;
        let mut swap = |slot: &mut InstId| {
            if *slot == old {
                *slot = new;
                count += 1;
            }
        };
        match &mut self.kind {
            InstKind::Op { inputs, .. }
            | InstKind::CatchPhi { inputs, .. }
            | InstKind::SaveState { inputs, .. } => inputs.iter_mut().for_each(&mut swap),
            InstKind::Phi { inputs, .. } => inputs.iter_mut().flatten().for_each(&mut swap),
        }
        count
    }
}
