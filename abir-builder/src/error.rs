use abir_isa::DecodeError;
use thiserror::Error;

/// Why a method could not be built. Every variant is local to one method.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BuildError {
    /// An opcode (or callee) the builder cannot lower.
    #[error("unsupported instruction {opcode} at pc {pc:#x}")]
    UnsupportedInstruction { pc: u32, opcode: String },

    /// A value is read where no definition reaches it.
    #[error("unresolved definition of {} at pc {pc:#x}", slot_name(.vreg))]
    UnresolvedDefinition { pc: u32, vreg: Option<usize> },

    /// A phi whose inputs disagree on type.
    #[error("ambiguous phi type for r{vreg} at pc {pc:#x}")]
    AmbiguousPhiType { pc: u32, vreg: usize },

    #[error("malformed bytecode: {0}")]
    MalformedBytecode(DecodeError),
}

fn slot_name(vreg: &Option<usize>) -> String {
    match vreg {
        Some(v) => format!("r{v}"),
        None => "a value".to_string(),
    }
}

impl BuildError {
    /// Bytecode offset the error refers to, when known.
    pub fn pc(&self) -> Option<u32> {
        match self {
            BuildError::UnsupportedInstruction { pc, .. }
            | BuildError::UnresolvedDefinition { pc, .. }
            | BuildError::AmbiguousPhiType { pc, .. } => Some(*pc),
            BuildError::MalformedBytecode(e) => match e {
                DecodeError::InvalidOpcode(off)
                | DecodeError::Truncated(off)
                | DecodeError::Misaligned(off)
                | DecodeError::InvalidJumpTarget { offset: off, .. } => Some(*off as u32),
            },
        }
    }

    /// Map a decode failure in `code`; unknown opcodes are unsupported
    /// instructions rather than malformed code.
    pub(crate) fn from_decode(code: &[u8], error: DecodeError) -> Self {
        match error {
            DecodeError::InvalidOpcode(off) => BuildError::UnsupportedInstruction {
                pc: off as u32,
                opcode: code
                    .get(off)
                    .map_or_else(|| "?".to_string(), |b| format!("{b:#04x}")),
            },
            other => BuildError::MalformedBytecode(other),
        }
    }
}
