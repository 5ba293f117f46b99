use crate::instruction::BytecodeInstruction;
use crate::opcode::Opcode;

/// Errors from [`decode`] and [`decode_at`].
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// Invalid or unknown opcode at the given byte offset.
    #[error("invalid opcode at offset {0:#x}")]
    InvalidOpcode(usize),
    /// Bytecode truncated at the given byte offset.
    #[error("truncated instruction at offset {0:#x}")]
    Truncated(usize),
    /// A jump instruction at `offset` targets byte offset `target` which
    /// does not land on an instruction boundary (or is out of range).
    #[error("jump at offset {offset:#x} targets invalid offset {target}")]
    InvalidJumpTarget { offset: usize, target: i64 },
    /// An offset taken from metadata (try range, handler) is not the start
    /// of an instruction.
    #[error("offset {0:#x} is not an instruction boundary")]
    Misaligned(usize),
}

/// Decode the single instruction starting at `offset`.
pub fn decode_at(code: &[u8], offset: u32) -> Result<BytecodeInstruction<'_>, DecodeError> {
    let pos = offset as usize;
    let Some(&byte) = code.get(pos) else {
        return Err(DecodeError::Truncated(pos));
    };
    let opcode = Opcode::from_byte(byte).ok_or(DecodeError::InvalidOpcode(pos))?;
    if pos + opcode.size() > code.len() {
        return Err(DecodeError::Truncated(pos));
    }
    Ok(BytecodeInstruction::new_unchecked(code, offset, opcode))
}

/// Decode a whole method body, checking that every jump lands on an
/// instruction boundary inside the method.
pub fn decode(code: &[u8]) -> Result<Vec<BytecodeInstruction<'_>>, DecodeError> {
    let mut instructions = Vec::new();
    let mut offset = 0u32;

    // Pass 1: decode instructions.
    while (offset as usize) < code.len() {
        let insn = decode_at(code, offset)?;
        offset = insn.next_pc();
        instructions.push(insn);
    }

    // Pass 2: validate jump targets against instruction offsets.
    for insn in &instructions {
        let Some(target) = insn.jump_target() else {
            continue;
        };
        let valid = u32::try_from(target)
            .ok()
            .is_some_and(|t| instructions.binary_search_by_key(&t, |i| i.pc()).is_ok());
        if !valid {
            return Err(DecodeError::InvalidJumpTarget {
                offset: insn.pc() as usize,
                target,
            });
        }
    }

    Ok(instructions)
}
