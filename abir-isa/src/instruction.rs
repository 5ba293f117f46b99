use std::fmt;

use crate::bits::{read_bits, read_signed_bits};
use crate::opcode::{Opcode, OpcodeFlags, OperandDesc, OperandKind};

/// A decoded operand value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Operand {
    /// Virtual register index.
    Reg(u16),
    /// Signed immediate value.
    Imm(i64),
    /// Float immediate value.
    FloatImm(f64),
    /// Pool/entity identifier.
    Id(u32),
}

/// A borrowed view of one encoded instruction.
///
/// Holds the whole method buffer plus the instruction's byte offset; operand
/// accessors extract fields on demand and never copy the buffer.
#[derive(Clone, Copy)]
pub struct BytecodeInstruction<'a> {
    code: &'a [u8],
    offset: u32,
    opcode: Opcode,
}

impl<'a> BytecodeInstruction<'a> {
    /// Create a view without checking the buffer length.
    ///
    /// `code[offset..]` must hold at least `opcode.size()` bytes; use
    /// [`decode_at`](crate::decode_at) for the checked path.
    pub(crate) fn new_unchecked(code: &'a [u8], offset: u32, opcode: Opcode) -> Self {
        Self {
            code,
            offset,
            opcode,
        }
    }

    #[inline]
    pub fn opcode(&self) -> Opcode {
        self.opcode
    }

    /// Byte offset of the instruction within the method's code.
    #[inline]
    pub fn pc(&self) -> u32 {
        self.offset
    }

    /// Encoded size in bytes.
    #[inline]
    pub fn size(&self) -> usize {
        self.opcode.size()
    }

    /// Byte offset of the following instruction.
    #[inline]
    pub fn next_pc(&self) -> u32 {
        self.offset + self.size() as u32
    }

    /// The encoded bytes of this instruction.
    pub fn bytes(&self) -> &'a [u8] {
        let start = self.offset as usize;
        &self.code[start..start + self.size()]
    }

    #[inline]
    pub fn flags(&self) -> OpcodeFlags {
        self.opcode.flags()
    }

    fn nth(&self, kind: OperandKind, n: usize) -> Option<&'static OperandDesc> {
        self.opcode
            .format()
            .operands()
            .iter()
            .filter(|d| d.kind == kind)
            .nth(n)
    }

    fn raw(&self, desc: &OperandDesc) -> u64 {
        read_bits(self.bytes(), desc.bit_offset, desc.width)
    }

    /// The `n`-th virtual register operand.
    pub fn vreg(&self, n: usize) -> Option<u16> {
        self.nth(OperandKind::Reg, n).map(|d| self.raw(d) as u16)
    }

    /// The `n`-th immediate operand, sign-extended to 64 bits.
    pub fn imm(&self, n: usize) -> Option<i64> {
        self.nth(OperandKind::Imm, n)
            .map(|d| read_signed_bits(self.bytes(), d.bit_offset, d.width))
    }

    /// The `n`-th immediate operand, zero-extended to 64 bits.
    pub fn imm_unsigned(&self, n: usize) -> Option<u64> {
        self.nth(OperandKind::Imm, n).map(|d| self.raw(d))
    }

    /// The `n`-th immediate reinterpreted as an `f64`.
    pub fn float_imm(&self, n: usize) -> Option<f64> {
        self.imm_unsigned(n).map(f64::from_bits)
    }

    /// The `n`-th identifier operand.
    pub fn id(&self, n: usize) -> Option<u32> {
        self.nth(OperandKind::Id, n).map(|d| self.raw(d) as u32)
    }

    /// All operands in encoding order.
    pub fn operands(&self) -> impl Iterator<Item = Operand> + '_ {
        let float = self.flags().contains(OpcodeFlags::FLOAT_IMM);
        self.opcode
            .format()
            .operands()
            .iter()
            .map(move |d| match d.kind {
                OperandKind::Reg => Operand::Reg(self.raw(d) as u16),
                OperandKind::Imm if float => Operand::FloatImm(f64::from_bits(self.raw(d))),
                OperandKind::Imm => {
                    Operand::Imm(read_signed_bits(self.bytes(), d.bit_offset, d.width))
                }
                OperandKind::Id => Operand::Id(self.raw(d) as u32),
            })
    }

    /// Relative jump offset, for jump instructions.
    pub fn jump_offset(&self) -> Option<i64> {
        if self.opcode.is_jump() {
            self.imm(0)
        } else {
            None
        }
    }

    /// Absolute jump target. May lie outside the method for malformed code.
    pub fn jump_target(&self) -> Option<i64> {
        self.jump_offset().map(|off| self.offset as i64 + off)
    }
}

impl fmt::Display for BytecodeInstruction<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.opcode.mnemonic())?;
        let is_jump = self.opcode.is_jump();
        for (i, op) in self.operands().enumerate() {
            f.write_str(if i == 0 { " " } else { ", " })?;
            match op {
                Operand::Reg(r) => write!(f, "v{r}")?,
                Operand::Imm(v) if is_jump => write!(f, "{:#x}", self.offset as i64 + v)?,
                Operand::Imm(v) => write!(f, "{v}")?,
                Operand::FloatImm(v) => write!(f, "{v:?}")?,
                Operand::Id(id) => write!(f, "@{id:#x}")?,
            }
        }
        Ok(())
    }
}

impl fmt::Debug for BytecodeInstruction<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06x}: {self}", self.offset)
    }
}
