use std::fmt;

bitflags::bitflags! {
    /// Static properties of an opcode.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct OpcodeFlags: u16 {
        /// Transfers control to a relative offset.
        const JUMP = 1 << 0;
        /// Jump that may also fall through.
        const CONDITIONAL = 1 << 1;
        /// Leaves the method normally.
        const RETURN = 1 << 2;
        /// Unconditionally raises an exception.
        const THROW = 1 << 3;
        /// May raise an exception at runtime.
        const CAN_THROW = 1 << 4;
        /// Invokes another method.
        const CALL = 1 << 5;
        /// Immediate operand holds raw IEEE-754 bits.
        const FLOAT_IMM = 1 << 6;
    }
}

/// Kind of an encoded operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperandKind {
    /// Virtual register index.
    Reg,
    /// Immediate value (signed unless the opcode carries [`OpcodeFlags::FLOAT_IMM`]).
    Imm,
    /// Pool/entity identifier.
    Id,
}

/// Location of one operand inside an encoded instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OperandDesc {
    pub kind: OperandKind,
    /// Bit offset from the start of the instruction (the opcode occupies bits 0..8).
    pub bit_offset: u32,
    /// Field width in bits.
    pub width: u32,
}

const fn reg(bit_offset: u32, width: u32) -> OperandDesc {
    OperandDesc {
        kind: OperandKind::Reg,
        bit_offset,
        width,
    }
}

const fn imm(bit_offset: u32, width: u32) -> OperandDesc {
    OperandDesc {
        kind: OperandKind::Imm,
        bit_offset,
        width,
    }
}

const fn id(bit_offset: u32, width: u32) -> OperandDesc {
    OperandDesc {
        kind: OperandKind::Id,
        bit_offset,
        width,
    }
}

/// Operand layout of an instruction.
///
/// Names list operands in encoding order; 4-bit fields share a byte, low
/// nibble first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    None,
    V4V4,
    V8,
    V4Imm4,
    V8Imm32,
    V8Imm64,
    Imm8,
    Imm16,
    Imm32,
    Imm64,
    Id16,
    V8Imm8,
    V8Id16,
    Id16V4V4,
}

impl Format {
    /// Encoded size in bytes, opcode included.
    pub const fn size(self) -> usize {
        match self {
            Format::None => 1,
            Format::V4V4 | Format::V8 | Format::V4Imm4 | Format::Imm8 => 2,
            Format::Imm16 | Format::Id16 | Format::V8Imm8 => 3,
            Format::V8Id16 | Format::Id16V4V4 => 4,
            Format::Imm32 => 5,
            Format::V8Imm32 => 6,
            Format::Imm64 => 9,
            Format::V8Imm64 => 10,
        }
    }

    /// Operand descriptors in encoding order.
    pub const fn operands(self) -> &'static [OperandDesc] {
        match self {
            Format::None => &[],
            Format::V4V4 => V4V4,
            Format::V8 => V8,
            Format::V4Imm4 => V4_IMM4,
            Format::V8Imm32 => V8_IMM32,
            Format::V8Imm64 => V8_IMM64,
            Format::Imm8 => IMM8,
            Format::Imm16 => IMM16,
            Format::Imm32 => IMM32,
            Format::Imm64 => IMM64,
            Format::Id16 => ID16,
            Format::V8Imm8 => V8_IMM8,
            Format::V8Id16 => V8_ID16,
            Format::Id16V4V4 => ID16_V4_V4,
        }
    }
}

const V4V4: &[OperandDesc] = &[reg(8, 4), reg(12, 4)];
const V8: &[OperandDesc] = &[reg(8, 8)];
const V4_IMM4: &[OperandDesc] = &[reg(8, 4), imm(12, 4)];
const V8_IMM32: &[OperandDesc] = &[reg(8, 8), imm(16, 32)];
const V8_IMM64: &[OperandDesc] = &[reg(8, 8), imm(16, 64)];
const IMM8: &[OperandDesc] = &[imm(8, 8)];
const IMM16: &[OperandDesc] = &[imm(8, 16)];
const IMM32: &[OperandDesc] = &[imm(8, 32)];
const IMM64: &[OperandDesc] = &[imm(8, 64)];
const ID16: &[OperandDesc] = &[id(8, 16)];
const V8_IMM8: &[OperandDesc] = &[reg(8, 8), imm(16, 8)];
const V8_ID16: &[OperandDesc] = &[reg(8, 8), id(16, 16)];
const ID16_V4_V4: &[OperandDesc] = &[id(8, 16), reg(24, 4), reg(28, 4)];

macro_rules! define_opcodes {
    ($( $variant:ident = $byte:literal, $mnemonic:literal, $format:ident, [$($flag:ident)|*]; )*) => {
        /// Every opcode of the instruction set.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr(u8)]
        pub enum Opcode {
            $($variant = $byte,)*
        }

        impl Opcode {
            /// All opcodes, in table order.
            pub const ALL: &'static [Opcode] = &[$(Opcode::$variant,)*];

            /// Look up an opcode by its encoded byte.
            pub const fn from_byte(byte: u8) -> Option<Self> {
                match byte {
                    $($byte => Some(Opcode::$variant),)*
                    _ => None,
                }
            }

            /// Assembly mnemonic. Several opcodes may share one when they
            /// differ only by format.
            pub const fn mnemonic(self) -> &'static str {
                match self {
                    $(Opcode::$variant => $mnemonic,)*
                }
            }

            pub const fn format(self) -> Format {
                match self {
                    $(Opcode::$variant => Format::$format,)*
                }
            }

            pub const fn flags(self) -> OpcodeFlags {
                match self {
                    $(Opcode::$variant => OpcodeFlags::empty()$(.union(OpcodeFlags::$flag))*,)*
                }
            }
        }
    };
}

define_opcodes! {
    Nop = 0x00, "nop", None, [];
    Mov = 0x01, "mov", V4V4, [];
    Mov64 = 0x02, "mov.64", V4V4, [];
    MovObj = 0x03, "mov.obj", V4V4, [];
    Movi = 0x04, "movi", V4Imm4, [];
    MoviWide = 0x05, "movi", V8Imm32, [];
    Movi64 = 0x06, "movi.64", V8Imm64, [];
    Fmovi64 = 0x07, "fmovi.64", V8Imm64, [FLOAT_IMM];
    MovNull = 0x08, "mov.null", V8, [];

    Lda = 0x10, "lda", V8, [];
    Lda64 = 0x11, "lda.64", V8, [];
    LdaObj = 0x12, "lda.obj", V8, [];
    Ldai = 0x13, "ldai", Imm32, [];
    Ldai64 = 0x14, "ldai.64", Imm64, [];
    Fldai64 = 0x15, "fldai.64", Imm64, [FLOAT_IMM];
    LdaNull = 0x16, "lda.null", None, [];
    LdaStr = 0x17, "lda.str", Id16, [CAN_THROW];
    Sta = 0x18, "sta", V8, [];
    Sta64 = 0x19, "sta.64", V8, [];
    StaObj = 0x1a, "sta.obj", V8, [];

    Add2 = 0x20, "add2", V8, [];
    Sub2 = 0x21, "sub2", V8, [];
    Mul2 = 0x22, "mul2", V8, [];
    Div2 = 0x23, "div2", V8, [CAN_THROW];
    Mod2 = 0x24, "mod2", V8, [CAN_THROW];
    Add2I64 = 0x25, "add2.64", V8, [];
    Sub2I64 = 0x26, "sub2.64", V8, [];
    Mul2I64 = 0x27, "mul2.64", V8, [];
    Div2I64 = 0x28, "div2.64", V8, [CAN_THROW];
    Mod2I64 = 0x29, "mod2.64", V8, [CAN_THROW];
    Fadd2F64 = 0x2a, "fadd2.64", V8, [];
    Fsub2F64 = 0x2b, "fsub2.64", V8, [];
    Fmul2F64 = 0x2c, "fmul2.64", V8, [];
    Fdiv2F64 = 0x2d, "fdiv2.64", V8, [];
    Addi = 0x30, "addi", Imm8, [];
    Subi = 0x31, "subi", Imm8, [];
    Neg = 0x32, "neg", None, [];
    NegI64 = 0x33, "neg.64", None, [];
    Cmp64 = 0x34, "cmp.64", V8, [];
    Fcmpl64 = 0x35, "fcmpl.64", V8, [];

    Jmp = 0x40, "jmp", Imm8, [JUMP];
    JmpWide = 0x41, "jmp", Imm16, [JUMP];
    JmpFar = 0x42, "jmp", Imm32, [JUMP];
    Jeqz = 0x43, "jeqz", Imm8, [JUMP | CONDITIONAL];
    Jnez = 0x44, "jnez", Imm8, [JUMP | CONDITIONAL];
    Jltz = 0x45, "jltz", Imm8, [JUMP | CONDITIONAL];
    Jgtz = 0x46, "jgtz", Imm8, [JUMP | CONDITIONAL];
    Jlez = 0x47, "jlez", Imm8, [JUMP | CONDITIONAL];
    Jgez = 0x48, "jgez", Imm8, [JUMP | CONDITIONAL];
    JeqzObj = 0x49, "jeqz.obj", Imm8, [JUMP | CONDITIONAL];
    JnezObj = 0x4a, "jnez.obj", Imm8, [JUMP | CONDITIONAL];
    Jeq = 0x4b, "jeq", V8Imm8, [JUMP | CONDITIONAL];
    Jne = 0x4c, "jne", V8Imm8, [JUMP | CONDITIONAL];
    Jlt = 0x4d, "jlt", V8Imm8, [JUMP | CONDITIONAL];
    Jgt = 0x4e, "jgt", V8Imm8, [JUMP | CONDITIONAL];
    Jle = 0x4f, "jle", V8Imm8, [JUMP | CONDITIONAL];
    Jge = 0x50, "jge", V8Imm8, [JUMP | CONDITIONAL];

    CallShort = 0x60, "call.short", Id16V4V4, [CALL | CAN_THROW];
    NewObj = 0x61, "newobj", V8Id16, [CAN_THROW];
    Ldarr = 0x62, "ldarr", V8, [CAN_THROW];
    Starr = 0x63, "starr", V4V4, [CAN_THROW];

    Throw = 0x70, "throw", V8, [THROW | CAN_THROW];
    Return = 0x71, "return", None, [RETURN];
    Return64 = 0x72, "return.64", None, [RETURN];
    ReturnObj = 0x73, "return.obj", None, [RETURN];
    ReturnVoid = 0x74, "return.void", None, [RETURN];
}

impl Opcode {
    /// Encoded size in bytes.
    #[inline]
    pub const fn size(self) -> usize {
        self.format().size()
    }

    #[inline]
    pub fn is_jump(self) -> bool {
        self.flags().contains(OpcodeFlags::JUMP)
    }

    #[inline]
    pub fn is_conditional(self) -> bool {
        self.flags().contains(OpcodeFlags::CONDITIONAL)
    }

    /// Ends a basic block with no fall-through successor.
    pub fn is_terminator(self) -> bool {
        let flags = self.flags();
        flags.intersects(OpcodeFlags::RETURN | OpcodeFlags::THROW)
            || (flags.contains(OpcodeFlags::JUMP) && !flags.contains(OpcodeFlags::CONDITIONAL))
    }

    #[inline]
    pub fn is_return_or_throw(self) -> bool {
        self.flags()
            .intersects(OpcodeFlags::RETURN | OpcodeFlags::THROW)
    }

    #[inline]
    pub fn can_throw(self) -> bool {
        self.flags().contains(OpcodeFlags::CAN_THROW)
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}
