use crate::bits::{fits_signed, fits_unsigned, write_bits};
use crate::opcode::{Opcode, OpcodeFlags, OperandDesc, OperandKind};

/// A jump target handed out by [`Emitter::create_label`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label(pub u32);

/// An operand passed to [`Emitter::emit`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Arg {
    Reg(u16),
    Imm(i64),
    Float(f64),
    Id(u32),
    /// Jump target; resolved to a relative offset by [`Emitter::build`].
    Label(Label),
}

/// Errors from [`Emitter`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EncodeError {
    /// The label was not created by this emitter.
    #[error("unknown label {0}")]
    UnknownLabel(u32),
    /// A jump references a label that was never bound.
    #[error("label {0} is referenced but never bound")]
    UnboundLabel(u32),
    /// An operand value does not fit its field.
    #[error("{opcode}: operand value {value} does not fit in {width} bits")]
    ImmOutOfRange {
        opcode: Opcode,
        value: i64,
        width: u32,
    },
    /// A resolved jump distance does not fit the jump's offset field.
    #[error("jump at offset {pc:#x} cannot reach distance {distance}")]
    JumpOutOfRange { pc: u32, distance: i64 },
    /// Operands do not match the opcode's format.
    #[error("{0}: operands do not match instruction format")]
    OperandMismatch(Opcode),
}

struct Fixup {
    pc: u32,
    desc: OperandDesc,
    label: Label,
}

/// Assembles instructions into bytecode, resolving labels at [`build`](Self::build).
///
/// ```
/// use abir_isa::{Arg, Emitter, Opcode};
///
/// let mut e = Emitter::new();
/// let exit = e.create_label();
/// e.emit(Opcode::Ldai, &[Arg::Imm(1)])?;
/// e.emit(Opcode::Jeqz, &[Arg::Label(exit)])?;
/// e.emit(Opcode::Ldai, &[Arg::Imm(2)])?;
/// e.bind(exit)?;
/// e.emit(Opcode::Return, &[])?;
/// let bytes = e.build()?;
/// assert_eq!(abir_isa::decode(&bytes).unwrap().len(), 4);
/// # Ok::<(), abir_isa::EncodeError>(())
/// ```
#[derive(Default)]
pub struct Emitter {
    code: Vec<u8>,
    labels: Vec<Option<u32>>,
    fixups: Vec<Fixup>,
}

impl Emitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Byte offset at which the next instruction will be placed.
    #[inline]
    pub fn pc(&self) -> u32 {
        self.code.len() as u32
    }

    pub fn create_label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() as u32 - 1)
    }

    /// Bind `label` to the current position.
    pub fn bind(&mut self, label: Label) -> Result<(), EncodeError> {
        let pc = self.pc();
        let slot = self
            .labels
            .get_mut(label.0 as usize)
            .ok_or(EncodeError::UnknownLabel(label.0))?;
        *slot = Some(pc);
        Ok(())
    }

    /// Append one instruction; returns its byte offset.
    pub fn emit(&mut self, opcode: Opcode, args: &[Arg]) -> Result<u32, EncodeError> {
        let descs = opcode.format().operands();
        if descs.len() != args.len() {
            return Err(EncodeError::OperandMismatch(opcode));
        }

        let pc = self.pc();
        let mut buf = vec![0u8; opcode.size()];
        buf[0] = opcode as u8;
        let float = opcode.flags().contains(OpcodeFlags::FLOAT_IMM);

        for (desc, arg) in descs.iter().zip(args) {
            let raw = match (desc.kind, *arg) {
                (OperandKind::Reg, Arg::Reg(r)) => unsigned(opcode, desc, r as u64)?,
                (OperandKind::Id, Arg::Id(id)) => unsigned(opcode, desc, id as u64)?,
                (OperandKind::Imm, Arg::Float(v)) if float => v.to_bits(),
                (OperandKind::Imm, Arg::Imm(v)) if !float => {
                    if !fits_signed(v, desc.width) {
                        return Err(EncodeError::ImmOutOfRange {
                            opcode,
                            value: v,
                            width: desc.width,
                        });
                    }
                    v as u64
                }
                (OperandKind::Imm, Arg::Label(label)) if opcode.is_jump() => {
                    if label.0 as usize >= self.labels.len() {
                        return Err(EncodeError::UnknownLabel(label.0));
                    }
                    self.fixups.push(Fixup {
                        pc,
                        desc: *desc,
                        label,
                    });
                    0
                }
                _ => return Err(EncodeError::OperandMismatch(opcode)),
            };
            write_bits(&mut buf, desc.bit_offset, desc.width, raw);
        }

        self.code.extend_from_slice(&buf);
        Ok(pc)
    }

    /// Resolve labels and return the encoded bytes.
    pub fn build(mut self) -> Result<Vec<u8>, EncodeError> {
        for fixup in &self.fixups {
            let target = self.labels[fixup.label.0 as usize]
                .ok_or(EncodeError::UnboundLabel(fixup.label.0))?;
            let distance = target as i64 - fixup.pc as i64;
            if !fits_signed(distance, fixup.desc.width) {
                return Err(EncodeError::JumpOutOfRange {
                    pc: fixup.pc,
                    distance,
                });
            }
            let start = fixup.pc as usize;
            write_bits(
                &mut self.code[start..],
                fixup.desc.bit_offset,
                fixup.desc.width,
                distance as u64,
            );
        }
        Ok(self.code)
    }
}

fn unsigned(opcode: Opcode, desc: &OperandDesc, value: u64) -> Result<u64, EncodeError> {
    if fits_unsigned(value, desc.width) {
        Ok(value)
    } else {
        Err(EncodeError::ImmOutOfRange {
            opcode,
            value: value as i64,
            width: desc.width,
        })
    }
}
