//! Bytecode ISA definitions for the IR builder.
//!
//! This crate provides the opcode/format table, a bit-level field reader,
//! a borrowed instruction view, a restartable instruction stream and an
//! emitter that assembles instructions back into bytes.

pub mod bits;
pub mod decoder;
pub mod emitter;
pub mod instruction;
pub mod opcode;
pub mod stream;

pub use bitflags;

pub use decoder::{DecodeError, decode, decode_at};
pub use emitter::{Arg, EncodeError, Emitter, Label};
pub use instruction::{BytecodeInstruction, Operand};
pub use opcode::{Format, Opcode, OpcodeFlags, OperandDesc, OperandKind};
pub use stream::InstructionStream;
