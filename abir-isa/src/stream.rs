use crate::decoder::{DecodeError, decode_at};
use crate::instruction::BytecodeInstruction;

/// Lazy, forward-only iterator over the instructions of a byte range.
///
/// The stream tracks only its position; it can be restarted at any byte
/// offset with [`seek`](Self::seek). After a decode error it yields the
/// error once and then ends.
#[derive(Debug, Clone)]
pub struct InstructionStream<'a> {
    code: &'a [u8],
    pos: u32,
    end: u32,
    failed: bool,
}

impl<'a> InstructionStream<'a> {
    /// Iterate over the whole buffer.
    pub fn new(code: &'a [u8]) -> Self {
        Self::range(code, 0, code.len() as u32)
    }

    /// Iterate over `[start, end)`. `end` is clamped to the buffer length.
    pub fn range(code: &'a [u8], start: u32, end: u32) -> Self {
        Self {
            code,
            pos: start,
            end: end.min(code.len() as u32),
            failed: false,
        }
    }

    /// Byte offset of the next instruction to be decoded.
    #[inline]
    pub fn position(&self) -> u32 {
        self.pos
    }

    /// Restart decoding at `pc`.
    pub fn seek(&mut self, pc: u32) {
        self.pos = pc;
        self.failed = false;
    }

    /// A copy of this stream restarted at `pc`.
    pub fn starting_at(&self, pc: u32) -> Self {
        let mut stream = self.clone();
        stream.seek(pc);
        stream
    }
}

impl<'a> Iterator for InstructionStream<'a> {
    type Item = Result<BytecodeInstruction<'a>, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.pos >= self.end {
            return None;
        }
        // Restrict decoding to the range so an instruction cannot run past `end`.
        let window = &self.code[..self.end as usize];
        match decode_at(window, self.pos) {
            Ok(insn) => {
                self.pos = insn.next_pc();
                Some(Ok(insn))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}
