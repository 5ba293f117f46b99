//! Serializer for code items, used to produce fixtures and test inputs.

use crate::code::TryBlock;
use crate::leb128::encode_uleb128;

/// Accumulates code items into one buffer.
#[derive(Debug, Default)]
pub struct CodeWriter {
    data: Vec<u8>,
}

impl CodeWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start the buffer with `len` zero bytes, so no item sits at offset 0.
    pub fn with_header(len: usize) -> Self {
        Self {
            data: vec![0; len],
        }
    }

    /// Append a code item; returns its offset.
    pub fn add_code_item(
        &mut self,
        num_vregs: u32,
        num_args: u32,
        code: &[u8],
        try_blocks: &[TryBlock],
    ) -> u32 {
        let offset = self.data.len() as u32;
        let out = &mut self.data;
        encode_uleb128(out, num_vregs as u64);
        encode_uleb128(out, num_args as u64);
        encode_uleb128(out, code.len() as u64);
        encode_uleb128(out, try_blocks.len() as u64);
        out.extend_from_slice(code);
        for tb in try_blocks {
            encode_uleb128(out, tb.start_pc as u64);
            encode_uleb128(out, tb.length as u64);
            encode_uleb128(out, tb.catch_blocks.len() as u64);
            for cb in &tb.catch_blocks {
                encode_uleb128(out, cb.type_idx as u64);
                encode_uleb128(out, cb.handler_pc as u64);
                encode_uleb128(out, cb.code_size as u64);
            }
        }
        offset
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn finish(self) -> Vec<u8> {
        self.data
    }
}
