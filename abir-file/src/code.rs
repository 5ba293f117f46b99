use crate::error::{Error, Result};
use crate::leb128::decode_uleb128_u32;

/// Parsed try block from a method's code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TryBlock {
    pub start_pc: u32,
    pub length: u32,
    pub catch_blocks: Vec<CatchBlock>,
}

impl TryBlock {
    /// First PC past the covered range.
    pub fn end_pc(&self) -> u32 {
        self.start_pc + self.length
    }
}

/// Parsed catch block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatchBlock {
    /// Type index + 1 (0 = catch-all).
    pub type_idx: u32,
    /// PC of the handler.
    pub handler_pc: u32,
    /// Handler code size.
    pub code_size: u32,
}

/// Code item of one method; borrows the bytecode from the file buffer.
#[derive(Debug, Clone)]
pub struct CodeItem<'a> {
    /// Offset of the item within the file.
    pub offset: u32,
    /// Number of virtual registers (excluding arguments).
    pub num_vregs: u32,
    /// Number of arguments.
    pub num_args: u32,
    /// Raw bytecode.
    pub code: &'a [u8],
    pub try_blocks: Vec<TryBlock>,
}

impl<'a> CodeItem<'a> {
    /// Parse a code item at the given offset.
    pub fn parse(data: &'a [u8], offset: u32) -> Result<Self> {
        let mut pos = offset as usize;
        if pos >= data.len() {
            return Err(Error::OffsetOutOfBounds(pos, data.len()));
        }

        let next = |pos: &mut usize| -> Result<u32> {
            let (value, consumed) = decode_uleb128_u32(data, *pos)?;
            *pos += consumed;
            Ok(value)
        };

        let num_vregs = next(&mut pos)?;
        let num_args = next(&mut pos)?;
        let code_size = next(&mut pos)?;
        let tries_size = next(&mut pos)?;

        let code_end = pos + code_size as usize;
        if code_end > data.len() {
            return Err(Error::OffsetOutOfBounds(code_end, data.len()));
        }
        let code = &data[pos..code_end];
        pos = code_end;

        let mut try_blocks = Vec::with_capacity(tries_size.min(64) as usize);
        for _ in 0..tries_size {
            let block_off = pos;
            let start_pc = next(&mut pos)?;
            let length = next(&mut pos)?;
            let num_catches = next(&mut pos)?;
            if start_pc as u64 + length as u64 > code_size as u64 {
                return Err(Error::InvalidTryBlock(block_off));
            }

            let mut catch_blocks = Vec::with_capacity(num_catches.min(64) as usize);
            for _ in 0..num_catches {
                let catch_off = pos;
                let type_idx = next(&mut pos)?;
                let handler_pc = next(&mut pos)?;
                let handler_size = next(&mut pos)?;
                if handler_pc >= code_size {
                    return Err(Error::InvalidTryBlock(catch_off));
                }
                catch_blocks.push(CatchBlock {
                    type_idx,
                    handler_pc,
                    code_size: handler_size,
                });
            }

            try_blocks.push(TryBlock {
                start_pc,
                length,
                catch_blocks,
            });
        }

        log::trace!(
            "code item {offset:#x}: {num_vregs} vregs, {num_args} args, {code_size} bytes, {} try blocks",
            try_blocks.len()
        );

        Ok(Self {
            offset,
            num_vregs,
            num_args,
            code,
            try_blocks,
        })
    }

    /// Flattened exception table: `(try begin, try end, handler pc, type index)`
    /// in try-block then handler order.
    pub fn exception_table(&self) -> Vec<(u32, u32, u32, u32)> {
        self.try_blocks
            .iter()
            .flat_map(|tb| {
                tb.catch_blocks
                    .iter()
                    .map(move |cb| (tb.start_pc, tb.end_pc(), cb.handler_pc, cb.type_idx))
            })
            .collect()
    }
}
