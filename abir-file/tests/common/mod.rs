use abir_file::{CatchBlock, TryBlock};

pub fn try_block(start_pc: u32, length: u32, handlers: &[(u32, u32)]) -> TryBlock {
    TryBlock {
        start_pc,
        length,
        catch_blocks: handlers
            .iter()
            .map(|&(type_idx, handler_pc)| CatchBlock {
                type_idx,
                handler_pc,
                code_size: 0,
            })
            .collect(),
    }
}
