//! Block discovery, edge wiring and try/catch region connection.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use abir_ir::{BlockFlags, BlockId, Graph};
use abir_isa::{BytecodeInstruction, DecodeError, OpcodeFlags};

use crate::config::BuilderConfig;
use crate::error::BuildError;
use crate::regions::RegionTracker;

/// Side tables produced alongside the skeleton graph.
#[derive(Debug, Default)]
pub(crate) struct CfgInfo {
    /// Catch-begin block per handler PC.
    pub catch_begins: BTreeMap<u32, BlockId>,
    /// Handler type ids of the region each try-begin block opens.
    pub try_types: HashMap<BlockId, Vec<u32>>,
    /// Blocks removed as unreachable.
    pub pruned: usize,
}

const THROWING: OpcodeFlags = OpcodeFlags::CAN_THROW
    .union(OpcodeFlags::THROW)
    .union(OpcodeFlags::CALL);

/// Whether executing `insn` may transfer control to a handler.
pub(crate) fn may_throw(insn: &BytecodeInstruction<'_>) -> bool {
    insn.flags().intersects(THROWING)
}

/// Build the block skeleton of `code` into `graph` and connect the try
/// regions of `tracker`.
pub(crate) fn build_cfg(
    graph: &mut Graph,
    code: &[u8],
    tracker: &mut RegionTracker,
    config: &BuilderConfig,
) -> Result<CfgInfo, BuildError> {
    let insns = abir_isa::decode(code).map_err(|e| BuildError::from_decode(code, e))?;
    let code_len = code.len() as u32;
    let (start, end) = (graph.start(), graph.end());

    if insns.is_empty() {
        graph.add_edge(start, end, false);
        return Ok(CfgInfo::default());
    }

    let at_insn = |pc: u32| insns.binary_search_by_key(&pc, |i| i.pc()).is_ok();
    let misaligned = |pc: u32| BuildError::MalformedBytecode(DecodeError::Misaligned(pc as usize));

    // Block boundaries.
    let mut bounds = BTreeSet::from([0u32]);
    for insn in &insns {
        if let Some(target) = insn.jump_target() {
            // In range: `decode` validated every target.
            bounds.insert(target as u32);
        }
        let opcode = insn.opcode();
        if (opcode.is_jump() || opcode.is_return_or_throw()) && insn.next_pc() < code_len {
            bounds.insert(insn.next_pc());
        }
    }
    for region in tracker.regions() {
        if region.begin >= region.end {
            continue;
        }
        if !at_insn(region.begin) {
            return Err(misaligned(region.begin));
        }
        bounds.insert(region.begin);
        if region.end < code_len {
            if !at_insn(region.end) {
                return Err(misaligned(region.end));
            }
            bounds.insert(region.end);
        } else if region.end > code_len {
            return Err(misaligned(region.end));
        }
    }
    for pc in tracker.handler_pcs() {
        if !at_insn(pc) {
            return Err(misaligned(pc));
        }
        bounds.insert(pc);
    }

    // Blocks, with the index of each block's last instruction.
    let bounds: Vec<u32> = bounds.into_iter().collect();
    let mut block_at: BTreeMap<u32, BlockId> = BTreeMap::new();
    let mut last_insn: Vec<(BlockId, usize)> = Vec::with_capacity(bounds.len());
    let mut cursor = 0usize;
    for (i, &pc) in bounds.iter().enumerate() {
        let block_end = bounds.get(i + 1).copied().unwrap_or(code_len);
        let block = graph.create_block(pc, block_end);
        block_at.insert(pc, block);
        while cursor + 1 < insns.len() && insns[cursor + 1].pc() < block_end {
            cursor += 1;
        }
        last_insn.push((block, cursor));
        cursor += 1;
    }
    log::trace!("{} blocks from {} instructions", bounds.len(), insns.len());

    // Normal edges.
    graph.add_edge(start, block_at[&0], false);
    let mut falls_off = Vec::new();
    for &(block, idx) in &last_insn {
        let insn = &insns[idx];
        let opcode = insn.opcode();
        let fallthrough = block_at.get(&insn.next_pc()).copied();
        if opcode.is_return_or_throw() {
            graph.add_edge(block, end, false);
            continue;
        }
        if let Some(target) = insn.jump_target() {
            graph.add_edge(block, block_at[&(target as u32)], false);
            if !opcode.is_conditional() {
                continue;
            }
        }
        match fallthrough {
            Some(next) => {
                graph.add_edge(block, next, false);
            }
            None => falls_off.push(block),
        }
    }

    // Assign and wire regions until no more become reachable. A region
    // inside a handler is only reachable once its enclosing region's
    // exceptional edges exist.
    let mut info = CfgInfo::default();
    let mut try_end_at: HashMap<BlockId, u32> = HashMap::new();
    let mut wired = vec![false; tracker.regions().len()];
    loop {
        assign_regions(graph, tracker, &insns, &last_insn);
        if !config.prune_unused_regions {
            for region in tracker.regions_mut() {
                region.throwing = region.begin < region.end;
            }
        }

        let mut progress = false;
        for (i, region) in tracker.regions().iter().enumerate() {
            if wired[i] || !region.throwing {
                continue;
            }
            wired[i] = true;
            let first = block_at[&region.begin];
            let Some((_, &last)) = block_at.range(..region.end).next_back() else {
                continue;
            };
            progress = true;

            let inside = |graph: &Graph, pred: BlockId| {
                let b = graph.block(pred);
                if !b.is_synthetic() {
                    return region.covers(b.pc());
                }
                // A try-end of another region that closes strictly inside this one.
                try_end_at
                    .get(&pred)
                    .is_some_and(|&end| region.begin < end && end < region.end)
            };
            let outside: Vec<BlockId> = graph
                .block(first)
                .pred_blocks()
                .filter(|&p| !inside(graph, p))
                .collect();
            let try_begin =
                graph.insert_block_before(first, BlockFlags::TRY_BEGIN, |p| outside.contains(&p));
            let try_end = graph.insert_block_after(last, BlockFlags::TRY_END);
            try_end_at.insert(try_end, region.end);

            for handler in &region.handlers {
                let catch_begin = *info.catch_begins.entry(handler.pc).or_insert_with(|| {
                    graph.insert_block_before(block_at[&handler.pc], BlockFlags::CATCH_BEGIN, |_| false)
                });
                graph.add_edge(try_begin, catch_begin, true);
                graph.add_edge(try_end, catch_begin, true);
            }
            info.try_types
                .insert(try_begin, region.handlers.iter().map(|h| h.type_id).collect());
        }
        if !progress {
            break;
        }
    }
    for (region, _) in tracker.regions().iter().zip(&wired).filter(|(_, w)| !**w) {
        log::trace!(
            "region [{:#x}, {:#x}) never throws; left unwired",
            region.begin,
            region.end
        );
    }

    // Prune, then carry the side tables over to the compacted ids.
    let remap = graph.remove_unreachable();
    info.pruned = remap.iter().filter(|m| m.is_none()).count();
    let map = |b: BlockId| remap.get(b.index()).copied().flatten();
    info.catch_begins = std::mem::take(&mut info.catch_begins)
        .into_iter()
        .filter_map(|(pc, b)| map(b).map(|b| (pc, b)))
        .collect();
    info.try_types = std::mem::take(&mut info.try_types)
        .into_iter()
        .filter_map(|(b, types)| map(b).map(|b| (b, types)))
        .collect();
    for region in tracker.regions_mut() {
        region.blocks = region.blocks.iter().filter_map(|&b| map(b)).collect();
    }
    if info.pruned > 0 {
        log::trace!("pruned {} unreachable blocks", info.pruned);
    }

    // Live code must not run off the end of the method.
    if falls_off.iter().any(|&b| map(b).is_some()) {
        return Err(BuildError::MalformedBytecode(DecodeError::Truncated(
            code_len as usize,
        )));
    }

    classify_catch_blocks(graph);
    Ok(info)
}

/// Assign every reachable block to its innermost covering region and mark
/// the regions containing a throwing instruction. Recomputed from scratch
/// on every call.
fn assign_regions(
    graph: &mut Graph,
    tracker: &mut RegionTracker,
    insns: &[BytecodeInstruction<'_>],
    last_insn: &[(BlockId, usize)],
) {
    for region in tracker.regions_mut() {
        region.blocks.clear();
        region.throwing = false;
    }
    let reachable = graph.reachable();
    for &(block, idx) in last_insn {
        if !reachable[block.index()] {
            continue;
        }
        let first_pc = graph.block(block).pc();
        let Some(inner) = tracker.innermost_covering(first_pc).map(|r| r.id) else {
            continue;
        };
        graph.add_flags(block, BlockFlags::TRY);
        let first_idx = insns.partition_point(|i| i.pc() < first_pc);
        let throws = insns[first_idx..=idx].iter().any(may_throw);
        for region in tracker.regions_mut() {
            if region.covers(first_pc) {
                region.throwing |= throws;
                if region.id == inner {
                    region.blocks.push(block);
                }
            }
        }
    }
}

/// Flag blocks that can only be entered through an exceptional edge.
fn classify_catch_blocks(graph: &mut Graph) {
    let mut normal = vec![false; graph.block_count()];
    let mut stack = vec![graph.start()];
    normal[graph.start().index()] = true;
    while let Some(block) = stack.pop() {
        for edge in graph.block(block).succs() {
            if !edge.exceptional && !normal[edge.block.index()] {
                normal[edge.block.index()] = true;
                stack.push(edge.block);
            }
        }
    }
    for block in graph.block_ids() {
        let b = graph.block(block);
        if !normal[block.index()] && !b.is_start() && !b.is_end() {
            graph.add_flags(block, BlockFlags::CATCH);
        }
    }
}
