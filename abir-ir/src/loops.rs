//! Natural-loop discovery and preheader insertion.

use crate::block::{BlockFlags, BlockId};
use crate::dominators::DominatorTree;
use crate::graph::Graph;

#[derive(Debug, Clone)]
pub struct Loop {
    pub header: BlockId,
    /// Sources of the back edges into `header`.
    pub latches: Vec<BlockId>,
    /// Header first, then the rest of the body in discovery order.
    pub blocks: Vec<BlockId>,
    /// Unique entry predecessor, when there is one.
    pub preheader: Option<BlockId>,
}

#[derive(Debug, Clone, Default)]
pub struct LoopInfo {
    loops: Vec<Loop>,
    header_loop: Vec<Option<usize>>,
    irreducible_entries: Vec<BlockId>,
}

impl LoopInfo {
    pub fn compute(graph: &Graph, dom: &DominatorTree) -> Self {
        let mut info = LoopInfo {
            header_loop: vec![None; graph.block_count()],
            ..Default::default()
        };

        for &block in dom.rpo() {
            let Some(from) = dom.rpo_number(block) else {
                continue;
            };
            for succ in graph.block(block).succ_blocks() {
                let Some(to) = dom.rpo_number(succ) else {
                    continue;
                };
                if to > from {
                    continue;
                }
                if dom.dominates(succ, block) {
                    let idx = match info.header_loop[succ.index()] {
                        Some(idx) => idx,
                        None => {
                            info.loops.push(Loop {
                                header: succ,
                                latches: Vec::new(),
                                blocks: vec![succ],
                                preheader: None,
                            });
                            info.header_loop[succ.index()] = Some(info.loops.len() - 1);
                            info.loops.len() - 1
                        }
                    };
                    info.loops[idx].latches.push(block);
                } else if !info.irreducible_entries.contains(&succ) {
                    info.irreducible_entries.push(succ);
                }
            }
        }

        for lp in &mut info.loops {
            collect_body(graph, lp);
            let outer: Vec<BlockId> = graph
                .block(lp.header)
                .pred_blocks()
                .filter(|p| !lp.latches.contains(p))
                .collect();
            if let [single] = outer.as_slice() {
                lp.preheader = Some(*single);
            }
        }
        info
    }

    /// Dominators and loops for `graph`, inserting a preheader in front of
    /// every header entered from more than one block. Both analyses are
    /// recomputed after insertion; headers are flagged `LOOP_HEADER`.
    pub fn analyze(graph: &mut Graph) -> (DominatorTree, LoopInfo) {
        let mut dom = DominatorTree::compute(graph);
        let mut loops = LoopInfo::compute(graph, &dom);

        let mut inserted = 0;
        for lp in &loops.loops {
            let outer = graph
                .block(lp.header)
                .preds()
                .iter()
                .filter(|e| !e.exceptional && !lp.latches.contains(&e.block))
                .count();
            if outer > 1 {
                let latches = lp.latches.clone();
                graph.insert_block_before(lp.header, BlockFlags::PREHEADER, |p| {
                    !latches.contains(&p)
                });
                inserted += 1;
            }
        }
        if inserted > 0 {
            log::trace!("inserted {inserted} loop preheader(s)");
            dom = DominatorTree::compute(graph);
            loops = LoopInfo::compute(graph, &dom);
        }

        for block in graph.block_ids() {
            graph.remove_flags(block, BlockFlags::LOOP_HEADER);
        }
        for lp in &loops.loops {
            graph.add_flags(lp.header, BlockFlags::LOOP_HEADER);
        }
        (dom, loops)
    }

    pub fn loops(&self) -> &[Loop] {
        &self.loops
    }

    /// The loop headed by `block`.
    pub fn loop_of_header(&self, block: BlockId) -> Option<&Loop> {
        self.header_loop
            .get(block.index())
            .copied()
            .flatten()
            .map(|i| &self.loops[i])
    }

    pub fn is_header(&self, block: BlockId) -> bool {
        self.loop_of_header(block).is_some()
    }

    pub fn preheader(&self, header: BlockId) -> Option<BlockId> {
        self.loop_of_header(header).and_then(|lp| lp.preheader)
    }

    /// Whether `pred -> header` is a back edge.
    pub fn is_back_edge(&self, pred: BlockId, header: BlockId) -> bool {
        self.loop_of_header(header)
            .is_some_and(|lp| lp.latches.contains(&pred))
    }

    /// Targets of retreating edges whose source they do not dominate.
    pub fn irreducible_entries(&self) -> &[BlockId] {
        &self.irreducible_entries
    }
}

fn collect_body(graph: &Graph, lp: &mut Loop) {
    let mut stack: Vec<BlockId> = lp
        .latches
        .iter()
        .copied()
        .filter(|&l| l != lp.header)
        .collect();
    for &latch in &stack {
        if !lp.blocks.contains(&latch) {
            lp.blocks.push(latch);
        }
    }
    while let Some(block) = stack.pop() {
        for pred in graph.block(block).pred_blocks() {
            if !lp.blocks.contains(&pred) {
                lp.blocks.push(pred);
                stack.push(pred);
            }
        }
    }
}
