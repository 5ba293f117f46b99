//! Dominator tree (Cooper, Harvey & Kennedy, "A Simple, Fast Dominance
//! Algorithm").

use crate::block::BlockId;
use crate::graph::Graph;
use crate::inst::InstId;

#[derive(Debug, Clone)]
pub struct DominatorTree {
    idom: Vec<Option<BlockId>>,
    /// Reverse-postorder number per block; `usize::MAX` when unreachable.
    rpo_number: Vec<usize>,
    rpo: Vec<BlockId>,
}

impl DominatorTree {
    /// Compute dominators over all edges, exceptional ones included.
    pub fn compute(graph: &Graph) -> Self {
        let rpo = graph.reverse_postorder();
        let mut rpo_number = vec![usize::MAX; graph.block_count()];
        for (n, b) in rpo.iter().enumerate() {
            rpo_number[b.index()] = n;
        }

        let start = graph.start();
        let mut idom: Vec<Option<BlockId>> = vec![None; graph.block_count()];
        idom[start.index()] = Some(start);

        let mut changed = true;
        while changed {
            changed = false;
            for &block in rpo.iter().skip(1) {
                let mut new_idom: Option<BlockId> = None;
                for pred in graph.block(block).pred_blocks() {
                    if idom[pred.index()].is_none() {
                        continue;
                    }
                    new_idom = Some(match new_idom {
                        None => pred,
                        Some(cur) => intersect(&idom, &rpo_number, pred, cur),
                    });
                }
                if new_idom.is_some() && idom[block.index()] != new_idom {
                    idom[block.index()] = new_idom;
                    changed = true;
                }
            }
        }

        Self {
            idom,
            rpo_number,
            rpo,
        }
    }

    /// Immediate dominator; `None` for Start and unreachable blocks.
    pub fn idom(&self, block: BlockId) -> Option<BlockId> {
        match self.idom.get(block.index()).copied().flatten() {
            Some(d) if d != block => Some(d),
            _ => None,
        }
    }

    pub fn is_reachable(&self, block: BlockId) -> bool {
        self.idom.get(block.index()).is_some_and(Option::is_some)
    }

    /// Whether `a` dominates `b`. Every block dominates itself.
    pub fn dominates(&self, a: BlockId, b: BlockId) -> bool {
        if !self.is_reachable(a) || !self.is_reachable(b) {
            return false;
        }
        let mut cur = b;
        loop {
            if cur == a {
                return true;
            }
            // Walking up only decreases the RPO number.
            if self.rpo_number[cur.index()] < self.rpo_number[a.index()] {
                return false;
            }
            match self.idom(cur) {
                Some(up) => cur = up,
                None => return false,
            }
        }
    }

    /// Reverse postorder the tree was computed from.
    pub fn rpo(&self) -> &[BlockId] {
        &self.rpo
    }

    pub fn rpo_number(&self, block: BlockId) -> Option<usize> {
        self.rpo_number
            .get(block.index())
            .copied()
            .filter(|&n| n != usize::MAX)
    }

    /// Whether the definition `def` is available at `user`.
    ///
    /// Within one block, phis precede everything and other instructions
    /// follow program order.
    pub fn inst_dominates(&self, graph: &Graph, def: InstId, user: InstId) -> bool {
        let def_block = graph.inst(def).block();
        let user_block = graph.inst(user).block();
        if def_block != user_block {
            return self.dominates(def_block, user_block);
        }
        match (graph.position_in_block(def), graph.position_in_block(user)) {
            (Some(d), Some(u)) => d < u,
            _ => false,
        }
    }
}

fn intersect(
    idom: &[Option<BlockId>],
    rpo_number: &[usize],
    mut a: BlockId,
    mut b: BlockId,
) -> BlockId {
    while a != b {
        while rpo_number[a.index()] > rpo_number[b.index()] {
            a = idom[a.index()].unwrap_or(a);
        }
        while rpo_number[b.index()] > rpo_number[a.index()] {
            b = idom[b.index()].unwrap_or(b);
        }
    }
    a
}
