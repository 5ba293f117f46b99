//! Post-pass over the phis left by definition propagation.
//!
//! Runs, in order: trivial-phi elimination, dead-phi elimination with type
//! back-fill, a dominance audit of every input, and a gap audit. Running it
//! again on its own output changes nothing.

use std::collections::HashSet;

use abir_ir::{DataType, DominatorTree, Graph, InstId, InstKind};

use crate::config::BuilderConfig;
use crate::error::BuildError;

/// What one resolver run changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolveStats {
    /// Phis replaced by their single input.
    pub trivial_removed: usize,
    /// Phis and catch-phis removed because only SaveStates used them.
    pub dead_removed: usize,
    /// Phis given a type by back-fill.
    pub typed: usize,
    /// SaveState inputs dropped by the dominance audit.
    pub save_state_inputs_stripped: usize,
}

impl ResolveStats {
    pub fn is_noop(&self) -> bool {
        *self == ResolveStats::default()
    }
}

pub fn resolve_phis(
    graph: &mut Graph,
    dom: &DominatorTree,
    config: &BuilderConfig,
) -> Result<ResolveStats, BuildError> {
    let mut stats = ResolveStats::default();
    if config.remove_trivial_phis {
        remove_trivial_phis(graph, &mut stats)?;
    }
    remove_dead_and_backfill(graph, config, &mut stats);
    audit_dominance(graph, dom, &mut stats)?;
    // Dropping a gap phi can leave an accumulator catch-phi unused.
    while audit_gaps(graph, &mut stats)? {}

    for (id, inst) in graph.insts() {
        if inst.is_any_phi() && !inst.ty().is_typed() {
            log::trace!("phi {id} left untyped");
            return Err(BuildError::AmbiguousPhiType {
                pc: inst.pc(),
                vreg: inst.vreg().unwrap_or_default(),
            });
        }
    }
    Ok(stats)
}

fn live_phis(graph: &Graph) -> Vec<InstId> {
    graph
        .insts()
        .filter(|(_, i)| i.is_any_phi())
        .map(|(id, _)| id)
        .collect()
}

fn distinct_users(graph: &Graph, inst: InstId) -> Vec<InstId> {
    let mut users = graph.inst(inst).users().to_vec();
    users.sort_unstable();
    users.dedup();
    users
}

/// Replace every phi whose inputs are one value (or the phi itself) by
/// that value, until none is left.
fn remove_trivial_phis(graph: &mut Graph, stats: &mut ResolveStats) -> Result<(), BuildError> {
    let mut work: Vec<InstId> = graph
        .insts()
        .filter(|(_, i)| i.is_phi())
        .map(|(id, _)| id)
        .collect();
    while let Some(phi) = work.pop() {
        let inst = graph.inst(phi);
        if inst.is_removed() {
            continue;
        }
        let InstKind::Phi { vreg, inputs } = inst.kind() else {
            continue;
        };
        let vreg = *vreg;
        let mut same = None;
        let mut trivial = true;
        for input in inputs {
            match *input {
                None => {
                    trivial = false;
                    break;
                }
                Some(i) if i == phi => {}
                Some(i) => match same {
                    None => same = Some(i),
                    Some(s) if s == i => {}
                    Some(_) => {
                        trivial = false;
                        break;
                    }
                },
            }
        }
        let (true, Some(replacement)) = (trivial, same) else {
            continue;
        };

        let ty = inst.ty();
        let pc = inst.pc();
        let rep = graph.inst(replacement);
        if ty.is_typed() && rep.is_any_phi() {
            match rep.ty() {
                DataType::NoType => graph.set_type(replacement, ty),
                t if t == ty => {}
                _ => return Err(BuildError::AmbiguousPhiType { pc, vreg }),
            }
        }

        for user in distinct_users(graph, phi) {
            if user != phi && graph.inst(user).is_phi() {
                work.push(user);
            }
        }
        graph.replace_all_uses(phi, replacement);
        graph.remove_inst(phi);
        stats.trivial_removed += 1;
    }
    Ok(())
}

/// Remove clusters of untyped phis that only feed SaveStates; give every
/// other untyped phi the type its real inputs agree on.
fn remove_dead_and_backfill(graph: &mut Graph, config: &BuilderConfig, stats: &mut ResolveStats) {
    for phi in live_phis(graph) {
        let inst = graph.inst(phi);
        if inst.is_removed() || inst.ty().is_typed() {
            continue;
        }

        let mut cluster = vec![phi];
        let mut seen: HashSet<InstId> = HashSet::from([phi]);
        let mut live = false;
        let mut i = 0;
        while i < cluster.len() && !live {
            for user in distinct_users(graph, cluster[i]) {
                let u = graph.inst(user);
                if u.is_save_state() {
                    continue;
                }
                if u.is_any_phi() && !u.ty().is_typed() {
                    if seen.insert(user) {
                        cluster.push(user);
                    }
                    continue;
                }
                live = true;
                break;
            }
            i += 1;
        }

        if !live {
            for &member in &cluster {
                graph.strip_from_save_states(member);
            }
            graph.remove_inst_group(&cluster);
            stats.dead_removed += cluster.len();
            continue;
        }

        if let Some(ty) = infer_type(graph, phi, config) {
            graph.set_type(phi, ty);
            stats.typed += 1;
        }
    }
}

/// The type the transitive non-phi inputs of `phi` agree on.
fn infer_type(graph: &Graph, phi: InstId, config: &BuilderConfig) -> Option<DataType> {
    let mut types: Vec<DataType> = Vec::new();
    let mut int_constant = false;
    let mut seen: HashSet<InstId> = HashSet::from([phi]);
    let mut stack = vec![phi];
    while let Some(cur) = stack.pop() {
        for input in graph.inst(cur).inputs() {
            if !seen.insert(input) {
                continue;
            }
            let inst = graph.inst(input);
            if inst.is_any_phi() && !inst.ty().is_typed() {
                stack.push(input);
            } else if config.unify_int_constants && inst.is_int_constant() {
                int_constant = true;
            } else if !types.contains(&inst.ty()) {
                types.push(inst.ty());
            }
        }
    }
    match types.as_slice() {
        [] if int_constant => Some(DataType::Int64),
        [ty] if !int_constant || ty.is_numeric() => Some(*ty),
        _ => None,
    }
}

/// Strip SaveState inputs that do not dominate their SaveState; any other
/// input that fails dominance is an unresolved definition.
fn audit_dominance(
    graph: &mut Graph,
    dom: &DominatorTree,
    stats: &mut ResolveStats,
) -> Result<(), BuildError> {
    let mut strip: Vec<(InstId, usize)> = Vec::new();
    for (id, inst) in graph.insts() {
        match inst.kind() {
            InstKind::SaveState { inputs, .. } => {
                for (pos, &input) in inputs.iter().enumerate().rev() {
                    if !dom.inst_dominates(graph, input, id) {
                        strip.push((id, pos));
                    }
                }
            }
            InstKind::Phi { vreg, inputs } => {
                let preds = graph.block(inst.block()).preds();
                for (input, edge) in inputs.iter().zip(preds) {
                    let Some(input) = input else { continue };
                    if !dom.dominates(graph.inst(*input).block(), edge.block) {
                        return Err(BuildError::UnresolvedDefinition {
                            pc: inst.pc(),
                            vreg: Some(*vreg),
                        });
                    }
                }
            }
            InstKind::CatchPhi { .. } => {}
            InstKind::Op { inputs, .. } => {
                for &input in inputs {
                    if !dom.inst_dominates(graph, input, id) {
                        return Err(BuildError::UnresolvedDefinition {
                            pc: inst.pc(),
                            vreg: graph.inst(input).vreg(),
                        });
                    }
                }
            }
        }
    }
    // Positions were collected highest first per SaveState.
    for (save_state, pos) in strip {
        graph.remove_save_state_input(save_state, pos);
        stats.save_state_inputs_stripped += 1;
    }
    Ok(())
}

/// A phi with a gap, or a register catch-phi no thrower fed, may only
/// survive as SaveState bookkeeping; it is dropped from there too.
/// Returns whether anything was removed.
fn audit_gaps(graph: &mut Graph, stats: &mut ResolveStats) -> Result<bool, BuildError> {
    let acc = graph.acc_slot();
    let mut changed = false;
    for phi in live_phis(graph) {
        let inst = graph.inst(phi);
        if inst.is_removed() {
            continue;
        }
        let vreg = inst.vreg().unwrap_or_default();
        let undefined = match inst.kind() {
            InstKind::Phi { .. } => inst.has_gap(),
            InstKind::CatchPhi { inputs, .. } => vreg != acc && inputs.is_empty(),
            _ => false,
        };
        let unused_acc = inst.is_catch_phi() && vreg == acc && inst.users().is_empty();
        if !undefined && !unused_acc {
            continue;
        }
        let users = distinct_users(graph, phi);
        if let Some(&user) = users.iter().find(|&&u| !graph.inst(u).is_save_state()) {
            return Err(BuildError::UnresolvedDefinition {
                pc: graph.inst(user).pc(),
                vreg: Some(vreg),
            });
        }
        graph.strip_from_save_states(phi);
        graph.remove_inst_group(&[phi]);
        stats.dead_removed += 1;
        changed = true;
    }
    Ok(changed)
}
