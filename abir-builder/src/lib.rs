pub mod config;
pub mod error;
pub mod method;
pub mod phi_resolver;
pub mod pipeline;
pub mod regions;

mod cfg_builder;
mod propagate;

pub use config::BuilderConfig;
pub use error::BuildError;
pub use method::{CalleeInfo, CalleeResolver, CatchEntry, MethodDescriptor, NoCallees};
pub use phi_resolver::{ResolveStats, resolve_phis};
pub use pipeline::{MethodOutcome, compile_unit};
pub use regions::RegionTracker;

use abir_ir::{Graph, LoopInfo};

use crate::propagate::Propagator;

/// Counts describing a built graph.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildStats {
    pub blocks: usize,
    pub insts: usize,
    pub phis: usize,
    pub catch_phis: usize,
    pub loops: usize,
    /// Blocks removed as unreachable.
    pub pruned: usize,
}

/// A successfully built method graph.
#[derive(Debug)]
pub struct BuiltMethod {
    pub graph: Graph,
    pub stats: BuildStats,
}

/// Build the IR graph of one method.
///
/// On error the partial graph is discarded; the caller should skip the
/// method and carry on with the rest of its unit.
pub fn build_method(
    method: &MethodDescriptor<'_>,
    resolver: &dyn CalleeResolver,
    config: &BuilderConfig,
) -> Result<BuiltMethod, BuildError> {
    let mut graph = Graph::new(method.num_vregs, method.num_args);
    let mut tracker = RegionTracker::from_catches(&method.catches);

    let info = cfg_builder::build_cfg(&mut graph, method.code, &mut tracker, config)?;
    log::debug!(
        "{}: {} blocks, {} try regions, {} pruned",
        method.name,
        graph.block_count(),
        tracker.len(),
        info.pruned
    );

    let (dom, loops) = LoopInfo::analyze(&mut graph);
    log::debug!("{}: {} loops", method.name, loops.loops().len());

    Propagator::new(&mut graph, method, resolver, &tracker, &info, &loops).run()?;
    log::debug!("{}: propagated {} nodes", method.name, graph.insts().count());

    let resolved = resolve_phis(&mut graph, &dom, config)?;
    log::debug!("{}: phi resolution {:?}", method.name, resolved);

    let stats = BuildStats {
        blocks: graph.block_count(),
        insts: graph.insts().count(),
        phis: graph.insts().filter(|(_, i)| i.is_phi()).count(),
        catch_phis: graph.insts().filter(|(_, i)| i.is_catch_phi()).count(),
        loops: loops.loops().len(),
        pruned: info.pruned,
    };
    Ok(BuiltMethod { graph, stats })
}
