//! Building every method of a unit on a worker pool.

use rayon::prelude::*;

use crate::config::BuilderConfig;
use crate::error::BuildError;
use crate::method::{CalleeResolver, MethodDescriptor};
use crate::{BuiltMethod, build_method};

/// Result of building one method of a unit.
#[derive(Debug)]
pub struct MethodOutcome {
    pub name: String,
    pub result: Result<BuiltMethod, BuildError>,
}

impl MethodOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Build `methods` in parallel. Outcomes are returned in input order and a
/// failing method never stops the others.
pub fn compile_unit(
    methods: &[MethodDescriptor<'_>],
    resolver: &(dyn CalleeResolver + Sync),
    config: &BuilderConfig,
) -> Vec<MethodOutcome> {
    let run = || {
        methods
            .par_iter()
            .map(|method| build_one(method, resolver, config))
            .collect::<Vec<_>>()
    };
    let outcomes = match config.threads {
        Some(threads) => match rayon::ThreadPoolBuilder::new().num_threads(threads).build() {
            Ok(pool) => pool.install(run),
            Err(e) => {
                log::warn!("cannot start {threads} worker threads ({e}), using the global pool");
                run()
            }
        },
        None => run(),
    };

    let failed = outcomes.iter().filter(|o| !o.is_ok()).count();
    log::debug!("built {} methods, {failed} failed", outcomes.len());
    outcomes
}

fn build_one(
    method: &MethodDescriptor<'_>,
    resolver: &(dyn CalleeResolver + Sync),
    config: &BuilderConfig,
) -> MethodOutcome {
    let result = build_method(method, resolver, config);
    if let Err(e) = &result {
        match e.pc() {
            Some(pc) => log::warn!("{} @ {pc:#x}: {e}", method.name),
            None => log::warn!("{}: {e}", method.name),
        }
    }
    MethodOutcome {
        name: method.name.clone(),
        result,
    }
}
