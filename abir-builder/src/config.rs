use serde::Deserialize;

/// Policy knobs for the builder and the per-unit pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuilderConfig {
    /// Integer constants unify with any numeric type during phi typing.
    pub unify_int_constants: bool,
    /// Replace phis whose inputs are all one value (or the phi itself).
    pub remove_trivial_phis: bool,
    /// Leave try regions without a throwing instruction unwired.
    pub prune_unused_regions: bool,
    /// Worker threads for `compile_unit`; the global pool when unset.
    pub threads: Option<usize>,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            unify_int_constants: true,
            remove_trivial_phis: true,
            prune_unused_regions: true,
            threads: None,
        }
    }
}
