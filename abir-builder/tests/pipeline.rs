mod common;

use abir_builder::*;
use abir_isa::{Arg, Opcode};
use common::*;

fn returns_const(value: i64) -> Vec<u8> {
    assemble(|e| {
        e.emit(Opcode::Ldai, &[Arg::Imm(value)])?;
        e.emit(Opcode::Return, &[])?;
        Ok(())
    })
}

#[test]
fn unit_failures_stay_local() {
    let (a, b) = (returns_const(1), returns_const(2));
    let broken = [0xffu8];
    let methods = vec![
        MethodDescriptor::new("a", &a, 0, 0),
        MethodDescriptor::new("broken", &broken, 0, 0),
        MethodDescriptor::new("b", &b, 0, 0),
    ];
    let config = BuilderConfig {
        threads: Some(2),
        ..Default::default()
    };
    let outcomes = compile_unit(&methods, &NoCallees, &config);

    let names: Vec<_> = outcomes.iter().map(|o| o.name.as_str()).collect();
    assert_eq!(names, ["a", "broken", "b"]);
    assert!(outcomes[0].is_ok());
    assert!(matches!(
        outcomes[1].result,
        Err(BuildError::UnsupportedInstruction { pc: 0, .. })
    ));
    assert!(outcomes[2].is_ok());
}

#[test]
fn unit_on_global_pool_matches_single_builds() {
    let bodies: Vec<Vec<u8>> = (0..8).map(returns_const).collect();
    let methods: Vec<_> = bodies
        .iter()
        .enumerate()
        .map(|(i, code)| MethodDescriptor::new(format!("m{i}"), code, 0, 0))
        .collect();
    let config = BuilderConfig::default();
    let outcomes = compile_unit(&methods, &NoCallees, &config);

    assert_eq!(outcomes.len(), methods.len());
    for (method, outcome) in methods.iter().zip(&outcomes) {
        let single = build(method);
        let Ok(built) = &outcome.result else {
            panic!("{} failed", outcome.name);
        };
        assert_eq!(built.stats, single.stats);
        assert_eq!(built.graph.to_string(), single.graph.to_string());
    }
}

#[test]
fn config_from_yaml() {
    let config: BuilderConfig =
        serde_yaml::from_str("remove_trivial_phis: false\nthreads: 4\n").unwrap();
    assert!(!config.remove_trivial_phis);
    assert!(config.unify_int_constants);
    assert!(config.prune_unused_regions);
    assert_eq!(config.threads, Some(4));

    let err = serde_yaml::from_str::<BuilderConfig>("prune: true\n").unwrap_err();
    assert!(err.to_string().contains("unknown field"), "{err}");
}
