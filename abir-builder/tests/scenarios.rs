mod common;

use std::collections::HashMap;

use abir_builder::*;
use abir_ir::{BlockFlags, BlockId, DataType, Graph, IrOpcode};
use abir_isa::{Arg, Opcode};
use common::*;

#[test]
fn straight_line_has_one_block_and_no_phis() {
    // lda a0; addi 1; neg; return
    let code = assemble(|e| {
        e.emit(Opcode::Lda, &[Arg::Reg(0)])?;
        e.emit(Opcode::Addi, &[Arg::Imm(1)])?;
        e.emit(Opcode::Neg, &[])?;
        e.emit(Opcode::Return, &[])?;
        Ok(())
    });
    let method = MethodDescriptor::new("straight", &code, 0, 1).with_arg_types(vec![DataType::Int32]);
    let built = build(&method);
    let g = &built.graph;

    let blocks = real_blocks(g);
    assert_eq!(blocks.len(), 1);
    let body = blocks[0];
    assert_eq!(g.block(g.start()).succ_blocks().collect::<Vec<_>>(), vec![body]);
    assert_eq!(g.block(body).succ_blocks().collect::<Vec<_>>(), vec![g.end()]);
    assert_eq!(g.block(body).insts().len(), 3);
    assert!(g.block(body).phis().is_empty());
    assert_eq!(built.stats.phis, 0);
    assert_eq!(built.stats.blocks, 3);
}

#[test]
fn if_else_merge_gets_one_phi() {
    let code = assemble(|e| {
        let (other, join) = (e.create_label(), e.create_label());
        e.emit(Opcode::Lda, &[Arg::Reg(1)])?;
        e.emit(Opcode::Jeqz, &[Arg::Label(other)])?;
        e.emit(Opcode::Ldai, &[Arg::Imm(1)])?;
        e.emit(Opcode::Sta, &[Arg::Reg(0)])?;
        e.emit(Opcode::Jmp, &[Arg::Label(join)])?;
        e.bind(other)?;
        e.emit(Opcode::Ldai, &[Arg::Imm(2)])?;
        e.emit(Opcode::Sta, &[Arg::Reg(0)])?;
        e.bind(join)?;
        e.emit(Opcode::Lda, &[Arg::Reg(0)])?;
        e.emit(Opcode::Return, &[])?;
        Ok(())
    });
    let method = MethodDescriptor::new("diamond", &code, 1, 1).with_arg_types(vec![DataType::Int32]);
    let built = build(&method);
    let g = &built.graph;

    assert_eq!(real_blocks(g).len(), 4);
    let join = find_block(g, |b| !b.is_synthetic() && b.preds().len() == 2);
    let phis = g.block(join).phis();
    assert_eq!(phis.len(), 1);
    let phi = g.inst(phis[0]);
    assert_eq!(phi.vreg(), Some(0));
    assert_eq!(phi.ty(), DataType::Int32);
    let inputs: Vec<_> = phi.inputs().collect();
    assert_eq!(inputs.len(), 2);
    assert!(is_int_const(g, inputs[0], 1));
    assert!(is_int_const(g, inputs[1], 2));
    assert_phi_arity(g);
}

#[test]
fn throw_in_try_feeds_catch_phi() {
    // try { v0 = 7; throw null } catch { return v0 }
    let code = assemble(|e| {
        e.emit(Opcode::Movi, &[Arg::Reg(0), Arg::Imm(7)])?;
        e.emit(Opcode::MovNull, &[Arg::Reg(1)])?;
        e.emit(Opcode::Throw, &[Arg::Reg(1)])?;
        e.emit(Opcode::Lda, &[Arg::Reg(0)])?;
        e.emit(Opcode::Return, &[])?;
        Ok(())
    });
    let method = MethodDescriptor::new("try_throw", &code, 2, 0).with_catch(0, 6, 6, 0);
    let built = build(&method);
    let g = &built.graph;

    let catch_begin = find_block(g, |b| b.is_catch_begin());
    let try_begin = find_block(g, |b| b.is_try_begin());
    let try_end = find_block(g, |b| b.is_try_end());
    for from in [try_begin, try_end] {
        assert!(
            g.block(from)
                .succs()
                .iter()
                .any(|e| e.block == catch_begin && e.exceptional),
            "bb{from} has no exceptional edge to the catch-begin"
        );
    }
    assert!(g.block(catch_begin).is_catch());

    let phis = g.block(catch_begin).phis();
    assert_eq!(phis.len(), 1);
    let catch_phi = g.inst(phis[0]);
    assert!(catch_phi.is_catch_phi());
    assert_eq!(catch_phi.vreg(), Some(0));
    assert_eq!(catch_phi.input_count(), 1);
    let input = catch_phi.inputs().next().unwrap();
    assert!(is_int_const(g, input, 7));

    let try_node = g.block(try_begin).insts()[0];
    assert_eq!(g.inst(try_node).opcode(), Some(&IrOpcode::Try(vec![0])));
}

#[test]
fn catch_phi_has_one_input_per_thrower() {
    let code = assemble(|e| {
        e.emit(Opcode::Movi, &[Arg::Reg(0), Arg::Imm(1)])?;
        e.emit(Opcode::LdaStr, &[Arg::Id(1)])?;
        e.emit(Opcode::Movi, &[Arg::Reg(0), Arg::Imm(2)])?;
        e.emit(Opcode::LdaStr, &[Arg::Id(2)])?;
        e.emit(Opcode::ReturnObj, &[])?;
        // handler
        e.emit(Opcode::Lda, &[Arg::Reg(0)])?;
        e.emit(Opcode::Return, &[])?;
        Ok(())
    });
    // movi(2) lda.str(3) movi(2) lda.str(3) return.obj(1) -> handler at 11
    let method = MethodDescriptor::new("two_throwers", &code, 1, 0).with_catch(0, 10, 11, 0);
    let built = build(&method);
    let g = &built.graph;

    let catch_begin = find_block(g, |b| b.is_catch_begin());
    let phis = g.block(catch_begin).phis();
    assert_eq!(phis.len(), 1);
    let inputs: Vec<_> = g.inst(phis[0]).inputs().collect();
    assert_eq!(inputs.len(), 2);
    assert!(is_int_const(g, inputs[0], 1));
    assert!(is_int_const(g, inputs[1], 2));
}

#[test]
fn loop_header_phi_is_seeded_from_preheader() {
    // v0 = 0; while (v0 < a0) v0 += 1; return v0
    let code = assemble(|e| {
        let (head, exit) = (e.create_label(), e.create_label());
        e.emit(Opcode::Ldai, &[Arg::Imm(0)])?;
        e.emit(Opcode::Sta, &[Arg::Reg(0)])?;
        e.bind(head)?;
        e.emit(Opcode::Lda, &[Arg::Reg(0)])?;
        e.emit(Opcode::Jge, &[Arg::Reg(1), Arg::Label(exit)])?;
        e.emit(Opcode::Lda, &[Arg::Reg(0)])?;
        e.emit(Opcode::Addi, &[Arg::Imm(1)])?;
        e.emit(Opcode::Sta, &[Arg::Reg(0)])?;
        e.emit(Opcode::Jmp, &[Arg::Label(head)])?;
        e.bind(exit)?;
        e.emit(Opcode::Lda, &[Arg::Reg(0)])?;
        e.emit(Opcode::Return, &[])?;
        Ok(())
    });
    let method = MethodDescriptor::new("count", &code, 1, 1).with_arg_types(vec![DataType::Int32]);
    let built = build(&method);
    let g = &built.graph;

    assert_eq!(built.stats.loops, 1);
    let header = find_block(g, |b| b.is_loop_header());
    let phis = g.block(header).phis();
    assert_eq!(phis.len(), 1, "only v0 changes inside the loop");
    let phi = g.inst(phis[0]);
    assert_eq!(phi.vreg(), Some(0));
    assert_eq!(phi.ty(), DataType::Int32);
    let inputs: Vec<_> = phi.inputs().collect();
    assert!(is_int_const(g, inputs[0], 0));
    assert_eq!(g.inst(inputs[1]).opcode(), Some(&IrOpcode::Add));
    assert_phi_arity(g);
}

fn loop_passing_v0_to_call(second: Opcode) -> Vec<u8> {
    assemble(|e| {
        let (head, exit) = (e.create_label(), e.create_label());
        e.emit(Opcode::Movi, &[Arg::Reg(0), Arg::Imm(0)])?;
        e.bind(head)?;
        e.emit(Opcode::Lda, &[Arg::Reg(1)])?;
        e.emit(Opcode::Jeqz, &[Arg::Label(exit)])?;
        e.emit(Opcode::CallShort, &[Arg::Id(3), Arg::Reg(0), Arg::Reg(0)])?;
        match second {
            Opcode::MovNull => e.emit(second, &[Arg::Reg(0)])?,
            _ => e.emit(second, &[Arg::Reg(0), Arg::Imm(1)])?,
        };
        e.emit(Opcode::Jmp, &[Arg::Label(head)])?;
        e.bind(exit)?;
        e.emit(Opcode::ReturnVoid, &[])?;
        Ok(())
    })
}

fn sink() -> HashMap<u32, CalleeInfo> {
    HashMap::from([(
        3,
        CalleeInfo {
            num_args: 1,
            return_type: DataType::Void,
        },
    )])
}

#[test]
fn loop_phi_type_is_back_filled() {
    let code = loop_passing_v0_to_call(Opcode::Movi);
    let method = MethodDescriptor::new("backfill", &code, 1, 1).with_arg_types(vec![DataType::Int32]);
    let built = build_method(&method, &sink(), &BuilderConfig::default()).unwrap();
    let g = &built.graph;

    let header = find_block(g, |b| b.is_loop_header());
    let phis = g.block(header).phis();
    assert_eq!(phis.len(), 1);
    assert_eq!(g.inst(phis[0]).ty(), DataType::Int64);
}

#[test]
fn loop_phi_mixing_int_and_null_is_ambiguous() {
    let code = loop_passing_v0_to_call(Opcode::MovNull);
    let method = MethodDescriptor::new("ambiguous", &code, 1, 1).with_arg_types(vec![DataType::Int32]);
    let err = build_method(&method, &sink(), &BuilderConfig::default()).unwrap_err();
    // The loop header starts right after `movi v0, 0`.
    assert_eq!(err, BuildError::AmbiguousPhiType { pc: 2, vreg: 0 });
}

#[test]
fn trivial_phis_survive_when_disabled() {
    let code = loop_passing_v0_to_call(Opcode::Movi);
    let method = MethodDescriptor::new("keep", &code, 1, 1).with_arg_types(vec![DataType::Int32]);
    let config = BuilderConfig {
        remove_trivial_phis: false,
        ..Default::default()
    };
    let built = build_method(&method, &sink(), &config).unwrap();
    let g = &built.graph;
    let header = find_block(g, |b| b.is_loop_header());
    assert_eq!(g.block(header).phis().len(), 2);
    assert_phi_arity(g);
}

#[test]
fn resolving_twice_changes_nothing() {
    let code = loop_passing_v0_to_call(Opcode::Movi);
    let method = MethodDescriptor::new("again", &code, 1, 1).with_arg_types(vec![DataType::Int32]);
    let config = BuilderConfig::default();
    let mut built = build_method(&method, &sink(), &config).unwrap();

    let before = built.graph.to_string();
    let dom = abir_ir::DominatorTree::compute(&built.graph);
    let stats = resolve_phis(&mut built.graph, &dom, &config).unwrap();
    assert!(stats.is_noop(), "{stats:?}");
    assert_eq!(built.graph.to_string(), before);
}

#[test]
fn unused_try_region_is_pruned() {
    let code = assemble(|e| {
        e.emit(Opcode::Ldai, &[Arg::Imm(1)])?;
        e.emit(Opcode::Return, &[])?;
        // handler
        e.emit(Opcode::Ldai, &[Arg::Imm(2)])?;
        e.emit(Opcode::Return, &[])?;
        Ok(())
    });
    let method = MethodDescriptor::new("quiet", &code, 0, 0).with_catch(0, 5, 6, 0);
    let built = build(&method);
    let g = &built.graph;

    assert_eq!(built.stats.pruned, 1);
    assert!(g.blocks().all(|b| !b.is_try_begin() && !b.is_catch_begin()));
    assert_eq!(real_blocks(g).len(), 2);
    assert_all_reachable(g);
}

#[test]
fn unused_try_region_is_wired_when_pruning_is_off() {
    let code = assemble(|e| {
        e.emit(Opcode::Ldai, &[Arg::Imm(1)])?;
        e.emit(Opcode::Return, &[])?;
        e.emit(Opcode::Ldai, &[Arg::Imm(2)])?;
        e.emit(Opcode::Return, &[])?;
        Ok(())
    });
    let method = MethodDescriptor::new("wired", &code, 0, 0).with_catch(0, 5, 6, 0);
    let config = BuilderConfig {
        prune_unused_regions: false,
        ..Default::default()
    };
    let built = build_method(&method, &NoCallees, &config).unwrap();
    let g = &built.graph;

    assert_eq!(built.stats.pruned, 0);
    let handler = find_block(g, |b| b.pc() == 6);
    assert!(g.block(handler).is_catch());
    assert_all_reachable(g);
}

/// The try-begin block whose `Try` node lists `types`.
fn try_begin_with(g: &Graph, types: &[u32]) -> BlockId {
    find_block(g, |b| {
        b.is_try_begin()
            && b.insts()
                .first()
                .is_some_and(|&i| g.inst(i).opcode() == Some(&IrOpcode::Try(types.to_vec())))
    })
}

fn count_blocks(g: &Graph, pred: impl Fn(&abir_ir::BasicBlock) -> bool) -> usize {
    g.blocks().filter(|b| pred(b)).count()
}

#[test]
fn same_begin_regions_nest_outer_first() {
    // try { try { a0 / a1 } catch { 1 }; a0 / a2 } catch { 2 }
    let code = assemble(|e| {
        e.emit(Opcode::Lda, &[Arg::Reg(0)])?;
        e.emit(Opcode::Div2, &[Arg::Reg(1)])?;
        e.emit(Opcode::Div2, &[Arg::Reg(2)])?;
        e.emit(Opcode::Return, &[])?;
        // inner handler
        e.emit(Opcode::Ldai, &[Arg::Imm(1)])?;
        e.emit(Opcode::Return, &[])?;
        // outer handler
        e.emit(Opcode::Ldai, &[Arg::Imm(2)])?;
        e.emit(Opcode::Return, &[])?;
        Ok(())
    });
    let int3 = vec![DataType::Int32; 3];
    let method = MethodDescriptor::new("same_begin", &code, 0, 3)
        .with_arg_types(int3)
        .with_catch(0, 4, 7, 1)
        .with_catch(0, 6, 13, 2);
    let built = build(&method);
    let g = &built.graph;

    assert_eq!(count_blocks(g, |b| b.is_try_begin()), 2);
    assert_eq!(count_blocks(g, |b| b.is_try_end()), 2);
    assert_eq!(count_blocks(g, |b| b.is_catch_begin()), 2);
    assert_eq!(built.stats.pruned, 0);

    let outer = try_begin_with(g, &[2]);
    let inner = try_begin_with(g, &[1]);
    assert!(g.block(g.start()).succ_blocks().any(|s| s == outer));
    assert!(g.has_edge(outer, inner));
    let body = find_block(g, |b| b.pc() == 0);
    assert_eq!(g.block(body).pred_blocks().collect::<Vec<_>>(), vec![inner]);
    assert_phi_arity(g);
    assert_all_reachable(g);
}

#[test]
fn try_inside_handler_is_wired() {
    // try { a0 / a1 } catch { try { a0 / a2 } catch { a0 + 1 } }
    let code = assemble(|e| {
        let exit = e.create_label();
        e.emit(Opcode::Lda, &[Arg::Reg(0)])?;
        e.emit(Opcode::Div2, &[Arg::Reg(1)])?;
        e.emit(Opcode::Jmp, &[Arg::Label(exit)])?;
        // outer handler, itself a try region
        e.emit(Opcode::Lda, &[Arg::Reg(0)])?;
        e.emit(Opcode::Div2, &[Arg::Reg(2)])?;
        e.emit(Opcode::Jmp, &[Arg::Label(exit)])?;
        // inner handler
        e.emit(Opcode::Lda, &[Arg::Reg(0)])?;
        e.emit(Opcode::Addi, &[Arg::Imm(1)])?;
        e.bind(exit)?;
        e.emit(Opcode::Return, &[])?;
        Ok(())
    });
    let int3 = vec![DataType::Int32; 3];
    let method = MethodDescriptor::new("nested_handler", &code, 0, 3)
        .with_arg_types(int3)
        .with_catch(0, 4, 6, 1)
        .with_catch(6, 10, 12, 2);
    let built = build(&method);
    let g = &built.graph;

    assert_eq!(built.stats.pruned, 0);
    assert_eq!(count_blocks(g, |b| b.is_try_begin()), 2);
    assert_eq!(count_blocks(g, |b| b.is_catch_begin()), 2);
    assert_eq!(
        count_blocks(g, |b| !b.is_synthetic() && b.flags().contains(BlockFlags::TRY)),
        2
    );

    // The inner try-begin opens the outer handler.
    let inner = try_begin_with(g, &[2]);
    assert!(g.block(inner).pred_blocks().any(|p| g.block(p).is_catch_begin()));
    let inner_body = find_block(g, |b| b.pc() == 6);
    assert!(g.has_edge(inner, inner_body));
    assert!(g.block(inner_body).is_catch());

    // The inner handler is kept and entered through its own catch-begin.
    let handler = find_block(g, |b| b.pc() == 12);
    assert!(g.block(handler).is_catch());
    let catch_begin = find_block(g, |b| b.is_catch_begin() && g.has_edge(b.id(), handler));
    assert!(
        g.block(inner)
            .succs()
            .iter()
            .any(|e| e.block == catch_begin && e.exceptional)
    );
    assert_phi_arity(g);
    assert_all_reachable(g);
}

#[test]
fn handler_reached_by_fallthrough_merges_both_paths() {
    // try { a0 / a1 } falls into its own handler: return a0
    let code = assemble(|e| {
        e.emit(Opcode::Lda, &[Arg::Reg(0)])?;
        e.emit(Opcode::Div2, &[Arg::Reg(1)])?;
        e.emit(Opcode::Lda, &[Arg::Reg(0)])?;
        e.emit(Opcode::Return, &[])?;
        Ok(())
    });
    let method = MethodDescriptor::new("fallthrough_catch", &code, 0, 2)
        .with_arg_types(vec![DataType::Int32; 2])
        .with_catch(0, 4, 4, 0);
    let built = build(&method);
    let g = &built.graph;

    let handler = find_block(g, |b| b.pc() == 4);
    let catch_begin = find_block(g, |b| b.is_catch_begin());
    assert!(!g.block(handler).is_catch(), "reachable by normal flow");
    assert!(g.block(catch_begin).is_catch());
    assert_eq!(g.block(handler).preds().len(), 2);
    assert!(g.has_edge(catch_begin, handler));

    let phis = g.block(handler).phis();
    assert_eq!(phis.len(), 1);
    let phi = g.inst(phis[0]);
    assert_eq!(phi.vreg(), Some(0));
    assert_eq!(phi.ty(), DataType::Int32);
    let inputs: Vec<_> = phi.inputs().collect();
    assert!(inputs
        .iter()
        .any(|&i| g.inst(i).opcode() == Some(&IrOpcode::Parameter(0))));
    assert!(inputs.iter().any(|&i| g.inst(i).is_catch_phi()));
    assert_phi_arity(g);
    assert_all_reachable(g);
}

#[test]
fn irreducible_cycle_gets_phis_at_both_entries() {
    // Two ways into the cycle A <-> B; neither block dominates the other.
    let code = assemble(|e| {
        let (a, b) = (e.create_label(), e.create_label());
        e.emit(Opcode::Movi, &[Arg::Reg(0), Arg::Imm(0)])?;
        e.emit(Opcode::Lda, &[Arg::Reg(1)])?;
        e.emit(Opcode::Jeqz, &[Arg::Label(b)])?;
        e.bind(a)?;
        e.emit(Opcode::Lda, &[Arg::Reg(0)])?;
        e.emit(Opcode::Addi, &[Arg::Imm(1)])?;
        e.emit(Opcode::Sta, &[Arg::Reg(0)])?;
        e.bind(b)?;
        e.emit(Opcode::Lda, &[Arg::Reg(0)])?;
        e.emit(Opcode::Jeqz, &[Arg::Label(a)])?;
        e.emit(Opcode::Return, &[])?;
        Ok(())
    });
    let method = MethodDescriptor::new("irreducible", &code, 1, 1).with_arg_types(vec![DataType::Int32]);
    let built = build(&method);
    let g = &built.graph;

    assert_eq!(built.stats.loops, 0);
    let entries: Vec<BlockId> = real_blocks(g)
        .into_iter()
        .filter(|&b| g.block(b).preds().len() == 2)
        .collect();
    assert_eq!(entries.len(), 2);
    for block in entries {
        let phis = g.block(block).phis();
        assert_eq!(phis.len(), 1, "bb{block}");
        let phi = g.inst(phis[0]);
        assert_eq!(phi.vreg(), Some(0));
        assert_eq!(phi.ty(), DataType::Int32);
    }
    assert_phi_arity(g);
    assert_all_reachable(g);
}

#[test]
fn dead_code_after_jump_is_removed() {
    let code = assemble(|e| {
        let exit = e.create_label();
        e.emit(Opcode::Jmp, &[Arg::Label(exit)])?;
        e.emit(Opcode::Ldai, &[Arg::Imm(9)])?;
        e.bind(exit)?;
        e.emit(Opcode::ReturnVoid, &[])?;
        Ok(())
    });
    let method = MethodDescriptor::new("dead", &code, 0, 0);
    let built = build(&method);
    let g = &built.graph;

    assert_eq!(built.stats.pruned, 1);
    assert_eq!(real_blocks(g).len(), 2);
    assert!(g.blocks().all(|b| b.pc() != 2));
    assert_all_reachable(g);
}

#[test]
fn empty_method_links_start_to_end() {
    let method = MethodDescriptor::new("empty", &[], 0, 0);
    let built = build(&method);
    let g = &built.graph;
    assert_eq!(g.block_count(), 2);
    assert!(g.has_edge(g.start(), g.end()));
}

#[test]
fn dump_lists_blocks_and_phis() {
    let code = loop_passing_v0_to_call(Opcode::Movi);
    let method = MethodDescriptor::new("dump", &code, 1, 1).with_arg_types(vec![DataType::Int32]);
    let built = build_method(&method, &sink(), &BuilderConfig::default()).unwrap();
    let text = built.graph.to_string();
    assert!(text.contains("[start]"), "{text}");
    assert!(text.contains("Phi r0"), "{text}");
    assert!(text.contains("CallStatic"), "{text}");
}
