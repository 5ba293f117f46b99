#![allow(dead_code)]

use abir_builder::*;
use abir_ir::{BlockId, ConstValue, Graph, InstId, IrOpcode};
use abir_isa::{EncodeError, Emitter};

/// Assemble a program built by `f`, panicking on encoder errors.
pub fn assemble(f: impl FnOnce(&mut Emitter) -> Result<(), EncodeError>) -> Vec<u8> {
    let mut e = Emitter::new();
    f(&mut e).unwrap();
    e.build().unwrap()
}

/// Build with the default config and no callees, panicking on failure.
pub fn build(method: &MethodDescriptor<'_>) -> BuiltMethod {
    build_method(method, &NoCallees, &BuilderConfig::default())
        .unwrap_or_else(|e| panic!("{} failed: {e}", method.name))
}

/// Blocks that hold bytecode, in id order.
pub fn real_blocks(graph: &Graph) -> Vec<BlockId> {
    graph
        .blocks()
        .filter(|b| !b.is_synthetic())
        .map(|b| b.id())
        .collect()
}

pub fn find_block(graph: &Graph, pred: impl Fn(&abir_ir::BasicBlock) -> bool) -> BlockId {
    graph
        .blocks()
        .find(|b| pred(b))
        .map(|b| b.id())
        .expect("no matching block")
}

pub fn is_int_const(graph: &Graph, inst: InstId, value: i64) -> bool {
    graph.inst(inst).opcode() == Some(&IrOpcode::Constant(ConstValue::Int(value)))
}

/// Every phi has one input slot per predecessor of its block.
pub fn assert_phi_arity(graph: &Graph) {
    for (id, inst) in graph.insts() {
        if inst.is_phi() {
            let preds = graph.block(inst.block()).preds().len();
            assert_eq!(inst.input_count(), preds, "phi {id} in bb{}", inst.block());
        }
    }
}

/// Every block is reachable from Start.
pub fn assert_all_reachable(graph: &Graph) {
    let reachable = graph.reachable();
    for block in graph.blocks() {
        assert!(reachable[block.id().index()], "bb{} unreachable", block.id());
    }
}
