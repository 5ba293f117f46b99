//! Human-readable graph listing.
//!
//! ```text
//! BB 2  pc 0x0  preds [0]  succs [4, 5]
//!     7.i64  Add v3, v5
//! ```

use std::fmt;

use crate::block::BlockFlags;
use crate::graph::Graph;
use crate::inst::{InstId, InstKind};

const FLAG_NAMES: &[(BlockFlags, &str)] = &[
    (BlockFlags::START, "start"),
    (BlockFlags::END, "end"),
    (BlockFlags::TRY_BEGIN, "try-begin"),
    (BlockFlags::TRY_END, "try-end"),
    (BlockFlags::CATCH_BEGIN, "catch-begin"),
    (BlockFlags::CATCH, "catch"),
    (BlockFlags::LOOP_HEADER, "loop-header"),
    (BlockFlags::PREHEADER, "preheader"),
    (BlockFlags::TRY, "try"),
];

impl fmt::Display for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for block in self.blocks() {
            write!(f, "BB {}", block.id())?;
            if !block.is_synthetic() {
                write!(f, "  pc {:#x}", block.pc())?;
            }
            let names: Vec<&str> = FLAG_NAMES
                .iter()
                .filter(|(flag, _)| block.flags().contains(*flag))
                .map(|(_, name)| *name)
                .collect();
            if !names.is_empty() {
                write!(f, "  [{}]", names.join(", "))?;
            }
            f.write_str("  preds [")?;
            for (i, e) in block.preds().iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{}{}", e.block, if e.exceptional { "*" } else { "" })?;
            }
            f.write_str("]  succs [")?;
            for (i, e) in block.succs().iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{}{}", e.block, if e.exceptional { "*" } else { "" })?;
            }
            writeln!(f, "]")?;
            for inst in block.all_insts() {
                self.fmt_inst(f, inst)?;
            }
        }
        Ok(())
    }
}

impl Graph {
    fn fmt_inst(&self, f: &mut fmt::Formatter<'_>, id: InstId) -> fmt::Result {
        let inst = self.inst(id);
        write!(f, "    {}.{}  ", id, inst.ty())?;
        match inst.kind() {
            InstKind::Op { opcode, inputs } => {
                write!(f, "{opcode}")?;
                for (i, input) in inputs.iter().enumerate() {
                    f.write_str(if i == 0 { " v" } else { ", v" })?;
                    write!(f, "{input}")?;
                }
            }
            InstKind::Phi { vreg, inputs } => {
                write!(f, "Phi r{vreg}")?;
                let preds = self.block(inst.block()).preds();
                for (i, input) in inputs.iter().enumerate() {
                    f.write_str(if i == 0 { " (" } else { ", " })?;
                    if let Some(edge) = preds.get(i) {
                        write!(f, "bb{}: ", edge.block)?;
                    }
                    match input {
                        Some(v) => write!(f, "v{v}")?,
                        None => f.write_str("-")?,
                    }
                }
                if !inputs.is_empty() {
                    f.write_str(")")?;
                }
            }
            InstKind::CatchPhi {
                vreg,
                inputs,
                throwers,
            } => {
                write!(f, "CatchPhi r{vreg}")?;
                for (i, (input, pc)) in inputs.iter().zip(throwers).enumerate() {
                    f.write_str(if i == 0 { " (" } else { ", " })?;
                    write!(f, "{pc:#x}: v{input}")?;
                }
                if !inputs.is_empty() {
                    f.write_str(")")?;
                }
            }
            InstKind::SaveState { inputs, vregs } => {
                f.write_str("SaveState")?;
                for (i, (input, vreg)) in inputs.iter().zip(vregs).enumerate() {
                    f.write_str(if i == 0 { " " } else { ", " })?;
                    write!(f, "v{input}:r{vreg}")?;
                }
            }
        }
        writeln!(f)
    }
}
