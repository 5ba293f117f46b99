use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use abir_builder::{BuilderConfig, CalleeInfo, MethodDescriptor};
use abir_file::{CodeFile, CodeItem};
use abir_ir::DataType;
use abir_isa::InstructionStream;

#[derive(Parser)]
#[command(name = "abir", about = "Bytecode to IR control-flow graph builder")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Disassemble the methods listed in a manifest
    Disasm {
        /// Path to the YAML manifest
        manifest: PathBuf,
    },
    /// Build the IR graph of every method listed in a manifest
    Build {
        /// Path to the YAML manifest
        manifest: PathBuf,
        /// Builder configuration (YAML)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Print each graph instead of its statistics
        #[arg(long)]
        dump: bool,
    },
}

/// Which code items of a bytecode file to look at, and what the builder
/// needs to know about them.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct Manifest {
    /// Bytecode file, relative to the manifest.
    file: PathBuf,
    methods: Vec<MethodEntry>,
    /// Call targets by method id.
    #[serde(default)]
    callees: HashMap<u32, CalleeEntry>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct MethodEntry {
    name: String,
    /// Offset of the code item in the file.
    offset: u32,
    #[serde(default)]
    arg_types: Vec<String>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct CalleeEntry {
    num_args: usize,
    #[serde(default = "void")]
    return_type: String,
}

fn void() -> String {
    "void".to_string()
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Disasm { manifest } => cmd_disasm(&manifest),
        Commands::Build {
            manifest,
            config,
            dump,
        } => cmd_build(&manifest, config.as_deref(), dump),
    }
}

fn fail(msg: impl std::fmt::Display) -> ! {
    eprintln!("Error: {msg}");
    std::process::exit(1);
}

fn load_manifest(path: &Path) -> (Manifest, CodeFile) {
    let text = fs::read_to_string(path)
        .unwrap_or_else(|e| fail(format_args!("{}: {e}", path.display())));
    let manifest: Manifest = serde_yaml::from_str(&text)
        .unwrap_or_else(|e| fail(format_args!("{}: {e}", path.display())));
    let base = path.parent().unwrap_or(Path::new("."));
    let file = CodeFile::open(base.join(&manifest.file)).unwrap_or_else(|e| fail(e));
    (manifest, file)
}

fn parse_type(s: &str) -> Result<DataType, String> {
    s.parse::<DataType>()
}

fn cmd_disasm(path: &Path) {
    let (manifest, file) = load_manifest(path);
    println!("# {} ({} bytes)", manifest.file.display(), file.len());
    println!();

    for entry in &manifest.methods {
        println!(".function {} {{", entry.name);
        let item = match file.code_item(entry.offset) {
            Ok(item) => item,
            Err(e) => {
                println!("    # Error parsing code at {:#x}: {e}", entry.offset);
                println!("}}");
                println!();
                continue;
            }
        };
        println!(
            "    # vregs: {}, args: {}, code_size: {}",
            item.num_vregs,
            item.num_args,
            item.code.len()
        );
        for insn in InstructionStream::new(item.code) {
            match insn {
                Ok(insn) => println!("    {:#06x}  {insn}", insn.pc()),
                Err(e) => {
                    println!("    # {e}");
                    break;
                }
            }
        }
        for tb in &item.try_blocks {
            println!("    # try [{:#x}..{:#x}]", tb.start_pc, tb.end_pc());
            for cb in &tb.catch_blocks {
                if cb.type_idx == 0 {
                    println!("    #   catch_all -> {:#x}", cb.handler_pc);
                } else {
                    println!("    #   catch type={} -> {:#x}", cb.type_idx, cb.handler_pc);
                }
            }
        }
        println!("}}");
        println!();
    }
}

fn describe<'a>(entry: &MethodEntry, item: &CodeItem<'a>) -> Result<MethodDescriptor<'a>, String> {
    let arg_types = entry
        .arg_types
        .iter()
        .map(|s| parse_type(s))
        .collect::<Result<Vec<_>, _>>()?;
    let mut method = MethodDescriptor::new(
        entry.name.clone(),
        item.code,
        item.num_vregs as usize,
        item.num_args as usize,
    )
    .with_arg_types(arg_types);
    for (begin, end, handler, type_id) in item.exception_table() {
        method = method.with_catch(begin, end, handler, type_id);
    }
    Ok(method)
}

fn cmd_build(path: &Path, config_path: Option<&Path>, dump: bool) {
    let config = match config_path {
        Some(p) => {
            let text = fs::read_to_string(p)
                .unwrap_or_else(|e| fail(format_args!("{}: {e}", p.display())));
            serde_yaml::from_str::<BuilderConfig>(&text)
                .unwrap_or_else(|e| fail(format_args!("{}: {e}", p.display())))
        }
        None => BuilderConfig::default(),
    };
    let (manifest, file) = load_manifest(path);

    let mut callees: HashMap<u32, CalleeInfo> = HashMap::new();
    for (&id, callee) in &manifest.callees {
        let return_type = parse_type(&callee.return_type)
            .unwrap_or_else(|e| fail(format_args!("callee {id}: {e}")));
        callees.insert(
            id,
            CalleeInfo {
                num_args: callee.num_args,
                return_type,
            },
        );
    }

    let mut methods = Vec::with_capacity(manifest.methods.len());
    for entry in &manifest.methods {
        let described = file
            .code_item(entry.offset)
            .map_err(|e| e.to_string())
            .and_then(|item| describe(entry, &item));
        match described {
            Ok(method) => methods.push(method),
            Err(e) => eprintln!("{}: skipped: {e}", entry.name),
        }
    }

    let outcomes = abir_builder::compile_unit(&methods, &callees, &config);
    let mut built = 0;
    for outcome in &outcomes {
        match &outcome.result {
            Ok(method) if dump => {
                built += 1;
                println!("# {}", outcome.name);
                println!("{}", method.graph);
            }
            Ok(method) => {
                built += 1;
                let s = method.stats;
                println!(
                    "{}: {} blocks, {} insts, {} phis, {} catch-phis, {} loops, {} pruned",
                    outcome.name, s.blocks, s.insts, s.phis, s.catch_phis, s.loops, s.pruned
                );
            }
            Err(e) => println!("{}: failed: {e}", outcome.name),
        }
    }
    log::info!("built {built} of {} methods", manifest.methods.len());
    println!("# {built}/{} methods built", manifest.methods.len());
}
