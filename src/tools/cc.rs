//! `cc6502`: compile a project to DASM assembly and a raw bank image.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;

use cc6502::diag::Severity;
use cc6502::machine::Machine;
use cc6502::preprocess::{self, PreProcessInfo};
use cc6502::{Compiler, CompilerOptions, SourceFile};

/// Simple C cross-compiler for the 6502
#[derive(Clone, Debug, Parser)]
#[command(name = "cc6502", version)]
struct Args {
    /// project name; the main source file is <project>.c
    project: String,

    /// dump an internal report (allocations, call graph, layout) as JSON
    #[arg(short = 'd')]
    debug_report: bool,

    /// override the entry-point function name
    #[arg(short = 'e', value_name = "NAME")]
    entry_point: Option<String>,

    /// show the function call tree
    #[arg(short = 'f')]
    call_tree: bool,

    /// add an include file to the preprocessor
    #[arg(short = 'i', value_name = "PATH")]
    include: Vec<String>,

    /// select the target machine (Atari2600, Atari5200, Atari7800)
    #[arg(short = 'm', value_name = "MACHINE")]
    machine: Option<String>,

    /// run the peephole optimizer
    #[arg(short = 'o')]
    optimize: bool,

    /// run the peephole optimizer and log each step
    #[arg(long = "ov")]
    optimize_verbose: bool,

    /// quiet mode: suppress informational prints
    #[arg(short = 'q')]
    quiet: bool,

    /// view variable allocations
    #[arg(long = "va")]
    view_allocations: bool,

    /// view the call tree
    #[arg(long = "vc")]
    view_call_tree: bool,

    /// view function processing
    #[arg(long = "vr")]
    view_functions: bool,

    /// view the output block layout
    #[arg(long = "vl")]
    view_layout: bool,
}

fn project_paths(project: &str) -> (String, PathBuf, PathBuf) {
    // accept either the bare project name or the .c file itself
    let stem = project.strip_suffix(".c").unwrap_or(project).to_string();
    let dir = Path::new(&stem)
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();
    let main_file = PathBuf::from(format!("{stem}.c"));
    (stem, dir, main_file)
}

fn read_source(dir: &Path, name: &str) -> Result<String> {
    let path = if Path::new(name).is_absolute() {
        PathBuf::from(name)
    } else {
        dir.join(name)
    };
    fs::read_to_string(&path).with_context(|| format!("Missing dependency {}", path.display()))
}

fn print_diagnostics(compiler: &Compiler, args: &Args) {
    for entry in compiler.diag.entries() {
        match entry.severity {
            Severity::Error | Severity::Warning => eprintln!("{entry}"),
            Severity::Info => {
                let is_function_note = entry.message.starts_with("Processing function");
                if args.quiet {
                    continue;
                }
                if is_function_note && !args.view_functions {
                    continue;
                }
                println!("{entry}");
            }
        }
    }
}

fn write_artifact(path: &Path, bytes: &[u8]) -> Result<()> {
    fs::write(path, bytes).with_context(|| format!("Unable to write {}", path.display()))
}

fn run(args: &Args) -> Result<bool> {
    let (stem, dir, main_path) = project_paths(&args.project);
    let main_source = fs::read_to_string(&main_path)
        .with_context(|| format!("Unable to open {}", main_path.display()))?;

    let mut options = CompilerOptions::default();
    if let Some(entry) = &args.entry_point {
        options.entry_point = entry.clone();
    }
    options.run_optimizer = args.optimize || args.optimize_verbose;
    options.show_optimizer_steps = args.optimize_verbose;

    let mut compiler = Compiler::new(options);

    //-- pre-parse scan: includes and machine selection
    let mut info = PreProcessInfo::default();
    for file in &args.include {
        info.add_include(file.clone(), &mut compiler.diag);
    }
    preprocess::preprocess(&mut info, &main_source, &mut compiler.diag);

    compiler.options.machine = if info.machine != Machine::Unknown {
        info.machine
    } else if let Some(name) = &args.machine {
        Machine::lookup(name)
    } else {
        Machine::Atari2600
    };

    //-- gather sources: dependencies first, the main file last
    let mut files = Vec::new();
    for name in &info.included_files {
        files.push(SourceFile {
            name: name.clone(),
            source: read_source(&dir, name)?,
        });
    }
    files.push(SourceFile {
        name: main_path.display().to_string(),
        source: main_source,
    });

    compiler.compile(&files)?;
    print_diagnostics(&compiler, args);

    //-- artifacts
    write_artifact(&PathBuf::from(format!("{stem}.ast")), compiler.ast_text().as_bytes())?;
    write_artifact(
        &PathBuf::from(format!("{stem}.sym")),
        compiler.symbol_table_text().as_bytes(),
    )?;
    if let Some(asm) = compiler.asm_output() {
        write_artifact(&PathBuf::from(format!("{stem}.asm")), asm)?;
    }
    if let Some(bin) = compiler.binary_output() {
        write_artifact(&PathBuf::from(format!("{stem}.binary")), bin)?;
    }

    //-- views
    if args.view_allocations {
        if let Some(report) = &compiler.alloc_report {
            println!("Variable allocations:");
            for entry in &report.entries {
                println!(
                    "  {:<20} @ {:04X}  ({} bytes{})",
                    entry.name,
                    entry.addr,
                    entry.size,
                    if entry.zeropage { ", zp" } else { "" }
                );
            }
        }
    }
    if args.call_tree || args.view_call_tree {
        print!("{}", compiler.call_tree_text());
    }
    if args.view_layout && !args.quiet {
        println!("\nOutput layout:");
        print!("{}", compiler.block_layout_text());
    }
    if args.debug_report {
        println!("{}", serde_json::to_string_pretty(&compiler.debug_report())?);
    }

    Ok(!compiler.diag.has_errors())
}

fn main() -> ExitCode {
    let args = Args::parse();
    match run(&args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("ERROR: {err:#}");
            ExitCode::FAILURE
        }
    }
}
