//! Restricted-C cross-compiler for the 6502.
//!
//! The pipeline compiles a curly-brace C-like language down to DASM
//! assembly text and a raw bank image for small 8-bit targets:
//!
//! ```text
//! source -> tokens -> parser -> AST -> symbols -> call graph
//!        -> allocation -> code generation -> layout -> DASM / binary
//! ```
//!
//! Every phase hangs off the [`Compiler`] value, which owns the AST
//! arena, the symbol tables, the label list, the output blocks and the
//! diagnostics sink; there is no process-wide state.

#![forbid(unsafe_code)]

pub mod alloc;
pub mod ast;
pub mod callgraph;
pub mod codegen;
pub mod diag;
pub mod eval;
pub mod instr;
pub mod isa;
pub mod lexer;
pub mod machine;
pub mod output;
pub mod parser;
pub mod preprocess;
pub mod symbols;
pub mod symgen;

#[cfg(test)]
mod test;

use anyhow::{bail, Result};
use serde::Serialize;

use alloc::AllocationReport;
use ast::{Ast, ListId};
use callgraph::CallGraph;
use diag::Diagnostics;
use instr::Labels;
use machine::Machine;
use output::bin::BinWriter;
use output::dasm::DasmWriter;
use output::{BlockList, WriterCtx};
use parser::TypeRegistry;
use symbols::SymbolTable;

#[derive(Clone, Debug)]
pub struct CompilerOptions {
    pub entry_point: String,
    pub machine: Machine,
    pub max_call_depth: u32,
    pub run_optimizer: bool,
    pub show_optimizer_steps: bool,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            entry_point: "main".to_string(),
            machine: Machine::Atari2600,
            max_call_depth: callgraph::DEFAULT_MAX_CALL_DEPTH,
            run_optimizer: false,
            show_optimizer_steps: false,
        }
    }
}

/// One input file: the project's main source or an include.
#[derive(Clone, Debug)]
pub struct SourceFile {
    pub name: String,
    pub source: String,
}

/// The `-d` report, serialized as JSON by the CLI.
#[derive(Serialize)]
pub struct DebugReport<'a> {
    pub machine: machine::MachineInfo,
    pub allocation: Option<&'a AllocationReport>,
    pub call_graph: &'a CallGraph,
    pub blocks: Vec<output::BlockSummary>,
    pub label_count: usize,
    pub file_count: usize,
}

pub struct Compiler {
    pub options: CompilerOptions,
    pub ast: Ast,
    pub types: TypeRegistry,
    pub globals: SymbolTable,
    pub labels: Labels,
    pub diag: Diagnostics,
    pub call_graph: CallGraph,
    pub alloc_report: Option<AllocationReport>,
    blocks: Option<BlockList>,
    parsed: Vec<(String, ListId)>,
    asm_out: Option<Vec<u8>>,
    bin_out: Option<Vec<u8>>,
}

impl Compiler {
    pub fn new(options: CompilerOptions) -> Self {
        Self {
            options,
            ast: Ast::new(),
            types: TypeRegistry::default(),
            globals: SymbolTable::new_global(),
            labels: Labels::new(),
            diag: Diagnostics::new(),
            call_graph: CallGraph::new(),
            alloc_report: None,
            blocks: None,
            parsed: Vec::new(),
            asm_out: None,
            bin_out: None,
        }
    }

    /// Run the whole pipeline over the given files (includes first, the
    /// main file last). Fatal configuration problems return an error;
    /// problems in the user's program land in [`Compiler::diag`].
    pub fn compile(&mut self, files: &[SourceFile]) -> Result<()> {
        if self.options.machine == Machine::Unknown {
            bail!("Unknown machine specified, cannot continue!");
        }
        let machine = self.options.machine.info();
        self.blocks = Some(BlockList::new(&machine));

        //-- parse everything
        for file in files {
            self.diag.info(format!("Parsing {}...", file.name));
            let prog = parser::parse_program(
                &file.source,
                &mut self.ast,
                &mut self.types,
                &mut self.diag,
            );
            self.parsed.push((file.name.clone(), prog));
        }
        if self.diag.parse_error_count() > 0 {
            return Ok(());
        }

        //-- symbols
        for (_, prog) in self.parsed.clone() {
            symgen::generate_symbols(&self.ast, prog, &mut self.globals, &mut self.diag);
        }
        if self.diag.has_errors() {
            return Ok(());
        }
        self.diag.info("Symbol Table generation Complete");

        //-- call graph (depths finalized on the last file)
        let last = self.parsed.len().saturating_sub(1);
        for (i, (_, prog)) in self.parsed.clone().into_iter().enumerate() {
            callgraph::generate_call_graph(
                &mut self.call_graph,
                &self.ast,
                prog,
                &mut self.globals,
                &mut self.diag,
                self.options.max_call_depth,
                i == last,
            );
        }

        //-- memory allocation
        let report = alloc::allocate_variables(&mut self.globals, &machine, &mut self.diag);
        self.alloc_report = Some(report);

        //-- code generation
        let blocks = self.blocks.as_mut().expect("block list initialized");
        for (name, prog) in self.parsed.clone() {
            self.diag.info(format!("Compiling {name}"));
            codegen::generate_code(
                &mut self.ast,
                prog,
                &mut self.globals,
                &mut self.labels,
                blocks,
                &machine,
                &mut self.diag,
            );
        }
        codegen::check_entry_point(&self.globals, &self.options.entry_point, &mut self.diag);

        if self.options.run_optimizer {
            // the peephole optimizer is an external collaborator; the
            // flags are accepted so build scripts keep working
            self.diag.info("Optimizer pass skipped (not built in)");
        }

        if self.diag.has_errors() {
            self.diag.info(format!(
                "Unable to process program due to ({}) errors",
                self.diag.error_count()
            ));
            return Ok(());
        }

        //-- layout and writers
        let blocks = self.blocks.as_ref().expect("block list initialized");
        output::check_bank_fit(blocks, &mut self.diag);
        output::assign_label_locations(blocks, &mut self.labels, &machine);

        let ctx = WriterCtx {
            globals: &self.globals,
            labels: &self.labels,
            machine: &machine,
            entry_point: &self.options.entry_point,
        };
        let mut dasm = DasmWriter::new();
        self.asm_out = Some(output::write_output(&mut dasm, blocks, &ctx, &mut self.diag));
        let mut bin = BinWriter::new();
        self.bin_out = Some(output::write_output(&mut bin, blocks, &ctx, &mut self.diag));

        Ok(())
    }

    //-----------------------------------------------------------------
    //  Artifacts

    pub fn asm_output(&self) -> Option<&[u8]> {
        self.asm_out.as_deref()
    }

    pub fn binary_output(&self) -> Option<&[u8]> {
        self.bin_out.as_deref()
    }

    /// Pretty-printed AST of every parsed file (the `.ast` artifact).
    pub fn ast_text(&self) -> String {
        let mut out = String::new();
        for (name, prog) in &self.parsed {
            out.push_str(&format!("; {name}\nAbstract syntax tree:\n"));
            out.push_str(&self.ast.render(*prog));
            out.push_str("\n\n");
        }
        out
    }

    /// The `.sym` artifact.
    pub fn symbol_table_text(&self) -> String {
        symbols::show_symbol_table(&self.globals, &self.globals)
    }

    pub fn block_layout_text(&self) -> String {
        self.blocks
            .as_ref()
            .map(BlockList::display)
            .unwrap_or_default()
    }

    pub fn call_tree_text(&self) -> String {
        self.call_graph.display()
    }

    pub fn debug_report(&self) -> DebugReport<'_> {
        DebugReport {
            machine: self.options.machine.info(),
            allocation: self.alloc_report.as_ref(),
            call_graph: &self.call_graph,
            blocks: self
                .blocks
                .as_ref()
                .map(BlockList::summaries)
                .unwrap_or_default(),
            label_count: self.labels.iter().count(),
            file_count: self.parsed.len(),
        }
    }
}
