//! Static call graph: caller→callee edges gathered from `funcCall`
//! nodes, plus the fixed-point depth estimate used to warn about deep
//! call chains (the target's hardware stack is tiny).

use serde::Serialize;

use crate::ast::{Ast, ListId, Node, ParseToken};
use crate::diag::Diagnostics;
use crate::symbols::SymbolTable;

pub const DEFAULT_MAX_CALL_DEPTH: u32 = 3;

#[derive(Clone, Debug, Serialize)]
pub struct FuncEntry {
    pub name: String,
    pub callees: Vec<String>,
    pub depth: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FuncId(usize);

#[derive(Debug, Default, Serialize)]
pub struct CallGraph {
    entries: Vec<FuncEntry>,
}

impl CallGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn find(&self, name: &str) -> Option<FuncId> {
        self.entries.iter().position(|e| e.name == name).map(FuncId)
    }

    pub fn entry(&self, id: FuncId) -> &FuncEntry {
        &self.entries[id.0]
    }

    /// Register a function, returning its entry handle (existing entry
    /// when already known).
    pub fn add_function(&mut self, name: &str) -> FuncId {
        if let Some(id) = self.find(name) {
            return id;
        }
        self.entries.push(FuncEntry {
            name: name.to_string(),
            callees: Vec::new(),
            depth: 0,
        });
        FuncId(self.entries.len() - 1)
    }

    pub fn add_call(&mut self, caller: &str, callee: &str) {
        let id = self.add_function(caller);
        self.entries[id.0].callees.push(callee.to_string());
    }

    pub fn callee_count(&self, name: &str) -> usize {
        self.find(name).map(|id| self.entries[id.0].callees.len()).unwrap_or(0)
    }

    /// Depth of the longest path starting at `name` (1 for a leaf).
    pub fn depth_of(&self, name: &str) -> u32 {
        self.find(name).map(|id| self.entries[id.0].depth).unwrap_or(0)
    }

    /// Fixed-point depth computation: every function starts at 1 and is
    /// raised above its callees until nothing changes. Recursive cycles
    /// stop raising once they exceed the function count.
    pub fn calculate_depths(&mut self) -> u32 {
        for entry in &mut self.entries {
            entry.depth = 1;
        }
        let limit = self.entries.len() as u32 + 1;
        let mut changed = true;
        while changed {
            changed = false;
            for i in 0..self.entries.len() {
                let mut deepest = 0;
                for callee in &self.entries[i].callees {
                    if let Some(cid) = self.find(callee) {
                        deepest = deepest.max(self.entries[cid.0].depth);
                    }
                }
                let new_depth = (deepest + 1).min(limit);
                if new_depth != self.entries[i].depth {
                    self.entries[i].depth = new_depth;
                    changed = true;
                }
            }
        }
        self.entries.iter().map(|e| e.depth).max().unwrap_or(0)
    }

    pub fn entries(&self) -> &[FuncEntry] {
        &self.entries
    }

    /// Render for the `-f`/`--vc` view.
    pub fn display(&self) -> String {
        let mut out = String::from("Call tree:\n");
        for entry in &self.entries {
            out.push_str(&format!("  {} (depth {})\n", entry.name, entry.depth));
            for callee in &entry.callees {
                out.push_str(&format!("    -> {callee}\n"));
            }
        }
        out
    }
}

//---------------------------------------------------------------------
//  AST walk

fn walk_code_nodes(graph: &mut CallGraph, ast: &Ast, func_name: &str, code: ListId) {
    let list = ast.list(code);
    if list.op_token() == Some(ParseToken::FuncCall) {
        if let Some(callee) = list.node(1).as_str() {
            graph.add_call(func_name, callee);
        }
    }
    if list.has_nested_list {
        for node in &list.nodes {
            if let Node::List(id) = node {
                walk_code_nodes(graph, ast, func_name, *id);
            }
        }
    }
}

fn walk_function(graph: &mut CallGraph, ast: &Ast, def: ListId) {
    let list = ast.list(def);
    let Some(name) = list.node(1).as_str() else {
        return;
    };
    let Some(body) = list.node(5).as_list() else {
        return;
    };
    // asm bodies never produce funcCall nodes
    if ast.list(body).op_token() != Some(ParseToken::Code) {
        return;
    }
    graph.add_function(name);
    for node in &ast.list(body).nodes {
        if let Node::List(id) = node {
            walk_code_nodes(graph, ast, name, *id);
        }
    }
}

/// Build the call graph for a parsed program and, on the main file,
/// compute depths and mark function use counts.
pub fn generate_call_graph(
    graph: &mut CallGraph,
    ast: &Ast,
    prog: ListId,
    globals: &mut SymbolTable,
    diag: &mut Diagnostics,
    max_depth: u32,
    finalize: bool,
) {
    for node in &ast.list(prog).nodes {
        let Some(stmt) = node.as_list() else { continue };
        if ast.list(stmt).op_token() == Some(ParseToken::Defun) {
            walk_function(graph, ast, stmt);
        }
    }

    if !finalize {
        return;
    }

    let deepest = graph.calculate_depths();
    if deepest > max_depth {
        diag.warn("Call tree is very Deep");
    }

    // push depth and use counts into the function symbols
    for entry in graph.entries() {
        if let Some(sym) = globals.find_mut(&entry.name) {
            if let Some(ext) = sym.ext.as_mut() {
                ext.func_depth = entry.depth;
            }
        }
        for callee in &entry.callees {
            if let Some(sym) = globals.find_mut(callee) {
                if let Some(ext) = sym.ext.as_mut() {
                    ext.uses += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{parse_program, TypeRegistry};
    use crate::symgen::generate_symbols;

    fn graph_for(src: &str) -> (CallGraph, SymbolTable, Diagnostics) {
        let mut ast = Ast::new();
        let mut types = TypeRegistry::default();
        let mut diag = Diagnostics::new();
        let prog = parse_program(src, &mut ast, &mut types, &mut diag);
        let mut globals = SymbolTable::new_global();
        generate_symbols(&ast, prog, &mut globals, &mut diag);
        let mut graph = CallGraph::new();
        generate_call_graph(
            &mut graph,
            &ast,
            prog,
            &mut globals,
            &mut diag,
            DEFAULT_MAX_CALL_DEPTH,
            true,
        );
        (graph, globals, diag)
    }

    const CHAIN: &str = "
        void leaf() { }
        void mid() { leaf(); }
        void main() { mid(); leaf(); }
    ";

    #[test]
    fn records_edges() {
        let (graph, _, _) = graph_for(CHAIN);
        let main = graph.find("main").unwrap();
        assert_eq!(graph.entry(main).callees, vec!["mid", "leaf"]);
        assert_eq!(graph.callee_count("mid"), 1);
        assert_eq!(graph.callee_count("leaf"), 0);
    }

    #[test]
    fn depths_reach_fixed_point() {
        let (graph, _, _) = graph_for(CHAIN);
        assert_eq!(graph.depth_of("leaf"), 1);
        assert_eq!(graph.depth_of("mid"), 2);
        assert_eq!(graph.depth_of("main"), 3);
    }

    #[test]
    fn calls_inside_control_flow_are_found() {
        let (graph, _, _) = graph_for(
            "void beep() { }
             void main() { char i; if (i) { while (i) { beep(); } } }",
        );
        assert_eq!(graph.entry(graph.find("main").unwrap()).callees, vec!["beep"]);
    }

    #[test]
    fn deep_chains_warn() {
        let (_, _, diag) = graph_for(
            "void d() { }
             void c() { d(); }
             void b() { c(); }
             void a() { b(); }
             void main() { a(); }",
        );
        assert!(diag
            .entries()
            .iter()
            .any(|e| e.message.contains("very Deep")));
    }

    #[test]
    fn use_counts_reach_symbols() {
        let (_, globals, _) = graph_for(CHAIN);
        let leaf = globals.find("leaf").unwrap();
        assert_eq!(leaf.ext.as_ref().unwrap().uses, 2);
    }

    #[test]
    fn recursion_terminates() {
        let (graph, _, _) = graph_for("void a() { a(); } void main() { a(); }");
        // depth saturates instead of looping forever
        assert!(graph.depth_of("a") >= 1);
    }
}
