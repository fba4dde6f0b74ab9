//! Code generation: walks the AST and lowers it to 6502 instruction
//! streams, one block per function, plus static data blocks.
//!
//! Dispatch is a `match` over the statement/expression operator token.
//! The low-level typed load/store/op operations live in
//! [`emitter`](self::emitter), expression lowering in
//! [`expr`](self::expr), multiplication synthesis in [`mul`](self::mul)
//! and the inline-assembly passthrough in [`asmblock`](self::asmblock).

pub mod asmblock;
pub mod emitter;
pub mod expr;
pub mod mul;

use crate::ast::{Ast, ListId, Node, ParseToken};
use crate::diag::Diagnostics;
use crate::eval;
use crate::instr::{InstrBuilder, LabelKind, Labels};
use crate::machine::MachineInfo;
use crate::output::{BlockList, DataList};
use crate::preprocess::DirectiveCode;
use crate::symbols::{SymbolKind, SymbolTable, SymbolType, VarHint};

use emitter::{RegTracker, SymView};

pub struct CodeGen<'a> {
    pub(crate) ast: &'a mut Ast,
    pub(crate) globals: &'a mut SymbolTable,
    pub(crate) labels: &'a mut Labels,
    pub(crate) diag: &'a mut Diagnostics,
    pub(crate) machine: MachineInfo,
    pub(crate) blocks: &'a mut BlockList,
    pub(crate) emit: InstrBuilder,
    pub(crate) regs: RegTracker,
    /// current function's tables, taken out of its symbol for the
    /// duration of its body
    pub(crate) cur_locals: SymbolTable,
    pub(crate) cur_params: SymbolTable,
    pub(crate) cur_func: Option<String>,
    show_cycles: bool,
}

/// Run code generation over a parsed program.
pub fn generate_code(
    ast: &mut Ast,
    prog: ListId,
    globals: &mut SymbolTable,
    labels: &mut Labels,
    blocks: &mut BlockList,
    machine: &MachineInfo,
    diag: &mut Diagnostics,
) {
    let mut gen = CodeGen {
        ast,
        globals,
        labels,
        diag,
        machine: *machine,
        blocks,
        emit: InstrBuilder::default(),
        regs: RegTracker::default(),
        cur_locals: SymbolTable::new(""),
        cur_params: SymbolTable::new(""),
        cur_func: None,
        show_cycles: false,
    };
    gen.program(prog);
}

/// Verify the configured entry point exists once all files are compiled.
pub fn check_entry_point(globals: &SymbolTable, entry_point: &str, diag: &mut Diagnostics) {
    match globals.find(entry_point) {
        Some(sym) if sym.is_function() => {}
        _ => diag.error(
            None::<u32>,
            format!("Missing entry point function: {entry_point}() not found"),
        ),
    }
}

impl<'a> CodeGen<'a> {
    //-----------------------------------------------------------------
    //  Helpers

    pub(crate) fn error(&mut self, line: u32, msg: impl Into<String>) {
        self.diag.error(line, msg.into());
    }

    pub(crate) fn error_with_list(&mut self, list: ListId, msg: impl Into<String>) {
        let line = self.ast.list(list).line_num;
        let snippet = self.ast.render(list);
        self.diag.error_with_snippet(line, msg.into(), snippet);
    }

    /// Resolve a name through the local, parameter and global tables.
    pub(crate) fn lookup(&self, name: &str) -> Option<SymView> {
        self.cur_locals
            .find(name)
            .or_else(|| self.cur_params.find(name))
            .or_else(|| self.globals.find(name))
            .map(|rec| SymView::from_record(rec, self.globals))
    }

    pub(crate) fn lookup_node(&mut self, node: &Node, line: u32) -> Option<SymView> {
        let name = node.as_str()?;
        let view = self.lookup(name);
        if view.is_none() {
            self.error(line, format!("Symbol not found: {name}"));
        }
        view
    }

    pub(crate) fn is_param(&self, name: &str) -> bool {
        self.cur_locals.find(name).is_none() && self.cur_params.find(name).is_some()
    }

    /// Member view of `prop` inside the aggregate behind `struct_sym`.
    pub(crate) fn find_member(&self, struct_sym: &SymView, prop: &str) -> Option<SymView> {
        let type_name = struct_sym.user_type.as_ref()?;
        let type_rec = self.globals.find(type_name)?;
        let members = type_rec.ext.as_ref().map(|e| &e.params)?;
        members
            .find(prop)
            .map(|rec| SymView::from_record(rec, self.globals))
    }

    //-----------------------------------------------------------------
    //  Statements

    pub(crate) fn statement(&mut self, stmt: ListId) {
        let Some(op) = self.ast.list(stmt).op_token() else {
            self.error_with_list(stmt, "Error in statement:");
            return;
        };
        match op {
            ParseToken::Asm => self.asm_block(stmt),
            ParseToken::Set => self.assignment(stmt),
            ParseToken::Define => self.local_variable(stmt),
            ParseToken::FuncCall => self.func_call(stmt, SymbolType::None),
            ParseToken::Return => self.return_stmt(stmt),
            ParseToken::DoWhile => self.do_while_stmt(stmt),
            ParseToken::While => self.while_stmt(stmt),
            ParseToken::For => self.for_stmt(stmt),
            ParseToken::Loop => self.loop_stmt(stmt),
            ParseToken::Strobe => self.strobe(stmt),
            ParseToken::If => self.if_stmt(stmt),
            ParseToken::Switch => self.switch_stmt(stmt),
            ParseToken::Inc => self.inc_dec_stmt(stmt, true),
            ParseToken::Dec => self.inc_dec_stmt(stmt, false),
            ParseToken::Directive => self.directive(stmt),
            ParseToken::Break => {} // handled by enclosing switch lowering
            _ => {}
        }
    }

    fn statement_list(&mut self, code: ListId) {
        let stmts: Vec<Node> = self.ast.list(code).nodes.iter().skip(1).cloned().collect();
        for node in stmts {
            if let Node::List(stmt) = node {
                let src = self.ast.list(stmt).src_line.clone();
                if !src.text.is_empty() {
                    self.emit
                        .add_comment_line(format!("Line #{:<4}:\t{}", src.line_num, src.text));
                }
                self.statement(stmt);
            }
        }
    }

    pub(crate) fn code_block(&mut self, code: ListId) {
        if self.ast.list(code).count() < 1 {
            return;
        }
        if self.ast.list(code).op_token() == Some(ParseToken::Asm) {
            self.asm_block(code);
        } else {
            self.statement_list(code);
        }
    }

    fn directive(&mut self, stmt: ListId) {
        let code = self.ast.list(stmt).node(1).as_int().unwrap_or(0);
        match DirectiveCode::try_from(code as u8) {
            Ok(DirectiveCode::ShowCycles) => {
                self.show_cycles = true;
                self.emit.show_cycles(true);
            }
            Ok(DirectiveCode::HideCycles) => {
                self.show_cycles = false;
                self.emit.show_cycles(false);
            }
            Err(_) => {}
        }
    }

    //-----------------------------------------------------------------
    //  Assignment and friends

    fn var_dest_type(view: &SymView) -> SymbolType {
        if view.is_pointer() {
            SymbolType::Ptr
        } else {
            view.ty
        }
    }

    /// Destination type of an assignment's left-hand side.
    fn assign_dest_type(&mut self, stmt: ListId, store: &Node) -> SymbolType {
        let line = self.ast.list(stmt).line_num;
        match store {
            Node::Str(_) => self
                .lookup_node(store, line)
                .map(|v| Self::var_dest_type(&v))
                .unwrap_or(SymbolType::Error),
            Node::List(store_expr) => {
                let store_expr = *store_expr;
                let op = self.ast.list(store_expr).op_token();
                match op {
                    Some(ParseToken::Lookup) => {
                        let base = self.ast.list(store_expr).node(1).clone();
                        self.lookup_node(&base, line)
                            .map(|v| Self::var_dest_type(&v))
                            .unwrap_or(SymbolType::Error)
                    }
                    Some(ParseToken::PropertyRef) => {
                        let base = self.ast.list(store_expr).node(1).clone();
                        let prop = self.ast.list(store_expr).node(2).as_str().map(str::to_string);
                        let Some(base_view) = self.lookup_node(&base, line) else {
                            return SymbolType::Error;
                        };
                        let Some(prop) = prop else {
                            return SymbolType::Error;
                        };
                        match self.find_member(&base_view, &prop) {
                            Some(member) => Self::var_dest_type(&member),
                            None => {
                                self.error_with_list(store_expr, "Property not found");
                                SymbolType::Error
                            }
                        }
                    }
                    _ => SymbolType::Error,
                }
            }
            _ => SymbolType::Error,
        }
    }

    fn assignment(&mut self, stmt: ListId) {
        let store_node = self.ast.list(stmt).node(1).clone();
        let load_node = self.ast.list(stmt).node(2).clone();
        let line = self.ast.list(stmt).line_num;

        let dest_type = self.assign_dest_type(stmt, &store_node);
        if dest_type == SymbolType::Error {
            self.error(line, "Unknown destination type in assignment");
            return;
        }

        self.handle_load(&load_node, dest_type, line);

        // A (and X for words) now hold the data; compute the
        // destination and store
        match &store_node {
            Node::Str(_) => self.store_in_var(&store_node, dest_type, line),
            Node::List(store_expr) => self.expression_for_store(*store_expr, dest_type),
            _ => {}
        }
    }

    pub(crate) fn store_in_var(&mut self, node: &Node, dest_type: SymbolType, line: u32) {
        if let Some(view) = self.lookup_node(node, line) {
            self.icg_store_var(&view, dest_type.dest_size());
        }
    }

    /// Left side of an assignment when it is an expression (property
    /// ref, array element, inc/dec).
    pub(crate) fn expression_for_store(&mut self, expr: ListId, dest_type: SymbolType) {
        let Some(op) = self.ast.list(expr).op_token() else {
            self.error_with_list(expr, "Invalid token in assignment expr");
            return;
        };
        let line = self.ast.list(expr).line_num;
        match op {
            ParseToken::PropertyRef => self.store_to_struct_property(expr),
            ParseToken::Lookup => {
                let base = self.ast.list(expr).node(1).clone();
                let Some(view) = self.lookup_node(&base, line) else {
                    return;
                };
                match self.lookup_array_ofs(expr) {
                    expr::LookupOfs::IndexLoaded => {
                        self.emit.set_line_comment(view.name.clone());
                        self.icg_store_indexed(&view);
                    }
                    expr::LookupOfs::Addr(addr) => {
                        let base_loc = i32::from(view.location.unwrap_or(0));
                        self.emit.set_line_comment(view.name.clone());
                        self.icg_store_var_offset(&view, addr - base_loc, view.base_size);
                    }
                    expr::LookupOfs::Error => {}
                }
            }
            ParseToken::Inc => self.simple_op_expr(expr, crate::isa::Mnemonic::INC, SymbolType::None),
            ParseToken::Dec => self.simple_op_expr(expr, crate::isa::Mnemonic::DEC, SymbolType::None),
            _ => self.error_with_list(expr, "Invalid token in assignment expr"),
        }
    }

    fn store_to_struct_property(&mut self, expr: ListId) {
        let line = self.ast.list(expr).line_num;
        let base = self.ast.list(expr).node(1).clone();
        let prop = self
            .ast
            .list(expr)
            .node(2)
            .as_str()
            .map(str::to_string)
            .unwrap_or_default();

        let Some(struct_view) = self.lookup_node(&base, line) else {
            return;
        };
        let Some(member) = self.find_member(&struct_view, &prop) else {
            self.error(line, format!("Missing property: {prop}"));
            return;
        };
        let ofs = i32::from(member.location.unwrap_or(0));
        self.emit
            .set_line_comment(format!("{}.{}", struct_view.name, prop));
        self.icg_store_var_offset(&struct_view, ofs, member.base_size);
    }

    fn strobe(&mut self, stmt: ListId) {
        let target = self.ast.list(stmt).node(1).clone();
        let line = self.ast.list(stmt).line_num;
        match &target {
            Node::List(expr) => self.expression_for_store(*expr, SymbolType::None),
            Node::Str(_) => self.store_in_var(&target, SymbolType::None, line),
            Node::Int(addr) => self.icg_store_to_addr(*addr as u16, 1),
            _ => {}
        }
    }

    fn return_stmt(&mut self, stmt: ListId) {
        let value = self.ast.list(stmt).node(1).clone();
        let line = self.ast.list(stmt).line_num;
        match &value {
            Node::List(expr) => self.expression(*expr, SymbolType::None),
            Node::Str(_) => {
                if let Some(view) = self.lookup_node(&value, line) {
                    self.icg_load_var(&view);
                }
            }
            Node::Int(n) => self.icg_load_const(*n, 1),
            _ => {}
        }
        self.icg_return();
    }

    //-----------------------------------------------------------------
    //  Control flow

    fn if_stmt(&mut self, stmt: ListId) {
        let has_else = self.ast.list(stmt).count() > 3
            && matches!(self.ast.list(stmt).node(3), Node::List(_));

        let skip_then = self.new_code_label();
        let cond = self.ast.list(stmt).node(1).clone();
        let line = self.ast.list(stmt).line_num;
        self.handle_cond_expr(&cond, skip_then, line);

        let then_block = self.ast.list(stmt).node(2).as_list();
        if let Some(block) = then_block {
            self.code_block(block);
        }

        if has_else {
            let skip_else = self.new_code_label();
            self.icg_jump(skip_else, "skip else case");
            self.place_label(skip_then);
            if let Some(block) = self.ast.list(stmt).node(3).as_list() {
                self.code_block(block);
            }
            self.place_label(skip_else);
        } else {
            self.place_label(skip_then);
        }
    }

    fn while_stmt(&mut self, stmt: ListId) {
        let start = self.new_code_label();
        let done = self.new_code_label();

        self.place_label(start);
        let cond = self.ast.list(stmt).node(1).clone();
        let line = self.ast.list(stmt).line_num;
        match &cond {
            Node::List(_) | Node::Str(_) => self.handle_cond_expr(&cond, done, line),
            Node::Int(n) => {
                if *n == 0 {
                    self.icg_jump(done, "skipping loop");
                }
            }
            _ => self.error(line, "Invalid conditional expression"),
        }

        if let Some(block) = self.ast.list(stmt).node(2).as_list() {
            self.code_block(block);
        }
        self.icg_jump(start, "beginning of loop");
        self.place_label(done);
    }

    fn do_while_stmt(&mut self, stmt: ListId) {
        let start = self.new_code_label();
        self.place_label(start);

        if let Some(block) = self.ast.list(stmt).node(1).as_list() {
            self.code_block(block);
        }

        let cond = self.ast.list(stmt).node(2).clone();
        let line = self.ast.list(stmt).line_num;
        match &cond {
            Node::List(_) => {
                let done = self.new_code_label();
                self.handle_cond_expr(&cond, done, line);
                self.icg_jump(start, "beginning of loop");
                self.place_label(done);
            }
            Node::Int(n) => {
                if *n > 0 {
                    self.icg_jump(start, "beginning of loop");
                }
            }
            _ => self.error(line, "Invalid conditional expression"),
        }
    }

    fn for_stmt(&mut self, stmt: ListId) {
        let start = self.new_code_label();
        let done = self.new_code_label();
        let line = self.ast.list(stmt).line_num;

        match self.ast.list(stmt).node(1).as_list() {
            Some(init) => self.statement(init),
            None => {
                self.error_with_list(stmt, "Invalid for loop initializer statement");
                return;
            }
        }

        self.place_label(start);
        let cond = self.ast.list(stmt).node(2).clone();
        self.handle_cond_expr(&cond, done, line);

        if let Some(body) = self.ast.list(stmt).node(4).as_list() {
            self.code_block(body);
        }

        match self.ast.list(stmt).node(3).as_list() {
            Some(incr) => self.statement(incr),
            None => self.error_with_list(stmt, "Invalid for loop next statement"),
        }

        self.icg_jump(start, "Loop back");
        self.place_label(done);
    }

    /// `loop (var, start, count)`: counted ascending loop. Bounds must
    /// fold to constants.
    fn loop_stmt(&mut self, stmt: ListId) {
        let line = self.ast.list(stmt).line_num;
        let var_node = self.ast.list(stmt).node(1).clone();
        let Some(view) = self.lookup_node(&var_node, line) else {
            return;
        };

        let start_val = self.fold_node(self.ast.list(stmt).node(2).clone());
        let count_val = self.fold_node(self.ast.list(stmt).node(3).clone());
        let (Some(start_val), Some(count_val)) = (start_val, count_val) else {
            self.error_with_list(stmt, "Loop bounds must be constant");
            return;
        };

        self.icg_load_const(start_val, 1);
        self.icg_store_var(&view, 1);

        let head = self.new_code_label();
        self.place_label(head);

        if let Some(body) = self.ast.list(stmt).node(4).as_list() {
            self.code_block(body);
        }

        self.icg_op_rmw(crate::isa::Mnemonic::INC, &view);
        self.icg_load_var(&view);
        self.icg_compare_const(start_val.wrapping_add(count_val) & 0xFF);
        self.icg_branch(crate::isa::Mnemonic::BNE, head);
    }

    fn fold_node(&self, node: Node) -> Option<i32> {
        match node {
            Node::Int(n) => Some(n),
            Node::Str(name) => {
                let sym = self.lookup(&name)?;
                if sym.kind == SymbolKind::Const {
                    sym.const_value
                } else {
                    None
                }
            }
            Node::List(id) => eval::eval_expr(self.ast, self.globals, id),
            _ => None,
        }
    }

    /// Compare chain with a shared end label; missing `break` is real
    /// fall-through only in source order, every generated case body ends
    /// with a jump to the end label.
    fn switch_stmt(&mut self, stmt: ListId) {
        let end = self.new_code_label();
        let line = self.ast.list(stmt).line_num;

        let scrutinee = self.ast.list(stmt).node(1).clone();
        match &scrutinee {
            Node::List(expr) => self.expression(*expr, SymbolType::Char),
            Node::Str(_) => {
                if let Some(view) = self.lookup_node(&scrutinee, line) {
                    self.icg_load_var(&view);
                }
            }
            _ => self.error_with_list(stmt, "Invalid expression used for switch statement"),
        }

        let cases: Vec<ListId> = self
            .ast
            .list(stmt)
            .nodes
            .iter()
            .skip(2)
            .filter_map(Node::as_list)
            .collect();

        for case in cases {
            match self.ast.list(case).op_token() {
                Some(ParseToken::Case) => {
                    let next_case = self.new_code_label();
                    let value = self.ast.list(case).node(1).clone();
                    match &value {
                        Node::Int(n) => self.icg_compare_const(*n),
                        Node::Str(name) => {
                            let name = name.clone();
                            self.icg_compare_const_name(&name);
                        }
                        _ => self.error_with_list(case, "Unsupported case value"),
                    }
                    self.icg_branch(crate::isa::Mnemonic::BNE, next_case);
                    if let Some(body) = self.ast.list(case).node(2).as_list() {
                        self.code_block(body);
                    }
                    self.icg_jump(end, "done with case");
                    self.place_label(next_case);
                }
                Some(ParseToken::Default) => {
                    if let Some(body) = self.ast.list(case).node(1).as_list() {
                        self.code_block(body);
                    }
                }
                _ => {}
            }
        }
        self.place_label(end);
    }

    fn inc_dec_stmt(&mut self, stmt: ListId, inc: bool) {
        let mne = if inc {
            crate::isa::Mnemonic::INC
        } else {
            crate::isa::Mnemonic::DEC
        };
        let target = self.ast.list(stmt).node(1).clone();
        match &target {
            Node::List(expr) => {
                let expr = *expr;
                match self.ast.list(expr).op_token() {
                    Some(ParseToken::Lookup) => match self.lookup_array_ofs(expr) {
                        expr::LookupOfs::Addr(addr) => self.icg_rmw_addr(mne, addr as u16),
                        expr::LookupOfs::IndexLoaded => {
                            let base = self.ast.list(expr).node(1).clone();
                            let line = self.ast.list(expr).line_num;
                            if let Some(view) = self.lookup_node(&base, line) {
                                self.icg_op_rmw_indexed(mne, &view);
                            }
                        }
                        expr::LookupOfs::Error => {}
                    },
                    Some(ParseToken::PropertyRef) => {
                        if let Some(addr) = self.property_ref_ofs(expr) {
                            self.icg_rmw_addr(mne, addr);
                        }
                    }
                    _ => self.error_with_list(stmt, "Invalid increment/decrement statement"),
                }
            }
            Node::Str(_) => self.simple_op_stmt(stmt, mne),
            _ => {}
        }
    }

    //-----------------------------------------------------------------
    //  Local variables

    fn local_variable(&mut self, var_def: ListId) {
        let line = self.ast.list(var_def).line_num;
        let name_node = self.ast.list(var_def).node(1).clone();
        let Some(view) = self.lookup_node(&name_node, line) else {
            return;
        };
        if view.kind == SymbolKind::Const {
            return;
        }

        let Some(init) = self.ast.list(var_def).node(4).as_list() else {
            return;
        };
        if self.ast.list(init).op_token() != Some(ParseToken::Init) {
            self.error(line, "Parser error in local initializer");
            return;
        }

        let value = self.ast.list(init).node(1).clone();
        match &value {
            Node::Int(n) => self.icg_load_const(*n, 1),
            Node::Str(_) => {
                if let Some(src) = self.lookup_node(&value, line) {
                    self.icg_load_var(&src);
                }
            }
            Node::List(_) => {
                let dest_type = Self::var_dest_type(&view);
                self.handle_load(&value, dest_type, line);
            }
            _ => {
                self.error_with_list(var_def, "Error initializing var");
                return;
            }
        }
        self.icg_store_var(&view, view.base_size);
    }

    //-----------------------------------------------------------------
    //  Functions

    fn process_function(&mut self, name: &str, code: ListId) {
        let func_label = self.labels.new_label(name, LabelKind::Code);

        // load the function's tables into scope
        let (locals, params) = match self.globals.find_mut(name).and_then(|s| s.ext.as_mut()) {
            Some(ext) => (
                std::mem::take(&mut ext.locals),
                std::mem::take(&mut ext.params),
            ),
            None => (SymbolTable::new(name), SymbolTable::new(name)),
        };
        self.cur_locals = locals;
        self.cur_params = params;
        self.cur_func = Some(name.to_string());

        self.emit = InstrBuilder::start_block(name);
        self.emit.show_cycles(self.show_cycles);
        self.emit.set_label(func_label);
        self.regs = RegTracker::default();

        // register-hinted parameters arrive preloaded
        let preloads: Vec<(String, VarHint)> = self
            .cur_params
            .iter()
            .filter(|p| p.hint != VarHint::None)
            .map(|p| (p.name.clone(), p.hint))
            .collect();
        for (pname, hint) in preloads {
            self.regs.tag_var(hint, &pname);
        }

        self.code_block(code);

        // epilogue
        if self.emit.last_mnemonic() != Some(crate::isa::Mnemonic::RTS) {
            self.icg_return();
        }

        let block = std::mem::take(&mut self.emit);
        let mut block = block.finish();
        block.func_name = Some(name.to_string());
        let code_size = block.code_size;
        let addr = self.blocks.add_code(name, block);

        // park the tables back on the symbol and record the results
        let locals = std::mem::take(&mut self.cur_locals);
        let params = std::mem::take(&mut self.cur_params);
        let start_addr = self.machine.start_addr;
        if let Some(sym) = self.globals.find_mut(name) {
            sym.set_location(start_addr + addr);
            if let Some(ext) = sym.ext.as_mut() {
                ext.locals = locals;
                ext.params = params;
                ext.code_size = code_size;
            }
        }
        self.cur_func = None;
    }

    fn function(&mut self, def: ListId) {
        let Some(name) = self.ast.list(def).node(1).as_str().map(str::to_string) else {
            return;
        };
        let Some(code) = self.ast.list(def).node(5).as_list() else {
            return; // declaration only
        };

        // inline functions are expanded at their call sites
        let is_inline = self
            .globals
            .find(&name)
            .and_then(|s| s.ext.as_ref())
            .map(|e| e.inlined)
            .unwrap_or(false);
        if is_inline {
            return;
        }

        self.diag.info(format!("Processing function: {name}"));
        self.process_function(&name, code);
    }

    //-----------------------------------------------------------------
    //  Static data (globals with initializers)

    fn global_variable(&mut self, var_def: ListId) {
        let Some(name) = self.ast.list(var_def).node(1).as_str().map(str::to_string) else {
            return;
        };
        let Some(sym) = self.globals.find(&name).map(|r| SymView::from_record(r, self.globals))
        else {
            return;
        };

        let Some(init) = self.ast.list(var_def).node(4).as_list() else {
            return;
        };
        if self.ast.list(init).op_token() != Some(ParseToken::Init) || !sym.is_array() {
            return;
        }
        if sym.kind != SymbolKind::Const {
            self.error_with_list(var_def, "Non-const array cannot be initialized with data");
            return;
        }

        let Some(value_list) = self.ast.list(init).node(1).as_list() else {
            return;
        };
        if self.ast.list(value_list).op_token() != Some(ParseToken::List) {
            return;
        }

        let nested = self.ast.list(value_list).has_nested_list;
        if nested && sym.user_type.is_some() {
            // array of struct records
            let record_ids: Vec<ListId> = self
                .ast
                .list(value_list)
                .nodes
                .iter()
                .skip(1)
                .filter_map(Node::as_list)
                .collect();
            let mut records = Vec::new();
            for rec in record_ids {
                self.preprocess_init_data(var_def, rec);
                records.push(
                    self.ast
                        .list(rec)
                        .nodes
                        .iter()
                        .skip(1)
                        .filter_map(Node::as_int)
                        .collect::<Vec<i32>>(),
                );
            }
            let record_size = sym
                .user_type
                .as_ref()
                .and_then(|t| self.globals.find(t))
                .map(|t| t.num_elements)
                .unwrap_or(1);
            let size = record_size * records.len() as u16;
            if self.blocks.crosses_page(size) {
                self.blocks.move_to_next_page();
            }
            let addr = self.blocks.add_struct_data(&name, &name, record_size, records);
            let abs = self.machine.start_addr + addr;
            if let Some(rec) = self.globals.find_mut(&name) {
                rec.set_location(abs);
            }
        } else {
            self.preprocess_init_data(var_def, value_list);
            let values: Vec<i32> = self
                .ast
                .list(value_list)
                .nodes
                .iter()
                .skip(1)
                .filter_map(Node::as_int)
                .collect();
            let data = DataList {
                elem_size: sym.base_size,
                values,
            };
            let size = (data.values.len() as u16) * data.elem_size;
            if self.blocks.crosses_page(size) {
                self.blocks.move_to_next_page();
            }
            let addr = self.blocks.add_array_data(&name, &name, data);
            let abs = self.machine.start_addr + addr;
            if let Some(rec) = self.globals.find_mut(&name) {
                rec.set_location(abs);
            }
        }
    }

    /// Fold every initializer element to an integer in place.
    fn preprocess_init_data(&mut self, var_def: ListId, init_list: ListId) {
        let count = self.ast.list(init_list).count();
        for index in 1..count {
            let node = self.ast.list(init_list).node(index).clone();
            match node {
                Node::List(expr) => match eval::eval_expr(self.ast, self.globals, expr) {
                    Some(value) => {
                        self.ast.set_node(init_list, index, Node::Int(value & 0xFFFF));
                    }
                    None => {
                        self.error_with_list(expr, "Initializer value cannot be evaluated");
                        self.ast.set_node(init_list, index, Node::Int(0));
                    }
                },
                Node::Str(name) => {
                    let value = self
                        .lookup(&name)
                        .and_then(|v| v.const_value)
                        .unwrap_or(0);
                    self.ast.set_node(init_list, index, Node::Int(value & 0xFFFF));
                }
                Node::Int(_) => {}
                _ => self.error_with_list(var_def, "Initializer invalid"),
            }
        }
    }

    //-----------------------------------------------------------------
    //  Program walk

    fn program(&mut self, prog: ListId) {
        if self.ast.list(prog).op_token() != Some(ParseToken::Program) {
            return;
        }
        let stmts: Vec<ListId> = self
            .ast
            .list(prog)
            .nodes
            .iter()
            .filter_map(Node::as_list)
            .collect();
        for stmt in stmts {
            let Some(op) = self.ast.list(stmt).op_token() else {
                continue;
            };
            match op {
                ParseToken::Defun => self.function(stmt),
                ParseToken::Define => self.global_variable(stmt),
                ParseToken::Struct | ParseToken::Union | ParseToken::Enum => {}
                ParseToken::Directive => self.directive(stmt),
                _ => self.error_with_list(stmt, "Program code found outside code block"),
            }
        }
    }
}
