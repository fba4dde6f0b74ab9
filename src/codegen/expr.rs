//! Expression lowering: constant folding first, then operator dispatch
//! into the typed emit layer.

use crate::ast::{ListId, Node, ParseToken};
use crate::eval;
use crate::isa::Mnemonic;
use crate::symbols::{SymbolKind, SymbolType, VarHint};

use super::emitter::SymView;
use super::CodeGen;

/// Result of resolving an array store/rmw target.
pub(crate) enum LookupOfs {
    /// absolute address of the element
    Addr(i32),
    /// the index was variable and has been loaded into an index register
    IndexLoaded,
    Error,
}

impl<'a> CodeGen<'a> {
    //-----------------------------------------------------------------
    //  Entry

    pub(crate) fn expression(&mut self, expr: ListId, dest_type: SymbolType) {
        let Some(op) = self.ast.list(expr).op_token() else {
            self.error_with_list(expr, "Expression not implemented");
            return;
        };

        // fold before anything else; a constant result short-circuits
        // the whole tree
        if let Some(value) = eval::eval_expr(self.ast, self.globals, expr) {
            let size = dest_type.dest_size();
            let text = eval::expression_text(self.ast, expr);
            self.emit.set_line_comment(text);
            self.icg_load_const(value, size);
            return;
        }

        let line = self.ast.list(expr).line_num;
        match op {
            ParseToken::PropertyRef => self.load_property_ref(expr, dest_type),
            ParseToken::AddrOf => self.addr_of(expr),
            ParseToken::Lookup => self.lookup_expr(expr, dest_type),
            ParseToken::BitAnd | ParseToken::BoolAnd => {
                self.binary_op(expr, Mnemonic::AND, dest_type, Mnemonic::None)
            }
            ParseToken::BitOr | ParseToken::BoolOr => {
                self.binary_op(expr, Mnemonic::ORA, dest_type, Mnemonic::None)
            }
            ParseToken::BitEor => self.binary_op(expr, Mnemonic::EOR, dest_type, Mnemonic::None),
            ParseToken::Cast => self.cast(expr, dest_type),
            ParseToken::Inc => self.simple_op_expr(expr, Mnemonic::INC, dest_type),
            ParseToken::Dec => self.simple_op_expr(expr, Mnemonic::DEC, dest_type),
            ParseToken::Add => self.binary_op(expr, Mnemonic::ADC, dest_type, Mnemonic::CLC),
            ParseToken::Sub => self.binary_op(expr, Mnemonic::SBC, dest_type, Mnemonic::SEC),
            ParseToken::Negative => {
                let arg = self.ast.list(expr).node(1).clone();
                self.handle_load(&arg, dest_type, line);
                self.icg_negate();
            }
            ParseToken::Not => {
                let arg = self.ast.list(expr).node(1).clone();
                self.handle_load(&arg, dest_type, line);
                self.icg_not();
            }
            ParseToken::Invert => {
                let arg = self.ast.list(expr).node(1).clone();
                self.handle_load(&arg, dest_type, line);
                self.icg_invert();
            }
            ParseToken::ShiftLeft => self.shift(expr, Mnemonic::ASL),
            ParseToken::ShiftRight => self.shift(expr, Mnemonic::LSR),
            ParseToken::FuncCall => self.func_call(expr, dest_type),
            ParseToken::Eq
            | ParseToken::Ne
            | ParseToken::Gt
            | ParseToken::Lt
            | ParseToken::Gte
            | ParseToken::Lte => self.compare_op(expr, dest_type),
            ParseToken::Multiply => self.multiply_op(expr, dest_type),
            ParseToken::LowByte => self.byte_extract(expr, false),
            ParseToken::HighByte => self.byte_extract(expr, true),
            ParseToken::SizeOf => self.size_of(expr),
            ParseToken::If => self.ternary(expr, dest_type),
            _ => self.error_with_list(expr, "Expression not implemented"),
        }
    }

    //-----------------------------------------------------------------
    //  Loads

    pub(crate) fn handle_load(&mut self, node: &Node, dest_type: SymbolType, line: u32) {
        match node {
            Node::List(expr) => self.expression(*expr, dest_type),
            _ => self.load_primitive(node, dest_type, line),
        }
    }

    fn load_primitive(&mut self, node: &Node, dest_type: SymbolType, line: u32) {
        match node {
            Node::Str(name) => {
                let name = name.clone();
                if self.is_param(&name) {
                    self.load_param_var(&name, line);
                } else if let Some(view) = self.lookup_node(node, line) {
                    self.icg_load_var_sized(&view, dest_type.dest_size());
                }
            }
            Node::Int(value) => self.icg_load_const(*value, dest_type.dest_size()),
            _ => self.error(line, "Error loading primitive"),
        }
    }

    fn load_param_var(&mut self, name: &str, line: u32) {
        let Some(view) = self.lookup(name) else {
            self.error(line, format!("Symbol not found: {name}"));
            return;
        };
        match view.hint {
            VarHint::A => {} // already in the accumulator
            VarHint::X => self.icg_move_index_to_acc(VarHint::X),
            VarHint::Y => self.icg_move_index_to_acc(VarHint::Y),
            VarHint::None => {
                if view.is_stack {
                    self.icg_load_from_stack(&view);
                } else {
                    self.error(line, format!("Inaccessible parameter: {name}"));
                }
            }
        }
    }

    //-----------------------------------------------------------------
    //  Binary ops

    fn is_simple_property_ref(&self, node: &Node) -> bool {
        match node {
            Node::List(id) => {
                let list = self.ast.list(*id);
                list.op_token() == Some(ParseToken::PropertyRef) && !list.has_nested_list
            }
            _ => false,
        }
    }

    /// Shared shape of `+ - & | ^`: load the left side, apply the
    /// pre-op (`CLC`/`SEC`), then op against the right side.
    fn binary_op(&mut self, expr: ListId, mne: Mnemonic, dest_type: SymbolType, pre_op: Mnemonic) {
        let line = self.ast.list(expr).line_num;
        let mut arg1 = self.ast.list(expr).node(1).clone();
        let mut arg2 = self.ast.list(expr).node(2).clone();

        // commutative ops prefer the expression on the left
        let interchangeable = matches!(mne, Mnemonic::AND | Mnemonic::ORA | Mnemonic::EOR);
        if interchangeable
            && matches!(arg2, Node::List(_))
            && matches!(arg1, Node::Int(_) | Node::Str(_))
        {
            std::mem::swap(&mut arg1, &mut arg2);
        }

        let word = dest_type.dest_size() == 2
            && matches!(mne, Mnemonic::ADC | Mnemonic::SBC);

        self.handle_load(&arg1, dest_type, line);

        match &arg2 {
            Node::Int(value) => {
                self.icg_preop(pre_op);
                self.icg_op_with_const(mne, *value);
                if word {
                    self.word_high_op_const(mne, (*value >> 8) & 0xFF);
                }
            }
            Node::Str(_) => {
                let Some(view) = self.lookup_node(&arg2, line) else {
                    self.error(line, "Unknown argument to op");
                    return;
                };
                self.icg_preop(pre_op);
                self.icg_op_with_var(mne, &view);
                if word && view.base_size == 2 {
                    self.word_high_op_var(mne, &view);
                }
            }
            Node::List(right) if self.is_simple_property_ref(&arg2) => {
                let right = *right;
                let Some(ofs) = self.property_ref_ofs(right) else {
                    return;
                };
                self.icg_preop(pre_op);
                self.icg_op_with_addr(mne, ofs);
            }
            Node::List(right) => {
                if word {
                    self.error_with_list(expr, "16-bit operation not supported here");
                    return;
                }
                let right = *right;
                self.icg_push_acc();
                self.expression(right, dest_type);
                self.icg_preop(pre_op);
                self.icg_op_with_stack(mne);
            }
            _ => self.error_with_list(expr, "Invalid op argument"),
        }
    }

    /// High-byte half of a 16-bit add/sub against an immediate.
    fn word_high_op_const(&mut self, mne: Mnemonic, hi: i32) {
        self.emit.add_instr_b(Mnemonic::TAY);
        self.emit.add_instr_b(Mnemonic::TXA);
        self.icg_op_with_const(mne, hi);
        self.emit.add_instr_b(Mnemonic::TAX);
        self.emit.add_instr_b(Mnemonic::TYA);
        self.regs.reset();
    }

    fn word_high_op_var(&mut self, mne: Mnemonic, view: &SymView) {
        self.emit.add_instr_b(Mnemonic::TAY);
        self.emit.add_instr_b(Mnemonic::TXA);
        self.emit.add_instr2(
            mne,
            view.addr_mode(),
            &view.asm_name,
            "1",
            crate::instr::ParamExt::ADD,
        );
        self.emit.add_instr_b(Mnemonic::TAX);
        self.emit.add_instr_b(Mnemonic::TYA);
        self.regs.reset();
    }

    //-----------------------------------------------------------------
    //  Simple read-modify-write (`x++`, `x--`)

    pub(crate) fn simple_op_expr(&mut self, expr: ListId, mne: Mnemonic, dest_type: SymbolType) {
        let arg = self.ast.list(expr).node(1).clone();
        let line = self.ast.list(expr).line_num;
        match &arg {
            Node::Str(_) => {
                if let Some(view) = self.lookup_node(&arg, line) {
                    self.icg_op_rmw(mne, &view);
                }
            }
            Node::List(inner) => self.expression(*inner, dest_type),
            _ => self.error_with_list(expr, "Invalid operand"),
        }
    }

    pub(crate) fn simple_op_stmt(&mut self, stmt: ListId, mne: Mnemonic) {
        self.simple_op_expr(stmt, mne, SymbolType::None);
    }

    //-----------------------------------------------------------------
    //  Casts, byte extraction, sizeof, ternary

    fn cast(&mut self, expr: ListId, dest_type: SymbolType) {
        let inner = self.ast.list(expr).node(2).clone();
        let line = self.ast.list(expr).line_num;
        self.handle_load(&inner, dest_type, line);
    }

    fn byte_extract(&mut self, expr: ListId, high: bool) {
        let arg = self.ast.list(expr).node(1).clone();
        let line = self.ast.list(expr).line_num;
        match &arg {
            Node::Str(_) => {
                let Some(view) = self.lookup_node(&arg, line) else {
                    return;
                };
                if high {
                    if view.base_size == 2 {
                        self.emit.add_instr2(
                            Mnemonic::LDA,
                            view.addr_mode(),
                            &view.asm_name,
                            "1",
                            crate::instr::ParamExt::ADD,
                        );
                        self.regs.clobber(VarHint::A);
                    } else {
                        self.icg_load_const(0, 1);
                    }
                } else {
                    self.icg_load_var(&view);
                }
            }
            Node::List(inner) => {
                // byte-extracting an address expression
                let inner = *inner;
                if self.ast.list(inner).op_token() == Some(ParseToken::AddrOf) {
                    let target = self.ast.list(inner).node(1).clone();
                    if let Some(view) = self.lookup_node(&target, line) {
                        let ext = if high {
                            crate::instr::ParamExt::HI
                        } else {
                            crate::instr::ParamExt::LO
                        };
                        self.emit
                            .add_instr(Mnemonic::LDA, crate::isa::AddrMode::Imm, &view.asm_name, ext);
                        self.regs.clobber(VarHint::A);
                    }
                } else {
                    self.error_with_list(expr, "Unsupported byte extraction");
                }
            }
            _ => self.error_with_list(expr, "Unsupported byte extraction"),
        }
    }

    fn size_of(&mut self, expr: ListId) {
        let arg = self.ast.list(expr).node(1).clone();
        let line = self.ast.list(expr).line_num;
        if let Some(view) = self.lookup_node(&arg, line) {
            let name = view.name.clone();
            self.emit.set_line_comment(format!("sizeof({name})"));
            self.icg_load_const(i32::from(view.size), 1);
        }
    }

    /// `c ? a : b` value form.
    fn ternary(&mut self, expr: ListId, dest_type: SymbolType) {
        let cond = self.ast.list(expr).node(1).clone();
        let line = self.ast.list(expr).line_num;
        let else_label = self.new_code_label();
        let end_label = self.new_code_label();

        self.handle_cond_expr(&cond, else_label, line);
        let then_node = self.ast.list(expr).node(2).clone();
        self.handle_load(&then_node, dest_type, line);
        self.icg_jump(end_label, "past else value");
        self.place_label(else_label);
        let else_node = self.ast.list(expr).node(3).clone();
        self.handle_load(&else_node, dest_type, line);
        self.place_label(end_label);
    }

    //-----------------------------------------------------------------
    //  Shifts

    fn shift(&mut self, expr: ListId, mne: Mnemonic) {
        let line = self.ast.list(expr).line_num;
        let dest_node = self.ast.list(expr).node(1).clone();
        let count_node = self.ast.list(expr).node(2).clone();

        let count = match count_node {
            Node::Int(n) if n > 0 && n < 16 => n,
            _ => {
                self.error_with_list(expr, "Unsupported shift count");
                return;
            }
        };

        match &dest_node {
            Node::Str(_) => {
                if let Some(view) = self.lookup_node(&dest_node, line) {
                    self.icg_shift_var(mne, &view, count);
                }
            }
            Node::List(inner) => {
                self.expression(*inner, SymbolType::None);
                self.icg_shift_acc(mne, count);
            }
            _ => self.error_with_list(expr, "Unsupported shift target"),
        }
    }

    //-----------------------------------------------------------------
    //  Comparisons

    fn is_signed_operand(&self, node: &Node) -> bool {
        match node {
            Node::Str(name) => self.lookup(name).map(|v| v.is_signed()).unwrap_or(false),
            _ => false,
        }
    }

    /// Branch to `skip_label` when the comparison is *false*.
    pub(crate) fn handle_branch_op(
        &mut self,
        op: ParseToken,
        skip_label: crate::instr::LabelId,
        cmp_to_zero: bool,
        signed: bool,
    ) {
        match op {
            ParseToken::Eq => self.icg_branch(Mnemonic::BNE, skip_label),
            ParseToken::Ne => self.icg_branch(Mnemonic::BEQ, skip_label),
            ParseToken::Lte => {
                if signed {
                    self.icg_branch(Mnemonic::BPL, skip_label);
                } else {
                    self.icg_branch(Mnemonic::BCS, skip_label);
                }
                self.icg_branch(Mnemonic::BEQ, skip_label);
            }
            ParseToken::Lt => {
                if cmp_to_zero || signed {
                    self.icg_branch(Mnemonic::BPL, skip_label);
                } else {
                    self.icg_branch(Mnemonic::BCS, skip_label);
                }
            }
            ParseToken::Gte => {
                if cmp_to_zero || signed {
                    self.icg_branch(Mnemonic::BMI, skip_label);
                } else {
                    self.icg_branch(Mnemonic::BCC, skip_label);
                }
            }
            ParseToken::Gt => {
                if !cmp_to_zero {
                    if signed {
                        self.icg_branch(Mnemonic::BMI, skip_label);
                    } else {
                        self.icg_branch(Mnemonic::BCC, skip_label);
                    }
                }
                self.icg_branch(Mnemonic::BEQ, skip_label);
            }
            _ => {}
        }
    }

    /// Materialize a comparison as 0/1 in A.
    fn compare_op(&mut self, expr: ListId, dest_type: SymbolType) {
        let op = self.ast.list(expr).op_token().unwrap_or(ParseToken::Eq);
        let arg1 = self.ast.list(expr).node(1).clone();
        let signed = self.is_signed_operand(&arg1);
        let skip = self.new_code_label();

        self.icg_load_reg_const(VarHint::X, 0);
        self.binary_op(expr, Mnemonic::CMP, dest_type, Mnemonic::None);
        self.handle_branch_op(op, skip, false, signed);
        self.icg_preop(Mnemonic::INX);
        self.place_label(skip);
        self.icg_preop(Mnemonic::TXA);
    }

    fn gc_compare(&mut self, arg: &Node, line: u32) {
        match arg {
            Node::Int(n) => self.icg_compare_const(*n),
            Node::Str(_) => {
                if let Some(view) = self.lookup_node(arg, line) {
                    self.icg_compare_var(&view);
                }
            }
            Node::List(id) => match eval::eval_expr(self.ast, self.globals, *id) {
                Some(value) => {
                    let text = eval::expression_text(self.ast, *id);
                    self.emit.set_line_comment(text);
                    self.icg_compare_const(value);
                }
                None => self.error_with_list(*id, "Cannot evaluate for compare:"),
            },
            _ => self.error(line, "Unsupported compare op"),
        }
    }

    fn cond_comparison(
        &mut self,
        expr: ListId,
        op: ParseToken,
        skip_label: crate::instr::LabelId,
    ) {
        let arg1 = self.ast.list(expr).node(1).clone();
        let arg2 = self.ast.list(expr).node(2).clone();
        let line = self.ast.list(expr).line_num;

        let cmp_to_zero = matches!(arg2, Node::Int(0));
        let signed = self.is_signed_operand(&arg1);

        self.handle_load(&arg1, SymbolType::None, line);
        if !cmp_to_zero {
            self.gc_compare(&arg2, line);
        }
        self.handle_branch_op(op, skip_label, cmp_to_zero, signed);
    }

    fn handle_sub_cond_expr(&mut self, node: &Node, skip_label: crate::instr::LabelId, line: u32) {
        match node {
            Node::List(expr) => {
                let expr = *expr;
                let Some(op) = self.ast.list(expr).op_token() else {
                    self.error_with_list(expr, "Conditional not implemented");
                    return;
                };
                if op == ParseToken::BoolAnd {
                    let arg1 = self.ast.list(expr).node(1).clone();
                    let arg2 = self.ast.list(expr).node(2).clone();
                    // short-circuit: either side failing skips
                    self.handle_load(&arg1, SymbolType::None, line);
                    self.icg_branch(Mnemonic::BEQ, skip_label);
                    self.handle_load(&arg2, SymbolType::None, line);
                    self.icg_branch(Mnemonic::BEQ, skip_label);
                } else if op.is_comparison() {
                    self.cond_comparison(expr, op, skip_label);
                } else {
                    self.expression(expr, SymbolType::None);
                    self.icg_branch(Mnemonic::BEQ, skip_label);
                }
            }
            Node::Str(_) => {
                if let Some(view) = self.lookup_node(node, line) {
                    self.icg_load_var(&view);
                }
                self.icg_branch(Mnemonic::BEQ, skip_label);
            }
            _ => {}
        }
    }

    /// Conditional expression of `if`/`while`/`for`: branch to
    /// `skip_label` when the condition fails.
    pub(crate) fn handle_cond_expr(
        &mut self,
        node: &Node,
        skip_label: crate::instr::LabelId,
        line: u32,
    ) {
        match node {
            Node::Str(_) => {
                if let Some(view) = self.lookup_node(node, line) {
                    self.icg_load_var(&view);
                }
                self.icg_branch(Mnemonic::BEQ, skip_label);
            }
            Node::Int(n) => {
                if *n == 0 {
                    self.icg_jump(skip_label, "condition is always false");
                }
            }
            Node::List(expr) => {
                let expr = *expr;
                let Some(op) = self.ast.list(expr).op_token() else {
                    self.error_with_list(expr, "Conditional not implemented");
                    return;
                };
                if op == ParseToken::BoolAnd {
                    let arg1 = self.ast.list(expr).node(1).clone();
                    let arg2 = self.ast.list(expr).node(2).clone();
                    self.handle_sub_cond_expr(&arg1, skip_label, line);
                    self.handle_sub_cond_expr(&arg2, skip_label, line);
                } else if op.is_comparison() {
                    self.cond_comparison(expr, op, skip_label);
                } else {
                    self.expression(expr, SymbolType::Bool);
                    self.icg_branch(Mnemonic::BEQ, skip_label);
                }
            }
            _ => {}
        }
    }

    //-----------------------------------------------------------------
    //  Function calls

    fn handle_param_load(&mut self, arg: &Node, dest: VarHint, push: bool, line: u32) {
        self.emit.set_line_comment("loading param");
        if let Node::Int(value) = arg {
            if push {
                self.icg_load_const(*value, 1);
                self.icg_push_acc();
            } else {
                self.icg_load_reg_const(dest, *value);
            }
            return;
        }
        self.handle_load(arg, SymbolType::None, line);
        if push {
            self.icg_push_acc();
        } else {
            match dest {
                VarHint::X => self.icg_move_acc_to_index(false),
                VarHint::Y => self.icg_move_acc_to_index(true),
                _ => {} // A: already there
            }
        }
    }

    pub(crate) fn func_call(&mut self, stmt: ListId, _dest_type: SymbolType) {
        let line = self.ast.list(stmt).line_num;
        let Some(func_name) = self.ast.list(stmt).node(1).as_str().map(str::to_string) else {
            self.error_with_list(stmt, "Function not defined");
            return;
        };
        let Some(func) = self
            .globals
            .find(&func_name)
            .map(|r| SymView::from_record(r, self.globals))
        else {
            self.error(line, format!("Function not defined: {func_name}"));
            return;
        };
        if func.kind != SymbolKind::Func {
            self.error(line, format!("Not a function: {func_name}"));
            return;
        }

        // inline functions paste their body instead of a JSR
        if func.inlined {
            if func.param_count > 0 {
                self.error(line, format!("Inline function with parameters: {func_name}"));
                return;
            }
            if let Some(body) = func.inline_body {
                self.regs.reset();
                self.code_block(body);
                self.regs.reset();
            }
            return;
        }

        let args: Vec<Node> = match self.ast.list(stmt).node(2) {
            Node::List(arg_list) => self.ast.list(*arg_list).nodes.clone(),
            _ => Vec::new(),
        };

        if args.len() != func.param_count {
            self.error_with_list(stmt, "Incorrect number of parameters in function call");
            return;
        }

        let params = func.params.clone();
        let mut stack_count = 0;
        for (param, arg) in params.iter().zip(args.iter()) {
            match param.hint {
                VarHint::A => self.handle_param_load(arg, VarHint::A, false, line),
                VarHint::X => self.handle_param_load(arg, VarHint::X, false, line),
                VarHint::Y => self.handle_param_load(arg, VarHint::Y, false, line),
                VarHint::None => {
                    if param.is_stack {
                        self.handle_param_load(arg, VarHint::None, true, line);
                        stack_count += 1;
                    } else {
                        self.error(line, format!("Unable to load parameter: {}", param.name));
                    }
                }
            }
        }

        self.icg_call(&func_name);
        self.icg_adjust_stack(stack_count);
    }

    //-----------------------------------------------------------------
    //  Arrays

    fn get_array_symbol(&mut self, expr: ListId, node: &Node) -> Option<SymView> {
        let line = self.ast.list(expr).line_num;
        let view = match node {
            // a list here means the address operator is being applied
            Node::List(_) => return None,
            Node::Str(_) => self.lookup_node(node, line)?,
            _ => {
                self.error_with_list(expr, "Invalid array lookup");
                return None;
            }
        };
        if !view.is_array() && !view.is_pointer() {
            self.error(line, format!("Not an array or pointer: {}", view.name));
            return None;
        }
        Some(view)
    }

    pub(crate) fn lookup_expr(&mut self, expr: ListId, dest_type: SymbolType) {
        if matches!(self.ast.list(expr).node(1), Node::List(_)) {
            self.addr_of_array(expr, dest_type);
        } else {
            self.array_lookup(expr, dest_type);
        }
    }

    /// Element stride: dereferencing a bare pointer walks bytes; arrays
    /// (including arrays of pointers) walk whole elements.
    fn index_stride(arr: &SymView) -> u16 {
        if arr.is_pointer() && !arr.is_array() {
            1
        } else {
            arr.base_size
        }
    }

    fn array_lookup(&mut self, expr: ListId, dest_type: SymbolType) {
        let base = self.ast.list(expr).node(1).clone();
        let Some(arr) = self.get_array_symbol(expr, &base) else {
            return;
        };
        let index = self.ast.list(expr).node(2).clone();
        let line = self.ast.list(expr).line_num;
        let use_y = arr.is_pointer();

        match &index {
            Node::Str(_) => {
                if let Some(idx) = self.lookup_node(&index, line) {
                    self.icg_load_index_var(&idx, Self::index_stride(&arr), use_y);
                    self.icg_load_indexed(&arr, use_y);
                    self.word_tail_load(&arr, dest_type);
                }
            }
            Node::Int(n) => self.icg_load_from_array(&arr, *n, dest_type),
            Node::List(index_expr) => {
                let index_expr = *index_expr;
                self.array_lookup_with_expr(expr, &arr, index_expr);
                self.word_tail_load(&arr, dest_type);
            }
            _ => self.error_with_list(expr, "Invalid array lookup"),
        }
    }

    /// Variable-indexed loads of word arrays also fetch the high byte.
    fn word_tail_load(&mut self, arr: &SymView, dest_type: SymbolType) {
        if dest_type.dest_size() == 2 && arr.base_size == 2 && !arr.is_pointer() {
            let mode = self.fixed_mode(Mnemonic::LDX, arr.indexed_mode(false));
            self.emit
                .add_instr2(Mnemonic::LDX, mode, &arr.asm_name, "1", crate::instr::ParamExt::ADD);
            self.regs.clobber(VarHint::X);
        }
    }

    fn array_lookup_with_expr(&mut self, expr: ListId, arr: &SymView, index_expr: ListId) {
        let line = self.ast.list(expr).line_num;
        let idx_list = self.ast.list(index_expr);
        let op = idx_list.op_token();
        let is_add_sub = matches!(op, Some(ParseToken::Add) | Some(ParseToken::Sub));
        let second_int = idx_list.node(2).as_int();
        let first = idx_list.node(1).clone();

        // cheap form:  arr[var + n]
        if is_add_sub && second_int.is_some() && matches!(first, Node::Str(_)) {
            let ofs = second_int.unwrap();
            let ofs = if op == Some(ParseToken::Sub) { -ofs } else { ofs };
            if let Some(idx) = self.lookup_node(&first, line) {
                self.icg_load_index_var(&idx, Self::index_stride(arr), false);
                self.icg_load_indexed_with_offset(arr, ofs);
            }
            return;
        }

        // general form: evaluate into A, move to Y, indexed load
        self.expression(index_expr, SymbolType::None);
        self.icg_move_acc_to_index(true);
        if arr.is_pointer() {
            self.icg_load_indirect(arr);
        } else {
            let mode = self.fixed_mode(Mnemonic::LDA, arr.indexed_mode(true));
            self.emit
                .add_instr(Mnemonic::LDA, mode, &arr.asm_name, crate::instr::ParamExt::empty());
            self.regs.clobber(VarHint::A);
        }
    }

    fn addr_of_array(&mut self, expr: ListId, _dest_type: SymbolType) {
        let line = self.ast.list(expr).line_num;
        let Some(inner) = self.ast.list(expr).node(1).as_list() else {
            return;
        };
        let base = self.ast.list(inner).node(1).clone();
        let Some(arr) = self.get_array_symbol(expr, &base) else {
            return;
        };
        let index = self.ast.list(expr).node(2).clone();

        match &index {
            Node::Str(_) => {
                if let Some(idx) = self.lookup_node(&index, line) {
                    self.icg_load_addr(&arr);
                    self.icg_add_to_int(&idx);
                }
            }
            Node::Int(n) => {
                if !arr.is_pointer() {
                    let ofs = *n * i32::from(arr.base_size);
                    self.icg_load_addr_plus_index(&arr, ofs);
                }
            }
            Node::List(index_expr) => {
                self.expression(*index_expr, SymbolType::Char);
                self.icg_add_addr(&arr);
            }
            _ => self.error_with_list(expr, "Error in AddrOf array lookup:"),
        }
    }

    /// Element address for stores/rmw/asm operands.
    pub(crate) fn lookup_array_ofs(&mut self, expr: ListId) -> LookupOfs {
        let base = self.ast.list(expr).node(1).clone();
        let Some(arr) = self.get_array_symbol(expr, &base) else {
            return LookupOfs::Error;
        };
        let stride = i32::from(Self::index_stride(&arr));
        let index = self.ast.list(expr).node(2).clone();
        let line = self.ast.list(expr).line_num;

        match &index {
            Node::Int(n) => {
                LookupOfs::Addr(i32::from(arr.location.unwrap_or(0)) + n * stride)
            }
            Node::Str(_) => {
                let Some(idx) = self.lookup_node(&index, line) else {
                    return LookupOfs::Error;
                };
                if idx.kind == SymbolKind::Const {
                    let value = idx.const_value.unwrap_or(0);
                    LookupOfs::Addr(i32::from(arr.location.unwrap_or(0)) + value * stride)
                } else {
                    self.icg_load_index_var(&idx, Self::index_stride(&arr), arr.is_pointer());
                    LookupOfs::IndexLoaded
                }
            }
            _ => {
                self.error_with_list(expr, "Invalid array lookup");
                LookupOfs::Error
            }
        }
    }

    //-----------------------------------------------------------------
    //  Property references and addresses

    /// `struct.base + field.offset`, with the `s.b` text published as a
    /// comment for the next instruction.
    pub(crate) fn property_ref_ofs(&mut self, expr: ListId) -> Option<u16> {
        let line = self.ast.list(expr).line_num;
        let base = self.ast.list(expr).node(1).clone();
        let prop = self.ast.list(expr).node(2).as_str().map(str::to_string)?;

        if let (Node::Str(base_name), prop_name) = (&base, &prop) {
            self.emit
                .set_line_comment(format!("{base_name}.{prop_name}"));
        }

        let Some(struct_view) = self.lookup_node(&base, line) else {
            self.error(line, "Missing structure");
            return None;
        };
        let Some(member) = self.find_member(&struct_view, &prop) else {
            self.error(line, format!("Missing property: {prop}"));
            return None;
        };
        Some(struct_view.location.unwrap_or(0) + member.location.unwrap_or(0))
    }

    fn load_property_ref(&mut self, expr: ListId, dest_type: SymbolType) {
        let Some(ofs) = self.property_ref_ofs(expr) else {
            return;
        };
        self.icg_load_from_addr(ofs, dest_type.dest_size());
    }

    fn addr_of(&mut self, expr: ListId) {
        let node = self.ast.list(expr).node(1).clone();
        let line = self.ast.list(expr).line_num;
        match &node {
            Node::Str(_) => {
                if let Some(view) = self.lookup_node(&node, line) {
                    self.icg_load_addr(&view);
                }
            }
            _ => self.error_with_list(expr, "Expression not allowed with Address Of operator"),
        }
    }
}
