//! Inline assembly passthrough: labels are pre-registered so forward
//! references work, equates become function-local constants, and
//! operands left pending by the parser are bound to zero-page or
//! absolute modes from the symbols they name.

use crate::ast::{AsmAddrMode, ListId, Node, ParseToken};
use crate::eval;
use crate::instr::{LabelKind, Operand, ParamExt};
use crate::isa::{AddrMode, Mnemonic};
use crate::symbols::{ModifierFlags, SymbolKind, SymbolRecord, SymbolType};

use super::CodeGen;

/// An operand plus what we learned about where it lives.
struct AsmParam {
    operand: Operand,
    ext: ParamExt,
    /// zero-page seen while resolving the parameter symbol
    zeropage: Option<bool>,
}

impl AsmParam {
    fn num(value: i32) -> Self {
        Self {
            operand: Operand::Num(value),
            ext: ParamExt::empty(),
            zeropage: Some(value >= 0 && value < 256),
        }
    }

    fn sym(name: String, zeropage: Option<bool>) -> Self {
        Self {
            operand: Operand::Sym(name),
            ext: ParamExt::empty(),
            zeropage,
        }
    }
}

impl<'a> CodeGen<'a> {
    pub(crate) fn asm_block(&mut self, code: ListId) {
        // pre-register labels so forward branches resolve
        let stmts: Vec<ListId> = self
            .ast
            .list(code)
            .nodes
            .iter()
            .skip(1)
            .filter_map(Node::as_list)
            .collect();

        for stmt in &stmts {
            let list = self.ast.list(*stmt);
            if list.node(0).is_token(ParseToken::Label) {
                if let Some(name) = list.node(1).as_str() {
                    if self.labels.find(name).is_none() {
                        self.labels.new_label(name, LabelKind::Code);
                    }
                }
            }
        }

        for stmt in stmts {
            let first = self.ast.list(stmt).node(0).clone();
            match first {
                Node::Mne(mne) => self.asm_instr(stmt, mne),
                Node::Token(ParseToken::Equate) => {
                    let name = self
                        .ast
                        .list(stmt)
                        .node(1)
                        .as_str()
                        .map(str::to_string)
                        .unwrap_or_default();
                    let value = match self.ast.list(stmt).node(2) {
                        Node::Int(v) => *v,
                        Node::Str(s) => crate::lexer::parse_int(s),
                        _ => 0,
                    };
                    self.new_local_const(&name, value);
                }
                Node::Token(ParseToken::Label) => {
                    if let Some(name) = self.ast.list(stmt).node(1).as_str() {
                        if let Some(label) = self.labels.find(name) {
                            self.place_label(label);
                        }
                    }
                }
                Node::Token(ParseToken::Init) => {
                    let value = match self.ast.list(stmt).node(1) {
                        Node::Int(v) => *v,
                        Node::Str(name) => self
                            .lookup(name)
                            .and_then(|v| v.const_value)
                            .unwrap_or(0),
                        _ => 0,
                    };
                    self.icg_asm_data(value);
                }
                _ => {}
            }
        }
    }

    /// Equates inside `asm` blocks register as constants local to the
    /// current function.
    fn new_local_const(&mut self, name: &str, value: i32) {
        let mut rec = SymbolRecord::new(
            name,
            SymbolKind::Const,
            SymbolType::Char,
            ModifierFlags::empty(),
        );
        rec.is_local = true;
        rec.set_const(value);
        let (_, duplicate) = self.cur_locals.add(rec);
        if duplicate {
            self.diag.warn(format!("duplicate symbol: {name}"));
        }
    }

    //-----------------------------------------------------------------
    //  Parameters

    fn asm_param_property_ref(&mut self, expr: ListId) -> Option<AsmParam> {
        let line = self.ast.list(expr).line_num;
        let base = self.ast.list(expr).node(1).clone();
        let prop = self.ast.list(expr).node(2).as_str().map(str::to_string)?;

        let struct_view = self.lookup_node(&base, line)?;
        let Some(member) = self.find_member(&struct_view, &prop) else {
            self.error_with_list(expr, "Invalid property reference");
            return None;
        };
        Some(AsmParam {
            operand: Operand::SymPair(
                struct_view.asm_name.clone(),
                i32::from(member.location.unwrap_or(0)).to_string(),
            ),
            ext: ParamExt::ADD,
            zeropage: Some(struct_view.is_zeropage()),
        })
    }

    fn asm_param_lookup(&mut self, expr: ListId) -> Option<AsmParam> {
        let line = self.ast.list(expr).line_num;
        let base = self.ast.list(expr).node(1).clone();
        let Some(index) = self.ast.list(expr).node(2).as_int() else {
            self.error_with_list(expr, "Invalid array lookup");
            return None;
        };
        let arr = self.lookup_node(&base, line)?;
        Some(AsmParam {
            operand: Operand::SymPair(
                arr.asm_name.clone(),
                (index * i32::from(arr.base_size)).to_string(),
            ),
            ext: ParamExt::ADD,
            zeropage: Some(arr.is_zeropage()),
        })
    }

    fn asm_param_expr(&mut self, expr: ListId) -> Option<AsmParam> {
        match self.ast.list(expr).op_token() {
            Some(ParseToken::PropertyRef) => self.asm_param_property_ref(expr),
            Some(ParseToken::Lookup) => self.asm_param_lookup(expr),
            // byte extraction of a symbol address
            Some(op @ (ParseToken::LowByte | ParseToken::HighByte)) => {
                let inner = self.ast.list(expr).node(1).clone();
                let name = match &inner {
                    Node::Str(s) => s.clone(),
                    Node::List(addr_of)
                        if self.ast.list(*addr_of).op_token() == Some(ParseToken::AddrOf) =>
                    {
                        self.ast
                            .list(*addr_of)
                            .node(1)
                            .as_str()
                            .map(str::to_string)?
                    }
                    _ => {
                        self.error_with_list(expr, "Unsupported asm operand");
                        return None;
                    }
                };
                let view = self.lookup(&name);
                let asm_name = view
                    .as_ref()
                    .map(|v| v.asm_name.clone())
                    .unwrap_or_else(|| name.clone());
                Some(AsmParam {
                    operand: Operand::Sym(asm_name),
                    ext: if op == ParseToken::LowByte {
                        ParamExt::LO
                    } else {
                        ParamExt::HI
                    },
                    zeropage: None,
                })
            }
            _ => match eval::eval_expr(self.ast, self.globals, expr) {
                Some(value) => {
                    let text = eval::expression_text(self.ast, expr);
                    self.emit.set_line_comment(text);
                    Some(AsmParam::num(value))
                }
                None => {
                    // fall back to the printable form; assemblers can
                    // still resolve what we could not fold
                    let text = eval::expression_text(self.ast, expr);
                    Some(AsmParam {
                        operand: Operand::Sym(text),
                        ext: ParamExt::empty(),
                        zeropage: Some(false),
                    })
                }
            },
        }
    }

    fn asm_param(&mut self, node: &Node, line: u32) -> Option<AsmParam> {
        match node {
            Node::List(expr) => self.asm_param_expr(*expr),
            Node::Int(value) => Some(AsmParam::num(*value)),
            Node::Str(name) => {
                // a label wins over a symbol of the same name
                if let Some(label) = self.labels.find(name) {
                    self.labels.mark_referenced(label);
                    return Some(AsmParam::sym(name.clone(), None));
                }
                match self.lookup(name) {
                    Some(view) => Some(AsmParam::sym(
                        view.asm_name.clone(),
                        Some(view.is_zeropage()),
                    )),
                    None => {
                        self.error(line, format!("Symbol not found: {name}"));
                        None
                    }
                }
            }
            _ => None,
        }
    }

    //-----------------------------------------------------------------
    //  Instructions

    fn asm_instr(&mut self, stmt: ListId, mne: Mnemonic) {
        let line = self.ast.list(stmt).line_num;
        let mode_node = self.ast.list(stmt).node(1).clone();
        let param_node = self.ast.list(stmt).node(2).clone();

        let Node::Addr(parsed_mode) = mode_node else {
            // bare single-byte instruction
            self.emit.add_instr_b(mne);
            self.regs.reset();
            return;
        };

        let param = self.asm_param(&param_node, line);

        // the parser guesses; symbol binding decides
        let zeropage = param.as_ref().and_then(|p| p.zeropage).unwrap_or(false);
        let mut mode = match parsed_mode {
            AsmAddrMode::Mode(m) => m,
            AsmAddrMode::PendingM => {
                if zeropage {
                    AddrMode::Zp
                } else {
                    AddrMode::Abs
                }
            }
            AsmAddrMode::PendingMx => {
                if zeropage {
                    AddrMode::Zpx
                } else {
                    AddrMode::Abx
                }
            }
            AsmAddrMode::PendingMy => {
                if zeropage {
                    AddrMode::Zpy
                } else {
                    AddrMode::Aby
                }
            }
        };

        // jump modes are fixed regardless of what the parser guessed
        if mne == Mnemonic::JMP && mode != AddrMode::Ind {
            mode = AddrMode::Abs;
        }
        if mne == Mnemonic::JSR {
            mode = AddrMode::Abs;
        }

        mode = self.fixed_mode(mne, mode);

        match param {
            Some(AsmParam { operand: Operand::Num(n), .. }) => {
                self.emit.add_instr_n(mne, mode, n);
            }
            Some(AsmParam {
                operand: Operand::Sym(name),
                ext,
                ..
            }) => {
                self.emit.add_instr(mne, mode, &name, ext);
            }
            Some(AsmParam {
                operand: Operand::SymPair(a, b),
                ext,
                ..
            }) => {
                self.emit.add_instr2(mne, mode, &a, &b, ext);
            }
            Some(AsmParam { operand: Operand::None, .. }) | None => {
                self.emit.add_instr_n(mne, mode, 0);
            }
        }
        self.regs.reset();
    }
}
