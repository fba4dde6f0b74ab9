//! Inline-assembly sub-grammar.
//!
//! Each instruction parses to `[mnemonic, addrMode, paramExpr]`; the
//! addressing mode is chosen from bracketing alone (`#`, `(...)`,
//! `(...,x)`, `(...),y`, bare, `,x`, `,y`) plus the `.w` suffix forcing
//! absolute. Operands that could be zero-page or absolute stay pending
//! until the code generator binds them to a symbol.

use crate::ast::{AsmAddrMode, Node, ParseToken};
use crate::isa::{AddrMode, Mnemonic};
use crate::lexer::{self, TokenKind};

use super::Parser;

impl<'a> Parser<'a> {
    fn indirect_addr_mode(&mut self) -> AsmAddrMode {
        match self.ts.peek().kind {
            TokenKind::CloseParen => {
                self.accept(TokenKind::CloseParen);
                if self.accept_optional(TokenKind::Comma) {
                    let reg = self.ts.next().text;
                    if reg.eq_ignore_ascii_case("y") {
                        AsmAddrMode::Mode(AddrMode::Iy)
                    } else {
                        self.error("Expected Y register for indirect indexed addressing mode");
                        AsmAddrMode::Mode(AddrMode::Ind)
                    }
                } else {
                    AsmAddrMode::Mode(AddrMode::Ind)
                }
            }
            TokenKind::Comma => {
                self.accept(TokenKind::Comma);
                let reg = self.ts.next().text;
                let mode = if reg.eq_ignore_ascii_case("x") {
                    AsmAddrMode::Mode(AddrMode::Ix)
                } else {
                    self.error("Expected X register for indexed indirect addressing mode");
                    AsmAddrMode::Mode(AddrMode::Ind)
                };
                self.accept(TokenKind::CloseParen);
                mode
            }
            _ => AsmAddrMode::Mode(AddrMode::Ind),
        }
    }

    /// Bare or `,x`/`,y` operand. Without `.w` the zero-page/absolute
    /// choice stays pending.
    fn direct_addr_mode(&mut self, force_abs: bool) -> AsmAddrMode {
        if !self.accept_optional(TokenKind::Comma) {
            return if force_abs {
                AsmAddrMode::Mode(AddrMode::Abs)
            } else {
                AsmAddrMode::PendingM
            };
        }
        let reg = self.ts.next().text;
        if reg.eq_ignore_ascii_case("x") {
            if force_abs {
                AsmAddrMode::Mode(AddrMode::Abx)
            } else {
                AsmAddrMode::PendingMx
            }
        } else if reg.eq_ignore_ascii_case("y") {
            if force_abs {
                AsmAddrMode::Mode(AddrMode::Aby)
            } else {
                AsmAddrMode::PendingMy
            }
        } else {
            self.error("Expected X or Y register for indexed addressing mode");
            AsmAddrMode::PendingM
        }
    }

    /// One assembler instruction: `[mnemonic]` or
    /// `[mnemonic, addressMode, parameter]`.
    fn asm_instr(&mut self, mne: Mnemonic) -> Node {
        let id = self.list();
        self.push(id, Node::Mne(mne));

        // bare instruction when the block ends, the next token is
        // another mnemonic, or the op never takes parameters
        if self.ts.peek().kind == TokenKind::CloseBrace
            || Mnemonic::from_name(&self.ts.peek().text).is_some()
            || mne.no_params()
        {
            return Node::List(id);
        }

        // mnemonic extension:  .w  forces absolute
        let mut force_abs = false;
        if self.accept_optional(TokenKind::Period) {
            let ext = self.ts.next().text;
            if ext.starts_with('w') {
                force_abs = true;
            }
        }

        let (mode, param) = match self.ts.peek().kind {
            TokenKind::Hash => {
                self.accept(TokenKind::Hash);
                let param = self.expr();
                (AsmAddrMode::Mode(AddrMode::Imm), param)
            }
            TokenKind::OpenParen => {
                self.accept(TokenKind::OpenParen);
                let param = self.expr();
                (self.indirect_addr_mode(), param)
            }
            _ => {
                let param = self.expr();
                if mne.is_branch() {
                    (AsmAddrMode::Mode(AddrMode::Rel), param)
                } else {
                    (self.direct_addr_mode(force_abs), param)
                }
            }
        };

        self.push(id, Node::Addr(mode));
        self.push(id, param);
        Node::List(id)
    }

    fn asm_label(&mut self, name: String) -> Node {
        let id = self.list();
        self.push(id, Node::Token(ParseToken::Label));
        self.push(id, Node::Str(name));
        Node::List(id)
    }

    fn asm_equate(&mut self, name: String) -> Node {
        let id = self.list();
        self.push(id, Node::Token(ParseToken::Equate));
        self.push(id, Node::Str(name));
        let value = match self.ts.peek().kind {
            TokenKind::Number => Node::Int(lexer::parse_int(&self.ts.next().text)),
            _ => Node::Str(self.ts.next().text),
        };
        self.push(id, value);
        Node::List(id)
    }

    /// `.byte value` data in the middle of code.
    fn asm_pseudo_op(&mut self) -> Node {
        let op_name = self.ts.next().text;
        if op_name != "byte" {
            self.error_with_line("Unknown assembly pseudo operation");
            return Node::Empty;
        }
        let id = self.list();
        self.push(id, Node::Token(ParseToken::Init));
        let value = match self.ts.peek().kind {
            TokenKind::Number => Node::Int(lexer::parse_int(&self.ts.next().text)),
            _ => Node::Str(self.ts.next().text),
        };
        self.push(id, value);
        Node::List(id)
    }

    /// `asm [name] { ... }` block: labels, equates, instructions, data.
    pub fn asm_block(&mut self) -> Node {
        let id = self.list();
        self.accept(TokenKind::Asm);
        self.push(id, Node::Token(ParseToken::Asm));

        // an optional name turns the block into a reusable macro
        if self.ts.peek().kind != TokenKind::OpenBrace {
            let name = self.ts.next().text;
            self.push(id, Node::Str(name));
        } else {
            self.push(id, Node::Empty);
        }

        self.accept(TokenKind::OpenBrace);
        while self.ts.peek().kind != TokenKind::CloseBrace && self.ts.has_token() {
            if self.ts.peek().kind == TokenKind::Period {
                self.ts.next(); // eat '.'
                let node = self.asm_pseudo_op();
                self.push(id, node);
                continue;
            }

            let piece = self.ts.next().text;
            if let Some(mne) = Mnemonic::from_name(&piece) {
                let node = self.asm_instr(mne);
                self.push(id, node);
                continue;
            }

            // label or equate
            match self.ts.peek().kind {
                TokenKind::Colon => {
                    self.ts.next();
                    let node = self.asm_label(piece);
                    self.push(id, node);
                }
                TokenKind::Assign => {
                    self.ts.next();
                    let node = self.asm_equate(piece);
                    self.push(id, node);
                }
                _ => {
                    self.error_with_line("Unknown assembly operation");
                    self.ts.next();
                }
            }
        }
        self.accept(TokenKind::CloseBrace);
        self.ast.condense(id);
        Node::List(id)
    }
}

#[cfg(test)]
mod tests {
    use crate::ast::{AsmAddrMode, Ast, Node, ParseToken};
    use crate::diag::Diagnostics;
    use crate::isa::{AddrMode, Mnemonic};
    use crate::parser::{parse_program, TypeRegistry};

    fn parse_asm_body(body: &str) -> (Ast, Vec<Vec<Node>>, Diagnostics) {
        let src = format!("void main() asm {{\n{body}\n}}");
        let mut ast = Ast::new();
        let mut types = TypeRegistry::default();
        let mut diag = Diagnostics::new();
        let prog = parse_program(&src, &mut ast, &mut types, &mut diag);

        let defun = ast.list(prog).node(1).as_list().unwrap();
        let asm = ast.list(defun).node(5).as_list().unwrap();
        assert_eq!(ast.list(asm).op_token(), Some(ParseToken::Asm));
        let stmts = ast
            .list(asm)
            .nodes
            .iter()
            .skip(2)
            .filter_map(|n| n.as_list())
            .map(|l| ast.list(l).nodes.clone())
            .collect();
        (ast, stmts, diag)
    }

    #[test]
    fn immediate_and_bare_operands() {
        let (_, stmts, diag) = parse_asm_body("LDA #5\nSTA counter");
        assert!(!diag.has_errors());
        assert_eq!(stmts[0][0], Node::Mne(Mnemonic::LDA));
        assert_eq!(stmts[0][1], Node::Addr(AsmAddrMode::Mode(AddrMode::Imm)));
        // bare memory operand defers zp-vs-abs
        assert_eq!(stmts[1][1], Node::Addr(AsmAddrMode::PendingM));
    }

    #[test]
    fn indexed_and_indirect_forms() {
        let (_, stmts, diag) =
            parse_asm_body("LDA table,x\nLDA table,y\nLDA (ptr),y\nLDA (ptr,x)\nJMP (vector)");
        assert!(!diag.has_errors());
        assert_eq!(stmts[0][1], Node::Addr(AsmAddrMode::PendingMx));
        assert_eq!(stmts[1][1], Node::Addr(AsmAddrMode::PendingMy));
        assert_eq!(stmts[2][1], Node::Addr(AsmAddrMode::Mode(AddrMode::Iy)));
        assert_eq!(stmts[3][1], Node::Addr(AsmAddrMode::Mode(AddrMode::Ix)));
        assert_eq!(stmts[4][1], Node::Addr(AsmAddrMode::Mode(AddrMode::Ind)));
    }

    #[test]
    fn dot_w_forces_absolute() {
        let (_, stmts, diag) = parse_asm_body("LDA.w flags\nSTA.w table,x");
        assert!(!diag.has_errors());
        assert_eq!(stmts[0][1], Node::Addr(AsmAddrMode::Mode(AddrMode::Abs)));
        assert_eq!(stmts[1][1], Node::Addr(AsmAddrMode::Mode(AddrMode::Abx)));
    }

    #[test]
    fn branches_are_relative() {
        let (_, stmts, diag) = parse_asm_body("top:\nDEX\nBNE top");
        assert!(!diag.has_errors());
        assert_eq!(stmts[0][0], Node::Token(ParseToken::Label));
        assert_eq!(stmts[2][1], Node::Addr(AsmAddrMode::Mode(AddrMode::Rel)));
    }

    #[test]
    fn equates_and_data() {
        let (_, stmts, diag) = parse_asm_body("WSYNC = 2\n.byte 42");
        assert!(!diag.has_errors());
        assert_eq!(stmts[0][0], Node::Token(ParseToken::Equate));
        assert_eq!(stmts[0][2], Node::Int(2));
        assert_eq!(stmts[1][0], Node::Token(ParseToken::Init));
        assert_eq!(stmts[1][1], Node::Int(42));
    }

    #[test]
    fn low_high_byte_immediates() {
        let (ast, stmts, diag) = parse_asm_body("LDA #<data\nLDX #>data");
        assert!(!diag.has_errors());
        let lo = stmts[0][2].as_list().unwrap();
        assert_eq!(ast.list(lo).op_token(), Some(ParseToken::LowByte));
        let hi = stmts[1][2].as_list().unwrap();
        assert_eq!(ast.list(hi).op_token(), Some(ParseToken::HighByte));
    }
}
