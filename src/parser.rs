//! Recursive-descent parser producing the tagged-list AST.
//!
//! The expression grammar climbs from conditional (`?:`) at the bottom
//! of the precedence ladder up through logical, comparison, bitwise,
//! shift, additive and multiplicative levels to unary, postfix and
//! primary forms. Statements and declarations build `code` lists at each
//! scope boundary. The inline-assembly sub-grammar lives in
//! [`asm`](self::asm).

pub mod asm;

use std::collections::HashSet;

use crate::ast::{Ast, ListId, Node, ParseToken, SourceLine};
use crate::diag::Diagnostics;
use crate::lexer::{
    self, is_bool_and_or, is_comparison, is_inc_dec, is_op_assign, is_shift, Token, TokenKind,
    TokenStream,
};
use crate::preprocess::DirectiveCode;

/// Names of user-declared types (struct/union/enum tags), consulted to
/// tell a declaration apart from an expression statement.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    names: HashSet<String>,
}

impl TypeRegistry {
    pub fn add(&mut self, name: &str) {
        self.names.insert(name.to_string());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }
}

pub struct Parser<'a> {
    ts: TokenStream,
    ast: &'a mut Ast,
    diag: &'a mut Diagnostics,
    types: &'a mut TypeRegistry,
}

/// Parse a whole source file into a `program` list.
pub fn parse_program(
    source: &str,
    ast: &mut Ast,
    types: &mut TypeRegistry,
    diag: &mut Diagnostics,
) -> ListId {
    let mut parser = Parser {
        ts: TokenStream::new(source),
        ast,
        diag,
        types,
    };
    parser.program()
}

impl<'a> Parser<'a> {
    //-----------------------------------------------------------------
    //  Small helpers

    fn src_line(&self) -> SourceLine {
        SourceLine {
            line_num: self.ts.line_num(),
            text: self.ts.line_text(),
        }
    }

    fn list(&mut self) -> ListId {
        let line = self.src_line();
        self.ast.new_list(line)
    }

    fn push(&mut self, id: ListId, node: Node) {
        self.ast.add_node(id, node);
    }

    fn error(&mut self, msg: impl Into<String>) {
        self.diag.parse_error(self.ts.line_num(), msg.into(), None);
    }

    fn error_with_line(&mut self, msg: impl Into<String>) {
        let snippet = self.ts.line_text();
        self.diag
            .parse_error(self.ts.line_num(), msg.into(), Some(snippet));
    }

    fn accept(&mut self, kind: TokenKind) -> bool {
        let token = self.ts.next();
        if token.kind != kind {
            self.error(format!(
                "Unexpected token: '{}' -- was looking for: '{:?}'",
                token.text, kind
            ));
            return false;
        }
        true
    }

    fn accept_optional(&mut self, kind: TokenKind) -> bool {
        if self.ts.peek().kind == kind {
            self.ts.next();
            return true;
        }
        false
    }

    /// Skip to the next statement boundary after a malformed construct.
    fn resync(&mut self) {
        while self.ts.has_token() {
            match self.ts.peek().kind {
                TokenKind::Semicolon => {
                    self.ts.next();
                    return;
                }
                TokenKind::CloseBrace => return,
                _ => {
                    self.ts.next();
                }
            }
        }
    }

    fn identifier(&mut self) -> Node {
        let token = self.ts.next();
        if token.kind == TokenKind::Identifier {
            Node::Str(token.text)
        } else {
            self.error_with_line("Identifier expected!");
            Node::Int(0)
        }
    }

    /// Append a node, splatting one level of compound declaration lists
    /// (multiple declarators from one statement).
    fn unwrap_into(&mut self, target: ListId, node: Node) {
        if let Node::List(id) = node {
            if matches!(self.ast.list(id).nodes.first(), Some(Node::List(_))) {
                let children = self.ast.list(id).nodes.clone();
                for child in children {
                    self.push(target, child);
                }
                return;
            }
        }
        if !matches!(node, Node::Empty) {
            self.push(target, node);
        }
    }

    //-----------------------------------------------------------------
    //  Expressions

    pub fn expr(&mut self) -> Node {
        self.expr_conditional()
    }

    fn binary_level(
        &mut self,
        mut lnode: Node,
        op_of: impl Fn(&Token) -> Option<ParseToken>,
        next: impl Fn(&mut Self) -> Node,
    ) -> Node {
        while let Some(op) = op_of(self.ts.peek()) {
            self.ts.next();
            let rnode = next(self);
            let id = self.list();
            self.push(id, Node::Token(op));
            self.push(id, lnode);
            self.push(id, rnode);
            lnode = Node::List(id);
        }
        lnode
    }

    fn expr_conditional(&mut self) -> Node {
        let lnode = self.expr_logical();
        if self.ts.peek().kind != TokenKind::Question {
            return lnode;
        }
        self.accept(TokenKind::Question);
        let mnode = self.expr_logical();
        self.accept(TokenKind::Colon);
        let rnode = self.expr();

        let id = self.list();
        self.push(id, Node::Token(ParseToken::If));
        self.push(id, lnode);
        self.push(id, mnode);
        self.push(id, rnode);
        Node::List(id)
    }

    fn expr_logical(&mut self) -> Node {
        let lnode = self.expr_comparison();
        self.binary_level(
            lnode,
            |t| {
                if !is_bool_and_or(t.kind) {
                    return None;
                }
                Some(match t.kind {
                    TokenKind::BoolAnd => ParseToken::BoolAnd,
                    _ => ParseToken::BoolOr,
                })
            },
            Self::expr_comparison,
        )
    }

    fn expr_comparison(&mut self) -> Node {
        let lnode = self.expr_bitwise();
        self.binary_level(
            lnode,
            |t| {
                if !is_comparison(t.kind) {
                    return None;
                }
                Some(match t.kind {
                    TokenKind::Equal => ParseToken::Eq,
                    TokenKind::NotEqual => ParseToken::Ne,
                    TokenKind::GreaterThan => ParseToken::Gt,
                    TokenKind::GreaterEqual => ParseToken::Gte,
                    TokenKind::LessThan => ParseToken::Lt,
                    _ => ParseToken::Lte,
                })
            },
            Self::expr_bitwise,
        )
    }

    fn expr_bitwise(&mut self) -> Node {
        let lnode = self.expr_shift();
        self.binary_level(
            lnode,
            |t| match t.kind {
                TokenKind::Ampersand => Some(ParseToken::BitAnd),
                TokenKind::Pipe => Some(ParseToken::BitOr),
                TokenKind::Caret => Some(ParseToken::BitEor),
                _ => None,
            },
            Self::expr_shift,
        )
    }

    fn expr_shift(&mut self) -> Node {
        let lnode = self.expr_add_sub();
        self.binary_level(
            lnode,
            |t| {
                if !is_shift(t.kind) {
                    return None;
                }
                Some(match t.kind {
                    TokenKind::ShiftLeft => ParseToken::ShiftLeft,
                    _ => ParseToken::ShiftRight,
                })
            },
            Self::expr_add_sub,
        )
    }

    fn expr_add_sub(&mut self) -> Node {
        let lnode = self.expr_mul_div();
        self.binary_level(
            lnode,
            |t| match t.kind {
                TokenKind::Plus => Some(ParseToken::Add),
                TokenKind::Minus => Some(ParseToken::Sub),
                _ => None,
            },
            Self::expr_mul_div,
        )
    }

    fn expr_mul_div(&mut self) -> Node {
        let lnode = self.expr_unary();
        self.binary_level(
            lnode,
            |t| match t.kind {
                TokenKind::Star => Some(ParseToken::Multiply),
                TokenKind::Slash => Some(ParseToken::Divide),
                _ => None,
            },
            Self::expr_unary,
        )
    }

    fn expr_unary(&mut self) -> Node {
        let op = match self.ts.peek().kind {
            TokenKind::Bang => Some(ParseToken::Not),
            TokenKind::Tilde => Some(ParseToken::Invert),
            TokenKind::Plus => Some(ParseToken::Positive),
            // low/high byte extractors
            TokenKind::LessThan => Some(ParseToken::LowByte),
            TokenKind::GreaterThan => Some(ParseToken::HighByte),
            _ => None,
        };
        match op {
            Some(op) => {
                self.ts.next();
                let node = self.expr_postfix(false, true);
                let id = self.list();
                self.push(id, Node::Token(op));
                self.push(id, node);
                Node::List(id)
            }
            None => self.expr_postfix(false, true),
        }
    }

    //-----------------------------------------------------------------
    //  Postfix:  primary [expr]  (args)  .prop  ++/--

    fn expr_postfix(&mut self, is_lvalue: bool, allow_nested: bool) -> Node {
        let mut lnode = self.expr_primary(is_lvalue, true, allow_nested);

        // numeric values take no postfix ops
        if matches!(lnode, Node::Int(_)) {
            return lnode;
        }

        // sizeof/typeof arrive as bare tokens
        if matches!(lnode, Node::Token(ParseToken::SizeOf) | Node::Token(ParseToken::TypeOf)) {
            return self.expr_size_type(lnode);
        }

        loop {
            let (op, rnode) = match self.ts.peek().kind {
                TokenKind::OpenBracket => {
                    self.ts.next();
                    if self.ts.peek().kind == TokenKind::CloseBracket {
                        // empty brackets only matter in declarators
                        self.accept(TokenKind::CloseBracket);
                        (ParseToken::Array, Node::Empty)
                    } else {
                        let r = self.expr();
                        self.accept(TokenKind::CloseBracket);
                        (ParseToken::Lookup, r)
                    }
                }
                TokenKind::OpenParen => {
                    self.ts.next();
                    let r = self.arguments();
                    self.accept(TokenKind::CloseParen);
                    (ParseToken::FuncCall, r)
                }
                TokenKind::Period => {
                    self.ts.next();
                    let r = self.identifier();
                    (ParseToken::PropertyRef, r)
                }
                _ => break,
            };
            let id = self.list();
            self.push(id, Node::Token(op));
            self.push(id, lnode);
            self.push(id, rnode);
            lnode = Node::List(id);
        }

        if is_inc_dec(self.ts.peek().kind) {
            let op = match self.ts.next().kind {
                TokenKind::IncOp => ParseToken::Inc,
                _ => ParseToken::Dec,
            };
            let id = self.list();
            self.push(id, Node::Token(op));
            self.push(id, lnode);
            lnode = Node::List(id);
        }

        lnode
    }

    fn expr_size_type(&mut self, op_node: Node) -> Node {
        let id = self.list();
        self.push(id, op_node);
        self.accept(TokenKind::OpenParen);
        let ident = self.identifier();
        self.push(id, ident);
        self.accept(TokenKind::CloseParen);
        Node::List(id)
    }

    fn arguments(&mut self) -> Node {
        if self.ts.peek().kind == TokenKind::CloseParen {
            return Node::Empty;
        }
        let id = self.list();
        let first = self.expr();
        self.push(id, first);
        while self.accept_optional(TokenKind::Comma) {
            let next = self.expr();
            self.push(id, next);
        }
        Node::List(id)
    }

    //-----------------------------------------------------------------
    //  Primary

    fn expr_primary(&mut self, is_lvalue: bool, expr_allowed: bool, allow_nested: bool) -> Node {
        let mut token = self.ts.next();

        // eat a unary sign
        let mut negative = false;
        if matches!(token.kind, TokenKind::Minus | TokenKind::Plus) {
            negative = token.kind == TokenKind::Minus;
            token = self.ts.next();
        }

        match token.kind {
            TokenKind::Number => {
                if is_lvalue {
                    self.error(format!(
                        "Improper start of statement: \"{}\"... must be an identifier",
                        token.text
                    ));
                    return Node::Empty;
                }
                let mut value = lexer::parse_int(&token.text);
                if negative {
                    value = -value;
                }
                Node::Int(value)
            }

            TokenKind::Identifier | TokenKind::True | TokenKind::False => {
                let ident = Node::Str(token.text);
                if negative {
                    let id = self.list();
                    self.push(id, Node::Token(ParseToken::Negative));
                    self.push(id, ident);
                    Node::List(id)
                } else {
                    ident
                }
            }

            TokenKind::String => Node::Str(token.text),

            // address-of binds at the primary level
            TokenKind::Ampersand => {
                if is_lvalue {
                    self.error("Cannot use '&' on left side of assignment expression");
                    return Node::Empty;
                }
                let id = self.list();
                self.push(id, Node::Token(ParseToken::AddrOf));
                let inner = self.expr_primary(is_lvalue, expr_allowed, allow_nested);
                self.push(id, inner);
                Node::List(id)
            }

            TokenKind::OpenBrace | TokenKind::OpenBracket if !is_lvalue => {
                if expr_allowed {
                    self.value_list()
                } else {
                    self.error("Expression not allowed here");
                    Node::Empty
                }
            }

            TokenKind::OpenParen => {
                if !expr_allowed {
                    self.error("Expression not allowed here");
                    return Node::Empty;
                }
                if !allow_nested {
                    self.error("nested expression not allowed here");
                    return Node::Empty;
                }
                let node = {
                    let p = self.ts.peek();
                    if p.is_type() || p.is_modifier() {
                        self.cast_expr()
                    } else {
                        let inner = self.expr();
                        self.accept(TokenKind::CloseParen);
                        inner
                    }
                };
                if negative {
                    let id = self.list();
                    self.push(id, Node::Token(ParseToken::Negative));
                    self.push(id, node);
                    Node::List(id)
                } else {
                    node
                }
            }

            TokenKind::SizeOf => Node::Token(ParseToken::SizeOf),
            TokenKind::TypeOf => Node::Token(ParseToken::TypeOf),

            _ => {
                self.error(format!(
                    "Primitive not found....found token '{}' instead",
                    token.text
                ));
                Node::Empty
            }
        }
    }

    /// `{ a, b, c }` value list.
    fn value_list(&mut self) -> Node {
        let id = self.list();
        self.push(id, Node::Token(ParseToken::List));
        loop {
            let kind = self.ts.peek().kind;
            if matches!(kind, TokenKind::CloseBrace | TokenKind::CloseBracket) {
                break;
            }
            if !self.ts.has_token() {
                self.error("Missing closing delimiter in list");
                break;
            }
            let node = self.expr();
            self.push(id, node);
            self.accept_optional(TokenKind::Comma);
        }
        self.ts.next(); // eat the closing token
        self.ast.condense(id);
        Node::List(id)
    }

    fn cast_expr(&mut self) -> Node {
        let cast_list = self.list();
        while self.ts.peek().kind != TokenKind::CloseParen && self.ts.has_token() {
            let text = self.ts.next().text;
            self.push(cast_list, Node::Str(text));
        }
        self.accept(TokenKind::CloseParen);

        let id = self.list();
        self.push(id, Node::Token(ParseToken::Cast));
        self.push(id, Node::List(cast_list));
        let inner = if self.ts.peek().kind == TokenKind::OpenParen {
            self.accept(TokenKind::OpenParen);
            let e = self.expr();
            self.accept(TokenKind::CloseParen);
            e
        } else {
            self.expr()
        };
        self.push(id, inner);
        Node::List(id)
    }

    //-----------------------------------------------------------------
    //  Assignment

    fn expr_assignment(&mut self) -> Node {
        let lnode = self.expr_postfix(true, false);

        let basic = self.ts.peek().kind == TokenKind::Assign;
        let op_asgn = is_op_assign(self.ts.peek().kind);
        if !basic && !op_asgn {
            return lnode;
        }

        let op = if basic {
            self.accept(TokenKind::Assign);
            None
        } else {
            Some(match self.ts.next().kind {
                TokenKind::AddTo => ParseToken::Add,
                TokenKind::SubFrom => ParseToken::Sub,
                TokenKind::AndWith => ParseToken::BitAnd,
                _ => ParseToken::BitOr,
            })
        };

        let mut rnode = self.expr();

        // compound assignment desugars to  set dest (op dest rhs)
        if let Some(op) = op {
            let inner = self.list();
            self.push(inner, Node::Token(op));
            self.push(inner, lnode.clone());
            self.push(inner, rnode);
            rnode = Node::List(inner);
        }

        let id = self.list();
        self.push(id, Node::Token(ParseToken::Set));
        self.push(id, lnode);
        self.push(id, rnode);
        Node::List(id)
    }

    fn var_initializer(&mut self) -> Node {
        let id = self.list();
        self.accept(TokenKind::Assign);
        self.push(id, Node::Token(ParseToken::Init));
        let value = self.expr();
        self.push(id, value);
        Node::List(id)
    }

    //-----------------------------------------------------------------
    //  Declarations

    fn array_node(&mut self) -> Node {
        if self.ts.peek().kind != TokenKind::OpenBracket {
            return Node::Empty;
        }
        self.accept(TokenKind::OpenBracket);
        let size = if self.ts.peek().kind == TokenKind::CloseBracket {
            Node::Empty
        } else if self.ts.peek().kind == TokenKind::Number {
            Node::Int(lexer::parse_int(&self.ts.next().text))
        } else {
            self.expr()
        };
        self.accept(TokenKind::CloseBracket);

        let id = self.list();
        self.push(id, Node::Token(ParseToken::Array));
        self.push(id, size);
        Node::List(id)
    }

    /// One declarator: pointer/array markers, optional memory hint,
    /// optional register hint, optional initializer, or a function
    /// definition when `(` follows the name.
    fn var_node(&mut self, base_type: &str, mod_list: Node, reg_hint: Option<&str>) -> Node {
        let type_list = self.list();
        self.push(type_list, Node::Str(base_type.to_string()));

        // memory hint:  type @addr name
        let has_mem_hint = self.accept_optional(TokenKind::AtSign);
        let mem_addr = if has_mem_hint {
            lexer::parse_int(&self.ts.next().text)
        } else {
            0
        };

        if self.accept_optional(TokenKind::Star) {
            self.push(type_list, Node::Token(ParseToken::Ptr));
        }

        let name_node = Node::Str(self.ts.next().text);

        let array_node = self.array_node();
        if !matches!(array_node, Node::Empty) {
            self.push(type_list, array_node);
        }

        if let Some(hint) = reg_hint {
            let hint_list = self.list();
            self.push(hint_list, Node::Token(ParseToken::Hint));
            self.push(hint_list, Node::Str(hint.to_string()));
            self.push(type_list, Node::List(hint_list));
        }

        let is_function = self.ts.peek().kind == TokenKind::OpenParen;
        let param_node = if is_function {
            self.func_parameters()
        } else {
            Node::Empty
        };

        let asgn_node = if self.ts.peek().kind == TokenKind::Assign {
            self.var_initializer()
        } else {
            Node::Empty
        };

        let id = self.list();
        self.push(
            id,
            Node::Token(if is_function {
                ParseToken::Defun
            } else {
                ParseToken::Define
            }),
        );
        self.push(id, name_node);
        self.push(id, Node::List(type_list));
        self.push(id, mod_list);
        self.push(id, if is_function { param_node } else { asgn_node });
        if has_mem_hint {
            self.push(id, Node::Int(mem_addr));
        }

        if is_function
            && matches!(self.ts.peek().kind, TokenKind::OpenBrace | TokenKind::Asm)
        {
            let body = self.code_block();
            self.push(id, body);
        }

        Node::List(id)
    }

    fn mod_list(&mut self) -> Node {
        if !self.ts.peek().is_modifier() {
            return Node::Empty;
        }
        let id = self.list();
        while self.ts.peek().is_modifier() {
            let token = self.ts.next();
            let pt = match token.kind {
                TokenKind::Const => ParseToken::Const,
                TokenKind::Alias => ParseToken::Alias,
                TokenKind::Zeropage => ParseToken::Zeropage,
                TokenKind::Signed => ParseToken::Signed,
                TokenKind::Unsigned => ParseToken::Unsigned,
                TokenKind::Register => ParseToken::Register,
                _ => ParseToken::Inline,
            };
            self.push(id, Node::Token(pt));
        }
        Node::List(id)
    }

    /// One declaration statement, possibly with several comma-separated
    /// declarators sharing type and modifiers.
    fn variable(&mut self) -> Node {
        let mods = self.mod_list();
        let base_type = self.ts.next().text;

        let first = self.var_node(&base_type, mods.clone(), None);
        if self.ts.peek().kind != TokenKind::Comma {
            return first;
        }

        let compound = self.list();
        self.push(compound, first);
        while self.accept_optional(TokenKind::Comma) {
            let next = self.var_node(&base_type, mods.clone(), None);
            self.push(compound, next);
        }
        Node::List(compound)
    }

    fn parameter(&mut self) -> Node {
        let mods = self.mod_list();
        let token = self.ts.peek().clone();

        let is_user_type = token.is_identifier() && self.types.contains(&token.text);
        if !token.is_type() && !is_user_type {
            self.error(format!("Unknown or missing type: {}", token.text));
            return Node::Empty;
        }

        let base_type = self.ts.next().text;
        let reg_hint = if self.accept_optional(TokenKind::AtSign) {
            Some(self.ts.next().text)
        } else {
            None
        };
        self.var_node(&base_type, mods, reg_hint.as_deref())
    }

    fn parameters(&mut self) -> Node {
        let id = self.list();
        self.push(id, Node::Token(ParseToken::ParamList));
        let first = self.parameter();
        self.push(id, first);
        while self.accept_optional(TokenKind::Comma) {
            let next = self.parameter();
            self.push(id, next);
        }
        Node::List(id)
    }

    fn func_parameters(&mut self) -> Node {
        self.accept(TokenKind::OpenParen);
        let is_void = self.accept_optional(TokenKind::Void);
        let params = if !is_void && self.ts.peek().kind != TokenKind::CloseParen {
            self.parameters()
        } else {
            Node::Empty
        };
        self.accept(TokenKind::CloseParen);
        params
    }

    //-----------------------------------------------------------------
    //  Enumerations:  enum Tag { name = value, ... }

    fn enumeration(&mut self) -> Node {
        let id = self.list();
        self.accept(TokenKind::Enum);
        self.push(id, Node::Token(ParseToken::Enum));

        if self.ts.peek().kind != TokenKind::OpenBrace {
            let name = self.ts.next().text;
            self.types.add(&name);
            self.push(id, Node::Str(name));
        } else {
            self.push(id, Node::Empty);
        }

        self.accept(TokenKind::OpenBrace);
        let mut value = 0;
        while self.ts.peek().kind != TokenKind::CloseBrace && self.ts.has_token() {
            let name = self.ts.next().text;
            if self.accept_optional(TokenKind::Assign) {
                value = lexer::parse_int(&self.ts.next().text);
            }
            let pair = self.list();
            self.push(pair, Node::Str(name));
            self.push(pair, Node::Int(value));
            self.push(id, Node::List(pair));
            value += 1;
            self.accept_optional(TokenKind::Comma);
        }
        self.accept(TokenKind::CloseBrace);
        self.ast.condense(id);
        Node::List(id)
    }

    //-----------------------------------------------------------------
    //  Struct / union

    fn struct_vars(&mut self) -> Node {
        let id = self.list();
        self.push(id, Node::Token(ParseToken::Vars));
        while self.ts.peek().kind != TokenKind::CloseBrace && self.ts.has_token() {
            let node = match self.ts.peek().kind {
                TokenKind::Struct => {
                    self.error("Structure definitions cannot be nested");
                    self.struct_or_union(ParseToken::Struct)
                }
                TokenKind::Union => self.struct_or_union(ParseToken::Union),
                _ => self.variable(),
            };
            self.unwrap_into(id, node);
            self.accept_optional(TokenKind::Semicolon);
        }
        self.ast.condense(id);
        Node::List(id)
    }

    fn struct_or_union(&mut self, type_token: ParseToken) -> Node {
        let id = self.list();
        self.ts.next(); // eat struct/union keyword
        self.push(id, Node::Token(type_token));

        let mut has_name = false;
        if self.ts.peek().kind != TokenKind::OpenBrace {
            let name = self.ts.next().text;
            self.types.add(&name);
            self.push(id, Node::Str(name));
            has_name = true;
        } else {
            self.push(id, Node::Empty);
        }

        if !has_name && type_token == ParseToken::Struct {
            self.error("Structure definition requires name");
        }

        self.accept(TokenKind::OpenBrace);
        let vars = self.struct_vars();
        self.push(id, vars);
        self.accept(TokenKind::CloseBrace);
        Node::List(id)
    }

    //-----------------------------------------------------------------
    //  Statements

    fn stmt_for(&mut self) -> Node {
        let id = self.list();
        self.accept(TokenKind::For);
        self.accept(TokenKind::OpenParen);
        self.push(id, Node::Token(ParseToken::For));

        let init = self.expr_assignment();
        self.push(id, init);
        self.accept(TokenKind::Semicolon);
        let cond = self.expr_logical();
        self.push(id, cond);
        self.accept(TokenKind::Semicolon);
        let incr = self.expr_assignment();
        self.push(id, incr);

        self.accept(TokenKind::CloseParen);
        let body = self.code_block();
        self.push(id, body);
        Node::List(id)
    }

    fn stmt_loop(&mut self) -> Node {
        let id = self.list();
        self.accept(TokenKind::Loop);
        self.accept(TokenKind::OpenParen);
        self.push(id, Node::Token(ParseToken::Loop));

        let var = Node::Str(self.ts.next().text);
        self.push(id, var);
        self.accept(TokenKind::Comma);
        let start = self.expr();
        self.push(id, start);
        self.accept(TokenKind::Comma);
        let count = self.expr();
        self.push(id, count);

        self.accept(TokenKind::CloseParen);
        let body = self.code_block();
        self.push(id, body);
        Node::List(id)
    }

    fn stmt_while(&mut self) -> Node {
        let id = self.list();
        self.accept(TokenKind::While);
        self.push(id, Node::Token(ParseToken::While));
        self.accept(TokenKind::OpenParen);
        let cond = self.expr_logical();
        self.push(id, cond);
        self.accept(TokenKind::CloseParen);
        let body = self.code_block();
        self.push(id, body);
        Node::List(id)
    }

    fn stmt_do(&mut self) -> Node {
        let id = self.list();
        self.accept(TokenKind::Do);
        self.push(id, Node::Token(ParseToken::DoWhile));
        let body = self.code_block();
        self.push(id, body);
        self.accept(TokenKind::While);
        self.accept(TokenKind::OpenParen);
        let cond = self.expr_logical();
        self.push(id, cond);
        self.accept(TokenKind::CloseParen);
        Node::List(id)
    }

    fn stmt_switch(&mut self) -> Node {
        let id = self.list();
        self.accept(TokenKind::Switch);
        self.push(id, Node::Token(ParseToken::Switch));
        self.accept(TokenKind::OpenParen);
        let scrutinee = self.expr();
        self.push(id, scrutinee);
        self.accept(TokenKind::CloseParen);
        self.accept(TokenKind::OpenBrace);

        loop {
            match self.ts.peek().kind {
                TokenKind::Case => {
                    self.accept(TokenKind::Case);
                    let case = self.list();
                    self.push(case, Node::Token(ParseToken::Case));
                    let value = self.expr_primary(false, false, false);
                    if self.accept_optional(TokenKind::Period) {
                        let prop = self.identifier();
                        let prop_ref = self.list();
                        self.push(prop_ref, Node::Token(ParseToken::PropertyRef));
                        self.push(prop_ref, value);
                        self.push(prop_ref, prop);
                        self.push(case, Node::List(prop_ref));
                    } else {
                        self.push(case, value);
                    }
                    self.accept(TokenKind::Colon);
                    let body = self.code_block();
                    self.push(case, body);
                    self.push(id, Node::List(case));
                }
                TokenKind::Default => {
                    self.accept(TokenKind::Default);
                    let case = self.list();
                    self.push(case, Node::Token(ParseToken::Default));
                    self.accept(TokenKind::Colon);
                    let body = self.code_block();
                    self.push(case, body);
                    self.push(id, Node::List(case));
                }
                TokenKind::CloseBrace => break,
                _ => {
                    self.error("Error parsing switch statement");
                    self.resync();
                    break;
                }
            }
        }
        self.accept(TokenKind::CloseBrace);
        self.ast.condense(id);
        Node::List(id)
    }

    fn stmt_if(&mut self) -> Node {
        let id = self.list();
        self.accept(TokenKind::If);
        self.push(id, Node::Token(ParseToken::If));
        self.accept(TokenKind::OpenParen);
        let cond = self.expr_logical();
        self.push(id, cond);
        self.accept(TokenKind::CloseParen);
        let then_block = self.code_block();
        self.push(id, then_block);
        if self.ts.peek().kind == TokenKind::Else {
            self.accept(TokenKind::Else);
            let else_block = self.code_block();
            self.push(id, else_block);
        }
        Node::List(id)
    }

    fn stmt_return(&mut self) -> Node {
        let id = self.list();
        self.accept(TokenKind::Return);
        self.push(id, Node::Token(ParseToken::Return));
        if self.ts.peek().kind != TokenKind::Semicolon {
            let value = self.expr();
            self.push(id, value);
        } else {
            self.push(id, Node::Empty);
        }
        Node::List(id)
    }

    fn stmt_strobe(&mut self) -> Node {
        let id = self.list();
        self.accept(TokenKind::Strobe);
        self.push(id, Node::Token(ParseToken::Strobe));
        let target = self.expr();
        self.push(id, target);
        Node::List(id)
    }

    fn stmt_break(&mut self) -> Node {
        self.accept(TokenKind::Break);
        Node::Token(ParseToken::Break)
    }

    /// `#show_cycles` / `#hide_cycles` inside code; anything else after
    /// `#` was already handled by the preprocessor scan.
    fn compiler_directive(&mut self) -> Node {
        self.ts.next(); // eat '#'
        let token = self.ts.next();
        let node = match DirectiveCode::from_name(&token.text) {
            Some(code) => {
                let id = self.list();
                self.push(id, Node::Token(ParseToken::Directive));
                self.push(id, Node::Int(i32::from(u8::from(code))));
                Node::List(id)
            }
            None => Node::Empty,
        };
        self.ts.skip_to_next_line();
        node
    }

    fn stmt(&mut self) -> Node {
        let start = self.ts.pos();
        let token = self.ts.peek().clone();
        let node = match token.kind {
            TokenKind::Break => self.stmt_break(),
            TokenKind::For => self.stmt_for(),
            TokenKind::Loop => self.stmt_loop(),
            TokenKind::Asm => self.asm_block(),
            TokenKind::Do => self.stmt_do(),
            TokenKind::While => self.stmt_while(),
            TokenKind::If => self.stmt_if(),
            TokenKind::Switch => self.stmt_switch(),
            TokenKind::Return => self.stmt_return(),
            TokenKind::Strobe => self.stmt_strobe(),
            TokenKind::OpenBrace => self.code_block(),
            TokenKind::Hash => self.compiler_directive(),
            TokenKind::Semicolon => Node::Empty,
            _ => {
                if token.is_type() || token.is_modifier() {
                    self.variable()
                } else if token.is_identifier() && self.types.contains(&token.text) {
                    self.variable()
                } else {
                    self.expr_assignment()
                }
            }
        };
        // a statement that consumed nothing would loop forever
        if self.ts.pos() == start && !matches!(token.kind, TokenKind::Semicolon) {
            self.ts.next();
        }
        self.accept_optional(TokenKind::Semicolon);
        node
    }

    fn stmt_block(&mut self) -> Node {
        let id = self.list();
        self.push(id, Node::Token(ParseToken::Code));

        self.accept(TokenKind::OpenBrace);
        while self.ts.has_token() && self.ts.peek().kind != TokenKind::CloseBrace {
            let node = self.stmt();
            self.unwrap_into(id, node);
        }
        self.accept(TokenKind::CloseBrace);

        self.ast.condense(id);
        Node::List(id)
    }

    pub fn code_block(&mut self) -> Node {
        match self.ts.peek().kind {
            TokenKind::Asm => self.asm_block(),
            TokenKind::OpenBrace => self.stmt_block(),
            _ => {
                let id = self.list();
                self.push(id, Node::Token(ParseToken::Code));
                let stmt = self.stmt();
                self.push(id, stmt);
                Node::List(id)
            }
        }
    }

    //-----------------------------------------------------------------
    //  Program

    fn program(&mut self) -> ListId {
        let prog = self.list();
        self.push(prog, Node::Token(ParseToken::Program));

        while self.ts.has_token() {
            let start = self.ts.pos();
            let token = self.ts.peek().clone();

            let node = match token.kind {
                TokenKind::Enum => self.enumeration(),
                TokenKind::Struct => self.struct_or_union(ParseToken::Struct),
                TokenKind::Union => self.struct_or_union(ParseToken::Union),
                TokenKind::Hash => self.compiler_directive(),
                _ => {
                    if token.is_type() || token.is_modifier() {
                        self.variable()
                    } else if token.is_identifier() {
                        if self.types.contains(&token.text) {
                            self.variable()
                        } else {
                            self.error(format!(
                                "Unknown type or unexpected identifier: {}",
                                token.text
                            ));
                            self.ts.next();
                            Node::Empty
                        }
                    } else {
                        self.error(format!("Unexpected token: '{}'", token.text));
                        self.ts.next();
                        Node::Empty
                    }
                }
            };

            self.accept_optional(TokenKind::Semicolon);
            self.unwrap_into(prog, node);

            if self.ts.pos() == start {
                self.ts.next();
            }
        }

        self.ast.condense(prog);
        prog
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> (Ast, ListId, Diagnostics) {
        let mut ast = Ast::new();
        let mut types = TypeRegistry::default();
        let mut diag = Diagnostics::new();
        let prog = parse_program(src, &mut ast, &mut types, &mut diag);
        (ast, prog, diag)
    }

    #[test]
    fn precedence_shapes_the_tree() {
        let (ast, prog, diag) = parse("char x; void main() { x = 2+3*4; }");
        assert!(!diag.has_errors());
        let text = ast.render(prog);
        // multiplication binds tighter than addition
        assert!(text.contains("(add, 2, (multiply, 3, 4))"), "{text}");
    }

    #[test]
    fn function_body_lands_in_slot_five() {
        let (ast, prog, diag) = parse("void main() { return; }");
        assert!(!diag.has_errors());
        let main_def = ast.list(prog).node(1).as_list().unwrap();
        let def = ast.list(main_def);
        assert_eq!(def.op_token(), Some(ParseToken::Defun));
        assert_eq!(def.node(1).as_str(), Some("main"));
        let body = def.node(5).as_list().expect("body list");
        assert_eq!(ast.list(body).op_token(), Some(ParseToken::Code));
    }

    #[test]
    fn compound_declaration_splats() {
        let (ast, prog, diag) = parse("char a, b;");
        assert!(!diag.has_errors());
        let prog_list = ast.list(prog);
        assert_eq!(prog_list.count(), 3); // program token + two defines
    }

    #[test]
    fn unary_byte_extractors() {
        let (ast, prog, diag) = parse("int w; char x; void main() { x = <w; x = >w; }");
        assert!(!diag.has_errors());
        let text = ast.render(prog);
        assert!(text.contains("(lowByte, 'w')"), "{text}");
        assert!(text.contains("(highByte, 'w')"), "{text}");
    }

    #[test]
    fn compound_assignment_desugars() {
        let (ast, prog, diag) = parse("char x; void main() { x += 2; }");
        assert!(!diag.has_errors());
        let text = ast.render(prog);
        assert!(text.contains("(set, 'x', (add, 'x', 2))"), "{text}");
    }

    #[test]
    fn enum_values_count_up() {
        let (ast, prog, diag) = parse("enum Colors { Red, Green = 5, Blue };");
        assert!(!diag.has_errors());
        let text = ast.render(prog);
        assert!(text.contains("('Red', 0)"), "{text}");
        assert!(text.contains("('Green', 5)"), "{text}");
        assert!(text.contains("('Blue', 6)"), "{text}");
    }

    #[test]
    fn error_cap_reports_three_then_suppresses() {
        let (_, _, diag) = parse("^ ^ ^ ^ ^ ^ ^");
        assert_eq!(diag.parse_error_count(), 3);
    }

    #[test]
    fn user_type_names_enable_declarations() {
        let (ast, prog, diag) = parse("struct Point { char x; char y; };  Point p;");
        assert!(!diag.has_errors());
        let text = ast.render(prog);
        assert!(text.contains("(struct, 'Point'"), "{text}");
        assert!(text.contains("(define, 'p'"), "{text}");
    }

    #[test]
    fn switch_with_cases_and_default() {
        let (ast, prog, diag) =
            parse("char g; void a(){} void b(){} void main() { switch (g) { case 1: a(); case 2: b(); default: a(); } }");
        assert!(!diag.has_errors());
        let text = ast.render(prog);
        assert!(text.contains("(case, 1"), "{text}");
        assert!(text.contains("(default, "), "{text}");
    }

    #[test]
    fn memory_hint_is_captured() {
        let (ast, prog, diag) = parse("char @$81 tia;");
        assert!(!diag.has_errors());
        let def = ast.list(prog).node(1).as_list().unwrap();
        assert_eq!(ast.list(def).node(5).as_int(), Some(0x81));
    }
}
