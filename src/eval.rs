//! Pure constant folding over the AST.
//!
//! `eval_expr` produces a value only when every leaf resolves: integer
//! literals, or identifiers naming constants that carry a value. Anything
//! else (including division by zero) propagates "no result". Arithmetic
//! wraps in a 32-bit accumulator.

use crate::ast::{Ast, List, ListId, Node, ParseToken};
use crate::symbols::SymbolTable;

fn eval_node(ast: &Ast, globals: &SymbolTable, node: &Node) -> Option<i32> {
    match node {
        Node::Int(n) => Some(*n),
        Node::List(id) => eval_expr(ast, globals, *id),
        Node::Str(name) => {
            let sym = globals.find(name)?;
            if sym.is_const() {
                sym.const_value
            } else {
                None
            }
        }
        _ => None,
    }
}

fn eval_addr_of(globals: &SymbolTable, node: &Node) -> Option<i32> {
    let name = node.as_str()?;
    let sym = globals.find(name)?;
    sym.location.map(i32::from)
}

/// Evaluate an expression list to a constant, if possible.
pub fn eval_expr(ast: &Ast, globals: &SymbolTable, id: ListId) -> Option<i32> {
    let expr: &List = ast.list(id);
    if expr.count() < 2 {
        return None;
    }
    let op = expr.op_token()?;

    let left = if op == ParseToken::AddrOf {
        eval_addr_of(globals, expr.node(1))?
    } else {
        eval_node(ast, globals, expr.node(1))?
    };

    if expr.count() >= 3 {
        let right = eval_node(ast, globals, expr.node(2))?;
        let value = match op {
            ParseToken::Add => left.wrapping_add(right),
            ParseToken::Sub => left.wrapping_sub(right),
            ParseToken::Multiply => left.wrapping_mul(right),
            ParseToken::Divide => {
                if right == 0 {
                    return None;
                }
                left.wrapping_div(right)
            }
            ParseToken::BitAnd => left & right,
            ParseToken::BitOr => left | right,
            ParseToken::BitEor => left ^ right,
            // array element arithmetic folds as an address add
            ParseToken::Lookup => left.wrapping_add(right),
            _ => return None,
        };
        Some(value)
    } else {
        match op {
            ParseToken::Not => Some(i32::from(left == 0)),
            ParseToken::Invert => Some(!left),
            ParseToken::AddrOf => Some(left),
            ParseToken::Negative => Some(left.wrapping_neg()),
            ParseToken::Positive => Some(left),
            _ => None,
        }
    }
}

//---------------------------------------------------------------------
//  Printable expression form (used as generated-code comments)

const EXPR_ERR: &str = "#ERROR#";

fn node_text(ast: &Ast, node: &Node) -> Option<String> {
    match node {
        Node::Int(n) => Some(n.to_string()),
        Node::Str(s) => Some(s.clone()),
        Node::List(id) => Some(expression_text(ast, *id)),
        _ => None,
    }
}

/// Render an expression list back into source-ish text.
pub fn expression_text(ast: &Ast, id: ListId) -> String {
    let expr = ast.list(id);
    let Some(op) = expr.op_token() else {
        return EXPR_ERR.to_string();
    };
    let Some(left) = node_text(ast, expr.node(1)) else {
        return EXPR_ERR.to_string();
    };

    if expr.count() >= 3 {
        let Some(right) = node_text(ast, expr.node(2)) else {
            return EXPR_ERR.to_string();
        };
        match op {
            ParseToken::Add => format!("{left} + {right}"),
            ParseToken::Sub => format!("{left} - {right}"),
            ParseToken::Multiply => format!("{left} * {right}"),
            ParseToken::Divide => format!("{left} / {right}"),
            ParseToken::BitOr => format!("{left} | {right}"),
            ParseToken::BitAnd => format!("{left} & {right}"),
            ParseToken::BitEor => format!("{left} ^ {right}"),
            ParseToken::Lookup => format!("{left}[{right}]"),
            ParseToken::PropertyRef => format!("{left}.{right}"),
            _ => EXPR_ERR.to_string(),
        }
    } else {
        match op {
            ParseToken::Not => format!("!{left}"),
            ParseToken::Invert => format!("~{left}"),
            ParseToken::AddrOf => format!("&{left}"),
            ParseToken::Negative => format!("-{left}"),
            _ => EXPR_ERR.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::SourceLine;
    use crate::symbols::{ModifierFlags, SymbolKind, SymbolRecord, SymbolType};

    fn list(ast: &mut Ast, nodes: Vec<Node>) -> ListId {
        let id = ast.new_list(SourceLine::default());
        for n in nodes {
            ast.add_node(id, n);
        }
        id
    }

    #[test]
    fn folds_arithmetic() {
        let mut ast = Ast::new();
        let globals = SymbolTable::new_global();
        // 3 * 4
        let mul = list(
            &mut ast,
            vec![Node::Token(ParseToken::Multiply), Node::Int(3), Node::Int(4)],
        );
        // 2 + (3 * 4)
        let add = list(
            &mut ast,
            vec![Node::Token(ParseToken::Add), Node::Int(2), Node::List(mul)],
        );
        assert_eq!(eval_expr(&ast, &globals, add), Some(14));
        assert_eq!(expression_text(&ast, add), "2 + 3 * 4");
    }

    #[test]
    fn resolves_constants_through_the_table() {
        let mut ast = Ast::new();
        let mut globals = SymbolTable::new_global();
        let mut sym = SymbolRecord::new(
            "LIMIT",
            SymbolKind::Const,
            SymbolType::Char,
            ModifierFlags::empty(),
        );
        sym.set_const(40);
        globals.add(sym);

        let e = list(
            &mut ast,
            vec![
                Node::Token(ParseToken::Add),
                Node::Str("LIMIT".into()),
                Node::Int(2),
            ],
        );
        assert_eq!(eval_expr(&ast, &globals, e), Some(42));
    }

    #[test]
    fn non_const_identifier_propagates_no_result() {
        let mut ast = Ast::new();
        let mut globals = SymbolTable::new_global();
        globals.add(SymbolRecord::new(
            "v",
            SymbolKind::Var,
            SymbolType::Char,
            ModifierFlags::empty(),
        ));
        let e = list(
            &mut ast,
            vec![Node::Token(ParseToken::Add), Node::Str("v".into()), Node::Int(1)],
        );
        assert_eq!(eval_expr(&ast, &globals, e), None);
    }

    #[test]
    fn division_by_zero_is_no_result() {
        let mut ast = Ast::new();
        let globals = SymbolTable::new_global();
        let e = list(
            &mut ast,
            vec![Node::Token(ParseToken::Divide), Node::Int(1), Node::Int(0)],
        );
        assert_eq!(eval_expr(&ast, &globals, e), None);
    }

    #[test]
    fn addr_of_uses_symbol_location() {
        let mut ast = Ast::new();
        let mut globals = SymbolTable::new_global();
        let mut sym = SymbolRecord::new(
            "data",
            SymbolKind::Var,
            SymbolType::Char,
            ModifierFlags::empty(),
        );
        sym.set_location(0xF100);
        globals.add(sym);
        let e = list(
            &mut ast,
            vec![Node::Token(ParseToken::AddrOf), Node::Str("data".into())],
        );
        assert_eq!(eval_expr(&ast, &globals, e), Some(0xF100));

        // no location yet -> no result
        globals.add(SymbolRecord::new(
            "later",
            SymbolKind::Var,
            SymbolType::Char,
            ModifierFlags::empty(),
        ));
        let e2 = list(
            &mut ast,
            vec![Node::Token(ParseToken::AddrOf), Node::Str("later".into())],
        );
        assert_eq!(eval_expr(&ast, &globals, e2), None);
    }

    #[test]
    fn folding_is_idempotent() {
        let mut ast = Ast::new();
        let globals = SymbolTable::new_global();
        let e = list(
            &mut ast,
            vec![Node::Token(ParseToken::Sub), Node::Int(10), Node::Int(4)],
        );
        let first = eval_expr(&ast, &globals, e);
        let second = eval_expr(&ast, &globals, e);
        assert_eq!(first, second);
        assert_eq!(first, Some(6));
    }

    #[test]
    fn overflow_wraps_in_32_bits() {
        let mut ast = Ast::new();
        let globals = SymbolTable::new_global();
        let e = list(
            &mut ast,
            vec![
                Node::Token(ParseToken::Multiply),
                Node::Int(i32::MAX),
                Node::Int(2),
            ],
        );
        assert_eq!(eval_expr(&ast, &globals, e), Some(i32::MAX.wrapping_mul(2)));
    }
}
