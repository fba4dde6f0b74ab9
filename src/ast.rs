//! Abstract syntax tree: tagged nodes and the list arena they live in.
//!
//! Every syntactic construct is a [`List`] whose first node is the
//! operator (a [`ParseToken`] or, inside `asm` blocks, a mnemonic) and
//! whose remaining nodes are the operands. Lists are owned by the [`Ast`]
//! arena and addressed by [`ListId`]; nodes are small copyable values so
//! sharing is always by id, never by deep copy.

use std::fmt::Write as _;

use crate::isa::{AddrMode, Mnemonic};

/// Every syntactic form the parser can produce.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ParseToken {
    Empty,
    Code,
    Function,
    Inline,
    FuncCall,
    PropertyRef,
    Program,

    Define,
    Defun,
    Vars,
    Ptr,
    Array,
    Init,
    Hint,

    DoWhile,
    While,
    For,
    Loop,
    Return,
    Break,

    Struct,
    Union,
    Enum,
    Lookup,

    BitAnd,
    BitOr,
    BitEor,
    Inc,
    Dec,

    If,
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,

    Set,
    Cast,
    AddrOf,
    SizeOf,
    TypeOf,

    Asm,
    Label,
    Equate,
    Strobe,

    Add,
    Sub,
    ShiftLeft,
    ShiftRight,
    Invert,
    Not,
    Positive,
    Negative,
    BoolAnd,
    BoolOr,
    LowByte,
    HighByte,

    Switch,
    Case,
    Default,

    Multiply,
    Divide,

    ParamList,

    Zeropage,
    Signed,
    Unsigned,
    Const,
    Alias,
    Register,

    List,

    Directive,
}

impl ParseToken {
    pub fn name(self) -> &'static str {
        match self {
            ParseToken::Empty => "empty",
            ParseToken::Code => "code",
            ParseToken::Function => "function",
            ParseToken::Inline => "inline",
            ParseToken::FuncCall => "funcCall",
            ParseToken::PropertyRef => "propertyRef",
            ParseToken::Program => "program",
            ParseToken::Define => "define",
            ParseToken::Defun => "defun",
            ParseToken::Vars => "varList",
            ParseToken::Ptr => "ptr",
            ParseToken::Array => "array",
            ParseToken::Init => "init",
            ParseToken::Hint => "hint",
            ParseToken::DoWhile => "doWhile",
            ParseToken::While => "while",
            ParseToken::For => "for",
            ParseToken::Loop => "loop",
            ParseToken::Return => "return",
            ParseToken::Break => "break",
            ParseToken::Struct => "struct",
            ParseToken::Union => "union",
            ParseToken::Enum => "enum",
            ParseToken::Lookup => "lookup",
            ParseToken::BitAnd => "bitAnd",
            ParseToken::BitOr => "bitOr",
            ParseToken::BitEor => "bitEor",
            ParseToken::Inc => "inc",
            ParseToken::Dec => "dec",
            ParseToken::If => "if",
            ParseToken::Eq => "eq",
            ParseToken::Ne => "ne",
            ParseToken::Gt => "gt",
            ParseToken::Gte => "gte",
            ParseToken::Lt => "lt",
            ParseToken::Lte => "lte",
            ParseToken::Set => "set",
            ParseToken::Cast => "cast",
            ParseToken::AddrOf => "addrOf",
            ParseToken::SizeOf => "sizeof",
            ParseToken::TypeOf => "typeof",
            ParseToken::Asm => "asm",
            ParseToken::Label => "label",
            ParseToken::Equate => "equate",
            ParseToken::Strobe => "strobe",
            ParseToken::Add => "add",
            ParseToken::Sub => "sub",
            ParseToken::ShiftLeft => "shiftLeft",
            ParseToken::ShiftRight => "shiftRight",
            ParseToken::Invert => "invert",
            ParseToken::Not => "not",
            ParseToken::Positive => "positive",
            ParseToken::Negative => "negative",
            ParseToken::BoolAnd => "boolAnd",
            ParseToken::BoolOr => "boolOr",
            ParseToken::LowByte => "lowByte",
            ParseToken::HighByte => "highByte",
            ParseToken::Switch => "switch",
            ParseToken::Case => "case",
            ParseToken::Default => "default",
            ParseToken::Multiply => "multiply",
            ParseToken::Divide => "divide",
            ParseToken::ParamList => "paramList",
            ParseToken::Zeropage => "zeropage",
            ParseToken::Signed => "signed",
            ParseToken::Unsigned => "unsigned",
            ParseToken::Const => "const",
            ParseToken::Alias => "alias",
            ParseToken::Register => "register",
            ParseToken::List => "list",
            ParseToken::Directive => "directive",
        }
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            ParseToken::Eq
                | ParseToken::Ne
                | ParseToken::Gt
                | ParseToken::Gte
                | ParseToken::Lt
                | ParseToken::Lte
        )
    }
}

/// Address-mode information attached to an inline-asm instruction node.
///
/// `Pending` marks operands whose zero-page vs. absolute choice cannot be
/// made syntactically; the code generator resolves it from the operand's
/// symbol and no instruction may leave code generation still pending.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AsmAddrMode {
    Mode(AddrMode),
    /// memory operand, no index
    PendingM,
    /// memory operand indexed by X
    PendingMx,
    /// memory operand indexed by Y
    PendingMy,
}

impl AsmAddrMode {
    pub fn name(self) -> &'static str {
        match self {
            AsmAddrMode::Mode(m) => m.name(),
            AsmAddrMode::PendingM => "M?",
            AsmAddrMode::PendingMx => "MX?",
            AsmAddrMode::PendingMy => "MY?",
        }
    }
}

/// Identifier of a [`List`] inside the [`Ast`] arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListId(u32);

/// A single AST node.
#[derive(Clone, Debug, PartialEq)]
pub enum Node {
    Empty,
    Int(i32),
    Char(u8),
    Str(String),
    Token(ParseToken),
    Mne(Mnemonic),
    Addr(AsmAddrMode),
    List(ListId),
}

impl Node {
    pub fn is_token(&self, t: ParseToken) -> bool {
        matches!(self, Node::Token(pt) if *pt == t)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Node::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Node::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<ListId> {
        match self {
            Node::List(id) => Some(*id),
            _ => None,
        }
    }
}

/// Source line captured with a list so diagnostics and generated code can
/// echo the code that produced them.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SourceLine {
    pub line_num: u32,
    pub text: String,
}

/// An ordered sequence of nodes; `nodes[0]` conventionally holds the
/// operator and the rest its operands.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct List {
    pub nodes: Vec<Node>,
    pub line_num: u32,
    pub src_line: SourceLine,
    pub has_nested_list: bool,
}

impl List {
    pub fn count(&self) -> usize {
        self.nodes.len()
    }

    pub fn op_token(&self) -> Option<ParseToken> {
        match self.nodes.first() {
            Some(Node::Token(pt)) => Some(*pt),
            _ => None,
        }
    }

    pub fn node(&self, idx: usize) -> &Node {
        self.nodes.get(idx).unwrap_or(&Node::Empty)
    }
}

/// Arena owning every list produced by a parse.
#[derive(Debug, Default)]
pub struct Ast {
    lists: Vec<List>,
}

impl Ast {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_list(&mut self, line: SourceLine) -> ListId {
        let id = ListId(self.lists.len() as u32);
        self.lists.push(List {
            nodes: Vec::new(),
            line_num: line.line_num,
            src_line: line,
            has_nested_list: false,
        });
        id
    }

    pub fn add_node(&mut self, id: ListId, node: Node) {
        if matches!(node, Node::List(_)) {
            self.lists[id.0 as usize].has_nested_list = true;
        }
        self.lists[id.0 as usize].nodes.push(node);
    }

    /// Shrink a list's allocation down to its element count.
    pub fn condense(&mut self, id: ListId) {
        self.lists[id.0 as usize].nodes.shrink_to_fit();
    }

    pub fn reverse(&mut self, id: ListId) {
        self.lists[id.0 as usize].nodes.reverse();
    }

    /// Rewrite a single element in place. Used by initializer
    /// preprocessing to replace folded sub-expressions with their value.
    pub fn set_node(&mut self, id: ListId, idx: usize, node: Node) {
        self.lists[id.0 as usize].nodes[idx] = node;
    }

    pub fn list(&self, id: ListId) -> &List {
        &self.lists[id.0 as usize]
    }

    /// Wrap a lone node in a single-element list (for uniform error
    /// printing).
    pub fn wrap_node(&mut self, node: Node) -> ListId {
        let id = self.new_list(SourceLine::default());
        self.add_node(id, node);
        id
    }

    //-----------------------------------------------------------------
    //  Pretty printing (the `.ast` dump)

    fn show_node(&self, out: &mut String, node: &Node, indent: usize) {
        match node {
            Node::Empty => out.push_str("EMPTY"),
            Node::Int(n) => {
                let _ = write!(out, "{n}");
            }
            Node::Char(c) => {
                let _ = write!(out, "'{}'", *c as char);
            }
            Node::Str(s) => {
                let _ = write!(out, "'{s}'");
            }
            Node::Token(pt) => out.push_str(pt.name()),
            Node::Mne(m) => out.push_str(m.name()),
            Node::Addr(am) => out.push_str(am.name()),
            Node::List(id) => self.show_list(out, *id, indent + 1),
        }
    }

    /// Print a list with indentation; a list that contains nested lists
    /// starts on its own line.
    pub fn show_list(&self, out: &mut String, id: ListId, indent: usize) {
        let list = self.list(id);
        if indent > 0 && list.has_nested_list {
            out.push('\n');
            for _ in 0..indent {
                out.push_str("  ");
            }
        }
        out.push('(');
        for (i, node) in list.nodes.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            self.show_node(out, node, indent);
        }
        out.push(')');
    }

    pub fn render(&self, id: ListId) -> String {
        let mut out = String::new();
        self.show_list(&mut out, id, 0);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(n: u32, text: &str) -> SourceLine {
        SourceLine {
            line_num: n,
            text: text.into(),
        }
    }

    #[test]
    fn op_token_identifies_constructs() {
        let mut ast = Ast::new();
        let id = ast.new_list(line(1, "x = 1"));
        ast.add_node(id, Node::Token(ParseToken::Set));
        ast.add_node(id, Node::Str("x".into()));
        ast.add_node(id, Node::Int(1));
        assert_eq!(ast.list(id).op_token(), Some(ParseToken::Set));
        assert!(ast.list(id).node(0).is_token(ParseToken::Set));
        assert!(!ast.list(id).node(0).is_token(ParseToken::Add));
    }

    #[test]
    fn nested_lists_set_flag_and_indent() {
        let mut ast = Ast::new();
        let innermost = ast.new_list(line(1, ""));
        ast.add_node(innermost, Node::Token(ParseToken::Multiply));
        ast.add_node(innermost, Node::Int(3));
        ast.add_node(innermost, Node::Int(4));

        let inner = ast.new_list(line(1, ""));
        ast.add_node(inner, Node::Token(ParseToken::Add));
        ast.add_node(inner, Node::Int(2));
        ast.add_node(inner, Node::List(innermost));

        let outer = ast.new_list(line(1, ""));
        ast.add_node(outer, Node::Token(ParseToken::Set));
        ast.add_node(outer, Node::Str("x".into()));
        ast.add_node(outer, Node::List(inner));

        assert!(ast.list(outer).has_nested_list);
        assert!(ast.list(inner).has_nested_list);
        assert!(!ast.list(innermost).has_nested_list);

        let rendered = ast.render(outer);
        // the flat multiply prints inline; the nested add starts a line
        assert!(rendered.contains("(multiply, 3, 4)"));
        assert!(rendered.contains("\n  (add, 2, "));
    }

    #[test]
    fn in_place_rewrite_replaces_folded_initializer() {
        let mut ast = Ast::new();
        let id = ast.new_list(line(4, ""));
        ast.add_node(id, Node::Token(ParseToken::List));
        ast.add_node(id, Node::Str("someConst".into()));
        ast.set_node(id, 1, Node::Int(14));
        assert_eq!(ast.list(id).node(1), &Node::Int(14));
    }

    #[test]
    fn out_of_range_node_reads_as_empty() {
        let mut ast = Ast::new();
        let id = ast.new_list(line(1, ""));
        ast.add_node(id, Node::Token(ParseToken::Return));
        assert_eq!(ast.list(id).node(5), &Node::Empty);
    }
}
