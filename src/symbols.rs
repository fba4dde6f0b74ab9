//! Symbol records and scoped symbol tables.
//!
//! Tables preserve insertion order because memory layout depends on it.
//! A symbol's user-defined type is recorded by *name* and resolved
//! against the global table at use sites; that keeps the
//! record/table/record chain free of ownership cycles.

use std::fmt::Write as _;

use bitflags::bitflags;

use crate::ast::ListId;

/// Base type of a variable.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SymbolType {
    #[default]
    None,
    Char,
    Int,
    Bool,
    /// variable whose type is a user-defined struct/union
    Struct,
    /// pointer destination type used by the code generator
    Ptr,
    /// unusable destination type (reported, never emitted)
    Error,
}

impl SymbolType {
    /// `char`/`byte`/`int`/`word`/`bool` name lookup; returns the type
    /// and whether it is signed.
    pub fn from_name(name: &str) -> Option<(SymbolType, bool)> {
        Some(match name {
            "char" => (SymbolType::Char, true),
            "byte" => (SymbolType::Char, false),
            "int" => (SymbolType::Int, true),
            "word" => (SymbolType::Int, false),
            "bool" | "boolean" => (SymbolType::Bool, false),
            _ => return None,
        })
    }

    /// Byte width when used as a destination-type hint.
    pub fn dest_size(self) -> u16 {
        match self {
            SymbolType::Int | SymbolType::Ptr => 2,
            _ => 1,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SymbolKind {
    #[default]
    None,
    Var,
    Const,
    Func,
    Struct,
    Union,
    Enum,
    Alias,
}

impl SymbolKind {
    pub fn name(self) -> &'static str {
        match self {
            SymbolKind::None => "",
            SymbolKind::Var => "var",
            SymbolKind::Const => "const",
            SymbolKind::Func => "func",
            SymbolKind::Struct => "struct",
            SymbolKind::Union => "union",
            SymbolKind::Enum => "enum",
            SymbolKind::Alias => "alias",
        }
    }
}

bitflags! {
    /// Modifier word carried on every symbol.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct ModifierFlags: u16 {
        const PARAM      = 0x0080;
        const INLINE     = 0x0100;
        const ZEROPAGE   = 0x0400;
        const REGISTER   = 0x0800;
        const ENUM_VALUE = 0x1000;
        const SIGNED     = 0x2000;
        const ARRAY      = 0x4000;
        const POINTER    = 0x8000;
    }
}

/// Register placement hint for parameters (`@A`/`@X`/`@Y`).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum VarHint {
    #[default]
    None,
    A,
    X,
    Y,
}

impl VarHint {
    pub fn from_char(c: char) -> VarHint {
        match c {
            'A' | 'a' => VarHint::A,
            'X' | 'x' => VarHint::X,
            'Y' | 'y' => VarHint::Y,
            _ => VarHint::None,
        }
    }
}

/// Extension block attached to functions and aggregate types.
///
/// Aggregates keep their member table in `params` (a function keeps its
/// parameters there); only functions use `locals`.
#[derive(Clone, Debug, Default)]
pub struct SymbolExt {
    pub uses: u32,
    pub func_depth: u32,
    pub param_count: usize,
    pub local_bytes: u16,
    pub inlined: bool,
    /// body AST, kept for inline expansion
    pub inline_body: Option<ListId>,
    pub code_size: u16,
    pub params: SymbolTable,
    pub locals: SymbolTable,
}

#[derive(Clone, Debug, Default)]
pub struct SymbolRecord {
    pub name: String,
    pub kind: SymbolKind,
    pub ty: SymbolType,
    pub flags: ModifierFlags,
    pub location: Option<u16>,
    pub const_value: Option<i32>,
    /// provenance text printed next to folded constants
    pub const_eval_notes: String,
    /// array length, or byte size for aggregate type symbols
    pub num_elements: u16,
    pub hint: VarHint,
    pub is_local: bool,
    pub is_stack: bool,
    /// name of the user-defined type this variable uses
    pub user_type: Option<String>,
    pub ext: Option<Box<SymbolExt>>,
}

impl SymbolRecord {
    pub fn new(name: &str, kind: SymbolKind, ty: SymbolType, flags: ModifierFlags) -> Self {
        Self {
            name: name.to_string(),
            kind,
            ty,
            flags,
            num_elements: 1,
            ..Default::default()
        }
    }

    pub fn is_const(&self) -> bool {
        self.kind == SymbolKind::Const
    }

    pub fn is_variable(&self) -> bool {
        self.kind == SymbolKind::Var
    }

    pub fn is_function(&self) -> bool {
        self.kind == SymbolKind::Func
    }

    pub fn is_struct(&self) -> bool {
        self.kind == SymbolKind::Struct
    }

    pub fn is_union(&self) -> bool {
        self.kind == SymbolKind::Union
    }

    pub fn is_pointer(&self) -> bool {
        self.flags.contains(ModifierFlags::POINTER)
    }

    pub fn is_array(&self) -> bool {
        self.flags.contains(ModifierFlags::ARRAY)
    }

    pub fn is_signed(&self) -> bool {
        self.flags.contains(ModifierFlags::SIGNED)
    }

    /// Constant with a singular value (not an array/aggregate).
    pub fn is_simple_const(&self) -> bool {
        self.is_const() && !self.is_array() && self.ty != SymbolType::Struct
    }

    pub fn is_array_const(&self) -> bool {
        self.is_const() && self.is_array()
    }

    pub fn has_location(&self) -> bool {
        self.location.is_some()
    }

    pub fn set_location(&mut self, location: u16) {
        self.location = Some(location);
    }

    pub fn set_const(&mut self, value: i32) {
        self.const_value = Some(value);
    }

    /// Is this symbol placed in zero page? Decides ZP vs. ABS addressing.
    pub fn is_zeropage(&self) -> bool {
        matches!(self.location, Some(loc) if loc < 256)
    }

    /// Destination type implied by this symbol.
    pub fn dest_type(&self) -> SymbolType {
        if self.is_pointer() {
            SymbolType::Ptr
        } else {
            self.ty
        }
    }

    /// Element stride for array indexing: 2 for pointer- or int-typed
    /// symbols, 1 otherwise.
    pub fn base_var_size(&self) -> u16 {
        if self.is_pointer() || self.ty == SymbolType::Int {
            2
        } else {
            1
        }
    }

    /// Total allocation size in bytes.
    ///
    /// Pointers take two bytes per element; user-defined types recurse
    /// into the type symbol; arrays and aggregate type symbols multiply
    /// by their element count.
    pub fn calc_var_size(&self, globals: &SymbolTable) -> u16 {
        let mut size: u32 = 1;

        if !self.is_pointer() {
            if let Some(type_name) = &self.user_type {
                if let Some(type_sym) = globals.find(type_name) {
                    size = u32::from(type_sym.calc_var_size(globals));
                }
            }
        }

        if self.is_array() || self.kind == SymbolKind::Struct {
            size *= u32::from(self.num_elements);
        }

        if self.ty == SymbolType::Int || self.is_pointer() {
            size *= 2;
        }
        size.min(u32::from(u16::MAX)) as u16
    }

    /// Name as it appears in generated assembly; locals use the DASM
    /// local-label `.` prefix.
    pub fn var_name(&self) -> String {
        if self.is_local {
            format!(".{}", self.name)
        } else {
            self.name.clone()
        }
    }

    /// Member table of the aggregate type behind this variable.
    pub fn members(&self) -> Option<&SymbolTable> {
        self.ext.as_ref().map(|e| &e.params)
    }
}

/// Insertion-ordered symbol table.
#[derive(Clone, Debug, Default)]
pub struct SymbolTable {
    pub name: String,
    symbols: Vec<SymbolRecord>,
}

impl SymbolTable {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            symbols: Vec::new(),
        }
    }

    /// The global table pre-installs the two boolean constants.
    pub fn new_global() -> Self {
        let mut table = Self::new("main");
        for (name, value) in [("false", 0), ("true", 1)] {
            let mut sym = SymbolRecord::new(
                name,
                SymbolKind::Const,
                SymbolType::Bool,
                ModifierFlags::empty(),
            );
            sym.set_const(value);
            table.symbols.push(sym);
        }
        table
    }

    /// Add a symbol; on a duplicate name the existing record is kept and
    /// `true` is returned so the caller can warn.
    pub fn add(&mut self, record: SymbolRecord) -> (usize, bool) {
        if let Some(idx) = self.index_of(&record.name) {
            return (idx, true);
        }
        self.symbols.push(record);
        (self.symbols.len() - 1, false)
    }

    fn index_of(&self, name: &str) -> Option<usize> {
        if name.is_empty() {
            return None;
        }
        self.symbols.iter().position(|s| s.name == name)
    }

    /// Linear, case-sensitive search; the empty name finds nothing.
    pub fn find(&self, name: &str) -> Option<&SymbolRecord> {
        self.index_of(name).map(|i| &self.symbols[i])
    }

    pub fn find_mut(&mut self, name: &str) -> Option<&mut SymbolRecord> {
        let idx = self.index_of(name)?;
        Some(&mut self.symbols[idx])
    }

    pub fn iter(&self) -> impl Iterator<Item = &SymbolRecord> {
        self.symbols.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut SymbolRecord> {
        self.symbols.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&SymbolRecord> {
        self.symbols.get(idx)
    }

    pub fn get_mut(&mut self, idx: usize) -> Option<&mut SymbolRecord> {
        self.symbols.get_mut(idx)
    }
}

//---------------------------------------------------------------------
//  Symbol table printing (the `.sym` dump)

fn print_symbol(out: &mut String, globals: &SymbolTable, sym: &SymbolRecord, indent: usize) {
    let name = format!("{}{}", "  ".repeat(indent), sym.name);
    let location = sym
        .location
        .map(|l| format!("{l:04x}"))
        .unwrap_or_default();
    let value = sym
        .const_value
        .map(|v| format!("{v:4x}"))
        .unwrap_or_default();
    let size = if sym.is_function() {
        sym.ext.as_ref().map(|e| e.code_size).unwrap_or(0)
    } else {
        sym.calc_var_size(globals)
    };
    let user_type = sym.user_type.clone().unwrap_or_default();
    let _ = writeln!(
        out,
        " {:<32}  {:>5}  {:>6}  {:04x}  {:>5}  {:02x}  {:02x}  {:04x}  {:>6}  {:20}",
        name,
        location,
        sym.kind.name(),
        sym.flags.bits(),
        if sym.is_pointer() { "true" } else { "false" },
        sym.base_var_size(),
        sym.num_elements,
        size,
        value,
        user_type,
    );
}

fn print_sub_tables(out: &mut String, globals: &SymbolTable, sym: &SymbolRecord, indent: usize) {
    let Some(ext) = &sym.ext else { return };
    if sym.is_struct() || sym.is_union() {
        for member in ext.params.iter() {
            print_symbol(out, globals, member, indent + 1);
            print_sub_tables(out, globals, member, indent + 1);
        }
    } else if sym.is_function() {
        if !ext.params.is_empty() {
            let _ = writeln!(out, "  Params:");
            for p in ext.params.iter() {
                print_symbol(out, globals, p, indent + 2);
            }
        }
        if !ext.locals.is_empty() {
            let _ = writeln!(out, "  Locals:");
            for l in ext.locals.iter() {
                print_symbol(out, globals, l, indent + 2);
            }
        }
    }
}

fn print_header(out: &mut String) {
    out.push_str(
        "    Symbol Name                    Loc    Kind  Flags  Pntr   BS  #El  Size  Value\n",
    );
    out.push_str(
        "-----------------------------------------------------------------------------------\n",
    );
}

/// Render a table (with nested sub-tables) the way the `.sym` file shows
/// it.
pub fn show_symbol_table(globals: &SymbolTable, table: &SymbolTable) -> String {
    let mut out = String::from("Symbol Table: \n");
    if table.is_empty() {
        out.push_str("  (none)  \n");
        return out;
    }
    print_header(&mut out);
    for sym in table.iter() {
        print_symbol(&mut out, globals, sym, 0);
        print_sub_tables(&mut out, globals, sym, 0);
    }
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(name: &str, ty: SymbolType, flags: ModifierFlags) -> SymbolRecord {
        SymbolRecord::new(name, SymbolKind::Var, ty, flags)
    }

    #[test]
    fn global_table_has_bool_constants() {
        let globals = SymbolTable::new_global();
        let t = globals.find("true").unwrap();
        assert_eq!(t.const_value, Some(1));
        assert_eq!(t.ty, SymbolType::Bool);
        assert_eq!(globals.find("false").unwrap().const_value, Some(0));
    }

    #[test]
    fn duplicate_add_keeps_first() {
        let mut table = SymbolTable::new("t");
        let mut first = var("x", SymbolType::Char, ModifierFlags::empty());
        first.set_const(7);
        let (_, dup) = table.add(first);
        assert!(!dup);
        let (idx, dup) = table.add(var("x", SymbolType::Int, ModifierFlags::empty()));
        assert!(dup);
        assert_eq!(table.get(idx).unwrap().const_value, Some(7));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn empty_name_finds_nothing() {
        let table = SymbolTable::new_global();
        assert!(table.find("").is_none());
    }

    #[test]
    fn var_sizes() {
        let globals = SymbolTable::new_global();
        assert_eq!(
            var("c", SymbolType::Char, ModifierFlags::empty()).calc_var_size(&globals),
            1
        );
        assert_eq!(
            var("i", SymbolType::Int, ModifierFlags::empty()).calc_var_size(&globals),
            2
        );
        assert_eq!(
            var("p", SymbolType::Char, ModifierFlags::POINTER).calc_var_size(&globals),
            2
        );

        let mut arr = var("a", SymbolType::Char, ModifierFlags::ARRAY);
        arr.num_elements = 10;
        assert_eq!(arr.calc_var_size(&globals), 10);

        let mut ptr_arr = var("p", SymbolType::Char, ModifierFlags::POINTER | ModifierFlags::ARRAY);
        ptr_arr.num_elements = 2;
        assert_eq!(ptr_arr.calc_var_size(&globals), 4);
    }

    #[test]
    fn struct_sizes_recurse_through_the_type_symbol() {
        let mut globals = SymbolTable::new_global();
        // struct S { char a; int b; } -> 3 bytes
        let mut s = SymbolRecord::new("S", SymbolKind::Struct, SymbolType::None, ModifierFlags::empty());
        s.num_elements = 3;
        globals.add(s);

        let mut v = var("s", SymbolType::Struct, ModifierFlags::empty());
        v.user_type = Some("S".into());
        assert_eq!(v.calc_var_size(&globals), 3);

        let mut vs = var("many", SymbolType::Struct, ModifierFlags::ARRAY);
        vs.user_type = Some("S".into());
        vs.num_elements = 4;
        assert_eq!(vs.calc_var_size(&globals), 12);
    }

    #[test]
    fn base_sizes_drive_index_stride() {
        let p = var("p", SymbolType::Char, ModifierFlags::POINTER);
        assert_eq!(p.base_var_size(), 2);
        let w = var("w", SymbolType::Int, ModifierFlags::empty());
        assert_eq!(w.base_var_size(), 2);
        let c = var("c", SymbolType::Char, ModifierFlags::empty());
        assert_eq!(c.base_var_size(), 1);
    }

    #[test]
    fn zeropage_boundary() {
        let mut sym = var("v", SymbolType::Char, ModifierFlags::empty());
        sym.set_location(0xFF);
        assert!(sym.is_zeropage());
        sym.set_location(0x100);
        assert!(!sym.is_zeropage());
    }

    #[test]
    fn local_names_use_dasm_prefix() {
        let mut sym = var("tmp", SymbolType::Char, ModifierFlags::empty());
        assert_eq!(sym.var_name(), "tmp");
        sym.is_local = true;
        assert_eq!(sym.var_name(), ".tmp");
    }
}
