//! Symbol generation: walks program-level declarations to populate the
//! global table, builds parameter/local sub-tables for functions, and
//! computes struct/union layout.

use crate::ast::{Ast, ListId, Node, ParseToken};
use crate::diag::Diagnostics;
use crate::eval;
use crate::symbols::{
    ModifierFlags, SymbolExt, SymbolKind, SymbolRecord, SymbolTable, SymbolType, VarHint,
};

/// Offset of the first stack byte above a `JSR`'s return address when
/// the callee does `TSX`.
const STACK_FRAME_SKIP: u16 = 3;

pub fn generate_symbols(
    ast: &Ast,
    prog: ListId,
    globals: &mut SymbolTable,
    diag: &mut Diagnostics,
) {
    let statements: Vec<ListId> = ast
        .list(prog)
        .nodes
        .iter()
        .filter_map(Node::as_list)
        .collect();

    for stmt in statements {
        let Some(op) = ast.list(stmt).op_token() else {
            continue;
        };
        match op {
            ParseToken::Define => {
                if let Some(rec) = build_variable(ast, stmt, globals, globals, diag) {
                    add_with_warning(globals, rec, diag);
                }
            }
            ParseToken::Defun => generate_function(ast, stmt, globals, diag),
            ParseToken::Struct => generate_struct(ast, stmt, globals, diag),
            ParseToken::Union => {
                generate_union(ast, stmt, globals, diag, 0);
            }
            ParseToken::Enum => generate_enum(ast, stmt, globals, diag),
            _ => {}
        }
    }
}

fn add_with_warning(table: &mut SymbolTable, rec: SymbolRecord, diag: &mut Diagnostics) -> usize {
    let name = rec.name.clone();
    let (idx, duplicate) = table.add(rec);
    if duplicate {
        diag.warn(format!("duplicate symbol: {name}"));
    }
    idx
}

//---------------------------------------------------------------------
//  Variables

/// Build a symbol record from a `define` list without inserting it.
/// `lookup` is the table used to resolve user types and array-size
/// constants (the global table in every current caller).
fn build_variable(
    ast: &Ast,
    var_def: ListId,
    lookup: &SymbolTable,
    globals: &SymbolTable,
    diag: &mut Diagnostics,
) -> Option<SymbolRecord> {
    let def = ast.list(var_def);
    let name = def.node(1).as_str()?.to_string();

    let type_list = def.node(2).as_list()?;
    let base_type = ast.list(type_list).node(0).as_str().unwrap_or("").to_string();

    let mut kind = SymbolKind::Var;
    let mut flags = ModifierFlags::empty();
    let mut user_type = None;

    let ty = match SymbolType::from_name(&base_type) {
        Some((ty, signed)) => {
            if signed {
                flags |= ModifierFlags::SIGNED;
            }
            ty
        }
        None if base_type == "void" => SymbolType::None,
        None => {
            // user-defined type
            match lookup.find(&base_type).or_else(|| globals.find(&base_type)) {
                Some(type_sym) if type_sym.is_struct() || type_sym.is_union() => {
                    user_type = Some(base_type.clone());
                    SymbolType::Struct
                }
                Some(type_sym) if type_sym.kind == SymbolKind::Enum => SymbolType::Char,
                _ => {
                    diag.error(
                        def.line_num,
                        format!("Unknown symbol type: '{base_type}'"),
                    );
                    SymbolType::None
                }
            }
        }
    };

    // pointer/array/hint markers ride along in the type list
    let mut array_size: u16 = 1;
    let mut hint = VarHint::None;
    for node in ast.list(type_list).nodes.iter().skip(1) {
        match node {
            Node::Token(ParseToken::Ptr) => flags |= ModifierFlags::POINTER,
            Node::List(sub) => {
                let sub_list = ast.list(*sub);
                match sub_list.op_token() {
                    Some(ParseToken::Array) => {
                        flags |= ModifierFlags::ARRAY;
                        match sub_list.node(1) {
                            Node::Int(n) => array_size = *n as u16,
                            Node::Str(const_name) => {
                                match lookup
                                    .find(const_name)
                                    .or_else(|| globals.find(const_name))
                                {
                                    Some(sym) if sym.is_simple_const() => {
                                        array_size = sym.const_value.unwrap_or(0) as u16;
                                    }
                                    _ => diag.error(
                                        def.line_num,
                                        format!("Unknown array size: {const_name}"),
                                    ),
                                }
                            }
                            Node::List(size_expr) => {
                                match eval::eval_expr(ast, globals, *size_expr) {
                                    Some(v) => array_size = v as u16,
                                    None => diag.error(
                                        def.line_num,
                                        "Unresolved array size expression".to_string(),
                                    ),
                                }
                            }
                            _ => {} // empty [] sized by the initializer
                        }
                    }
                    Some(ParseToken::Hint) => {
                        let reg = sub_list.node(1).as_str().unwrap_or("");
                        hint = VarHint::from_char(reg.chars().next().unwrap_or('\0'));
                    }
                    _ => {}
                }
            }
            _ => {}
        }
    }

    // modifier list
    if let Some(mods) = def.node(3).as_list() {
        for node in &ast.list(mods).nodes {
            match node {
                Node::Token(ParseToken::Zeropage) => flags |= ModifierFlags::ZEROPAGE,
                Node::Token(ParseToken::Const) => kind = SymbolKind::Const,
                Node::Token(ParseToken::Alias) => kind = SymbolKind::Alias,
                Node::Token(ParseToken::Signed) => flags |= ModifierFlags::SIGNED,
                Node::Token(ParseToken::Unsigned) => flags.remove(ModifierFlags::SIGNED),
                Node::Token(ParseToken::Register) => flags |= ModifierFlags::REGISTER,
                Node::Token(ParseToken::Inline) => flags |= ModifierFlags::INLINE,
                _ => diag.warn("Unknown modifier".to_string()),
            }
        }
    }

    let mut rec = SymbolRecord::new(&name, kind, ty, flags);
    rec.user_type = user_type.clone();
    rec.num_elements = array_size;
    rec.hint = hint;

    // aggregate-typed variables expose their member table
    if let Some(type_name) = &user_type {
        if let Some(type_sym) = lookup.find(type_name).or_else(|| globals.find(type_name)) {
            if let Some(ext) = &type_sym.ext {
                rec.ext = Some(Box::new(SymbolExt {
                    params: ext.params.clone(),
                    ..Default::default()
                }));
            }
        }
    }

    // explicit memory placement
    if let Node::Int(addr) = def.node(5) {
        rec.set_location(*addr as u16);
    }

    apply_initializer(ast, var_def, &mut rec, globals, diag);

    Some(rec)
}

/// Fold an `init` node into the record where possible; otherwise the
/// initializer list stays in the AST for the code generator.
fn apply_initializer(
    ast: &Ast,
    var_def: ListId,
    rec: &mut SymbolRecord,
    globals: &SymbolTable,
    diag: &mut Diagnostics,
) {
    let def = ast.list(var_def);
    let Some(init) = def.node(4).as_list() else {
        return;
    };
    if ast.list(init).op_token() != Some(ParseToken::Init) {
        return;
    }

    match ast.list(init).node(1) {
        Node::Int(value) => {
            rec.set_const(*value);
        }
        // const-in-const chains resolve through the table, any depth
        Node::Str(name) => {
            let resolved = globals
                .find(name)
                .filter(|s| s.is_const())
                .and_then(|s| s.const_value);
            match resolved {
                Some(value) => {
                    rec.set_const(value);
                    rec.const_eval_notes = name.clone();
                }
                None if rec.is_simple_const() => {
                    rec.set_const(0);
                    rec.const_eval_notes = "(unable to resolve)".to_string();
                    diag.error(def.line_num, format!("Unable to resolve: {}", rec.name));
                }
                None => {}
            }
        }
        Node::List(init_expr) => {
            let expr = ast.list(*init_expr);
            if expr.op_token() == Some(ParseToken::List) {
                // value list: element count comes from the data
                rec.num_elements = (expr.count() - 1) as u16;
                return;
            }

            // explicit address:  var = &0xNNNN
            if expr.op_token() == Some(ParseToken::AddrOf) {
                if let Node::Int(addr) = expr.node(1) {
                    rec.set_location(*addr as u16);
                    return;
                }
            }

            match eval::eval_expr(ast, globals, *init_expr) {
                Some(value) => {
                    rec.set_const(value);
                    rec.const_eval_notes = eval::expression_text(ast, *init_expr);
                }
                None if rec.is_simple_const() => {
                    rec.set_const(0);
                    rec.const_eval_notes = "(unable to resolve)".to_string();
                    diag.error(def.line_num, format!("Unable to resolve: {}", rec.name));
                }
                None => {}
            }
        }
        _ => {}
    }
}

//---------------------------------------------------------------------
//  Functions

fn generate_function(ast: &Ast, def_id: ListId, globals: &mut SymbolTable, diag: &mut Diagnostics) {
    let def = ast.list(def_id);
    let Some(name) = def.node(1).as_str().map(str::to_string) else {
        diag.error(def.line_num, "Function name expected");
        return;
    };

    let mut flags = ModifierFlags::empty();
    let mut inlined = false;
    if let Some(mods) = def.node(3).as_list() {
        if ast
            .list(mods)
            .nodes
            .iter()
            .any(|n| n.is_token(ParseToken::Inline))
        {
            flags |= ModifierFlags::INLINE;
            inlined = true;
        }
    }

    let ret_type = def
        .node(2)
        .as_list()
        .and_then(|tl| ast.list(tl).node(0).as_str().map(str::to_string))
        .unwrap_or_default();
    let (ty, type_flags) = match SymbolType::from_name(&ret_type) {
        Some((ty, signed)) => (
            ty,
            if signed {
                ModifierFlags::SIGNED
            } else {
                ModifierFlags::empty()
            },
        ),
        None => (SymbolType::None, ModifierFlags::empty()),
    };

    // parameters
    let mut params = SymbolTable::new(&name);
    let mut param_count = 0;
    if let Some(param_list) = def.node(4).as_list() {
        if ast.list(param_list).op_token() == Some(ParseToken::ParamList) {
            let param_defs: Vec<ListId> = ast
                .list(param_list)
                .nodes
                .iter()
                .skip(1)
                .filter_map(Node::as_list)
                .collect();

            let recs: Vec<SymbolRecord> = param_defs
                .into_iter()
                .filter_map(|p| build_variable(ast, p, globals, globals, diag))
                .collect();
            let stack_param_count =
                recs.iter().filter(|r| r.hint == VarHint::None).count() as u16;

            let mut stack_idx: u16 = 0;
            for mut rec in recs {
                rec.flags |= ModifierFlags::PARAM;
                rec.is_local = true;
                if rec.hint == VarHint::None {
                    // stack parameters index off the frame pointer; the
                    // last one pushed sits just above the return address
                    rec.is_stack = true;
                    rec.set_location(STACK_FRAME_SKIP + (stack_param_count - 1 - stack_idx));
                    stack_idx += 1;
                }
                param_count += 1;
                add_with_warning(&mut params, rec, diag);
            }
        }
    }

    // locals: every declaration statement reachable in the body
    let mut locals = SymbolTable::new(&name);
    if let Some(body) = def.node(5).as_list() {
        if ast.list(body).op_token() == Some(ParseToken::Code) {
            collect_locals(ast, body, globals, &mut locals, diag);
        }
    }

    let mut rec = SymbolRecord::new(&name, SymbolKind::Func, ty, flags | type_flags);
    rec.ext = Some(Box::new(SymbolExt {
        param_count,
        inlined,
        inline_body: def.node(5).as_list(),
        params,
        locals,
        ..Default::default()
    }));
    add_with_warning(globals, rec, diag);
}

fn collect_locals(
    ast: &Ast,
    code: ListId,
    globals: &SymbolTable,
    locals: &mut SymbolTable,
    diag: &mut Diagnostics,
) {
    for node in &ast.list(code).nodes {
        let Some(stmt) = node.as_list() else { continue };
        let stmt_list = ast.list(stmt);
        match stmt_list.op_token() {
            Some(ParseToken::Define) => {
                if let Some(mut rec) = build_variable(ast, stmt, globals, globals, diag) {
                    rec.is_local = true;
                    add_with_warning(locals, rec, diag);
                }
            }
            // no declarations inside asm blocks
            Some(ParseToken::Asm) => {}
            _ => {
                if stmt_list.has_nested_list {
                    collect_locals(ast, stmt, globals, locals, diag);
                }
            }
        }
    }
}

//---------------------------------------------------------------------
//  Structs, unions, enums

fn generate_struct(ast: &Ast, def_id: ListId, globals: &mut SymbolTable, diag: &mut Diagnostics) {
    let def = ast.list(def_id);
    let name = def
        .node(1)
        .as_str()
        .map(str::to_string)
        .unwrap_or_else(|| "__temp".to_string());

    let mut members = SymbolTable::new(&name);
    let mut offset: u16 = 0;

    if let Some(var_list) = def.node(2).as_list() {
        if ast.list(var_list).op_token() == Some(ParseToken::Vars) {
            let defs: Vec<ListId> = ast
                .list(var_list)
                .nodes
                .iter()
                .skip(1)
                .filter_map(Node::as_list)
                .collect();
            for member_def in defs {
                match ast.list(member_def).op_token() {
                    Some(ParseToken::Union) => {
                        let union_size =
                            generate_union_members(ast, member_def, &mut members, globals, diag, offset);
                        offset += union_size;
                    }
                    _ => {
                        if let Some(mut rec) =
                            build_variable(ast, member_def, globals, globals, diag)
                        {
                            rec.set_location(offset);
                            offset += rec.calc_var_size(globals);
                            add_with_warning(&mut members, rec, diag);
                        }
                    }
                }
            }
        }
    }

    let mut rec = SymbolRecord::new(&name, SymbolKind::Struct, SymbolType::None, ModifierFlags::empty());
    rec.num_elements = offset;
    rec.ext = Some(Box::new(SymbolExt {
        params: members,
        ..Default::default()
    }));
    add_with_warning(globals, rec, diag);
}

/// Union handling: every alternative shares the starting offset and the
/// union's size is the largest member.
fn generate_union_members(
    ast: &Ast,
    union_def: ListId,
    target: &mut SymbolTable,
    globals: &SymbolTable,
    diag: &mut Diagnostics,
    offset: u16,
) -> u16 {
    let def = ast.list(union_def);
    let Some(var_list) = def.node(2).as_list() else {
        return 0;
    };
    if ast.list(var_list).op_token() != Some(ParseToken::Vars) {
        return 0;
    }

    let mut max_size: u16 = 0;
    let defs: Vec<ListId> = ast
        .list(var_list)
        .nodes
        .iter()
        .skip(1)
        .filter_map(Node::as_list)
        .collect();
    for member_def in defs {
        if ast.list(member_def).op_token() == Some(ParseToken::Union) {
            let inner = generate_union_members(ast, member_def, target, globals, diag, offset);
            max_size = max_size.max(inner);
            continue;
        }
        if let Some(mut rec) = build_variable(ast, member_def, globals, globals, diag) {
            rec.set_location(offset);
            let size = rec.calc_var_size(globals);
            max_size = max_size.max(size);
            add_with_warning(target, rec, diag);
        }
    }
    max_size
}

fn generate_union(
    ast: &Ast,
    def_id: ListId,
    globals: &mut SymbolTable,
    diag: &mut Diagnostics,
    offset: u16,
) -> u16 {
    let def = ast.list(def_id);
    match def.node(1).as_str().map(str::to_string) {
        Some(name) => {
            let mut members = SymbolTable::new(&name);
            let size = generate_union_members(ast, def_id, &mut members, globals, diag, offset);
            let mut rec =
                SymbolRecord::new(&name, SymbolKind::Union, SymbolType::None, ModifierFlags::empty());
            rec.num_elements = size;
            rec.ext = Some(Box::new(SymbolExt {
                params: members,
                ..Default::default()
            }));
            add_with_warning(globals, rec, diag);
            size
        }
        None => {
            // anonymous union spills its members into the parent table
            let mut spill = SymbolTable::new("__union");
            let size = generate_union_members(ast, def_id, &mut spill, globals, diag, offset);
            let recs: Vec<SymbolRecord> = spill.iter().cloned().collect();
            for rec in recs {
                add_with_warning(globals, rec, diag);
            }
            size
        }
    }
}

fn generate_enum(ast: &Ast, def_id: ListId, globals: &mut SymbolTable, diag: &mut Diagnostics) {
    let def = ast.list(def_id);

    if let Some(tag) = def.node(1).as_str() {
        let rec = SymbolRecord::new(tag, SymbolKind::Enum, SymbolType::Char, ModifierFlags::empty());
        add_with_warning(globals, rec, diag);
    }

    let pairs: Vec<ListId> = ast
        .list(def_id)
        .nodes
        .iter()
        .skip(2)
        .filter_map(Node::as_list)
        .collect();
    for pair in pairs {
        let pair_list = ast.list(pair);
        let Some(value_name) = pair_list.node(0).as_str() else {
            continue;
        };
        let Some(value) = pair_list.node(1).as_int() else {
            continue;
        };
        let mut rec = SymbolRecord::new(
            value_name,
            SymbolKind::Const,
            SymbolType::Char,
            ModifierFlags::ENUM_VALUE,
        );
        rec.set_const(value);
        add_with_warning(globals, rec, diag);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{parse_program, TypeRegistry};

    fn symbols_for(src: &str) -> (SymbolTable, Diagnostics) {
        let mut ast = Ast::new();
        let mut types = TypeRegistry::default();
        let mut diag = Diagnostics::new();
        let prog = parse_program(src, &mut ast, &mut types, &mut diag);
        let mut globals = SymbolTable::new_global();
        generate_symbols(&ast, prog, &mut globals, &mut diag);
        (globals, diag)
    }

    #[test]
    fn struct_fields_get_declaration_order_offsets() {
        let (globals, diag) = symbols_for("struct S { char a; int b; char c; };");
        assert!(!diag.has_errors());
        let s = globals.find("S").unwrap();
        assert_eq!(s.num_elements, 4); // 1 + 2 + 1
        let members = s.members().unwrap();
        assert_eq!(members.find("a").unwrap().location, Some(0));
        assert_eq!(members.find("b").unwrap().location, Some(1));
        assert_eq!(members.find("c").unwrap().location, Some(3));
    }

    #[test]
    fn union_members_overlay_at_zero() {
        let (globals, diag) = symbols_for("union U { char lo; int pair; };");
        assert!(!diag.has_errors());
        let u = globals.find("U").unwrap();
        assert_eq!(u.num_elements, 2); // max member size
        let members = u.members().unwrap();
        assert_eq!(members.find("lo").unwrap().location, Some(0));
        assert_eq!(members.find("pair").unwrap().location, Some(0));
    }

    #[test]
    fn enum_values_become_char_consts() {
        let (globals, diag) = symbols_for("enum Mode { Off, On = 4, Fast };");
        assert!(!diag.has_errors());
        let tag = globals.find("Mode").unwrap();
        assert_eq!(tag.kind, SymbolKind::Enum);
        let on = globals.find("On").unwrap();
        assert_eq!(on.kind, SymbolKind::Const);
        assert_eq!(on.ty, SymbolType::Char);
        assert_eq!(on.const_value, Some(4));
        assert!(on.flags.contains(ModifierFlags::ENUM_VALUE));
        assert_eq!(globals.find("Fast").unwrap().const_value, Some(5));
    }

    #[test]
    fn array_size_resolves_through_const_chain() {
        let (globals, diag) = symbols_for(
            "const char BASE = 4; const char COUNT = BASE; char buffer[COUNT];",
        );
        assert!(!diag.has_errors());
        let buf = globals.find("buffer").unwrap();
        assert_eq!(buf.num_elements, 4);
        assert_eq!(buf.calc_var_size(&globals), 4);
    }

    #[test]
    fn folded_initializer_becomes_const_with_notes() {
        let (globals, diag) = symbols_for("const char x = 2 + 3 * 4;");
        assert!(!diag.has_errors());
        let x = globals.find("x").unwrap();
        assert_eq!(x.const_value, Some(14));
        assert_eq!(x.const_eval_notes, "2 + 3 * 4");
    }

    #[test]
    fn function_gets_param_and_local_tables() {
        let (globals, diag) = symbols_for(
            "void draw(char @A shade, char row, char col) { char tmp; tmp = row; }",
        );
        assert!(!diag.has_errors());
        let f = globals.find("draw").unwrap();
        let ext = f.ext.as_ref().unwrap();
        assert_eq!(ext.param_count, 3);

        let shade = ext.params.find("shade").unwrap();
        assert_eq!(shade.hint, VarHint::A);
        assert!(!shade.is_stack);

        // two stack params: first one deepest
        let row = ext.params.find("row").unwrap();
        let col = ext.params.find("col").unwrap();
        assert!(row.is_stack && col.is_stack);
        assert_eq!(row.location, Some(4));
        assert_eq!(col.location, Some(3));

        assert!(ext.locals.find("tmp").unwrap().is_local);
        // params never land in the local table
        assert!(ext.locals.find("row").is_none());
    }

    #[test]
    fn duplicate_declaration_warns_and_keeps_first() {
        let (globals, diag) = symbols_for("char x = 1; char x;");
        assert!(!diag.has_errors());
        assert!(diag.entries().iter().any(|d| d.message.contains("duplicate")));
        assert_eq!(globals.find("x").unwrap().const_value, Some(1));
    }

    #[test]
    fn explicit_address_skips_later_allocation() {
        let (globals, diag) = symbols_for("char @$81 colupf;");
        assert!(!diag.has_errors());
        assert_eq!(globals.find("colupf").unwrap().location, Some(0x81));
    }

    #[test]
    fn struct_typed_variable_links_to_its_type() {
        let (globals, diag) = symbols_for("struct S { char a; int b; }; S s;");
        assert!(!diag.has_errors());
        let v = globals.find("s").unwrap();
        assert_eq!(v.ty, SymbolType::Struct);
        assert_eq!(v.user_type.as_deref(), Some("S"));
        assert_eq!(v.calc_var_size(&globals), 3);
        assert!(v.members().unwrap().find("b").is_some());
    }
}
