//! Pipeline tests: compile small programs and check the instruction
//! streams, layout and writer output they produce.

use crate::instr::{Instr, Operand};
use crate::isa::{AddrMode, Mnemonic};
use crate::output::BlockPayload;
use crate::{Compiler, CompilerOptions, SourceFile};

fn compile(source: &str) -> Compiler {
    let mut compiler = Compiler::new(CompilerOptions::default());
    compiler
        .compile(&[SourceFile {
            name: "test.c".to_string(),
            source: source.to_string(),
        }])
        .expect("fatal compile error");
    compiler
}

/// Instructions of a function's block, comment carriers removed.
fn func_instrs(compiler: &Compiler, name: &str) -> Vec<Instr> {
    let blocks = compiler.blocks.as_ref().expect("no output blocks");
    for block in blocks.blocks() {
        if block.name == name {
            if let BlockPayload::Code(code) = &block.payload {
                return code
                    .instrs
                    .iter()
                    .filter(|i| i.mne != Mnemonic::None)
                    .cloned()
                    .collect();
            }
        }
    }
    panic!("no code block named {name}");
}

fn mnemonics(instrs: &[Instr]) -> Vec<Mnemonic> {
    instrs.iter().map(|i| i.mne).collect()
}

fn assert_no_errors(compiler: &Compiler) {
    assert!(
        !compiler.diag.has_errors(),
        "unexpected errors: {:#?}",
        compiler.diag.entries()
    );
}

//---------------------------------------------------------------------
//  End-to-end scenarios

#[test]
fn constant_fold_assignment() {
    let compiler = compile("char x; void main() { x = 2+3*4; }");
    assert_no_errors(&compiler);
    let instrs = func_instrs(&compiler, "main");

    assert_eq!(instrs[0].mne, Mnemonic::LDA);
    assert_eq!(instrs[0].addr_mode, AddrMode::Imm);
    assert_eq!(instrs[0].operand, Operand::Num(14));
    // the folded expression is kept as the comment
    assert_eq!(instrs[0].line_comment.as_deref(), Some("2 + 3 * 4"));

    assert_eq!(instrs[1].mne, Mnemonic::STA);
    assert_eq!(instrs[1].operand, Operand::Sym("x".to_string()));
    assert_eq!(instrs[2].mne, Mnemonic::RTS);
}

#[test]
fn signed_compare_to_zero_uses_bpl() {
    let compiler = compile("char i; void main() { while (i < 0) { i++; } }");
    assert_no_errors(&compiler);
    let instrs = func_instrs(&compiler, "main");
    let mnes = mnemonics(&instrs);

    // load i, skip loop with BPL (no CMP against the zero literal)
    assert_eq!(&mnes[0..2], &[Mnemonic::LDA, Mnemonic::BPL]);
    assert!(!mnes.contains(&Mnemonic::CMP));
    assert!(mnes.contains(&Mnemonic::INC));
    // the tail jumps back to the head label
    assert!(mnes.contains(&Mnemonic::JMP));
}

#[test]
fn struct_field_store() {
    let compiler = compile("struct S { char a; int b; }; S s; void main() { s.b = 7; }");
    assert_no_errors(&compiler);
    let instrs = func_instrs(&compiler, "main");

    // 16-bit constant: low in A, high in X
    assert_eq!(instrs[0].mne, Mnemonic::LDA);
    assert_eq!(instrs[0].operand, Operand::Num(7));
    assert_eq!(instrs[1].mne, Mnemonic::LDX);
    assert_eq!(instrs[1].operand, Operand::Num(0));

    // stores land one byte past `a`
    assert_eq!(instrs[2].mne, Mnemonic::STA);
    assert_eq!(
        instrs[2].operand,
        Operand::SymPair("s".to_string(), "1".to_string())
    );
    assert_eq!(instrs[2].line_comment.as_deref(), Some("s.b"));
    assert_eq!(instrs[3].mne, Mnemonic::STX);
    assert_eq!(
        instrs[3].operand,
        Operand::SymPair("s".to_string(), "2".to_string())
    );
}

#[test]
fn array_of_pointers_store() {
    let compiler = compile("char data; char *p[2]; void main() { p[1] = &data; }");
    assert_no_errors(&compiler);
    let instrs = func_instrs(&compiler, "main");

    // data was placed at $80, so its address folds: low byte in A,
    // high byte in X
    assert_eq!(instrs[0].mne, Mnemonic::LDA);
    assert_eq!(instrs[0].operand, Operand::Num(0x80));
    assert_eq!(instrs[0].line_comment.as_deref(), Some("&data"));
    assert_eq!(instrs[1].mne, Mnemonic::LDX);
    assert_eq!(instrs[1].operand, Operand::Num(0));

    // two stores to p+2 / p+3
    assert_eq!(
        instrs[2].operand,
        Operand::SymPair("p".to_string(), "2".to_string())
    );
    assert_eq!(
        instrs[3].operand,
        Operand::SymPair("p".to_string(), "3".to_string())
    );
    assert_eq!(instrs[3].mne, Mnemonic::STX);
}

#[test]
fn multiply_by_ten_uses_step_table() {
    let compiler = compile("char x; char y; void main() { x = y * 10; }");
    assert_no_errors(&compiler);
    let instrs = func_instrs(&compiler, "main");
    let mnes = mnemonics(&instrs);

    // ASL ASL ADC ASL with the CLC wrap, then the store
    let expected = [
        Mnemonic::LDA, // y
        Mnemonic::CLC,
        Mnemonic::ASL,
        Mnemonic::ASL,
        Mnemonic::CLC,
        Mnemonic::ADC, // y
        Mnemonic::ASL,
        Mnemonic::STA, // x
        Mnemonic::RTS,
    ];
    assert_eq!(mnes, expected);
    // no generic loop artifacts
    assert!(!mnes.contains(&Mnemonic::ROR));
}

#[test]
fn multiply_by_hundred_uses_generic_loop() {
    let compiler = compile("char x; char y; void main() { x = y * 100; }");
    assert_no_errors(&compiler);
    let instrs = func_instrs(&compiler, "main");
    let mnes = mnemonics(&instrs);

    assert!(mnes.contains(&Mnemonic::ROR));
    assert!(mnes.contains(&Mnemonic::LSR));
    assert!(mnes.contains(&Mnemonic::DEX));
    assert!(mnes.contains(&Mnemonic::TAX));
    // add uses multiplier-1 to absorb the always-set carry
    assert!(instrs
        .iter()
        .any(|i| i.mne == Mnemonic::ADC && i.operand == Operand::Num(99)));
}

#[test]
fn multiplier_sixteen_vs_seventeen() {
    let step = compile("char x; char y; void main() { x = y * 16; }");
    assert_no_errors(&step);
    assert!(!mnemonics(&func_instrs(&step, "main")).contains(&Mnemonic::ROR));

    let generic = compile("char x; char y; void main() { x = y * 17; }");
    assert_no_errors(&generic);
    assert!(mnemonics(&func_instrs(&generic, "main")).contains(&Mnemonic::ROR));
}

#[test]
fn switch_emits_compare_chains() {
    let compiler = compile(
        "char g;
         void a() { }
         void b() { }
         void c() { }
         void main() { switch (g) { case 1: a(); case 2: b(); default: c(); } }",
    );
    assert_no_errors(&compiler);
    let instrs = func_instrs(&compiler, "main");

    let cmp_values: Vec<i32> = instrs
        .iter()
        .filter(|i| i.mne == Mnemonic::CMP)
        .filter_map(|i| match i.operand {
            Operand::Num(n) => Some(n),
            _ => None,
        })
        .collect();
    assert_eq!(cmp_values, vec![1, 2]);

    let calls: Vec<String> = instrs
        .iter()
        .filter(|i| i.mne == Mnemonic::JSR)
        .filter_map(|i| i.operand.first_name().map(str::to_string))
        .collect();
    assert_eq!(calls, vec!["a", "b", "c"]);

    // every case body ends by jumping to the shared end label
    let jmp_count = instrs.iter().filter(|i| i.mne == Mnemonic::JMP).count();
    assert_eq!(jmp_count, 2);
    let bne_count = instrs.iter().filter(|i| i.mne == Mnemonic::BNE).count();
    assert_eq!(bne_count, 2);
}

#[test]
fn addressing_mode_boundary_at_page_one() {
    let compiler = compile(
        "char @$FF low; char @$100 high; void main() { low = 1; high = 2; }",
    );
    assert_no_errors(&compiler);
    let instrs = func_instrs(&compiler, "main");

    let stores: Vec<&Instr> = instrs.iter().filter(|i| i.mne == Mnemonic::STA).collect();
    assert_eq!(stores[0].addr_mode, AddrMode::Zp);
    assert_eq!(stores[1].addr_mode, AddrMode::Abs);
}

#[test]
fn shift_counts_outside_range_are_errors() {
    let compiler = compile("char x; void main() { x = x << 20; }");
    assert!(compiler.diag.has_errors());

    let ok = compile("char x; void main() { x = x << 3; }");
    assert_no_errors(&ok);
    let mnes = mnemonics(&func_instrs(&ok, "main"));
    assert_eq!(mnes.iter().filter(|m| **m == Mnemonic::ASL).count(), 3);
}

#[test]
fn redundant_constant_load_is_elided() {
    let compiler = compile("char a; char b; void main() { a = 5; b = 5; }");
    assert_no_errors(&compiler);
    let instrs = func_instrs(&compiler, "main");
    let loads = instrs.iter().filter(|i| i.mne == Mnemonic::LDA).count();
    assert_eq!(loads, 1, "second #5 load should be elided");
    let stores = instrs.iter().filter(|i| i.mne == Mnemonic::STA).count();
    assert_eq!(stores, 2);
}

#[test]
fn strobe_stores_without_loading() {
    let compiler = compile("char @$02 WSYNC; void main() { strobe WSYNC; }");
    assert_no_errors(&compiler);
    let instrs = func_instrs(&compiler, "main");
    assert_eq!(instrs[0].mne, Mnemonic::STA);
    assert_eq!(instrs[0].operand, Operand::Sym("WSYNC".to_string()));
}

#[test]
fn function_call_with_wrong_arity_is_an_error() {
    let compiler = compile("void f(char a, char b) { } void main() { f(1); }");
    assert!(compiler.diag.has_errors());
}

#[test]
fn call_parameters_honor_register_hints() {
    let compiler = compile(
        "void set(char @A value, char @X index) { }
         void main() { set(3, 4); }",
    );
    assert_no_errors(&compiler);
    let instrs = func_instrs(&compiler, "main");
    let mnes = mnemonics(&instrs);
    assert!(mnes.contains(&Mnemonic::LDX));
    assert!(mnes.contains(&Mnemonic::JSR));
    // no stack traffic when every parameter has a register
    assert!(!mnes.contains(&Mnemonic::PHA));
}

#[test]
fn bool_and_short_circuits() {
    let compiler = compile("char a; char b; void main() { if (a && b) { a = 1; } }");
    assert_no_errors(&compiler);
    let instrs = func_instrs(&compiler, "main");
    let beq_count = instrs.iter().filter(|i| i.mne == Mnemonic::BEQ).count();
    assert_eq!(beq_count, 2);
}

#[test]
fn inline_asm_binds_pending_modes() {
    let compiler = compile(
        "char @$81 zp_var; char @$180 abs_var;
         void main() asm {
            LDA zp_var
            LDA abs_var
            STA zp_var,x
         }",
    );
    assert_no_errors(&compiler);
    let instrs = func_instrs(&compiler, "main");
    assert_eq!(instrs[0].addr_mode, AddrMode::Zp);
    assert_eq!(instrs[1].addr_mode, AddrMode::Abs);
    assert_eq!(instrs[2].addr_mode, AddrMode::Zpx);
}

#[test]
fn inline_asm_forward_branch_and_equate() {
    let compiler = compile(
        "void main() asm {
            COUNT = 3
            LDX #COUNT
         top:
            DEX
            BNE top
         }",
    );
    assert_no_errors(&compiler);
    let instrs = func_instrs(&compiler, "main");
    // the branch names the user label
    assert!(instrs
        .iter()
        .any(|i| i.mne == Mnemonic::BNE && i.operand == Operand::Sym("top".to_string())));
    // the equate resolved as an immediate constant symbol
    assert!(instrs
        .iter()
        .any(|i| i.mne == Mnemonic::LDX && i.addr_mode == AddrMode::Imm));
}

#[test]
fn const_array_data_lands_in_rom() {
    let compiler = compile(
        "const char shades[] = { 2, 4, 8 };
         char x;
         void main() { x = shades[1]; }",
    );
    assert_no_errors(&compiler);

    // the data block exists and the symbol points into ROM
    let shades = compiler.globals.find("shades").unwrap();
    let loc = shades.location.unwrap();
    assert!(loc >= 0xF000);

    // the raw image holds the data bytes at the block offset
    let bin = compiler.binary_output().unwrap();
    let ofs = usize::from(loc - 0xF000);
    assert_eq!(&bin[ofs..ofs + 3], &[2, 4, 8]);
}

#[test]
fn referenced_labels_all_have_locations() {
    let compiler = compile(
        "char i;
         void main() {
            while (i < 10) { i++; }
            if (i == 3) { i = 0; } else { i = 1; }
         }",
    );
    assert_no_errors(&compiler);
    for label in compiler.labels.iter() {
        if label.referenced {
            assert!(
                label.location.is_some(),
                "label {} has no location",
                label.name
            );
        }
    }
}

#[test]
fn code_size_matches_encoded_bytes() {
    let compiler = compile("char x; void main() { x = 1; x++; }");
    assert_no_errors(&compiler);
    let blocks = compiler.blocks.as_ref().unwrap();
    for block in blocks.blocks() {
        if let BlockPayload::Code(code) = &block.payload {
            let sum: u16 = code.instrs.iter().map(Instr::size).sum();
            assert_eq!(sum, code.code_size);
            assert_eq!(block.size, code.code_size);
        }
    }
}

#[test]
fn missing_entry_point_is_an_error() {
    let compiler = compile("char x;");
    assert!(compiler.diag.has_errors());
    assert!(compiler
        .diag
        .entries()
        .iter()
        .any(|e| e.message.contains("Missing entry point")));
}

#[test]
fn entry_point_override() {
    let mut compiler = Compiler::new(CompilerOptions {
        entry_point: "start".to_string(),
        ..Default::default()
    });
    compiler
        .compile(&[SourceFile {
            name: "test.c".to_string(),
            source: "void start() { }".to_string(),
        }])
        .unwrap();
    assert_no_errors(&compiler);
    let asm = String::from_utf8(compiler.asm_output().unwrap().to_vec()).unwrap();
    assert!(asm.contains(".word  start"));
}

#[test]
fn dasm_and_binary_outputs_are_produced() {
    let compiler = compile("char x; void main() { x = 1; }");
    assert_no_errors(&compiler);

    let asm = String::from_utf8(compiler.asm_output().unwrap().to_vec()).unwrap();
    assert!(asm.contains("processor 6502"));
    assert!(asm.contains("main:"));

    let bin = compiler.binary_output().unwrap();
    assert_eq!(bin.len(), 4096);
    // reset vector points at main ($F000)
    assert_eq!(&bin[4092..4094], &[0x00, 0xF0]);
}

#[test]
fn do_while_loops_back() {
    let compiler = compile("char i; void main() { do { i++; } while (i < 5); }");
    assert_no_errors(&compiler);
    let instrs = func_instrs(&compiler, "main");
    let mnes = mnemonics(&instrs);
    assert!(mnes.contains(&Mnemonic::INC));
    assert!(mnes.contains(&Mnemonic::CMP));
    assert!(mnes.contains(&Mnemonic::JMP));
}

#[test]
fn loop_statement_counts_up() {
    let compiler = compile("char i; void main() { loop (i, 0, 5) { } }");
    assert_no_errors(&compiler);
    let instrs = func_instrs(&compiler, "main");
    let mnes = mnemonics(&instrs);
    assert!(mnes.contains(&Mnemonic::INC));
    // the loop compares against start+count
    assert!(instrs
        .iter()
        .any(|i| i.mne == Mnemonic::CMP && i.operand == Operand::Num(5)));
    assert!(mnes.contains(&Mnemonic::BNE));
}

#[test]
fn stack_parameters_round_trip_through_page_one() {
    let compiler = compile(
        "char result;
         void store(char value) { result = value; }
         void main() { store(9); }",
    );
    assert_no_errors(&compiler);

    // caller pushes and cleans up
    let main_instrs = func_instrs(&compiler, "main");
    let mnes = mnemonics(&main_instrs);
    assert!(mnes.contains(&Mnemonic::PHA));
    assert!(mnes.contains(&Mnemonic::JSR));
    let jsr_at = mnes.iter().position(|m| *m == Mnemonic::JSR).unwrap();
    assert!(
        mnes[jsr_at + 1..].contains(&Mnemonic::TXS),
        "stack cleanup after call"
    );

    // callee reads through TSX + page-one indexing
    let callee = func_instrs(&compiler, "store");
    assert!(mnemonics(&callee).contains(&Mnemonic::TSX));
    assert!(callee.iter().any(|i| {
        i.mne == Mnemonic::LDA
            && matches!(&i.operand, Operand::SymPair(a, b) if a == ".value" && b == "$100")
    }));
}
