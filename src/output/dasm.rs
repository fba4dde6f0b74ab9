//! DASM-format assembly writer.

use std::fmt::Write as _;

use crate::diag::Diagnostics;
use crate::instr::{Instr, Operand, ParamExt};
use crate::isa::{cycle_count, AddrMode, Mnemonic};
use crate::symbols::{SymbolRecord, SymbolTable};

use super::{BlockPayload, OutputAdapter, OutputBlock, WriterCtx};

/// `$`-style hex rendering used for numeric operands.
fn num_to_str(num: i32) -> String {
    if num < 0 {
        format!("-${:X}", -num)
    } else {
        format!("${num:X}")
    }
}

#[derive(Default)]
pub struct DasmWriter {
    out: String,
    running_cycles: u32,
}

impl DasmWriter {
    pub fn new() -> Self {
        Self::default()
    }

    //-----------------------------------------------------------------
    //  Symbol headers

    fn print_constant_symbols(&mut self, table: &SymbolTable) {
        if !table.iter().any(SymbolRecord::is_simple_const) {
            return;
        }
        self.out.push_str(" ;-- Constants\n");
        for sym in table.iter() {
            if !sym.is_simple_const() {
                continue;
            }
            let _ = writeln!(
                self.out,
                "{:<20} = ${:02X}  ;--{}",
                sym.var_name(),
                sym.const_value.unwrap_or(0),
                sym.const_eval_notes,
            );
        }
        self.out.push('\n');
    }

    fn print_symbol_table(&mut self, table: &SymbolTable, table_name: &str) {
        let count = table.iter().filter(|s| !s.is_function()).count();
        if count > 0 {
            let _ = writeln!(self.out, " ;-- {table_name} Variables");
            for sym in table.iter() {
                let loc = sym.location;
                if sym.is_local && !sym.is_simple_const() && sym.kind != crate::symbols::SymbolKind::Alias
                {
                    if let Some(loc) = loc {
                        let _ = writeln!(self.out, ".{:<20} = ${loc:02X}", sym.name);
                    }
                } else if let Some(loc) = loc {
                    if loc > 0 && loc < 256 {
                        let _ = writeln!(self.out, "{:<20} = ${loc:02X}", sym.name);
                    } else if !sym.is_function() && !sym.is_simple_const() && !sym.is_array_const()
                    {
                        let _ = writeln!(
                            self.out,
                            "{:<20} = ${loc:04X}  ;-- flags: {:04X}",
                            sym.name,
                            sym.flags.bits(),
                        );
                    }
                }
            }
        }
        self.out.push('\n');
        self.print_constant_symbols(table);
    }

    fn print_func_sym_tables(&mut self, ctx: &WriterCtx, func_name: &str) {
        let Some(func) = ctx.globals.find(func_name) else {
            return;
        };
        let Some(ext) = func.ext.as_ref() else { return };
        if !ext.locals.is_empty() {
            self.print_symbol_table(&ext.locals, "Local");
        }
        if !ext.params.is_empty() {
            self.print_symbol_table(&ext.params, "Parameter");
        }
    }

    //-----------------------------------------------------------------
    //  Instructions

    fn param_str(instr: &Instr) -> String {
        let is_rel = instr.addr_mode == AddrMode::Rel;
        let plus_one = instr.param_ext.contains(ParamExt::PLUS_ONE);
        let mut out = String::new();

        match &instr.operand {
            Operand::None => {}
            Operand::Num(num) => {
                if is_rel {
                    // relative to the current statement address
                    if *num < 0 {
                        let _ = write!(out, "*-${:X}", -num);
                    } else {
                        let _ = write!(out, "*+${num:X}");
                    }
                } else {
                    out.push_str(&num_to_str(*num));
                }
            }
            Operand::Sym(name) => {
                if instr.param_ext.contains(ParamExt::LO) {
                    out.push('<');
                } else if instr.param_ext.contains(ParamExt::HI) {
                    out.push('>');
                }
                if plus_one {
                    let _ = write!(out, "[{name}+1]");
                } else {
                    out.push_str(name);
                }
            }
            Operand::SymPair(a, b) => {
                if instr.param_ext.contains(ParamExt::LO) {
                    out.push('<');
                } else if instr.param_ext.contains(ParamExt::HI) {
                    out.push('>');
                }
                out.push('[');
                out.push_str(a);
                if !b.starts_with('-') {
                    out.push('+');
                }
                out.push_str(b);
                if plus_one {
                    out.push_str("+1]");
                } else {
                    out.push(']');
                }
            }
        }
        out
    }

    fn op_ext(mne: Mnemonic, mode: AddrMode) -> &'static str {
        let is_jump = matches!(mne, Mnemonic::JMP | Mnemonic::JSR);
        if mode == AddrMode::Abs && !is_jump {
            ".w "
        } else if mode > AddrMode::Acc {
            "   "
        } else {
            ""
        }
    }

    fn write_instr(&mut self, ctx: &WriterCtx, instr: &Instr) {
        if let Some(label) = instr.label {
            let _ = writeln!(self.out, "{}:", ctx.labels.name(label));
        }

        let instr_buf = if instr.mne == Mnemonic::Data {
            let value = match instr.operand {
                Operand::Num(v) => v,
                _ => 0,
            };
            format!(".byte ${value:02X}")
        } else if instr.addr_mode != AddrMode::Imp || instr.mne == Mnemonic::None {
            if instr.mne == Mnemonic::None {
                String::new()
            } else {
                let param = Self::param_str(instr);
                let formatted = instr.addr_mode.print_format().replace("{}", &param);
                format!(
                    "{}{}  {}",
                    instr.mne.name(),
                    Self::op_ext(instr.mne, instr.addr_mode),
                    formatted
                )
            }
        } else {
            instr.mne.name().to_string()
        };

        // cycle annotations ride in the comment column
        let comment = if instr.show_cycles
            && instr.mne != Mnemonic::None
            && instr.mne != Mnemonic::Data
        {
            let cycles = cycle_count(instr.mne, instr.addr_mode);
            self.running_cycles += u32::from(cycles);
            format!(
                ";{} [{}] -- {}",
                cycles,
                self.running_cycles,
                instr.line_comment.as_deref().unwrap_or("")
            )
        } else {
            if !instr.show_cycles {
                self.running_cycles = 0;
            }
            match &instr.line_comment {
                Some(text) => format!(";-- {text}"),
                None => String::new(),
            }
        };

        if comment.is_empty() {
            if instr_buf.is_empty() {
                self.out.push('\n');
            } else {
                let _ = writeln!(self.out, "\t{instr_buf}");
            }
        } else {
            let _ = writeln!(self.out, "\t{instr_buf:<32}\t{comment}");
        }
    }

    fn write_block_header(&mut self, ctx: &WriterCtx, block: &OutputBlock, with_label: bool) {
        let abs = ctx.machine.start_addr.wrapping_add(block.addr);
        self.out
            .push_str(";------------------------------------------------------\n");
        let _ = writeln!(self.out, ";--  {abs:04X}: {}", block.name);
        let _ = writeln!(self.out, ";--  {:04X} (bytes)\n", block.size);
        if with_label {
            let _ = writeln!(self.out, "{}:", block.name);
        }
    }

    fn write_block_footer(&mut self, name: &str) {
        let _ = writeln!(
            self.out,
            "\techo \"{name:<30} \", (*-{name}),({name}),\"-\",(*-1)\n"
        );
    }
}

impl OutputAdapter for DasmWriter {
    fn ext(&self) -> &'static str {
        ".asm"
    }

    fn init(&mut self, ctx: &WriterCtx) {
        self.out.push_str("\t\tprocessor 6502\n\n");
        let _ = write!(
            self.out,
            "\n\n\tORG $0000\n\tRORG ${:04X}\n",
            ctx.machine.start_addr
        );
        self.print_symbol_table(ctx.globals, "Main");
    }

    fn start_block(&mut self, _ctx: &WriterCtx, block: &OutputBlock) {
        if block.addr & 0xFF == 0 && block.addr != 0 {
            self.out.push_str("\talign 256\n");
        }
    }

    fn write_function(&mut self, ctx: &WriterCtx, block: &OutputBlock, _diag: &mut Diagnostics) {
        let BlockPayload::Code(code) = &block.payload else {
            return;
        };
        self.write_block_header(ctx, block, false);
        self.out.push_str(" SUBROUTINE\n");
        if let Some(func_name) = &code.func_name {
            self.print_func_sym_tables(ctx, func_name);
        }
        for instr in &code.instrs {
            self.write_instr(ctx, instr);
        }
        self.write_block_footer(&block.name);
    }

    fn write_array(&mut self, ctx: &WriterCtx, block: &OutputBlock) {
        let BlockPayload::Array { data, .. } = &block.payload else {
            return;
        };
        self.write_block_header(ctx, block, true);

        // eight values to a line
        let type_str = if data.elem_size > 1 { "word" } else { "byte" };
        for chunk in data.values.chunks(8) {
            let _ = write!(self.out, "\t.{type_str} ");
            let joined: Vec<String> = chunk.iter().map(i32::to_string).collect();
            self.out.push_str(&joined.join(","));
            self.out.push('\n');
        }
        self.write_block_footer(&block.name);
        self.out.push_str("\n\n");
    }

    fn write_struct(&mut self, ctx: &WriterCtx, block: &OutputBlock) {
        let BlockPayload::Struct { sym, records } = &block.payload else {
            return;
        };
        self.write_block_header(ctx, block, true);

        // member layout comes from the variable's struct type
        let members: Vec<(String, u16)> = ctx
            .globals
            .find(sym)
            .and_then(|rec| rec.user_type.as_ref())
            .and_then(|type_name| ctx.globals.find(type_name))
            .and_then(|type_rec| type_rec.ext.as_ref())
            .map(|ext| {
                ext.params
                    .iter()
                    .map(|m| (m.name.clone(), m.base_var_size()))
                    .collect()
            })
            .unwrap_or_default();

        for record in records {
            for (i, value) in record.iter().enumerate() {
                let (member_name, size) = members
                    .get(i)
                    .cloned()
                    .unwrap_or_else(|| (String::new(), 1));
                let type_str = if size > 1 { "word" } else { "byte" };
                let _ = writeln!(self.out, "\t.{type_str} {value:<5}\t\t;-- {member_name}");
            }
            self.out.push('\n');
        }
        self.write_block_footer(&block.name);
        self.out.push_str("\n\n");
    }

    fn end_block(&mut self, _ctx: &WriterCtx, _block: &OutputBlock) {}

    fn done(&mut self, ctx: &WriterCtx, _diag: &mut Diagnostics) -> Vec<u8> {
        let bank_size = ctx.machine.bank_size();
        let vector_org = bank_size - 8;
        let vector_rorg = u32::from(ctx.machine.end_addr) - 7;
        let _ = write!(
            self.out,
            "\n\n\tORG ${vector_org:04X}\n\tRORG ${vector_rorg:04X}\n"
        );
        self.out.push_str("\t.word  $0000\n");
        self.out.push_str("\t.word  $0000\n");
        let _ = writeln!(self.out, "\t.word  {}", ctx.entry_point);
        let _ = writeln!(self.out, "\t.word  {}", ctx.entry_point);
        self.out.push_str("\n\n;--- END OF PROGRAM\n\n");
        std::mem::take(&mut self.out).into_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instr::{InstrBuilder, Labels};
    use crate::machine::Machine;
    use crate::output::{write_output, BlockList};
    use crate::symbols::SymbolTable;

    fn render(blocks: &BlockList, globals: &SymbolTable, labels: &Labels) -> String {
        let machine = Machine::Atari2600.info();
        let ctx = WriterCtx {
            globals,
            labels,
            machine: &machine,
            entry_point: "main",
        };
        let mut writer = DasmWriter::new();
        let mut diag = Diagnostics::new();
        let bytes = write_output(&mut writer, blocks, &ctx, &mut diag);
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn prologue_vectors_and_footer() {
        let machine = Machine::Atari2600.info();
        let blocks = BlockList::new(&machine);
        let globals = SymbolTable::new_global();
        let labels = Labels::new();
        let text = render(&blocks, &globals, &labels);
        assert!(text.contains("processor 6502"));
        assert!(text.contains("RORG $F000"));
        assert!(text.contains("ORG $0FF8"));
        assert!(text.contains("RORG $FFF8"));
        assert!(text.contains(".word  main"));
    }

    #[test]
    fn instruction_formats() {
        let machine = Machine::Atari2600.info();
        let mut blocks = BlockList::new(&machine);
        let globals = SymbolTable::new_global();
        let mut labels = Labels::new();
        let head = labels.new_label("main", crate::instr::LabelKind::Code);

        let mut b = InstrBuilder::start_block("main");
        b.set_label(head);
        b.add_instr_n(Mnemonic::LDA, AddrMode::Imm, 14);
        b.add_instr(Mnemonic::STA, AddrMode::Zp, "x", ParamExt::empty());
        b.add_instr2(Mnemonic::STA, AddrMode::Abs, "s", "1", ParamExt::ADD);
        b.add_instr(Mnemonic::LDA, AddrMode::Imm, "data", ParamExt::HI);
        b.add_instr(Mnemonic::LDA, AddrMode::Iy, "ptr", ParamExt::empty());
        b.add_instr_b(Mnemonic::RTS);
        let mut block = b.finish();
        block.func_name = Some("main".into());
        blocks.add_code("main", block);

        let text = render(&blocks, &globals, &labels);
        assert!(text.contains("main:"), "{text}");
        assert!(text.contains("#$E"), "{text}");
        assert!(text.contains("STA.w"), "{text}");
        assert!(text.contains("[s+1]"), "{text}");
        assert!(text.contains("#>data"), "{text}");
        assert!(text.contains("(ptr),y"), "{text}");
        assert!(text.contains(" SUBROUTINE"), "{text}");
        assert!(text.contains("echo"), "{text}");
    }

    #[test]
    fn cycle_comments_accumulate() {
        let machine = Machine::Atari2600.info();
        let mut blocks = BlockList::new(&machine);
        let globals = SymbolTable::new_global();
        let labels = Labels::new();

        let mut b = InstrBuilder::start_block("f");
        b.show_cycles(true);
        b.add_instr_n(Mnemonic::LDA, AddrMode::Imm, 1); // 2 cycles
        b.add_instr(Mnemonic::STA, AddrMode::Zp, "v", ParamExt::empty()); // 3 cycles
        blocks.add_code("f", b.finish());

        let text = render(&blocks, &globals, &labels);
        assert!(text.contains(";2 [2]"), "{text}");
        assert!(text.contains(";3 [5]"), "{text}");
    }

    #[test]
    fn array_data_eight_per_line() {
        let machine = Machine::Atari2600.info();
        let mut blocks = BlockList::new(&machine);
        let globals = SymbolTable::new_global();
        let labels = Labels::new();
        blocks.add_array_data(
            "tbl",
            "tbl",
            crate::output::DataList {
                elem_size: 1,
                values: (1..=10).collect(),
            },
        );
        let text = render(&blocks, &globals, &labels);
        assert!(text.contains("tbl:"), "{text}");
        assert!(text.contains(".byte 1,2,3,4,5,6,7,8\n"), "{text}");
        assert!(text.contains(".byte 9,10\n"), "{text}");
    }
}
