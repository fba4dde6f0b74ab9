//! Binary image writer.
//!
//! Label addresses come from the shared pre-pass
//! ([`super::assign_label_locations`]); this writer's own walk emits the
//! opcode byte plus zero, one or two operand bytes per instruction.

use crate::diag::Diagnostics;
use crate::instr::{Instr, Operand, ParamExt};
use crate::isa::{lookup_opcode_fixed, AddrMode, Mnemonic};
use crate::lexer;

use super::{BlockPayload, OutputAdapter, OutputBlock, WriterCtx};

pub struct BinWriter {
    image: Vec<u8>,
}

impl BinWriter {
    pub fn new() -> Self {
        Self { image: Vec::new() }
    }

    /// Resolve a symbolic operand: function-local tables first (the
    /// `.`-prefix marks locals), then globals, then labels, then a
    /// literal number.
    fn name_value(
        ctx: &WriterCtx,
        func_name: Option<&str>,
        name: &str,
        diag: &mut Diagnostics,
    ) -> i32 {
        let stripped = name.strip_prefix('.').unwrap_or(name);

        if let Some(ext) = func_name
            .and_then(|f| ctx.globals.find(f))
            .and_then(|f| f.ext.as_ref())
        {
            for table in [&ext.locals, &ext.params] {
                if let Some(sym) = table.find(stripped) {
                    if let Some(loc) = sym.location {
                        return i32::from(loc);
                    }
                    if let Some(value) = sym.const_value {
                        return value;
                    }
                }
            }
        }

        if let Some(sym) = ctx.globals.find(name) {
            if let Some(loc) = sym.location {
                return i32::from(loc);
            }
            if let Some(value) = sym.const_value {
                return value;
            }
        }

        if let Some(label) = ctx.labels.find(name) {
            let resolved = ctx.labels.resolve(label);
            if let Some(loc) = ctx.labels.get(resolved).location {
                return i32::from(loc);
            }
            diag.error(
                None::<u32>,
                format!("Label undefined at binary emission: {name}"),
            );
            return 0;
        }

        let first = name.chars().next().unwrap_or('\0');
        if first.is_ascii_digit() || first == '$' || first == '%' || first == '-' {
            return lexer::parse_int(name);
        }

        diag.error(
            None::<u32>,
            format!("Label undefined at binary emission: {name}"),
        );
        0
    }

    /// Fully resolved operand value with the parameter extensions
    /// (`<`/`>`/`+`/`+1`) applied.
    fn param_value(
        ctx: &WriterCtx,
        func_name: Option<&str>,
        instr: &Instr,
        diag: &mut Diagnostics,
    ) -> i32 {
        let mut value = match &instr.operand {
            Operand::None => 0,
            Operand::Num(n) => *n,
            Operand::Sym(name) => Self::name_value(ctx, func_name, name, diag),
            Operand::SymPair(a, b) => {
                Self::name_value(ctx, func_name, a, diag)
                    + Self::name_value(ctx, func_name, b, diag)
            }
        };
        if instr.param_ext.contains(ParamExt::HI) {
            value >>= 8;
        }
        if instr.param_ext.contains(ParamExt::PLUS_ONE) {
            value += 1;
        }
        value
    }

    fn write_code_block(&mut self, ctx: &WriterCtx, block: &OutputBlock, diag: &mut Diagnostics) {
        let BlockPayload::Code(code) = &block.payload else {
            return;
        };
        let func_name = code.func_name.as_deref();
        let mut write_addr = usize::from(block.addr);

        for instr in &code.instrs {
            if instr.mne == Mnemonic::None {
                continue;
            }
            if instr.mne == Mnemonic::Data {
                let value = Self::param_value(ctx, func_name, instr, diag);
                self.poke(write_addr, value as u8);
                write_addr += 1;
                continue;
            }

            let Some(entry) = lookup_opcode_fixed(instr.mne, instr.addr_mode) else {
                diag.error(
                    None::<u32>,
                    format!(
                        "No encoding for {} {:?}",
                        instr.mne.name(),
                        instr.addr_mode
                    ),
                );
                continue;
            };
            self.poke(write_addr, entry.opcode);
            write_addr += 1;

            // the entry's mode decides the operand width (the ZPY
            // fallback widens to three bytes)
            let size = entry.mode.instr_size();
            if size == 1 {
                continue;
            }

            let value = Self::param_value(ctx, func_name, instr, diag);
            if instr.addr_mode == AddrMode::Rel {
                let byte = match instr.operand {
                    // numeric branches are relative to the instruction
                    Operand::Num(ofs) => ofs - 2,
                    // labels hold absolute targets
                    _ => {
                        let pc = i32::from(ctx.machine.start_addr) + write_addr as i32;
                        value - (pc + 1)
                    }
                };
                if !(-128..=127).contains(&byte) {
                    diag.error(
                        None::<u32>,
                        format!("Branch out of range in {}", block.name),
                    );
                }
                self.poke(write_addr, byte as u8);
                write_addr += 1;
            } else if size == 2 {
                self.poke(write_addr, (value & 0xFF) as u8);
                write_addr += 1;
            } else {
                self.poke(write_addr, (value & 0xFF) as u8);
                self.poke(write_addr + 1, ((value >> 8) & 0xFF) as u8);
                write_addr += 2;
            }
        }
    }

    fn poke(&mut self, addr: usize, value: u8) {
        if let Some(slot) = self.image.get_mut(addr) {
            *slot = value;
        }
    }
}

impl Default for BinWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputAdapter for BinWriter {
    fn ext(&self) -> &'static str {
        ".binary"
    }

    fn init(&mut self, ctx: &WriterCtx) {
        self.image = vec![0; ctx.machine.bank_size()];
    }

    fn start_block(&mut self, _ctx: &WriterCtx, _block: &OutputBlock) {}

    fn write_function(&mut self, ctx: &WriterCtx, block: &OutputBlock, diag: &mut Diagnostics) {
        self.write_code_block(ctx, block, diag);
    }

    fn write_array(&mut self, _ctx: &WriterCtx, block: &OutputBlock) {
        let BlockPayload::Array { data, .. } = &block.payload else {
            return;
        };
        let mut write_addr = usize::from(block.addr);
        for value in &data.values {
            self.poke(write_addr, (*value & 0xFF) as u8);
            write_addr += 1;
            if data.elem_size == 2 {
                self.poke(write_addr, ((*value >> 8) & 0xFF) as u8);
                write_addr += 1;
            }
        }
    }

    fn write_struct(&mut self, ctx: &WriterCtx, block: &OutputBlock) {
        let BlockPayload::Struct { sym, records } = &block.payload else {
            return;
        };
        let member_sizes: Vec<u16> = ctx
            .globals
            .find(sym)
            .and_then(|rec| rec.user_type.as_ref())
            .and_then(|type_name| ctx.globals.find(type_name))
            .and_then(|type_rec| type_rec.ext.as_ref())
            .map(|ext| ext.params.iter().map(|m| m.base_var_size()).collect())
            .unwrap_or_default();

        let mut write_addr = usize::from(block.addr);
        for record in records {
            for (i, value) in record.iter().enumerate() {
                let size = member_sizes.get(i).copied().unwrap_or(1);
                self.poke(write_addr, (*value & 0xFF) as u8);
                write_addr += 1;
                if size == 2 {
                    self.poke(write_addr, ((*value >> 8) & 0xFF) as u8);
                    write_addr += 1;
                }
            }
        }
    }

    fn end_block(&mut self, _ctx: &WriterCtx, _block: &OutputBlock) {}

    /// Patch the vector table into the image tail so the raw bank boots
    /// into the entry point.
    fn done(&mut self, ctx: &WriterCtx, diag: &mut Diagnostics) -> Vec<u8> {
        let entry = ctx
            .globals
            .find(ctx.entry_point)
            .and_then(|sym| sym.location)
            .or_else(|| {
                ctx.labels
                    .find(ctx.entry_point)
                    .and_then(|l| ctx.labels.get(l).location)
            });
        match entry {
            Some(addr) => {
                let tail = self.image.len() - 4;
                self.image[tail] = (addr & 0xFF) as u8;
                self.image[tail + 1] = (addr >> 8) as u8;
                self.image[tail + 2] = (addr & 0xFF) as u8;
                self.image[tail + 3] = (addr >> 8) as u8;
            }
            None => diag.error(
                None::<u32>,
                format!("Entry point has no address: {}", ctx.entry_point),
            ),
        }
        std::mem::take(&mut self.image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instr::{InstrBuilder, LabelKind, Labels};
    use crate::machine::Machine;
    use crate::output::{assign_label_locations, write_output, BlockList};
    use crate::symbols::{ModifierFlags, SymbolKind, SymbolRecord, SymbolTable, SymbolType};

    fn write(
        blocks: &BlockList,
        globals: &SymbolTable,
        labels: &mut Labels,
    ) -> (Vec<u8>, Diagnostics) {
        let machine = Machine::Atari2600.info();
        assign_label_locations(blocks, labels, &machine);
        let ctx = WriterCtx {
            globals,
            labels,
            machine: &machine,
            entry_point: "main",
        };
        let mut writer = BinWriter::new();
        let mut diag = Diagnostics::new();
        let image = write_output(&mut writer, blocks, &ctx, &mut diag);
        (image, diag)
    }

    #[test]
    fn encodes_bytes_and_vectors() {
        let machine = Machine::Atari2600.info();
        let mut labels = Labels::new();
        let main_label = labels.new_label("main", LabelKind::Code);

        let mut globals = SymbolTable::new_global();
        let mut x = SymbolRecord::new("x", SymbolKind::Var, SymbolType::Char, ModifierFlags::empty());
        x.set_location(0x80);
        globals.add(x);
        let mut main_sym =
            SymbolRecord::new("main", SymbolKind::Func, SymbolType::None, ModifierFlags::empty());
        main_sym.set_location(0xF000);
        globals.add(main_sym);

        let mut blocks = BlockList::new(&machine);
        let mut b = InstrBuilder::start_block("main");
        b.set_label(main_label);
        b.add_instr_n(Mnemonic::LDA, AddrMode::Imm, 14);
        b.add_instr(Mnemonic::STA, AddrMode::Zp, "x", ParamExt::empty());
        b.add_instr_b(Mnemonic::RTS);
        let mut block = b.finish();
        block.func_name = Some("main".into());
        blocks.add_code("main", block);

        let (image, diag) = write(&blocks, &globals, &mut labels);
        assert!(!diag.has_errors());
        assert_eq!(image.len(), 4096);
        assert_eq!(&image[0..5], &[0xA9, 14, 0x85, 0x80, 0x60]);
        // reset vector points at main ($F000)
        assert_eq!(&image[4092..4096], &[0x00, 0xF0, 0x00, 0xF0]);
    }

    #[test]
    fn relative_branch_to_label() {
        let machine = Machine::Atari2600.info();
        let mut labels = Labels::new();
        let main_label = labels.new_label("main", LabelKind::Code);
        let head = labels.new_generic(LabelKind::Code);

        let mut globals = SymbolTable::new_global();
        let mut main_sym =
            SymbolRecord::new("main", SymbolKind::Func, SymbolType::None, ModifierFlags::empty());
        main_sym.set_location(0xF000);
        globals.add(main_sym);

        let mut blocks = BlockList::new(&machine);
        let mut b = InstrBuilder::start_block("main");
        b.set_label(main_label);
        b.add_instr_n(Mnemonic::LDX, AddrMode::Imm, 8); // F000..F001
        b.set_label(head);
        b.add_instr_b(Mnemonic::DEX); // F002
        b.add_instr(Mnemonic::BNE, AddrMode::Rel, "L0001", ParamExt::empty()); // F003..F004
        b.add_instr_b(Mnemonic::RTS); // F005
        let mut block = b.finish();
        block.func_name = Some("main".into());
        blocks.add_code("main", block);

        let (image, diag) = write(&blocks, &globals, &mut labels);
        assert!(!diag.has_errors());
        // BNE back to $F002 from operand byte at $F004: $F002-$F005 = -3
        assert_eq!(image[3], 0xD0);
        assert_eq!(image[4] as i8, -3);
        let _ = machine;
    }

    #[test]
    fn zpy_fallback_encodes_aby() {
        let machine = Machine::Atari2600.info();
        let mut labels = Labels::new();
        let mut globals = SymbolTable::new_global();
        let mut main_sym =
            SymbolRecord::new("main", SymbolKind::Func, SymbolType::None, ModifierFlags::empty());
        main_sym.set_location(0xF000);
        globals.add(main_sym);
        let mut tbl =
            SymbolRecord::new("tbl", SymbolKind::Var, SymbolType::Char, ModifierFlags::ARRAY);
        tbl.set_location(0x90);
        globals.add(tbl);

        let mut blocks = BlockList::new(&machine);
        let mut b = InstrBuilder::start_block("main");
        // LDA zp,y has no encoding; must fall back to aby
        b.add_instr(Mnemonic::LDA, AddrMode::Zpy, "tbl", ParamExt::empty());
        blocks.add_code("main", b.finish());

        let (image, diag) = write(&blocks, &globals, &mut labels);
        assert!(!diag.has_errors());
        assert_eq!(image[0], 0xB9); // LDA aby
        assert_eq!(&image[1..3], &[0x90, 0x00]);
    }

    #[test]
    fn undefined_label_is_reported() {
        let machine = Machine::Atari2600.info();
        let mut labels = Labels::new();
        let mut globals = SymbolTable::new_global();
        let mut main_sym =
            SymbolRecord::new("main", SymbolKind::Func, SymbolType::None, ModifierFlags::empty());
        main_sym.set_location(0xF000);
        globals.add(main_sym);

        let mut blocks = BlockList::new(&machine);
        let mut b = InstrBuilder::start_block("main");
        b.add_instr(Mnemonic::JMP, AddrMode::Abs, "nowhere", ParamExt::empty());
        blocks.add_code("main", b.finish());

        let (_, diag) = write(&blocks, &globals, &mut labels);
        assert!(diag.has_errors());
    }
}
