//! Output layout: code and data blocks collected in emission order, the
//! label-address pre-pass, and the writer adapter interface shared by
//! the DASM and binary writers.

pub mod bin;
pub mod dasm;

use serde::Serialize;

use crate::diag::Diagnostics;
use crate::instr::{InstrBlock, Labels};
use crate::machine::MachineInfo;
use crate::symbols::SymbolTable;

/// Static data attached to an array block.
#[derive(Clone, Debug, Default)]
pub struct DataList {
    pub elem_size: u16,
    pub values: Vec<i32>,
}

/// One laid-out block. Addresses are bank-relative; the machine's start
/// address turns them absolute.
#[derive(Clone, Debug)]
pub struct OutputBlock {
    pub name: String,
    pub addr: u16,
    pub size: u16,
    pub bank: u8,
    pub payload: BlockPayload,
}

#[derive(Clone, Debug)]
pub enum BlockPayload {
    Code(InstrBlock),
    /// flat array data, owned by the named symbol
    Array { sym: String, data: DataList },
    /// array-of-struct data: one value list per record, member order
    Struct { sym: String, records: Vec<Vec<i32>> },
}

impl OutputBlock {
    pub fn kind_name(&self) -> &'static str {
        match self.payload {
            BlockPayload::Code(_) => "code",
            BlockPayload::Array { .. } => "data",
            BlockPayload::Struct { .. } => "struct",
        }
    }
}

/// The single default bank: where the image sits in memory and how big
/// the file is.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct Bank {
    pub mem_loc: u16,
    pub size: usize,
    pub file_loc: usize,
}

/// Blocks in emission order with a monotonically rising address cursor.
#[derive(Debug)]
pub struct BlockList {
    blocks: Vec<OutputBlock>,
    cur_addr: u16,
    bank: Bank,
}

#[derive(Clone, Debug, Serialize)]
pub struct BlockSummary {
    pub name: String,
    pub addr: u16,
    pub size: u16,
    pub bank: u8,
    pub kind: String,
}

impl BlockList {
    pub fn new(machine: &MachineInfo) -> Self {
        Self {
            blocks: Vec::new(),
            cur_addr: 0,
            bank: Bank {
                mem_loc: machine.start_addr,
                size: machine.bank_size(),
                file_loc: 0,
            },
        }
    }

    pub fn bank(&self) -> Bank {
        self.bank
    }

    pub fn cur_addr(&self) -> u16 {
        self.cur_addr
    }

    /// Align the cursor to the next 256-byte page.
    pub fn move_to_next_page(&mut self) {
        self.cur_addr = (self.cur_addr + 256) & 0xFF00;
    }

    /// Would a block of `size` bytes cross a page boundary here?
    pub fn crosses_page(&self, size: u16) -> bool {
        (1..=256).contains(&size)
            && (self.cur_addr & 0xFF00) != ((self.cur_addr + size - 1) & 0xFF00)
    }

    pub fn add_code(&mut self, name: &str, code: InstrBlock) -> u16 {
        let addr = self.cur_addr;
        let size = code.code_size;
        self.blocks.push(OutputBlock {
            name: name.to_string(),
            addr,
            size,
            bank: 0,
            payload: BlockPayload::Code(code),
        });
        self.cur_addr += size;
        addr
    }

    pub fn add_array_data(&mut self, sym: &str, name: &str, data: DataList) -> u16 {
        let addr = self.cur_addr;
        let size = (data.values.len() as u16) * data.elem_size;
        self.blocks.push(OutputBlock {
            name: name.to_string(),
            addr,
            size,
            bank: 0,
            payload: BlockPayload::Array {
                sym: sym.to_string(),
                data,
            },
        });
        self.cur_addr += size;
        addr
    }

    pub fn add_struct_data(
        &mut self,
        sym: &str,
        name: &str,
        record_size: u16,
        records: Vec<Vec<i32>>,
    ) -> u16 {
        let addr = self.cur_addr;
        let size = record_size * records.len() as u16;
        self.blocks.push(OutputBlock {
            name: name.to_string(),
            addr,
            size,
            bank: 0,
            payload: BlockPayload::Struct {
                sym: sym.to_string(),
                records,
            },
        });
        self.cur_addr += size;
        addr
    }

    pub fn blocks(&self) -> &[OutputBlock] {
        &self.blocks
    }

    pub fn summaries(&self) -> Vec<BlockSummary> {
        self.blocks
            .iter()
            .map(|b| BlockSummary {
                name: b.name.clone(),
                addr: b.addr,
                size: b.size,
                bank: b.bank,
                kind: b.kind_name().to_string(),
            })
            .collect()
    }

    /// The `--vl` layout view.
    pub fn display(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("{:<30}  addr  size  bank\n", "Block Name"));
        out.push_str("------------------------------------------------------\n");
        for b in &self.blocks {
            out.push_str(&format!(
                "{:<30}  {:04X}  {:04X}   {:02X}\n",
                b.name, b.addr, b.size, b.bank
            ));
        }
        out
    }
}

//---------------------------------------------------------------------
//  Label pre-pass

/// Walk every code block and give each attached label its absolute
/// address. Binary emission needs this before the main walk; running it
/// once up front keeps both writers in agreement.
pub fn assign_label_locations(blocks: &BlockList, labels: &mut Labels, machine: &MachineInfo) {
    for block in blocks.blocks() {
        let BlockPayload::Code(code) = &block.payload else {
            continue;
        };
        let mut addr = block.addr;
        for instr in &code.instrs {
            if let Some(label) = instr.label {
                labels.get_mut(label).location = Some(machine.start_addr + addr);
            }
            addr += instr.size();
        }
    }
}

/// Layout sanity check: every block must fit inside the bank.
pub fn check_bank_fit(blocks: &BlockList, diag: &mut Diagnostics) {
    let bank_size = blocks.bank().size;
    for block in blocks.blocks() {
        let top = usize::from(block.addr) + usize::from(block.size);
        if top > bank_size {
            diag.error(
                None::<u32>,
                format!("Block will not fit in bank: {} ({top:#x} > {bank_size:#x})", block.name),
            );
        }
    }
}

//---------------------------------------------------------------------
//  Writer adapter

/// Everything a writer needs to resolve names while emitting.
pub struct WriterCtx<'a> {
    pub globals: &'a SymbolTable,
    pub labels: &'a Labels,
    pub machine: &'a MachineInfo,
    pub entry_point: &'a str,
}

/// Shared adapter surface for the DASM and binary writers.
pub trait OutputAdapter {
    fn ext(&self) -> &'static str;
    fn init(&mut self, ctx: &WriterCtx);
    fn start_block(&mut self, ctx: &WriterCtx, block: &OutputBlock);
    fn write_function(&mut self, ctx: &WriterCtx, block: &OutputBlock, diag: &mut Diagnostics);
    fn write_array(&mut self, ctx: &WriterCtx, block: &OutputBlock);
    fn write_struct(&mut self, ctx: &WriterCtx, block: &OutputBlock);
    fn end_block(&mut self, ctx: &WriterCtx, block: &OutputBlock);
    fn done(&mut self, ctx: &WriterCtx, diag: &mut Diagnostics) -> Vec<u8>;
}

/// Drive an adapter over every block in layout order and hand back the
/// finished file image.
pub fn write_output(
    adapter: &mut dyn OutputAdapter,
    blocks: &BlockList,
    ctx: &WriterCtx,
    diag: &mut Diagnostics,
) -> Vec<u8> {
    adapter.init(ctx);
    for block in blocks.blocks() {
        adapter.start_block(ctx, block);
        match &block.payload {
            BlockPayload::Code(_) => adapter.write_function(ctx, block, diag),
            BlockPayload::Array { .. } => adapter.write_array(ctx, block),
            BlockPayload::Struct { .. } => adapter.write_struct(ctx, block),
        }
        adapter.end_block(ctx, block);
    }
    adapter.done(ctx, diag)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instr::InstrBuilder;
    use crate::isa::{AddrMode, Mnemonic};
    use crate::machine::Machine;

    #[test]
    fn cursor_tracks_block_sizes() {
        let machine = Machine::Atari2600.info();
        let mut blocks = BlockList::new(&machine);

        let mut b = InstrBuilder::start_block("f");
        b.add_instr_n(Mnemonic::LDA, AddrMode::Imm, 1);
        b.add_instr_b(Mnemonic::RTS);
        let addr = blocks.add_code("f", b.finish());
        assert_eq!(addr, 0);
        assert_eq!(blocks.cur_addr(), 3);

        let data = DataList {
            elem_size: 1,
            values: vec![1, 2, 3],
        };
        let daddr = blocks.add_array_data("tbl", "tbl", data);
        assert_eq!(daddr, 3);
        assert_eq!(blocks.cur_addr(), 6);
    }

    #[test]
    fn page_alignment() {
        let machine = Machine::Atari2600.info();
        let mut blocks = BlockList::new(&machine);
        let mut b = InstrBuilder::start_block("f");
        for _ in 0..100 {
            b.add_instr_b(Mnemonic::NOP);
        }
        blocks.add_code("f", b.finish());
        assert!(blocks.crosses_page(200));
        blocks.move_to_next_page();
        assert_eq!(blocks.cur_addr(), 0x100);
        assert!(!blocks.crosses_page(200));
    }

    #[test]
    fn label_pre_pass_assigns_absolute_addresses() {
        let machine = Machine::Atari2600.info();
        let mut labels = Labels::new();
        let head = labels.new_generic(crate::instr::LabelKind::Code);

        let mut blocks = BlockList::new(&machine);
        let mut b = InstrBuilder::start_block("f");
        b.add_instr_n(Mnemonic::LDA, AddrMode::Imm, 0); // 2 bytes
        b.set_label(head);
        b.add_instr_b(Mnemonic::INY); // label lands here
        b.add_instr_b(Mnemonic::RTS);
        blocks.add_code("f", b.finish());

        assign_label_locations(&blocks, &mut labels, &machine);
        assert_eq!(labels.get(head).location, Some(0xF002));
    }

    #[test]
    fn oversized_block_is_a_layout_error() {
        let machine = Machine::Atari2600.info();
        let mut blocks = BlockList::new(&machine);
        let data = DataList {
            elem_size: 2,
            values: vec![0; 3000],
        };
        blocks.add_array_data("big", "big", data);
        let mut diag = Diagnostics::new();
        check_bank_fit(&blocks, &mut diag);
        assert!(diag.has_errors());
    }
}
