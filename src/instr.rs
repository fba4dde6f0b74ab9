//! Per-function instruction streams and the process-wide label list.

use bitflags::bitflags;

use crate::isa::{self, AddrMode, Mnemonic};

bitflags! {
    /// Parameter extensions: low/high byte extraction and
    /// `(param1+param2[+1])` composition.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct ParamExt: u8 {
        const LO       = 0x01;
        const HI       = 0x02;
        const ADD      = 0x04;
        const PLUS_ONE = 0x10;
    }
}

/// An instruction operand: nothing, a number, a symbolic name, or a
/// `name+name` pair composed through [`ParamExt::ADD`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Operand {
    None,
    Num(i32),
    Sym(String),
    SymPair(String, String),
}

impl Operand {
    pub fn uses_var(&self) -> bool {
        matches!(self, Operand::Sym(_) | Operand::SymPair(..))
    }

    pub fn first_name(&self) -> Option<&str> {
        match self {
            Operand::Sym(s) => Some(s),
            Operand::SymPair(a, _) => Some(a),
            Operand::None | Operand::Num(_) => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Instr {
    pub mne: Mnemonic,
    pub addr_mode: AddrMode,
    pub operand: Operand,
    pub param_ext: ParamExt,
    pub label: Option<LabelId>,
    pub line_comment: Option<String>,
    pub show_cycles: bool,
}

impl Instr {
    pub fn size(&self) -> u16 {
        isa::instr_size(self.mne, self.addr_mode)
    }
}

/// Instruction stream for one function (or one static-code block).
#[derive(Clone, Debug, Default)]
pub struct InstrBlock {
    pub name: String,
    pub code_size: u16,
    /// owning function, when this block came from one
    pub func_name: Option<String>,
    pub instrs: Vec<Instr>,
}

impl InstrBlock {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    /// Sum of encoded instruction sizes.
    pub fn calc_code_size(&self) -> u16 {
        self.instrs.iter().map(Instr::size).sum()
    }
}

/// Builder holding the current block plus the pending-label and
/// pending-comment slots; both publish into the next emitted
/// instruction and are consumed by it.
#[derive(Debug, Default)]
pub struct InstrBuilder {
    pub block: InstrBlock,
    pending_label: Option<LabelId>,
    pending_comment: Option<String>,
    show_cycles: bool,
}

impl InstrBuilder {
    pub fn start_block(name: &str) -> Self {
        Self {
            block: InstrBlock::new(name),
            ..Default::default()
        }
    }

    pub fn set_label(&mut self, label: LabelId) {
        // two labels can land on the same spot (a function entry that
        // opens with a loop); park the first one on a carrier
        if self.pending_label.is_some() {
            self.push(Mnemonic::None, AddrMode::Imp, Operand::None, ParamExt::empty());
        }
        self.pending_label = Some(label);
    }

    pub fn cur_label(&self) -> Option<LabelId> {
        self.pending_label
    }

    pub fn set_line_comment(&mut self, comment: impl Into<String>) {
        self.pending_comment = Some(comment.into());
    }

    pub fn show_cycles(&mut self, on: bool) {
        self.show_cycles = on;
    }

    fn push(&mut self, mne: Mnemonic, addr_mode: AddrMode, operand: Operand, ext: ParamExt) -> usize {
        let instr = Instr {
            mne,
            addr_mode,
            operand,
            param_ext: ext,
            label: self.pending_label.take(),
            line_comment: self.pending_comment.take(),
            show_cycles: self.show_cycles,
        };
        self.block.instrs.push(instr);
        self.block.instrs.len() - 1
    }

    /// Instruction with a single named parameter.
    pub fn add_instr(&mut self, mne: Mnemonic, mode: AddrMode, param: &str, ext: ParamExt) -> usize {
        self.push(mne, mode, Operand::Sym(param.to_string()), ext)
    }

    /// Instruction with a composed `(param1+param2[+1])` parameter.
    pub fn add_instr2(
        &mut self,
        mne: Mnemonic,
        mode: AddrMode,
        param1: &str,
        param2: &str,
        ext: ParamExt,
    ) -> usize {
        self.push(
            mne,
            mode,
            Operand::SymPair(param1.to_string(), param2.to_string()),
            ext,
        )
    }

    /// Instruction with a purely numeric parameter.
    pub fn add_instr_n(&mut self, mne: Mnemonic, mode: AddrMode, num: i32) -> usize {
        self.push(mne, mode, Operand::Num(num), ParamExt::empty())
    }

    /// Single-byte instruction.
    pub fn add_instr_b(&mut self, mne: Mnemonic) -> usize {
        self.push(mne, AddrMode::Imp, Operand::None, ParamExt::empty())
    }

    /// No-mnemonic instruction carrying only a comment; annotates source
    /// lines in the output.
    pub fn add_comment_line(&mut self, comment: impl Into<String>) {
        let idx = self.push(Mnemonic::None, AddrMode::Imp, Operand::None, ParamExt::empty());
        self.block.instrs[idx].line_comment = Some(comment.into());
    }

    pub fn attach_comment(&mut self, idx: usize, comment: impl Into<String>) {
        if let Some(instr) = self.block.instrs.get_mut(idx) {
            instr.line_comment = Some(comment.into());
        }
    }

    pub fn last_mnemonic(&self) -> Option<Mnemonic> {
        self.block.instrs.last().map(|i| i.mne)
    }

    /// Finish the block: flush a dangling pending label onto a comment
    /// carrier and record the code size.
    pub fn finish(mut self) -> InstrBlock {
        if self.pending_label.is_some() || self.pending_comment.is_some() {
            self.push(Mnemonic::None, AddrMode::Imp, Operand::None, ParamExt::empty());
        }
        self.block.code_size = self.block.calc_code_size();
        self.block
    }
}

//---------------------------------------------------------------------
//  Labels

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LabelId(pub usize);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LabelKind {
    Code,
    Data,
}

#[derive(Clone, Debug)]
pub struct Label {
    pub name: String,
    pub kind: LabelKind,
    pub referenced: bool,
    pub location: Option<u16>,
    /// remap target used by optimization passes
    pub link: Option<LabelId>,
}

/// Process-wide label list. Generic labels are auto-named `L%04X` with a
/// monotonically increasing counter.
#[derive(Debug, Default)]
pub struct Labels {
    labels: Vec<Label>,
}

impl Labels {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_generic(&mut self, kind: LabelKind) -> LabelId {
        let name = format!("L{:04X}", self.labels.len());
        self.new_label(&name, kind)
    }

    pub fn new_label(&mut self, name: &str, kind: LabelKind) -> LabelId {
        self.labels.push(Label {
            name: name.to_string(),
            kind,
            referenced: false,
            location: None,
            link: None,
        });
        LabelId(self.labels.len() - 1)
    }

    pub fn find(&self, name: &str) -> Option<LabelId> {
        self.labels.iter().position(|l| l.name == name).map(LabelId)
    }

    pub fn get(&self, id: LabelId) -> &Label {
        &self.labels[id.0]
    }

    pub fn get_mut(&mut self, id: LabelId) -> &mut Label {
        &mut self.labels[id.0]
    }

    pub fn mark_referenced(&mut self, id: LabelId) {
        self.labels[id.0].referenced = true;
    }

    pub fn link(&mut self, src: LabelId, target: LabelId) {
        self.labels[src.0].link = Some(target);
    }

    /// Follow remap links to the final label.
    pub fn resolve(&self, id: LabelId) -> LabelId {
        let mut cur = id;
        let mut hops = 0;
        while let Some(next) = self.labels[cur.0].link {
            cur = next;
            hops += 1;
            if hops > self.labels.len() {
                break;
            }
        }
        cur
    }

    pub fn name(&self, id: LabelId) -> &str {
        &self.labels[id.0].name
    }

    pub fn iter(&self) -> impl Iterator<Item = &Label> {
        self.labels.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::Mnemonic::{DEX, INY, LDA, RTS, STA};

    #[test]
    fn pending_label_and_comment_attach_to_next_instruction() {
        let mut labels = Labels::new();
        let head = labels.new_generic(LabelKind::Code);

        let mut b = InstrBuilder::start_block("f");
        b.set_label(head);
        b.set_line_comment("loop head");
        b.add_instr_b(INY);
        b.add_instr_b(DEX);

        let block = b.finish();
        assert_eq!(block.instrs[0].label, Some(head));
        assert_eq!(block.instrs[0].line_comment.as_deref(), Some("loop head"));
        assert_eq!(block.instrs[1].label, None);
        assert_eq!(block.instrs[1].line_comment, None);
    }

    #[test]
    fn code_size_sums_instruction_sizes() {
        let mut b = InstrBuilder::start_block("f");
        b.add_instr_n(LDA, AddrMode::Imm, 5); // 2
        b.add_instr(STA, AddrMode::Abs, "dest", ParamExt::empty()); // 3
        b.add_comment_line("just a comment"); // 0
        b.add_instr_b(RTS); // 1
        let block = b.finish();
        assert_eq!(block.code_size, 6);
    }

    #[test]
    fn generic_labels_count_up_in_hex() {
        let mut labels = Labels::new();
        let a = labels.new_generic(LabelKind::Code);
        let b = labels.new_generic(LabelKind::Code);
        assert_eq!(labels.name(a), "L0000");
        assert_eq!(labels.name(b), "L0001");
        assert_eq!(labels.find("L0001"), Some(b));
    }

    #[test]
    fn linked_labels_resolve_to_their_target() {
        let mut labels = Labels::new();
        let a = labels.new_generic(LabelKind::Code);
        let b = labels.new_generic(LabelKind::Code);
        let c = labels.new_generic(LabelKind::Code);
        labels.link(a, b);
        labels.link(b, c);
        assert_eq!(labels.resolve(a), c);
        assert_eq!(labels.resolve(c), c);
    }

    #[test]
    fn stacked_labels_both_survive() {
        let mut labels = Labels::new();
        let entry = labels.new_label("main", LabelKind::Code);
        let head = labels.new_generic(LabelKind::Code);

        let mut b = InstrBuilder::start_block("main");
        b.set_label(entry);
        b.set_label(head); // function opens with a loop head
        b.add_instr_b(INY);
        let block = b.finish();

        assert_eq!(block.instrs[0].mne, Mnemonic::None);
        assert_eq!(block.instrs[0].label, Some(entry));
        assert_eq!(block.instrs[1].label, Some(head));
        assert_eq!(block.code_size, 1);
    }

    #[test]
    fn trailing_label_is_flushed_onto_a_carrier() {
        let mut labels = Labels::new();
        let end = labels.new_generic(LabelKind::Code);
        let mut b = InstrBuilder::start_block("f");
        b.add_instr_b(RTS);
        b.set_label(end);
        let block = b.finish();
        assert_eq!(block.instrs.len(), 2);
        assert_eq!(block.instrs[1].mne, Mnemonic::None);
        assert_eq!(block.instrs[1].label, Some(end));
        assert_eq!(block.code_size, 1);
    }
}
