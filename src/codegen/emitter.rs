//! The typed emit layer: every operation the tree-walking lowering uses
//! to produce instructions, plus register-use tracking that elides
//! redundant loads.

use crate::ast::ListId;
use crate::instr::{LabelId, LabelKind, ParamExt};
use crate::isa::{lookup_opcode, AddrMode, Mnemonic};
use crate::symbols::{ModifierFlags, SymbolKind, SymbolRecord, SymbolTable, SymbolType, VarHint};

use super::CodeGen;

/// Snapshot of a resolved symbol: everything the emitter needs without
/// holding a borrow on the tables.
#[derive(Clone, Debug)]
pub struct SymView {
    pub name: String,
    /// name as written in assembly (locals carry the `.` prefix)
    pub asm_name: String,
    pub kind: SymbolKind,
    pub ty: SymbolType,
    pub flags: ModifierFlags,
    pub location: Option<u16>,
    pub const_value: Option<i32>,
    pub num_elements: u16,
    pub base_size: u16,
    pub size: u16,
    pub hint: VarHint,
    pub is_stack: bool,
    pub is_local: bool,
    pub user_type: Option<String>,
    pub param_count: usize,
    pub inlined: bool,
    pub inline_body: Option<ListId>,
    pub params: Vec<ParamView>,
}

#[derive(Clone, Debug)]
pub struct ParamView {
    pub name: String,
    pub hint: VarHint,
    pub is_stack: bool,
}

impl SymView {
    pub fn from_record(rec: &SymbolRecord, globals: &SymbolTable) -> Self {
        let params = rec
            .ext
            .as_ref()
            .map(|ext| {
                ext.params
                    .iter()
                    .map(|p| ParamView {
                        name: p.name.clone(),
                        hint: p.hint,
                        is_stack: p.is_stack,
                    })
                    .collect()
            })
            .unwrap_or_default();
        Self {
            name: rec.name.clone(),
            asm_name: rec.var_name(),
            kind: rec.kind,
            ty: rec.ty,
            flags: rec.flags,
            location: rec.location,
            const_value: rec.const_value,
            num_elements: rec.num_elements,
            base_size: rec.base_var_size(),
            size: rec.calc_var_size(globals),
            hint: rec.hint,
            is_stack: rec.is_stack,
            is_local: rec.is_local,
            user_type: rec.user_type.clone(),
            param_count: rec.ext.as_ref().map(|e| e.param_count).unwrap_or(0),
            inlined: rec.ext.as_ref().map(|e| e.inlined).unwrap_or(false),
            inline_body: rec.ext.as_ref().and_then(|e| e.inline_body),
            params,
        }
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

    pub fn is_simple_const(&self) -> bool {
        self.kind == SymbolKind::Const
            && !self.is_array()
            && self.ty != SymbolType::Struct
    }

    pub fn is_zeropage(&self) -> bool {
        matches!(self.location, Some(loc) if loc < 256)
    }

    /// Direct addressing mode for this symbol's storage.
    pub fn addr_mode(&self) -> AddrMode {
        if self.is_zeropage() {
            AddrMode::Zp
        } else {
            AddrMode::Abs
        }
    }

    /// Indexed addressing mode (`,x`/`,y`) for this symbol's storage.
    pub fn indexed_mode(&self, use_y: bool) -> AddrMode {
        match (self.is_zeropage(), use_y) {
            (true, false) => AddrMode::Zpx,
            (true, true) => AddrMode::Zpy,
            (false, false) => AddrMode::Abx,
            (false, true) => AddrMode::Aby,
        }
    }
}

//---------------------------------------------------------------------
//  Register-use tracking

#[derive(Clone, Debug, Default, PartialEq)]
pub enum RegVal {
    #[default]
    Unknown,
    Const(i32),
    Var(String),
}

/// What each register was last loaded with. Cleared at labels, calls
/// and anything else that makes the contents uncertain.
#[derive(Clone, Debug, Default)]
pub struct RegTracker {
    a: RegVal,
    x: RegVal,
    y: RegVal,
}

impl RegTracker {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    fn slot(&mut self, reg: VarHint) -> Option<&mut RegVal> {
        match reg {
            VarHint::A => Some(&mut self.a),
            VarHint::X => Some(&mut self.x),
            VarHint::Y => Some(&mut self.y),
            VarHint::None => None,
        }
    }

    pub fn set_const(&mut self, reg: VarHint, value: i32) {
        if let Some(slot) = self.slot(reg) {
            *slot = RegVal::Const(value);
        }
    }

    pub fn tag_var(&mut self, reg: VarHint, name: &str) {
        if let Some(slot) = self.slot(reg) {
            *slot = RegVal::Var(name.to_string());
        }
    }

    pub fn clobber(&mut self, reg: VarHint) {
        if let Some(slot) = self.slot(reg) {
            *slot = RegVal::Unknown;
        }
    }

    pub fn holds(&self, reg: VarHint, val: &RegVal) -> bool {
        match reg {
            VarHint::A => self.a == *val,
            VarHint::X => self.x == *val,
            VarHint::Y => self.y == *val,
            VarHint::None => false,
        }
    }

    /// A store rewrote this variable: stale tags must go.
    pub fn clear_var(&mut self, name: &str) {
        let target = RegVal::Var(name.to_string());
        for slot in [&mut self.a, &mut self.x, &mut self.y] {
            if *slot == target {
                *slot = RegVal::Unknown;
            }
        }
    }

    /// `STA name`: index registers tagged with the old value go stale,
    /// while A now mirrors the variable (an existing constant tag stays,
    /// it is still exact).
    pub fn store_a_to(&mut self, name: &str) {
        let target = RegVal::Var(name.to_string());
        if self.x == target {
            self.x = RegVal::Unknown;
        }
        if self.y == target {
            self.y = RegVal::Unknown;
        }
        if self.a == RegVal::Unknown {
            self.a = target;
        }
    }
}

//---------------------------------------------------------------------
//  Emit operations

impl<'a> CodeGen<'a> {
    /// Replace a mode that has no encoding for this mnemonic (the ZPY
    /// hole in the instruction set falls back to ABY).
    pub(crate) fn fixed_mode(&self, mne: Mnemonic, mode: AddrMode) -> AddrMode {
        if lookup_opcode(mne, mode).is_none() && mode == AddrMode::Zpy {
            AddrMode::Aby
        } else {
            mode
        }
    }

    pub(crate) fn new_code_label(&mut self) -> LabelId {
        self.labels.new_generic(LabelKind::Code)
    }

    /// Publish a label for the next instruction; register state is
    /// unknown at any join point.
    pub(crate) fn place_label(&mut self, label: LabelId) {
        self.emit.set_label(label);
        self.regs.reset();
    }

    //-----------------------------------------------------------------
    //  Loads

    pub(crate) fn icg_load_const(&mut self, value: i32, size: u16) {
        if size == 2 {
            let lo = value & 0xFF;
            let hi = (value >> 8) & 0xFF;
            if !self.regs.holds(VarHint::A, &RegVal::Const(lo)) {
                self.emit.add_instr_n(Mnemonic::LDA, AddrMode::Imm, lo);
                self.regs.set_const(VarHint::A, lo);
            }
            if !self.regs.holds(VarHint::X, &RegVal::Const(hi)) {
                self.emit.add_instr_n(Mnemonic::LDX, AddrMode::Imm, hi);
                self.regs.set_const(VarHint::X, hi);
            }
        } else {
            let value = value & 0xFF;
            if self.regs.holds(VarHint::A, &RegVal::Const(value)) {
                return;
            }
            self.emit.add_instr_n(Mnemonic::LDA, AddrMode::Imm, value);
            self.regs.set_const(VarHint::A, value);
        }
    }

    pub(crate) fn icg_load_reg_const(&mut self, reg: VarHint, value: i32) {
        let mne = match reg {
            VarHint::X => Mnemonic::LDX,
            VarHint::Y => Mnemonic::LDY,
            _ => Mnemonic::LDA,
        };
        if self.regs.holds(reg, &RegVal::Const(value)) {
            return;
        }
        self.emit.add_instr_n(mne, AddrMode::Imm, value);
        self.regs.set_const(reg, value);
    }

    pub(crate) fn icg_load_var(&mut self, view: &SymView) {
        self.icg_load_var_sized(view, 1)
    }

    pub(crate) fn icg_load_var_sized(&mut self, view: &SymView, dest_size: u16) {
        if view.is_simple_const() {
            if let Some(value) = view.const_value {
                self.icg_load_const(value, dest_size);
                return;
            }
        }
        if view.is_stack {
            self.icg_load_from_stack(view);
            return;
        }
        if dest_size == 2 {
            self.emit
                .add_instr(Mnemonic::LDA, view.addr_mode(), &view.asm_name, ParamExt::empty());
            if view.base_size == 2 {
                self.emit.add_instr2(
                    Mnemonic::LDX,
                    view.addr_mode(),
                    &view.asm_name,
                    "1",
                    ParamExt::ADD,
                );
            } else {
                self.emit.add_instr_n(Mnemonic::LDX, AddrMode::Imm, 0);
            }
            self.regs.tag_var(VarHint::A, &view.name);
            self.regs.clobber(VarHint::X);
            return;
        }
        if self.regs.holds(VarHint::A, &RegVal::Var(view.name.clone())) {
            return;
        }
        self.emit
            .add_instr(Mnemonic::LDA, view.addr_mode(), &view.asm_name, ParamExt::empty());
        self.regs.tag_var(VarHint::A, &view.name);
    }

    /// Stack parameter access: `TSX` then index into page one.
    pub(crate) fn icg_load_from_stack(&mut self, view: &SymView) {
        self.emit.add_instr_b(Mnemonic::TSX);
        self.regs.clobber(VarHint::X);
        self.emit.add_instr2(
            Mnemonic::LDA,
            AddrMode::Abx,
            &view.asm_name,
            "$100",
            ParamExt::ADD,
        );
        self.regs.tag_var(VarHint::A, &view.name);
    }

    /// Load the array index variable into X (or Y for pointer bases).
    /// Word-stride arrays double the index through A first.
    pub(crate) fn icg_load_index_var(&mut self, idx: &SymView, stride: u16, use_y: bool) {
        let reg = if use_y { VarHint::Y } else { VarHint::X };
        if stride == 2 {
            self.icg_load_var(idx);
            self.emit.add_instr_b(Mnemonic::ASL);
            self.regs.clobber(VarHint::A);
            self.icg_move_acc_to_index(use_y);
            return;
        }
        if self.regs.holds(reg, &RegVal::Var(idx.name.clone())) {
            return;
        }
        let mne = if use_y { Mnemonic::LDY } else { Mnemonic::LDX };
        let mode = self.fixed_mode(mne, idx.addr_mode());
        self.emit.add_instr(mne, mode, &idx.asm_name, ParamExt::empty());
        self.regs.tag_var(reg, &idx.name);
    }

    pub(crate) fn icg_load_indexed(&mut self, view: &SymView, use_y: bool) {
        if view.is_pointer() {
            self.icg_load_indirect(view);
            return;
        }
        let mode = self.fixed_mode(Mnemonic::LDA, view.indexed_mode(use_y));
        self.emit
            .add_instr(Mnemonic::LDA, mode, &view.asm_name, ParamExt::empty());
        self.regs.clobber(VarHint::A);
    }

    /// `LDA (ptr),y`; the pointer itself must sit in zero page.
    pub(crate) fn icg_load_indirect(&mut self, view: &SymView) {
        if !view.is_zeropage() {
            let name = view.name.clone();
            self.diag
                .error(None::<u32>, format!("Pointer {name} must live in zero page"));
        }
        self.emit
            .add_instr(Mnemonic::LDA, AddrMode::Iy, &view.asm_name, ParamExt::empty());
        self.regs.clobber(VarHint::A);
    }

    pub(crate) fn icg_load_indexed_with_offset(&mut self, view: &SymView, ofs: i32) {
        let mode = self.fixed_mode(Mnemonic::LDA, view.indexed_mode(false));
        self.emit.add_instr2(
            Mnemonic::LDA,
            mode,
            &view.asm_name,
            &ofs.to_string(),
            ParamExt::ADD,
        );
        self.regs.clobber(VarHint::A);
    }

    /// Constant-indexed array element load.
    pub(crate) fn icg_load_from_array(&mut self, view: &SymView, index: i32, dest_type: SymbolType) {
        let base = index * i32::from(view.base_size);
        let word = dest_type.dest_size() == 2 && view.base_size == 2;
        if base == 0 {
            self.emit
                .add_instr(Mnemonic::LDA, view.addr_mode(), &view.asm_name, ParamExt::empty());
        } else {
            self.emit.add_instr2(
                Mnemonic::LDA,
                view.addr_mode(),
                &view.asm_name,
                &base.to_string(),
                ParamExt::ADD,
            );
        }
        if word {
            self.emit.add_instr2(
                Mnemonic::LDX,
                view.addr_mode(),
                &view.asm_name,
                &(base + 1).to_string(),
                ParamExt::ADD,
            );
            self.regs.clobber(VarHint::X);
        }
        self.regs.clobber(VarHint::A);
    }

    /// 16-bit immediate load of a symbol's address (A=lo, X=hi).
    pub(crate) fn icg_load_addr(&mut self, view: &SymView) {
        self.emit
            .add_instr(Mnemonic::LDA, AddrMode::Imm, &view.asm_name, ParamExt::LO);
        self.emit
            .add_instr(Mnemonic::LDX, AddrMode::Imm, &view.asm_name, ParamExt::HI);
        self.regs.clobber(VarHint::A);
        self.regs.clobber(VarHint::X);
    }

    pub(crate) fn icg_load_addr_plus_index(&mut self, view: &SymView, ofs: i32) {
        let ofs_str = ofs.to_string();
        self.emit.add_instr2(
            Mnemonic::LDA,
            AddrMode::Imm,
            &view.asm_name,
            &ofs_str,
            ParamExt::LO | ParamExt::ADD,
        );
        self.emit.add_instr2(
            Mnemonic::LDX,
            AddrMode::Imm,
            &view.asm_name,
            &ofs_str,
            ParamExt::HI | ParamExt::ADD,
        );
        self.regs.clobber(VarHint::A);
        self.regs.clobber(VarHint::X);
    }

    /// Direct load from a computed absolute address (property refs).
    pub(crate) fn icg_load_from_addr(&mut self, addr: u16, size: u16) {
        let mode = if addr < 256 { AddrMode::Zp } else { AddrMode::Abs };
        self.emit.add_instr_n(Mnemonic::LDA, mode, i32::from(addr));
        if size == 2 {
            self.emit.add_instr_n(Mnemonic::LDX, mode, i32::from(addr) + 1);
            self.regs.clobber(VarHint::X);
        }
        self.regs.clobber(VarHint::A);
    }

    //-----------------------------------------------------------------
    //  Stores

    pub(crate) fn icg_store_var(&mut self, view: &SymView, size: u16) {
        if view.is_stack {
            self.emit.add_instr_b(Mnemonic::TSX);
            self.regs.clobber(VarHint::X);
            self.emit.add_instr2(
                Mnemonic::STA,
                AddrMode::Abx,
                &view.asm_name,
                "$100",
                ParamExt::ADD,
            );
            self.regs.clear_var(&view.name);
            return;
        }
        self.emit
            .add_instr(Mnemonic::STA, view.addr_mode(), &view.asm_name, ParamExt::empty());
        if size == 2 && view.base_size == 2 {
            self.emit.add_instr2(
                Mnemonic::STX,
                view.addr_mode(),
                &view.asm_name,
                "1",
                ParamExt::ADD,
            );
        }
        self.regs.store_a_to(&view.name);
    }

    pub(crate) fn icg_store_var_offset(&mut self, view: &SymView, ofs: i32, size: u16) {
        if ofs == 0 {
            self.emit
                .add_instr(Mnemonic::STA, view.addr_mode(), &view.asm_name, ParamExt::empty());
        } else {
            self.emit.add_instr2(
                Mnemonic::STA,
                view.addr_mode(),
                &view.asm_name,
                &ofs.to_string(),
                ParamExt::ADD,
            );
        }
        if size == 2 {
            self.emit.add_instr2(
                Mnemonic::STX,
                view.addr_mode(),
                &view.asm_name,
                &(ofs + 1).to_string(),
                ParamExt::ADD,
            );
        }
        self.regs.clear_var(&view.name);
    }

    pub(crate) fn icg_store_indexed(&mut self, view: &SymView) {
        if view.is_pointer() {
            self.emit
                .add_instr(Mnemonic::STA, AddrMode::Iy, &view.asm_name, ParamExt::empty());
        } else {
            let mode = self.fixed_mode(Mnemonic::STA, view.indexed_mode(false));
            self.emit
                .add_instr(Mnemonic::STA, mode, &view.asm_name, ParamExt::empty());
        }
        self.regs.clear_var(&view.name);
    }

    pub(crate) fn icg_store_to_addr(&mut self, addr: u16, size: u16) {
        let mode = if addr < 256 { AddrMode::Zp } else { AddrMode::Abs };
        self.emit.add_instr_n(Mnemonic::STA, mode, i32::from(addr));
        if size == 2 {
            self.emit.add_instr_n(Mnemonic::STX, mode, i32::from(addr) + 1);
        }
    }

    //-----------------------------------------------------------------
    //  ALU ops

    pub(crate) fn icg_preop(&mut self, mne: Mnemonic) {
        if mne == Mnemonic::None {
            return;
        }
        self.emit.add_instr_b(mne);
        match mne {
            Mnemonic::INX | Mnemonic::DEX => self.regs.clobber(VarHint::X),
            Mnemonic::INY | Mnemonic::DEY => self.regs.clobber(VarHint::Y),
            Mnemonic::TXA => self.regs.clobber(VarHint::A),
            _ => {}
        }
    }

    fn op_clobbers_a(mne: Mnemonic) -> bool {
        !matches!(mne, Mnemonic::CMP | Mnemonic::CPX | Mnemonic::CPY | Mnemonic::BIT)
    }

    pub(crate) fn icg_op_with_const(&mut self, mne: Mnemonic, value: i32) {
        self.emit.add_instr_n(mne, AddrMode::Imm, value & 0xFF);
        if Self::op_clobbers_a(mne) {
            self.regs.clobber(VarHint::A);
        }
    }

    pub(crate) fn icg_op_with_var(&mut self, mne: Mnemonic, view: &SymView) {
        if view.is_simple_const() {
            if let Some(value) = view.const_value {
                self.icg_op_with_const(mne, value);
                return;
            }
        }
        if view.is_stack {
            self.emit.add_instr_b(Mnemonic::TSX);
            self.regs.clobber(VarHint::X);
            self.emit
                .add_instr2(mne, AddrMode::Abx, &view.asm_name, "$100", ParamExt::ADD);
        } else {
            let mode = self.fixed_mode(mne, view.addr_mode());
            self.emit.add_instr(mne, mode, &view.asm_name, ParamExt::empty());
        }
        if Self::op_clobbers_a(mne) {
            self.regs.clobber(VarHint::A);
        }
    }

    pub(crate) fn icg_op_with_addr(&mut self, mne: Mnemonic, addr: u16) {
        let mode = if addr < 256 { AddrMode::Zp } else { AddrMode::Abs };
        self.emit.add_instr_n(mne, mode, i32::from(addr));
        if Self::op_clobbers_a(mne) {
            self.regs.clobber(VarHint::A);
        }
    }

    /// Binary op against the value pushed before evaluating the right
    /// side: pop the stack slot, then op against page one.
    pub(crate) fn icg_op_with_stack(&mut self, mne: Mnemonic) {
        self.emit.add_instr_b(Mnemonic::TSX);
        self.emit.add_instr_b(Mnemonic::INX);
        self.emit.add_instr_b(Mnemonic::TXS);
        self.regs.clobber(VarHint::X);
        self.emit
            .add_instr(mne, AddrMode::Abx, "$100", ParamExt::empty());
        if Self::op_clobbers_a(mne) {
            self.regs.clobber(VarHint::A);
        }
    }

    /// Read-modify-write (`INC`/`DEC`/shift memory forms) on a symbol.
    pub(crate) fn icg_op_rmw(&mut self, mne: Mnemonic, view: &SymView) {
        let mode = self.fixed_mode(mne, view.addr_mode());
        self.emit.add_instr(mne, mode, &view.asm_name, ParamExt::empty());
        self.regs.clear_var(&view.name);
    }

    pub(crate) fn icg_op_rmw_indexed(&mut self, mne: Mnemonic, view: &SymView) {
        let mode = self.fixed_mode(mne, view.indexed_mode(false));
        self.emit.add_instr(mne, mode, &view.asm_name, ParamExt::empty());
        self.regs.clear_var(&view.name);
    }

    pub(crate) fn icg_rmw_addr(&mut self, mne: Mnemonic, addr: u16) {
        let mode = if addr < 256 { AddrMode::Zp } else { AddrMode::Abs };
        self.emit.add_instr_n(mne, mode, i32::from(addr));
        self.regs.reset();
    }

    //-----------------------------------------------------------------
    //  A-register arithmetic helpers

    /// Logical not: A==0 becomes 1, anything else 0.
    pub(crate) fn icg_not(&mut self) {
        self.emit.add_instr_n(Mnemonic::CMP, AddrMode::Imm, 1);
        self.emit.add_instr_n(Mnemonic::LDA, AddrMode::Imm, 0);
        self.emit.add_instr_n(Mnemonic::ADC, AddrMode::Imm, 0);
        self.emit.add_instr_n(Mnemonic::EOR, AddrMode::Imm, 1);
        self.regs.clobber(VarHint::A);
    }

    /// Two's-complement negate of A.
    pub(crate) fn icg_negate(&mut self) {
        self.emit.add_instr_n(Mnemonic::EOR, AddrMode::Imm, 0xFF);
        self.emit.add_instr_b(Mnemonic::CLC);
        self.emit.add_instr_n(Mnemonic::ADC, AddrMode::Imm, 1);
        self.regs.clobber(VarHint::A);
    }

    /// Bitwise invert of A.
    pub(crate) fn icg_invert(&mut self) {
        self.emit.add_instr_n(Mnemonic::EOR, AddrMode::Imm, 0xFF);
        self.regs.clobber(VarHint::A);
    }

    pub(crate) fn icg_shift_acc(&mut self, mne: Mnemonic, count: i32) {
        for _ in 0..count {
            self.emit.add_instr_b(mne);
        }
        self.regs.clobber(VarHint::A);
    }

    pub(crate) fn icg_shift_var(&mut self, mne: Mnemonic, view: &SymView, count: i32) {
        for _ in 0..count {
            self.icg_op_rmw(mne, view);
        }
    }

    /// Add an 8-bit variable into the 16-bit value in A/X.
    pub(crate) fn icg_add_to_int(&mut self, view: &SymView) {
        self.emit.add_instr_b(Mnemonic::CLC);
        self.icg_op_with_var(Mnemonic::ADC, view);
        // carry ripples into the high byte
        self.emit.add_instr_n(Mnemonic::BCC, AddrMode::Rel, 3);
        self.emit.add_instr_b(Mnemonic::INX);
        self.regs.clobber(VarHint::A);
        self.regs.clobber(VarHint::X);
    }

    /// A holds an 8-bit index; produce `index + &sym` in A/X.
    pub(crate) fn icg_add_addr(&mut self, view: &SymView) {
        self.emit.add_instr_b(Mnemonic::CLC);
        self.emit
            .add_instr(Mnemonic::ADC, AddrMode::Imm, &view.asm_name, ParamExt::LO);
        self.emit.add_instr_b(Mnemonic::TAY);
        self.emit
            .add_instr(Mnemonic::LDA, AddrMode::Imm, &view.asm_name, ParamExt::HI);
        self.emit.add_instr_n(Mnemonic::ADC, AddrMode::Imm, 0);
        self.emit.add_instr_b(Mnemonic::TAX);
        self.emit.add_instr_b(Mnemonic::TYA);
        self.regs.clobber(VarHint::A);
        self.regs.clobber(VarHint::X);
        self.regs.clobber(VarHint::Y);
    }

    //-----------------------------------------------------------------
    //  Compares

    pub(crate) fn icg_compare_const(&mut self, value: i32) {
        self.emit
            .add_instr_n(Mnemonic::CMP, AddrMode::Imm, value & 0xFF);
    }

    pub(crate) fn icg_compare_const_name(&mut self, name: &str) {
        self.emit
            .add_instr(Mnemonic::CMP, AddrMode::Imm, name, ParamExt::empty());
    }

    pub(crate) fn icg_compare_var(&mut self, view: &SymView) {
        self.icg_op_with_var(Mnemonic::CMP, view);
    }

    //-----------------------------------------------------------------
    //  Flow

    pub(crate) fn icg_branch(&mut self, mne: Mnemonic, label: LabelId) {
        self.labels.mark_referenced(label);
        let name = self.labels.name(label).to_string();
        self.emit.add_instr(mne, AddrMode::Rel, &name, ParamExt::empty());
    }

    pub(crate) fn icg_jump(&mut self, label: LabelId, comment: &str) {
        self.labels.mark_referenced(label);
        let name = self.labels.name(label).to_string();
        self.emit.set_line_comment(comment);
        self.emit.add_instr(Mnemonic::JMP, AddrMode::Abs, &name, ParamExt::empty());
    }

    pub(crate) fn icg_call(&mut self, name: &str) {
        self.emit
            .add_instr(Mnemonic::JSR, AddrMode::Abs, name, ParamExt::empty());
        self.regs.reset();
    }

    pub(crate) fn icg_return(&mut self) {
        self.emit.add_instr_b(Mnemonic::RTS);
    }

    //-----------------------------------------------------------------
    //  Stack and register moves

    pub(crate) fn icg_push_acc(&mut self) {
        self.emit.add_instr_b(Mnemonic::PHA);
    }

    pub(crate) fn icg_pull_acc(&mut self) {
        self.emit.add_instr_b(Mnemonic::PLA);
        self.regs.clobber(VarHint::A);
    }

    pub(crate) fn icg_move_acc_to_index(&mut self, use_y: bool) {
        if use_y {
            self.emit.add_instr_b(Mnemonic::TAY);
            self.regs.clobber(VarHint::Y);
        } else {
            self.emit.add_instr_b(Mnemonic::TAX);
            self.regs.clobber(VarHint::X);
        }
    }

    pub(crate) fn icg_move_index_to_acc(&mut self, from: VarHint) {
        match from {
            VarHint::X => self.emit.add_instr_b(Mnemonic::TXA),
            VarHint::Y => self.emit.add_instr_b(Mnemonic::TYA),
            _ => return,
        };
        self.regs.clobber(VarHint::A);
    }

    /// Drop `n` pushed parameter bytes without touching A.
    pub(crate) fn icg_adjust_stack(&mut self, n: usize) {
        if n == 0 {
            return;
        }
        self.emit.add_instr_b(Mnemonic::TSX);
        for _ in 0..n {
            self.emit.add_instr_b(Mnemonic::INX);
        }
        self.emit.add_instr_b(Mnemonic::TXS);
        self.regs.clobber(VarHint::X);
    }

    /// Raw data byte in the instruction stream.
    pub(crate) fn icg_asm_data(&mut self, value: i32) {
        self.emit
            .add_instr_n(Mnemonic::Data, AddrMode::Imp, value & 0xFF);
        self.regs.reset();
    }
}
