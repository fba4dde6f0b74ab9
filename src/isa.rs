//! 6502 instruction-set tables: mnemonics, addressing modes, and the
//! opcode/cycle table the writers and size queries run on.

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Every mnemonic the compiler can emit. `None` is the zero element used
/// by comment-only instruction slots; `Data` marks a raw data byte in the
/// middle of code (inline-asm `.byte`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[allow(clippy::upper_case_acronyms)]
pub enum Mnemonic {
    None,
    ADC,
    AND,
    ASL,
    BCC,
    BCS,
    BEQ,
    BIT,
    BMI,
    BNE,
    BPL,
    BRK,
    BVC,
    BVS,
    CLC,
    CLD,
    CLI,
    CLV,
    CMP,
    CPX,
    CPY,
    DEC,
    DEX,
    DEY,
    EOR,
    INC,
    INX,
    INY,
    JMP,
    JSR,
    LDA,
    LDX,
    LDY,
    LSR,
    NOP,
    ORA,
    PHA,
    PHP,
    PLA,
    PLP,
    ROL,
    ROR,
    RTI,
    RTS,
    SBC,
    SEC,
    SED,
    SEI,
    STA,
    STX,
    STY,
    TAX,
    TAY,
    TSX,
    TXA,
    TXS,
    TYA,

    // undocumented
    DCP,

    /// raw data byte inside a code block
    Data,
}

impl Mnemonic {
    pub fn name(self) -> &'static str {
        match self {
            Mnemonic::None => "",
            Mnemonic::ADC => "ADC",
            Mnemonic::AND => "AND",
            Mnemonic::ASL => "ASL",
            Mnemonic::BCC => "BCC",
            Mnemonic::BCS => "BCS",
            Mnemonic::BEQ => "BEQ",
            Mnemonic::BIT => "BIT",
            Mnemonic::BMI => "BMI",
            Mnemonic::BNE => "BNE",
            Mnemonic::BPL => "BPL",
            Mnemonic::BRK => "BRK",
            Mnemonic::BVC => "BVC",
            Mnemonic::BVS => "BVS",
            Mnemonic::CLC => "CLC",
            Mnemonic::CLD => "CLD",
            Mnemonic::CLI => "CLI",
            Mnemonic::CLV => "CLV",
            Mnemonic::CMP => "CMP",
            Mnemonic::CPX => "CPX",
            Mnemonic::CPY => "CPY",
            Mnemonic::DEC => "DEC",
            Mnemonic::DEX => "DEX",
            Mnemonic::DEY => "DEY",
            Mnemonic::EOR => "EOR",
            Mnemonic::INC => "INC",
            Mnemonic::INX => "INX",
            Mnemonic::INY => "INY",
            Mnemonic::JMP => "JMP",
            Mnemonic::JSR => "JSR",
            Mnemonic::LDA => "LDA",
            Mnemonic::LDX => "LDX",
            Mnemonic::LDY => "LDY",
            Mnemonic::LSR => "LSR",
            Mnemonic::NOP => "NOP",
            Mnemonic::ORA => "ORA",
            Mnemonic::PHA => "PHA",
            Mnemonic::PHP => "PHP",
            Mnemonic::PLA => "PLA",
            Mnemonic::PLP => "PLP",
            Mnemonic::ROL => "ROL",
            Mnemonic::ROR => "ROR",
            Mnemonic::RTI => "RTI",
            Mnemonic::RTS => "RTS",
            Mnemonic::SBC => "SBC",
            Mnemonic::SEC => "SEC",
            Mnemonic::SED => "SED",
            Mnemonic::SEI => "SEI",
            Mnemonic::STA => "STA",
            Mnemonic::STX => "STX",
            Mnemonic::STY => "STY",
            Mnemonic::TAX => "TAX",
            Mnemonic::TAY => "TAY",
            Mnemonic::TSX => "TSX",
            Mnemonic::TXA => "TXA",
            Mnemonic::TXS => "TXS",
            Mnemonic::TYA => "TYA",
            Mnemonic::DCP => "DCP",
            Mnemonic::Data => ".byte",
        }
    }

    /// True for single-byte ops that never take a parameter.
    pub fn no_params(self) -> bool {
        matches!(
            self,
            Mnemonic::BRK
                | Mnemonic::CLC
                | Mnemonic::CLD
                | Mnemonic::CLI
                | Mnemonic::CLV
                | Mnemonic::DEX
                | Mnemonic::DEY
                | Mnemonic::INX
                | Mnemonic::INY
                | Mnemonic::NOP
                | Mnemonic::PHA
                | Mnemonic::PHP
                | Mnemonic::PLA
                | Mnemonic::PLP
                | Mnemonic::RTI
                | Mnemonic::RTS
                | Mnemonic::SEC
                | Mnemonic::SED
                | Mnemonic::SEI
                | Mnemonic::TAX
                | Mnemonic::TAY
                | Mnemonic::TSX
                | Mnemonic::TXA
                | Mnemonic::TXS
                | Mnemonic::TYA
                // ASL/LSR take a parameter only in their memory forms; the
                // asm sub-grammar treats the bare spelling as accumulator.
                | Mnemonic::ASL
                | Mnemonic::LSR
        )
    }

    /// Case-insensitive lookup used by the inline-asm sub-grammar.
    pub fn from_name(name: &str) -> Option<Mnemonic> {
        if name.len() < 3 || name.len() > 5 {
            return None;
        }
        let upper = name.to_ascii_uppercase();
        ALL_MNEMONICS
            .iter()
            .copied()
            .find(|m| m.name() == upper)
    }

    pub fn is_branch(self) -> bool {
        matches!(
            self,
            Mnemonic::BEQ
                | Mnemonic::BNE
                | Mnemonic::BCC
                | Mnemonic::BCS
                | Mnemonic::BPL
                | Mnemonic::BMI
                | Mnemonic::BVC
                | Mnemonic::BVS
        )
    }
}

const ALL_MNEMONICS: &[Mnemonic] = &[
    Mnemonic::ADC,
    Mnemonic::AND,
    Mnemonic::ASL,
    Mnemonic::BCC,
    Mnemonic::BCS,
    Mnemonic::BEQ,
    Mnemonic::BIT,
    Mnemonic::BMI,
    Mnemonic::BNE,
    Mnemonic::BPL,
    Mnemonic::BRK,
    Mnemonic::BVC,
    Mnemonic::BVS,
    Mnemonic::CLC,
    Mnemonic::CLD,
    Mnemonic::CLI,
    Mnemonic::CLV,
    Mnemonic::CMP,
    Mnemonic::CPX,
    Mnemonic::CPY,
    Mnemonic::DEC,
    Mnemonic::DEX,
    Mnemonic::DEY,
    Mnemonic::EOR,
    Mnemonic::INC,
    Mnemonic::INX,
    Mnemonic::INY,
    Mnemonic::JMP,
    Mnemonic::JSR,
    Mnemonic::LDA,
    Mnemonic::LDX,
    Mnemonic::LDY,
    Mnemonic::LSR,
    Mnemonic::NOP,
    Mnemonic::ORA,
    Mnemonic::PHA,
    Mnemonic::PHP,
    Mnemonic::PLA,
    Mnemonic::PLP,
    Mnemonic::ROL,
    Mnemonic::ROR,
    Mnemonic::RTI,
    Mnemonic::RTS,
    Mnemonic::SBC,
    Mnemonic::SEC,
    Mnemonic::SED,
    Mnemonic::SEI,
    Mnemonic::STA,
    Mnemonic::STX,
    Mnemonic::STY,
    Mnemonic::TAX,
    Mnemonic::TAY,
    Mnemonic::TSX,
    Mnemonic::TXA,
    Mnemonic::TXS,
    Mnemonic::TYA,
    Mnemonic::DCP,
];

/// Addressing modes. `Imp` covers implied/none; every variant here is
/// encodable; the parser's "don't know yet" states live in
/// [`crate::ast::AsmAddrMode`] and are resolved before instructions are
/// built.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, TryFromPrimitive, IntoPrimitive,
)]
#[repr(u8)]
pub enum AddrMode {
    Imp = 0,
    Acc = 1,
    Imm = 2,
    Zp = 3,
    Zpx = 4,
    Zpy = 5,
    Abs = 6,
    Abx = 7,
    Aby = 8,
    Ix = 9,
    Iy = 10,
    Ind = 11,
    Rel = 12,
}

impl AddrMode {
    pub fn name(self) -> &'static str {
        match self {
            AddrMode::Imp => "",
            AddrMode::Acc => "A",
            AddrMode::Imm => "IMM",
            AddrMode::Zp => "ZP",
            AddrMode::Zpx => "ZPX",
            AddrMode::Zpy => "ZPY",
            AddrMode::Abs => "ABS",
            AddrMode::Abx => "ABX",
            AddrMode::Aby => "ABY",
            AddrMode::Ix => "IX",
            AddrMode::Iy => "IY",
            AddrMode::Ind => "IND",
            AddrMode::Rel => "REL",
        }
    }

    /// Instruction size in bytes (opcode + operand bytes).
    pub fn instr_size(self) -> u16 {
        match self {
            AddrMode::Imp | AddrMode::Acc => 1,
            AddrMode::Imm
            | AddrMode::Zp
            | AddrMode::Zpx
            | AddrMode::Zpy
            | AddrMode::Ix
            | AddrMode::Iy
            | AddrMode::Rel => 2,
            AddrMode::Abs | AddrMode::Abx | AddrMode::Aby | AddrMode::Ind => 3,
        }
    }

    /// DASM operand template; `{}` is the parameter text.
    pub fn print_format(self) -> &'static str {
        match self {
            AddrMode::Imp | AddrMode::Acc => "",
            AddrMode::Imm => "#{}",
            AddrMode::Zp | AddrMode::Abs | AddrMode::Rel => "{}",
            AddrMode::Zpx | AddrMode::Abx => "{},x",
            AddrMode::Zpy | AddrMode::Aby => "{},y",
            AddrMode::Ix => "({},x)",
            AddrMode::Iy => "({}),y",
            AddrMode::Ind => "({})",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OpcodeEntry {
    pub mne: Mnemonic,
    pub mode: AddrMode,
    pub opcode: u8,
    pub cycles: u8,
}

const fn op(mne: Mnemonic, mode: AddrMode, opcode: u8, cycles: u8) -> OpcodeEntry {
    OpcodeEntry {
        mne,
        mode,
        opcode,
        cycles,
    }
}

use AddrMode as M;
#[rustfmt::skip]
use Mnemonic::{
    ADC, AND, ASL, BCC, BCS, BEQ, BIT, BMI, BNE, BPL, BRK, BVC, BVS, CLC, CLD, CLI, CLV, CMP,
    CPX, CPY, DCP, DEC, DEX, DEY, EOR, INC, INX, INY, JMP, JSR, LDA, LDX, LDY, LSR, NOP, ORA,
    PHA, PHP, PLA, PLP, ROL, ROR, RTI, RTS, SBC, SEC, SED, SEI, STA, STX, STY, TAX, TAY, TSX,
    TXA, TXS, TYA,
};

#[rustfmt::skip]
pub const OPCODE_TABLE: &[OpcodeEntry] = &[
    op(ADC, M::Imm, 0x69, 2), op(ADC, M::Zp, 0x65, 3), op(ADC, M::Zpx, 0x75, 4),
    op(ADC, M::Abs, 0x6D, 4), op(ADC, M::Abx, 0x7D, 4), op(ADC, M::Aby, 0x79, 4),
    op(ADC, M::Ix, 0x61, 6), op(ADC, M::Iy, 0x71, 5),
    //
    op(AND, M::Imm, 0x29, 2), op(AND, M::Zp, 0x25, 3), op(AND, M::Zpx, 0x35, 4),
    op(AND, M::Abs, 0x2D, 4), op(AND, M::Abx, 0x3D, 4), op(AND, M::Aby, 0x39, 4),
    op(AND, M::Ix, 0x21, 6), op(AND, M::Iy, 0x31, 5),
    //
    op(ASL, M::Imp, 0x0A, 2), op(ASL, M::Acc, 0x0A, 2), op(ASL, M::Zp, 0x06, 5),
    op(ASL, M::Zpx, 0x16, 6), op(ASL, M::Abs, 0x0E, 6), op(ASL, M::Abx, 0x1E, 7),
    //
    op(BIT, M::Zp, 0x24, 3), op(BIT, M::Abs, 0x2C, 4),
    //
    op(BPL, M::Rel, 0x10, 2), op(BMI, M::Rel, 0x30, 2), op(BVC, M::Rel, 0x50, 2),
    op(BVS, M::Rel, 0x70, 2), op(BCC, M::Rel, 0x90, 2), op(BCS, M::Rel, 0xB0, 2),
    op(BNE, M::Rel, 0xD0, 2), op(BEQ, M::Rel, 0xF0, 2),
    //
    op(BRK, M::Imp, 0x00, 7),
    //
    op(CLC, M::Imp, 0x18, 2), op(CLD, M::Imp, 0xD8, 2), op(CLI, M::Imp, 0x58, 2),
    op(CLV, M::Imp, 0xB8, 2),
    //
    op(CMP, M::Imm, 0xC9, 2), op(CMP, M::Zp, 0xC5, 3), op(CMP, M::Zpx, 0xD5, 4),
    op(CMP, M::Abs, 0xCD, 4), op(CMP, M::Abx, 0xDD, 4), op(CMP, M::Aby, 0xD9, 4),
    op(CMP, M::Ix, 0xC1, 6), op(CMP, M::Iy, 0xD1, 5),
    //
    op(CPX, M::Imm, 0xE0, 2), op(CPX, M::Zp, 0xE4, 3), op(CPX, M::Abs, 0xEC, 4),
    op(CPY, M::Imm, 0xC0, 2), op(CPY, M::Zp, 0xC4, 3), op(CPY, M::Abs, 0xCC, 4),
    //
    op(DCP, M::Zp, 0xC7, 5), op(DCP, M::Zpx, 0xD7, 6), op(DCP, M::Abs, 0xCF, 6),
    op(DCP, M::Abx, 0xDF, 7), op(DCP, M::Aby, 0xDB, 7), op(DCP, M::Ix, 0xC3, 8),
    op(DCP, M::Iy, 0xD3, 8),
    //
    op(DEC, M::Zp, 0xC6, 5), op(DEC, M::Zpx, 0xD6, 6), op(DEC, M::Abs, 0xCE, 6),
    op(DEC, M::Abx, 0xDE, 7),
    //
    op(DEX, M::Imp, 0xCA, 2), op(DEY, M::Imp, 0x88, 2),
    //
    op(EOR, M::Imm, 0x49, 2), op(EOR, M::Zp, 0x45, 3), op(EOR, M::Zpx, 0x55, 4),
    op(EOR, M::Abs, 0x4D, 4), op(EOR, M::Abx, 0x5D, 4), op(EOR, M::Aby, 0x59, 4),
    op(EOR, M::Ix, 0x41, 6), op(EOR, M::Iy, 0x51, 5),
    //
    op(INC, M::Zp, 0xE6, 5), op(INC, M::Zpx, 0xF6, 6), op(INC, M::Abs, 0xEE, 6),
    op(INC, M::Abx, 0xFE, 7),
    //
    op(INX, M::Imp, 0xE8, 2), op(INY, M::Imp, 0xC8, 2),
    //
    op(JMP, M::Abs, 0x4C, 3), op(JMP, M::Ind, 0x6C, 5), op(JSR, M::Abs, 0x20, 6),
    //
    op(LDA, M::Imm, 0xA9, 2), op(LDA, M::Zp, 0xA5, 3), op(LDA, M::Zpx, 0xB5, 4),
    op(LDA, M::Abs, 0xAD, 4), op(LDA, M::Abx, 0xBD, 4), op(LDA, M::Aby, 0xB9, 4),
    op(LDA, M::Ix, 0xA1, 6), op(LDA, M::Iy, 0xB1, 5),
    //
    op(LDX, M::Imm, 0xA2, 2), op(LDX, M::Zp, 0xA6, 3), op(LDX, M::Zpy, 0xB6, 4),
    op(LDX, M::Abs, 0xAE, 4), op(LDX, M::Aby, 0xBE, 4),
    //
    op(LDY, M::Imm, 0xA0, 2), op(LDY, M::Zp, 0xA4, 3), op(LDY, M::Zpx, 0xB4, 4),
    op(LDY, M::Abs, 0xAC, 4), op(LDY, M::Abx, 0xBC, 4),
    //
    op(LSR, M::Imp, 0x4A, 2), op(LSR, M::Acc, 0x4A, 2), op(LSR, M::Zp, 0x46, 5),
    op(LSR, M::Zpx, 0x56, 6), op(LSR, M::Abs, 0x4E, 6), op(LSR, M::Abx, 0x5E, 7),
    //
    op(NOP, M::Imp, 0xEA, 2),
    //
    op(ORA, M::Imm, 0x09, 2), op(ORA, M::Zp, 0x05, 3), op(ORA, M::Zpx, 0x15, 4),
    op(ORA, M::Abs, 0x0D, 4), op(ORA, M::Abx, 0x1D, 4), op(ORA, M::Aby, 0x19, 4),
    op(ORA, M::Ix, 0x01, 6), op(ORA, M::Iy, 0x11, 5),
    //
    op(PHA, M::Imp, 0x48, 3), op(PHP, M::Imp, 0x08, 3), op(PLA, M::Imp, 0x68, 4),
    op(PLP, M::Imp, 0x28, 4),
    //
    op(ROL, M::Imp, 0x2A, 2), op(ROL, M::Acc, 0x2A, 2), op(ROL, M::Zp, 0x26, 5),
    op(ROL, M::Zpx, 0x36, 6), op(ROL, M::Abs, 0x2E, 6), op(ROL, M::Abx, 0x3E, 7),
    //
    op(ROR, M::Imp, 0x6A, 2), op(ROR, M::Acc, 0x6A, 2), op(ROR, M::Zp, 0x66, 5),
    op(ROR, M::Zpx, 0x76, 6), op(ROR, M::Abs, 0x6E, 6), op(ROR, M::Abx, 0x7E, 7),
    //
    op(RTI, M::Imp, 0x40, 6), op(RTS, M::Imp, 0x60, 6),
    //
    op(SBC, M::Imm, 0xE9, 2), op(SBC, M::Zp, 0xE5, 3), op(SBC, M::Zpx, 0xF5, 4),
    op(SBC, M::Abs, 0xED, 4), op(SBC, M::Abx, 0xFD, 4), op(SBC, M::Aby, 0xF9, 4),
    op(SBC, M::Ix, 0xE1, 6), op(SBC, M::Iy, 0xF1, 5),
    //
    op(SEC, M::Imp, 0x38, 2), op(SED, M::Imp, 0xF8, 2), op(SEI, M::Imp, 0x78, 2),
    //
    op(STA, M::Zp, 0x85, 3), op(STA, M::Zpx, 0x95, 4), op(STA, M::Abs, 0x8D, 4),
    op(STA, M::Abx, 0x9D, 5), op(STA, M::Aby, 0x99, 5), op(STA, M::Ix, 0x81, 6),
    op(STA, M::Iy, 0x91, 6),
    //
    op(STX, M::Zp, 0x86, 3), op(STX, M::Zpx, 0x96, 4), op(STX, M::Abs, 0x8E, 4),
    op(STY, M::Zp, 0x84, 3), op(STY, M::Zpx, 0x94, 4), op(STY, M::Abs, 0x8C, 4),
    //
    op(TAX, M::Imp, 0xAA, 2), op(TAY, M::Imp, 0xA8, 2), op(TSX, M::Imp, 0xBA, 2),
    op(TXA, M::Imp, 0x8A, 2), op(TXS, M::Imp, 0x9A, 2), op(TYA, M::Imp, 0x98, 2),
];

/// Raw table lookup; `None` when the mnemonic has no encoding in the
/// requested mode.
pub fn lookup_opcode(mne: Mnemonic, mode: AddrMode) -> Option<OpcodeEntry> {
    OPCODE_TABLE
        .iter()
        .copied()
        .find(|e| e.mne == mne && e.mode == mode)
}

/// Lookup with the ZPY repair rule: mnemonics without a ZPY encoding fall
/// back to ABY.
pub fn lookup_opcode_fixed(mne: Mnemonic, mode: AddrMode) -> Option<OpcodeEntry> {
    match lookup_opcode(mne, mode) {
        Some(e) => Some(e),
        None if mode == AddrMode::Zpy => lookup_opcode(mne, AddrMode::Aby),
        None => None,
    }
}

/// Byte size of an emitted instruction; comment carriers take no space
/// and data markers take one byte.
pub fn instr_size(mne: Mnemonic, mode: AddrMode) -> u16 {
    match mne {
        Mnemonic::None => 0,
        Mnemonic::Data => 1,
        _ => mode.instr_size(),
    }
}

/// Base cycle count (0 when the combination is not encodable).
pub fn cycle_count(mne: Mnemonic, mode: AddrMode) -> u8 {
    lookup_opcode_fixed(mne, mode).map(|e| e.cycles).unwrap_or(0)
}

pub fn addr_mode_from_name(name: &str) -> Option<AddrMode> {
    match name {
        "A" => Some(AddrMode::Acc),
        "IMM" => Some(AddrMode::Imm),
        "ZP" => Some(AddrMode::Zp),
        "ZPX" => Some(AddrMode::Zpx),
        "ZPY" => Some(AddrMode::Zpy),
        "ABS" => Some(AddrMode::Abs),
        "ABX" => Some(AddrMode::Abx),
        "ABY" => Some(AddrMode::Aby),
        "IX" => Some(AddrMode::Ix),
        "IY" => Some(AddrMode::Iy),
        "IND" => Some(AddrMode::Ind),
        "REL" => Some(AddrMode::Rel),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(LDA, M::Imm, 0xA9, 2)]
    #[case(LDA, M::Zp, 0xA5, 3)]
    #[case(LDA, M::Iy, 0xB1, 5)]
    #[case(STA, M::Abs, 0x8D, 4)]
    #[case(JSR, M::Abs, 0x20, 6)]
    #[case(JMP, M::Ind, 0x6C, 5)]
    #[case(BNE, M::Rel, 0xD0, 2)]
    #[case(DCP, M::Iy, 0xD3, 8)]
    fn opcode_lookup(
        #[case] mne: Mnemonic,
        #[case] mode: AddrMode,
        #[case] opcode: u8,
        #[case] cycles: u8,
    ) {
        let entry = lookup_opcode(mne, mode).unwrap();
        assert_eq!(entry.opcode, opcode);
        assert_eq!(entry.cycles, cycles);
    }

    #[rstest]
    #[case(STA, M::Imm)]
    #[case(STX, M::Aby)]
    #[case(JSR, M::Zp)]
    #[case(INC, M::Iy)]
    fn unsupported_combinations_return_none(#[case] mne: Mnemonic, #[case] mode: AddrMode) {
        assert!(lookup_opcode(mne, mode).is_none());
    }

    #[rstest]
    #[case(LDA)]
    #[case(STA)]
    #[case(ADC)]
    #[case(CMP)]
    fn zpy_falls_back_to_aby(#[case] mne: Mnemonic) {
        // none of these have a ZPY encoding
        assert!(lookup_opcode(mne, M::Zpy).is_none());
        let fixed = lookup_opcode_fixed(mne, M::Zpy).unwrap();
        assert_eq!(fixed.mode, M::Aby);
        assert_eq!(cycle_count(mne, M::Zpy), fixed.cycles);
    }

    #[test]
    fn ldx_keeps_its_real_zpy_encoding() {
        let entry = lookup_opcode_fixed(LDX, M::Zpy).unwrap();
        assert_eq!(entry.opcode, 0xB6);
    }

    #[test]
    fn sizes() {
        assert_eq!(instr_size(LDA, M::Imm), 2);
        assert_eq!(instr_size(LDA, M::Abs), 3);
        assert_eq!(instr_size(RTS, M::Imp), 1);
        assert_eq!(instr_size(Mnemonic::None, M::Imp), 0);
        assert_eq!(instr_size(Mnemonic::Data, M::Imp), 1);
    }

    #[test]
    fn branch_set_is_the_eight_conditionals() {
        let branches: Vec<_> = ALL_MNEMONICS.iter().filter(|m| m.is_branch()).collect();
        assert_eq!(branches.len(), 8);
        assert!(JMP.is_branch() == false);
    }

    #[test]
    fn mnemonic_name_round_trip() {
        for m in ALL_MNEMONICS {
            assert_eq!(Mnemonic::from_name(m.name()), Some(*m));
        }
        assert_eq!(Mnemonic::from_name("lda"), Some(LDA));
        assert_eq!(Mnemonic::from_name("bogus"), None);
    }
}
