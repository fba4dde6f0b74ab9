//! Multiplication synthesis.
//!
//! Literal multipliers up to 16 expand through a step table of shift and
//! add/subtract operations; anything larger (and variable multipliers)
//! goes through the generic 8x8->16 loop, which returns the low byte in
//! A and the high byte in X.

use crate::ast::{ListId, Node};
use crate::instr::ParamExt;
use crate::isa::{AddrMode, Mnemonic};
use crate::symbols::SymbolType;

use super::emitter::SymView;
use super::CodeGen;

/// Zero-page scratch byte used by the generic multiply loop.
const MUL_SCRATCH: i32 = 0x80;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Step {
    Shift,
    Add,
    Sub,
    Skip,
}

use Step::{Add, Shift, Skip, Sub};

/// Up to five operations per multiplier; row `k-1` computes `A * k`.
#[rustfmt::skip]
const MULTIPLIER_STEPS: [[Step; 5]; 16] = [
    [Skip,  Skip,  Skip,  Skip,  Skip ], // 1
    [Shift, Skip,  Skip,  Skip,  Skip ], // 2
    [Shift, Add,   Skip,  Skip,  Skip ], // 3
    [Shift, Shift, Skip,  Skip,  Skip ], // 4
    [Shift, Shift, Add,   Skip,  Skip ], // 5
    [Shift, Add,   Shift, Skip,  Skip ], // 6
    [Shift, Shift, Shift, Sub,   Skip ], // 7
    [Shift, Shift, Shift, Skip,  Skip ], // 8
    [Shift, Shift, Shift, Add,   Skip ], // 9
    [Shift, Shift, Add,   Shift, Skip ], // 10
    [Shift, Shift, Add,   Shift, Add  ], // 11
    [Shift, Add,   Shift, Shift, Skip ], // 12
    [Shift, Add,   Shift, Shift, Add  ], // 13
    [Shift, Shift, Shift, Sub,   Shift], // 14
    [Shift, Shift, Shift, Shift, Sub  ], // 15
    [Shift, Shift, Shift, Shift, Skip ], // 16
];

/// Which synthesis path a literal multiplier takes.
pub fn uses_step_table(multiplier: i32) -> bool {
    (1..=16).contains(&multiplier)
}

impl<'a> CodeGen<'a> {
    pub(crate) fn multiply_op(&mut self, expr: ListId, _dest_type: SymbolType) {
        let line = self.ast.list(expr).line_num;
        let var_node = self.ast.list(expr).node(1).clone();
        let Some(var) = self.lookup_node(&var_node, line) else {
            return;
        };

        let rhs = self.ast.list(expr).node(2).clone();
        match &rhs {
            Node::Int(multiplier) => self.multiply_with_const(&var, *multiplier),
            Node::Str(_) => {
                let Some(var2) = self.lookup_node(&rhs, line) else {
                    return;
                };
                self.multiply_with_var(&var, &var2);
            }
            _ => self.error(line, "Multiply op not supported"),
        }
    }

    fn multiply_with_const(&mut self, var: &SymView, multiplier: i32) {
        self.emit.add_comment_line("Start of Multiplication");
        if uses_step_table(multiplier) {
            self.step_multiply(var, multiplier);
        } else {
            self.generic_multiply_const(var, multiplier);
        }
        self.emit.add_comment_line("End of Multiplication");
    }

    /// Shift/add chain; the product stays in A.
    fn step_multiply(&mut self, var: &SymView, multiplier: i32) {
        self.icg_load_var(var);
        self.emit.add_instr_b(Mnemonic::CLC);
        for step in MULTIPLIER_STEPS[(multiplier - 1) as usize] {
            match step {
                Shift => {
                    self.emit.add_instr_b(Mnemonic::ASL);
                }
                Add => {
                    self.emit.add_instr_b(Mnemonic::CLC);
                    self.icg_op_with_var(Mnemonic::ADC, var);
                }
                Sub => {
                    self.emit.add_instr_b(Mnemonic::SEC);
                    self.icg_op_with_var(Mnemonic::SBC, var);
                }
                Skip => {}
            }
        }
        self.regs.reset();
    }

    /// 8x8->16 loop with an immediate multiplier. Relative branch
    /// distances are fixed because every instruction in the loop has a
    /// known size.
    fn generic_multiply_const(&mut self, var: &SymView, multiplier: i32) {
        self.icg_load_var(var);
        self.emit.add_instr_n(Mnemonic::STA, AddrMode::Zp, MUL_SCRATCH);

        self.emit.add_instr_n(Mnemonic::LDA, AddrMode::Imm, 0);
        self.emit.add_instr_n(Mnemonic::LDX, AddrMode::Imm, 8);
        //-- loop start
        self.emit.add_instr_b(Mnemonic::LSR);
        self.emit.add_instr_n(Mnemonic::ROR, AddrMode::Zp, MUL_SCRATCH);
        self.emit.add_instr_n(Mnemonic::BCC, AddrMode::Rel, 4);
        // adding multiplier-1 makes up for the carry that is always set
        self.emit
            .add_instr_n(Mnemonic::ADC, AddrMode::Imm, (multiplier - 1) & 0xFF);
        self.emit.add_instr_b(Mnemonic::DEX);
        let idx = self.emit.add_instr_n(Mnemonic::BNE, AddrMode::Rel, -8);
        self.emit
            .attach_comment(idx, "Branch back to start of multiply loop");

        self.emit.add_instr_b(Mnemonic::TAX);
        self.emit.add_instr_n(Mnemonic::LDA, AddrMode::Zp, MUL_SCRATCH);
        self.regs.reset();
    }

    /// Variable multiplier: same loop shape, but the add operand's size
    /// varies so the loop uses labels instead of fixed distances.
    fn multiply_with_var(&mut self, var: &SymView, var2: &SymView) {
        self.emit.add_comment_line("Start of Multiplication");

        self.icg_load_var(var);
        self.emit.add_instr_n(Mnemonic::STA, AddrMode::Zp, MUL_SCRATCH);
        self.icg_op_rmw(Mnemonic::DEC, var2);

        let loop_top = self.new_code_label();
        let skip_add = self.new_code_label();

        self.emit.add_instr_n(Mnemonic::LDA, AddrMode::Imm, 0);
        self.emit.add_instr_n(Mnemonic::LDX, AddrMode::Imm, 8);
        self.place_label(loop_top);
        self.emit.add_instr_b(Mnemonic::LSR);
        self.emit.add_instr_n(Mnemonic::ROR, AddrMode::Zp, MUL_SCRATCH);
        self.icg_branch(Mnemonic::BCC, skip_add);
        self.emit.add_instr(
            Mnemonic::ADC,
            var2.addr_mode(),
            &var2.asm_name,
            ParamExt::empty(),
        );
        self.place_label(skip_add);
        self.emit.add_instr_b(Mnemonic::DEX);
        self.icg_branch(Mnemonic::BNE, loop_top);

        self.icg_op_rmw(Mnemonic::INC, var2);
        self.emit.add_instr_b(Mnemonic::TAX);
        self.emit.add_instr_n(Mnemonic::LDA, AddrMode::Zp, MUL_SCRATCH);
        self.regs.reset();

        self.emit.add_comment_line("End of Multiplication");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_selection_boundary() {
        assert!(uses_step_table(16));
        assert!(!uses_step_table(17));
        assert!(uses_step_table(1));
        assert!(!uses_step_table(0));
        assert!(!uses_step_table(100));
    }

    #[test]
    fn step_rows_cover_one_to_sixteen() {
        assert_eq!(MULTIPLIER_STEPS.len(), 16);
        // multiply-by-10 is ASL ASL ADC ASL
        assert_eq!(MULTIPLIER_STEPS[9], [Shift, Shift, Add, Shift, Skip]);
        // multiply-by-7 subtracts after three shifts
        assert_eq!(MULTIPLIER_STEPS[6], [Shift, Shift, Shift, Sub, Skip]);
    }
}
