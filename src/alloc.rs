//! Memory allocation: assigns addresses to globals and per-function
//! locals from the machine profile's zero-page and absolute windows.
//!
//! Locals are placed end-to-end in a shared region directly above the
//! globals; call-depth data is recorded but not yet used to overlay
//! disjoint lifetimes.

use serde::Serialize;

use crate::diag::Diagnostics;
use crate::machine::MachineInfo;
use crate::symbols::{ModifierFlags, SymbolTable};

#[derive(Clone, Debug, Serialize)]
pub struct AllocEntry {
    pub name: String,
    pub addr: u16,
    pub size: u16,
    pub zeropage: bool,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct AllocationReport {
    pub entries: Vec<AllocEntry>,
    pub zeropage_used: u16,
    pub ram_used: u16,
}

struct Cursor {
    next: u16,
    end: u16,
}

impl Cursor {
    fn take(&mut self, size: u16) -> Option<u16> {
        let addr = self.next;
        let top = u32::from(addr) + u32::from(size);
        if top > u32::from(self.end) + 1 {
            return None;
        }
        self.next = top as u16;
        Some(addr)
    }
}

/// Assign addresses to every global variable, then to function locals.
pub fn allocate_variables(
    globals: &mut SymbolTable,
    machine: &MachineInfo,
    diag: &mut Diagnostics,
) -> AllocationReport {
    let mut report = AllocationReport::default();

    let mut zp = Cursor {
        next: machine.zeropage.start,
        end: machine.zeropage.end,
    };
    let mut ram = Cursor {
        next: machine.ram.start,
        end: machine.ram.end,
    };
    // machines whose RAM is entirely in page zero use a single cursor
    let single_area = machine.zeropage == machine.ram;

    for idx in 0..globals.len() {
        let sym = globals.get(idx).unwrap();
        // explicit placements and non-variables are not ours to move
        if !sym.is_variable() || sym.has_location() {
            continue;
        }
        let size = sym.calc_var_size(globals);
        let name = sym.name.clone();
        let wants_zp = single_area || sym.flags.contains(ModifierFlags::ZEROPAGE);

        let cursor = if wants_zp { &mut zp } else { &mut ram };
        match cursor.take(size) {
            Some(addr) => {
                globals.get_mut(idx).unwrap().set_location(addr);
                report.entries.push(AllocEntry {
                    name,
                    addr,
                    size,
                    zeropage: addr < 256,
                });
            }
            None => diag.error(None::<u32>, format!("Out of variable space for: {name}")),
        }
    }

    //-----------------------------------------------------------------
    //  Function locals share the region above the globals.

    let func_idxs: Vec<usize> = (0..globals.len())
        .filter(|&i| globals.get(i).map(|s| s.is_function()).unwrap_or(false))
        .collect();

    for idx in func_idxs {
        let Some(mut locals) = globals
            .get_mut(idx)
            .and_then(|s| s.ext.as_mut())
            .map(|ext| std::mem::take(&mut ext.locals))
        else {
            continue;
        };

        let mut used: u16 = 0;
        for li in 0..locals.len() {
            let sym = locals.get(li).unwrap();
            if (!sym.is_variable() && !sym.is_const()) || sym.has_location() {
                continue;
            }
            // simple consts take no storage
            if sym.is_simple_const() {
                continue;
            }
            let size = sym.calc_var_size(globals);
            let name = sym.name.clone();
            match zp.take(size) {
                Some(addr) => {
                    locals.get_mut(li).unwrap().set_location(addr);
                    used += size;
                    report.entries.push(AllocEntry {
                        name,
                        addr,
                        size,
                        zeropage: addr < 256,
                    });
                }
                None => diag.error(None::<u32>, format!("Out of variable space for: {name}")),
            }
        }

        if let Some(ext) = globals.get_mut(idx).unwrap().ext.as_mut() {
            ext.locals = locals;
            ext.local_bytes = used;
        }
    }

    report.zeropage_used = zp.next - machine.zeropage.start;
    report.ram_used = if single_area {
        0
    } else {
        ram.next - machine.ram.start
    };
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::Machine;
    use crate::parser::{parse_program, TypeRegistry};
    use crate::symgen::generate_symbols;
    use crate::ast::Ast;

    fn allocate(src: &str, machine: Machine) -> (SymbolTable, AllocationReport, Diagnostics) {
        let mut ast = Ast::new();
        let mut types = TypeRegistry::default();
        let mut diag = Diagnostics::new();
        let prog = parse_program(src, &mut ast, &mut types, &mut diag);
        let mut globals = SymbolTable::new_global();
        generate_symbols(&ast, prog, &mut globals, &mut diag);
        let report = allocate_variables(&mut globals, &machine.info(), &mut diag);
        (globals, report, diag)
    }

    #[test]
    fn sequential_placement_matches_sizes() {
        let (globals, report, diag) =
            allocate("char a; int b; char buf[4]; char c;", Machine::Atari2600);
        assert!(!diag.has_errors());
        assert_eq!(globals.find("a").unwrap().location, Some(0x80));
        assert_eq!(globals.find("b").unwrap().location, Some(0x81));
        assert_eq!(globals.find("buf").unwrap().location, Some(0x83));
        assert_eq!(globals.find("c").unwrap().location, Some(0x87));
        // cursor advance equals the sum of sizes
        assert_eq!(report.zeropage_used, 8);
    }

    #[test]
    fn explicit_placement_is_untouched() {
        let (globals, _, diag) = allocate("char @$91 hw; char a;", Machine::Atari2600);
        assert!(!diag.has_errors());
        assert_eq!(globals.find("hw").unwrap().location, Some(0x91));
        assert_eq!(globals.find("a").unwrap().location, Some(0x80));
    }

    #[test]
    fn zeropage_flag_selects_the_zp_window() {
        let (globals, _, diag) = allocate(
            "zeropage char fast; char slow;",
            Machine::Atari5200,
        );
        assert!(!diag.has_errors());
        let fast = globals.find("fast").unwrap().location.unwrap();
        let slow = globals.find("slow").unwrap().location.unwrap();
        assert!(fast < 0x100, "zeropage var at {fast:#x}");
        assert!(slow >= 0x200, "absolute var at {slow:#x}");
    }

    #[test]
    fn locals_stack_above_globals() {
        let (globals, _, diag) = allocate(
            "char g; void main() { char t1; int t2; t1 = 1; }",
            Machine::Atari2600,
        );
        assert!(!diag.has_errors());
        let main = globals.find("main").unwrap();
        let ext = main.ext.as_ref().unwrap();
        assert_eq!(ext.locals.find("t1").unwrap().location, Some(0x81));
        assert_eq!(ext.locals.find("t2").unwrap().location, Some(0x82));
        assert_eq!(ext.local_bytes, 3);
    }

    #[test]
    fn overflow_is_reported() {
        let (_, _, diag) = allocate("char big[200];", Machine::Atari2600);
        assert!(diag.has_errors());
    }

    #[test]
    fn consts_take_no_storage() {
        let (globals, report, diag) = allocate("const char K = 5; char a;", Machine::Atari2600);
        assert!(!diag.has_errors());
        assert!(globals.find("K").unwrap().location.is_none());
        assert_eq!(report.zeropage_used, 1);
    }
}
