//! Target machine profiles.

use serde::Serialize;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub enum Machine {
    #[default]
    Unknown,
    Atari2600,
    Atari5200,
    Atari7800,
}

/// Address window for a class of variables.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct MemoryRange {
    pub start: u16,
    pub end: u16,
}

#[derive(Clone, Copy, Debug, Serialize)]
pub struct MachineInfo {
    pub name: &'static str,
    pub start_addr: u16,
    pub end_addr: u16,
    pub addr_mask: u16,
    /// window for zero-page variables
    pub zeropage: MemoryRange,
    /// window for absolutely-addressed variables
    pub ram: MemoryRange,
}

impl MachineInfo {
    pub fn bank_size(&self) -> usize {
        usize::from(self.end_addr - self.start_addr) + 1
    }
}

impl Machine {
    pub fn lookup(name: &str) -> Machine {
        match name {
            "Atari2600" | "atari2600" | "2600" => Machine::Atari2600,
            "Atari5200" | "atari5200" | "5200" => Machine::Atari5200,
            "Atari7800" | "atari7800" | "7800" => Machine::Atari7800,
            _ => Machine::Unknown,
        }
    }

    pub fn info(self) -> MachineInfo {
        match self {
            // The 2600's 128 bytes of RAM all live in page zero, so the
            // zero-page and absolute windows coincide.
            Machine::Unknown | Machine::Atari2600 => MachineInfo {
                name: "Atari2600",
                start_addr: 0xF000,
                end_addr: 0xFFFF,
                addr_mask: 0x0FFF,
                zeropage: MemoryRange { start: 0x80, end: 0xFF },
                ram: MemoryRange { start: 0x80, end: 0xFF },
            },
            Machine::Atari5200 => MachineInfo {
                name: "Atari5200",
                start_addr: 0x4000,
                end_addr: 0x7FFF,
                addr_mask: 0x3FFF,
                zeropage: MemoryRange { start: 0x80, end: 0xFF },
                ram: MemoryRange { start: 0x0200, end: 0x3FFF },
            },
            Machine::Atari7800 => MachineInfo {
                name: "Atari7800",
                start_addr: 0x8000,
                end_addr: 0xFFFF,
                addr_mask: 0x7FFF,
                zeropage: MemoryRange { start: 0x40, end: 0xFF },
                ram: MemoryRange { start: 0x1800, end: 0x27FF },
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_known_names() {
        assert_eq!(Machine::lookup("Atari2600"), Machine::Atari2600);
        assert_eq!(Machine::lookup("atari7800"), Machine::Atari7800);
        assert_eq!(Machine::lookup("C64"), Machine::Unknown);
    }

    #[test]
    fn bank_sizes() {
        assert_eq!(Machine::Atari2600.info().bank_size(), 4096);
        assert_eq!(Machine::Atari5200.info().bank_size(), 16384);
        assert_eq!(Machine::Atari7800.info().bank_size(), 32768);
    }
}
