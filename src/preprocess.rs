//! Pre-parse line scan: collects `#include` and `#machine` directives
//! before the tokenizer ever runs. The in-source cycle-display toggles
//! are left for the parser, which sees them as directive statements.

use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::diag::Diagnostics;
use crate::machine::Machine;

pub const MAX_INCLUDE_FILES: usize = 12;

/// Directives the parser understands inside source.
#[derive(Clone, Copy, Debug, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum DirectiveCode {
    ShowCycles = 1,
    HideCycles = 2,
}

impl DirectiveCode {
    pub fn from_name(name: &str) -> Option<DirectiveCode> {
        match name {
            "show_cycles" => Some(DirectiveCode::ShowCycles),
            "hide_cycles" => Some(DirectiveCode::HideCycles),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
pub struct PreProcessInfo {
    pub included_files: Vec<String>,
    pub machine: Machine,
}

impl PreProcessInfo {
    pub fn add_include(&mut self, file: String, diag: &mut Diagnostics) {
        if self.included_files.len() < MAX_INCLUDE_FILES {
            if !self.included_files.contains(&file) {
                self.included_files.push(file);
            }
        } else {
            diag.warn("Too many included files");
        }
    }
}

fn unquote(text: &str) -> &str {
    text.trim().trim_matches('"')
}

/// Scan source lines for preprocessor directives.
pub fn preprocess(info: &mut PreProcessInfo, source: &str, diag: &mut Diagnostics) {
    for line in source.lines() {
        let line = line.trim_start();
        let Some(rest) = line.strip_prefix('#') else {
            continue;
        };
        let mut parts = rest.splitn(2, char::is_whitespace);
        let directive = parts.next().unwrap_or("");
        let arg = parts.next().unwrap_or("");

        match directive {
            "include" => info.add_include(unquote(arg).to_string(), diag),
            "machine" => {
                let name = unquote(arg);
                let machine = Machine::lookup(name);
                if machine == Machine::Unknown {
                    diag.warn(format!("Failed to lookup machine name: {name}"));
                } else {
                    info.machine = machine;
                }
            }
            // parser-scope directives are not this pass's business
            _ if DirectiveCode::from_name(directive).is_some() => {}
            _ => diag.warn(format!("Unknown directive: {directive}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collects_includes_and_machine() {
        let src = "#machine \"Atari2600\"\n#include \"lib.c\"\nchar x;\n#include \"lib.c\"\n";
        let mut info = PreProcessInfo::default();
        let mut diag = Diagnostics::new();
        preprocess(&mut info, src, &mut diag);
        assert_eq!(info.machine, Machine::Atari2600);
        assert_eq!(info.included_files, vec!["lib.c".to_string()]);
        assert!(!diag.has_errors());
    }

    #[test]
    fn unknown_directives_warn_and_are_skipped() {
        let mut info = PreProcessInfo::default();
        let mut diag = Diagnostics::new();
        preprocess(&mut info, "#pragma thing\n", &mut diag);
        assert_eq!(diag.entries().len(), 1);
        assert!(diag.entries()[0].message.contains("Unknown directive"));
    }

    #[test]
    fn cycle_toggles_belong_to_the_parser() {
        let mut info = PreProcessInfo::default();
        let mut diag = Diagnostics::new();
        preprocess(&mut info, "#show_cycles\n#hide_cycles\n", &mut diag);
        assert!(diag.entries().is_empty());
    }
}
