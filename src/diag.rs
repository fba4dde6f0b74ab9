//! Diagnostics sink: non-fatal user errors and warnings accumulated by
//! every phase, rendered by the CLI.
//!
//! Parse errors are soft-capped: after the limit, further errors are
//! swallowed and a single suppression note is recorded.

use std::fmt;

pub const MAX_PARSER_ERRORS: usize = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

#[derive(Clone, Debug)]
pub struct Diagnostic {
    pub severity: Severity,
    pub line: Option<u32>,
    pub message: String,
    /// raw source line or AST snippet shown under the message
    pub snippet: Option<String>,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.severity, self.line) {
            (Severity::Error, Some(line)) => write!(f, "ERROR on line {}: {}", line, self.message)?,
            (Severity::Error, None) => write!(f, "ERROR: {}", self.message)?,
            (Severity::Warning, _) => write!(f, "Warning: {}", self.message)?,
            (Severity::Info, _) => write!(f, "{}", self.message)?,
        }
        if let Some(snippet) = &self.snippet {
            write!(f, "\n\t{snippet}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
    error_count: usize,
    parse_errors: usize,
    parse_errors_suppressed: bool,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error(&mut self, line: impl Into<Option<u32>>, message: impl Into<String>) {
        self.push(Severity::Error, line.into(), message.into(), None);
    }

    pub fn error_with_snippet(
        &mut self,
        line: impl Into<Option<u32>>,
        message: impl Into<String>,
        snippet: impl Into<String>,
    ) {
        self.push(Severity::Error, line.into(), message.into(), Some(snippet.into()));
    }

    /// Parse errors share a soft cap; past it they are suppressed with a
    /// single note.
    pub fn parse_error(&mut self, line: u32, message: impl Into<String>, snippet: Option<String>) {
        if self.parse_errors_suppressed {
            return;
        }
        if self.parse_errors < MAX_PARSER_ERRORS {
            self.parse_errors += 1;
            self.push(Severity::Error, Some(line), message.into(), snippet);
        } else {
            self.parse_errors_suppressed = true;
            self.push(
                Severity::Info,
                None,
                "NOTE: Error limit exceeded.  No more errors will be reported.".to_string(),
                None,
            );
        }
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.push(Severity::Warning, None, message.into(), None);
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.push(Severity::Info, None, message.into(), None);
    }

    fn push(&mut self, severity: Severity, line: Option<u32>, message: String, snippet: Option<String>) {
        if severity == Severity::Error {
            self.error_count += 1;
        }
        self.entries.push(Diagnostic {
            severity,
            line,
            message,
            snippet,
        });
    }

    pub fn error_count(&self) -> usize {
        self.error_count
    }

    pub fn parse_error_count(&self) -> usize {
        self.parse_errors
    }

    pub fn has_errors(&self) -> bool {
        self.error_count > 0
    }

    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    /// Drain entries for incremental rendering.
    pub fn take_entries(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_errors_cap_at_three_with_a_note() {
        let mut diag = Diagnostics::new();
        for i in 0..6 {
            diag.parse_error(i, format!("error {i}"), None);
        }
        assert_eq!(diag.parse_error_count(), 3);
        assert_eq!(diag.error_count(), 3);
        // three errors plus one suppression note
        assert_eq!(diag.entries().len(), 4);
        assert!(diag.entries()[3].message.contains("Error limit exceeded"));
    }

    #[test]
    fn warnings_do_not_count_as_errors() {
        let mut diag = Diagnostics::new();
        diag.warn("duplicate symbol: x");
        assert!(!diag.has_errors());
        assert_eq!(format!("{}", diag.entries()[0]), "Warning: duplicate symbol: x");
    }

    #[test]
    fn error_rendering_includes_line_and_snippet() {
        let mut diag = Diagnostics::new();
        diag.error_with_snippet(12u32, "Identifier expected!", "char 5x;");
        let text = format!("{}", diag.entries()[0]);
        assert!(text.starts_with("ERROR on line 12: Identifier expected!"));
        assert!(text.contains("char 5x;"));
    }
}
