// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Source locations, error types, and diagnostics.
//!
//! Every fallible step of the pipeline reports through [`Diagnostic`]
//! values collected by the driver; nothing in the assembly path panics or
//! returns early on a source-level problem. A diagnostic carries a stable
//! numeric code, a severity, a message, and the source location it refers
//! to. Rendering is left to the front end.

use std::fmt;

/// A position in a source file. Carried on every token, statement, and
/// diagnostic. Line and column are 1-based; 0 means "unknown".
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SourceLocation {
    pub filename: String,
    pub line: usize,
    pub column: usize,
}

impl SourceLocation {
    pub fn new(filename: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            filename: filename.into(),
            line,
            column,
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.filename.is_empty() {
            write!(f, "{}:{}", self.line, self.column)
        } else {
            write!(f, "{}:{}:{}", self.filename, self.line, self.column)
        }
    }
}

/// Categories of assembler errors, one per pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsmErrorKind {
    Lex,
    Parse,
    Layout,
    Encode,
    Symbol,
    Relocation,
    Io,
}

/// An assembler error with a kind and message.
#[derive(Debug, Clone)]
pub struct AsmError {
    kind: AsmErrorKind,
    message: String,
}

impl AsmError {
    pub fn new(kind: AsmErrorKind, msg: &str, param: Option<&str>) -> Self {
        Self {
            kind,
            message: format_error(msg, param),
        }
    }

    pub fn kind(&self) -> AsmErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for AsmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AsmError {}

/// Severity level for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Note,
}

/// Stable numeric diagnostic codes.
///
/// The ranges follow the COIL error-code layout: 1xxx object format,
/// 2xxx instruction, 5xxx symbol, 9xxx syntax and I/O. Codes without a
/// COIL counterpart extend their range past its last assigned value
/// rather than reusing an occupied slot.
pub mod codes {
    pub const INVALID_SECTION: u32 = 1004;
    pub const INVALID_OPCODE: u32 = 2001;
    pub const INVALID_OPERAND_COUNT: u32 = 2002;
    pub const INVALID_OPERAND_TYPE: u32 = 2003;
    pub const VALUE_OUT_OF_RANGE: u32 = 2009;
    pub const UNDEFINED_SYMBOL: u32 = 5001;
    pub const DUPLICATE_SYMBOL: u32 = 5002;
    pub const RELOCATION_OVERFLOW: u32 = 5003;
    pub const SYNTAX_ERROR: u32 = 9001;
    pub const UNEXPECTED_TOKEN: u32 = 9002;
    pub const FILE_IO_ERROR: u32 = 9003;
}

/// A diagnostic message with code, severity, and location.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    severity: Severity,
    code: u32,
    error: AsmError,
    location: SourceLocation,
}

impl Diagnostic {
    pub fn new(severity: Severity, error: AsmError, location: SourceLocation) -> Self {
        Self {
            severity,
            code: default_code(error.kind()),
            error,
            location,
        }
    }

    /// Shorthand for an error-severity diagnostic.
    pub fn error(kind: AsmErrorKind, msg: &str, param: Option<&str>, location: SourceLocation) -> Self {
        Self::new(Severity::Error, AsmError::new(kind, msg, param), location)
    }

    pub fn with_code(mut self, code: u32) -> Self {
        self.code = code;
        self
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn code(&self) -> u32 {
        self.code
    }

    pub fn kind(&self) -> AsmErrorKind {
        self.error.kind()
    }

    pub fn message(&self) -> &str {
        self.error.message()
    }

    pub fn location(&self) -> &SourceLocation {
        &self.location
    }

    /// One-line rendering: `file:line:col: ERROR [5001] - message`.
    pub fn format(&self) -> String {
        let sev = match self.severity {
            Severity::Error => "ERROR",
            Severity::Warning => "WARNING",
            Severity::Note => "NOTE",
        };
        format!(
            "{}: {} [{}] - {}",
            self.location,
            sev,
            self.code,
            self.error.message()
        )
    }

    /// Rendering with the offending source line and a column marker.
    pub fn format_with_context(&self, lines: Option<&[String]>) -> String {
        let mut out = self.format();
        let line_idx = self.location.line.saturating_sub(1);
        if let Some(lines) = lines {
            if let Some(src) = lines.get(line_idx) {
                out.push('\n');
                out.push_str(&format!("{:>5} | {}", self.location.line, src));
                if self.location.column > 0 {
                    out.push('\n');
                    out.push_str(&format!(
                        "{:>5} | {}^",
                        "",
                        " ".repeat(self.location.column.saturating_sub(1))
                    ));
                }
            }
        }
        out
    }
}

/// Count diagnostics at error severity.
pub fn error_count(diagnostics: &[Diagnostic]) -> usize {
    diagnostics
        .iter()
        .filter(|d| d.severity() == Severity::Error)
        .count()
}

fn default_code(kind: AsmErrorKind) -> u32 {
    match kind {
        AsmErrorKind::Lex => codes::SYNTAX_ERROR,
        AsmErrorKind::Parse => codes::UNEXPECTED_TOKEN,
        AsmErrorKind::Layout => codes::INVALID_SECTION,
        AsmErrorKind::Encode => codes::INVALID_OPERAND_TYPE,
        AsmErrorKind::Symbol => codes::UNDEFINED_SYMBOL,
        AsmErrorKind::Relocation => codes::RELOCATION_OVERFLOW,
        AsmErrorKind::Io => codes::FILE_IO_ERROR,
    }
}

/// Format an error message with an optional parameter.
pub fn format_error(msg: &str, param: Option<&str>) -> String {
    match param {
        Some(p) => format!("{msg}: {p}"),
        None => msg.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostic_format_includes_location_and_code() {
        let err = AsmError::new(AsmErrorKind::Symbol, "Undefined symbol", Some("main"));
        let diag = Diagnostic::new(
            Severity::Error,
            err,
            SourceLocation::new("test.casm", 3, 7),
        );
        assert_eq!(
            diag.format(),
            "test.casm:3:7: ERROR [5001] - Undefined symbol: main"
        );
    }

    #[test]
    fn format_with_context_marks_column() {
        let err = AsmError::new(AsmErrorKind::Parse, "Unexpected token", None);
        let diag = Diagnostic::new(Severity::Error, err, SourceLocation::new("t", 2, 5));
        let lines = vec!["nop".to_string(), "mov %r1".to_string()];
        let rendered = diag.format_with_context(Some(&lines));
        assert!(rendered.contains("    2 | mov %r1"));
        assert!(rendered.ends_with("    ^"));
    }

    #[test]
    fn diagnostic_code_override() {
        let err = AsmError::new(AsmErrorKind::Symbol, "Symbol already defined", Some("x"));
        let diag = Diagnostic::new(Severity::Error, err, SourceLocation::default())
            .with_code(codes::DUPLICATE_SYMBOL);
        assert_eq!(diag.code(), codes::DUPLICATE_SYMBOL);
    }
}
