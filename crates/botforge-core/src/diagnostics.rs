//! Compiler diagnostics attached to compilation records.
//!
//! Diagnostics are produced by the compiler frontend and forwarded verbatim
//! to the peer owning the source. The core never interprets them beyond
//! counting errors.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Diagnostic severity, in decreasing order of importance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
    Hint,
}

/// Zero-based line/column position inside a source file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TextPosition {
    pub line: u32,
    pub column: u32,
}

impl TextPosition {
    pub const fn new(line: u32, column: u32) -> Self {
        TextPosition { line, column }
    }
}

/// Half-open range `[start, end)` inside a source file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextRange {
    pub start: TextPosition,
    pub end: TextPosition,
}

impl TextRange {
    pub const fn new(start: TextPosition, end: TextPosition) -> Self {
        TextRange { start, end }
    }

    /// A range covering `len` columns of a single line.
    pub const fn on_line(line: u32, column: u32, len: u32) -> Self {
        TextRange {
            start: TextPosition::new(line, column),
            end: TextPosition::new(line, column + len),
        }
    }
}

/// A single frontend diagnostic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub range: TextRange,
    pub severity: Severity,
    pub message: String,
}

impl Diagnostic {
    pub fn new(range: TextRange, severity: Severity, message: impl Into<String>) -> Self {
        Diagnostic {
            range,
            severity,
            message: message.into(),
        }
    }

    pub fn error(range: TextRange, message: impl Into<String>) -> Self {
        Diagnostic::new(range, Severity::Error, message)
    }

    pub fn warning(range: TextRange, message: impl Into<String>) -> Self {
        Diagnostic::new(range, Severity::Warning, message)
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
            Severity::Hint => "hint",
        };
        write!(
            f,
            "{}:{}: {}: {}",
            self.range.start.line + 1,
            self.range.start.column + 1,
            level,
            self.message
        )
    }
}
