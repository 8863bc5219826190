//! Diagnostics for script compilation
//!
//! Lexer and parser failures are collected as `Diagnostic` values. The short
//! form (`SyntaxError: invalid syntax (line 3)`) is what crosses the
//! invocation boundary; the long form with a caret snippet is used by
//! `cato check`.

use crate::span::Span;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Python-style error class of a compile diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiagnosticKind {
    SyntaxError,
    IndentationError,
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosticKind::SyntaxError => write!(f, "SyntaxError"),
            DiagnosticKind::IndentationError => write!(f, "IndentationError"),
        }
    }
}

/// A compile error with its location
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Error class
    pub kind: DiagnosticKind,
    /// Error code (e.g., "CT1001")
    pub code: String,
    /// Main diagnostic message
    pub message: String,
    /// Location in the source
    pub span: Span,
    /// Column number (1-based), filled by [`Diagnostic::with_source`]
    pub column: usize,
    /// Source line text
    pub snippet: String,
    /// Short label for the caret range
    pub label: String,
    /// Suggested fix (optional)
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub help: Option<String>,
}

impl Diagnostic {
    /// Create a syntax error diagnostic with code
    pub fn error_with_code(code: impl Into<String>, message: impl Into<String>, span: Span) -> Self {
        Self {
            kind: DiagnosticKind::SyntaxError,
            code: code.into(),
            message: message.into(),
            span,
            column: 1,
            snippet: String::new(),
            label: String::new(),
            help: None,
        }
    }

    /// Create an indentation error diagnostic with code
    pub fn indentation(code: impl Into<String>, message: impl Into<String>, span: Span) -> Self {
        Self {
            kind: DiagnosticKind::IndentationError,
            ..Self::error_with_code(code, message, span)
        }
    }

    /// Set the label (caret description)
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Add a help message
    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    /// Fill column and snippet from the source the span points into
    pub fn with_source(mut self, source: &str) -> Self {
        let line_index = self.span.line.saturating_sub(1) as usize;
        if let Some(text) = source.lines().nth(line_index) {
            self.snippet = text.trim_end().to_string();
            let line_start = source
                .lines()
                .take(line_index)
                .map(|l| l.chars().count() + 1)
                .sum::<usize>();
            self.column = self.span.start.saturating_sub(line_start) + 1;
        }
        self
    }

    /// 1-based line number
    pub fn line(&self) -> u32 {
        self.span.line
    }

    /// Format with snippet and caret
    pub fn to_human_string(&self) -> String {
        let mut output = format!("{}[{}]: {}\n", self.kind, self.code, self.message);
        output.push_str(&format!("  --> line {}:{}\n", self.span.line, self.column));

        if !self.snippet.is_empty() {
            output.push_str("   |\n");
            output.push_str(&format!("{:>2} | {}\n", self.span.line, self.snippet));

            let padding = " ".repeat(self.column.saturating_sub(1));
            let carets = "^".repeat(self.span.len().max(1));
            output.push_str(&format!("   | {}{}", padding, carets));
            if !self.label.is_empty() {
                output.push_str(&format!(" {}", self.label));
            }
            output.push('\n');
        }

        if let Some(help) = &self.help {
            output.push_str(&format!("   = help: {}\n", help));
        }

        output
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} (line {})", self.kind, self.message, self.span.line)
    }
}

/// Diagnostic codes
pub mod codes {
    pub const UNEXPECTED_CHARACTER: &str = "CT1001";
    pub const UNTERMINATED_STRING: &str = "CT1002";
    pub const INVALID_ESCAPE: &str = "CT1003";
    pub const INVALID_NUMBER: &str = "CT1004";
    pub const BAD_DEDENT: &str = "CT1005";
    pub const TOO_DEEP: &str = "CT1006";
    pub const INVALID_SYNTAX: &str = "CT2001";
    pub const UNEXPECTED_INDENT: &str = "CT2002";
    pub const EXPECTED_INDENT: &str = "CT2003";
    pub const UNSUPPORTED: &str = "CT2004";
    pub const INVALID_TARGET: &str = "CT2005";
    pub const MISPLACED: &str = "CT2006";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_form() {
        let diag = Diagnostic::error_with_code(codes::INVALID_SYNTAX, "invalid syntax", Span::new(4, 5, 2));
        assert_eq!(diag.to_string(), "SyntaxError: invalid syntax (line 2)");
    }

    #[test]
    fn test_with_source_computes_column() {
        let source = "x = 1\ny = = 2\n";
        let diag = Diagnostic::error_with_code(codes::INVALID_SYNTAX, "invalid syntax", Span::new(10, 11, 2))
            .with_source(source);
        assert_eq!(diag.column, 5);
        assert_eq!(diag.snippet, "y = = 2");
        assert!(diag.to_human_string().contains("    ^"));
    }
}
