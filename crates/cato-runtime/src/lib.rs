//! Cato Runtime - sandboxed script execution for serverless functions
//!
//! This library provides:
//! - Lexing and parsing of the Python-compatible script dialect
//! - A metered tree-walking interpreter
//! - Builtins plus the allow-listed `json` and `hashlib` modules
//! - Capability-based embedding API (context builder + engine)

/// Cato runtime version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod api;
pub mod ast;
pub mod diagnostic;
pub mod interpreter;
pub mod lexer;
pub mod parser;
pub mod security;
pub mod span;
pub mod stdlib;
pub mod token;
pub mod value;

// Re-export commonly used types
pub use api::{
    Capabilities, ContextBuilder, ContextError, Engine, ExecError, KvError, KvHandle, MemoryKv,
    Outcome,
};
pub use diagnostic::{Diagnostic, DiagnosticKind};
pub use interpreter::Interpreter;
pub use lexer::Lexer;
pub use parser::{parse_program, Parser};
pub use security::{
    AuditEntry, AuditEvent, AuditLogger, CancelToken, Limits, MemoryAuditLogger, SandboxError,
};
pub use span::Span;
pub use token::{Token, TokenKind};
pub use value::{RuntimeError, Value};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_matches_manifest() {
        assert_eq!(VERSION, env!("CARGO_PKG_VERSION"));
    }
}
