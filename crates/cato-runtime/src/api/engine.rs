//! Sandboxed execution engine
//!
//! Runs one script to completion on a dedicated worker thread. The
//! interpreter, its values and its budget are created on that thread and
//! never leave it; only the JSON result, the captured log and a plain
//! error value cross back to the caller.
//!
//! # Examples
//!
//! ```
//! use cato_runtime::api::{ContextBuilder, Engine, MemoryKv};
//! use std::sync::Arc;
//!
//! let caps = ContextBuilder::new(Arc::new(MemoryKv::new()))
//!     .payload(serde_json::json!({"name": "cato"}))
//!     .build()
//!     .unwrap();
//! let outcome = Engine::new()
//!     .execute("response = {'hello': request.get('name')}", caps)
//!     .unwrap();
//! assert_eq!(outcome.result, Some(serde_json::json!({"hello": "cato"})));
//! ```

use crate::api::context::Capabilities;
use crate::diagnostic::Diagnostic;
use crate::interpreter::Interpreter;
use crate::parser::parse_program;
use crate::security::{Budget, SandboxError};
use crate::stdlib::json::to_json;
use crate::value::{RuntimeError, Value};
use std::time::Instant;
use thiserror::Error;

/// Name of the script worker threads
const WORKER_THREAD_NAME: &str = "cato-script";

/// Result of a successful run
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    /// Final value of `response`; `None` when it was left as `None`
    pub result: Option<serde_json::Value>,
    /// Everything the script printed
    pub logs: String,
    /// Interpreter steps consumed
    pub steps: u64,
}

/// Why a run failed
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ExecError {
    /// Lexical, indentation or syntax error
    #[error("{}", first_diagnostic(.0))]
    Compile(Vec<Diagnostic>),

    /// Uncaught script exception
    #[error("{message}")]
    Runtime {
        /// `Kind: description (line N)`
        message: String,
        /// Exception class name
        kind: String,
        line: Option<u32>,
    },

    /// A resource budget was exhausted
    #[error("{0}")]
    ResourceLimit(SandboxError),

    /// The key-value backend failed
    #[error("storage error: {0}")]
    Storage(String),

    /// The host cancelled the run
    #[error("execution cancelled")]
    Cancelled,

    /// The worker could not be started or died
    #[error("internal error: {0}")]
    Internal(String),
}

fn first_diagnostic(diagnostics: &[Diagnostic]) -> String {
    match diagnostics.first() {
        Some(diagnostic) => diagnostic.to_string(),
        None => "SyntaxError: invalid syntax".to_string(),
    }
}

impl ExecError {
    /// Whether the failure is attributable to the script itself
    pub fn is_user_error(&self) -> bool {
        matches!(self, ExecError::Compile(_) | ExecError::Runtime { .. })
    }
}

impl From<RuntimeError> for ExecError {
    fn from(err: RuntimeError) -> Self {
        match err {
            RuntimeError::Exception { ref exc, .. } => ExecError::Runtime {
                kind: exc.kind.name().to_string(),
                line: err.line(),
                message: err.to_string(),
            },
            RuntimeError::Limit(limit) => ExecError::ResourceLimit(limit),
            RuntimeError::Storage(message) => ExecError::Storage(message),
            RuntimeError::Cancelled => ExecError::Cancelled,
        }
    }
}

/// Executes scripts against a capability bundle
#[derive(Debug, Clone, Default)]
pub struct Engine {
    _private: (),
}

impl Engine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile without running
    pub fn check(&self, source: &str) -> Result<(), ExecError> {
        parse_program(source)
            .map(|_| ())
            .map_err(ExecError::Compile)
    }

    /// Run `source` once against `caps`
    ///
    /// Blocks the calling thread until the worker finishes. Cancel the
    /// bundle's token to stop it early.
    pub fn execute(&self, source: &str, caps: Capabilities) -> Result<Outcome, ExecError> {
        let limits = caps.limits().clone();
        if source.len() > limits.max_source_bytes {
            return Err(ExecError::ResourceLimit(SandboxError::SourceTooLarge {
                size: source.len(),
                limit: limits.max_source_bytes,
            }));
        }

        let source = source.to_string();
        let started = Instant::now();
        let worker = std::thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .stack_size(limits.stack_size)
            .spawn(move || run_script(&source, caps))
            .map_err(|err| ExecError::Internal(format!("failed to start script worker: {}", err)))?;

        let result = worker
            .join()
            .map_err(|_| ExecError::Internal("script worker panicked".to_string()))?;

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(outcome) => tracing::debug!(steps = outcome.steps, elapsed_ms, "script finished"),
            Err(err) if err.is_user_error() => {
                tracing::debug!(elapsed_ms, error = %err, "script failed")
            }
            Err(err) => tracing::warn!(elapsed_ms, error = %err, "script aborted"),
        }
        result
    }
}

/// Body of the worker thread
fn run_script(source: &str, caps: Capabilities) -> Result<Outcome, ExecError> {
    let program = parse_program(source).map_err(ExecError::Compile)?;

    let budget = Budget::new(caps.limits().clone(), caps.cancel_token().clone());
    let mut interpreter = Interpreter::new(budget, caps.kv(), caps.audit());
    caps.install(&mut interpreter);

    interpreter.run(&program)?;

    let result = match interpreter.global("response") {
        None | Some(Value::None) => None,
        Some(response) => Some(to_json(response)?),
    };
    Ok(Outcome {
        result,
        logs: interpreter.take_output(),
        steps: interpreter.steps(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ContextBuilder, MemoryKv};
    use crate::security::Limits;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;

    fn run(source: &str) -> Result<Outcome, ExecError> {
        let caps = ContextBuilder::new(Arc::new(MemoryKv::new())).build().unwrap();
        Engine::new().execute(source, caps)
    }

    #[test]
    fn test_response_absent_when_none() {
        let outcome = run("x = 1").unwrap();
        assert_eq!(outcome.result, None);
        assert_eq!(outcome.logs, "");
        assert!(outcome.steps > 0);
    }

    #[test]
    fn test_logs_captured() {
        let outcome = run("print('a', 1)\nprint('b', end='')").unwrap();
        assert_eq!(outcome.logs, "a 1\nb");
    }

    #[test]
    fn test_compile_error_message() {
        let err = run("x = (1").unwrap_err();
        assert!(matches!(err, ExecError::Compile(_)));
        assert!(err.to_string().starts_with("SyntaxError"));
    }

    #[test]
    fn test_runtime_error_carries_kind_and_line() {
        let err = run("x = 1\ny = missing").unwrap_err();
        assert_eq!(
            err,
            ExecError::Runtime {
                message: "NameError: name 'missing' is not defined (line 2)".to_string(),
                kind: "NameError".to_string(),
                line: Some(2),
            }
        );
    }

    #[test]
    fn test_unserializable_response() {
        let err = run("def f():\n    pass\nresponse = f").unwrap_err();
        assert!(matches!(err, ExecError::Runtime { ref kind, .. } if kind == "TypeError"));
    }

    #[test]
    fn test_source_size_limit() {
        let caps = ContextBuilder::new(Arc::new(MemoryKv::new()))
            .limits(Limits::default().with_max_source_bytes(8))
            .build()
            .unwrap();
        let err = Engine::new().execute("response = 12345", caps).unwrap_err();
        assert!(matches!(
            err,
            ExecError::ResourceLimit(SandboxError::SourceTooLarge { size: 16, limit: 8 })
        ));
    }

    #[test]
    fn test_payload_is_bound() {
        let caps = ContextBuilder::new(Arc::new(MemoryKv::new()))
            .payload(json!({"n": 20}))
            .build()
            .unwrap();
        let outcome = Engine::new()
            .execute("response = request.get('n') + 1", caps)
            .unwrap();
        assert_eq!(outcome.result, Some(json!(21)));
    }

    #[test]
    fn test_check_does_not_run() {
        assert!(Engine::new().check("print(undefined)").is_ok());
        assert!(Engine::new().check("if:").is_err());
    }
}
