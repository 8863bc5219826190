//! Execution context: the capability bundle handed to one script run
//!
//! A script can reach only what is bound here: the read-only `request`
//! mapping, the project-scoped `db` handle, `print` output capture, the
//! builtin primitives and the allow-listed `json`/`hashlib` modules.

use crate::interpreter::Interpreter;
use crate::security::{AuditLogger, CancelToken, Limits, TracingAuditLogger};
use crate::stdlib::json::from_json;
use crate::value::{ModuleKind, Value};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use thiserror::Error;

/// Failure reported by a key-value backend
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{0}")]
pub struct KvError(pub String);

impl KvError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Key-value capability bound to one project's namespace
///
/// Implementations must make a single `set` atomic. A failing call aborts
/// the script with a storage error that `try/except` cannot catch.
pub trait KvHandle: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, KvError>;
    fn set(&self, key: &str, value: &str) -> Result<(), KvError>;
}

/// Process-local store, for tests and standalone runs
#[derive(Debug, Default)]
pub struct MemoryKv {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every entry
    pub fn snapshot(&self) -> HashMap<String, String> {
        self.entries
            .read()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }
}

impl KvHandle for MemoryKv {
    fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        let entries = self
            .entries
            .read()
            .map_err(|_| KvError::new("memory store lock poisoned"))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), KvError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| KvError::new("memory store lock poisoned"))?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Errors while assembling a context
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ContextError {
    #[error("request payload must be a JSON object, not {0}")]
    PayloadNotObject(&'static str),
}

/// Everything one invocation may touch
#[derive(Clone)]
pub struct Capabilities {
    payload: serde_json::Value,
    kv: Arc<dyn KvHandle>,
    cancel: CancelToken,
    limits: Limits,
    audit: Arc<dyn AuditLogger>,
}

impl std::fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Capabilities")
            .field("payload", &self.payload)
            .field("limits", &self.limits)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl Capabilities {
    pub fn payload(&self) -> &serde_json::Value {
        &self.payload
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    /// Token that aborts the run when cancelled
    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub(crate) fn kv(&self) -> Arc<dyn KvHandle> {
        self.kv.clone()
    }

    pub(crate) fn audit(&self) -> Arc<dyn AuditLogger> {
        self.audit.clone()
    }

    /// Bind the script-visible globals
    pub(crate) fn install(&self, interpreter: &mut Interpreter) {
        let request = from_json(&self.payload);
        if let Value::Dict(dict) = &request {
            dict.borrow_mut().freeze();
        }
        interpreter.set_global("request", request);
        interpreter.set_global("db", Value::Db);
        interpreter.set_global("response", Value::None);
        interpreter.set_global("json", Value::Module(ModuleKind::Json));
        interpreter.set_global("hashlib", Value::Module(ModuleKind::Hashlib));
    }
}

/// Builder for [`Capabilities`]
///
/// # Example
///
/// ```
/// use cato_runtime::api::{ContextBuilder, MemoryKv};
/// use std::sync::Arc;
///
/// let caps = ContextBuilder::new(Arc::new(MemoryKv::new()))
///     .payload(serde_json::json!({"action": "hello"}))
///     .build()
///     .unwrap();
/// assert_eq!(caps.payload()["action"], "hello");
/// ```
pub struct ContextBuilder {
    payload: serde_json::Value,
    kv: Arc<dyn KvHandle>,
    cancel: CancelToken,
    limits: Limits,
    audit: Arc<dyn AuditLogger>,
}

impl ContextBuilder {
    pub fn new(kv: Arc<dyn KvHandle>) -> Self {
        Self {
            payload: serde_json::Value::Null,
            kv,
            cancel: CancelToken::new(),
            limits: Limits::default(),
            audit: Arc::new(TracingAuditLogger),
        }
    }

    /// Request payload; `null` becomes an empty mapping
    pub fn payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    pub fn cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn audit(mut self, audit: Arc<dyn AuditLogger>) -> Self {
        self.audit = audit;
        self
    }

    pub fn build(self) -> Result<Capabilities, ContextError> {
        let payload = match self.payload {
            serde_json::Value::Null => serde_json::Value::Object(Default::default()),
            object @ serde_json::Value::Object(_) => object,
            other => return Err(ContextError::PayloadNotObject(json_kind(&other))),
        };
        Ok(Capabilities {
            payload,
            kv: self.kv,
            cancel: self.cancel,
            limits: self.limits,
            audit: self.audit,
        })
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn builder() -> ContextBuilder {
        ContextBuilder::new(Arc::new(MemoryKv::new()))
    }

    #[test]
    fn test_null_payload_becomes_empty_object() {
        let caps = builder().build().unwrap();
        assert_eq!(caps.payload(), &json!({}));
    }

    #[rstest]
    #[case(json!([1, 2]), "an array")]
    #[case(json!("text"), "a string")]
    #[case(json!(3), "a number")]
    fn test_non_object_payload_rejected(#[case] payload: serde_json::Value, #[case] kind: &str) {
        let err = builder().payload(payload).build().unwrap_err();
        assert_eq!(
            err.to_string(),
            format!("request payload must be a JSON object, not {}", kind)
        );
    }

    #[test]
    fn test_memory_kv_round_trip() {
        let kv = MemoryKv::new();
        assert_eq!(kv.get("visits").unwrap(), None);
        kv.set("visits", "1").unwrap();
        kv.set("visits", "2").unwrap();
        assert_eq!(kv.get("visits").unwrap(), Some("2".to_string()));
        assert_eq!(kv.snapshot().len(), 1);
    }

    #[test]
    fn test_limits_and_cancel_carried() {
        let cancel = CancelToken::new();
        let caps = builder()
            .limits(Limits::default().with_max_steps(10))
            .cancel_token(cancel.clone())
            .build()
            .unwrap();
        assert_eq!(caps.limits().max_steps, 10);
        cancel.cancel();
        assert!(caps.cancel_token().is_cancelled());
    }
}
