//! Shared helpers for runtime integration tests

#![allow(dead_code)]

use cato_runtime::api::{ContextBuilder, Engine, ExecError, MemoryKv, Outcome};
use cato_runtime::security::Limits;
use serde_json::Value as Json;
use std::sync::Arc;

pub use pretty_assertions::assert_eq;

/// Run a script with an empty payload and a fresh store
pub fn run(source: &str) -> Result<Outcome, ExecError> {
    run_with(source, Json::Null, Limits::default())
}

pub fn run_with(source: &str, payload: Json, limits: Limits) -> Result<Outcome, ExecError> {
    run_on(source, payload, limits, Arc::new(MemoryKv::new()))
}

pub fn run_on(
    source: &str,
    payload: Json,
    limits: Limits,
    kv: Arc<MemoryKv>,
) -> Result<Outcome, ExecError> {
    let caps = ContextBuilder::new(kv)
        .payload(payload)
        .limits(limits)
        .build()
        .expect("payload is an object");
    Engine::new().execute(source, caps)
}

/// Final `response` of a script that must succeed
pub fn response(source: &str) -> Json {
    match run(source) {
        Ok(outcome) => outcome.result.unwrap_or(Json::Null),
        Err(err) => panic!("script failed: {}\n---\n{}", err, source),
    }
}

/// Assert that `response` ends up equal to `expected`
pub fn assert_response(source: &str, expected: Json) {
    assert_eq!(response(source), expected, "script:\n{}", source);
}

/// Captured output of a script that must succeed
pub fn logs(source: &str) -> String {
    match run(source) {
        Ok(outcome) => outcome.logs,
        Err(err) => panic!("script failed: {}\n---\n{}", err, source),
    }
}

/// Assert an uncaught exception of class `kind`; returns the message
pub fn assert_raises(source: &str, kind: &str) -> String {
    match run(source) {
        Err(ExecError::Runtime {
            kind: actual,
            message,
            ..
        }) => {
            assert_eq!(actual, kind, "message: {}", message);
            message
        }
        other => panic!("expected {}, got {:?}\n---\n{}", kind, other, source),
    }
}
