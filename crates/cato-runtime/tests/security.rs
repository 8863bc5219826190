//! Sandbox boundaries: unbound names, attribute policy, budgets,
//! cancellation and storage failures

mod common;

use common::{assert_eq, assert_raises, run, run_on, run_with};
use cato_runtime::api::{ContextBuilder, Engine, ExecError, KvError, KvHandle, MemoryKv};
use cato_runtime::security::policy::UNBOUND_NAMES;
use cato_runtime::security::{AuditEvent, AuditLogger, CancelToken, Limits, MemoryAuditLogger, SandboxError};
use rstest::rstest;
use serde_json::json;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Backend whose every call fails
struct BrokenKv;

impl KvHandle for BrokenKv {
    fn get(&self, _key: &str) -> Result<Option<String>, KvError> {
        Err(KvError::new("database is locked"))
    }

    fn set(&self, _key: &str, _value: &str) -> Result<(), KvError> {
        Err(KvError::new("database is locked"))
    }
}

fn run_audited(source: &str) -> (Result<(), ExecError>, Vec<AuditEvent>) {
    let logger = MemoryAuditLogger::new();
    let caps = ContextBuilder::new(Arc::new(MemoryKv::new()))
        .audit(Arc::new(logger.clone()))
        .build()
        .unwrap();
    let result = Engine::new().execute(source, caps).map(|_| ());
    let events = logger.entries().into_iter().map(|entry| entry.event).collect();
    (result, events)
}

fn limit_error(source: &str, limits: Limits) -> SandboxError {
    match run_with(source, json!({}), limits) {
        Err(ExecError::ResourceLimit(limit)) => limit,
        other => panic!("expected a resource limit, got {:?}", other),
    }
}

// ============================================================================
// Host access
// ============================================================================

#[test]
fn test_dangerous_names_are_unbound() {
    for name in UNBOUND_NAMES {
        let message = assert_raises(&format!("x = {}", name), "NameError");
        assert_eq!(message, format!("NameError: name '{}' is not defined (line 1)", name));
    }
}

#[rstest]
#[case("import os")]
#[case("import sys")]
#[case("import subprocess")]
#[case("from os import path")]
#[case("import json.decoder")]
fn test_host_modules_cannot_be_imported(#[case] source: &str) {
    let err = run(source).unwrap_err();
    assert!(
        matches!(err, ExecError::Runtime { ref kind, .. } if kind == "ModuleNotFoundError"),
        "{:?}",
        err
    );
}

#[test]
fn test_import_failure_is_an_import_error() {
    let source = "
try:
    import os
except ImportError as e:
    response = str(e)
";
    let outcome = run(source).unwrap();
    assert_eq!(outcome.result, Some(json!("No module named 'os'")));
}

#[rstest]
#[case("().__class__")]
#[case("''.__class__")]
#[case("request.__class__")]
#[case("db._store")]
#[case("json.__dict__")]
#[case("print.__self__")]
fn test_private_attributes_are_rejected(#[case] expr: &str) {
    assert_raises(&format!("x = {}", expr), "AttributeError");
}

#[test]
fn test_audit_records_denials() {
    let (result, events) = run_audited("import os");
    assert!(result.is_err());
    assert_eq!(
        events,
        vec![AuditEvent::ImportDenied {
            module: "os".to_string()
        }]
    );

    let (result, events) = run_audited("x = [].__class__");
    assert!(result.is_err());
    assert_eq!(
        events,
        vec![AuditEvent::AttributeDenied {
            type_name: "list".to_string(),
            attribute: "__class__".to_string(),
        }]
    );
}

#[test]
fn test_audit_ignores_ordinary_misses() {
    let (result, events) = run_audited("try:\n    [].push(1)\nexcept AttributeError:\n    pass");
    assert!(result.is_ok());
    assert!(events.is_empty());
}

// ============================================================================
// Budgets
// ============================================================================

#[test]
fn test_step_limit() {
    let limit = limit_error("while True:\n    pass", Limits::default().with_max_steps(1_000));
    assert_eq!(limit, SandboxError::StepLimitExceeded { limit: 1_000 });
}

#[test]
fn test_timeout() {
    let limits = Limits::default()
        .with_max_steps(u64::MAX / 2)
        .with_timeout(Duration::from_millis(50));
    let started = Instant::now();
    let limit = limit_error("x = 0\nwhile True:\n    x += 1", limits);
    assert_eq!(
        limit,
        SandboxError::TimeoutExceeded {
            limit: Duration::from_millis(50)
        }
    );
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[test]
fn test_call_depth_limit() {
    let source = "
def down(n):
    return down(n + 1)
down(0)
";
    let limit = limit_error(source, Limits::default().with_max_call_depth(40));
    assert_eq!(limit, SandboxError::CallDepthExceeded { limit: 40 });
}

#[test]
fn test_legal_recursion_fits_default_limits() {
    let source = "
def depth(n):
    if n == 0:
        return 0
    return 1 + depth(n - 1)
response = depth(90)
";
    assert_eq!(run(source).unwrap().result, Some(json!(90)));
}

#[rstest]
#[case("response = 1", "+1")]
#[case("response = True", " or True")]
#[case("response = request", ".get")]
#[case("response = [0]", "[0]")]
fn test_long_chains_fail_to_compile(#[case] head: &str, #[case] link: &str) {
    let source = format!("{}{}", head, link.repeat(32_000));
    let limits = Limits::default().with_max_source_bytes(source.len());
    match run_with(&source, json!({}), limits) {
        Err(ExecError::Compile(diagnostics)) => {
            let message = diagnostics[0].to_string();
            assert!(message.contains("too many nested"), "{}", message);
        }
        other => panic!("expected a compile error, got {:?}", other),
    }
}

#[test]
fn test_memory_limit_bounds_retained_copies() {
    let source = "
base = [0] * 10000
keep = []
while True:
    keep.append(base * 1)
";
    let limit = limit_error(source, Limits::default().with_max_memory_bytes(4 * 1024 * 1024));
    assert_eq!(
        limit,
        SandboxError::MemoryLimitExceeded {
            limit: 4 * 1024 * 1024
        }
    );
}

#[test]
fn test_memory_limit_counts_strings() {
    let source = "
chunk = 'x' * 1000
keep = []
for i in range(100):
    keep.append(chunk + str(i))
";
    let limit = limit_error(source, Limits::default().with_max_memory_bytes(50_000));
    assert_eq!(limit, SandboxError::MemoryLimitExceeded { limit: 50_000 });
}

#[test]
fn test_output_limit() {
    let limit = limit_error(
        "for i in range(100):\n    print('0123456789')",
        Limits::default().with_max_output_bytes(64),
    );
    assert_eq!(limit, SandboxError::OutputLimitExceeded { limit: 64 });
}

#[rstest]
#[case("s = 'a' * 2000")]
#[case("s = 'ab' * 600")]
#[case("s = '{:>2000}'.format('x')")]
fn test_string_limit(#[case] source: &str) {
    let limit = limit_error(source, Limits::default().with_max_string_bytes(1_000));
    assert!(
        matches!(limit, SandboxError::StringTooLarge { limit: 1_000, .. }),
        "{:?}",
        limit
    );
}

#[test]
fn test_string_doubling_is_bounded() {
    let source = "
s = 'x'
while True:
    s = s + s
";
    let limit = limit_error(source, Limits::default().with_max_string_bytes(4_096));
    assert_eq!(
        limit,
        SandboxError::StringTooLarge {
            size: 8_192,
            limit: 4_096
        }
    );
}

#[rstest]
#[case("items = [0] * 2000")]
#[case("items = list(range(2000))")]
#[case("items = [i for i in range(2000)]")]
#[case("items = []\nwhile True:\n    items.append(1)")]
fn test_collection_limit(#[case] source: &str) {
    let limit = limit_error(source, Limits::default().with_max_collection_len(1_000));
    assert!(
        matches!(limit, SandboxError::CollectionTooLarge { limit: 1_000, .. }),
        "{:?}",
        limit
    );
}

#[test]
fn test_limits_cannot_be_caught() {
    let source = "
try:
    while True:
        pass
except Exception:
    response = 'escaped'
";
    let limit = limit_error(source, Limits::default().with_max_steps(500));
    assert_eq!(limit, SandboxError::StepLimitExceeded { limit: 500 });
}

#[test]
fn test_quota_violation_is_audited() {
    let logger = MemoryAuditLogger::new();
    let caps = ContextBuilder::new(Arc::new(MemoryKv::new()))
        .limits(Limits::default().with_max_steps(100))
        .audit(Arc::new(logger.clone()))
        .build()
        .unwrap();
    let result = Engine::new().execute("while True:\n    pass", caps);

    assert!(matches!(result, Err(ExecError::ResourceLimit(_))));
    assert_eq!(
        logger.entries().last().map(|entry| entry.event.clone()),
        Some(AuditEvent::QuotaViolation {
            resource: "steps".to_string(),
            limit: 100,
        })
    );
}

// ============================================================================
// Cancellation
// ============================================================================

#[test]
fn test_cancellation_stops_the_run() {
    let cancel = CancelToken::new();
    let caps = ContextBuilder::new(Arc::new(MemoryKv::new()))
        .limits(
            Limits::default()
                .with_max_steps(u64::MAX / 2)
                .with_timeout(Duration::from_secs(60)),
        )
        .cancel_token(cancel.clone())
        .build()
        .unwrap();

    let canceller = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        cancel.cancel();
    });
    let started = Instant::now();
    let result = Engine::new().execute("while True:\n    pass", caps);
    canceller.join().unwrap();

    assert_eq!(result, Err(ExecError::Cancelled));
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[test]
fn test_cancelled_before_start() {
    let cancel = CancelToken::new();
    cancel.cancel();
    let caps = ContextBuilder::new(Arc::new(MemoryKv::new()))
        .cancel_token(cancel)
        .build()
        .unwrap();
    let source = "for i in range(5000):\n    pass";
    assert_eq!(Engine::new().execute(source, caps), Err(ExecError::Cancelled));
}

// ============================================================================
// Request and storage
// ============================================================================

#[rstest]
#[case("request['x'] = 1", "TypeError: 'request' object does not support item assignment (line 1)")]
#[case("request.pop('a')", "TypeError: 'request' object is read-only (line 1)")]
#[case("request.update({'b': 2})", "TypeError: 'request' object is read-only (line 1)")]
#[case("request.clear()", "TypeError: 'request' object is read-only (line 1)")]
#[case("del request['a']", "TypeError: 'request' object doesn't support item deletion (line 1)")]
fn test_request_is_read_only(#[case] source: &str, #[case] message: &str) {
    match run_with(source, json!({"a": 1}), Limits::default()) {
        Err(ExecError::Runtime { message: actual, .. }) => assert_eq!(actual, message),
        other => panic!("expected TypeError, got {:?}", other),
    }
}

#[test]
fn test_storage_errors_cannot_be_caught() {
    let caps = ContextBuilder::new(Arc::new(BrokenKv)).build().unwrap();
    let source = "
try:
    db.get('k')
except Exception:
    response = 'swallowed'
";
    assert_eq!(
        Engine::new().execute(source, caps),
        Err(ExecError::Storage("database is locked".to_string()))
    );
}

#[test]
fn test_writes_before_a_raise_are_kept() {
    let kv = Arc::new(MemoryKv::new());
    let source = "
db.set('before', '1')
raise ValueError('stop')
db.set('after', '1')
";
    let err = run_on(source, json!({}), Limits::default(), kv.clone()).unwrap_err();

    assert!(matches!(err, ExecError::Runtime { ref kind, .. } if kind == "ValueError"));
    let stored = kv.snapshot();
    assert_eq!(stored.get("before").map(String::as_str), Some("1"));
    assert!(!stored.contains_key("after"));
}

#[test]
fn test_error_messages_do_not_leak_host_details() {
    let err = run("x = undefined_thing").unwrap_err();
    let message = err.to_string();
    assert_eq!(message, "NameError: name 'undefined_thing' is not defined (line 1)");
    assert!(!message.contains(".rs"));
}
