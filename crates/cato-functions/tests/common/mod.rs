//! Shared helpers for dispatcher and HTTP tests

#![allow(dead_code)]

use cato_functions::{
    Dispatcher, DispatcherConfig, KvStore, MemoryStore, Namespace, ProjectRecord, ProjectStore,
    StoreError, StoreResult,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub use pretty_assertions::assert_eq;

/// Create a project whose `server.py` is `source`
pub fn deploy<S: ProjectStore>(store: &S, source: &str) -> ProjectRecord {
    let project = store.create_project("test").unwrap();
    store
        .put_file(&project, "server.py", source.as_bytes())
        .unwrap();
    project
}

/// In-memory store plus a dispatcher over it with default settings
pub fn memory_dispatcher() -> (Arc<MemoryStore>, Dispatcher) {
    let store = Arc::new(MemoryStore::new());
    let dispatcher = Dispatcher::with_store(store.clone(), DispatcherConfig::default());
    (store, dispatcher)
}

/// Key-value wrapper that counts every call reaching the backend
#[derive(Default)]
pub struct CountingKv {
    inner: MemoryStore,
    calls: AtomicUsize,
}

impl CountingKv {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn hit(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

impl KvStore for CountingKv {
    fn get(&self, ns: Namespace, key: &str) -> StoreResult<Option<String>> {
        self.hit();
        self.inner.get(ns, key)
    }

    fn set(&self, ns: Namespace, key: &str, value: &str) -> StoreResult<()> {
        self.hit();
        self.inner.set(ns, key, value)
    }

    fn delete(&self, ns: Namespace, key: &str) -> StoreResult<bool> {
        self.hit();
        self.inner.delete(ns, key)
    }

    fn list(&self, ns: Namespace) -> StoreResult<Vec<(String, String)>> {
        self.hit();
        self.inner.list(ns)
    }

    fn clear(&self, ns: Namespace) -> StoreResult<usize> {
        self.hit();
        self.inner.clear(ns)
    }
}

/// Backend whose every call fails
pub struct FailingKv;

impl KvStore for FailingKv {
    fn get(&self, _ns: Namespace, _key: &str) -> StoreResult<Option<String>> {
        Err(StoreError::Backend("database is locked".to_string()))
    }

    fn set(&self, _ns: Namespace, _key: &str, _value: &str) -> StoreResult<()> {
        Err(StoreError::Backend("database is locked".to_string()))
    }

    fn delete(&self, _ns: Namespace, _key: &str) -> StoreResult<bool> {
        Err(StoreError::Backend("database is locked".to_string()))
    }

    fn list(&self, _ns: Namespace) -> StoreResult<Vec<(String, String)>> {
        Err(StoreError::Backend("database is locked".to_string()))
    }

    fn clear(&self, _ns: Namespace) -> StoreResult<usize> {
        Err(StoreError::Backend("database is locked".to_string()))
    }
}
