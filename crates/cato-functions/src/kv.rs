//! Per-project key-value namespaces
//!
//! Every entry lives under a [`Namespace`], and a namespace can only be
//! obtained from a resolved [`ProjectRecord`]. The storage layer therefore
//! never sees an unscoped key, and a script only ever reaches its own
//! project's entries through [`ScopedKv`].

use crate::error::StoreResult;
use crate::project::{ProjectId, ProjectRecord};
use cato_runtime::{KvError, KvHandle};
use std::fmt;
use std::sync::Arc;

/// Key space of one project
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Namespace(ProjectId);

impl Namespace {
    pub fn project_id(self) -> ProjectId {
        self.0
    }
}

impl From<&ProjectRecord> for Namespace {
    fn from(project: &ProjectRecord) -> Self {
        Namespace(project.id())
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "project:{}", self.0)
    }
}

/// Namespaced string store
///
/// A single `set` must be atomic. No ordering is promised between writers
/// beyond last-write-wins per key.
pub trait KvStore: Send + Sync {
    fn get(&self, ns: Namespace, key: &str) -> StoreResult<Option<String>>;

    /// Insert or overwrite
    fn set(&self, ns: Namespace, key: &str, value: &str) -> StoreResult<()>;

    /// Returns whether the key existed
    fn delete(&self, ns: Namespace, key: &str) -> StoreResult<bool>;

    /// Every entry of the namespace, sorted by key
    fn list(&self, ns: Namespace) -> StoreResult<Vec<(String, String)>>;

    /// Remove every entry of the namespace; returns how many were removed
    fn clear(&self, ns: Namespace) -> StoreResult<usize>;
}

/// The `db` capability handed to one invocation
pub struct ScopedKv {
    store: Arc<dyn KvStore>,
    namespace: Namespace,
}

impl ScopedKv {
    pub fn new(store: Arc<dyn KvStore>, namespace: Namespace) -> Self {
        Self { store, namespace }
    }

    pub fn namespace(&self) -> Namespace {
        self.namespace
    }
}

impl fmt::Debug for ScopedKv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedKv")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

impl KvHandle for ScopedKv {
    fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        self.store.get(self.namespace, key).map_err(|err| {
            tracing::error!(namespace = %self.namespace, error = %err, "kv get failed");
            KvError::new(err.to_string())
        })
    }

    fn set(&self, key: &str, value: &str) -> Result<(), KvError> {
        self.store.set(self.namespace, key, value).map_err(|err| {
            tracing::error!(namespace = %self.namespace, error = %err, "kv set failed");
            KvError::new(err.to_string())
        })
    }
}
