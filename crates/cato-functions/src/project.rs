//! Projects and their files
//!
//! A project is addressed two ways: an internal integer id that keys its
//! files and key-value entries, and an opaque public id (a UUID v4 string)
//! that callers use to invoke it. Records are only produced by a
//! [`ProjectStore`], so holding one proves the project was resolved.

use crate::error::StoreResult;
use serde::Serialize;
use std::fmt;

/// Internal project identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ProjectId(i64);

impl ProjectId {
    pub(crate) fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A resolved project
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectRecord {
    id: ProjectId,
    public_id: String,
    name: String,
}

impl ProjectRecord {
    pub(crate) fn new(id: ProjectId, public_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id,
            public_id: public_id.into(),
            name: name.into(),
        }
    }

    pub fn id(&self) -> ProjectId {
        self.id
    }

    /// Opaque id used in invocation URLs
    pub fn public_id(&self) -> &str {
        &self.public_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Fresh public id for a new project
pub(crate) fn new_public_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Project and file persistence consumed by the dispatcher
pub trait ProjectStore: Send + Sync {
    /// Create an empty project with a fresh public id
    fn create_project(&self, name: &str) -> StoreResult<ProjectRecord>;

    /// Look a project up by its public id
    fn resolve(&self, public_id: &str) -> StoreResult<Option<ProjectRecord>>;

    /// All projects, oldest first
    fn list_projects(&self) -> StoreResult<Vec<ProjectRecord>>;

    /// Create or replace the file at `path`
    fn put_file(&self, project: &ProjectRecord, path: &str, content: &[u8]) -> StoreResult<()>;

    fn get_file(&self, project: &ProjectRecord, path: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Remove a project together with its files and key-value entries.
    /// Returns false when it was already gone.
    fn delete_project(&self, project: &ProjectRecord) -> StoreResult<bool>;
}
