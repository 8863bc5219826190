//! Cato Functions - serverless invocation for published projects
//!
//! This crate wires the script runtime to persistent state:
//! - [`project`]: projects, their files and the public id they are invoked by
//! - [`kv`]: per-project key-value namespaces and the script-facing `db` handle
//! - [`store`]: SQLite and in-memory backends for both
//! - [`dispatch`]: resolve, build the capability bundle, run, report
//! - [`http`]: the axum router exposing invocation over HTTP
//!
//! # Example
//!
//! ```
//! use cato_functions::{Dispatcher, DispatcherConfig, MemoryStore, ProjectStore};
//! use std::sync::Arc;
//!
//! let store = Arc::new(MemoryStore::new());
//! let project = store.create_project("hello").unwrap();
//! store
//!     .put_file(&project, "server.py", b"response = {'ok': True}")
//!     .unwrap();
//!
//! let dispatcher = Dispatcher::with_store(store, DispatcherConfig::default());
//! let invocation = dispatcher.invoke_blocking(project.public_id(), None).unwrap();
//! assert_eq!(invocation.result, Some(serde_json::json!({"ok": true})));
//! ```

pub mod dispatch;
pub mod error;
pub mod http;
pub mod kv;
pub mod project;
pub mod store;

pub use dispatch::{Dispatcher, DispatcherConfig, Invocation};
pub use error::{InvokeError, StoreError, StoreResult};
pub use kv::{KvStore, Namespace, ScopedKv};
pub use project::{ProjectId, ProjectRecord, ProjectStore};
pub use store::{MemoryStore, SqliteStore};
