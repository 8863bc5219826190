//! Storage backends
//!
//! Both backends implement [`ProjectStore`](crate::ProjectStore) and
//! [`KvStore`](crate::KvStore):
//! - [`SqliteStore`]: durable, used by `cato serve` and the admin commands
//! - [`MemoryStore`]: process-local, used by `cato run` and tests

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
