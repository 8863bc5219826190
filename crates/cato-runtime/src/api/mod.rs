//! Public embedding API
//!
//! - [`ContextBuilder`] assembles the per-invocation [`Capabilities`]
//! - [`Engine`] runs a script against them and returns an [`Outcome`]
//! - [`KvHandle`] is the storage capability a host plugs in

pub mod context;
pub mod engine;

pub use context::{Capabilities, ContextBuilder, ContextError, KvError, KvHandle, MemoryKv};
pub use engine::{Engine, ExecError, Outcome};
