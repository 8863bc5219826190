//! Sandbox security
//!
//! Scripts run with no ambient authority. Everything they can touch is
//! handed to them as a capability, and every run is metered.
//!
//! # Architecture
//!
//! - **Limits**: per-run budgets taken from `[limits]` in `cato.toml`
//! - **Budget**: step, deadline, call depth and output accounting for one run
//! - **Policy**: which modules may be imported and which attributes resolved
//! - **Audit**: structured record of denied operations and quota violations
//!
//! # Example
//!
//! ```
//! use cato_runtime::security::{policy, Limits};
//!
//! let limits = Limits::default();
//! assert!(limits.max_steps > 0);
//! assert!(policy::allowed_module("json").is_some());
//! assert!(policy::allowed_module("os").is_none());
//! ```

pub mod audit;
pub mod policy;
pub mod sandbox;

pub use audit::{AuditEntry, AuditEvent, AuditLogger, MemoryAuditLogger, TracingAuditLogger};
pub use sandbox::{Budget, CancelToken, Limits, SandboxError};
