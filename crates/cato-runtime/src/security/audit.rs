//! Security audit logging
//!
//! Records denied operations and quota violations so operators can see
//! what scripts attempted.

use std::fmt;
use std::sync::{Arc, Mutex};

/// Security audit event types
#[derive(Debug, Clone, PartialEq)]
pub enum AuditEvent {
    /// Import of a module outside the allow-list
    ImportDenied { module: String },
    /// Attribute lookup rejected by policy (private or unknown)
    AttributeDenied { type_name: String, attribute: String },
    /// Resource budget exhausted
    QuotaViolation { resource: String, limit: u64 },
    /// Host cancelled the run
    Cancelled,
}

impl fmt::Display for AuditEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditEvent::ImportDenied { module } => {
                write!(f, "Import denied: {}", module)
            }
            AuditEvent::AttributeDenied {
                type_name,
                attribute,
            } => {
                write!(f, "Attribute denied: {}.{}", type_name, attribute)
            }
            AuditEvent::QuotaViolation { resource, limit } => {
                write!(f, "Quota violation: {} (limit: {})", resource, limit)
            }
            AuditEvent::Cancelled => write!(f, "Run cancelled by host"),
        }
    }
}

/// Audit log entry with the interpreter step it happened at
#[derive(Debug, Clone, PartialEq)]
pub struct AuditEntry {
    pub step: u64,
    pub event: AuditEvent,
}

impl AuditEntry {
    /// Format as log line
    pub fn to_log_line(&self) -> String {
        format!("[step {}] {}", self.step, self.event)
    }
}

/// Audit logger trait for customizable logging backends
pub trait AuditLogger: Send + Sync {
    /// Log an audit event
    fn log(&self, entry: AuditEntry);

    /// Logged entries, oldest first (empty for write-only backends)
    fn entries(&self) -> Vec<AuditEntry> {
        Vec::new()
    }
}

/// Forwards audit events to `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditLogger;

impl AuditLogger for TracingAuditLogger {
    fn log(&self, entry: AuditEntry) {
        tracing::warn!(target: "cato::audit", step = entry.step, "{}", entry.event);
    }
}

/// In-memory audit logger
#[derive(Debug, Clone, Default)]
pub struct MemoryAuditLogger {
    entries: Arc<Mutex<Vec<AuditEntry>>>,
}

impl MemoryAuditLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }
}

impl AuditLogger for MemoryAuditLogger {
    fn log(&self, entry: AuditEntry) {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(entry);
    }

    fn entries(&self) -> Vec<AuditEntry> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_logger_keeps_order() {
        let logger = MemoryAuditLogger::new();
        logger.log(AuditEntry {
            step: 3,
            event: AuditEvent::ImportDenied {
                module: "os".to_string(),
            },
        });
        logger.log(AuditEntry {
            step: 9,
            event: AuditEvent::Cancelled,
        });

        let entries = logger.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].to_log_line(), "[step 3] Import denied: os");

        logger.clear();
        assert!(logger.entries().is_empty());
    }

    #[test]
    fn test_event_display() {
        let event = AuditEvent::AttributeDenied {
            type_name: "str".to_string(),
            attribute: "__class__".to_string(),
        };
        assert_eq!(event.to_string(), "Attribute denied: str.__class__");
    }
}
