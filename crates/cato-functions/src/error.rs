//! Error types for the store and the dispatcher

use cato_runtime::ExecError;
use thiserror::Error;

/// Failures of the project or key-value backend
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("failed to prepare database location: {0}")]
    Io(#[from] std::io::Error),

    /// Another thread panicked while holding the store lock
    #[error("store lock poisoned")]
    Poisoned,

    /// Failure reported back through the script's `db` handle
    #[error("{0}")]
    Backend(String),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Why an invocation did not produce a result
#[derive(Error, Debug)]
pub enum InvokeError {
    #[error("Project not found. Make sure to deploy your project first.")]
    ProjectNotFound,

    /// The project has no file at the configured script path
    #[error("No {0} file found in project")]
    ScriptNotFound(String),

    #[error("{0}")]
    ScriptCompileError(String),

    #[error("{0}")]
    ScriptRuntimeError(String),

    #[error("{0}")]
    ResourceLimitExceeded(String),

    #[error("storage error: {0}")]
    StorageError(#[from] StoreError),

    #[error("{0}")]
    BadRequest(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl InvokeError {
    /// Stable name of the failure class
    pub fn kind(&self) -> &'static str {
        match self {
            InvokeError::ProjectNotFound => "project_not_found",
            InvokeError::ScriptNotFound(_) => "script_not_found",
            InvokeError::ScriptCompileError(_) => "compile_error",
            InvokeError::ScriptRuntimeError(_) => "runtime_error",
            InvokeError::ResourceLimitExceeded(_) => "resource_limit",
            InvokeError::StorageError(_) => "storage_error",
            InvokeError::BadRequest(_) => "bad_request",
            InvokeError::Internal(_) => "internal_error",
        }
    }

    /// Whether the failure comes from the host rather than the caller or script
    pub fn is_server_error(&self) -> bool {
        matches!(self, InvokeError::StorageError(_) | InvokeError::Internal(_))
    }

    /// Message safe to show to the caller
    ///
    /// Storage and internal failures are reduced to a generic line; the
    /// detail only goes to the server log.
    pub fn public_message(&self) -> String {
        match self {
            InvokeError::StorageError(_) => "Storage is temporarily unavailable".to_string(),
            InvokeError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<ExecError> for InvokeError {
    fn from(err: ExecError) -> Self {
        match err {
            ExecError::Compile(_) => InvokeError::ScriptCompileError(err.to_string()),
            ExecError::Runtime { message, .. } => InvokeError::ScriptRuntimeError(message),
            ExecError::ResourceLimit(limit) => InvokeError::ResourceLimitExceeded(limit.to_string()),
            ExecError::Storage(message) => InvokeError::StorageError(StoreError::Backend(message)),
            ExecError::Cancelled => {
                InvokeError::ResourceLimitExceeded("execution cancelled".to_string())
            }
            ExecError::Internal(message) => InvokeError::Internal(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cato_runtime::SandboxError;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_not_found_messages() {
        assert_eq!(
            InvokeError::ProjectNotFound.to_string(),
            "Project not found. Make sure to deploy your project first."
        );
        assert_eq!(
            InvokeError::ScriptNotFound("server.py".to_string()).to_string(),
            "No server.py file found in project"
        );
    }

    #[test]
    fn test_exec_error_mapping() {
        let runtime = InvokeError::from(ExecError::Runtime {
            message: "ValueError: bad (line 1)".to_string(),
            kind: "ValueError".to_string(),
            line: Some(1),
        });
        assert_eq!(runtime.kind(), "runtime_error");
        assert_eq!(runtime.to_string(), "ValueError: bad (line 1)");

        let limit = InvokeError::from(ExecError::ResourceLimit(SandboxError::StepLimitExceeded {
            limit: 10,
        }));
        assert_eq!(limit.to_string(), "step limit exceeded (10 steps)");

        let storage = InvokeError::from(ExecError::Storage("disk I/O error".to_string()));
        assert!(storage.is_server_error());
        assert_eq!(storage.public_message(), "Storage is temporarily unavailable");
    }
}
