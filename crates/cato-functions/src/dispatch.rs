//! Function invocation dispatcher
//!
//! One invocation: resolve the public id, load the designated script,
//! bind a key-value handle to the project's namespace, run the script once
//! and report either `{result, logs}` or an [`InvokeError`].
//!
//! [`Dispatcher::invoke_blocking`] does the work on the calling thread.
//! [`Dispatcher::invoke`] moves it to the tokio blocking pool and adds a
//! host-side deadline that cancels the run if the engine has not returned.

use crate::error::InvokeError;
use crate::kv::{KvStore, Namespace, ScopedKv};
use crate::project::ProjectStore;
use cato_config::CatoConfig;
use cato_runtime::{AuditLogger, CancelToken, ContextBuilder, Engine, Limits};
use serde::Serialize;
use serde_json::Value as Json;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Slack granted past the engine's own deadline before the host gives up
const HOST_GRACE: Duration = Duration::from_secs(1);

/// Default designated script file
pub const DEFAULT_SCRIPT_PATH: &str = "server.py";

/// Dispatcher settings
#[derive(Debug, Clone, PartialEq)]
pub struct DispatcherConfig {
    /// File executed on invocation
    pub script_path: String,
    /// Budgets for every run
    pub limits: Limits,
    /// Deadline enforced by [`Dispatcher::invoke`]
    pub host_timeout: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        let limits = Limits::default();
        Self {
            script_path: DEFAULT_SCRIPT_PATH.to_string(),
            host_timeout: limits.timeout + HOST_GRACE,
            limits,
        }
    }
}

impl DispatcherConfig {
    pub fn from_config(config: &CatoConfig) -> Self {
        let limits = Limits::from_config(&config.limits);
        Self {
            script_path: config.functions.script_path.clone(),
            host_timeout: limits.timeout + HOST_GRACE,
            limits,
        }
    }

    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.host_timeout = limits.timeout + HOST_GRACE;
        self.limits = limits;
        self
    }

    pub fn with_host_timeout(mut self, timeout: Duration) -> Self {
        self.host_timeout = timeout;
        self
    }
}

/// Successful invocation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Invocation {
    /// Value of `response`, `null` when the script left it unset
    pub result: Option<Json>,
    /// Captured `print` output
    pub logs: String,
}

/// Runs published project scripts
#[derive(Clone)]
pub struct Dispatcher {
    projects: Arc<dyn ProjectStore>,
    kv: Arc<dyn KvStore>,
    engine: Engine,
    audit: Option<Arc<dyn AuditLogger>>,
    config: Arc<DispatcherConfig>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    pub fn new(
        projects: Arc<dyn ProjectStore>,
        kv: Arc<dyn KvStore>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            projects,
            kv,
            engine: Engine::new(),
            audit: None,
            config: Arc::new(config),
        }
    }

    /// Dispatcher over a backend that stores both projects and entries
    pub fn with_store<S>(store: Arc<S>, config: DispatcherConfig) -> Self
    where
        S: ProjectStore + KvStore + 'static,
    {
        Self::new(store.clone(), store, config)
    }

    /// Send sandbox audit events somewhere other than the log
    pub fn with_audit(mut self, audit: Arc<dyn AuditLogger>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Invoke on the current thread
    pub fn invoke_blocking(
        &self,
        public_id: &str,
        payload: Option<Json>,
    ) -> Result<Invocation, InvokeError> {
        self.run(public_id, payload, CancelToken::new())
    }

    /// Invoke on the blocking pool under the host deadline
    pub async fn invoke(
        &self,
        public_id: String,
        payload: Option<Json>,
    ) -> Result<Invocation, InvokeError> {
        let cancel = CancelToken::new();
        let deadline = self.config.host_timeout;
        let dispatcher = self.clone();
        let token = cancel.clone();
        let task =
            tokio::task::spawn_blocking(move || dispatcher.run(&public_id, payload, token));

        match tokio::time::timeout(deadline, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => {
                tracing::error!(error = %join_err, "invocation task failed");
                Err(InvokeError::Internal(join_err.to_string()))
            }
            Err(_) => {
                cancel.cancel();
                tracing::warn!(
                    timeout_ms = deadline.as_millis() as u64,
                    "invocation exceeded host deadline, cancelled"
                );
                Err(InvokeError::ResourceLimitExceeded(format!(
                    "time limit exceeded ({} ms)",
                    deadline.as_millis()
                )))
            }
        }
    }

    fn run(
        &self,
        public_id: &str,
        payload: Option<Json>,
        cancel: CancelToken,
    ) -> Result<Invocation, InvokeError> {
        let started = Instant::now();
        let project = self
            .projects
            .resolve(public_id)?
            .ok_or(InvokeError::ProjectNotFound)?;

        let script_path = &self.config.script_path;
        let bytes = self
            .projects
            .get_file(&project, script_path)?
            .ok_or_else(|| InvokeError::ScriptNotFound(script_path.clone()))?;
        let source = String::from_utf8(bytes).map_err(|_| {
            InvokeError::ScriptCompileError(format!("{} is not valid UTF-8", script_path))
        })?;

        let kv = ScopedKv::new(self.kv.clone(), Namespace::from(&project));
        let mut builder = ContextBuilder::new(Arc::new(kv))
            .payload(payload.unwrap_or(Json::Null))
            .limits(self.config.limits.clone())
            .cancel_token(cancel);
        if let Some(audit) = &self.audit {
            builder = builder.audit(audit.clone());
        }
        let caps = builder
            .build()
            .map_err(|err| InvokeError::BadRequest(err.to_string()))?;

        match self.engine.execute(&source, caps) {
            Ok(outcome) => {
                tracing::info!(
                    project = %project.id(),
                    steps = outcome.steps,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "invocation finished"
                );
                Ok(Invocation {
                    result: outcome.result,
                    logs: outcome.logs,
                })
            }
            Err(err) => {
                let err = InvokeError::from(err);
                if err.is_server_error() {
                    tracing::error!(project = %project.id(), error = %err, "invocation failed");
                } else {
                    tracing::info!(
                        project = %project.id(),
                        kind = err.kind(),
                        error = %err,
                        "invocation rejected"
                    );
                }
                Err(err)
            }
        }
    }
}
