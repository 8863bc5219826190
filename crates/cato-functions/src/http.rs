//! HTTP surface
//!
//! - `POST /functions/{public_id}`: invoke a project's script
//! - `POST /api/run-function/{public_id}`: same handler under the legacy path
//!   the published project templates call
//! - `GET /health`: liveness check
//!
//! The request body is the JSON payload; an empty body means `{}`.

use crate::dispatch::{Dispatcher, Invocation};
use crate::error::InvokeError;
use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use std::future::Future;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
struct AppState {
    dispatcher: Dispatcher,
}

/// Build the router around `dispatcher`
pub fn router(dispatcher: Dispatcher, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/functions/{public_id}", post(run_function))
        .route("/api/run-function/{public_id}", post(run_function))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { dispatcher })
}

async fn run_function(
    State(state): State<AppState>,
    Path(public_id): Path<String>,
    body: Bytes,
) -> Result<Json<Invocation>, InvokeError> {
    let payload = parse_payload(&body)?;
    let invocation = state.dispatcher.invoke(public_id, payload).await?;
    Ok(Json(invocation))
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

fn parse_payload(body: &[u8]) -> Result<Option<serde_json::Value>, InvokeError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    serde_json::from_slice(body)
        .map(Some)
        .map_err(|err| InvokeError::BadRequest(format!("invalid JSON body: {}", err)))
}

impl InvokeError {
    pub fn status(&self) -> StatusCode {
        match self {
            InvokeError::ProjectNotFound | InvokeError::ScriptNotFound(_) => StatusCode::NOT_FOUND,
            InvokeError::ScriptCompileError(_)
            | InvokeError::ScriptRuntimeError(_)
            | InvokeError::BadRequest(_) => StatusCode::BAD_REQUEST,
            InvokeError::ResourceLimitExceeded(_) => StatusCode::TOO_MANY_REQUESTS,
            InvokeError::StorageError(_) | InvokeError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for InvokeError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, kind = self.kind(), "invocation error");
        }
        (status, Json(json!({ "error": self.public_message() }))).into_response()
    }
}

/// Serve `router` on `listener` until `shutdown` resolves
pub async fn serve<F>(listener: TcpListener, router: Router, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "listening");
    }
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
}

/// Resolves on Ctrl-C
pub async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("shutdown requested"),
        Err(err) => tracing::error!(error = %err, "failed to listen for shutdown signal"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_blank_body_is_no_payload() {
        assert_eq!(parse_payload(b"").unwrap(), None);
        assert_eq!(parse_payload(b" \n").unwrap(), None);
        assert_eq!(
            parse_payload(br#"{"a": 1}"#).unwrap(),
            Some(json!({"a": 1}))
        );
    }

    #[test]
    fn test_malformed_body_is_bad_request() {
        let err = parse_payload(b"{oops").unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(InvokeError::ProjectNotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            InvokeError::ResourceLimitExceeded("x".to_string()).status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            InvokeError::Internal("x".to_string()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
