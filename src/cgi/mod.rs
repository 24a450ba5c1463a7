//! CGI execution gateway.
//!
//! # Data Flow
//! ```text
//! Incoming request
//!     → method gate (GET/POST only)
//!     → locator.rs (script inside the restricted root, or 404)
//!     → process.rs (environment, spawn, stdin/stderr tasks, deadline)
//!     → stream.rs (stdout → response body, bounded by the deadline)
//! ```
//!
//! The script's raw output is the response body; nothing is parsed or
//! rewritten on the way through.

pub mod locator;
pub mod process;
pub mod stream;

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tokio::time::{Duration, Instant};

use crate::routing::RequestHandler;

pub use locator::ScriptLocator;
pub use process::CgiInvocation;

/// Failures while executing a script for a request.
#[derive(Debug, Error)]
pub enum CgiError {
    /// Scripts only speak GET and POST.
    #[error("method '{0}' is not supported for script execution")]
    MethodRejected(Method),

    /// Missing, non-regular, non-executable, or outside the root.
    #[error("script not found or not executable")]
    NotFound,

    /// Process creation failed.
    #[error("failed to start script '{script}': {source}")]
    Spawn {
        script: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A stdio pipe could not be wired up.
    #[error("failed to wire script {0} stream")]
    Pipe(&'static str),

    /// Stdout failed before any output reached the client.
    #[error("failed to read script output: {0}")]
    Stream(#[source] std::io::Error),

    /// The deadline elapsed before the script produced output.
    #[error("script execution timed out")]
    TimedOut,
}

impl IntoResponse for CgiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            CgiError::MethodRejected(_) => (StatusCode::BAD_REQUEST, "Invalid request"),
            CgiError::NotFound => (
                StatusCode::NOT_FOUND,
                "Script not found or not executable",
            ),
            CgiError::Spawn { .. } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to start CGI script",
            ),
            CgiError::Pipe(_) | CgiError::Stream(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
            CgiError::TimedOut => (StatusCode::GATEWAY_TIMEOUT, "Script execution timed out"),
        };
        (status, message).into_response()
    }
}

/// Request handler that executes scripts out of a fixed root directory.
///
/// Cheap to construct; registered behind a [`crate::routing::LazyRouter`]
/// factory so nothing touches the filesystem until the first request.
pub struct CgiHandler {
    locator: ScriptLocator,
    timeout: Duration,
}

impl CgiHandler {
    pub fn new(root: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            locator: ScriptLocator::new(root),
            timeout,
        }
    }

    /// Convenience for handing the handler to a router registration.
    pub fn factory(root: impl Into<PathBuf>, timeout: Duration) -> crate::routing::HandlerFactory {
        let root = root.into();
        Arc::new(move || {
            Ok(Arc::new(CgiHandler::new(root.clone(), timeout)) as Arc<dyn RequestHandler>)
        })
    }

    async fn execute(&self, req: Request<Body>) -> Result<Response, CgiError> {
        let method = req.method();
        if method != Method::GET && method != Method::POST {
            return Err(CgiError::MethodRejected(method.clone()));
        }

        let script = self
            .locator
            .locate(req.uri().path())
            .ok_or(CgiError::NotFound)?;

        let invocation = CgiInvocation::from_request(script, req);
        let run = process::spawn(invocation, self.timeout)?;
        stream::respond(run).await
    }
}

#[async_trait]
impl RequestHandler for CgiHandler {
    async fn handle(&self, req: Request<Body>) -> Response {
        let path = req.uri().path().to_string();
        let started = Instant::now();

        let result = self.execute(req).await;

        tracing::info!(
            path = %path,
            elapsed = ?started.elapsed(),
            ok = result.is_ok(),
            "script execution finished"
        );

        match result {
            Ok(response) => response,
            Err(error) => {
                tracing::warn!(path = %path, error = %error, "script request failed");
                error.into_response()
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    use std::fs;
    use std::os::unix::fs::PermissionsExt;

    fn write_script(dir: &std::path::Path, name: &str, contents: &str) {
        let path = dir.join(name);
        fs::write(&path, contents).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    }

    fn request(method: Method, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_unsupported_method_is_bad_request() {
        let dir = tempfile::tempdir().unwrap();
        let handler = CgiHandler::new(dir.path(), Duration::from_secs(5));

        let response = handler
            .handle(request(Method::DELETE, "http://localhost/cgi-bin/echo.sh"))
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_missing_script_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let handler = CgiHandler::new(dir.path(), Duration::from_secs(5));

        let response = handler
            .handle(request(Method::GET, "http://localhost/cgi-bin/missing.sh"))
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_happy_path_query_echo() {
        let dir = tempfile::tempdir().unwrap();
        write_script(
            dir.path(),
            "echo.sh",
            "#!/bin/sh\nprintf 'query=%s' \"$QUERY_STRING\"\n",
        );
        let handler = CgiHandler::new(dir.path(), Duration::from_secs(5));

        let response = handler
            .handle(request(Method::GET, "http://localhost/cgi-bin/echo.sh?x=1"))
            .await;
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert!(String::from_utf8_lossy(&bytes).contains("x=1"));
    }

    #[tokio::test]
    async fn test_timeout_yields_gateway_timeout() {
        let dir = tempfile::tempdir().unwrap();
        write_script(dir.path(), "sleep.sh", "#!/bin/sh\nsleep 30\n");
        let handler = CgiHandler::new(dir.path(), Duration::from_millis(200));

        let response = handler
            .handle(request(Method::GET, "http://localhost/cgi-bin/sleep.sh"))
            .await;
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    }
}
