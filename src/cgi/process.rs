//! CGI child-process spawning and stream wiring.
//!
//! # Responsibilities
//! - Derive the CGI environment from the request
//! - Spawn the script with piped stdio and a fixed deadline
//! - Feed the request body to stdin without blocking the deadline clock
//! - Drain stderr concurrently for diagnostics
//!
//! # Design Decisions
//! - The ambient process environment is inherited unchanged; request
//!   variables are layered on top
//! - Only body-carrying requests get a stdin pipe at all
//! - `kill_on_drop` backs up every explicit termination path

use std::path::PathBuf;
use std::process::Stdio;

use axum::body::Body;
use axum::http::{header, Method, Request};
use futures_util::TryStreamExt;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdout, Command};
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};
use tokio_util::io::StreamReader;

use crate::cgi::CgiError;

/// Everything needed to execute one script for one request.
pub struct CgiInvocation {
    script: PathBuf,
    method: Method,
    query: String,
    content_length: Option<u64>,
    body: Body,
}

impl CgiInvocation {
    pub fn from_request(script: PathBuf, req: Request<Body>) -> Self {
        let (parts, body) = req.into_parts();

        let content_length = parts
            .headers
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());

        Self {
            script,
            method: parts.method,
            query: parts.uri.query().unwrap_or("").to_string(),
            content_length,
            body,
        }
    }

    pub fn script(&self) -> &PathBuf {
        &self.script
    }
}

/// A spawned script with its streams wired and deadline fixed.
#[derive(Debug)]
pub struct RunningScript {
    pub(crate) child: Child,
    pub(crate) stdout: ChildStdout,
    pub(crate) stderr: JoinHandle<Vec<u8>>,
    pub(crate) deadline: Instant,
    pub(crate) script: PathBuf,
}

/// Spawn the script for `invocation`. The deadline starts now; everything
/// downstream (first output byte, streaming, reaping) is bounded by it.
pub fn spawn(invocation: CgiInvocation, timeout: Duration) -> Result<RunningScript, CgiError> {
    let CgiInvocation {
        script,
        method,
        query,
        content_length,
        body,
    } = invocation;

    let deadline = Instant::now() + timeout;

    let mut cmd = Command::new(&script);
    cmd.env("REQUEST_METHOD", method.as_str())
        .env("SCRIPT_FILENAME", &script)
        .env("QUERY_STRING", &query)
        .env("SERVER_PROTOCOL", "HTTP/1.0");

    if let Some(len) = content_length {
        cmd.env("CONTENT_LENGTH", len.to_string());
    }

    let wants_stdin = method == Method::POST;
    cmd.stdin(if wants_stdin {
        Stdio::piped()
    } else {
        Stdio::null()
    });
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    cmd.kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|source| CgiError::Spawn {
        script: script.clone(),
        source,
    })?;

    if wants_stdin {
        let stdin = child.stdin.take().ok_or(CgiError::Pipe("stdin"))?;
        let reader = StreamReader::new(body.into_data_stream().map_err(std::io::Error::other));
        tokio::spawn(async move {
            let mut stdin = stdin;
            let mut reader = reader;
            // A failure here means the client or the script went away;
            // either way the copy stops and stdin closes.
            let _ = tokio::io::copy(&mut reader, &mut stdin).await;
            let _ = stdin.shutdown().await;
        });
    }

    let stdout = child.stdout.take().ok_or(CgiError::Pipe("stdout"))?;
    let stderr_pipe = child.stderr.take().ok_or(CgiError::Pipe("stderr"))?;

    let stderr = tokio::spawn(async move {
        let mut stderr_pipe = stderr_pipe;
        let mut collected = Vec::new();
        let _ = stderr_pipe.read_to_end(&mut collected).await;
        collected
    });

    Ok(RunningScript {
        child,
        stdout,
        stderr,
        deadline,
        script,
    })
}
