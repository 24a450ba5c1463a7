//! Deadline-bounded relay of script output to the HTTP response.
//!
//! # Responsibilities
//! - Hold the status line until the first output byte (or clean EOF)
//! - Stream stdout to the response as it is produced, never buffering whole
//! - Kill the script when the deadline fires, whatever state it is in
//! - Reap the child and log failures with drained stderr
//!
//! # Design Decisions
//! - Deadline before any output: distinguished timeout, child terminated
//! - Deadline mid-stream: the body stream errors out and the connection is
//!   cut; headers cannot be amended once sent
//! - Non-zero exit after output: logged only, the response stays as sent

use std::io;
use std::path::Path;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::body::{Body, Bytes};
use axum::http::StatusCode;
use axum::response::Response;
use futures_util::{Stream, StreamExt};
use tokio::process::{Child, ChildStdout};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::io::ReaderStream;

use crate::cgi::process::RunningScript;
use crate::cgi::CgiError;

/// Relay a running script's stdout into an HTTP response.
///
/// Resolves once the response status can be committed: either the script
/// produced its first byte (200, streaming body), exited silently (200,
/// empty body), or the deadline elapsed first (`TimedOut`).
pub async fn respond(run: RunningScript) -> Result<Response, CgiError> {
    let RunningScript {
        mut child,
        stdout,
        stderr,
        deadline,
        script,
    } = run;

    let mut chunks = ReaderStream::new(stdout);

    let first = match tokio::time::timeout_at(deadline, chunks.next()).await {
        Err(_) => {
            let _ = child.start_kill();
            let _ = child.wait().await;
            let diagnostics = stderr.await.unwrap_or_default();
            tracing::error!(
                script = %script.display(),
                stderr = %String::from_utf8_lossy(&diagnostics),
                "script execution timed out before producing output"
            );
            return Err(CgiError::TimedOut);
        }
        Ok(Some(Err(source))) => {
            let _ = child.start_kill();
            let _ = child.wait().await;
            return Err(CgiError::Stream(source));
        }
        Ok(Some(Ok(bytes))) => Some(bytes),
        Ok(None) => None,
    };

    let Some(first) = first else {
        // The script closed stdout without writing anything; finish it off
        // in the background and answer with an empty success.
        tokio::spawn(async move {
            reap(&mut child, deadline, &script, stderr).await;
        });
        return Ok(empty_ok());
    };

    let (tx, rx) = mpsc::unbounded_channel();
    let _ = tx.send(Ok(first));
    tokio::spawn(relay(chunks, child, stderr, script, deadline, tx));

    let response = Response::builder()
        .status(StatusCode::OK)
        .body(Body::from_stream(ChunkStream(rx)))
        .unwrap_or_else(|_| empty_ok());
    Ok(response)
}

fn empty_ok() -> Response {
    Response::new(Body::empty())
}

/// Forward chunks until EOF, racing the deadline. The deadline kills the
/// child but draining continues, so output already buffered in the pipe
/// still reaches the client before the stream is cut.
async fn relay(
    mut chunks: ReaderStream<ChildStdout>,
    mut child: Child,
    stderr: JoinHandle<Vec<u8>>,
    script: std::path::PathBuf,
    deadline: Instant,
    tx: mpsc::UnboundedSender<io::Result<Bytes>>,
) {
    let mut killed = false;

    loop {
        let next = tokio::select! {
            _ = tokio::time::sleep_until(deadline), if !killed => {
                killed = true;
                let _ = child.start_kill();
                continue;
            }
            next = chunks.next() => next,
        };

        match next {
            Some(Ok(bytes)) => {
                if tx.send(Ok(bytes)).is_err() {
                    // Client went away; the script has nobody to talk to.
                    let _ = child.start_kill();
                    let _ = child.wait().await;
                    return;
                }
            }
            Some(Err(source)) => {
                let _ = tx.send(Err(source));
                let _ = child.start_kill();
                let _ = child.wait().await;
                return;
            }
            None => {
                if killed {
                    // Headers are long gone; all that is left is to cut
                    // the connection mid-body.
                    let _ = tx.send(Err(io::Error::new(
                        io::ErrorKind::TimedOut,
                        "script execution deadline elapsed",
                    )));
                    let _ = child.wait().await;
                    let diagnostics = stderr.await.unwrap_or_default();
                    tracing::error!(
                        script = %script.display(),
                        stderr = %String::from_utf8_lossy(&diagnostics),
                        "script terminated at deadline after partial output"
                    );
                } else {
                    reap(&mut child, deadline, &script, stderr).await;
                }
                return;
            }
        }
    }
}

/// Wait for the child within the deadline, killing it if it lingers after
/// closing stdout. Non-zero exits are logged with whatever stderr said.
async fn reap(child: &mut Child, deadline: Instant, script: &Path, stderr: JoinHandle<Vec<u8>>) {
    let status = match tokio::time::timeout_at(deadline, child.wait()).await {
        Ok(status) => status,
        Err(_) => {
            let _ = child.start_kill();
            child.wait().await
        }
    };

    match status {
        Ok(status) if !status.success() => {
            let diagnostics = stderr.await.unwrap_or_default();
            tracing::error!(
                script = %script.display(),
                %status,
                stderr = %String::from_utf8_lossy(&diagnostics),
                "script exited with failure"
            );
        }
        Ok(_) => {}
        Err(source) => {
            tracing::error!(script = %script.display(), error = %source, "failed to reap script");
        }
    }
}

/// Body stream fed by the relay task.
struct ChunkStream(mpsc::UnboundedReceiver<io::Result<Bytes>>);

impl Stream for ChunkStream {
    type Item = io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.0.poll_recv(cx)
    }
}
