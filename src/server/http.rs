//! Plain and TLS HTTP listener backend.
//!
//! # Responsibilities
//! - Bind a TCP listener on the URI's host/port
//! - Load TLS material named by `cert`/`key` query parameters
//! - Serve the composed router until shutdown
//!
//! # Design Decisions
//! - TLS is all-or-nothing: one-sided cert/key parameters fail construction
//! - Certificate and key files are checked at construction time, not first
//!   connection

use std::path::PathBuf;

use async_trait::async_trait;
use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use url::Url;

use crate::server::{Server, ServerError};

struct TlsPaths {
    cert: PathBuf,
    key: PathBuf,
}

/// HTTP(S) listener backend.
pub struct HttpServer {
    url: Url,
    host: String,
    port: u16,
    tls: Option<TlsPaths>,
}

impl HttpServer {
    /// Construct from a URI of the form
    /// `http://host:port[?cert=/path/cert.pem&key=/path/key.pem]`.
    pub fn from_url(url: &Url) -> Result<Box<dyn Server>, ServerError> {
        let host = url
            .host_str()
            .ok_or_else(|| ServerError::MissingAddress(url.to_string()))?
            .to_string();
        let port = url
            .port_or_known_default()
            .ok_or_else(|| ServerError::MissingAddress(url.to_string()))?;

        let mut cert = None;
        let mut key = None;
        for (name, value) in url.query_pairs() {
            match name.as_ref() {
                "cert" => cert = Some(PathBuf::from(value.as_ref())),
                "key" => key = Some(PathBuf::from(value.as_ref())),
                _ => {}
            }
        }

        let tls = match (cert, key) {
            (Some(cert), Some(key)) => {
                // Fail at startup on unreadable material.
                std::fs::metadata(&cert)?;
                std::fs::metadata(&key)?;
                Some(TlsPaths { cert, key })
            }
            (Some(_), None) => return Err(ServerError::MissingTlsParam("key")),
            (None, Some(_)) => return Err(ServerError::MissingTlsParam("cert")),
            (None, None) if url.scheme() == "https" => {
                return Err(ServerError::MissingTlsParam("cert"));
            }
            (None, None) => None,
        };

        let mut url = url.clone();
        let scheme = if tls.is_some() { "https" } else { "http" };
        let _ = url.set_scheme(scheme);

        Ok(Box::new(Self {
            url,
            host,
            port,
            tls,
        }))
    }
}

#[async_trait]
impl Server for HttpServer {
    fn address(&self) -> String {
        self.url.to_string()
    }

    async fn serve(
        self: Box<Self>,
        app: axum::Router,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ServerError> {
        let listener = TcpListener::bind((self.host.as_str(), self.port)).await?;
        let local_addr = listener.local_addr()?;

        tracing::info!(address = %local_addr, tls = self.tls.is_some(), "HTTP server starting");

        match &self.tls {
            None => {
                axum::serve(listener, app.into_make_service())
                    .with_graceful_shutdown(async move {
                        let _ = shutdown.recv().await;
                        tracing::info!("shutdown signal received");
                    })
                    .await?;
            }
            Some(tls) => {
                let tls_config = RustlsConfig::from_pem_file(&tls.cert, &tls.key).await?;

                let handle = Handle::new();
                let watcher = handle.clone();
                tokio::spawn(async move {
                    let _ = shutdown.recv().await;
                    tracing::info!("shutdown signal received");
                    watcher.graceful_shutdown(None);
                });

                axum_server::from_tcp_rustls(listener.into_std()?, tls_config)
                    .handle(handle)
                    .serve(app.into_make_service())
                    .await?;
            }
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(uri: &str) -> Url {
        Url::parse(uri).unwrap()
    }

    #[test]
    fn test_plain_http_address() {
        let server = HttpServer::from_url(&parse("http://localhost:8080")).unwrap();
        assert_eq!(server.address(), "http://localhost:8080/");
    }

    #[test]
    fn test_one_sided_tls_params_rejected() {
        let err = HttpServer::from_url(&parse("http://localhost:8080?cert=/tmp/c.pem"))
            .unwrap_err();
        assert!(matches!(err, ServerError::MissingTlsParam("key")));

        let err =
            HttpServer::from_url(&parse("http://localhost:8080?key=/tmp/k.pem")).unwrap_err();
        assert!(matches!(err, ServerError::MissingTlsParam("cert")));
    }

    #[test]
    fn test_https_scheme_requires_tls_params() {
        let err = HttpServer::from_url(&parse("https://localhost:8443")).unwrap_err();
        assert!(matches!(err, ServerError::MissingTlsParam("cert")));
    }

    #[test]
    fn test_missing_tls_files_fail_construction() {
        let err = HttpServer::from_url(&parse(
            "http://localhost:8080?cert=/nonexistent/c.pem&key=/nonexistent/k.pem",
        ))
        .unwrap_err();
        assert!(matches!(err, ServerError::Io(_)));
    }
}
