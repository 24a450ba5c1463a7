//! Single-invocation serverless function adapter.
//!
//! Reads one JSON event from standard input, dispatches the converted
//! request through the composed handler, and writes the response JSON to
//! standard output. This matches the invocation model of function-URL
//! platforms: one process, one event, one response.

use std::collections::HashMap;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request};
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::broadcast;
use tower::ServiceExt;
use url::Url;

use crate::server::{Server, ServerError};

/// Inbound function-URL event.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FunctionEvent {
    raw_path: String,
    raw_query_string: String,
    query_string_parameters: HashMap<String, String>,
    headers: HashMap<String, String>,
    body: String,
    is_base64_encoded: bool,
    request_context: FunctionRequestContext,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct FunctionRequestContext {
    http: FunctionHttpDescription,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct FunctionHttpDescription {
    method: String,
    source_ip: String,
}

/// Outbound function-URL response.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FunctionResponse {
    pub status_code: u16,
    pub body: String,
}

impl FunctionEvent {
    /// Convert the event into a generic HTTP request.
    pub fn into_request(self) -> Result<Request<Body>, ServerError> {
        // Prefer the raw query string; fall back to re-encoding the
        // parameter map.
        let mut query = self.raw_query_string;
        if query.is_empty() && !self.query_string_parameters.is_empty() {
            let mut pairs: Vec<_> = self.query_string_parameters.into_iter().collect();
            pairs.sort();
            let mut serializer = url::form_urlencoded::Serializer::new(String::new());
            for (name, value) in &pairs {
                serializer.append_pair(name, value);
            }
            query = serializer.finish();
        }

        let path = if self.raw_path.is_empty() {
            "/".to_string()
        } else {
            self.raw_path
        };
        let uri = if query.is_empty() {
            path
        } else {
            format!("{path}?{query}")
        };

        let method = if self.request_context.http.method.is_empty() {
            Method::GET
        } else {
            Method::from_bytes(self.request_context.http.method.as_bytes())
                .map_err(|e| ServerError::MalformedEvent(e.to_string()))?
        };

        let body = if self.is_base64_encoded {
            let decoded = base64::engine::general_purpose::STANDARD
                .decode(self.body.trim())
                .map_err(|e| ServerError::MalformedEvent(e.to_string()))?;
            Body::from(decoded)
        } else {
            Body::from(self.body)
        };

        let mut builder = Request::builder().method(method).uri(uri);
        for (name, value) in &self.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !self.request_context.http.source_ip.is_empty() {
            builder = builder.header("x-forwarded-for", &self.request_context.http.source_ip);
        }

        builder
            .body(body)
            .map_err(|e| ServerError::MalformedEvent(e.to_string()))
    }
}

/// Serverless function backend: one event in, one response out.
pub struct FunctionServer;

impl FunctionServer {
    pub fn from_url(_url: &Url) -> Result<Box<dyn Server>, ServerError> {
        Ok(Box::new(Self))
    }
}

#[async_trait]
impl Server for FunctionServer {
    fn address(&self) -> String {
        "function://".to_string()
    }

    async fn serve(
        self: Box<Self>,
        app: axum::Router,
        _shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ServerError> {
        let mut input = Vec::new();
        tokio::io::stdin().read_to_end(&mut input).await?;

        let event: FunctionEvent = serde_json::from_slice(&input)?;
        let response = dispatch(app, event).await;
        let encoded = serde_json::to_string(&response)?;

        let mut stdout = tokio::io::stdout();
        stdout.write_all(encoded.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;

        Ok(())
    }
}

/// Run one event through the handler. Conversion failures become a 500
/// response rather than a failed invocation.
pub async fn dispatch(app: axum::Router, event: FunctionEvent) -> FunctionResponse {
    let request = match event.into_request() {
        Ok(request) => request,
        Err(error) => {
            return FunctionResponse {
                status_code: 500,
                body: error.to_string(),
            }
        }
    };

    match app.oneshot(request).await {
        Ok(response) => {
            let status_code = response.status().as_u16();
            let body = axum::body::to_bytes(response.into_body(), usize::MAX)
                .await
                .map(|bytes| String::from_utf8_lossy(&bytes).to_string())
                .unwrap_or_default();
            FunctionResponse { status_code, body }
        }
        Err(never) => match never {},
    }
}
