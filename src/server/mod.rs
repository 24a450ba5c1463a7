//! Pluggable server backends.
//!
//! # Data Flow
//! ```text
//! Server URI ("http://host:port?cert=..&key=..", "function://")
//!     → ServerRegistry (scheme → factory, explicit registration)
//!     → concrete Server (plain/TLS listener, function adapter)
//!     → serve(composed Axum router, shutdown signal)
//! ```
//!
//! # Design Decisions
//! - The registry is an explicit value handed around at startup, not a
//!   process-global; no import-order side effects
//! - Backends receive one composed handler and know nothing about routing
//! - Shutdown rides a broadcast channel shared with the rest of the process

pub mod function;
pub mod http;

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;
use url::Url;

pub use function::FunctionServer;
pub use http::HttpServer;

/// Errors constructing or running a server backend.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid server URI '{uri}': {source}")]
    InvalidUri {
        uri: String,
        #[source]
        source: url::ParseError,
    },

    #[error("no server backend registered for scheme '{0}'")]
    UnknownScheme(String),

    #[error("server URI '{0}' has no usable host/port")]
    MissingAddress(String),

    #[error("missing TLS {0} parameter")]
    MissingTlsParam(&'static str),

    #[error("invalid function event: {0}")]
    Event(#[from] serde_json::Error),

    #[error("malformed function event: {0}")]
    MalformedEvent(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A backend able to serve HTTP requests with a composed handler.
#[async_trait]
pub trait Server: Send {
    /// The fully-qualified address this server answers on.
    fn address(&self) -> String;

    /// Serve `app` until it finishes or `shutdown` fires.
    async fn serve(
        self: Box<Self>,
        app: axum::Router,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ServerError>;
}

impl std::fmt::Debug for dyn Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Server({})", self.address())
    }
}

/// Constructor for a server backend, keyed by URI scheme.
pub type ServerFactory = fn(&Url) -> Result<Box<dyn Server>, ServerError>;

/// Explicit scheme → backend registry.
pub struct ServerRegistry {
    factories: HashMap<String, ServerFactory>,
}

impl ServerRegistry {
    /// An empty registry; useful when embedding with custom backends only.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// A registry with the built-in backends registered.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("http", http::HttpServer::from_url);
        registry.register("https", http::HttpServer::from_url);
        registry.register("function", function::FunctionServer::from_url);
        registry
    }

    pub fn register(&mut self, scheme: &str, factory: ServerFactory) {
        self.factories.insert(scheme.to_string(), factory);
    }

    /// Schemes currently registered, for diagnostics.
    pub fn schemes(&self) -> Vec<&str> {
        let mut schemes: Vec<_> = self.factories.keys().map(String::as_str).collect();
        schemes.sort_unstable();
        schemes
    }

    /// Construct the backend named by `uri`.
    pub fn construct(&self, uri: &str) -> Result<Box<dyn Server>, ServerError> {
        let url = Url::parse(uri).map_err(|source| ServerError::InvalidUri {
            uri: uri.to_string(),
            source,
        })?;

        let factory = self
            .factories
            .get(url.scheme())
            .ok_or_else(|| ServerError::UnknownScheme(url.scheme().to_string()))?;

        factory(&url)
    }
}

impl Default for ServerRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
