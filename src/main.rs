//! Gateway daemon.
//!
//! Serves a lazily-constructed routing table over a pluggable server
//! backend. By default the only registration is the CGI mount; embedders
//! use the library crate directly to register their own handlers.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use http_gateway::config::{load_config, GatewayConfig};
use http_gateway::routing::HandlerFactory;
use http_gateway::{CgiHandler, LazyRouter, ServerRegistry, Shutdown};

#[derive(Parser)]
#[command(name = "http-gateway")]
#[command(about = "HTTP gateway with lazy routing and CGI execution", long_about = None)]
struct Args {
    /// Server backend URI: http://host:port[?cert=..&key=..] or function://
    #[arg(long, env = "GATEWAY_SERVER_URI")]
    server_uri: Option<String>,

    /// Path to a TOML configuration file.
    #[arg(long, env = "GATEWAY_CONFIG")]
    config: Option<PathBuf>,

    /// Directory containing executable CGI scripts (overrides config).
    #[arg(long, env = "GATEWAY_CGI_ROOT")]
    cgi_root: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };
    if let Some(root) = &args.cgi_root {
        config.cgi.root = root.display().to_string();
    }

    http_gateway::observability::logging::init_logging(&config.observability.log_level);

    tracing::info!("http-gateway v0.1.0 starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        cgi_root = %config.cgi.root,
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => http_gateway::observability::metrics::init_metrics(addr),
            Err(_) => {
                tracing::error!(
                    metrics_address = %config.observability.metrics_address,
                    "Failed to parse metrics address"
                );
            }
        }
    }

    let mut handlers: HashMap<String, HandlerFactory> = HashMap::new();
    if config.cgi.enabled {
        handlers.insert(
            config.cgi.mount.clone(),
            CgiHandler::factory(
                config.cgi.root.clone(),
                Duration::from_secs(config.cgi.timeout_secs),
            ),
        );
    }

    let router = Arc::new(LazyRouter::new(handlers)?);
    tracing::info!(routes = router.route_count(), "Routing table ready");

    let app = http_gateway::http::build_router(&config, router);

    let server_uri = args.server_uri.unwrap_or_else(|| default_uri(&config));
    let registry = ServerRegistry::with_defaults();
    let server = registry.construct(&server_uri)?;

    tracing::info!(address = %server.address(), "Listening for requests");

    let shutdown = Shutdown::new();
    shutdown.trigger_on_ctrl_c();
    server.serve(app, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Build the server URI from the config when no flag is given.
fn default_uri(config: &GatewayConfig) -> String {
    match &config.listener.tls {
        Some(tls) => format!(
            "http://{}?cert={}&key={}",
            config.listener.bind_address, tls.cert_path, tls.key_path
        ),
        None => format!("http://{}", config.listener.bind_address),
    }
}
