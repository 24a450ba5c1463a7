//! HTTP gateway with deferred handler construction and CGI execution.
//!
//! # Architecture Overview
//!
//! ```text
//!                      ┌────────────────────────────────────────────────┐
//!                      │                   GATEWAY                      │
//!                      │                                                │
//!   Client Request     │  ┌─────────┐    ┌─────────┐    ┌────────────┐  │
//!   ──────────────────┼─▶│ server  │───▶│  http   │───▶│  routing   │  │
//!                      │  │ backend │    │ gateway │    │  (lazy)    │  │
//!                      │  └─────────┘    └─────────┘    └─────┬──────┘  │
//!                      │                                      │         │
//!                      │                                      ▼         │
//!   Client Response    │                               ┌────────────┐  │
//!   ◀──────────────────┼───────────────────────────────│  handler   │  │
//!                      │          (streamed)           │ (e.g. CGI) │  │
//!                      │                               └────────────┘  │
//!                      │                                                │
//!                      │  ┌──────────────────────────────────────────┐  │
//!                      │  │          Cross-Cutting Concerns           │  │
//!                      │  │  config · observability · lifecycle       │  │
//!                      │  └──────────────────────────────────────────┘  │
//!                      └────────────────────────────────────────────────┘
//! ```
//!
//! Handlers are registered as constructors keyed by route patterns; the
//! router builds each one on the first request that selects it and memoizes
//! it for the life of the process. The CGI subsystem turns matched requests
//! into short-lived child processes speaking the CGI convention, streamed
//! back under a per-script deadline. Server backends (plain listener, TLS,
//! single-shot function adapter) are pluggable behind a scheme registry.

// Core subsystems
pub mod cgi;
pub mod config;
pub mod http;
pub mod routing;
pub mod server;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use cgi::CgiHandler;
pub use config::GatewayConfig;
pub use lifecycle::Shutdown;
pub use routing::{HandlerFactory, LazyRouter, PathBindings, RequestHandler};
pub use server::{Server, ServerRegistry};
