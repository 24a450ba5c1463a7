//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! Connection (any server backend)
//!     → server.rs (Axum setup, middleware, catch-all dispatch)
//!     → request.rs (request ID)
//!     → routing layer picks + lazily builds the handler
//!     → handler response streams back to the client
//! ```

pub mod request;
pub mod server;

pub use request::{UuidRequestId, X_REQUEST_ID};
pub use server::{build_router, AppState};
