//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Registration (at startup):
//!     pattern string → constructor map
//!     → parse + compile each key (pattern.rs)
//!     → sort longest-first
//!     → freeze as immutable LazyRouter
//!
//! Incoming request (path, method, host):
//!     → candidate walk in priority order
//!     → winning pattern looks up / constructs its handler (cache.rs)
//!     → Return: (handler, path bindings) or explicit no-match
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime
//! - No regex in the hot path (segment matching only)
//! - Handlers built lazily, memoized exactly once per pattern
//! - First match wins (ordered longest registration first)

pub mod cache;
pub mod pattern;
pub mod router;

pub use cache::HandlerCache;
pub use pattern::{PatternError, RoutePattern};
pub use router::{BoxError, HandlerFactory, LazyRouter, PathBindings, RequestHandler, RouteError};
