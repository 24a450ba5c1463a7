//! Configuration subsystem.
//!
//! # Data Flow
//! ```text
//! TOML file (or built-in defaults)
//!     → loader.rs (read + parse)
//!     → validation.rs (semantic checks, all errors reported)
//!     → schema.rs types, frozen for the process lifetime
//! ```

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{CgiConfig, GatewayConfig, ListenerConfig, ObservabilityConfig, TimeoutConfig, TlsConfig};
pub use validation::{validate_config, ValidationError};
