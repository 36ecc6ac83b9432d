//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ServerConfig (validated, immutable)
//!     → shared via Arc through the binding scope
//! ```
//!
//! # Design Decisions
//! - Config is read-only to the binding core
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    Http3ServiceConfig, HttpServiceConfig, HttpsServiceConfig, ListenerConfig, LogFormat,
    ObservabilityConfig, ServerConfig, StreamConfig, TlsConfig, TransportPreference,
};
pub use validation::ValidationError;
