//! polyserve: an embeddable multi-protocol HTTP server stack.
//!
//! # Architecture Overview
//!
//! ```text
//!   ServerConfig ──▶ BindingCoordinator ──▶ ServiceContributor (http, https, http3)
//!                           │                        │
//!                           ▼                        ▼
//!                     BindingScope ◀──── transports, groups, pending binds
//!                           │
//!                           ▼  bind_future()
//!                  Vec<Service(label, Ok(binding) | Err(cause))>
//!
//!   accepted connection ──▶ hyper ──▶ ContentStream (request body) ──▶ app
//!                                 ◀── ContentStream (response body) ◀──
//! ```

// Core subsystems
pub mod binding;
pub mod http;
pub mod net;
pub mod services;
pub mod stream;

// Cross-cutting concerns
pub mod config;
pub mod lifecycle;
pub mod observability;

pub use binding::{BindingCoordinator, BindingError, BindingScope, Service, ServiceBinding};
pub use config::ServerConfig;
pub use lifecycle::{RunningServer, Shutdown};
pub use stream::{ContentStream, StreamError};
