//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! Accepted connection (plain or TLS)
//!     → server.rs (hyper-util auto builder, middleware)
//!     → body.rs (request body into a ContentStream)
//!     → application router
//!     → body.rs (response body through a ContentStream)
//!     → Send to client
//! ```

pub mod body;
pub mod server;

pub use body::{body_from_stream, source_from_body};
pub use server::{HttpHandler, X_REQUEST_ID};
