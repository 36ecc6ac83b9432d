//! Binding error definitions.

use thiserror::Error;

use crate::net::transport::{AddressClass, SocketKind};

/// Errors raised while configuring or binding a service.
#[derive(Debug, Error)]
pub enum BindingError {
    /// No registered transport can serve the requested address.
    #[error("no compatible transport for {kind} socket on {class} address {address}")]
    NoCompatibleTransport {
        address: String,
        class: AddressClass,
        kind: SocketKind,
    },

    /// Two contributors used the same key; a programming error.
    #[error("duplicate {registry} registration for `{key}`")]
    DuplicateRegistration { registry: &'static str, key: String },

    #[error("unknown transport `{0}`")]
    UnknownTransport(String),

    /// The transport override was already installed.
    #[error("transport override already installed")]
    TransportSealed,

    #[error("invalid address `{address}`: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to load TLS material: {0}")]
    Tls(#[source] std::io::Error),

    #[error("failed to prepare handler: {0}")]
    Handler(String),

    /// The bind task stopped before reporting an outcome.
    #[error("bind cancelled")]
    Cancelled,
}

impl BindingError {
    pub fn bind(address: impl ToString, source: std::io::Error) -> Self {
        BindingError::Bind {
            address: address.to_string(),
            source,
        }
    }

    /// Programming errors abort the whole bind instead of failing one service.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            BindingError::DuplicateRegistration { .. } | BindingError::TransportSealed
        )
    }
}
