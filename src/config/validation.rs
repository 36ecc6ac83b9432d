//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (ports, queue bounds, limits)
//! - Detect services colliding on the same stream endpoint
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::ServerConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{service}: port must be non-zero")]
    ZeroPort { service: &'static str },

    #[error("tls: cert_path and key_path must be configured together")]
    IncompleteTls,

    #[error("stream: max_buffered_frames must be at least 1")]
    ZeroQueueBound,

    #[error("server: max_connections must be at least 1")]
    ZeroConnections,

    #[error("http and https both listen on {host}:{port}")]
    PortCollision { host: String, port: u16 },

    #[error("observability: unknown log level `{0}`")]
    UnknownLogLevel(String),

    #[error("observability: invalid metrics address `{0}`")]
    InvalidMetricsAddress(String),
}

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Validate a parsed configuration.
pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.http.enabled && config.http.socket_path.is_none() && config.http.port == 0 {
        errors.push(ValidationError::ZeroPort { service: "http" });
    }
    if config.https.enabled && config.https.port == 0 {
        errors.push(ValidationError::ZeroPort { service: "https" });
    }
    if config.http3.enabled && config.http3.port == 0 {
        errors.push(ValidationError::ZeroPort { service: "http3" });
    }

    if let Some(tls) = &config.tls {
        if !tls.is_complete() && (tls.cert_path.is_some() || tls.key_path.is_some()) {
            errors.push(ValidationError::IncompleteTls);
        }
    }

    if config.stream.max_buffered_frames == 0 {
        errors.push(ValidationError::ZeroQueueBound);
    }
    if config.server.max_connections == 0 {
        errors.push(ValidationError::ZeroConnections);
    }

    // http3 shares its port with https on purpose (different socket kinds).
    if config.http.enabled
        && config.https.enabled
        && config.http.socket_path.is_none()
        && config.http.port != 0
        && config.http.port == config.https.port
    {
        let https_host = config.https.host.as_deref().unwrap_or(&config.server.host);
        if https_host == config.server.host {
            errors.push(ValidationError::PortCollision {
                host: config.server.host.clone(),
                port: config.http.port,
            });
        }
    }

    let level = config.observability.log_level.to_ascii_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        errors.push(ValidationError::UnknownLogLevel(
            config.observability.log_level.clone(),
        ));
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidMetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::TlsConfig;

    #[test]
    fn defaults_are_valid() {
        assert!(validate_config(&ServerConfig::default()).is_ok());
    }

    #[test]
    fn collects_every_error() {
        let mut config = ServerConfig::default();
        config.http.port = 0;
        config.stream.max_buffered_frames = 0;
        config.observability.log_level = "loud".into();
        config.tls = Some(TlsConfig {
            cert_path: Some("cert.pem".into()),
            key_path: None,
        });

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(errors.contains(&ValidationError::ZeroPort { service: "http" }));
        assert!(errors.contains(&ValidationError::IncompleteTls));
        assert!(errors.contains(&ValidationError::ZeroQueueBound));
        assert!(errors.contains(&ValidationError::UnknownLogLevel("loud".into())));
    }

    #[test]
    fn same_port_on_same_host_collides() {
        let mut config = ServerConfig::default();
        config.https.port = config.http.port;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::PortCollision {
                host: "0.0.0.0".into(),
                port: 8080
            }]
        );

        config.https.host = Some("127.0.0.2".into());
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn domain_socket_http_skips_port_checks() {
        let mut config = ServerConfig::default();
        config.http.port = 0;
        config.http.socket_path = Some("/tmp/polyserve.sock".into());
        assert!(validate_config(&config).is_ok());
    }
}
