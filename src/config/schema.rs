//! Configuration schema definitions.
//!
//! This module defines the complete binding configuration for the server stack.
//! All types derive Serde traits for deserialization from config files.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration for the server stack.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    /// Settings shared by every service (host, transport override, limits).
    pub server: ListenerConfig,

    /// Plaintext HTTP service.
    pub http: HttpServiceConfig,

    /// TLS-secured HTTP service.
    pub https: HttpsServiceConfig,

    /// HTTP/3 service over the datagram transport.
    pub http3: Http3ServiceConfig,

    /// Certificate material shared by the secured services.
    pub tls: Option<TlsConfig>,

    /// Content stream settings.
    pub stream: StreamConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl ServerConfig {
    /// Certificate material, only when both halves are configured.
    pub fn tls_material(&self) -> Option<&TlsConfig> {
        self.tls.as_ref().filter(|tls| tls.is_complete())
    }
}

/// Transport selection override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransportPreference {
    /// Pick the best transport for each address.
    #[default]
    Auto,
    Tcp,
    Unix,
    Udp,
}

impl TransportPreference {
    /// Transport name as registered in the transport registry.
    pub fn transport_name(&self) -> Option<&'static str> {
        match self {
            TransportPreference::Auto => None,
            TransportPreference::Tcp => Some("tcp"),
            TransportPreference::Unix => Some("unix"),
            TransportPreference::Udp => Some("udp"),
        }
    }
}

/// Settings shared by every listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Default host for services without their own host (e.g., "0.0.0.0").
    pub host: String,

    /// Transport override applied to every service that supports it.
    pub transport: TransportPreference,

    /// Maximum concurrent connections per stream service (backpressure).
    pub max_connections: usize,

    /// Grace period for in-flight connections on shutdown, in seconds.
    pub shutdown_grace_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            transport: TransportPreference::Auto,
            max_connections: 10_000,
            shutdown_grace_secs: 10,
        }
    }
}

/// Plaintext HTTP service configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpServiceConfig {
    pub enabled: bool,

    /// TCP port (ignored when `socket_path` is set).
    pub port: u16,

    /// Domain socket path; replaces the inet address when present.
    pub socket_path: Option<PathBuf>,
}

impl Default for HttpServiceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 8080,
            socket_path: None,
        }
    }
}

/// TLS-secured HTTP service configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpsServiceConfig {
    pub enabled: bool,
    pub port: u16,

    /// Host override for this service.
    pub host: Option<String>,
}

impl Default for HttpsServiceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 8443,
            host: None,
        }
    }
}

/// HTTP/3 service configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Http3ServiceConfig {
    pub enabled: bool,
    pub port: u16,

    /// Host override for this service.
    pub host: Option<String>,

    /// Advertise this endpoint through `alt-svc` on the secured service.
    pub advertise: bool,

    /// `ma` parameter of the advertisement, in seconds.
    pub max_age_secs: u64,
}

impl Default for Http3ServiceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 8443,
            host: None,
            advertise: true,
            max_age_secs: 86_400,
        }
    }
}

/// TLS material for the secured services.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct TlsConfig {
    /// Path to certificate file (PEM).
    pub cert_path: Option<PathBuf>,

    /// Path to private key file (PEM).
    pub key_path: Option<PathBuf>,
}

impl TlsConfig {
    /// Both certificate and key are configured.
    pub fn is_complete(&self) -> bool {
        self.cert_path.is_some() && self.key_path.is_some()
    }
}

/// Content stream settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Frames a stream may buffer before writes are refused.
    pub max_buffered_frames: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            max_buffered_frames: 64,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_file_uses_defaults() {
        let config: ServerConfig = toml::from_str("[http]\nport = 9000\n").unwrap();
        assert_eq!(config.http.port, 9000);
        assert!(config.http.enabled);
        assert_eq!(config.https.port, 8443);
        assert!(!config.http3.enabled);
        assert_eq!(config.stream.max_buffered_frames, 64);
        assert!(config.tls_material().is_none());
    }

    #[test]
    fn half_configured_tls_is_not_material() {
        let config: ServerConfig = toml::from_str(
            r#"
            [tls]
            cert_path = "/etc/polyserve/cert.pem"
            "#,
        )
        .unwrap();
        assert!(config.tls.is_some());
        assert!(config.tls_material().is_none());
    }

    #[test]
    fn transport_override_parses() {
        let config: ServerConfig = toml::from_str("[server]\ntransport = \"unix\"\n").unwrap();
        assert_eq!(config.server.transport, TransportPreference::Unix);
        assert_eq!(config.server.transport.transport_name(), Some("unix"));
        assert_eq!(TransportPreference::Auto.transport_name(), None);
    }
}
