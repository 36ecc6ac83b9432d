//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::path::PathBuf;

use axum::{body::Body, routing::any, Router};
use polyserve::config::{ServerConfig, TlsConfig};

/// Fresh directory under the system temp dir.
pub fn temp_dir(prefix: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("polyserve-{prefix}-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

/// Self-signed certificate for `localhost`, written as PEM files.
pub fn self_signed_tls(dir: &std::path::Path) -> TlsConfig {
    let certified =
        rcgen::generate_simple_self_signed(vec!["localhost".to_string(), "127.0.0.1".to_string()])
            .unwrap();
    let cert_path = dir.join("cert.pem");
    let key_path = dir.join("key.pem");
    std::fs::write(&cert_path, certified.cert.pem()).unwrap();
    std::fs::write(&key_path, certified.key_pair.serialize_pem()).unwrap();
    TlsConfig {
        cert_path: Some(cert_path),
        key_path: Some(key_path),
    }
}

/// Loopback config with OS-assigned ports and only plain HTTP enabled.
pub fn loopback_config() -> ServerConfig {
    let mut config = ServerConfig::default();
    config.server.host = "127.0.0.1".into();
    config.server.shutdown_grace_secs = 1;
    config.http.port = 0;
    config.https.port = 0;
    config.http3.port = 0;
    config
}

/// Echoes request bodies back.
pub fn echo_app() -> Router {
    Router::new()
        .route("/", any(|body: Body| async move { body }))
        .route("/{*path}", any(|body: Body| async move { body }))
}

pub fn insecure_client() -> reqwest::Client {
    reqwest::Client::builder()
        .danger_accept_invalid_certs(true)
        .build()
        .unwrap()
}
