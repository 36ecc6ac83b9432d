//! TLS configuration and certificate loading.

use std::io;
use std::path::Path;

use axum_server::tls_rustls::RustlsConfig;

use crate::binding::error::BindingError;
use crate::config::TlsConfig;

/// Load the certificate chain and private key named by `tls`.
pub async fn load_tls_config(tls: &TlsConfig) -> Result<RustlsConfig, BindingError> {
    let cert_path = require(tls.cert_path.as_deref(), "certificate")?;
    let key_path = require(tls.key_path.as_deref(), "private key")?;

    RustlsConfig::from_pem_file(cert_path, key_path)
        .await
        .map_err(BindingError::Tls)
}

fn require<'a>(path: Option<&'a Path>, what: &str) -> Result<&'a Path, BindingError> {
    let path = path.ok_or_else(|| {
        BindingError::Tls(io::Error::new(
            io::ErrorKind::NotFound,
            format!("no {what} configured"),
        ))
    })?;
    if !path.exists() {
        return Err(BindingError::Tls(io::Error::new(
            io::ErrorKind::NotFound,
            format!("{what} file not found: {}", path.display()),
        )));
    }
    Ok(path)
}
