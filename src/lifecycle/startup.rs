//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the transport registry and install the configured override
//! - Create the binding scope and run the coordinator against it
//! - Wait for the aggregate outcome and report it
//!
//! # Design Decisions
//! - Partial startup is a valid outcome; the caller decides whether to proceed
//! - Only registration conflicts are fatal

use std::sync::Arc;
use std::time::Duration;

use crate::binding::{BindingCoordinator, BindingError, BindingScope, Service};
use crate::config::ServerConfig;
use crate::lifecycle::Shutdown;
use crate::net::transport::TransportRegistry;

/// Platform transports with the configured override installed.
pub fn transport_registry(config: &ServerConfig) -> Result<TransportRegistry, BindingError> {
    let registry = TransportRegistry::platform();
    if let Some(name) = config.server.transport.transport_name() {
        registry.install_override_named(name)?;
    }
    Ok(registry)
}

/// Bind every applicable service and wait until all binds have settled.
pub async fn start(
    config: Arc<ServerConfig>,
    coordinator: &BindingCoordinator,
    shutdown: Shutdown,
) -> Result<RunningServer, BindingError> {
    let registry = Arc::new(transport_registry(&config)?);
    tracing::debug!(?registry, "Transport registry ready");

    let scope = Arc::new(BindingScope::new(config, registry, shutdown));
    let services = coordinator.bind(&scope)?.await;

    let bound = services.iter().filter(|s| s.is_bound()).count();
    tracing::info!(
        scope = %scope.id(),
        bound,
        failed = services.len() - bound,
        "Service binding settled"
    );
    Ok(RunningServer { scope, services })
}

/// The outcome of [`start`], kept alive while serving.
#[derive(Debug)]
pub struct RunningServer {
    scope: Arc<BindingScope>,
    services: Vec<Service>,
}

impl RunningServer {
    pub fn services(&self) -> &[Service] {
        &self.services
    }

    pub fn scope(&self) -> &Arc<BindingScope> {
        &self.scope
    }

    pub fn service(&self, label: &str) -> Option<&Service> {
        self.services.iter().find(|s| s.label == label)
    }

    /// At least one service is serving.
    pub fn is_serving(&self) -> bool {
        self.services.iter().any(Service::is_bound)
    }

    /// Stop accepting and wait up to `grace` for open connections.
    ///
    /// Returns `false` if connections were still open when the grace period ran out.
    pub async fn shutdown(self, grace: Duration) -> bool {
        self.scope.shutdown().trigger();
        let connections = self.scope.connections();
        match tokio::time::timeout(grace, connections.wait_idle()).await {
            Ok(()) => {
                tracing::info!("All connections drained");
                true
            }
            Err(_) => {
                tracing::warn!(
                    open = connections.active_count(),
                    "Grace period elapsed with open connections"
                );
                false
            }
        }
    }
}
