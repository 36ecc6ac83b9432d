//! Next-generation HTTP over the datagram transport.
//!
//! The QUIC codec is supplied by the embedder as a [`DatagramService`]; this
//! crate binds the socket, runs the receive loop and advertises the endpoint
//! through the secured service's `alt-svc` header.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use futures_util::future::{BoxFuture, FutureExt};

use crate::binding::{
    AltServiceSource, BindingError, BindingScope, DatagramService, Scheme, ServiceContributor,
    ServiceHandler,
};
use crate::net::transport::{ServiceAddress, SocketKind};
use crate::services::SecureHttp;
use crate::stream::BoxError;

/// ALPN id advertised for this service.
pub const ALPN_H3: &str = "h3";

pub struct Http3 {
    datagrams: Arc<dyn DatagramService>,
}

impl Http3 {
    pub const LABEL: &'static str = "http3";

    pub fn new(datagrams: Arc<dyn DatagramService>) -> Self {
        Self { datagrams }
    }
}

impl Default for Http3 {
    fn default() -> Self {
        Self::new(Arc::new(DiscardDatagrams::default()))
    }
}

impl ServiceContributor for Http3 {
    fn label(&self) -> &'static str {
        Self::LABEL
    }

    fn scheme(&self) -> Scheme {
        Scheme::Https
    }

    fn socket_kind(&self) -> SocketKind {
        SocketKind::Datagram
    }

    fn is_applicable(&self, scope: &BindingScope) -> bool {
        scope.config().http3.enabled && scope.config().tls_material().is_some()
    }

    fn select_address(&self, scope: &BindingScope) -> ServiceAddress {
        let config = scope.config();
        let host = config.http3.host.as_ref().unwrap_or(&config.server.host);
        ServiceAddress::inet(host.clone(), config.http3.port)
    }

    fn prepare_handler(
        &self,
        _scope: &Arc<BindingScope>,
    ) -> BoxFuture<'static, Result<ServiceHandler, BindingError>> {
        let handler = ServiceHandler::Datagram(Arc::clone(&self.datagrams));
        futures_util::future::ready(Ok(handler)).boxed()
    }

    fn alt_service(&self, scope: &BindingScope) -> Option<AltServiceSource> {
        let config = &scope.config().http3;
        if !config.advertise {
            return None;
        }
        Some(AltServiceSource {
            protocol: ALPN_H3.to_string(),
            sponsor: SecureHttp::LABEL.to_string(),
            label: Self::LABEL.to_string(),
            host: config.host.clone(),
            max_age_secs: config.max_age_secs,
        })
    }
}

/// Counts datagrams and drops them.
#[derive(Debug, Default)]
pub struct DiscardDatagrams {
    received: AtomicU64,
}

impl DiscardDatagrams {
    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }
}

impl DatagramService for DiscardDatagrams {
    fn handle(&self, payload: Bytes, peer: SocketAddr) -> Result<Option<Bytes>, BoxError> {
        self.received.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(peer = %peer, len = payload.len(), "Datagram discarded");
        Ok(None)
    }
}
