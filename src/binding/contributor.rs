//! Service contributors and the handlers they prepare.
//!
//! A contributor is a stateless description of one protocol service. The
//! coordinator asks it, in order: whether it applies, where to bind, which
//! transport to use, which groups back it and which handler serves it.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::future::BoxFuture;

use crate::binding::error::BindingError;
use crate::binding::group::ExecutionGroup;
use crate::binding::scope::BindingScope;
use crate::binding::service::{AltServiceSource, Scheme};
use crate::lifecycle::Shutdown;
use crate::net::channel::{Connection, Peer};
use crate::net::transport::{ServiceAddress, SocketKind, Transport};
use crate::stream::BoxError;

/// Serves one accepted stream connection until it ends or shutdown drains it.
pub trait StreamHandler: Send + Sync + 'static {
    fn serve(&self, connection: Connection, peer: Peer, shutdown: Shutdown) -> BoxFuture<'static, ()>;
}

/// Handles datagrams received on a bound datagram channel.
pub trait DatagramService: Send + Sync + 'static {
    /// Returns an optional reply sent back to `peer`.
    fn handle(&self, payload: Bytes, peer: SocketAddr) -> Result<Option<Bytes>, BoxError>;
}

/// The pipeline a contributor prepares for its channel.
#[derive(Clone)]
pub enum ServiceHandler {
    Stream(Arc<dyn StreamHandler>),
    Datagram(Arc<dyn DatagramService>),
}

impl ServiceHandler {
    pub fn kind(&self) -> SocketKind {
        match self {
            ServiceHandler::Stream(_) => SocketKind::Stream,
            ServiceHandler::Datagram(_) => SocketKind::Datagram,
        }
    }
}

impl std::fmt::Debug for ServiceHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ServiceHandler").field(&self.kind()).finish()
    }
}

/// One protocol service to bind.
pub trait ServiceContributor: Send + Sync {
    /// Unique key of this service in the binding scope.
    fn label(&self) -> &'static str;

    fn scheme(&self) -> Scheme;

    fn socket_kind(&self) -> SocketKind {
        SocketKind::Stream
    }

    fn is_applicable(&self, scope: &BindingScope) -> bool;

    /// Configured target; the bound address may differ after mapping.
    fn select_address(&self, scope: &BindingScope) -> ServiceAddress;

    fn resolve_transport(
        &self,
        scope: &BindingScope,
        address: &ServiceAddress,
    ) -> Result<Arc<dyn Transport>, BindingError> {
        scope.transports().resolve(address, self.socket_kind())
    }

    /// Build the handler. Runs as part of the asynchronous bind, so failures
    /// here become a failed service entry.
    fn prepare_handler(
        &self,
        scope: &Arc<BindingScope>,
    ) -> BoxFuture<'static, Result<ServiceHandler, BindingError>>;

    fn new_group(&self, scope: &BindingScope, transport: &dyn Transport, child: bool) -> ExecutionGroup {
        default_group(scope, self.label(), transport, self.socket_kind(), child)
    }

    /// Advertisement of this service as an alternate for another one.
    fn alt_service(&self, _scope: &BindingScope) -> Option<AltServiceSource> {
        None
    }
}

/// Group naming and sizing shared by the built-in contributors.
///
/// Worker groups of stream services are bounded by `server.max_connections`.
pub fn default_group(
    scope: &BindingScope,
    label: &str,
    transport: &dyn Transport,
    kind: SocketKind,
    child: bool,
) -> ExecutionGroup {
    let name = match kind {
        SocketKind::Datagram => label.to_string(),
        SocketKind::Stream if child => format!("{label}:child"),
        SocketKind::Stream => format!("{label}:parent"),
    };
    tracing::trace!(group = %name, transport = transport.name(), "Provisioning execution group");
    let group = ExecutionGroup::new(name, scope.runtime().clone());
    if child && kind == SocketKind::Stream {
        group.with_limit(scope.config().server.max_connections)
    } else {
        group
    }
}
