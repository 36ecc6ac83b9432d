//! The binding coordinator.
//!
//! # Flow (per contributor, independently)
//! ```text
//! applicable? ─no─▶ skip
//!     │
//! select address ─▶ resolve transport
//!     │                   │ failure ─▶ failed service entry
//! provision groups (label:parent/label:child or label)
//!     │
//! map address ─▶ prepare handler ─▶ bind ─▶ serve   (asynchronous, registered as pending)
//!     │
//! settle ─▶ Service(label, Ok(binding) | Err(cause))
//! ```
//! Per-service failures never escape; only registration conflicts do.

use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt};

use crate::binding::contributor::ServiceContributor;
use crate::binding::error::BindingError;
use crate::binding::group::ServiceGroups;
use crate::binding::scope::{BindOutcome, BindingScope};
use crate::binding::service::{Service, ServiceBinding};
use crate::net::listener::Listener;
use crate::net::transport::SocketKind;

#[derive(Default)]
pub struct BindingCoordinator {
    contributors: Vec<Arc<dyn ServiceContributor>>,
}

impl BindingCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, contributor: impl ServiceContributor + 'static) -> Self {
        self.contributors.push(Arc::new(contributor));
        self
    }

    pub fn push(&mut self, contributor: Arc<dyn ServiceContributor>) {
        self.contributors.push(contributor);
    }

    pub fn contributors(&self) -> impl Iterator<Item = &Arc<dyn ServiceContributor>> {
        self.contributors.iter()
    }

    /// Issue every applicable bind and return the aggregate future.
    ///
    /// Never waits on a bind. Fails only on a registration conflict, which is
    /// a programming error; the scope is sealed either way. On failure the
    /// scope's shutdown is triggered so binds already issued stop serving.
    pub fn bind(
        &self,
        scope: &Arc<BindingScope>,
    ) -> Result<BoxFuture<'static, Vec<Service>>, BindingError> {
        let result = self
            .contributors
            .iter()
            .try_for_each(|contributor| contribute(contributor.as_ref(), scope));
        scope.seal();
        if let Err(e) = result {
            tracing::error!(scope = %scope.id(), error = %e, "Binding aborted, stopping issued binds");
            scope.shutdown().trigger();
            return Err(e);
        }
        Ok(scope.bind_future())
    }
}

fn contribute(
    contributor: &dyn ServiceContributor,
    scope: &Arc<BindingScope>,
) -> Result<(), BindingError> {
    let label = contributor.label();
    if !contributor.is_applicable(scope) {
        tracing::debug!(service = label, "Service not applicable, skipping");
        return Ok(());
    }

    let address = contributor.select_address(scope);
    let transport = match contributor.resolve_transport(scope, &address) {
        Ok(transport) => transport,
        Err(e) => return fail_early(scope, label, e),
    };
    scope.register_transport(label, Arc::clone(&transport))?;

    tracing::debug!(
        service = label,
        address = %address,
        transport = transport.name(),
        "Transport resolved"
    );

    let groups = match contributor.socket_kind() {
        SocketKind::Stream => {
            let acceptor = contributor.new_group(scope, transport.as_ref(), false);
            let workers = contributor.new_group(scope, transport.as_ref(), true);
            scope.register_group(&format!("{label}:parent"), acceptor.clone())?;
            scope.register_group(&format!("{label}:child"), workers.clone())?;
            ServiceGroups::Split { acceptor, workers }
        }
        SocketKind::Datagram => {
            let group = contributor.new_group(scope, transport.as_ref(), false);
            scope.register_group(label, group.clone())?;
            ServiceGroups::Single(group)
        }
    };

    if let Some(source) = contributor.alt_service(scope) {
        scope.register_alt_service(source)?;
    }

    let mapping = transport.map_address(&address);
    let handler = contributor.prepare_handler(scope);
    let scheme = contributor.scheme();
    let tracker = scope.connections().clone();
    let shutdown = scope.shutdown().clone();

    let bind = async move {
        let bind_address = mapping.await?;
        tracing::debug!(service = label, bind_address = %bind_address, "Address mapped");
        let handler = handler.await?;
        let listener = Listener {
            label,
            transport,
            address: bind_address,
            groups,
        };
        let channel = listener.bind(handler, tracker, shutdown).await?;
        let address = channel
            .local_address()
            .map_err(|e| BindingError::bind(label, e))?;
        Ok::<_, BindingError>((channel, ServiceBinding { address, scheme }))
    }
    .map(|outcome| -> BindOutcome { outcome.map_err(Arc::new) })
    .boxed();

    scope.register_pending(label, bind)
}

fn fail_early(
    scope: &Arc<BindingScope>,
    label: &'static str,
    error: BindingError,
) -> Result<(), BindingError> {
    if error.is_fatal() {
        return Err(error);
    }
    scope.register_failed(label, error)
}
