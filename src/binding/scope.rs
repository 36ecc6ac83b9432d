//! The binding scope: shared state of one bind attempt.
//!
//! Contributors register into concurrent maps keyed by service label. The
//! aggregate future completes when the `remaining` barrier reaches zero; it
//! starts at one so completions racing ahead of registration cannot fire it
//! early, and [`BindingScope::seal`] removes that guard.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::http::HeaderValue;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use tokio::runtime::Handle;
use tokio::sync::watch;
use uuid::Uuid;

use crate::binding::error::BindingError;
use crate::binding::group::ExecutionGroup;
use crate::binding::service::{AltServiceSource, Service, ServiceBinding};
use crate::config::ServerConfig;
use crate::lifecycle::Shutdown;
use crate::net::channel::BoundChannel;
use crate::net::connection::ConnectionTracker;
use crate::net::transport::{Transport, TransportRegistry};
use crate::observability::metrics;

/// Outcome of the asynchronous part of one bind.
pub type BindOutcome = Result<(Arc<BoundChannel>, ServiceBinding), Arc<BindingError>>;

/// In-flight bind, shareable so introspection can await it too.
pub type PendingBind = Shared<BoxFuture<'static, BindOutcome>>;

pub struct BindingScope {
    id: Uuid,
    config: Arc<ServerConfig>,
    registry: Arc<TransportRegistry>,
    shutdown: Shutdown,
    connections: ConnectionTracker,
    runtime: Handle,

    transports: DashMap<String, Arc<dyn Transport>>,
    groups: DashMap<String, ExecutionGroup>,
    channels: DashMap<String, Arc<BoundChannel>>,
    pending: DashMap<String, PendingBind>,
    services: DashMap<String, Service>,
    alt_services: DashMap<String, AltServiceSource>,

    remaining: AtomicUsize,
    done: watch::Sender<bool>,
}

fn insert_unique<V>(
    map: &DashMap<String, V>,
    registry: &'static str,
    key: impl Into<String>,
    value: V,
) -> Result<(), BindingError> {
    match map.entry(key.into()) {
        Entry::Occupied(entry) => Err(BindingError::DuplicateRegistration {
            registry,
            key: entry.key().clone(),
        }),
        Entry::Vacant(entry) => {
            entry.insert(value);
            Ok(())
        }
    }
}

impl BindingScope {
    /// Must be called within a Tokio runtime; groups spawn onto its handle.
    pub fn new(
        config: Arc<ServerConfig>,
        registry: Arc<TransportRegistry>,
        shutdown: Shutdown,
    ) -> Self {
        let (done, _) = watch::channel(false);
        Self {
            id: Uuid::new_v4(),
            config,
            registry,
            shutdown,
            connections: ConnectionTracker::new(),
            runtime: Handle::current(),
            transports: DashMap::new(),
            groups: DashMap::new(),
            channels: DashMap::new(),
            pending: DashMap::new(),
            services: DashMap::new(),
            alt_services: DashMap::new(),
            remaining: AtomicUsize::new(1),
            done,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn transports(&self) -> &TransportRegistry {
        &self.registry
    }

    pub fn shutdown(&self) -> &Shutdown {
        &self.shutdown
    }

    pub fn connections(&self) -> &ConnectionTracker {
        &self.connections
    }

    pub fn runtime(&self) -> &Handle {
        &self.runtime
    }

    pub fn register_transport(
        &self,
        label: &str,
        transport: Arc<dyn Transport>,
    ) -> Result<(), BindingError> {
        insert_unique(&self.transports, "transport", label, transport)
    }

    pub fn register_group(&self, key: &str, group: ExecutionGroup) -> Result<(), BindingError> {
        insert_unique(&self.groups, "group", key, group)
    }

    pub fn register_alt_service(&self, source: AltServiceSource) -> Result<(), BindingError> {
        let label = source.label.clone();
        insert_unique(&self.alt_services, "alt-service", label, source)
    }

    /// Register an in-flight bind and classify its outcome once it settles.
    pub fn register_pending(
        self: &Arc<Self>,
        label: &str,
        bind: BoxFuture<'static, BindOutcome>,
    ) -> Result<(), BindingError> {
        let bind = bind.shared();
        insert_unique(&self.pending, "pending", label, bind.clone())?;
        self.remaining.fetch_add(1, Ordering::AcqRel);

        let scope = Arc::clone(self);
        let label = label.to_string();
        self.runtime.spawn(async move {
            let service = match bind.await {
                Ok((channel, binding)) => {
                    if let Err(e) = scope.register_channel(&label, channel) {
                        tracing::error!(service = %label, error = %e, "Channel registered twice");
                    }
                    Service::bound(label, binding)
                }
                Err(e) => Service::failed(label, e),
            };
            scope.finalize(service);
        });
        Ok(())
    }

    /// Register a service that failed before any bind was issued.
    pub fn register_failed(
        self: &Arc<Self>,
        label: &str,
        error: BindingError,
    ) -> Result<(), BindingError> {
        let outcome: BindOutcome = Err(Arc::new(error));
        self.register_pending(label, futures_util::future::ready(outcome).boxed())
    }

    fn register_channel(&self, label: &str, channel: Arc<BoundChannel>) -> Result<(), BindingError> {
        insert_unique(&self.channels, "channel", label, channel)
    }

    fn finalize(&self, service: Service) {
        match &service.outcome {
            Ok(binding) => {
                tracing::info!(scope = %self.id, service = %service.label, address = %binding.address, "Service bound");
            }
            Err(e) => {
                tracing::warn!(scope = %self.id, service = %service.label, error = %e, "Service failed to bind");
            }
        }
        metrics::record_bind(&service.label, service.is_bound());
        self.services.insert(service.label.clone(), service);
        self.release();
    }

    /// Every contributor has registered; the barrier may now reach zero.
    pub fn seal(&self) {
        self.release();
    }

    fn release(&self) {
        if self.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.done.send_replace(true);
        }
    }

    /// Pending binds not yet finalized, including the registration guard until sealed.
    pub fn remaining(&self) -> usize {
        self.remaining.load(Ordering::Acquire)
    }

    pub fn is_complete(&self) -> bool {
        *self.done.borrow()
    }

    /// Resolves with every finalized service, sorted by label, once all
    /// registered binds have settled.
    pub fn bind_future(self: &Arc<Self>) -> BoxFuture<'static, Vec<Service>> {
        let scope = Arc::clone(self);
        let mut done = self.done.subscribe();
        async move {
            let _ = done.wait_for(|complete| *complete).await;
            scope.services()
        }
        .boxed()
    }

    pub fn services(&self) -> Vec<Service> {
        let mut services: Vec<Service> = self
            .services
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        services.sort_by(|a, b| a.label.cmp(&b.label));
        services
    }

    pub fn service(&self, label: &str) -> Option<Service> {
        self.services.get(label).map(|entry| entry.value().clone())
    }

    pub fn binding(&self, label: &str) -> Option<ServiceBinding> {
        self.services
            .get(label)
            .and_then(|entry| entry.value().binding().cloned())
    }

    pub fn transport(&self, label: &str) -> Option<Arc<dyn Transport>> {
        self.transports.get(label).map(|entry| Arc::clone(entry.value()))
    }

    pub fn group(&self, key: &str) -> Option<ExecutionGroup> {
        self.groups.get(key).map(|entry| entry.value().clone())
    }

    pub fn channel(&self, label: &str) -> Option<Arc<BoundChannel>> {
        self.channels.get(label).map(|entry| Arc::clone(entry.value()))
    }

    pub fn pending(&self, label: &str) -> Option<PendingBind> {
        self.pending.get(label).map(|entry| entry.value().clone())
    }

    pub fn alt_service(&self, label: &str) -> Option<AltServiceSource> {
        self.alt_services.get(label).map(|entry| entry.value().clone())
    }

    /// `alt-svc` value for responses of `sponsor`, from every bound alternate it sponsors.
    pub fn alt_svc_header(&self, sponsor: &str) -> Option<HeaderValue> {
        let sponsor_binding = self.binding(sponsor)?;
        let entries: Vec<String> = self
            .alt_services
            .iter()
            .filter(|entry| entry.value().sponsor == sponsor)
            .filter_map(|entry| {
                let source = entry.value();
                let alternate = self.binding(&source.label)?;
                source.advertise(&sponsor_binding, &alternate)
            })
            .collect();
        if entries.is_empty() {
            return None;
        }
        HeaderValue::from_str(&entries.join(", ")).ok()
    }
}

impl std::fmt::Debug for BindingScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BindingScope")
            .field("id", &self.id)
            .field("remaining", &self.remaining())
            .field("services", &self.services.len())
            .finish()
    }
}
