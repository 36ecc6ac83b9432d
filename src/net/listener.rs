//! Listener assembly and the serving loops behind bound channels.
//!
//! # Responsibilities
//! - Bind the mapped address through the resolved transport
//! - Accept stream connections, one permit from the worker group each
//! - Receive datagrams and hand them to the datagram service
//! - Stop accepting on shutdown; in-flight connections drain on their own

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::net::UdpSocket;

use crate::binding::contributor::{DatagramService, ServiceHandler, StreamHandler};
use crate::binding::error::BindingError;
use crate::binding::group::{ExecutionGroup, ServiceGroups};
use crate::lifecycle::Shutdown;
use crate::net::channel::BoundChannel;
use crate::net::connection::ConnectionTracker;
use crate::net::transport::{BindAddress, Transport};
use crate::observability::metrics;

/// Pause after a failed accept, e.g. when the process ran out of descriptors.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

const MAX_DATAGRAM_SIZE: usize = 65_535;

/// Everything needed to bind and serve one service.
pub struct Listener {
    pub label: &'static str,
    pub transport: Arc<dyn Transport>,
    pub address: BindAddress,
    pub groups: ServiceGroups,
}

impl Listener {
    /// Bind, then start serving on the acceptor group.
    pub async fn bind(
        self,
        handler: ServiceHandler,
        tracker: ConnectionTracker,
        shutdown: Shutdown,
    ) -> Result<Arc<BoundChannel>, BindingError> {
        let channel = Arc::new(self.transport.bind(self.address.clone()).await?);
        if channel.kind() != handler.kind() {
            return Err(BindingError::Handler(format!(
                "{} handler cannot serve a {} channel",
                handler.kind(),
                channel.kind()
            )));
        }
        let local = channel
            .local_address()
            .map_err(|e| BindingError::bind(&self.address, e))?;

        tracing::info!(
            service = self.label,
            address = %local,
            transport = self.transport.name(),
            max_connections = ?self.groups.workers().max_permits(),
            "Listener bound"
        );

        match handler {
            ServiceHandler::Stream(handler) => {
                let workers = self.groups.workers().clone();
                self.groups.acceptor().spawn(accept_loop(
                    self.label,
                    Arc::clone(&channel),
                    workers,
                    handler,
                    tracker,
                    shutdown,
                ));
            }
            ServiceHandler::Datagram(service) => {
                let socket = channel.datagram_socket().ok_or_else(|| {
                    BindingError::Handler("datagram channel without a socket".into())
                })?;
                self.groups
                    .acceptor()
                    .spawn(recv_loop(self.label, socket, service, shutdown));
            }
        }
        Ok(channel)
    }
}

async fn accept_loop(
    label: &'static str,
    channel: Arc<BoundChannel>,
    workers: ExecutionGroup,
    handler: Arc<dyn StreamHandler>,
    tracker: ConnectionTracker,
    shutdown: Shutdown,
) {
    loop {
        // Acquire permit first (backpressure)
        let permit = tokio::select! {
            _ = shutdown.wait() => break,
            permit = workers.acquire() => match permit {
                Some(permit) => permit,
                None => break,
            },
        };

        let accepted = tokio::select! {
            _ = shutdown.wait() => break,
            accepted = channel.accept() => accepted,
        };

        match accepted {
            Ok((connection, peer)) => {
                let guard = tracker.track(label);
                tracing::debug!(
                    service = label,
                    peer = %peer,
                    connection_id = %guard.id(),
                    available_permits = ?workers.available_permits(),
                    "Connection accepted"
                );
                let serve = handler.serve(connection, peer, shutdown.clone());
                workers.spawn(async move {
                    let _permit = permit;
                    let _guard = guard;
                    serve.await;
                });
            }
            Err(e) => {
                tracing::warn!(service = label, error = %e, "Accept failed");
                tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
            }
        }
    }
    tracing::info!(service = label, "Listener stopped accepting");
}

async fn recv_loop(
    label: &'static str,
    socket: Arc<UdpSocket>,
    service: Arc<dyn DatagramService>,
    shutdown: Shutdown,
) {
    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
    loop {
        let received = tokio::select! {
            _ = shutdown.wait() => break,
            received = socket.recv_from(&mut buf) => received,
        };
        let (len, peer) = match received {
            Ok(received) => received,
            Err(e) => {
                tracing::warn!(service = label, error = %e, "Datagram receive failed");
                continue;
            }
        };
        metrics::record_datagram(label);

        match service.handle(Bytes::copy_from_slice(&buf[..len]), peer) {
            Ok(Some(reply)) => {
                if let Err(e) = socket.send_to(&reply, peer).await {
                    tracing::debug!(service = label, peer = %peer, error = %e, "Datagram reply failed");
                }
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(service = label, peer = %peer, error = %e, "Datagram handler failed");
            }
        }
    }
    tracing::info!(service = label, "Datagram loop stopped");
}
