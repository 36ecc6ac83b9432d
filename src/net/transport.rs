//! Transports and their registry.
//!
//! A transport turns a configured [`ServiceAddress`] into a bound channel.
//! The registry is built once at the composition root and passed down; its
//! single override slot can be filled exactly once.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use futures_util::future::{BoxFuture, FutureExt};
use tokio::net::{TcpListener, UdpSocket};

use crate::binding::error::BindingError;
use crate::net::channel::BoundChannel;

/// Address family a service targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressClass {
    Inet,
    Domain,
}

impl fmt::Display for AddressClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressClass::Inet => f.write_str("inet"),
            AddressClass::Domain => f.write_str("domain"),
        }
    }
}

/// Connection-oriented or datagram socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SocketKind {
    Stream,
    Datagram,
}

impl fmt::Display for SocketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SocketKind::Stream => f.write_str("stream"),
            SocketKind::Datagram => f.write_str("datagram"),
        }
    }
}

/// Address as configured for a service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceAddress {
    Inet { host: String, port: u16 },
    Domain(PathBuf),
}

impl ServiceAddress {
    pub fn inet(host: impl Into<String>, port: u16) -> Self {
        ServiceAddress::Inet {
            host: host.into(),
            port,
        }
    }

    pub fn class(&self) -> AddressClass {
        match self {
            ServiceAddress::Inet { .. } => AddressClass::Inet,
            ServiceAddress::Domain(_) => AddressClass::Domain,
        }
    }
}

impl fmt::Display for ServiceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceAddress::Inet { host, port } => write!(f, "{host}:{port}"),
            ServiceAddress::Domain(path) => write!(f, "unix:{}", path.display()),
        }
    }
}

/// Address after transport-specific translation, ready to bind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindAddress {
    Inet(SocketAddr),
    Domain(PathBuf),
}

impl fmt::Display for BindAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindAddress::Inet(addr) => write!(f, "{addr}"),
            BindAddress::Domain(path) => write!(f, "unix:{}", path.display()),
        }
    }
}

/// A concrete way of binding a listening socket.
pub trait Transport: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    fn supports(&self, class: AddressClass, kind: SocketKind) -> bool;

    /// Translate a configured address into the address to bind.
    fn map_address(
        &self,
        address: &ServiceAddress,
    ) -> BoxFuture<'static, Result<BindAddress, BindingError>> {
        map_default(address.clone()).boxed()
    }

    fn bind(&self, address: BindAddress) -> BoxFuture<'static, Result<BoundChannel, BindingError>>;
}

/// Resolve inet hosts (`localhost` maps to loopback) and pass paths through.
///
/// Names other than `localhost` go through the runtime's non-blocking lookup.
pub async fn map_default(address: ServiceAddress) -> Result<BindAddress, BindingError> {
    let (host, port) = match &address {
        ServiceAddress::Domain(path) => return Ok(BindAddress::Domain(path.clone())),
        ServiceAddress::Inet { host, port } => (host.as_str(), *port),
    };
    if host.eq_ignore_ascii_case("localhost") {
        return Ok(BindAddress::Inet(SocketAddr::new(
            IpAddr::V4(Ipv4Addr::LOCALHOST),
            port,
        )));
    }
    if let Ok(ip) = host.trim_matches(['[', ']']).parse::<IpAddr>() {
        return Ok(BindAddress::Inet(SocketAddr::new(ip, port)));
    }
    let invalid = |reason: String| BindingError::InvalidAddress {
        address: address.to_string(),
        reason,
    };
    let mut resolved = tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| invalid(e.to_string()))?;
    resolved
        .next()
        .map(BindAddress::Inet)
        .ok_or_else(|| invalid("host resolved to no addresses".into()))
}

fn expect_inet(transport: &str, address: &BindAddress) -> Result<SocketAddr, BindingError> {
    match address {
        BindAddress::Inet(addr) => Ok(*addr),
        BindAddress::Domain(_) => Err(BindingError::InvalidAddress {
            address: address.to_string(),
            reason: format!("{transport} transport binds inet addresses only"),
        }),
    }
}

/// TCP listener transport.
#[derive(Debug, Default)]
pub struct TcpTransport;

impl Transport for TcpTransport {
    fn name(&self) -> &'static str {
        "tcp"
    }

    fn supports(&self, class: AddressClass, kind: SocketKind) -> bool {
        class == AddressClass::Inet && kind == SocketKind::Stream
    }

    fn bind(&self, address: BindAddress) -> BoxFuture<'static, Result<BoundChannel, BindingError>> {
        async move {
            let addr = expect_inet("tcp", &address)?;
            let listener = TcpListener::bind(addr)
                .await
                .map_err(|e| BindingError::bind(addr, e))?;
            Ok(BoundChannel::Tcp(listener))
        }
        .boxed()
    }
}

/// UDP socket transport.
#[derive(Debug, Default)]
pub struct UdpTransport;

impl Transport for UdpTransport {
    fn name(&self) -> &'static str {
        "udp"
    }

    fn supports(&self, class: AddressClass, kind: SocketKind) -> bool {
        class == AddressClass::Inet && kind == SocketKind::Datagram
    }

    fn bind(&self, address: BindAddress) -> BoxFuture<'static, Result<BoundChannel, BindingError>> {
        async move {
            let addr = expect_inet("udp", &address)?;
            let socket = UdpSocket::bind(addr)
                .await
                .map_err(|e| BindingError::bind(addr, e))?;
            Ok(BoundChannel::Udp(Arc::new(socket)))
        }
        .boxed()
    }
}

/// Unix domain socket transport.
#[cfg(unix)]
#[derive(Debug, Default)]
pub struct UnixTransport;

#[cfg(unix)]
impl Transport for UnixTransport {
    fn name(&self) -> &'static str {
        "unix"
    }

    fn supports(&self, class: AddressClass, kind: SocketKind) -> bool {
        class == AddressClass::Domain && kind == SocketKind::Stream
    }

    fn bind(&self, address: BindAddress) -> BoxFuture<'static, Result<BoundChannel, BindingError>> {
        async move {
            let BindAddress::Domain(path) = &address else {
                return Err(BindingError::InvalidAddress {
                    address: address.to_string(),
                    reason: "unix transport binds socket paths only".into(),
                });
            };
            remove_stale_socket(path);
            let listener = tokio::net::UnixListener::bind(path)
                .map_err(|e| BindingError::bind(&address, e))?;
            Ok(BoundChannel::Unix(listener))
        }
        .boxed()
    }
}

/// A socket file left behind by a previous process blocks the bind.
#[cfg(unix)]
fn remove_stale_socket(path: &std::path::Path) {
    use std::os::unix::fs::FileTypeExt;

    let is_socket = std::fs::symlink_metadata(path)
        .map(|meta| meta.file_type().is_socket())
        .unwrap_or(false);
    if is_socket {
        match std::fs::remove_file(path) {
            Ok(()) => tracing::debug!(path = %path.display(), "Removed stale socket file"),
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "Failed to remove stale socket file"),
        }
    }
}

struct Preferred(Arc<dyn Transport>);

/// Available transports in preference order, plus a swap-once override.
pub struct TransportRegistry {
    available: Vec<Arc<dyn Transport>>,
    preferred: ArcSwapOption<Preferred>,
    sealed: AtomicBool,
}

impl TransportRegistry {
    pub fn new(available: Vec<Arc<dyn Transport>>) -> Self {
        Self {
            available,
            preferred: ArcSwapOption::empty(),
            sealed: AtomicBool::new(false),
        }
    }

    /// Every transport this platform supports.
    pub fn platform() -> Self {
        let mut available: Vec<Arc<dyn Transport>> = vec![Arc::new(TcpTransport)];
        #[cfg(unix)]
        available.push(Arc::new(UnixTransport));
        available.push(Arc::new(UdpTransport));
        Self::new(available)
    }

    pub fn find(&self, name: &str) -> Option<Arc<dyn Transport>> {
        self.available
            .iter()
            .find(|transport| transport.name() == name)
            .cloned()
    }

    /// Install the override. Succeeds once per registry.
    pub fn install_override(&self, transport: Arc<dyn Transport>) -> Result<(), BindingError> {
        if self.sealed.swap(true, Ordering::AcqRel) {
            return Err(BindingError::TransportSealed);
        }
        tracing::info!(transport = transport.name(), "Transport override installed");
        self.preferred.store(Some(Arc::new(Preferred(transport))));
        Ok(())
    }

    pub fn install_override_named(&self, name: &str) -> Result<(), BindingError> {
        let transport = self
            .find(name)
            .ok_or_else(|| BindingError::UnknownTransport(name.to_string()))?;
        self.install_override(transport)
    }

    pub fn override_transport(&self) -> Option<Arc<dyn Transport>> {
        self.preferred
            .load_full()
            .map(|preferred| Arc::clone(&preferred.0))
    }

    /// Pick the override when it fits the address, else the first compatible transport.
    pub fn resolve(
        &self,
        address: &ServiceAddress,
        kind: SocketKind,
    ) -> Result<Arc<dyn Transport>, BindingError> {
        let class = address.class();
        if let Some(preferred) = self.override_transport() {
            if preferred.supports(class, kind) {
                return Ok(preferred);
            }
            tracing::debug!(
                transport = preferred.name(),
                %class,
                %kind,
                "Override does not fit address, resolving best available"
            );
        }
        self.available
            .iter()
            .find(|transport| transport.supports(class, kind))
            .cloned()
            .ok_or_else(|| BindingError::NoCompatibleTransport {
                address: address.to_string(),
                class,
                kind,
            })
    }
}

impl Default for TransportRegistry {
    fn default() -> Self {
        Self::platform()
    }
}

impl fmt::Debug for TransportRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<_> = self.available.iter().map(|t| t.name()).collect();
        f.debug_struct("TransportRegistry")
            .field("available", &names)
            .field("override", &self.override_transport().map(|t| t.name()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_by_address_class_and_kind() {
        let registry = TransportRegistry::platform();
        let inet = ServiceAddress::inet("127.0.0.1", 0);
        assert_eq!(registry.resolve(&inet, SocketKind::Stream).unwrap().name(), "tcp");
        assert_eq!(registry.resolve(&inet, SocketKind::Datagram).unwrap().name(), "udp");
    }

    #[cfg(unix)]
    #[test]
    fn domain_sockets_use_unix_transport() {
        let registry = TransportRegistry::platform();
        let path = ServiceAddress::Domain("/tmp/polyserve-test.sock".into());
        assert_eq!(registry.resolve(&path, SocketKind::Stream).unwrap().name(), "unix");
        let err = registry.resolve(&path, SocketKind::Datagram).unwrap_err();
        assert!(matches!(
            err,
            BindingError::NoCompatibleTransport {
                class: AddressClass::Domain,
                kind: SocketKind::Datagram,
                ..
            }
        ));
    }

    #[test]
    fn empty_registry_has_no_compatible_transport() {
        let registry = TransportRegistry::new(Vec::new());
        let err = registry
            .resolve(&ServiceAddress::inet("127.0.0.1", 80), SocketKind::Stream)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "no compatible transport for stream socket on inet address 127.0.0.1:80"
        );
    }

    #[test]
    fn override_installs_once_and_falls_back_when_unfit() {
        let registry = TransportRegistry::new(vec![Arc::new(TcpTransport), Arc::new(UdpTransport)]);
        registry.install_override_named("udp").unwrap();
        assert!(matches!(
            registry.install_override(Arc::new(TcpTransport)),
            Err(BindingError::TransportSealed)
        ));

        let inet = ServiceAddress::inet("127.0.0.1", 0);
        assert_eq!(registry.resolve(&inet, SocketKind::Datagram).unwrap().name(), "udp");
        // udp cannot serve a stream socket; best available wins
        assert_eq!(registry.resolve(&inet, SocketKind::Stream).unwrap().name(), "tcp");
    }

    #[test]
    fn unknown_override_name_is_rejected() {
        let registry = TransportRegistry::platform();
        assert!(matches!(
            registry.install_override_named("io_uring"),
            Err(BindingError::UnknownTransport(name)) if name == "io_uring"
        ));
        assert!(registry.override_transport().is_none());
    }

    #[tokio::test]
    async fn maps_localhost_and_literals() {
        assert_eq!(
            map_default(ServiceAddress::inet("localhost", 8080)).await.unwrap(),
            BindAddress::Inet("127.0.0.1:8080".parse().unwrap())
        );
        assert_eq!(
            map_default(ServiceAddress::inet("[::1]", 8443)).await.unwrap(),
            BindAddress::Inet("[::1]:8443".parse().unwrap())
        );
    }

    #[tokio::test]
    async fn unresolvable_host_is_an_invalid_address() {
        let err = TcpTransport
            .map_address(&ServiceAddress::inet("polyserve.invalid", 8080))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BindingError::InvalidAddress { ref address, .. } if address == "polyserve.invalid:8080"
        ));
    }

    #[tokio::test]
    async fn tcp_bind_reports_local_address() {
        let channel = TcpTransport
            .bind(BindAddress::Inet("127.0.0.1:0".parse().unwrap()))
            .await
            .unwrap();
        let bound = channel.local_address().unwrap().inet().unwrap();
        assert_ne!(bound.port(), 0);
        assert_eq!(channel.kind(), SocketKind::Stream);
    }
}
