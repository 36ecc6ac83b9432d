//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! ServiceAddress
//!     → transport.rs (resolve transport, map address, bind)
//!     → channel.rs (bound listener or datagram socket)
//!     → listener.rs (accept/receive loop, connection limits)
//!     → tls.rs (optional TLS material for secured services)
//!     → connection.rs (lifecycle tracking for graceful drain)
//!     → Hand off to the service handler
//! ```
//!
//! # Design Decisions
//! - Transports are chosen per address class and socket kind
//! - Bounded worker groups prevent resource exhaustion
//! - Each connection tracked for graceful shutdown

pub mod channel;
pub mod connection;
pub mod listener;
pub mod tls;
pub mod transport;

pub use channel::{BoundAddress, BoundChannel, Connection, Peer};
pub use connection::{ConnectionGuard, ConnectionId, ConnectionTracker};
pub use listener::Listener;
pub use transport::{
    AddressClass, BindAddress, ServiceAddress, SocketKind, Transport, TransportRegistry,
};
