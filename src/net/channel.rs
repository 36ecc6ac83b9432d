//! Bound channels and the connections they accept.

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
#[cfg(unix)]
use tokio::net::{UnixListener, UnixStream};

use crate::net::transport::SocketKind;

/// Address a channel actually bound to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BoundAddress {
    Inet(SocketAddr),
    Unix(PathBuf),
}

impl BoundAddress {
    pub fn inet(&self) -> Option<SocketAddr> {
        match self {
            BoundAddress::Inet(addr) => Some(*addr),
            BoundAddress::Unix(_) => None,
        }
    }
}

impl fmt::Display for BoundAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoundAddress::Inet(addr) => write!(f, "{addr}"),
            BoundAddress::Unix(path) => write!(f, "unix:{}", path.display()),
        }
    }
}

/// A listening socket produced by a successful bind.
#[derive(Debug)]
pub enum BoundChannel {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix(UnixListener),
    Udp(Arc<UdpSocket>),
}

impl BoundChannel {
    pub fn kind(&self) -> SocketKind {
        match self {
            BoundChannel::Tcp(_) => SocketKind::Stream,
            #[cfg(unix)]
            BoundChannel::Unix(_) => SocketKind::Stream,
            BoundChannel::Udp(_) => SocketKind::Datagram,
        }
    }

    pub fn local_address(&self) -> io::Result<BoundAddress> {
        match self {
            BoundChannel::Tcp(listener) => listener.local_addr().map(BoundAddress::Inet),
            #[cfg(unix)]
            BoundChannel::Unix(listener) => {
                let addr = listener.local_addr()?;
                let path = addr.as_pathname().ok_or_else(|| {
                    io::Error::new(io::ErrorKind::AddrNotAvailable, "unnamed domain socket")
                })?;
                Ok(BoundAddress::Unix(path.to_path_buf()))
            }
            BoundChannel::Udp(socket) => socket.local_addr().map(BoundAddress::Inet),
        }
    }

    /// Accept the next connection on a stream channel.
    pub async fn accept(&self) -> io::Result<(Connection, Peer)> {
        match self {
            BoundChannel::Tcp(listener) => {
                let (stream, addr) = listener.accept().await?;
                Ok((Connection::Tcp(stream), Peer::Inet(addr)))
            }
            #[cfg(unix)]
            BoundChannel::Unix(listener) => {
                let (stream, _) = listener.accept().await?;
                Ok((Connection::Unix(stream), Peer::Unix))
            }
            BoundChannel::Udp(_) => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "datagram channels do not accept connections",
            )),
        }
    }

    /// The socket of a datagram channel.
    pub fn datagram_socket(&self) -> Option<Arc<UdpSocket>> {
        match self {
            BoundChannel::Udp(socket) => Some(Arc::clone(socket)),
            _ => None,
        }
    }
}

/// Remote end of an accepted connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Peer {
    Inet(SocketAddr),
    Unix,
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Peer::Inet(addr) => write!(f, "{addr}"),
            Peer::Unix => f.write_str("unix"),
        }
    }
}

/// An accepted stream connection.
#[derive(Debug)]
pub enum Connection {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
}

impl AsyncRead for Connection {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Connection::Tcp(stream) => Pin::new(stream).poll_read(cx, buf),
            #[cfg(unix)]
            Connection::Unix(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Connection {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Connection::Tcp(stream) => Pin::new(stream).poll_write(cx, buf),
            #[cfg(unix)]
            Connection::Unix(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Connection::Tcp(stream) => Pin::new(stream).poll_flush(cx),
            #[cfg(unix)]
            Connection::Unix(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Connection::Tcp(stream) => Pin::new(stream).poll_shutdown(cx),
            #[cfg(unix)]
            Connection::Unix(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}
