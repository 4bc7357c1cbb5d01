//! Transport implementations.
//!
//! Each transport binds once and then loops forever, handing the same
//! payload to every client:
//! - `stream`: TCP, one spawned serve task per accepted connection
//! - `datagram`: UDP, one reply packet per received packet
//! - `http`: a single HTTP/1 route on top of hyper

pub mod datagram;
pub mod http;
pub mod stream;

pub use datagram::DatagramServer;
pub use http::HttpServer;
pub use stream::StreamServer;

use crate::server::{ServeError, Transport};
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::SocketAddr;

/// Listen backlog for TCP based transports.
const LISTEN_BACKLOG: i32 = 1024;

fn domain_for(addr: SocketAddr) -> Domain {
    match addr {
        SocketAddr::V4(_) => Domain::IPV4,
        SocketAddr::V6(_) => Domain::IPV6,
    }
}

/// Create a non-blocking TCP listener registered with the tokio reactor.
pub(crate) fn bind_tcp_listener(
    addr: SocketAddr,
    transport: Transport,
) -> Result<tokio::net::TcpListener, ServeError> {
    let bind = || -> io::Result<tokio::net::TcpListener> {
        let socket = Socket::new(domain_for(addr), Type::STREAM, Some(Protocol::TCP))?;
        socket.set_reuse_address(true)?;
        socket.set_nonblocking(true)?;
        socket.bind(&addr.into())?;
        socket.listen(LISTEN_BACKLOG)?;
        tokio::net::TcpListener::from_std(socket.into())
    };

    bind().map_err(|source| ServeError::Bind {
        transport,
        addr,
        source,
    })
}

/// Create a non-blocking UDP socket registered with the tokio reactor.
pub(crate) fn bind_udp_socket(addr: SocketAddr) -> Result<tokio::net::UdpSocket, ServeError> {
    let bind = || -> io::Result<tokio::net::UdpSocket> {
        // no SO_REUSEADDR: Linux would let a second UDP socket share the port
        let socket = Socket::new(domain_for(addr), Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_nonblocking(true)?;
        socket.bind(&addr.into())?;
        tokio::net::UdpSocket::from_std(socket.into())
    };

    bind().map_err(|source| ServeError::Bind {
        transport: Transport::Datagram,
        addr,
        source,
    })
}
