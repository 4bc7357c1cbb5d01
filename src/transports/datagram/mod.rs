//! Datagram (UDP) transport.
//!
//! Any packet sent to the socket is answered with exactly one packet
//! holding the payload. What the client sent is ignored.
//!
//! ## Exchange
//!
//! ```text
//! client -> server: <anything, up to 1024 bytes read>
//! server -> client: <payload bytes>
//! ```
//!
//! Receive and reply happen in one loop without per-client tasks. Errors on
//! either side are logged and the loop carries on. Replies are never
//! retried.

use crate::payload::Payload;
use crate::server::{ServeError, Transport};
use bytes::Bytes;
use std::net::SocketAddr;
use tokio::net::UdpSocket;
use tracing::{error, info, warn};

/// Size of the receive buffer. Longer datagrams are truncated, which is
/// harmless since their content is discarded.
pub const RECV_BUFFER_SIZE: usize = 1024;

/// UDP server replying to every packet with the payload.
pub struct DatagramServer {
    socket: UdpSocket,
    payload: Bytes,
}

impl DatagramServer {
    /// Bind the socket. Failing to bind is fatal to the caller.
    pub fn bind(addr: SocketAddr, payload: Payload) -> Result<Self, ServeError> {
        let socket = super::bind_udp_socket(addr)?;

        Ok(DatagramServer {
            socket,
            payload: payload.bytes().clone(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServeError> {
        self.socket.local_addr().map_err(|source| ServeError::Io {
            transport: Transport::Datagram,
            source,
        })
    }

    /// Receive and reply forever.
    pub async fn run(self) -> Result<(), ServeError> {
        info!(addr = %self.local_addr()?, "Listening for UDP connections");

        let mut buf = [0u8; RECV_BUFFER_SIZE];
        loop {
            let peer = match self.socket.recv_from(&mut buf).await {
                Ok((_, peer)) => peer,
                Err(e) => {
                    error!(error = %e, "Error reading data from client");
                    continue;
                }
            };

            info!(ip = %peer.ip(), "Accepted new UDP connection from client");
            self.reply(peer).await;
        }
    }

    async fn reply(&self, peer: SocketAddr) {
        match self.socket.send_to(&self.payload, peer).await {
            Ok(sent) if sent < self.payload.len() => {
                warn!(%peer, sent, bytes = self.payload.len(), "Short UDP write");
            }
            Ok(sent) => {
                info!(ip = %peer.ip(), bytes = sent, "Finished serving content over UDP");
            }
            Err(e) => {
                error!(%peer, error = %e, "Error sending content to client");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::PayloadSource;
    use std::time::Duration;
    use tokio::time::timeout;

    async fn start(payload: &'static [u8]) -> SocketAddr {
        let payload = Payload::new(payload, PayloadSource::Inline);
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let server = DatagramServer::bind(addr, payload).unwrap();
        let addr = server.local_addr().unwrap();
        tokio::spawn(server.run());
        addr
    }

    async fn client() -> UdpSocket {
        UdpSocket::bind("127.0.0.1:0").await.unwrap()
    }

    #[tokio::test]
    async fn test_port_in_use_is_bind_error() {
        let addr = start(b"flag{first}").await;
        let payload = Payload::new(&b"flag{second}"[..], PayloadSource::Inline);

        match DatagramServer::bind(addr, payload) {
            Err(ServeError::Bind { transport, addr: failed, .. }) => {
                assert_eq!(transport, Transport::Datagram);
                assert_eq!(failed, addr);
            }
            Ok(_) => panic!("second datagram bind on {addr} succeeded"),
            Err(other) => panic!("unexpected: {other}"),
        }
    }

    #[tokio::test]
    async fn test_packet_gets_payload() {
        let addr = start(b"flag{datagram}").await;
        let socket = client().await;

        socket.send_to(b"hello", addr).await.unwrap();

        let mut buf = [0u8; 2048];
        let (n, from) = timeout(Duration::from_secs(5), socket.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&buf[..n], b"flag{datagram}");
        assert_eq!(from, addr);
    }

    #[tokio::test]
    async fn test_exactly_one_reply_per_packet() {
        let addr = start(b"flag{once}").await;
        let socket = client().await;

        // oversized request, content is irrelevant
        socket.send_to(&[7u8; 4000], addr).await.unwrap();

        let mut buf = [0u8; 2048];
        let (n, _) = timeout(Duration::from_secs(5), socket.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&buf[..n], b"flag{once}");

        let second = timeout(Duration::from_millis(200), socket.recv_from(&mut buf)).await;
        assert!(second.is_err(), "received an unexpected second reply");
    }

    #[tokio::test]
    async fn test_repeated_packets_each_get_a_reply() {
        let addr = start(b"flag{again}").await;
        let socket = client().await;
        let mut buf = [0u8; 2048];

        for _ in 0..5 {
            socket.send_to(b"x", addr).await.unwrap();
            let (n, _) = timeout(Duration::from_secs(5), socket.recv_from(&mut buf))
                .await
                .unwrap()
                .unwrap();
            assert_eq!(&buf[..n], b"flag{again}");
        }
    }

    #[tokio::test]
    async fn test_empty_datagram_still_answered() {
        let addr = start(b"flag{empty-req}").await;
        let socket = client().await;

        socket.send_to(&[], addr).await.unwrap();

        let mut buf = [0u8; 2048];
        let (n, _) = timeout(Duration::from_secs(5), socket.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&buf[..n], b"flag{empty-req}");
    }
}
