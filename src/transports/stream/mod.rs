//! Stream (TCP) transport.
//!
//! Every accepted connection gets the whole payload and is then closed.
//! The server never reads from the client.
//!
//! ## Exchange
//!
//! ```text
//! client connects
//! server -> client: <payload bytes>
//! server closes the connection
//! ```
//!
//! Each connection is served by its own task, so a slow client never holds
//! up the accept loop. The number of concurrent serve tasks is unbounded
//! unless a connection cap is configured.

pub mod handler;

use crate::payload::Payload;
use crate::server::{ServeError, Transport};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tracing::{debug, error, info};

pub use handler::handle_connection;

/// TCP server handing the payload to every connection.
pub struct StreamServer {
    listener: TcpListener,
    payload: Payload,
    connection_limit: Option<Arc<Semaphore>>,
}

impl StreamServer {
    /// Bind the listener. Failing to bind is fatal to the caller.
    pub fn bind(
        addr: SocketAddr,
        payload: Payload,
        max_connections: Option<usize>,
    ) -> Result<Self, ServeError> {
        let listener = super::bind_tcp_listener(addr, Transport::Stream)?;

        Ok(StreamServer {
            listener,
            payload,
            connection_limit: max_connections.map(|n| Arc::new(Semaphore::new(n))),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServeError> {
        self.listener.local_addr().map_err(|source| ServeError::Io {
            transport: Transport::Stream,
            source,
        })
    }

    /// Accept connections forever.
    pub async fn run(self) -> Result<(), ServeError> {
        info!(
            addr = %self.local_addr()?,
            max_connections = ?self.connection_limit.as_ref().map(|s| s.available_permits()),
            "Listening for TCP connections"
        );

        loop {
            // Wait for a connection slot when a cap is configured
            let permit = match &self.connection_limit {
                Some(limit) => match Arc::clone(limit).acquire_owned().await {
                    Ok(permit) => Some(permit),
                    Err(e) => {
                        // only reachable if the semaphore was closed
                        return Err(ServeError::Io {
                            transport: Transport::Stream,
                            source: std::io::Error::other(e),
                        });
                    }
                },
                None => None,
            };

            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    debug!(%peer, "New connection");
                    let payload = self.payload.bytes().clone();

                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, peer, payload).await {
                            debug!(%peer, error = %e, "Connection error");
                        }
                        drop(permit);
                    });
                }
                Err(e) => {
                    error!(error = %e, "Error accepting connection from client");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::PayloadSource;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpStream;

    async fn start(payload: &'static [u8], max_connections: Option<usize>) -> SocketAddr {
        let payload = Payload::new(payload, PayloadSource::Inline);
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let server = StreamServer::bind(addr, payload, max_connections).unwrap();
        let addr = server.local_addr().unwrap();
        tokio::spawn(server.run());
        addr
    }

    async fn fetch(addr: SocketAddr) -> Vec<u8> {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let mut received = Vec::new();
        // read_to_end only returns once the server closed the connection
        stream.read_to_end(&mut received).await.unwrap();
        received
    }

    #[tokio::test]
    async fn test_single_client_gets_payload_then_eof() {
        let addr = start(b"flag{stream}", None).await;
        assert_eq!(fetch(addr).await, b"flag{stream}");
    }

    #[tokio::test]
    async fn test_concurrent_clients() {
        let addr = start(b"flag{many}\n", None).await;

        let clients: Vec<_> = (0..32).map(|_| tokio::spawn(fetch(addr))).collect();
        for client in clients {
            assert_eq!(client.await.unwrap(), b"flag{many}\n");
        }
    }

    #[tokio::test]
    async fn test_large_payload_is_written_whole() {
        let big: &'static [u8] = Box::leak(vec![b'A'; 4 * 1024 * 1024].into_boxed_slice());
        let addr = start(big, None).await;
        let received = fetch(addr).await;
        assert_eq!(received.len(), big.len());
        assert_eq!(received, big);
    }

    #[tokio::test]
    async fn test_connection_cap_still_serves_everyone() {
        let addr = start(b"flag{capped}", Some(2)).await;

        let clients: Vec<_> = (0..10).map(|_| tokio::spawn(fetch(addr))).collect();
        for client in clients {
            assert_eq!(client.await.unwrap(), b"flag{capped}");
        }
    }

    #[tokio::test]
    async fn test_empty_payload_just_closes() {
        let addr = start(b"", None).await;
        assert!(fetch(addr).await.is_empty());
    }
}
