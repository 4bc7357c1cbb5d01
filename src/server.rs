//! Transport dispatch.
//!
//! Picks one of the transports from the configured selector, binds it and
//! runs its serve loop for the rest of the process lifetime.

use crate::config::Config;
use crate::payload::Payload;
use crate::transports::{DatagramServer, HttpServer, StreamServer};
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::str::FromStr;
use thiserror::Error;
use tracing::{error, info};

/// Transport selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    /// Connection per client, payload written then closed (TCP).
    Stream,
    /// One reply packet per inbound packet (UDP).
    Datagram,
    /// Single HTTP route.
    Http,
}

impl FromStr for Transport {
    type Err = UnknownTransport;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stream" | "tcp" => Ok(Transport::Stream),
            "datagram" | "udp" => Ok(Transport::Datagram),
            "http" => Ok(Transport::Http),
            _ => Err(UnknownTransport(s.to_string())),
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Transport::Stream => "stream",
            Transport::Datagram => "datagram",
            Transport::Http => "http",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown transport '{0}', expected one of stream (tcp), datagram (udp), http")]
pub struct UnknownTransport(pub String);

/// Errors that stop a transport from serving.
#[derive(Debug, Error)]
pub enum ServeError {
    #[error("failed to resolve bind address '{target}': {source}")]
    Resolve {
        target: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to bind {transport} listener on {addr}: {source}")]
    Bind {
        transport: Transport,
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("{transport} listener failed: {source}")]
    Io {
        transport: Transport,
        #[source]
        source: io::Error,
    },
}

/// Run the configured transport until the process is terminated.
///
/// Returns `Ok(())` only when the selector is not a known transport; in that
/// case nothing is bound.
pub async fn serve(config: &Config, payload: Payload) -> Result<(), ServeError> {
    let transport = match config.transport.parse::<Transport>() {
        Ok(transport) => transport,
        Err(e) => {
            error!(transport = %config.transport, "ERROR, {}", e);
            return Ok(());
        }
    };

    let addr = resolve_addr(&config.bind_target()).await?;
    info!(%transport, %addr, "Dispatching transport");

    match transport {
        Transport::Stream => {
            StreamServer::bind(addr, payload, config.max_connections)?
                .run()
                .await
        }
        Transport::Datagram => DatagramServer::bind(addr, payload)?.run().await,
        Transport::Http => {
            info!(path = %config.http_path, "HTTP route");
            HttpServer::bind(addr, &config.http_path, payload)?
                .run()
                .await
        }
    }
}

/// Resolve `host:port`, taking the first address returned.
pub async fn resolve_addr(target: &str) -> Result<SocketAddr, ServeError> {
    let resolve_err = |source| ServeError::Resolve {
        target: target.to_string(),
        source,
    };

    tokio::net::lookup_host(target)
        .await
        .map_err(resolve_err)?
        .next()
        .ok_or_else(|| {
            resolve_err(io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                "no addresses found",
            ))
        })
}
