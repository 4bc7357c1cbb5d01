//! Single-route HTTP transport.
//!
//! One route is registered. Any request to it, whatever the method, gets
//! `200 OK` with the payload plus a trailing newline as body. The body is
//! built once when the server is bound.
//!
//! Route matching follows the usual mux convention: a route ending in `/`
//! covers its whole subtree (so the default `/` answers every path), any
//! other route matches only itself. A request for a subtree route's root
//! without the trailing slash is redirected to it with a 301. Everything
//! else is a plain 404.

pub mod handler;

use crate::payload::Payload;
use crate::server::{ServeError, Transport};
use bytes::Bytes;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

pub use handler::handle_request;

/// Route and body shared by every connection.
#[derive(Debug)]
pub struct Route {
    pub path: String,
    pub body: Bytes,
}

/// HTTP/1 server exposing the payload on one route.
pub struct HttpServer {
    listener: TcpListener,
    route: Arc<Route>,
}

impl HttpServer {
    /// Bind the listener on the configured host and port.
    pub fn bind(addr: SocketAddr, path: &str, payload: Payload) -> Result<Self, ServeError> {
        let listener = super::bind_tcp_listener(addr, Transport::Http)?;

        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{path}")
        };

        Ok(HttpServer {
            listener,
            route: Arc::new(Route {
                path,
                body: payload.with_trailing_newline(),
            }),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServeError> {
        self.listener.local_addr().map_err(|source| ServeError::Io {
            transport: Transport::Http,
            source,
        })
    }

    /// Accept and serve HTTP connections forever.
    pub async fn run(self) -> Result<(), ServeError> {
        info!(
            addr = %self.local_addr()?,
            path = %self.route.path,
            "Listening for HTTP requests"
        );

        loop {
            let (stream, peer) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!(error = %e, "Error accepting HTTP connection");
                    continue;
                }
            };

            debug!(%peer, "New HTTP connection");
            let route = Arc::clone(&self.route);

            tokio::spawn(async move {
                let io = TokioIo::new(stream);
                let service = service_fn(move |req| handle_request(Arc::clone(&route), peer, req));

                if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                    debug!(%peer, error = %e, "HTTP connection error");
                }
            });
        }
    }
}
