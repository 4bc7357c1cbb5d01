//! Per-connection serve task for the stream transport.

use bytes::Bytes;
use std::net::SocketAddr;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::info;

/// Write the payload to one client and close the connection.
///
/// The stream is owned here, so it is closed when this returns on every
/// path, including a failed write.
pub async fn handle_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    payload: Bytes,
) -> std::io::Result<()> {
    info!(ip = %peer.ip(), "Accepted new TCP connection from client");

    stream.write_all(&payload).await?;
    stream.shutdown().await?;

    info!(ip = %peer.ip(), bytes = payload.len(), "Finished serving content over TCP");
    Ok(())
}
