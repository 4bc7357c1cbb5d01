//! flag-server: hands one fixed payload to every client that connects.
//!
//! Transports:
//! - stream (TCP): payload written on connect, then the connection closes
//! - datagram (UDP): every packet is answered with the payload
//! - http: one route answering with the payload and a trailing newline
//!
//! The payload comes from inline content, the `FLAG_SERVER_CONTENT`
//! environment variable, or a file, in that order. Settings are taken from
//! CLI arguments, `FLAG_SERVER_*` environment variables or a TOML file.

mod config;
mod payload;
mod server;
mod transports;

use config::{Config, ConfigSources};
use payload::Payload;
use std::io::Write;
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Payload file or config file could not be read.
const EXIT_SOURCE_ERROR: u8 = 1;
/// A listener could not be set up.
const EXIT_BIND_ERROR: u8 = 2;

fn main() -> ExitCode {
    let sources = match ConfigSources::load() {
        Ok(sources) => sources,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::from(EXIT_SOURCE_ERROR);
        }
    };

    // Initialize logging. stdout is reserved for the payload itself.
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(sources.log_level()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    info!("Starting new flag server instance");
    let config = sources.resolve();
    info!(
        host = %config.host,
        port = config.port,
        file_path = %config.file_path.display(),
        transport = %config.transport,
        max_connections = ?config.max_connections,
        "Resolved configuration"
    );

    let payload = match Payload::resolve(&config) {
        Ok(payload) => payload,
        Err(e) => {
            error!(error = %e, "Error opening file");
            return ExitCode::from(EXIT_SOURCE_ERROR);
        }
    };

    if payload.is_empty() {
        warn!(source = %payload.source(), "Serving an empty payload");
    }
    info!(source = %payload.source(), bytes = payload.len(), "Actual flag is:");
    if let Err(e) = print_payload(payload.bytes()) {
        warn!(error = %e, "Failed to echo payload to stdout");
    }

    let runtime = match build_runtime(&config) {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "Failed to start async runtime");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(server::serve(&config, payload)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Cannot start server");
            ExitCode::from(EXIT_BIND_ERROR)
        }
    }
}

/// Echo the raw payload bytes, plus a newline, to stdout.
fn print_payload(bytes: &[u8]) -> std::io::Result<()> {
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(bytes)?;
    stdout.write_all(b"\n")?;
    stdout.flush()
}

/// Build the multi-threaded runtime, honoring the configured worker count.
fn build_runtime(config: &Config) -> std::io::Result<tokio::runtime::Runtime> {
    let mut builder = tokio::runtime::Builder::new_multi_thread();
    if let Some(workers) = config.workers {
        info!(workers, "Using configured worker threads");
        builder.worker_threads(workers);
    }
    builder.enable_all().build()
}
