//! Payload resolution.
//!
//! The payload is resolved exactly once, before any listener is bound.
//! The first non-empty source wins:
//!
//! 1. inline content (command line or config file)
//! 2. the `FLAG_SERVER_CONTENT` environment variable
//! 3. the file at the configured path
//!
//! An unreadable file is fatal. No source at all yields an empty payload.

use crate::config::Config;
use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{error, info};

/// Where the served bytes came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadSource {
    Inline,
    Environment,
    File(PathBuf),
    Empty,
}

impl fmt::Display for PayloadSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PayloadSource::Inline => write!(f, "inline content"),
            PayloadSource::Environment => write!(f, "{}", crate::config::ENV_CONTENT),
            PayloadSource::File(path) => write!(f, "file {}", path.display()),
            PayloadSource::Empty => write!(f, "nothing (empty payload)"),
        }
    }
}

/// The immutable byte sequence handed to every client.
///
/// Cloning only bumps a reference count; all serve tasks share one buffer.
#[derive(Debug, Clone)]
pub struct Payload {
    bytes: Bytes,
    source: PayloadSource,
}

impl Payload {
    pub fn new(bytes: impl Into<Bytes>, source: PayloadSource) -> Self {
        Payload {
            bytes: bytes.into(),
            source,
        }
    }

    /// Resolve the payload from configuration.
    pub fn resolve(config: &Config) -> Result<Self, PayloadError> {
        if let Some(content) = config.content.as_deref().filter(|c| !c.is_empty()) {
            info!(bytes = content.len(), content = %content, "Using inline content");
            return Ok(Payload::new(content.to_owned(), PayloadSource::Inline));
        }

        if let Some(content) = config.env_content.as_deref().filter(|c| !c.is_empty()) {
            info!(
                bytes = content.len(),
                content = %content,
                "Using content from {}",
                crate::config::ENV_CONTENT
            );
            return Ok(Payload::new(content.to_owned(), PayloadSource::Environment));
        }

        if config.file_path.as_os_str().is_empty() {
            info!("No payload source configured, serving an empty payload");
            return Ok(Payload::new(Bytes::new(), PayloadSource::Empty));
        }

        Payload::from_file(&config.file_path)
    }

    /// Read the whole file. No trimming or decoding is applied.
    pub fn from_file(path: &Path) -> Result<Self, PayloadError> {
        match file_size(path) {
            Some(size) => info!(path = %path.display(), bytes = size, "Payload file found"),
            None => info!(path = %path.display(), bytes = "unknown", "Payload file found"),
        }

        let bytes = std::fs::read(path).map_err(|source| PayloadError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;

        Ok(Payload::new(bytes, PayloadSource::File(path.to_path_buf())))
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn source(&self) -> &PayloadSource {
        &self.source
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// The payload with one `\n` appended, built once for the http transport.
    pub fn with_trailing_newline(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.bytes.len() + 1);
        buf.extend_from_slice(&self.bytes);
        buf.put_u8(b'\n');
        buf.freeze()
    }
}

/// Size probe used for the startup log line.
fn file_size(path: &Path) -> Option<u64> {
    match std::fs::metadata(path) {
        Ok(meta) => Some(meta.len()),
        Err(e) => {
            error!(path = %path.display(), error = %e, "Error identifying file");
            None
        }
    }
}

/// Payload resolution errors
#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("Failed to read payload file '{}': {source}", path.display())]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
