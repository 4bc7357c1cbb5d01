//! Configuration module for flag-server.
//!
//! Settings come from four layers. For every setting the first layer that
//! provides a value wins:
//!
//! 1. an explicit command-line argument
//! 2. a non-empty `FLAG_SERVER_*` environment variable
//! 3. the optional TOML configuration file
//! 4. the built-in default
//!
//! The result is an immutable [`Config`] that is handed to the payload
//! resolver and the transport dispatcher.

use clap::Parser;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

pub const ENV_HOST: &str = "FLAG_SERVER_HOST";
pub const ENV_PORT: &str = "FLAG_SERVER_PORT";
pub const ENV_FILE_PATH: &str = "FLAG_SERVER_FILE_PATH";
pub const ENV_HTTP_PATH: &str = "FLAG_SERVER_HTTP_PATH";
pub const ENV_PROTOCOL: &str = "FLAG_SERVER_PROTOCOL";
pub const ENV_TRANSPORT: &str = "FLAG_SERVER_TRANSPORT";
pub const ENV_CONTENT: &str = "FLAG_SERVER_CONTENT";
pub const ENV_MAX_CONNECTIONS: &str = "FLAG_SERVER_MAX_CONNECTIONS";

/// Command-line arguments for the content server
#[derive(Parser, Debug, Default)]
#[command(name = "flag-server")]
#[command(author = "flag-server authors")]
#[command(version = "0.1.0")]
#[command(about = "Serves a fixed payload over TCP, UDP or HTTP", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Address to bind to (env: FLAG_SERVER_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to, 0 picks a free one (env: FLAG_SERVER_PORT)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Transport to serve on: stream (tcp), datagram (udp) or http
    /// (env: FLAG_SERVER_PROTOCOL)
    #[arg(short = 't', long, visible_alias = "protocol")]
    pub transport: Option<String>,

    /// File holding the payload (env: FLAG_SERVER_FILE_PATH)
    #[arg(short, long)]
    pub file_path: Option<String>,

    /// Inline payload, overrides the file (env: FLAG_SERVER_CONTENT)
    #[arg(short, long)]
    pub content: Option<String>,

    /// Route served by the http transport (env: FLAG_SERVER_HTTP_PATH)
    #[arg(long)]
    pub http_path: Option<String>,

    /// Cap on concurrently served stream connections (default: unbounded)
    #[arg(long)]
    pub max_connections: Option<usize>,

    /// Number of runtime worker threads (defaults to number of CPU cores)
    #[arg(short = 'w', long)]
    pub workers: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub payload: PayloadConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Listener-related configuration
#[derive(Debug, Deserialize, Default)]
pub struct ServerConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub transport: Option<String>,
    pub max_connections: Option<usize>,
    pub workers: Option<usize>,
}

/// Where the payload comes from
#[derive(Debug, Deserialize, Default)]
pub struct PayloadConfig {
    pub content: Option<String>,
    pub file_path: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct HttpConfig {
    pub path: Option<String>,
}

/// Logging configuration
#[derive(Debug, Deserialize, Default)]
pub struct LoggingConfig {
    pub level: Option<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_transport() -> String {
    "stream".to_string()
}

fn default_file_path() -> String {
    "~/flag.txt".to_string()
}

fn default_http_path() -> String {
    "/".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Raw transport selector, parsed by the dispatcher.
    pub transport: String,
    pub file_path: PathBuf,
    /// Inline content from the command line or config file.
    pub content: Option<String>,
    /// Content taken from `FLAG_SERVER_CONTENT`.
    pub env_content: Option<String>,
    pub http_path: String,
    pub max_connections: Option<usize>,
    pub workers: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Config::resolve(CliArgs::default(), TomlConfig::default(), |_| None)
    }
}

/// Command-line and file layers, loaded before the environment is consulted
/// so that logging can be set up first.
#[derive(Debug, Default)]
pub struct ConfigSources {
    pub cli: CliArgs,
    pub toml: TomlConfig,
}

impl ConfigSources {
    /// Parse CLI args and the optional TOML file.
    pub fn load() -> Result<Self, ConfigError> {
        let cli = CliArgs::parse();

        let toml = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        Ok(ConfigSources { cli, toml })
    }

    /// Log level from the CLI or the file; `RUST_LOG` is handled by the filter.
    pub fn log_level(&self) -> String {
        self.cli
            .log_level
            .clone()
            .or_else(|| self.toml.logging.level.clone())
            .unwrap_or_else(default_log_level)
    }

    /// Layer the process environment in and produce the final config.
    pub fn resolve(self) -> Config {
        Config::resolve(self.cli, self.toml, |key| std::env::var(key).ok())
    }
}

impl Config {
    /// Merge the layers. `env` looks up an environment variable; empty
    /// values are treated as unset.
    pub fn resolve<F>(cli: CliArgs, toml_config: TomlConfig, env: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = |key: &str| env(key).filter(|v| !v.is_empty());

        let env_port = env(ENV_PORT).and_then(|raw| match raw.parse::<u16>() {
            Ok(port) => Some(port),
            Err(e) => {
                warn!(value = %raw, error = %e, "Ignoring invalid {}", ENV_PORT);
                None
            }
        });

        let env_max_connections =
            env(ENV_MAX_CONNECTIONS).and_then(|raw| match raw.parse::<usize>() {
                Ok(n) => Some(n),
                Err(e) => {
                    warn!(value = %raw, error = %e, "Ignoring invalid {}", ENV_MAX_CONNECTIONS);
                    None
                }
            });

        let file_path = cli
            .file_path
            .or_else(|| env(ENV_FILE_PATH))
            .or(toml_config.payload.file_path)
            .unwrap_or_else(default_file_path);
        let home = env("HOME").map(PathBuf::from);

        Config {
            host: cli
                .host
                .or_else(|| env(ENV_HOST))
                .or(toml_config.server.host)
                .unwrap_or_else(default_host),
            port: cli
                .port
                .or(env_port)
                .or(toml_config.server.port)
                .unwrap_or(0),
            transport: cli
                .transport
                .or_else(|| env(ENV_PROTOCOL))
                .or_else(|| env(ENV_TRANSPORT))
                .or(toml_config.server.transport)
                .unwrap_or_else(default_transport),
            file_path: expand_home(&file_path, home.as_deref()),
            content: cli
                .content
                .or(toml_config.payload.content)
                .filter(|c| !c.is_empty()),
            env_content: env(ENV_CONTENT),
            http_path: cli
                .http_path
                .or_else(|| env(ENV_HTTP_PATH))
                .or(toml_config.http.path)
                .unwrap_or_else(default_http_path),
            max_connections: cli
                .max_connections
                .or(env_max_connections)
                .or(toml_config.server.max_connections)
                .filter(|&n| n > 0),
            workers: cli.workers.or(toml_config.server.workers).filter(|&n| n > 0),
        }
    }

    /// `host:port` as handed to the resolver.
    pub fn bind_target(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            // bare IPv6 literal
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

/// Expand a leading `~/` against the home directory, if one is known.
fn expand_home(path: &str, home: Option<&Path>) -> PathBuf {
    match (path.strip_prefix("~/"), home) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{}': {}", .0.display(), .1)]
    FileRead(PathBuf, #[source] std::io::Error),
    #[error("Failed to parse config file '{}': {}", .0.display(), .1)]
    TomlParse(PathBuf, #[source] toml::de::Error),
}
