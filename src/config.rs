//! Broker configuration.
//!
//! Supports configuration from:
//! - TOML file (default: `typemq.toml`)
//! - Environment variables with `TYPEMQ__` prefix (double underscore nesting)
//! - In-file variable substitution: `${VAR}` or `${VAR:-default}`
//!
//! Environment variable examples:
//! - `TYPEMQ__SERVER__BIND=0.0.0.0:1884`
//! - `TYPEMQ__SCHEMA__DIR=/etc/typemq/schemas`
//! - `TYPEMQ__LOG__LEVEL=debug`

use std::net::SocketAddr;
use std::path::Path;

use config::{Environment, File, FileFormat};
use regex::Regex;
use serde::Deserialize;

/// Default maximum MQTT packet size (1MB).
pub const DEFAULT_MAX_PACKET_SIZE: usize = 1024 * 1024;

/// Default per-connection read buffer capacity (4KB).
pub const DEFAULT_READ_BUFFER_SIZE: usize = 4096;

/// Default per-connection pending-write soft cap (1MB).
pub const DEFAULT_WRITE_BUFFER_SIZE: usize = 1024 * 1024;

/// Expand `${VAR}` and `${VAR:-default}` references against the process
/// environment. An unset variable without a default expands to the empty
/// string.
fn expand_env_refs(content: &str) -> String {
    let pattern = Regex::new(r"\$\{(?P<var>[^}:]+)(:-(?P<default>[^}]*))?\}").unwrap();
    pattern
        .replace_all(content, |caps: &regex::Captures| {
            let fallback = caps.name("default").map_or("", |m| m.as_str());
            env_or(&caps["var"], fallback)
        })
        .into_owned()
}

fn env_or(var: &str, fallback: &str) -> String {
    match std::env::var(var) {
        Ok(value) => value,
        Err(_) => fallback.to_string(),
    }
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log: LogConfig,
    pub server: ServerConfig,
    pub limits: LimitsConfig,
    pub schema: SchemaConfig,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level: error, warn, info, debug, trace.
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// TCP bind address.
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,
}

fn default_bind() -> SocketAddr {
    "0.0.0.0:1883".parse().unwrap()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

/// Buffer and packet limits.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum MQTT packet size in bytes; larger frames close the connection.
    #[serde(default = "default_max_packet_size")]
    pub max_packet_size: usize,

    /// Per-connection read buffer capacity. A frame that cannot fit closes
    /// the connection (buffer overflow policy).
    #[serde(default = "default_read_buffer_size")]
    pub read_buffer_size: usize,

    /// Per-connection pending-write soft cap. Deliveries beyond it are
    /// dropped (QoS 0).
    #[serde(default = "default_write_buffer_size")]
    pub write_buffer_size: usize,
}

fn default_max_packet_size() -> usize {
    DEFAULT_MAX_PACKET_SIZE
}
fn default_read_buffer_size() -> usize {
    DEFAULT_READ_BUFFER_SIZE
}
fn default_write_buffer_size() -> usize {
    DEFAULT_WRITE_BUFFER_SIZE
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_packet_size: DEFAULT_MAX_PACKET_SIZE,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            write_buffer_size: DEFAULT_WRITE_BUFFER_SIZE,
        }
    }
}

/// Schema registry configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchemaConfig {
    /// Directory of `*.proto` files loaded at startup.
    #[serde(default = "default_schema_dir")]
    pub dir: String,

    /// Strict mode: reject a PUBLISH whose payload fails to decode against
    /// the topic's bound schema. Off by default: decode failures are logged
    /// and the message is routed anyway.
    #[serde(default)]
    pub validate_publish: bool,

    /// Startup topic-to-type bindings.
    #[serde(default)]
    pub bindings: Vec<TopicBindingConfig>,
}

fn default_schema_dir() -> String {
    "schemas".to_string()
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            dir: default_schema_dir(),
            validate_publish: false,
            bindings: Vec::new(),
        }
    }
}

/// One startup topic binding.
#[derive(Debug, Clone, Deserialize)]
pub struct TopicBindingConfig {
    pub topic: String,
    pub message_type: String,
}

impl Config {
    /// Load configuration from a TOML file plus environment overrides. A
    /// missing file falls back to defaults; env vars still apply.
    pub fn load(path: &str) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        if Path::new(path).exists() {
            let content = std::fs::read_to_string(path)
                .map_err(|e| config::ConfigError::Message(format!("{}: {}", path, e)))?;
            let substituted = expand_env_refs(&content);
            builder = builder.add_source(File::from_str(&substituted, FileFormat::Toml));
        }

        builder = builder.add_source(
            Environment::with_prefix("TYPEMQ")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }
}
