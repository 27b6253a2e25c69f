//! Server configuration.
//!
//! Everything the serving loop needs is passed in through [`ServerConfig`];
//! there is no process-wide state. A TOML file may supply any subset of the
//! fields, the rest take their defaults.
//!
//! 服务器配置。服务循环所需的一切都通过 [`ServerConfig`] 传入。

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crypto::suite;

pub const DEFAULT_PORT: u16 = 4433;
const MAX_READ_BUFFER: usize = 16 * 1024;

/// Root configuration for the echo server.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    /// The only suite the server accepts. `None` permits every enabled suite.
    pub ciphersuite: Option<u16>,
    pub handshake_timeout_secs: u64,
    pub close_notify_timeout_ms: u64,
    /// Upper bound on the bytes read for the request.
    pub read_buffer_size: usize,
    /// The literal bytes written back to every client.
    pub response: String,
    /// Stop after the first successfully served connection.
    pub serve_once: bool,
    pub credentials: CredentialConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            ciphersuite: None,
            handshake_timeout_secs: 30,
            close_notify_timeout_ms: 1000,
            read_buffer_size: 1024,
            response: "pong".to_string(),
            serve_once: true,
            credentials: CredentialConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }

    pub fn close_notify_timeout(&self) -> Duration {
        Duration::from_millis(self.close_notify_timeout_ms)
    }

    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

/// PEM paths for the server credentials. A kind without both paths uses the
/// built-in test credential.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct CredentialConfig {
    pub rsa_cert: Option<PathBuf>,
    pub rsa_key: Option<PathBuf>,
    pub ec_cert: Option<PathBuf>,
    pub ec_key: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("ciphersuite {0:#06x} is not registered")]
    UnknownCiphersuite(u16),
    #[error("read_buffer_size must be between 1 and {max}, got {got}")]
    ReadBufferSize { got: usize, max: usize },
    #[error("handshake_timeout_secs must be greater than zero")]
    ZeroHandshakeTimeout,
    #[error("credentials.{kind}_cert and credentials.{kind}_key must be set together")]
    HalfCredential { kind: &'static str },
}

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Checks semantic constraints and returns every violation, not just the first.
pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if let Some(id) = config.ciphersuite {
        if suite::lookup(id).is_none() {
            errors.push(ValidationError::UnknownCiphersuite(id));
        }
    }
    if config.read_buffer_size == 0 || config.read_buffer_size > MAX_READ_BUFFER {
        errors.push(ValidationError::ReadBufferSize {
            got: config.read_buffer_size,
            max: MAX_READ_BUFFER,
        });
    }
    if config.handshake_timeout_secs == 0 {
        errors.push(ValidationError::ZeroHandshakeTimeout);
    }
    let creds = &config.credentials;
    if creds.rsa_cert.is_some() != creds.rsa_key.is_some() {
        errors.push(ValidationError::HalfCredential { kind: "rsa" });
    }
    if creds.ec_cert.is_some() != creds.ec_key.is_some() {
        errors.push(ValidationError::HalfCredential { kind: "ec" });
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

/// Parses and validates a TOML document.
pub fn parse_config(content: &str) -> Result<ServerConfig, ConfigError> {
    let config: ServerConfig = toml::from_str(content)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ServerConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}
