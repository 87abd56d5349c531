//! Command-line and environment configuration.
//!
//! Every setting can come from a flag or its environment variable; the flag
//! wins when both are present.

use std::net::{SocketAddr, ToSocketAddrs};
use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Args, ValueEnum};
use replicant_tls::TlsPaths;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid boolean {0:?} (expected one of 1, t, T, TRUE, true, True, 0, f, F, FALSE, false, False)")]
    InvalidBool(String),

    #[error("invalid listen address {addr:?}: {reason}")]
    InvalidAddr { addr: String, reason: String },

    #[error("TLS is enabled but {0} is not set")]
    MissingTlsMaterial(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

/// Settings for the `serve` mode.
#[derive(Debug, Clone, Args)]
pub struct Config {
    /// Address of the API listener. `:PORT` binds all interfaces.
    #[arg(long, env = "LISTEN_ADDR", default_value = ":8080", value_parser = parse_listen_addr)]
    pub listen_addr: SocketAddr,

    /// Address of the unauthenticated probe listener.
    #[arg(long, env = "PROBE_LISTEN_ADDR", default_value = ":8081", value_parser = parse_listen_addr)]
    pub probe_listen_addr: SocketAddr,

    /// Namespace whose Deployments are cached and managed.
    #[arg(long, env = "NAMESPACE", default_value = "default")]
    pub namespace: String,

    /// Require mutual TLS on the API listener.
    ///
    /// A bare `--tls-enabled` means true. An explicit value must be
    /// attached with `=`, e.g. `--tls-enabled=false`.
    #[arg(
        long,
        env = "TLS_ENABLED",
        default_value = "false",
        value_parser = parse_bool,
        action = ArgAction::Set,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true"
    )]
    pub tls_enabled: bool,

    /// Server certificate chain (PEM).
    #[arg(long, env = "TLS_CERT_FILE")]
    pub tls_cert_file: Option<PathBuf>,

    /// Server private key (PEM).
    #[arg(long, env = "TLS_KEY_FILE")]
    pub tls_key_file: Option<PathBuf>,

    /// CA bundle trusted to sign client certificates (PEM).
    #[arg(long, env = "TLS_CLIENT_CA_FILE")]
    pub tls_client_ca_file: Option<PathBuf>,

    /// Deadline for API requests that call the cluster, in seconds.
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value_t = 10)]
    pub request_timeout_secs: u64,

    /// Bound on the readiness connectivity probe, in seconds.
    #[arg(long, env = "READINESS_TIMEOUT_SECS", default_value_t = 2)]
    pub readiness_timeout_secs: u64,

    /// How long in-flight requests may run after a shutdown signal, in seconds.
    #[arg(long, env = "SHUTDOWN_GRACE_SECS", default_value_t = 10)]
    pub shutdown_grace_secs: u64,

    /// Log output format.
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

impl Config {
    /// TLS material locations, or `None` when TLS is disabled.
    pub fn tls_paths(&self) -> Result<Option<TlsPaths>, ConfigError> {
        if !self.tls_enabled {
            return Ok(None);
        }
        let required = |path: &Option<PathBuf>, name| {
            path.clone().ok_or(ConfigError::MissingTlsMaterial(name))
        };
        Ok(Some(TlsPaths {
            cert_file: required(&self.tls_cert_file, "TLS_CERT_FILE")?,
            key_file: required(&self.tls_key_file, "TLS_KEY_FILE")?,
            client_ca_file: required(&self.tls_client_ca_file, "TLS_CLIENT_CA_FILE")?,
        }))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.tls_paths().map(|_| ())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn readiness_timeout(&self) -> Duration {
        Duration::from_secs(self.readiness_timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

/// Boolean spellings accepted for `TLS_ENABLED`.
pub fn parse_bool(value: &str) -> Result<bool, ConfigError> {
    match value {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Ok(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Ok(false),
        other => Err(ConfigError::InvalidBool(other.to_string())),
    }
}

/// `host:port`, `ip:port`, or `:port` for all interfaces.
pub fn parse_listen_addr(value: &str) -> Result<SocketAddr, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidAddr {
        addr: value.to_string(),
        reason,
    };

    if let Some(port) = value.strip_prefix(':') {
        let port: u16 = port.parse().map_err(|e| invalid(format!("bad port: {e}")))?;
        return Ok(SocketAddr::from(([0, 0, 0, 0], port)));
    }
    if let Ok(addr) = value.parse::<SocketAddr>() {
        return Ok(addr);
    }
    value
        .to_socket_addrs()
        .map_err(|e| invalid(e.to_string()))?
        .next()
        .ok_or_else(|| invalid("no addresses resolved".to_string()))
}
