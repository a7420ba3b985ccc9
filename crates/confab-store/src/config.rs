//! Environment configuration
//!
//! Both services load their configuration once at startup from environment
//! variables. Any unset required variable is a fatal startup error naming
//! the variable, so misconfigured deployments fail loudly instead of
//! half-starting.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Configuration loading errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A required environment variable is not set
    #[error("required environment variable {0} is not set")]
    Missing(&'static str),

    /// A variable is set but does not parse
    #[error("environment variable {name} is invalid: {reason}")]
    Invalid {
        /// Variable name
        name: &'static str,
        /// Parse failure detail
        reason: String,
    },
}

/// Configuration for the signaling server
#[derive(Debug, Clone)]
pub struct SignalConfig {
    /// HTTP/WebSocket bind address
    pub bind_addr: String,
    /// Root directory of the room document store
    pub data_dir: PathBuf,
    /// URL-safe base64, 32-byte message encryption key
    pub encryption_key: String,
    /// Authentication service host
    pub auth_host: String,
    /// Authentication service gRPC port
    pub auth_port: u16,
    /// Timeout for the `ValidateUser` probe
    pub auth_timeout: Duration,
}

impl SignalConfig {
    /// Load from process environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load from an arbitrary variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            bind_addr: lookup("CONFAB_SIGNAL_ADDR").unwrap_or_else(|| "0.0.0.0:8004".to_string()),
            data_dir: PathBuf::from(required(&lookup, "CONFAB_DATA_DIR")?),
            encryption_key: required(&lookup, "CONFAB_ENCRYPTION_KEY")?,
            auth_host: required(&lookup, "CONFAB_AUTH_HOST")?,
            auth_port: parsed(&lookup, "CONFAB_AUTH_PORT")?,
            auth_timeout: Duration::from_secs(parsed_or(&lookup, "CONFAB_AUTH_TIMEOUT_SECS", 2)?),
        })
    }

    /// The auth service endpoint URL for the gRPC channel
    pub fn auth_endpoint(&self) -> String {
        format!("http://{}:{}", self.auth_host, self.auth_port)
    }
}

/// SMTP transport and envelope settings
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    /// Relay host
    pub host: String,
    /// Relay port (STARTTLS)
    pub port: u16,
    /// Login user
    pub username: String,
    /// Login password
    pub password: String,
    /// Display name on the fixed `From` mailbox
    pub from_name: String,
    /// Address on the fixed `From` mailbox
    pub from_addr: String,
}

/// Configuration for the reminder worker
#[derive(Debug, Clone)]
pub struct NotifyConfig {
    /// Relational store URL
    pub database_url: String,
    /// SMTP settings
    pub smtp: SmtpConfig,
    /// Scheduler tick interval
    pub tick: Duration,
    /// Due-reminder look-ahead window
    pub lookahead: Duration,
}

impl NotifyConfig {
    /// Load from process environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load from an arbitrary variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            database_url: required(&lookup, "CONFAB_DATABASE_URL")?,
            smtp: SmtpConfig {
                host: required(&lookup, "CONFAB_SMTP_HOST")?,
                port: parsed(&lookup, "CONFAB_SMTP_PORT")?,
                username: required(&lookup, "CONFAB_SMTP_USER")?,
                password: required(&lookup, "CONFAB_SMTP_PASSWORD")?,
                from_name: required(&lookup, "CONFAB_SMTP_FROM_NAME")?,
                from_addr: required(&lookup, "CONFAB_SMTP_FROM_ADDR")?,
            },
            tick: Duration::from_secs(parsed_or(&lookup, "CONFAB_TICK_SECS", 60)?),
            lookahead: Duration::from_secs(parsed_or(&lookup, "CONFAB_LOOKAHEAD_SECS", 300)?),
        })
    }
}

fn required(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<String, ConfigError> {
    match lookup(name) {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::Missing(name)),
    }
}

fn parsed<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    required(lookup, name)?.parse().map_err(|e: T::Err| ConfigError::Invalid {
        name,
        reason: e.to_string(),
    })
}

fn parsed_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        Some(value) => value.parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}
