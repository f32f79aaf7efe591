//! Configuration for a device link.
//!
//! Settings come from three layers, later ones winning: built-in defaults,
//! an optional TOML file, and `DEVLINK_*` environment variables. Programs
//! may apply command-line flags on top before calling [`LinkConfig::validate`].

use crate::error::{Error, Result};
use crate::frame::DEFAULT_MAX_LINE_LENGTH;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Substring that identifies an Arduino board during discovery.
pub const DEFAULT_MATCH: &str = "Arduino";

/// Environment variable overriding [`LinkConfig::port`].
pub const ENV_PORT: &str = "DEVLINK_PORT";
/// Environment variable overriding [`LinkConfig::baud_rate`].
pub const ENV_BAUD_RATE: &str = "DEVLINK_BAUD_RATE";
/// Environment variable overriding [`LinkConfig::digits`].
pub const ENV_DIGITS: &str = "DEVLINK_DIGITS";
/// Environment variable overriding [`LinkConfig::max_retries`].
pub const ENV_MAX_RETRIES: &str = "DEVLINK_MAX_RETRIES";

/// What to do after repeated transport failures on an open link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconnectPolicy {
    /// Keep the transport and report every failure.
    #[default]
    Never,
    /// Reopen the port after this many consecutive transport failures. While
    /// a reopen keeps failing, every this-many calls on the unconnected link
    /// start another round.
    AfterFailures(u32),
}

/// Device link configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct LinkConfig {
    /// Port to open. Discovery is used when unset.
    pub port: Option<String>,

    pub baud_rate: u32,

    /// Fixed decimal width of every outbound field.
    pub digits: usize,

    /// Discovery scans or open attempts before giving up.
    pub max_retries: u32,

    /// Pause between connection attempts, in milliseconds.
    pub retry_delay_ms: u64,

    /// Longest wait for an inbound line. Unset waits forever.
    pub read_timeout_ms: Option<u64>,

    /// Longest inbound line, terminator excluded. Longer lines are dropped
    /// and reported as decode failures.
    pub max_line_length: usize,

    /// Case-sensitive substring a port description must contain to be
    /// picked by discovery.
    pub match_description: String,

    pub reconnect: ReconnectPolicy,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: 9600,
            digits: 1,
            max_retries: 5,
            retry_delay_ms: 0,
            read_timeout_ms: None,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            match_description: DEFAULT_MATCH.to_string(),
            reconnect: ReconnectPolicy::Never,
        }
    }
}

impl LinkConfig {
    /// Configuration for an explicitly named port.
    pub fn for_port(port: impl Into<String>) -> Self {
        Self {
            port: Some(port.into()),
            ..Self::default()
        }
    }

    /// Load and validate configuration from a TOML file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = text.parse()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `DEVLINK_*` environment variables.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key/value source, such as the environment.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup(ENV_PORT) {
            self.port = Some(port);
        }
        if let Some(value) = lookup(ENV_BAUD_RATE) {
            self.baud_rate = parse_var(ENV_BAUD_RATE, &value)?;
        }
        if let Some(value) = lookup(ENV_DIGITS) {
            self.digits = parse_var(ENV_DIGITS, &value)?;
        }
        if let Some(value) = lookup(ENV_MAX_RETRIES) {
            self.max_retries = parse_var(ENV_MAX_RETRIES, &value)?;
        }
        Ok(())
    }

    /// Check that the settings describe a usable link.
    pub fn validate(&self) -> Result<()> {
        if self.digits == 0 {
            return Err(Error::Config("digits must be at least 1".to_string()));
        }
        if self.max_retries == 0 {
            return Err(Error::Config("max_retries must be at least 1".to_string()));
        }
        if self.max_line_length == 0 {
            return Err(Error::Config("max_line_length must be at least 1".to_string()));
        }
        if self.baud_rate == 0 {
            return Err(Error::Config("baud_rate must be positive".to_string()));
        }
        if self.port.is_none() && self.match_description.is_empty() {
            return Err(Error::Config(
                "match_description must not be empty when no port is set".to_string(),
            ));
        }
        if let ReconnectPolicy::AfterFailures(0) = self.reconnect {
            return Err(Error::Config(
                "reconnect after_failures must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout_ms.map(Duration::from_millis)
    }
}

impl FromStr for LinkConfig {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }
}

fn parse_var<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("invalid value {:?} for {}", value, key)))
}
