//! Common error types for devlink.
//!
//! This module provides the crate-level Error enum using thiserror, with
//! conversions from the underlying error types used by configuration loading
//! and port access. Frame and link operations carry their own, narrower
//! error types in [`crate::frame`] and [`crate::link`].

use thiserror::Error;

/// Main error type for devlink operations.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O errors from tokio or std
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serial port errors
    #[error("Serial port error: {0}")]
    Serial(#[from] tokio_serial::Error),

    /// Configuration file could not be parsed
    #[error("Configuration parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Convenience type alias for Results using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
