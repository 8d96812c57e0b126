//! Common error types for AudioSND

use thiserror::Error;

/// Common result type for AudioSND shared operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the shared configuration and event layers
#[derive(Error, Debug)]
pub enum Error {
    /// A numeric or named setting was rejected
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration file could not be located or interpreted
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Preference store contained malformed TOML
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// Preference store could not be serialized
    #[error("TOML write error: {0}")]
    TomlWrite(#[from] toml::ser::Error),
}
