//! Errors raised while reading configuration from the environment

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    /// A variable is set but does not parse or is out of range
    #[error("invalid value for {name}: {reason}")]
    InvalidValue { name: String, reason: String },

    /// A service URL without an http(s) scheme
    #[error("{name} must be an http(s) URL, got '{url}'")]
    InvalidUrl { name: String, url: String },
}

pub type ConfigResult<T> = Result<T, ConfigError>;
