use thiserror::Error;

pub use btpool_api::errors::{DispatchError, JobFailure, LifecycleError};

/// Errors raised while loading or validating a pool configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid pool configuration: {0}")]
    Invalid(String),
    #[error("Failed to read pool configuration: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse pool configuration: {0}")]
    Parse(#[from] serde_json::Error),
}
