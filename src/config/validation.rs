//! Configuration validation.
//!
//! Serde handles syntax; this module checks value ranges. All problems are
//! reported at once rather than stopping at the first.

use std::net::SocketAddr;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use crate::config::schema::ServiceConfig;

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("server.bind_address {0:?} is not a valid socket address")]
    InvalidBindAddress(String),

    #[error("server.request_timeout_secs must be greater than 0")]
    ZeroRequestTimeout,

    #[error("server.max_body_bytes must be greater than 0")]
    ZeroBodyLimit,

    #[error("logging.level {0:?} is not a valid filter directive")]
    InvalidLogLevel(String),

    #[error("environment must not be empty")]
    EmptyEnvironment,
}

/// Validate a configuration, returning every problem found.
pub fn validate_config(config: &ServiceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.server.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidBindAddress(
            config.server.bind_address.clone(),
        ));
    }
    if config.server.request_timeout_secs == 0 {
        errors.push(ValidationError::ZeroRequestTimeout);
    }
    if config.server.max_body_bytes == 0 {
        errors.push(ValidationError::ZeroBodyLimit);
    }
    if EnvFilter::try_new(&config.logging.level).is_err() {
        errors.push(ValidationError::InvalidLogLevel(config.logging.level.clone()));
    }
    if config.environment.trim().is_empty() {
        errors.push(ValidationError::EmptyEnvironment);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
