//! Runtime error types.

use thiserror::Error;

use relay_core::{GatewayError, TransportError};

use crate::config::ConfigError;

/// Errors that stop the runtime from starting.
///
/// Nothing that happens on a live network ends up here: connection failures
/// are retried and backend failures are logged.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Configuration could not be loaded or failed validation.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A transport could not be set up.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// The backend gateway could not be set up.
    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// No networks are configured.
    #[error("No networks configured")]
    NoNetworks,

    /// The transport context lacks a capability the runtime needs.
    #[error("Missing capability: {0}")]
    MissingCapability(&'static str),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
