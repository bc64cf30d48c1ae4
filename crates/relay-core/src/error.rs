//! Unified error types for the relay core.
//!
//! Each layer of the relay has its own error enum. Configuration errors live
//! in `relay-runtime` since configuration loading happens there.

use thiserror::Error;

// =============================================================================
// Transport Errors
// =============================================================================

/// Errors that can occur on a chat network connection.
///
/// None of these are fatal to a network task: the lifecycle manager retries
/// every one of them with backoff.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// TCP connection could not be established.
    #[error("connection failed: {addr} - {reason}")]
    ConnectionFailed {
        /// The address that failed to connect.
        addr: String,
        /// Reason for failure.
        reason: String,
    },

    /// Connecting took longer than the configured timeout.
    #[error("connection to {addr} timed out")]
    Timeout {
        /// The address that timed out.
        addr: String,
    },

    /// Connection closed by the remote end or by a local I/O failure.
    #[error("connection closed: {reason}")]
    ConnectionClosed {
        /// Reason for closure.
        reason: String,
    },

    /// TLS setup or handshake failed.
    #[error("TLS error: {0}")]
    Tls(String),

    /// Queuing an outbound line failed.
    #[error("failed to send line: {0}")]
    SendFailed(String),

    /// Invalid configuration.
    #[error("invalid transport configuration: {0}")]
    InvalidConfig(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

// =============================================================================
// Gateway Errors
// =============================================================================

/// Errors produced by a backend gateway call.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// The request could not be encoded.
    #[error("failed to serialize gateway request: {0}")]
    Serialization(String),

    /// The request never produced a response (refused, timed out, TLS).
    #[error("gateway transport error: {0}")]
    Transport(String),

    /// Non-success HTTP status whose body was not a gateway record.
    #[error("gateway returned HTTP {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Raw response body.
        body: String,
    },

    /// The response body was not a valid gateway record.
    #[error("failed to decode gateway response: {0}")]
    Decode(String),

    /// The backend reported a failure in its `errorMessage` field.
    #[error("backend error: {0}")]
    Backend(String),
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

// =============================================================================
// Protocol Errors
// =============================================================================

/// A received line that is not a well-formed IRC message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// The line was empty after trimming.
    #[error("empty line")]
    Empty,

    /// The line had a prefix or tags but no command.
    #[error("missing command in line: {0}")]
    MissingCommand(String),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Result type for gateway calls.
pub type GatewayResult<T> = Result<T, GatewayError>;
