//! Error types for the resolink client library.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ResolinkError>;

/// Errors produced by the resolink client.
#[derive(Error, Debug)]
pub enum ResolinkError {
    /// Invalid client configuration (bad base URL, missing required fields).
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// HTTP transport failure from the underlying client.
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("Server error ({status_code}): {message}")]
    ServerError {
        /// HTTP status code returned by the server.
        status_code: u16,
        /// Error message extracted from the response body.
        message: String,
    },

    /// WebSocket transport failure (handshake, send, unexpected close).
    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    /// The server sent a message the client does not understand.
    ///
    /// Signals a client/server version skew and is never silently absorbed.
    #[error("Protocol violation: {0}")]
    ProtocolError(String),

    /// A payload could not be decoded into the expected shape.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// An operation exceeded its configured deadline.
    #[error("Timeout: {0}")]
    TimeoutError(String),
}
