//! Client error types.

use std::io;

use framecast_core::DecodeError;
use framecast_protocol::ProtocolError;
use framecast_server::ServerError;
use thiserror::Error;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that can occur in the client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The host name did not resolve to any address.
    #[error("failed to resolve {target}: {source}")]
    Resolve {
        target: String,
        #[source]
        source: io::Error,
    },

    /// Every resolved address refused or timed out.
    #[error("failed to connect to {target}: {source}")]
    Connect {
        target: String,
        #[source]
        source: io::Error,
    },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Framing error while sending or receiving.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// A complete frame arrived but the factory rejected it.
    #[error("failed to decode message: {0}")]
    Decode(#[from] DecodeError),

    /// The peer closed the connection between frames.
    #[error("connection closed by peer")]
    Closed,

    /// Error from the embedded server (`framecast serve`).
    #[error("Server error: {0}")]
    Server(#[from] ServerError),
}
