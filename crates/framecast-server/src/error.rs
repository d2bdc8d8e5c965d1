//! Server error types.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

use crate::connection::ConnectionId;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Could not bind or listen on the requested address.
    #[error("failed to listen on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// The background I/O runtime could not be built.
    #[error("failed to start I/O runtime: {0}")]
    Runtime(#[source] io::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Protocol error (oversized frame, etc.).
    #[error("Protocol error: {0}")]
    Protocol(#[from] framecast_protocol::ProtocolError),

    /// A broadcast stopped at the first connection that failed.
    #[error("broadcast failed on connection {connection} ({peer}) after {delivered} deliveries: {source}")]
    Send {
        connection: ConnectionId,
        peer: String,
        delivered: usize,
        #[source]
        source: framecast_protocol::ProtocolError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use framecast_protocol::ProtocolError;

    #[test]
    fn send_error_message() {
        let err = ServerError::Send {
            connection: ConnectionId::new(3),
            peer: "127.0.0.1:5000".into(),
            delivered: 2,
            source: ProtocolError::Io(io::ErrorKind::BrokenPipe.into()),
        };
        insta::assert_snapshot!(
            err.to_string(),
            @"broadcast failed on connection #3 (127.0.0.1:5000) after 2 deliveries: IO error: broken pipe"
        );
    }
}
