//! Per-socket connection state machine.
//!
//! A connection cycles through
//! `ReadingLength -> ReadingPayload -> Dispatching -> ReadingLength` until a
//! read fails, then ends in `Closed`. Decode failures are logged and the
//! cycle continues. Outbound frames are written under a per-connection lock
//! so concurrent senders never interleave.

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::OnceLock;

use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace, warn};

use framecast_core::{Encodable, MessageFactory, SinkList};
use framecast_protocol::{
    LENGTH_PREFIX_SIZE, ProtocolError, ProtocolResult, begin_decode, decode_length, encode_length,
};

/// Identifier assigned to each accepted connection, in acceptance order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Where a connection is in its read cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Constructed, read cycle not started yet.
    Idle,
    ReadingLength,
    ReadingPayload,
    Dispatching,
    /// Terminal. No further reads are issued.
    Closed,
}

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// One peer of a registry.
pub struct Connection {
    id: ConnectionId,
    peer: OnceLock<SocketAddr>,
    state: Mutex<ConnectionState>,
    writer: tokio::sync::Mutex<BoxedWriter>,
    max_frame_size: u32,
}

impl Connection {
    /// Creates an idle connection writing to `writer`.
    pub fn new<W>(id: ConnectionId, writer: W, max_frame_size: u32) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            id,
            peer: OnceLock::new(),
            state: Mutex::new(ConnectionState::Idle),
            writer: tokio::sync::Mutex::new(Box::new(writer)),
            max_frame_size,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Remote address, if it could be resolved at start.
    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer.get().copied()
    }

    /// Peer address for diagnostics.
    pub fn peer_label(&self) -> String {
        match self.peer() {
            Some(addr) => addr.to_string(),
            None => "unknown peer".to_string(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    pub fn is_closed(&self) -> bool {
        self.state() == ConnectionState::Closed
    }

    fn set_state(&self, state: ConnectionState) {
        *self.state.lock() = state;
    }

    /// Records the peer address and enters the read cycle.
    ///
    /// A peer that cannot be resolved is only used for diagnostics, so the
    /// failure is logged and the connection still starts.
    pub fn start(&self, peer: io::Result<SocketAddr>) {
        match peer {
            Ok(addr) => {
                let _ = self.peer.set(addr);
                debug!(connection = %self.id, peer = %addr, "connection started");
            }
            Err(e) => {
                warn!(connection = %self.id, error = %e, "could not resolve peer address");
            }
        }
        self.set_state(ConnectionState::ReadingLength);
    }

    /// Runs the read cycle until the stream fails.
    ///
    /// Every decoded message is handed to `sinks` before the next length
    /// prefix is read. Returns the error that ended the cycle; the connection
    /// is `Closed` afterwards.
    pub async fn read_cycle<R, F>(
        &self,
        mut reader: R,
        factory: &F,
        sinks: &SinkList<F::Message>,
    ) -> ProtocolError
    where
        R: AsyncRead + Unpin,
        F: MessageFactory,
    {
        let reason = loop {
            self.set_state(ConnectionState::ReadingLength);
            let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
            if let Err(e) = reader.read_exact(&mut prefix[..begin_decode()]).await {
                break e.into();
            }

            let len = match decode_length(prefix, self.max_frame_size) {
                Ok(len) => len,
                Err(e) => break e,
            };

            self.set_state(ConnectionState::ReadingPayload);
            let mut payload = vec![0u8; len];
            if let Err(e) = reader.read_exact(&mut payload).await {
                break e.into();
            }

            self.set_state(ConnectionState::Dispatching);
            match factory.create(&payload) {
                Ok(message) => {
                    let accepted = sinks.dispatch(&message);
                    trace!(connection = %self.id, bytes = len, accepted, "frame dispatched");
                }
                Err(e) => {
                    warn!(connection = %self.id, bytes = len, error = %e, "failed to decode payload");
                }
            }
        };

        self.set_state(ConnectionState::Closed);
        reason
    }

    /// Serializes and writes one frame.
    ///
    /// The message is serialized before the returned future is polled. A
    /// failed send leaves the connection state untouched; closing is up to
    /// the caller.
    pub fn send<'a>(
        &'a self,
        message: &dyn Encodable,
    ) -> impl Future<Output = ProtocolResult<()>> + Send + use<'a> {
        let payload = message.serialize();
        let prefix = encode_length(payload.len(), self.max_frame_size);
        async move { self.send_frame(prefix?, &payload).await }
    }

    /// Shuts down the write side and marks the connection closed.
    pub async fn close(&self) {
        self.set_state(ConnectionState::Closed);
        if let Err(e) = self.writer.lock().await.shutdown().await {
            debug!(connection = %self.id, error = %e, "shutdown after close failed");
        }
    }

    /// Writes a pre-encoded prefix and payload, then flushes.
    pub async fn send_frame(
        &self,
        prefix: [u8; LENGTH_PREFIX_SIZE],
        payload: &[u8],
    ) -> ProtocolResult<()> {
        let mut writer = self.writer.lock().await;
        writer.write_all(&prefix).await?;
        writer.write_all(payload).await?;
        writer.flush().await?;
        Ok(())
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("peer", &self.peer())
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use framecast_core::{TextFactory, TextMessage};
    use framecast_protocol::{DEFAULT_MAX_FRAME_SIZE, encode_frame};
    use tokio::io::duplex;

    fn collecting_sinks() -> (Arc<SinkList<TextMessage>>, Arc<Mutex<Vec<String>>>) {
        let sinks = Arc::new(SinkList::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let out = seen.clone();
        sinks.register(Arc::new(move |m: &TextMessage| {
            out.lock().push(m.to_string());
            true
        }));
        (sinks, seen)
    }

    fn frame(text: &[u8]) -> Vec<u8> {
        encode_frame(text, DEFAULT_MAX_FRAME_SIZE).unwrap()
    }

    #[test]
    fn starts_idle_then_reads() {
        let (_peer, ours) = duplex(64);
        let conn = Connection::new(ConnectionId::new(1), ours, DEFAULT_MAX_FRAME_SIZE);
        assert_eq!(conn.state(), ConnectionState::Idle);

        conn.start(Err(io::ErrorKind::NotConnected.into()));
        assert_eq!(conn.state(), ConnectionState::ReadingLength);
        assert!(conn.peer().is_none());
        assert_eq!(conn.peer_label(), "unknown peer");
    }

    #[tokio::test]
    async fn dispatches_frames_in_order() {
        let (mut remote, local) = duplex(1024);
        let conn = Connection::new(ConnectionId::new(1), tokio::io::sink(), DEFAULT_MAX_FRAME_SIZE);
        conn.start(Ok("127.0.0.1:9".parse().unwrap()));
        let (sinks, seen) = collecting_sinks();

        for text in ["one", "two", "", "four"] {
            remote.write_all(&frame(text.as_bytes())).await.unwrap();
        }
        drop(remote);

        let reason = conn.read_cycle(local, &TextFactory, &sinks).await;
        assert!(reason.is_eof());
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert_eq!(*seen.lock(), vec!["one", "two", "", "four"]);
    }

    #[tokio::test]
    async fn assembles_payload_from_split_writes() {
        let (mut remote, local) = duplex(1024);
        let conn = Connection::new(ConnectionId::new(1), tokio::io::sink(), DEFAULT_MAX_FRAME_SIZE);
        let (sinks, seen) = collecting_sinks();

        let bytes = frame(b"hogehoge");
        let writer = tokio::spawn(async move {
            for byte in bytes {
                remote.write_all(&[byte]).await.unwrap();
                tokio::task::yield_now().await;
            }
        });

        let reason = conn.read_cycle(local, &TextFactory, &sinks).await;
        writer.await.unwrap();
        assert!(reason.is_eof());
        assert_eq!(*seen.lock(), vec!["hogehoge"]);
    }

    #[tokio::test]
    async fn decode_failure_keeps_cycle_running() {
        let (mut remote, local) = duplex(1024);
        let conn = Connection::new(ConnectionId::new(1), tokio::io::sink(), DEFAULT_MAX_FRAME_SIZE);
        let (sinks, seen) = collecting_sinks();

        remote.write_all(&frame(&[0xff, 0xfe])).await.unwrap();
        remote.write_all(&frame(b"after")).await.unwrap();
        drop(remote);

        conn.read_cycle(local, &TextFactory, &sinks).await;
        assert_eq!(*seen.lock(), vec!["after"]);
    }

    #[tokio::test]
    async fn oversized_prefix_closes_without_reading_payload() {
        let (mut remote, local) = duplex(64);
        let conn = Connection::new(ConnectionId::new(1), tokio::io::sink(), DEFAULT_MAX_FRAME_SIZE);
        let (sinks, seen) = collecting_sinks();

        remote.write_all(&[0xFF, 0xFF, 0xFF, 0xFF]).await.unwrap();

        let reason = conn.read_cycle(local, &TextFactory, &sinks).await;
        assert!(matches!(
            reason,
            ProtocolError::FrameTooLarge { size: 0xFFFF_FFFF, .. }
        ));
        assert!(conn.is_closed());
        assert!(seen.lock().is_empty());
    }

    #[tokio::test]
    async fn truncated_payload_closes() {
        let (mut remote, local) = duplex(64);
        let conn = Connection::new(ConnectionId::new(1), tokio::io::sink(), DEFAULT_MAX_FRAME_SIZE);
        let (sinks, seen) = collecting_sinks();

        remote.write_all(&[0, 0, 0, 10, b'a', b'b']).await.unwrap();
        drop(remote);

        let reason = conn.read_cycle(local, &TextFactory, &sinks).await;
        assert!(reason.is_eof());
        assert!(seen.lock().is_empty());
    }

    #[tokio::test]
    async fn send_writes_prefix_and_payload() {
        let (ours, mut remote) = duplex(64);
        let conn = Connection::new(ConnectionId::new(1), ours, DEFAULT_MAX_FRAME_SIZE);

        conn.send(&TextMessage::new("ack")).await.unwrap();

        let mut buf = [0u8; 7];
        remote.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf, [0, 0, 0, 3, b'a', b'c', b'k']);
    }

    #[tokio::test]
    async fn send_failure_does_not_close() {
        let (ours, remote) = duplex(64);
        let conn = Connection::new(ConnectionId::new(1), ours, DEFAULT_MAX_FRAME_SIZE);
        conn.start(Ok("127.0.0.1:9".parse().unwrap()));
        drop(remote);

        let result = conn.send(&TextMessage::new("ack")).await;
        assert!(matches!(result, Err(ProtocolError::Io(_))));
        assert_eq!(conn.state(), ConnectionState::ReadingLength);
    }

    #[tokio::test]
    async fn close_signals_eof_to_peer() {
        let (ours, mut remote) = duplex(64);
        let conn = Connection::new(ConnectionId::new(1), ours, DEFAULT_MAX_FRAME_SIZE);
        conn.start(Ok("127.0.0.1:9".parse().unwrap()));

        conn.close().await;
        assert!(conn.is_closed());

        let mut rest = Vec::new();
        remote.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn send_rejects_oversized_message() {
        let conn = Connection::new(ConnectionId::new(1), tokio::io::sink(), 4);
        let result = conn.send(&TextMessage::new("too long")).await;
        assert!(matches!(result, Err(ProtocolError::FrameTooLarge { size: 8, max: 4 })));
    }
}
