//! Capability contracts between the transport and the application.
//!
//! The transport never looks inside a payload. It only needs three things
//! from the serialization layer:
//!
//! - [`Encodable`]: turn an outbound message into bytes
//! - [`MessageFactory`]: turn a received payload into an application message
//! - [`MessageSink`]: observe decoded messages on the server side
//!
//! Sinks are kept in a [`SinkList`] that is shared by reference between a
//! registry and every connection it creates, so a sink registered after the
//! server started still sees subsequent messages.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;
use tracing::{debug, error};

/// Errors a [`MessageFactory`] reports when a payload cannot be decoded.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Payload is not valid JSON for the expected type.
    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),

    /// Payload is not valid UTF-8.
    #[error("invalid UTF-8 payload: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    /// Any other decoding failure.
    #[error("invalid payload: {0}")]
    Invalid(String),
}

impl DecodeError {
    /// Creates a generic decode error.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid(message.into())
    }
}

/// An outbound message that can be framed and written to a peer.
pub trait Encodable {
    /// Serializes the message into its wire payload.
    fn serialize(&self) -> Vec<u8>;

    /// Size of the serialized payload in bytes.
    ///
    /// Used as a capacity hint only; the frame length is always taken from
    /// the bytes returned by [`Encodable::serialize`].
    fn size_in_bytes(&self) -> usize {
        self.serialize().len()
    }
}

impl Encodable for [u8] {
    fn serialize(&self) -> Vec<u8> {
        self.to_vec()
    }

    fn size_in_bytes(&self) -> usize {
        self.len()
    }
}

impl Encodable for Vec<u8> {
    fn serialize(&self) -> Vec<u8> {
        self.clone()
    }

    fn size_in_bytes(&self) -> usize {
        self.len()
    }
}

/// Decodes raw payloads into application messages.
///
/// Decoding is given only the payload bytes, there is no out-of-band type
/// hint. Failures are returned, never panicked.
pub trait MessageFactory: Send + Sync + 'static {
    /// The decoded message type.
    type Message: Send + 'static;

    /// Decodes one frame payload.
    fn create(&self, payload: &[u8]) -> Result<Self::Message, DecodeError>;
}

/// Observer of decoded messages.
///
/// The return value is advisory: `false` is logged but delivery to the
/// remaining sinks continues either way.
pub trait MessageSink<M>: Send + Sync {
    /// Called once per successfully decoded frame.
    fn on_message(&self, message: &M) -> bool;
}

impl<M, F> MessageSink<M> for F
where
    F: Fn(&M) -> bool + Send + Sync,
{
    fn on_message(&self, message: &M) -> bool {
        self(message)
    }
}

/// Append-only list of sinks shared between a registry and its connections.
pub struct SinkList<M> {
    sinks: RwLock<Vec<Arc<dyn MessageSink<M>>>>,
}

impl<M> Default for SinkList<M> {
    fn default() -> Self {
        Self {
            sinks: RwLock::new(Vec::new()),
        }
    }
}

impl<M> SinkList<M> {
    /// Creates an empty sink list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a sink. It is visible to every dispatch started afterwards.
    pub fn register(&self, sink: Arc<dyn MessageSink<M>>) {
        self.sinks.write().push(sink);
    }

    /// Number of registered sinks.
    pub fn len(&self) -> usize {
        self.sinks.read().len()
    }

    /// Returns true if no sink is registered.
    pub fn is_empty(&self) -> bool {
        self.sinks.read().is_empty()
    }

    /// Delivers `message` to every sink in registration order.
    ///
    /// The list is snapshotted first so a sink may register further sinks
    /// without deadlocking. A panicking sink is logged and skipped.
    /// Returns the number of sinks that accepted the message.
    pub fn dispatch(&self, message: &M) -> usize {
        let sinks: Vec<_> = self.sinks.read().iter().cloned().collect();

        let mut accepted = 0;
        for (index, sink) in sinks.iter().enumerate() {
            match panic::catch_unwind(AssertUnwindSafe(|| sink.on_message(message))) {
                Ok(true) => accepted += 1,
                Ok(false) => debug!(sink = index, "sink declined message"),
                Err(_) => error!(sink = index, "sink panicked while handling message"),
            }
        }
        accepted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn dispatch_in_registration_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let list: SinkList<u32> = SinkList::new();

        for tag in ["a", "b", "c"] {
            let seen = seen.clone();
            list.register(Arc::new(move |m: &u32| {
                seen.lock().push(format!("{tag}{m}"));
                true
            }));
        }

        assert_eq!(list.dispatch(&7), 3);
        assert_eq!(*seen.lock(), vec!["a7", "b7", "c7"]);
    }

    #[test]
    fn panicking_sink_does_not_block_others() {
        let seen = Arc::new(Mutex::new(0));
        let list: SinkList<u32> = SinkList::new();

        list.register(Arc::new(|_: &u32| -> bool { panic!("boom") }));
        let counter = seen.clone();
        list.register(Arc::new(move |_: &u32| {
            *counter.lock() += 1;
            true
        }));

        assert_eq!(list.dispatch(&1), 1);
        assert_eq!(*seen.lock(), 1);
    }

    #[test]
    fn declined_message_still_reaches_later_sinks() {
        let seen = Arc::new(Mutex::new(0));
        let list: SinkList<u32> = SinkList::new();

        list.register(Arc::new(|_: &u32| false));
        let counter = seen.clone();
        list.register(Arc::new(move |_: &u32| {
            *counter.lock() += 1;
            true
        }));

        assert_eq!(list.dispatch(&1), 1);
        assert_eq!(*seen.lock(), 1);
    }

    #[test]
    fn sink_can_register_during_dispatch() {
        let list: Arc<SinkList<u32>> = Arc::new(SinkList::new());
        let inner = list.clone();
        list.register(Arc::new(move |_: &u32| {
            inner.register(Arc::new(|_: &u32| true));
            true
        }));

        list.dispatch(&1);
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn byte_payloads_are_encodable() {
        let payload = vec![1u8, 2, 3];
        assert_eq!(payload.serialize(), vec![1, 2, 3]);
        assert_eq!(payload.size_in_bytes(), 3);
        assert_eq!(payload[..2].serialize(), vec![1, 2]);
    }

    #[test]
    fn decode_error_messages() {
        insta::assert_snapshot!(DecodeError::invalid("short").to_string(), @"invalid payload: short");
    }
}
