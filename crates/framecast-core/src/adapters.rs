//! Ready-made payload encodings.
//!
//! Each encoding comes as a pair: an outbound wrapper implementing
//! [`Encodable`] and a factory implementing [`MessageFactory`] for the
//! receiving side.

use std::fmt;
use std::marker::PhantomData;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::error;

use crate::message::{DecodeError, Encodable, MessageFactory};

/// A UTF-8 text message.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TextMessage(pub String);

impl TextMessage {
    /// Creates a text message.
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    /// Returns the text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Unwraps the text.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for TextMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TextMessage {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl From<String> for TextMessage {
    fn from(text: String) -> Self {
        Self(text)
    }
}

impl Encodable for TextMessage {
    fn serialize(&self) -> Vec<u8> {
        self.0.as_bytes().to_vec()
    }

    fn size_in_bytes(&self) -> usize {
        self.0.len()
    }
}

/// Decodes payloads as UTF-8 text.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextFactory;

impl MessageFactory for TextFactory {
    type Message = TextMessage;

    fn create(&self, payload: &[u8]) -> Result<TextMessage, DecodeError> {
        Ok(TextMessage(String::from_utf8(payload.to_vec())?))
    }
}

/// Passes payloads through untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawFactory;

impl MessageFactory for RawFactory {
    type Message = Vec<u8>;

    fn create(&self, payload: &[u8]) -> Result<Vec<u8>, DecodeError> {
        Ok(payload.to_vec())
    }
}

/// Any serde type carried as a JSON payload.
///
/// A value that fails to serialize is logged and encoded as an empty
/// payload, so a broadcast of it still sends a zero-length frame to every
/// peer.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonMessage<T>(pub T);

impl<T> JsonMessage<T> {
    /// Returns the wrapped value.
    pub fn get(&self) -> &T {
        &self.0
    }

    /// Unwraps the value.
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T: Serialize> Encodable for JsonMessage<T> {
    fn serialize(&self) -> Vec<u8> {
        match serde_json::to_vec(&self.0) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(error = %e, "failed to serialize JSON message");
                Vec::new()
            }
        }
    }
}

/// Decodes JSON payloads into `T`.
pub struct JsonFactory<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonFactory<T> {
    /// Creates a factory for `T`.
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for JsonFactory<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for JsonFactory<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for JsonFactory<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonFactory")
            .field("type", &std::any::type_name::<T>())
            .finish()
    }
}

impl<T> MessageFactory for JsonFactory<T>
where
    T: DeserializeOwned + Send + 'static,
{
    type Message = JsonMessage<T>;

    fn create(&self, payload: &[u8]) -> Result<JsonMessage<T>, DecodeError> {
        Ok(JsonMessage(serde_json::from_slice(payload)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Status {
        id: u32,
        kind: String,
        data: Vec<String>,
    }

    #[test]
    fn text_roundtrip() {
        let message = TextMessage::new("hogehoge");
        let decoded = TextFactory.create(&message.serialize()).unwrap();
        assert_eq!(decoded, message);
        assert_eq!(message.size_in_bytes(), 8);
    }

    #[test]
    fn text_rejects_invalid_utf8() {
        let result = TextFactory.create(&[0xff, 0xfe]);
        assert!(matches!(result, Err(DecodeError::Utf8(_))));
    }

    #[test]
    fn empty_text_is_legal() {
        let decoded = TextFactory.create(&[]).unwrap();
        assert_eq!(decoded.as_str(), "");
    }

    #[test]
    fn json_roundtrip() {
        let status = Status {
            id: 10,
            kind: "ack".into(),
            data: vec!["hogehoge".into()],
        };
        let message = JsonMessage(status.clone());
        let factory = JsonFactory::<Status>::new();

        let decoded = factory.create(&message.serialize()).unwrap();
        assert_eq!(decoded.into_inner(), status);
    }

    #[test]
    fn json_rejects_wrong_shape() {
        let factory = JsonFactory::<Status>::new();
        let result = factory.create(br#"{"id": "ten"}"#);
        assert!(matches!(result, Err(DecodeError::Json(_))));
    }

    #[test]
    fn json_unserializable_value_encodes_empty() {
        let mut map = std::collections::HashMap::new();
        map.insert((1u8, 2u8), "tuple keys are not JSON object keys");
        let message = JsonMessage(map);
        assert!(message.serialize().is_empty());
        assert_eq!(message.size_in_bytes(), 0);
    }

    #[test]
    fn raw_passthrough() {
        assert_eq!(RawFactory.create(&[0, 1, 2]).unwrap(), vec![0, 1, 2]);
    }
}
