//! Core types: message contracts, payload adapters, tracing

pub mod adapters;
pub mod message;
pub mod tracing;

pub use adapters::{JsonFactory, JsonMessage, RawFactory, TextFactory, TextMessage};
pub use message::{DecodeError, Encodable, MessageFactory, MessageSink, SinkList};
pub use tracing::{TracingConfig, TracingError, TracingOutputFormat, init_tracing};
