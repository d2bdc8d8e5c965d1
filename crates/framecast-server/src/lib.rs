//! Multi-client framecast server.
//!
//! This crate provides:
//! - [`Registry`]: listener, live connection set and broadcast
//! - [`Connection`]: the per-socket read cycle and framed writes
//! - [`EventLoop`]: the single background I/O thread driving all connections
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use framecast_core::{TextFactory, TextMessage};
//! use framecast_server::{Registry, ServerConfig};
//!
//! let registry = Registry::with_config(ServerConfig::new(1111), TextFactory)?;
//! registry.register_sink(Arc::new(|m: &TextMessage| {
//!     println!("{m}");
//!     true
//! }));
//! registry.start();
//! # Ok::<(), framecast_server::ServerError>(())
//! ```

mod config;
mod connection;
mod error;
mod lifecycle;
mod registry;

pub use config::ServerConfig;
pub use connection::{Connection, ConnectionId, ConnectionState};
pub use error::{ServerError, ServerResult};
pub use lifecycle::{EventLoop, ShutdownHandle, ShutdownSignal};
pub use registry::Registry;
