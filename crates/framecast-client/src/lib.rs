//! Blocking client for framecast servers and the `framecast` command-line tool.
//!
//! A [`Client`] holds one TCP connection. [`Client::send`] writes one frame,
//! [`Client::recv`] blocks until one complete frame has arrived and decodes
//! it with the client's [`framecast_core::MessageFactory`].

pub mod cli;
pub mod client;
pub mod commands;
pub mod config;
pub mod error;

pub use cli::Cli;
pub use client::Client;
pub use config::ClientConfig;
pub use error::{ClientError, ClientResult};
