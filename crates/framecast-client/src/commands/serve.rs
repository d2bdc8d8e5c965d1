//! Serve command: runs a text broadcast server in the foreground.
//!
//! Every message received from a client is printed to stdout. Every line
//! read from stdin is broadcast to all connected clients. The server stops
//! when stdin reaches end of input.

use std::io::{self, BufRead};
use std::sync::Arc;

use tracing::{debug, info, warn};

use framecast_core::{TextFactory, TextMessage};
use framecast_server::{Registry, ServerConfig};

use crate::cli::ServeArgs;
use crate::error::ClientResult;

pub fn run(args: &ServeArgs) -> ClientResult<()> {
    let config = ServerConfig::new(args.port)
        .with_bind_address(args.bind)
        .with_max_frame_size(args.max_frame_size);
    let registry = Registry::with_config(config, TextFactory)?;

    registry.register_sink(Arc::new(|message: &TextMessage| {
        println!("{message}");
        true
    }));
    registry.start();

    info!(addr = %registry.local_addr(), "server listening");
    eprintln!("listening on {}", registry.local_addr());

    for line in io::stdin().lock().lines() {
        let line = line?;
        match registry.broadcast(&TextMessage::new(line)) {
            Ok(delivered) => debug!(delivered, "line broadcast"),
            Err(e) => warn!(error = %e, "broadcast failed"),
        }
    }

    info!("stdin closed, stopping server");
    registry.stop();
    Ok(())
}
