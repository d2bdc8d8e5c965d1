//! Send command: delivers text frames and optionally waits for a reply.

use std::thread;
use std::time::Duration;

use tracing::debug;

use framecast_core::{TextFactory, TextMessage};

use crate::cli::SendArgs;
use crate::client::Client;
use crate::config::ClientConfig;
use crate::error::ClientResult;

pub fn run(args: &SendArgs) -> ClientResult<()> {
    let mut config = ClientConfig::new(args.host.as_str(), args.port);
    if let Some(secs) = args.timeout {
        let timeout = Duration::from_secs(secs);
        config = config
            .with_connect_timeout(timeout)
            .with_read_timeout(timeout);
    }

    let mut client = Client::connect_with(config, TextFactory)?;
    let message = TextMessage::new(args.text.as_str());
    for i in 0..args.count {
        if i > 0 && args.interval_ms > 0 {
            thread::sleep(Duration::from_millis(args.interval_ms));
        }
        client.send(&message)?;
    }
    debug!(count = args.count, peer = %client.peer_addr(), "messages sent");

    if args.no_wait {
        return Ok(());
    }

    let reply = client.recv()?;
    println!("{reply}");
    Ok(())
}
