//! Server configuration.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use framecast_protocol::{DEFAULT_MAX_FRAME_SIZE, DEFAULT_PORT};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to listen on.
    pub bind_address: IpAddr,

    /// Port to listen on. `0` picks an ephemeral port.
    pub port: u16,

    /// Listen backlog.
    pub backlog: u32,

    /// Largest payload accepted from or sent to a peer.
    pub max_frame_size: u32,

    /// How long `stop()` waits for the serving task to drain.
    pub shutdown_grace: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            backlog: 1024,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            shutdown_grace: Duration::from_millis(500),
        }
    }
}

impl ServerConfig {
    /// Creates a configuration listening on all IPv4 interfaces at `port`.
    pub fn new(port: u16) -> Self {
        Self {
            port,
            ..Default::default()
        }
    }

    /// Builder: set bind address.
    pub fn with_bind_address(mut self, address: IpAddr) -> Self {
        self.bind_address = address;
        self
    }

    /// Builder: set listen backlog.
    pub fn with_backlog(mut self, backlog: u32) -> Self {
        self.backlog = backlog;
        self
    }

    /// Builder: set max frame size.
    pub fn with_max_frame_size(mut self, max: u32) -> Self {
        self.max_frame_size = max;
        self
    }

    /// Builder: set shutdown grace period.
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// The socket address to bind.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }
}
