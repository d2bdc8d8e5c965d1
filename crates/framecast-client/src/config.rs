//! Client connection settings.

use std::time::Duration;

use framecast_protocol::{DEFAULT_MAX_FRAME_SIZE, DEFAULT_PORT};

/// Where and how a [`crate::Client`] connects.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Host name or IP literal of the server.
    pub host: String,

    pub port: u16,

    /// Per-address connect timeout. `None` uses the OS default.
    pub connect_timeout: Option<Duration>,

    /// `None` blocks in `recv` until a frame arrives.
    pub read_timeout: Option<Duration>,

    pub write_timeout: Option<Duration>,

    /// Largest payload accepted from or sent to the server.
    pub max_frame_size: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_owned(),
            port: DEFAULT_PORT,
            connect_timeout: None,
            read_timeout: None,
            write_timeout: None,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

impl ClientConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    /// Builder: set connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Builder: set read timeout.
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    /// Builder: set write timeout.
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = Some(timeout);
        self
    }

    /// Builder: set max frame size.
    pub fn with_max_frame_size(mut self, max: u32) -> Self {
        self.max_frame_size = max;
        self
    }

    /// `host:port`, as used in log fields and error messages.
    pub fn target(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
