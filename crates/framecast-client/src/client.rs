//! Blocking framed TCP client.

use std::io;
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};

use tracing::{debug, warn};

use framecast_core::{Encodable, MessageFactory};
use framecast_protocol::{FrameReader, FrameWriter};

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};

/// A single outbound connection to a framecast server.
///
/// The client has no background thread: every call runs on the caller's
/// thread and blocks until it completes or fails. Nothing is retried.
pub struct Client<F: MessageFactory> {
    reader: FrameReader<TcpStream>,
    writer: FrameWriter<TcpStream>,
    peer: SocketAddr,
    factory: F,
}

impl<F: MessageFactory> Client<F> {
    /// Connects to `host:port` with default settings.
    pub fn connect(host: &str, port: u16, factory: F) -> ClientResult<Self> {
        Self::connect_with(ClientConfig::new(host, port), factory)
    }

    /// Resolves the configured target and connects to the first address
    /// that accepts.
    pub fn connect_with(config: ClientConfig, factory: F) -> ClientResult<Self> {
        let target = config.target();
        let addrs: Vec<SocketAddr> = (config.host.as_str(), config.port)
            .to_socket_addrs()
            .map_err(|source| ClientError::Resolve {
                target: target.clone(),
                source,
            })?
            .collect();

        if addrs.is_empty() {
            return Err(ClientError::Resolve {
                target,
                source: io::Error::new(io::ErrorKind::NotFound, "no addresses found"),
            });
        }

        let stream = open(&config, &target, &addrs)?;
        stream.set_nodelay(true)?;
        stream.set_read_timeout(config.read_timeout)?;
        stream.set_write_timeout(config.write_timeout)?;

        let peer = stream.peer_addr()?;
        let writer = FrameWriter::new(stream.try_clone()?, config.max_frame_size);
        let reader = FrameReader::new(stream, config.max_frame_size);

        debug!(server = %target, peer = %peer, "connected");
        Ok(Self {
            reader,
            writer,
            peer,
            factory,
        })
    }

    /// Address of the server this client is connected to.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Frames and writes one message, flushing before returning.
    pub fn send(&mut self, message: &dyn Encodable) -> ClientResult<()> {
        self.writer.write_message(message)?;
        debug!(peer = %self.peer, size = message.size_in_bytes(), "frame sent");
        Ok(())
    }

    /// Blocks until one complete frame arrives and decodes it.
    ///
    /// A payload the factory rejects yields [`ClientError::Decode`]; the
    /// connection stays usable. A stream that ends before a length prefix
    /// yields [`ClientError::Closed`].
    pub fn recv(&mut self) -> ClientResult<F::Message> {
        let Some(payload) = self.reader.read_frame()? else {
            debug!(peer = %self.peer, "connection closed by peer");
            return Err(ClientError::Closed);
        };

        debug!(peer = %self.peer, size = payload.len(), "frame received");
        self.factory.create(&payload).map_err(|e| {
            warn!(peer = %self.peer, error = %e, "failed to decode message");
            ClientError::Decode(e)
        })
    }

    /// Shuts down both directions of the connection.
    pub fn shutdown(&self) -> ClientResult<()> {
        self.reader.get_ref().shutdown(Shutdown::Both)?;
        Ok(())
    }
}

/// Tries each resolved address in turn, keeping the last failure.
fn open(config: &ClientConfig, target: &str, addrs: &[SocketAddr]) -> ClientResult<TcpStream> {
    let mut last_error = None;
    for addr in addrs {
        let attempt = match config.connect_timeout {
            Some(timeout) => TcpStream::connect_timeout(addr, timeout),
            None => TcpStream::connect(addr),
        };
        match attempt {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                debug!(addr = %addr, error = %e, "connect attempt failed");
                last_error = Some(e);
            }
        }
    }

    Err(ClientError::Connect {
        target: target.to_owned(),
        source: last_error
            .unwrap_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no addresses found")),
    })
}
