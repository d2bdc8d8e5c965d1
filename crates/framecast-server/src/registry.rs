//! Connection registry: accept loop, live set and broadcast.
//!
//! The registry owns every accepted [`Connection`]. Connections that end
//! their read cycle are queued for removal and the queue is drained before
//! each accept registration and each broadcast, so a broadcast never
//! targets a connection whose read side already failed.

use std::collections::BTreeMap;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use framecast_core::{Encodable, MessageFactory, MessageSink, SinkList};
use framecast_protocol::{LENGTH_PREFIX_SIZE, ProtocolError, encode_length};

use crate::config::ServerConfig;
use crate::connection::{Connection, ConnectionId};
use crate::error::{ServerError, ServerResult};
use crate::lifecycle::{EventLoop, ShutdownSignal};

/// Live connections plus the ids waiting to be removed.
#[derive(Default)]
struct LiveSet {
    active: BTreeMap<ConnectionId, Arc<Connection>>,
    closing: Vec<ConnectionId>,
}

impl LiveSet {
    /// Drops queued and already-closed connections. Returns how many went.
    fn reconcile(&mut self) -> usize {
        let before = self.active.len();
        for id in self.closing.drain(..) {
            self.active.remove(&id);
        }
        self.active.retain(|_, conn| !conn.is_closed());
        before - self.active.len()
    }

    fn insert(&mut self, connection: Arc<Connection>) {
        self.active.insert(connection.id(), connection);
    }

    fn schedule_removal(&mut self, id: ConnectionId) {
        self.closing.push(id);
    }

    /// Connections in acceptance order.
    fn snapshot(&self) -> Vec<Arc<Connection>> {
        self.active.values().cloned().collect()
    }

    fn clear(&mut self) -> usize {
        self.closing.clear();
        let count = self.active.len();
        self.active.clear();
        count
    }
}

/// State shared between the registry handle and the serving task.
struct Shared<F: MessageFactory> {
    factory: F,
    sinks: SinkList<F::Message>,
    live: Mutex<LiveSet>,
    next_id: AtomicU64,
    max_frame_size: u32,
}

impl<F: MessageFactory> Shared<F> {
    /// Registers a freshly accepted socket and spawns its read cycle.
    ///
    /// A socket that fails setup is dropped before it becomes visible to
    /// broadcasts.
    fn admit(self: &Arc<Self>, stream: TcpStream, tasks: &mut JoinSet<()>) {
        let id = ConnectionId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        if let Err(e) = stream.set_nodelay(true) {
            warn!(connection = %id, error = %e, "connection setup failed, dropping");
            return;
        }

        let peer = stream.peer_addr();
        let (reader, writer) = stream.into_split();
        let connection = Arc::new(Connection::new(id, writer, self.max_frame_size));
        connection.start(peer);

        {
            let mut live = self.live.lock();
            live.reconcile();
            live.insert(connection.clone());
        }
        info!(connection = %id, peer = %connection.peer_label(), "connection accepted");

        let shared = self.clone();
        tasks.spawn(async move {
            let reason = connection
                .read_cycle(reader, &shared.factory, &shared.sinks)
                .await;
            if reason.is_eof() {
                info!(connection = %connection.id(), "peer disconnected");
            } else {
                warn!(connection = %connection.id(), error = %reason, "connection closed");
            }
            shared.live.lock().schedule_removal(connection.id());
            connection.close().await;
        });
    }
}

/// Multi-client server that fans messages out to every live connection.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use framecast_core::{TextFactory, TextMessage};
/// use framecast_server::Registry;
///
/// let registry = Registry::create(1111, TextFactory)?;
/// registry.register_sink(Arc::new(|m: &TextMessage| {
///     println!("received {m}");
///     true
/// }));
/// registry.start();
/// registry.broadcast(&TextMessage::new("ack"))?;
/// registry.stop();
/// # Ok::<(), framecast_server::ServerError>(())
/// ```
pub struct Registry<F: MessageFactory> {
    shared: Arc<Shared<F>>,
    listener: Arc<TcpListener>,
    local_addr: SocketAddr,
    event_loop: EventLoop,
}

impl<F: MessageFactory> Registry<F> {
    /// Binds `0.0.0.0:port` with default settings.
    pub fn create(port: u16, factory: F) -> ServerResult<Self> {
        Self::with_config(ServerConfig::new(port), factory)
    }

    /// Binds and listens according to `config`. Nothing is accepted until
    /// [`Registry::start`].
    pub fn with_config(config: ServerConfig, factory: F) -> ServerResult<Self> {
        let event_loop = EventLoop::new(config.shutdown_grace)?;
        let addr = config.socket_addr();

        let listener = {
            let _guard = event_loop.handle().enter();
            bind_listener(addr, config.backlog)
                .map_err(|source| ServerError::Bind { addr, source })?
        };
        let local_addr = listener.local_addr()?;
        info!(addr = %local_addr, "registry listening");

        let shared = Arc::new(Shared {
            factory,
            sinks: SinkList::new(),
            live: Mutex::new(LiveSet::default()),
            next_id: AtomicU64::new(1),
            max_frame_size: config.max_frame_size,
        });

        Ok(Self {
            shared,
            listener: Arc::new(listener),
            local_addr,
            event_loop,
        })
    }

    /// The bound address (useful with port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Starts accepting and serving connections. A no-op when running.
    pub fn start(&self) {
        let shared = self.shared.clone();
        let listener = self.listener.clone();
        if !self
            .event_loop
            .start(move |shutdown| serve(shared, listener, shutdown))
        {
            debug!("registry already running");
        }
    }

    /// Stops serving, waiting at most the grace period. A no-op when stopped.
    ///
    /// Returns true once the serving task has drained and every connection
    /// is closed. Returns false if the grace period ran out first; the
    /// connections are then closed later, when the task finishes.
    pub fn stop(&self) -> bool {
        self.event_loop.stop()
    }

    pub fn is_running(&self) -> bool {
        self.event_loop.is_running()
    }

    /// Adds a sink. Connections already running see it from their next frame.
    pub fn register_sink(&self, sink: Arc<dyn MessageSink<F::Message>>) {
        self.shared.sinks.register(sink);
    }

    pub fn sink_count(&self) -> usize {
        self.shared.sinks.len()
    }

    /// Number of live connections after dropping closed ones.
    pub fn connection_count(&self) -> usize {
        let mut live = self.shared.live.lock();
        live.reconcile();
        live.active.len()
    }

    /// Sends `message` to every live connection in acceptance order.
    ///
    /// Stops at the first connection that fails, queues it for removal and
    /// reports it; connections after it are not attempted. Returns the number
    /// of connections reached.
    pub fn broadcast(&self, message: &dyn Encodable) -> ServerResult<usize> {
        let payload = message.serialize();
        let prefix = encode_length(payload.len(), self.shared.max_frame_size)?;

        let targets = {
            let mut live = self.shared.live.lock();
            let removed = live.reconcile();
            if removed > 0 {
                debug!(removed, "dropped closed connections before broadcast");
            }
            live.snapshot()
        };

        if targets.is_empty() {
            debug!("broadcast with no live connections");
            return Ok(0);
        }

        match self
            .event_loop
            .block_on(send_to_all(&targets, prefix, &payload))
        {
            Ok(delivered) => {
                debug!(delivered, bytes = payload.len(), "broadcast complete");
                Ok(delivered)
            }
            Err((index, source)) => {
                let failed = &targets[index];
                error!(
                    connection = %failed.id(),
                    peer = %failed.peer_label(),
                    delivered = index,
                    error = %source,
                    "broadcast failed"
                );
                self.shared.live.lock().schedule_removal(failed.id());
                Err(ServerError::Send {
                    connection: failed.id(),
                    peer: failed.peer_label(),
                    delivered: index,
                    source,
                })
            }
        }
    }
}

fn bind_listener(addr: SocketAddr, backlog: u32) -> io::Result<TcpListener> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    socket.set_reuseaddr(true)?;
    socket.bind(addr)?;
    socket.listen(backlog)
}

/// Writes one frame to each target in order, stopping at the first failure.
///
/// On failure returns the index of the failing target, which is also the
/// number of targets already reached.
async fn send_to_all(
    targets: &[Arc<Connection>],
    prefix: [u8; LENGTH_PREFIX_SIZE],
    payload: &[u8],
) -> Result<usize, (usize, ProtocolError)> {
    for (index, connection) in targets.iter().enumerate() {
        connection
            .send_frame(prefix, payload)
            .await
            .map_err(|e| (index, e))?;
    }
    Ok(targets.len())
}

/// Accept loop. Runs on the event loop until shutdown, then closes every
/// connection it created.
async fn serve<F: MessageFactory>(
    shared: Arc<Shared<F>>,
    listener: Arc<TcpListener>,
    mut shutdown: ShutdownSignal,
) {
    let mut tasks = JoinSet::new();

    loop {
        tokio::select! {
            biased;

            _ = shutdown.wait() => break,

            accepted = listener.accept() => match accepted {
                Ok((stream, _addr)) => shared.admit(stream, &mut tasks),
                Err(e) if shutdown.is_shutdown() => {
                    debug!(error = %e, "accept failed during shutdown");
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "failed to accept connection");
                }
            },

            Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                if let Err(e) = joined
                    && e.is_panic()
                {
                    error!(error = %e, "connection task panicked");
                }
            }
        }
    }

    tasks.shutdown().await;
    let closed = shared.live.lock().clear();
    info!(closed, "registry stopped serving");
}
