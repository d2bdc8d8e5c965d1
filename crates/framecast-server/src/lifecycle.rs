//! Background execution context for a registry.
//!
//! An [`EventLoop`] owns a tokio runtime with a single worker thread. All
//! connection state machines of one registry run there. The serving task is
//! started and stopped through a [`ShutdownHandle`]; stopping waits a bounded
//! grace period for the task to drain and never blocks beyond it.

use std::future::Future;
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::{Builder, Handle, Runtime, RuntimeFlavor};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::{ServerError, ServerResult};

/// Name of the I/O worker thread.
const WORKER_THREAD_NAME: &str = "framecast-io";

/// A handle for triggering or checking shutdown status.
#[derive(Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl Default for ShutdownHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownHandle {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            rx,
        }
    }

    /// Triggers a shutdown.
    pub fn trigger(&self) {
        let _ = self.tx.send(true);
    }

    /// Returns true if shutdown has been triggered.
    pub fn is_shutdown(&self) -> bool {
        *self.rx.borrow()
    }

    /// Returns a signal that completes once shutdown is triggered.
    pub fn signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.rx.clone(),
        }
    }
}

/// The receiving side of a [`ShutdownHandle`].
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Waits for the shutdown signal. Cancel safe.
    ///
    /// Also completes if every handle has been dropped.
    pub async fn wait(&mut self) {
        let _ = self.rx.wait_for(|stop| *stop).await;
    }

    pub fn is_shutdown(&self) -> bool {
        *self.rx.borrow()
    }
}

struct Running {
    shutdown: ShutdownHandle,
    finished: mpsc::Receiver<()>,
}

/// Owns the runtime and the currently running serving task, if any.
pub struct EventLoop {
    runtime: Option<Runtime>,
    handle: Handle,
    grace: Duration,
    running: Mutex<Option<Running>>,
}

impl EventLoop {
    /// Builds the runtime. Nothing is served until [`EventLoop::start`].
    pub fn new(grace: Duration) -> ServerResult<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name(WORKER_THREAD_NAME)
            .enable_all()
            .build()
            .map_err(ServerError::Runtime)?;
        let handle = runtime.handle().clone();

        Ok(Self {
            runtime: Some(runtime),
            handle,
            grace,
            running: Mutex::new(None),
        })
    }

    /// Handle to the runtime, for registering I/O resources with it.
    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    pub fn grace(&self) -> Duration {
        self.grace
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    /// Spawns the serving task built by `task`.
    ///
    /// Returns false without calling `task` if a task is already running.
    pub fn start<F, Fut>(&self, task: F) -> bool
    where
        F: FnOnce(ShutdownSignal) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut running = self.running.lock();
        if running.is_some() {
            debug!("event loop already running");
            return false;
        }

        let shutdown = ShutdownHandle::new();
        let (done_tx, finished) = mpsc::channel();
        let fut = task(shutdown.signal());
        self.handle.spawn(async move {
            fut.await;
            let _ = done_tx.send(());
        });

        *running = Some(Running { shutdown, finished });
        info!("event loop started");
        true
    }

    /// Signals the serving task to stop and waits up to the grace period.
    ///
    /// Returns true if the task finished in time (or nothing was running).
    pub fn stop(&self) -> bool {
        let Some(running) = self.running.lock().take() else {
            return true;
        };

        running.shutdown.trigger();
        match running.finished.recv_timeout(self.grace) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                info!("event loop stopped");
                true
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    grace_ms = self.grace.as_millis() as u64,
                    "event loop did not drain within grace period"
                );
                false
            }
        }
    }

    /// Runs `fut` to completion on this runtime from any calling context.
    ///
    /// Outside a runtime this blocks the caller directly. On a multi-thread
    /// runtime worker (including our own, e.g. from a sink) the worker is
    /// handed off first. From a current-thread runtime the future is driven
    /// from a scoped helper thread.
    pub fn block_on<Fut>(&self, fut: Fut) -> Fut::Output
    where
        Fut: Future + Send,
        Fut::Output: Send,
    {
        match Handle::try_current().map(|h| h.runtime_flavor()) {
            Err(_) => self.handle.block_on(fut),
            Ok(RuntimeFlavor::MultiThread) => {
                tokio::task::block_in_place(|| self.handle.block_on(fut))
            }
            Ok(_) => std::thread::scope(|scope| {
                match scope.spawn(|| self.handle.block_on(fut)).join() {
                    Ok(output) => output,
                    Err(panic) => std::panic::resume_unwind(panic),
                }
            }),
        }
    }
}

impl Drop for EventLoop {
    fn drop(&mut self) {
        self.stop();
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
        debug!("event loop released");
    }
}
