use std::future::Future;
use std::thread::JoinHandle;

use tokio::runtime::{Builder, Handle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{Result, TransportError};

/// A single-threaded event loop running on its own background thread.
///
/// Every task spawned here is polled by that one thread, so no two I/O
/// completions of the same reactor ever run concurrently. Stopping the
/// reactor drops every task it still owns, which closes their sockets.
pub struct Reactor {
    name: String,
    handle: Handle,
    shutdown: CancellationToken,
    thread: Option<JoinHandle<()>>,
}

impl Reactor {
    /// Build the runtime and start its thread.
    pub fn start(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(TransportError::Runtime)?;
        let handle = runtime.handle().clone();
        let shutdown = CancellationToken::new();

        let token = shutdown.clone();
        let thread_name = name.clone();
        let thread = std::thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                runtime.block_on(token.cancelled());
                // Dropping the runtime here cancels whatever is still pending.
                drop(runtime);
                debug!(reactor = %thread_name, "reactor thread exiting");
            })
            .map_err(TransportError::Runtime)?;

        info!(reactor = %name, "reactor started");

        Ok(Self {
            name,
            handle,
            shutdown,
            thread: Some(thread),
        })
    }

    /// Schedule a task on the reactor thread.
    ///
    /// Fails with [`TransportError::Shutdown`] once the reactor is stopped.
    pub fn spawn<F>(&self, future: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if !self.is_running() {
            return Err(TransportError::Shutdown);
        }
        self.handle.spawn(future);
        Ok(())
    }

    /// True until [`Reactor::stop`] has been called.
    pub fn is_running(&self) -> bool {
        !self.shutdown.is_cancelled()
    }

    /// Halt the event loop and join its thread. Idempotent.
    pub fn stop(&mut self) {
        self.shutdown.cancel();
        if let Some(thread) = self.thread.take() {
            if thread.thread().id() == std::thread::current().id() {
                // Called from a task on the reactor itself; the loop exits
                // once this task yields.
                return;
            }
            let _ = thread.join();
            info!(reactor = %self.name, "reactor stopped");
        }
    }
}

impl Drop for Reactor {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for Reactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reactor")
            .field("name", &self.name)
            .field("running", &self.is_running())
            .finish()
    }
}
