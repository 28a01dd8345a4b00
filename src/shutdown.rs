//! Exactly-once persistence on exit.
//!
//! The controller owns the result store's writer and a finalize-once gate.
//! Both exit paths funnel through [`ShutdownController::finalize`]: the
//! normal path after the pool drains, and the signal path from the listener
//! task spawned by [`ShutdownController::spawn_signal_listener`]. Whichever
//! arrives first persists; the other is a no-op.
//!
//! The signal path exits the process immediately after persisting. It does
//! not wait for in-flight workers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::export::DatasetWriter;
use crate::store::ResultStore;

/// Guarantees the result store is persisted at most once per process,
/// whether triggered by a termination signal or by normal completion.
pub struct ShutdownController {
    store: Arc<ResultStore>,
    writer: DatasetWriter,
    finalized: AtomicBool,
}

impl ShutdownController {
    /// Creates a controller over the shared store and its output writer.
    pub fn new(store: Arc<ResultStore>, writer: DatasetWriter) -> Self {
        Self {
            store,
            writer,
            finalized: AtomicBool::new(false),
        }
    }

    /// Persists a consistent snapshot of the store, at most once.
    ///
    /// Returns `true` if this call performed the persistence, `false` if a
    /// previous call already did. A persistence failure is logged and not
    /// propagated; the data-loss risk is accepted, not masked.
    pub fn finalize(&self) -> bool {
        if self
            .finalized
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }

        match self.writer.write(&self.store) {
            Ok(()) => {
                info!(
                    path = %self.writer.path().display(),
                    messages = self.store.len(),
                    "Dataset saved"
                );
            }
            Err(e) => {
                error!(
                    path = %self.writer.path().display(),
                    error = %e,
                    "Failed to save dataset"
                );
            }
        }
        true
    }

    /// Returns whether a finalize already ran.
    pub fn is_finalized(&self) -> bool {
        self.finalized.load(Ordering::SeqCst)
    }

    /// Spawns the listener task for SIGINT and SIGTERM.
    ///
    /// On the first signal it persists whatever has been appended so far and
    /// exits the process with code 0, abandoning any worker still mid-retry
    /// or mid-call.
    pub fn spawn_signal_listener(self: &Arc<Self>) -> JoinHandle<()> {
        let controller = Arc::clone(self);
        tokio::spawn(async move {
            wait_for_termination().await;
            warn!("Termination signal received, saving dataset before exit");
            controller.finalize();
            std::process::exit(0);
        })
    }
}

/// Resolves when the process receives SIGINT or, on unix, SIGTERM.
async fn wait_for_termination() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(sig) => sig,
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler, falling back to ctrl-c");
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
