//! Periodic idle-session eviction.

use std::sync::Arc;

use anyhow::Result;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::ChatConfig;
use crate::store::SessionStore;
use crate::websocket::registry::ConnectionRegistry;

/// Close code sent to a connection whose session timed out.
pub const TIMEOUT_CLOSE_CODE: u16 = 1000;
/// Close reason sent alongside [`TIMEOUT_CLOSE_CODE`].
pub const TIMEOUT_CLOSE_REASON: &str = "Session timed out";

/// Sweeps the store at a fixed interval, evicting sessions idle past
/// the configured timeout together with their topics, and closing any
/// lingering connection for an evicted client.
///
/// A failure while sweeping pauses the loop for the error backoff and
/// then resumes; only shutdown cancellation ends the loop.
pub struct SessionReaper {
    store: Arc<SessionStore>,
    registry: Arc<ConnectionRegistry>,
    config: ChatConfig,
    #[cfg(test)]
    fail_next_sweeps: std::sync::atomic::AtomicUsize,
}

impl SessionReaper {
    /// Wire the reaper to the store and registry it sweeps.
    #[must_use]
    pub fn new(
        store: Arc<SessionStore>,
        registry: Arc<ConnectionRegistry>,
        config: ChatConfig,
    ) -> Self {
        Self {
            store,
            registry,
            config,
            #[cfg(test)]
            fail_next_sweeps: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// Make the next `n` sweeps fail, to exercise the backoff path.
    #[cfg(test)]
    fn inject_sweep_failures(&self, n: usize) {
        use std::sync::atomic::Ordering;
        self.fail_next_sweeps.store(n, Ordering::SeqCst);
    }

    /// Spawn the sweep loop. The returned handle completes only after
    /// `shutdown` is cancelled; await it to drain the reaper.
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                interval = ?self.config.reaper_interval,
                timeout = ?self.config.session_timeout,
                "session reaper started"
            );
            loop {
                tokio::select! {
                    () = shutdown.cancelled() => break,
                    () = sleep(self.config.reaper_interval) => {}
                }
                match self.sweep().await {
                    Ok(0) => debug!("reaper sweep found no idle sessions"),
                    Ok(evicted) => info!(evicted, "reaper sweep evicted idle sessions"),
                    Err(err) => {
                        error!(error = %err, "reaper sweep failed, backing off");
                        tokio::select! {
                            () = shutdown.cancelled() => break,
                            () = sleep(self.config.reaper_error_backoff) => {}
                        }
                    }
                }
            }
            info!("session reaper stopped");
        })
    }

    /// One sweep pass. A close failure on one client never aborts the
    /// cleanup of the others; an error return triggers the caller's
    /// backoff instead of ending the loop.
    async fn sweep(&self) -> Result<usize> {
        #[cfg(test)]
        {
            use std::sync::atomic::Ordering;
            if self
                .fail_next_sweeps
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                anyhow::bail!("injected sweep failure");
            }
        }
        let evicted = self.store.reap_idle(self.config.session_timeout);
        for client_id in &evicted {
            let _ = self
                .registry
                .close_client(client_id, TIMEOUT_CLOSE_CODE, TIMEOUT_CLOSE_REASON)
                .await;
        }
        Ok(evicted.len())
    }
}
