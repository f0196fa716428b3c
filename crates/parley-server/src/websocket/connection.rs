//! Per-client connection handle.
//!
//! A `ClientConnection` is the registry's view of one live socket: a
//! bounded channel to the socket's writer task. Delivery is best-effort;
//! a full or closed channel drops the frame and tells the caller.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parley_core::frames::ServerFrame;
use parley_core::ids::ClientId;
use tokio::sync::mpsc;

/// What the writer task should do next.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// Serialize and send one frame.
    Frame(ServerFrame),
    /// Send a close frame with the given code/reason and stop writing.
    Close {
        /// WebSocket close code (1000 normal, 1008 policy violation).
        code: u16,
        /// Human-readable close reason.
        reason: &'static str,
    },
}

/// One live duplex connection, keyed by `client_id` in the registry.
pub struct ClientConnection {
    /// The client this handle belongs to.
    pub client_id: ClientId,
    /// Channel to the socket's writer task.
    tx: mpsc::Sender<Outbound>,
    /// When this connection was established.
    pub connected_at: Instant,
    /// Frames dropped because the channel was full or closed.
    dropped_frames: AtomicU64,
}

impl ClientConnection {
    /// Create a handle wired to a writer task's receive half.
    #[must_use]
    pub fn new(client_id: ClientId, tx: mpsc::Sender<Outbound>) -> Self {
        Self {
            client_id,
            tx,
            connected_at: Instant::now(),
            dropped_frames: AtomicU64::new(0),
        }
    }

    /// Enqueue one frame for delivery.
    ///
    /// Returns `false` (and counts the drop) when the channel is full or
    /// closed. The frame is never buffered or retried.
    pub fn send(&self, frame: ServerFrame) -> bool {
        if self.tx.try_send(Outbound::Frame(frame)).is_ok() {
            true
        } else {
            let _ = self.dropped_frames.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Ask the writer task to close the socket.
    pub fn close(&self, code: u16, reason: &'static str) -> bool {
        self.tx.try_send(Outbound::Close { code, reason }).is_ok()
    }

    /// Total frames dropped for this connection.
    pub fn drop_count(&self) -> u64 {
        self.dropped_frames.load(Ordering::Relaxed)
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }

    /// Whether two handles are the same registration.
    #[must_use]
    pub fn same_handle(a: &Arc<Self>, b: &Arc<Self>) -> bool {
        Arc::ptr_eq(a, b)
    }
}
