//! Connection registry. Owns the one-live-handle-per-client invariant
//! and routes outbound frames.
//!
//! The registry knows nothing about sessions or topics; its side effects
//! are confined to its own map.

use std::collections::HashMap;
use std::sync::Arc;

use parley_core::frames::ServerFrame;
use parley_core::ids::ClientId;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::connection::ClientConnection;

/// Registry of live connections indexed by client ID.
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<ClientId, Arc<ClientConnection>>>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Register a new connection handle.
    ///
    /// Returns `false` when a live handle already exists for the same
    /// client; the prior connection is left untouched and the caller
    /// must close the new handle ("session already active"). The check
    /// and insert happen under one write lock, so the invariant is
    /// atomic with respect to registration.
    pub async fn register(&self, connection: Arc<ClientConnection>) -> bool {
        let mut conns = self.connections.write().await;
        if conns.contains_key(&connection.client_id) {
            warn!(client_id = %connection.client_id, "duplicate connection attempt");
            return false;
        }
        let client_id = connection.client_id.clone();
        let _ = conns.insert(client_id.clone(), connection);
        info!(%client_id, total = conns.len(), "client registered");
        true
    }

    /// Remove a client's handle. Idempotent; unknown IDs are a no-op.
    pub async fn disconnect(&self, client_id: &ClientId) {
        let mut conns = self.connections.write().await;
        if conns.remove(client_id).is_some() {
            info!(%client_id, total = conns.len(), "client deregistered");
        }
    }

    /// Remove a specific handle, but only if it is still the registered
    /// one for its client.
    ///
    /// A connection task cleaning up after itself must not evict a newer
    /// handle that re-registered under the same client ID in the
    /// meantime.
    pub async fn deregister(&self, connection: &Arc<ClientConnection>) {
        let mut conns = self.connections.write().await;
        let still_current = conns
            .get(&connection.client_id)
            .is_some_and(|existing| ClientConnection::same_handle(existing, connection));
        if still_current {
            let _ = conns.remove(&connection.client_id);
            info!(client_id = %connection.client_id, total = conns.len(), "client deregistered");
        }
    }

    /// Best-effort delivery of one frame to one client.
    ///
    /// Returns `false` when no live handle exists or the handle's queue
    /// rejected the frame; the frame is dropped, never retried.
    pub async fn send(&self, client_id: &ClientId, frame: ServerFrame) -> bool {
        let conns = self.connections.read().await;
        match conns.get(client_id) {
            Some(conn) => {
                let delivered = conn.send(frame);
                if !delivered {
                    warn!(%client_id, "failed to enqueue frame for client");
                }
                delivered
            }
            None => {
                warn!(%client_id, "no live connection for outbound frame");
                false
            }
        }
    }

    /// Best-effort fan-out to all live handles.
    ///
    /// Handles that fail to accept the frame are proactively
    /// disconnected.
    pub async fn broadcast(&self, frame: &ServerFrame) {
        let mut failed = Vec::new();
        {
            let conns = self.connections.read().await;
            debug!(recipients = conns.len(), "broadcasting frame");
            for conn in conns.values() {
                if !conn.send(frame.clone()) {
                    failed.push(conn.client_id.clone());
                }
            }
        }
        for client_id in failed {
            warn!(%client_id, "broadcast failed, disconnecting client");
            self.disconnect(&client_id).await;
        }
    }

    /// Close a client's socket with the given code/reason and deregister
    /// it. Used by the reaper for timed-out sessions.
    pub async fn close_client(&self, client_id: &ClientId, code: u16, reason: &'static str) {
        let conn = {
            let mut conns = self.connections.write().await;
            conns.remove(client_id)
        };
        if let Some(conn) = conn {
            info!(%client_id, code, reason, "closing lingering connection");
            if !conn.close(code, reason) {
                debug!(%client_id, "close command not delivered (writer already gone)");
            }
        }
    }

    /// Whether a live handle exists for the client.
    pub async fn is_connected(&self, client_id: &ClientId) -> bool {
        self.connections.read().await.contains_key(client_id)
    }

    /// Number of live connections.
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websocket::connection::Outbound;
    use tokio::sync::mpsc;

    fn make_conn(id: &str) -> (Arc<ClientConnection>, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(32);
        (Arc::new(ClientConnection::new(ClientId::from(id), tx)), rx)
    }

    #[tokio::test]
    async fn register_first_handle_accepted() {
        let registry = ConnectionRegistry::new();
        let (conn, _rx) = make_conn("alice");
        assert!(registry.register(conn).await);
        assert_eq!(registry.connection_count().await, 1);
    }

    #[tokio::test]
    async fn duplicate_client_rejected_prior_untouched() {
        let registry = ConnectionRegistry::new();
        let (first, mut first_rx) = make_conn("alice");
        let (second, _rx) = make_conn("alice");
        assert!(registry.register(first).await);
        assert!(!registry.register(second).await);

        // The prior connection is still the registered one.
        assert_eq!(registry.connection_count().await, 1);
        assert!(registry.send(&ClientId::from("alice"), ServerFrame::Pong).await);
        assert!(matches!(
            first_rx.recv().await,
            Some(Outbound::Frame(ServerFrame::Pong))
        ));
    }

    #[tokio::test]
    async fn disconnect_is_idempotent() {
        let registry = ConnectionRegistry::new();
        let (conn, _rx) = make_conn("alice");
        assert!(registry.register(conn).await);
        registry.disconnect(&ClientId::from("alice")).await;
        registry.disconnect(&ClientId::from("alice")).await;
        registry.disconnect(&ClientId::from("nobody")).await;
        assert_eq!(registry.connection_count().await, 0);
    }

    #[tokio::test]
    async fn send_to_unknown_client_reports_failure() {
        let registry = ConnectionRegistry::new();
        assert!(!registry.send(&ClientId::from("ghost"), ServerFrame::Pong).await);
    }

    #[tokio::test]
    async fn send_to_dead_handle_reports_failure() {
        let registry = ConnectionRegistry::new();
        let (conn, rx) = make_conn("alice");
        assert!(registry.register(conn).await);
        drop(rx);
        assert!(!registry.send(&ClientId::from("alice"), ServerFrame::Pong).await);
    }

    #[tokio::test]
    async fn broadcast_disconnects_failed_handles() {
        let registry = ConnectionRegistry::new();
        let (alive, mut alive_rx) = make_conn("alive");
        let (dead, dead_rx) = make_conn("dead");
        assert!(registry.register(alive).await);
        assert!(registry.register(dead).await);
        drop(dead_rx);

        registry.broadcast(&ServerFrame::Pong).await;

        assert!(alive_rx.try_recv().is_ok());
        assert_eq!(registry.connection_count().await, 1);
        assert!(!registry.is_connected(&ClientId::from("dead")).await);
    }

    #[tokio::test]
    async fn close_client_sends_close_and_deregisters() {
        let registry = ConnectionRegistry::new();
        let (conn, mut rx) = make_conn("idle");
        assert!(registry.register(conn).await);

        registry
            .close_client(&ClientId::from("idle"), 1000, "Session timed out")
            .await;

        assert_eq!(registry.connection_count().await, 0);
        match rx.recv().await.unwrap() {
            Outbound::Close { code, reason } => {
                assert_eq!(code, 1000);
                assert_eq!(reason, "Session timed out");
            }
            other => panic!("unexpected outbound: {other:?}"),
        }
    }

    #[tokio::test]
    async fn close_unknown_client_is_noop() {
        let registry = ConnectionRegistry::new();
        registry
            .close_client(&ClientId::from("nobody"), 1000, "Session timed out")
            .await;
        assert_eq!(registry.connection_count().await, 0);
    }

    #[tokio::test]
    async fn deregister_ignores_superseded_handle() {
        let registry = ConnectionRegistry::new();
        let (old, _old_rx) = make_conn("alice");
        assert!(registry.register(old.clone()).await);

        // Simulate: old entry removed (e.g. by the reaper), client
        // reconnects with a fresh handle.
        registry.disconnect(&ClientId::from("alice")).await;
        let (new, _new_rx) = make_conn("alice");
        assert!(registry.register(new.clone()).await);

        // The old task's cleanup must not evict the new registration.
        registry.deregister(&old).await;
        assert!(registry.is_connected(&ClientId::from("alice")).await);

        registry.deregister(&new).await;
        assert!(!registry.is_connected(&ClientId::from("alice")).await);
    }
}
