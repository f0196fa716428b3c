//! `RelayServer`: Axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use parley_agents::{AgentCatalog, ReplyBackend};
use parley_core::ids::ClientId;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::config::{ChatConfig, ServerConfig};
use crate::health::{self, HealthResponse};
use crate::pipeline::MessagePipeline;
use crate::reaper::SessionReaper;
use crate::shutdown::ShutdownCoordinator;
use crate::store::SessionStore;
use crate::websocket::registry::ConnectionRegistry;
use crate::websocket::session::run_ws_session;

/// Shared state accessible from Axum handlers and session loops.
#[derive(Clone)]
pub struct AppState {
    /// Live connection handles.
    pub registry: Arc<ConnectionRegistry>,
    /// Sessions and topics.
    pub store: Arc<SessionStore>,
    /// Static agent directory.
    pub catalog: Arc<AgentCatalog>,
    /// Inbound frame dispatch.
    pub pipeline: Arc<MessagePipeline>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the server started.
    pub start_time: Instant,
    /// Outbound per-connection queue capacity.
    pub outbound_queue: usize,
}

/// The chat relay server.
pub struct RelayServer {
    config: ServerConfig,
    chat_config: ChatConfig,
    state: AppState,
}

impl RelayServer {
    /// Assemble the server and its collaborators.
    #[must_use]
    pub fn new(
        config: ServerConfig,
        chat_config: ChatConfig,
        catalog: Arc<AgentCatalog>,
        backend: Arc<dyn ReplyBackend>,
    ) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let store = Arc::new(SessionStore::new(Arc::clone(&catalog)));
        let pipeline = Arc::new(MessagePipeline::new(
            Arc::clone(&store),
            Arc::clone(&registry),
            Arc::clone(&catalog),
            backend,
            chat_config.clone(),
        ));
        let state = AppState {
            registry,
            store,
            catalog,
            pipeline,
            shutdown: Arc::new(ShutdownCoordinator::new()),
            start_time: Instant::now(),
            outbound_queue: config.outbound_queue,
        };
        Self {
            config,
            chat_config,
            state,
        }
    }

    /// Build the Axum router with all routes.
    #[must_use]
    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(health_handler))
            .route("/ws/{client_id}", get(ws_handler))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Bind and serve.
    ///
    /// Returns the bound address and the serve task handle; the task
    /// exits once the shutdown token is cancelled and in-flight
    /// requests have drained.
    pub async fn listen(&self) -> Result<(SocketAddr, JoinHandle<()>)> {
        let listener =
            TcpListener::bind((self.config.host.as_str(), self.config.port))
                .await
                .with_context(|| {
                    format!("failed to bind {}:{}", self.config.host, self.config.port)
                })?;
        let addr = listener.local_addr().context("failed to read local addr")?;
        let router = self.router();
        let token = self.state.shutdown.token();
        let handle = tokio::spawn(async move {
            if let Err(err) = axum::serve(listener, router)
                .with_graceful_shutdown(token.cancelled_owned())
                .await
            {
                error!(error = %err, "server error");
            }
        });
        Ok((addr, handle))
    }

    /// Spawn the session reaper, tied to the shutdown token.
    pub fn spawn_reaper(&self) -> JoinHandle<()> {
        SessionReaper::new(
            Arc::clone(&self.state.store),
            Arc::clone(&self.state.registry),
            self.chat_config.clone(),
        )
        .spawn(self.state.shutdown.token())
    }

    /// Get the shutdown coordinator.
    #[must_use]
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.state.shutdown
    }

    /// Get the message pipeline.
    #[must_use]
    pub fn pipeline(&self) -> &Arc<MessagePipeline> {
        &self.state.pipeline
    }

    /// Get the server configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Get the session store.
    #[must_use]
    pub fn store(&self) -> &Arc<SessionStore> {
        &self.state.store
    }

    /// Get the connection registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.state.registry
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let connections = state.registry.connection_count().await;
    let sessions = state.store.session_count();
    Json(health::health_check(state.start_time, connections, sessions))
}

/// GET /ws/{client_id}, the WebSocket upgrade endpoint.
async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(client_id): Path<String>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let client_id = ClientId::from(client_id);
    ws.on_upgrade(move |socket| run_ws_session(socket, client_id, state))
}
