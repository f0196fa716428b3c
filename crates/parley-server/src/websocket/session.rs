//! Per-connection protocol state machine, from upgrade to disconnect.
//!
//! Connecting: register the handle, rejecting a duplicate client ID.
//! Syncing: resolve the session and push `initial_state`, the topic
//! list, and the active topic's history. Looping: decode one frame at
//! a time and dispatch it; malformed or failing frames never tear the
//! connection down. Closing: deregister exactly once, whichever path
//! led here.

use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, Utf8Bytes, WebSocket};
use futures::{SinkExt, StreamExt};
use parley_core::frames::{ClientFrame, ServerFrame};
use parley_core::ids::ClientId;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use crate::server::AppState;
use crate::websocket::connection::{ClientConnection, Outbound};

/// Close code for a rejected duplicate connection.
pub const DUPLICATE_CLOSE_CODE: u16 = 1008;
/// Close reason for a rejected duplicate connection.
pub const DUPLICATE_CLOSE_REASON: &str = "Session already active";

/// Run the session for one connected client.
#[instrument(skip_all, fields(client_id = %client_id))]
pub async fn run_ws_session(mut ws: WebSocket, client_id: ClientId, state: AppState) {
    let (tx, rx) = mpsc::channel::<Outbound>(state.outbound_queue);
    let connection = Arc::new(ClientConnection::new(client_id.clone(), tx));

    // Connecting: the registry enforces one live handle per client. A
    // duplicate closes the *new* socket; the prior connection is
    // untouched, so this path must not deregister anything.
    if !state.registry.register(Arc::clone(&connection)).await {
        let _ = ws
            .send(Message::Close(Some(CloseFrame {
                code: DUPLICATE_CLOSE_CODE,
                reason: Utf8Bytes::from_static(DUPLICATE_CLOSE_REASON),
            })))
            .await;
        return;
    }
    info!("client connected");

    let (mut ws_tx, mut ws_rx) = ws.split();

    // Outbound forwarder: serializes queued frames onto the socket. A
    // queued close is forwarded and ends the writer.
    let outbound = tokio::spawn(async move {
        let mut rx = rx;
        while let Some(out) = rx.recv().await {
            match out {
                Outbound::Frame(frame) => match serde_json::to_string(&frame) {
                    Ok(json) => {
                        if ws_tx.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(err) => warn!(error = %err, "failed to serialize outbound frame"),
                },
                Outbound::Close { code, reason } => {
                    let _ = ws_tx
                        .send(Message::Close(Some(CloseFrame {
                            code,
                            reason: Utf8Bytes::from_static(reason),
                        })))
                        .await;
                    break;
                }
            }
        }
    });

    // Syncing: resolve the session, then push the initial snapshot.
    let active_topic_id = state.store.handle_connect(&client_id);
    info!(active_topic_id = ?active_topic_id.as_ref().map(ToString::to_string), "sending initial state");
    let _ = connection.send(ServerFrame::InitialState {
        client_id: client_id.clone(),
        agents: state.catalog.list().to_vec(),
        active_topic_id: active_topic_id.clone(),
    });
    state.pipeline.send_topic_list(&client_id).await;
    if let Some(ref topic_id) = active_topic_id {
        if let Err(err) = state.pipeline.send_topic_state(&client_id, topic_id).await {
            warn!(%topic_id, error = %err, "could not send initial topic state");
        }
    }

    // Looping: one frame at a time, in arrival order.
    while let Some(Ok(msg)) = ws_rx.next().await {
        let text = match msg {
            Message::Text(ref t) => t.to_string(),
            Message::Binary(ref data) => match std::str::from_utf8(data) {
                Ok(s) => s.to_string(),
                Err(_) => {
                    warn!(len = data.len(), "ignoring non-UTF8 binary frame");
                    continue;
                }
            },
            Message::Close(_) => {
                info!("client sent close frame");
                break;
            }
            Message::Ping(_) | Message::Pong(_) => continue,
        };

        let frame = match serde_json::from_str::<ClientFrame>(&text) {
            Ok(frame) => frame,
            Err(err) => {
                warn!(error = %err, "malformed frame");
                let _ = connection.send(ServerFrame::error("Malformed frame."));
                continue;
            }
        };

        debug!(frame = frame.kind(), "dispatching frame");
        match frame {
            ClientFrame::SendMessage {
                content,
                current_agent_id,
                topic_id,
            } => {
                state
                    .pipeline
                    .handle_send_message(&client_id, &content, &current_agent_id, topic_id)
                    .await;
            }
            ClientFrame::SelectTopic { topic_id } => {
                state.pipeline.handle_select_topic(&client_id, &topic_id).await;
            }
            ClientFrame::Ping => {
                state.store.touch(&client_id);
                let _ = connection.send(ServerFrame::Pong);
            }
        }
    }

    // Closing: deregister exactly once. The identity guard makes this a
    // no-op when the registry already holds a newer handle or the
    // reaper removed this one.
    info!("client disconnected");
    state.registry.deregister(&connection).await;
    outbound.abort();
}
