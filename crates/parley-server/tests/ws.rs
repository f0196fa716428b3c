//! End-to-end tests using a real WebSocket client.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use parley_agents::{AgentCatalog, SimulatedBackend};
use parley_server::config::{ChatConfig, ServerConfig};
use parley_server::server::RelayServer;
use serde_json::{Value, json};
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

const TIMEOUT: Duration = Duration::from_secs(5);

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Streaming pacing short enough for tests but with the real shape.
fn fast_chat_config() -> ChatConfig {
    ChatConfig {
        chunk_words: 2..=3,
        chunk_delay_ms: 0..=1,
        initial_delay_ms: 0..=1,
        task_delay_ms: 10..=30,
        ..ChatConfig::default()
    }
}

/// Boot a test server on an auto-assigned port; returns the base WS URL.
async fn boot_server(chat: ChatConfig) -> (String, RelayServer) {
    let server = RelayServer::new(
        ServerConfig::default(),
        chat,
        Arc::new(AgentCatalog::builtin()),
        Arc::new(SimulatedBackend),
    );
    let (addr, _handle) = server.listen().await.unwrap();
    (format!("ws://{addr}/ws"), server)
}

async fn connect(base: &str, client_id: &str) -> WsStream {
    let (ws, _) = connect_async(format!("{base}/{client_id}")).await.unwrap();
    ws
}

/// Read the next text frame as JSON.
async fn read_json(ws: &mut WsStream) -> Value {
    loop {
        let msg = timeout(TIMEOUT, ws.next())
            .await
            .expect("timeout waiting for frame")
            .expect("stream closed")
            .expect("ws error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

async fn send_json(ws: &mut WsStream, value: &Value) {
    ws.send(Message::text(value.to_string())).await.unwrap();
}

/// Read frames until one of type `ty` arrives (panics at the timeout).
async fn read_until(ws: &mut WsStream, ty: &str) -> Value {
    loop {
        let frame = read_json(ws).await;
        if frame["type"] == ty {
            return frame;
        }
    }
}

#[tokio::test]
async fn fresh_connect_gets_initial_state_and_empty_topic_list() {
    let (base, _server) = boot_server(fast_chat_config()).await;
    let mut ws = connect(&base, "fresh-1").await;

    let initial = read_json(&mut ws).await;
    assert_eq!(initial["type"], "initial_state");
    assert_eq!(initial["payload"]["client_id"], "fresh-1");
    assert_eq!(initial["payload"]["agents"].as_array().unwrap().len(), 3);
    assert!(initial["payload"]["active_topic_id"].is_null());

    let list = read_json(&mut ws).await;
    assert_eq!(list["type"], "topic_list_update");
    assert_eq!(list["payload"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn ping_gets_pong() {
    let (base, _server) = boot_server(fast_chat_config()).await;
    let mut ws = connect(&base, "pinger").await;
    let _ = read_json(&mut ws).await;
    let _ = read_json(&mut ws).await;

    send_json(&mut ws, &json!({"type": "ping"})).await;
    let frame = read_json(&mut ws).await;
    assert_eq!(frame["type"], "pong");
}

#[tokio::test]
async fn send_message_streams_reply_and_task_result() {
    let (base, _server) = boot_server(fast_chat_config()).await;
    let mut ws = connect(&base, "talker").await;
    let _ = read_json(&mut ws).await;
    let _ = read_json(&mut ws).await;

    send_json(
        &mut ws,
        &json!({
            "type": "send_message",
            "payload": {"content": "hi", "current_agent_id": "agent_001"}
        }),
    )
    .await;

    let list = read_json(&mut ws).await;
    assert_eq!(list["type"], "topic_list_update");
    assert_eq!(list["payload"].as_array().unwrap().len(), 1);
    assert_eq!(list["payload"][0]["name"], "Chat 1");

    let echo = read_json(&mut ws).await;
    assert_eq!(echo["type"], "new_message");
    assert_eq!(echo["payload"]["sender"], "user");
    assert_eq!(echo["payload"]["content"], "hi");

    // Chunks in order, first one flagged, then the stream end.
    let mut assembled = String::new();
    let mut chunk_count = 0;
    let stream_message_id;
    loop {
        let frame = read_json(&mut ws).await;
        match frame["type"].as_str().unwrap() {
            "agent_message_chunk" => {
                assert_eq!(
                    frame["payload"]["is_first_chunk"].as_bool().unwrap(),
                    chunk_count == 0
                );
                assembled.push_str(frame["payload"]["content_chunk"].as_str().unwrap());
                chunk_count += 1;
            }
            "agent_stream_end" => {
                stream_message_id = frame["payload"]["message_id"].clone();
                break;
            }
            other => panic!("unexpected frame during stream: {other}"),
        }
    }
    assert!(chunk_count >= 1);
    assert!(stream_message_id.is_string());
    assert_eq!(assembled.trim_end(), "Okay, I received: 'hi' (from EchoBot)");

    let active = read_json(&mut ws).await;
    assert_eq!(active["type"], "active_topic_update");
    assert!(active["payload"]["topic_id"].is_string());

    let task = read_until(&mut ws, "new_task_result").await;
    assert_eq!(
        task["payload"]["content"],
        "Task 'hi...' completed successfully."
    );
}

#[tokio::test]
async fn duplicate_connection_rejected_prior_survives() {
    let (base, _server) = boot_server(fast_chat_config()).await;
    let mut first = connect(&base, "dup").await;
    let _ = read_json(&mut first).await;
    let _ = read_json(&mut first).await;

    let mut second = connect(&base, "dup").await;
    let msg = timeout(TIMEOUT, second.next())
        .await
        .expect("timeout waiting for close")
        .expect("stream closed")
        .expect("ws error");
    match msg {
        Message::Close(Some(frame)) => {
            assert_eq!(u16::from(frame.code), 1008);
            assert_eq!(frame.reason.as_str(), "Session already active");
        }
        other => panic!("expected close frame, got {other:?}"),
    }

    // The prior connection is untouched.
    send_json(&mut first, &json!({"type": "ping"})).await;
    let frame = read_json(&mut first).await;
    assert_eq!(frame["type"], "pong");
}

#[tokio::test]
async fn reconnect_restores_active_topic_and_history() {
    let (base, server) = boot_server(fast_chat_config()).await;
    let mut ws = connect(&base, "returner").await;
    let _ = read_json(&mut ws).await;
    let _ = read_json(&mut ws).await;

    send_json(
        &mut ws,
        &json!({
            "type": "send_message",
            "payload": {"content": "remember me", "current_agent_id": "agent_002"}
        }),
    )
    .await;
    let active = read_until(&mut ws, "active_topic_update").await;
    let topic_id = active["payload"]["topic_id"].as_str().unwrap().to_owned();
    ws.close(None).await.unwrap();
    let deadline = tokio::time::Instant::now() + TIMEOUT;
    while server.registry().connection_count().await != 0 {
        assert!(
            tokio::time::Instant::now() < deadline,
            "old connection was never deregistered"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let mut ws = connect(&base, "returner").await;
    let initial = read_json(&mut ws).await;
    assert_eq!(initial["type"], "initial_state");
    assert_eq!(initial["payload"]["active_topic_id"], topic_id.as_str());

    let list = read_json(&mut ws).await;
    assert_eq!(list["type"], "topic_list_update");
    assert_eq!(list["payload"].as_array().unwrap().len(), 1);

    let state = read_json(&mut ws).await;
    assert_eq!(state["type"], "topic_state");
    assert_eq!(state["payload"]["topic_id"], topic_id.as_str());
    assert_eq!(state["payload"]["agent_id"], "agent_002");
    let messages = state["payload"]["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["sender"], "user");
    assert_eq!(messages[1]["sender"], "agent");
}

#[tokio::test]
async fn malformed_frame_reported_and_loop_survives() {
    let (base, _server) = boot_server(fast_chat_config()).await;
    let mut ws = connect(&base, "mangler").await;
    let _ = read_json(&mut ws).await;
    let _ = read_json(&mut ws).await;

    ws.send(Message::text("this is not json")).await.unwrap();
    let err = read_json(&mut ws).await;
    assert_eq!(err["type"], "error");
    assert_eq!(err["payload"]["detail"], "Malformed frame.");

    ws.send(Message::text(r#"{"type": "mystery", "payload": {}}"#))
        .await
        .unwrap();
    let err = read_json(&mut ws).await;
    assert_eq!(err["type"], "error");

    send_json(&mut ws, &json!({"type": "ping"})).await;
    let frame = read_json(&mut ws).await;
    assert_eq!(frame["type"], "pong");
}

#[tokio::test]
async fn foreign_topic_rejected_with_error_frame() {
    let (base, _server) = boot_server(fast_chat_config()).await;

    let mut alice = connect(&base, "alice").await;
    let _ = read_json(&mut alice).await;
    let _ = read_json(&mut alice).await;
    send_json(
        &mut alice,
        &json!({
            "type": "send_message",
            "payload": {"content": "mine", "current_agent_id": "agent_001"}
        }),
    )
    .await;
    let active = read_until(&mut alice, "active_topic_update").await;
    let topic_id = active["payload"]["topic_id"].as_str().unwrap().to_owned();

    let mut bob = connect(&base, "bob").await;
    let _ = read_json(&mut bob).await;
    let _ = read_json(&mut bob).await;
    send_json(
        &mut bob,
        &json!({
            "type": "send_message",
            "payload": {
                "content": "not mine",
                "current_agent_id": "agent_001",
                "topic_id": topic_id,
            }
        }),
    )
    .await;
    let err = read_json(&mut bob).await;
    assert_eq!(err["type"], "error");
    assert_eq!(err["payload"]["detail"], "Access denied to this chat topic.");
}

#[tokio::test]
async fn select_topic_resends_history() {
    let (base, _server) = boot_server(fast_chat_config()).await;
    let mut ws = connect(&base, "selector").await;
    let _ = read_json(&mut ws).await;
    let _ = read_json(&mut ws).await;

    send_json(
        &mut ws,
        &json!({
            "type": "send_message",
            "payload": {"content": "first", "current_agent_id": "agent_001"}
        }),
    )
    .await;
    let active = read_until(&mut ws, "active_topic_update").await;
    let topic_id = active["payload"]["topic_id"].as_str().unwrap().to_owned();
    let _ = read_until(&mut ws, "new_task_result").await;

    send_json(
        &mut ws,
        &json!({"type": "select_topic", "payload": {"topic_id": topic_id}}),
    )
    .await;
    let state = read_json(&mut ws).await;
    assert_eq!(state["type"], "topic_state");
    assert_eq!(state["payload"]["topic_id"], topic_id.as_str());
    assert_eq!(state["payload"]["messages"].as_array().unwrap().len(), 2);
    assert_eq!(state["payload"]["task_results"].as_array().unwrap().len(), 1);

    let active = read_json(&mut ws).await;
    assert_eq!(active["type"], "active_topic_update");
    assert_eq!(active["payload"]["topic_id"], topic_id.as_str());
}

#[tokio::test]
async fn agent_switch_creates_new_topic_over_the_wire() {
    let (base, _server) = boot_server(fast_chat_config()).await;
    let mut ws = connect(&base, "switcher").await;
    let _ = read_json(&mut ws).await;
    let _ = read_json(&mut ws).await;

    send_json(
        &mut ws,
        &json!({
            "type": "send_message",
            "payload": {"content": "one", "current_agent_id": "agent_001"}
        }),
    )
    .await;
    let active = read_until(&mut ws, "active_topic_update").await;
    let first_topic = active["payload"]["topic_id"].as_str().unwrap().to_owned();

    send_json(
        &mut ws,
        &json!({
            "type": "send_message",
            "payload": {
                "content": "two",
                "current_agent_id": "agent_003",
                "topic_id": first_topic,
            }
        }),
    )
    .await;
    let list = read_until(&mut ws, "topic_list_update").await;
    assert_eq!(list["payload"].as_array().unwrap().len(), 2);

    let active = read_until(&mut ws, "active_topic_update").await;
    let second_topic = active["payload"]["topic_id"].as_str().unwrap().to_owned();
    assert_ne!(second_topic, first_topic);
}

#[tokio::test]
async fn reaper_times_out_idle_connection() {
    let chat = ChatConfig {
        session_timeout: Duration::from_millis(150),
        reaper_interval: Duration::from_millis(50),
        ..fast_chat_config()
    };
    let (base, server) = boot_server(chat).await;
    let _reaper = server.spawn_reaper();

    let mut ws = connect(&base, "sleeper").await;
    let _ = read_json(&mut ws).await;
    let _ = read_json(&mut ws).await;

    // Stay silent until the reaper evicts the session.
    let deadline = tokio::time::Instant::now() + TIMEOUT;
    loop {
        let msg = timeout(deadline - tokio::time::Instant::now(), ws.next())
            .await
            .expect("timeout waiting for reaper close")
            .expect("stream closed without close frame");
        match msg {
            Ok(Message::Close(Some(frame))) => {
                assert_eq!(u16::from(frame.code), 1000);
                assert_eq!(frame.reason.as_str(), "Session timed out");
                break;
            }
            Ok(_) => {}
            Err(_) => break,
        }
    }
    assert_eq!(server.store().session_count(), 0);
}
