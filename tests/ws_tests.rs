//! WebSocket transport tests against a live server: greeting, command
//! parsing, room fan-out, and disconnect notices.

use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};

mod common;
use common::spawn_test_server;

type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn connect(addr: SocketAddr, token: &str) -> WsClient {
    let url = format!("ws://{addr}/chat/ws?token={token}");
    let (ws, _) = connect_async(url).await.expect("websocket connect");
    ws
}

async fn send_json(ws: &mut WsClient, payload: Value) {
    ws.send(Message::Text(payload.to_string().into()))
        .await
        .expect("send frame");
}

/// Next server event, skipping keepalive pings.
async fn next_event(ws: &mut WsClient) -> Value {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(10), ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("stream ended")
            .expect("websocket error");
        let Message::Text(text) = frame else { continue };
        let event: Value = serde_json::from_str(&text).unwrap();
        if event["type"] == "ping" {
            continue;
        }
        return event;
    }
}

#[tokio::test]
async fn connection_greets_then_rejects_garbage() {
    let (addr, tokens) = spawn_test_server(&["alice@example.com"]).await;
    let mut ws = connect(addr, &tokens[0]).await;

    let event = next_event(&mut ws).await;
    assert_eq!(event["type"], "connected");

    ws.send(Message::Text("not a command".into()))
        .await
        .unwrap();
    let event = next_event(&mut ws).await;
    assert_eq!(event["type"], "error");
    assert_eq!(event["message"], "unrecognized command");
}

#[tokio::test]
async fn connection_rejects_bad_token() {
    let (addr, _) = spawn_test_server(&[]).await;
    let url = format!("ws://{addr}/chat/ws?token=not-a-jwt");
    assert!(connect_async(url).await.is_err());
}

#[tokio::test]
async fn join_and_send_fan_out_between_connections() {
    let (addr, tokens) = spawn_test_server(&["alice@example.com", "bob@example.com"]).await;
    let mut alice = connect(addr, &tokens[0]).await;
    let mut bob = connect(addr, &tokens[1]).await;

    assert_eq!(next_event(&mut alice).await["type"], "connected");
    assert_eq!(next_event(&mut bob).await["type"], "connected");

    send_json(&mut alice, json!({"type": "join", "room": "general"})).await;
    let event = next_event(&mut alice).await;
    assert_eq!(event["type"], "presence");
    assert_eq!(event["users"].as_array().unwrap().len(), 1);

    // bob never sees his own join notice, only the snapshot
    send_json(&mut bob, json!({"type": "join", "room": "general"})).await;
    let event = next_event(&mut bob).await;
    assert_eq!(event["type"], "presence");
    assert_eq!(event["users"].as_array().unwrap().len(), 2);

    // alice sees bob's notice before the updated snapshot
    let event = next_event(&mut alice).await;
    assert_eq!(event["type"], "message");
    assert_eq!(event["message"]["kind"], "system");
    assert!(
        event["message"]["text"]
            .as_str()
            .unwrap()
            .contains("joined")
    );
    let event = next_event(&mut alice).await;
    assert_eq!(event["type"], "presence");
    assert_eq!(event["users"].as_array().unwrap().len(), 2);

    send_json(
        &mut alice,
        json!({"type": "send", "room": "general", "text": "hello"}),
    )
    .await;
    for ws in [&mut alice, &mut bob] {
        let event = next_event(ws).await;
        assert_eq!(event["type"], "message");
        assert_eq!(event["message"]["kind"], "user");
        assert_eq!(event["message"]["text"], "hello");
        assert_eq!(event["message"]["sender"]["handle"], "alice@example.com");
    }
}

#[tokio::test]
async fn closing_a_connection_notifies_the_room() {
    let (addr, tokens) = spawn_test_server(&["alice@example.com", "bob@example.com"]).await;
    let mut alice = connect(addr, &tokens[0]).await;
    let mut bob = connect(addr, &tokens[1]).await;

    assert_eq!(next_event(&mut alice).await["type"], "connected");
    assert_eq!(next_event(&mut bob).await["type"], "connected");

    send_json(&mut alice, json!({"type": "join", "room": "general"})).await;
    assert_eq!(next_event(&mut alice).await["type"], "presence");
    send_json(&mut bob, json!({"type": "join", "room": "general"})).await;
    assert_eq!(next_event(&mut bob).await["type"], "presence");
    // bob's join notice plus snapshot
    assert_eq!(next_event(&mut alice).await["type"], "message");
    assert_eq!(next_event(&mut alice).await["type"], "presence");

    bob.close(None).await.unwrap();

    let event = next_event(&mut alice).await;
    assert_eq!(event["type"], "message");
    assert_eq!(event["message"]["kind"], "system");
    assert!(event["message"]["text"].as_str().unwrap().contains("left"));
    let event = next_event(&mut alice).await;
    assert_eq!(event["type"], "presence");
    assert_eq!(event["users"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn invalid_send_returns_error_to_sender_only() {
    let (addr, tokens) = spawn_test_server(&["alice@example.com"]).await;
    let mut ws = connect(addr, &tokens[0]).await;
    assert_eq!(next_event(&mut ws).await["type"], "connected");

    send_json(&mut ws, json!({"type": "send", "room": "general", "text": ""})).await;
    let event = next_event(&mut ws).await;
    assert_eq!(event["type"], "error");
}
