use std::net::SocketAddr;
use std::time::Duration;

use axum::http::{Method, StatusCode};
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use uuid::Uuid;

use lockbox_api::envelopes::ConversationPolicy;

mod common;
use common::TestApp;

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn serve(app: &TestApp) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = app.router.clone();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

async fn connect(addr: SocketAddr, token: Option<&str>) -> Client {
    let url = match token {
        Some(token) => format!("ws://{}/gateway?token={}", addr, token),
        None => format!("ws://{}/gateway", addr),
    };
    let (ws, _) = connect_async(url).await.unwrap();
    ws
}

async fn identify(ws: &mut Client, token: &str) {
    let frame = json!({ "type": "Identify", "data": { "token": token } });
    ws.send(Message::text(frame.to_string())).await.unwrap();
}

/// Next JSON event, skipping control frames.
async fn next_event(ws: &mut Client) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("no frame within 2s")
            .expect("stream ended")
            .expect("websocket error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

/// True once the server has hung up without sending another event.
async fn closed_by_server(ws: &mut Client) -> bool {
    loop {
        match tokio::time::timeout(Duration::from_secs(2), ws.next()).await {
            Err(_) => return false,
            Ok(None) | Ok(Some(Err(_))) | Ok(Some(Ok(Message::Close(_)))) => return true,
            Ok(Some(Ok(Message::Text(_)))) => return false,
            Ok(Some(Ok(_))) => continue,
        }
    }
}

async fn wait_for_connections(app: &TestApp, identity: Uuid, expected: usize) {
    for _ in 0..100 {
        if app.state.dispatcher.connection_count(identity).await == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!(
        "{} never reached {} connection(s), has {}",
        identity,
        expected,
        app.state.dispatcher.connection_count(identity).await
    );
}

#[tokio::test]
async fn both_handshakes_get_ready_and_share_fan_out() {
    let app = TestApp::new(ConversationPolicy::Open);
    let addr = serve(&app).await;
    let alice = app.register("alice").await;
    let bob = app.register("bob").await;

    // Phone authenticates in the query string, laptop with Identify.
    let mut phone = connect(addr, Some(&alice.token)).await;
    let mut laptop = connect(addr, None).await;
    identify(&mut laptop, &alice.token).await;

    for ws in [&mut phone, &mut laptop] {
        let ready = next_event(ws).await;
        assert_eq!(ready["type"], "Ready");
        assert_eq!(ready["data"]["identity_id"], alice.id.to_string());
        assert_eq!(ready["data"]["username"], "alice");
    }
    wait_for_connections(&app, alice.id, 2).await;

    let (status, _) = app
        .call(
            Method::POST,
            "/chat-requests",
            Some(&bob.token),
            Some(json!({ "recipient": "alice", "message": "hello" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    for ws in [&mut phone, &mut laptop] {
        let event = next_event(ws).await;
        assert_eq!(event["type"], "ChatRequestReceived");
        assert_eq!(event["data"]["from_username"], "bob");
        assert_eq!(event["data"]["message"], "hello");
    }

    phone
        .send(Message::text(json!({ "type": "Ping" }).to_string()))
        .await
        .unwrap();
    assert_eq!(next_event(&mut phone).await["type"], "Pong");

    phone.close(None).await.unwrap();
    wait_for_connections(&app, alice.id, 1).await;
    laptop.close(None).await.unwrap();
    wait_for_connections(&app, alice.id, 0).await;
    assert!(!app.state.dispatcher.is_online(alice.id).await);
}

#[tokio::test]
async fn bad_query_token_falls_back_to_identify() {
    let app = TestApp::new(ConversationPolicy::Open);
    let addr = serve(&app).await;
    let alice = app.register("alice").await;

    let mut ws = connect(addr, Some("not-a-token")).await;
    identify(&mut ws, &alice.token).await;

    assert_eq!(next_event(&mut ws).await["type"], "Ready");
    wait_for_connections(&app, alice.id, 1).await;
}

#[tokio::test]
async fn failed_identify_is_dropped_without_registering() {
    let app = TestApp::new(ConversationPolicy::Open);
    let addr = serve(&app).await;
    let alice = app.register("alice").await;

    let mut ws = connect(addr, None).await;
    identify(&mut ws, "forged.token.value").await;

    assert!(closed_by_server(&mut ws).await);
    assert!(!app.state.dispatcher.is_online(alice.id).await);
}

#[tokio::test]
async fn dropped_socket_is_disconnected_from_the_registry() {
    let app = TestApp::new(ConversationPolicy::Open);
    let addr = serve(&app).await;
    let alice = app.register("alice").await;

    let mut ws = connect(addr, Some(&alice.token)).await;
    assert_eq!(next_event(&mut ws).await["type"], "Ready");
    wait_for_connections(&app, alice.id, 1).await;

    // No close handshake, just a vanished client.
    drop(ws);
    wait_for_connections(&app, alice.id, 0).await;
}
