use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use jsonwebtoken::{DecodingKey, Validation, decode};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use lockbox_types::api::Claims;
use lockbox_types::events::{GatewayCommand, GatewayEvent};

use crate::dispatcher::{ConnectionHandle, Dispatcher};

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// How long an unauthenticated socket may take to send `Identify`.
const IDENTIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// Validate a session token and return its claims.
pub fn decode_token(token: &str, jwt_secret: &str) -> Option<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .ok()
    .map(|data| data.claims)
}

/// Handle a WebSocket whose token was already validated at the HTTP upgrade.
pub async fn handle_connection_authenticated(
    socket: WebSocket,
    dispatcher: Dispatcher,
    identity_id: Uuid,
    username: String,
) {
    let (sender, receiver) = socket.split();
    info!("{} ({}) connected to gateway (pre-authenticated)", username, identity_id);
    run_connection_loop(sender, receiver, dispatcher, identity_id, username).await;
}

/// Handle a WebSocket that must authenticate with an `Identify` command first.
pub async fn handle_connection(socket: WebSocket, dispatcher: Dispatcher, jwt_secret: String) {
    let (sender, mut receiver) = socket.split();

    let Some(claims) = wait_for_identify(&mut receiver, &jwt_secret).await else {
        warn!("WebSocket client failed to identify, closing");
        return;
    };

    info!("{} ({}) connected to gateway", claims.username, claims.sub);
    run_connection_loop(sender, receiver, dispatcher, claims.sub, claims.username).await;
}

async fn send_event(sender: &mut SplitSink<WebSocket, Message>, event: &GatewayEvent) -> bool {
    let text = match serde_json::to_string(event) {
        Ok(text) => text,
        Err(e) => {
            warn!("Failed to serialize {} event: {}", event.kind(), e);
            return true;
        }
    };
    sender.send(Message::Text(text.into())).await.is_ok()
}

async fn run_connection_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut receiver: SplitStream<WebSocket>,
    dispatcher: Dispatcher,
    identity_id: Uuid,
    username: String,
) {
    let ready = GatewayEvent::Ready {
        identity_id,
        username: username.clone(),
    };
    if !send_event(&mut sender, &ready).await {
        return;
    }

    // The registry owns the only sender for `events`; eviction closes it
    // and ends this connection.
    let (handle, mut events) = ConnectionHandle::new();
    let conn_id = handle.id();
    dispatcher.connect(identity_id, handle).await;

    // Replies generated by this connection itself (application-level Pong).
    let (reply_tx, mut replies) = mpsc::channel::<GatewayEvent>(8);

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                event = events.recv() => {
                    let Some(event) = event else {
                        debug!("Connection handle closed by registry");
                        break;
                    };
                    if !send_event(&mut sender, &event).await {
                        break;
                    }
                }
                reply = replies.recv() => {
                    let Some(reply) = reply else { break };
                    if !send_event(&mut sender, &reply).await {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    let username_recv = username.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                    Ok(GatewayCommand::Ping) => {
                        pong_flag_recv.store(true, Ordering::Release);
                        if reply_tx.send(GatewayEvent::Pong).await.is_err() {
                            break;
                        }
                    }
                    Ok(GatewayCommand::Identify { .. }) => {} // Already authenticated
                    Err(e) => {
                        // Frames may carry tokens; only the parse error is logged.
                        warn!("{} ({}) bad command: {}", username_recv, identity_id, e);
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    dispatcher.disconnect(identity_id, conn_id).await;
    info!("{} ({}) disconnected from gateway", username, identity_id);
}

async fn wait_for_identify(
    receiver: &mut SplitStream<WebSocket>,
    jwt_secret: &str,
) -> Option<Claims> {
    let identify = async {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Text(text) = msg {
                if let Ok(GatewayCommand::Identify { token }) =
                    serde_json::from_str::<GatewayCommand>(&text)
                {
                    return decode_token(&token, jwt_secret);
                }
            }
        }
        None
    };

    tokio::time::timeout(IDENTIFY_TIMEOUT, identify)
        .await
        .ok()
        .flatten()
}
