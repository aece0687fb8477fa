//! Fixtures shared by the service tests.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use uuid::Uuid;

use lockbox_crypto::KeyMaterialService;
use lockbox_db::Database;
use lockbox_db::models::CreateUserOutcome;
use lockbox_gateway::dispatcher::Dispatcher;
use lockbox_types::events::GatewayEvent;

use crate::auth::{AppState, AppStateInner};
use crate::convert::now_timestamp;
use crate::envelopes::ConversationPolicy;
use crate::negotiator::Actor;

pub fn state(policy: ConversationPolicy) -> AppState {
    Arc::new(AppStateInner {
        db: Database::open_in_memory().unwrap(),
        jwt_secret: "test-secret".into(),
        dispatcher: Dispatcher::with_push_timeout(Duration::from_millis(100)),
        crypto: KeyMaterialService::simulated(),
        conversation_policy: policy,
    })
}

pub fn identity(state: &AppState, username: &str) -> Actor {
    let id = Uuid::new_v4();
    let outcome = state
        .db
        .create_user(&id.to_string(), username, "not-a-real-hash", &now_timestamp())
        .unwrap();
    assert_eq!(outcome, CreateUserOutcome::Created);
    Actor {
        id,
        username: username.to_string(),
    }
}

/// Wait for the next event on a registered handle.
pub async fn next_event(rx: &mut mpsc::Receiver<GatewayEvent>) -> GatewayEvent {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("no event within 2s")
        .expect("handle closed")
}
