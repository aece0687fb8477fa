use axum::{
    Router,
    extract::{Query, State, WebSocketUpgrade},
    middleware,
    response::IntoResponse,
    routing::{get, post, put},
};
use serde::Deserialize;

use lockbox_gateway::connection;

use crate::auth::{self, AppState};
use crate::middleware::{crypto_mode_header, require_auth};
use crate::{chat_requests, crypto, health, keys, messages};

/// Assemble every HTTP and WebSocket route over one shared state.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/health", get(health::health))
        .route("/gateway", get(ws_upgrade));

    let protected_routes = Router::new()
        .route("/chat-requests", post(chat_requests::send_request))
        .route("/chat-requests/{request_id}/respond", post(chat_requests::respond))
        .route("/chat-requests/incoming", get(chat_requests::incoming))
        .route("/chat-requests/sent", get(chat_requests::sent))
        .route("/messages", post(messages::send_message).get(messages::list_messages))
        .route(
            "/messages/conversation/{counterpart}",
            get(messages::conversation_with),
        )
        .route(
            "/conversations/{conversation_id}/messages",
            get(messages::conversation_messages),
        )
        .route("/keys/bundle", put(keys::publish_bundle))
        .route("/keys/bundle/{identity}", get(keys::get_bundle))
        .route("/crypto/keypair", post(crypto::generate_keypair))
        .route("/crypto/encapsulate", post(crypto::encapsulate))
        .route("/crypto/decapsulate", post(crypto::decapsulate))
        .route("/crypto/sign", post(crypto::sign))
        .route("/crypto/verify", post(crypto::verify))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(middleware::from_fn_with_state(state.clone(), crypto_mode_header))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct GatewayQuery {
    token: Option<String>,
}

/// Browsers cannot set headers on a WebSocket handshake, so the token may
/// arrive as a query parameter; without one the client must `Identify`.
async fn ws_upgrade(
    State(state): State<AppState>,
    Query(query): Query<GatewayQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let dispatcher = state.dispatcher.clone();
    let jwt_secret = state.jwt_secret.clone();

    let claims = query
        .token
        .as_deref()
        .and_then(|t| connection::decode_token(t, &jwt_secret));

    match claims {
        Some(claims) => ws.on_upgrade(move |socket| {
            connection::handle_connection_authenticated(
                socket,
                dispatcher,
                claims.sub,
                claims.username,
            )
        }),
        None => ws.on_upgrade(move |socket| {
            connection::handle_connection(socket, dispatcher, jwt_secret)
        }),
    }
}
