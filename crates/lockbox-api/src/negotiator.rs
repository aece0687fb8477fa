//! Chat request negotiation.
//!
//! Per ordered pair (from, to): `none -> pending -> {accepted, declined}`.
//! Only the recipient may leave `pending`, and only once; accepting creates
//! exactly one conversation. Notifications are best-effort and never
//! affect the outcome.

use tracing::info;
use uuid::Uuid;

use lockbox_crypto::keys::to_base64;
use lockbox_db::models::{InsertRequestOutcome, RespondOutcome};
use lockbox_db::queries::NewConversation;
use lockbox_types::api::{Claims, IncomingChatRequest, SentChatRequest};
use lockbox_types::events::GatewayEvent;
use lockbox_types::models::{ChatRequest, Conversation, RequestStatus, RespondAction};

use crate::auth::AppState;
use crate::convert::{self, now_timestamp, parse_id, parse_status, parse_timestamp};
use crate::error::ApiError;
use crate::run_blocking;

pub const DEFAULT_REQUEST_MESSAGE: &str = "Hi! I'd like to start a secure conversation with you.";
pub const MAX_REQUEST_MESSAGE_CHARS: usize = 500;

/// The caller acting on the negotiator, taken from verified session claims.
#[derive(Debug, Clone)]
pub struct Actor {
    pub id: Uuid,
    pub username: String,
}

impl From<&Claims> for Actor {
    fn from(claims: &Claims) -> Self {
        Actor {
            id: claims.sub,
            username: claims.username.clone(),
        }
    }
}

#[derive(Debug)]
pub struct Responded {
    pub request: ChatRequest,
    pub conversation: Option<Conversation>,
}

/// Create a pending request from `from` to `to` (an id or username).
pub async fn send(
    state: &AppState,
    from: &Actor,
    to: &str,
    message: Option<String>,
) -> Result<ChatRequest, ApiError> {
    let message = message
        .map(|m| m.trim().to_string())
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| DEFAULT_REQUEST_MESSAGE.to_string());
    if message.chars().count() > MAX_REQUEST_MESSAGE_CHARS {
        return Err(ApiError::validation(format!(
            "message must be at most {} characters",
            MAX_REQUEST_MESSAGE_CHARS
        )));
    }

    let db = state.clone();
    let to = to.to_string();
    let recipient = run_blocking(move || db.db.resolve_user(&to))
        .await?
        .map(convert::identity)
        .ok_or(ApiError::UnknownRecipient)?;
    let to_identity = recipient.id;
    if to_identity == from.id {
        return Err(ApiError::validation("cannot send a chat request to yourself"));
    }

    let request_id = Uuid::new_v4();
    let created_at = now_timestamp();

    let db = state.clone();
    let (from_id, stored_message, ts) = (from.id.to_string(), message.clone(), created_at.clone());
    let outcome = run_blocking(move || {
        db.db.insert_chat_request(
            &request_id.to_string(),
            &from_id,
            &to_identity.to_string(),
            &stored_message,
            &ts,
        )
    })
    .await?;

    if outcome == InsertRequestOutcome::DuplicatePending {
        return Err(ApiError::DuplicateRequest);
    }

    info!("{} ({}) sent chat request {} to {}", from.username, from.id, request_id, to_identity);

    state.dispatcher.notify(
        to_identity,
        GatewayEvent::ChatRequestReceived {
            request_id,
            from_identity: from.id,
            from_username: from.username.clone(),
            message: message.clone(),
        },
    );

    let created_at = parse_timestamp(&created_at, "new chat request");
    Ok(ChatRequest {
        id: request_id,
        from_identity: from.id,
        to_identity,
        message,
        status: RequestStatus::Pending,
        created_at,
        updated_at: created_at,
    })
}

/// Accept or decline a pending request addressed to `responder`.
///
/// Deliberately not idempotent: answering a request that is already
/// terminal fails with `InvalidState`, so a retried or racing accept can
/// never produce a second conversation.
pub async fn respond(
    state: &AppState,
    request_id: Uuid,
    responder: &Actor,
    action: &str,
) -> Result<Responded, ApiError> {
    let action = RespondAction::parse(action).ok_or(ApiError::InvalidAction)?;

    let db = state.clone();
    let request = run_blocking(move || db.db.get_chat_request(&request_id.to_string()))
        .await?
        .map(convert::chat_request)
        .ok_or_else(|| ApiError::not_found("chat request not found"))?;

    if request.to_identity != responder.id {
        return Err(ApiError::forbidden(
            "only the recipient may respond to this chat request",
        ));
    }
    if request.status.is_terminal() {
        return Err(ApiError::InvalidState(request.status));
    }

    let status = action.resulting_status();
    let updated_at = now_timestamp();
    let conversation = (action == RespondAction::Accept).then(|| {
        let (a, b) = Conversation::ordered_pair(request.from_identity, request.to_identity);
        Conversation {
            id: Uuid::new_v4(),
            participant_a: a,
            participant_b: b,
            created_at: parse_timestamp(&updated_at, "new conversation"),
        }
    });

    let db = state.clone();
    let (ts, new_conv) = (updated_at.clone(), conversation.clone());
    let outcome = run_blocking(move || {
        let ids = new_conv.as_ref().map(|c| {
            (
                c.id.to_string(),
                c.participant_a.to_string(),
                c.participant_b.to_string(),
            )
        });
        db.db.respond_chat_request(
            &request_id.to_string(),
            status.as_str(),
            &ts,
            ids.as_ref().map(|(id, a, b)| NewConversation {
                id,
                participant_a: a,
                participant_b: b,
                created_at: &ts,
            }),
        )
    })
    .await?;

    match outcome {
        RespondOutcome::Updated => {}
        RespondOutcome::NotFound => return Err(ApiError::not_found("chat request not found")),
        // Lost a race with another response.
        RespondOutcome::AlreadyTerminal(current) => {
            return Err(ApiError::InvalidState(parse_status(
                &current,
                "racing chat request response",
            )));
        }
    }

    info!(
        "{} ({}) {} chat request {}",
        responder.username,
        responder.id,
        status,
        request_id
    );

    let event = match &conversation {
        Some(conversation) => GatewayEvent::ChatRequestAccepted {
            request_id,
            conversation_id: conversation.id,
            contact_id: responder.id,
            contact_username: responder.username.clone(),
        },
        None => GatewayEvent::ChatRequestDeclined {
            request_id,
            contact_id: responder.id,
            contact_username: responder.username.clone(),
        },
    };
    state.dispatcher.notify(request.from_identity, event);

    Ok(Responded {
        request: ChatRequest {
            status,
            updated_at: parse_timestamp(&updated_at, "responded chat request"),
            ..request
        },
        conversation,
    })
}

/// Pending requests addressed to `identity`, oldest first.
pub async fn incoming(state: &AppState, identity: Uuid) -> Result<Vec<IncomingChatRequest>, ApiError> {
    let db = state.clone();
    let rows = run_blocking(move || db.db.list_incoming_requests(&identity.to_string())).await?;

    Ok(rows
        .into_iter()
        .map(|row| {
            let context = format!("chat request '{}'", row.id);
            IncomingChatRequest {
                id: parse_id(&row.id, "id", &context),
                from_identity: parse_id(&row.from_id, "from_id", &context),
                from_username: row.from_username,
                from_kem_public_key: row.from_kem_public_key.as_deref().map(to_base64),
                message: row.message,
                created_at: parse_timestamp(&row.created_at, &context),
            }
        })
        .collect())
}

/// Every request `identity` has sent, any status.
pub async fn sent(state: &AppState, identity: Uuid) -> Result<Vec<SentChatRequest>, ApiError> {
    let db = state.clone();
    let rows = run_blocking(move || db.db.list_sent_requests(&identity.to_string())).await?;

    Ok(rows
        .into_iter()
        .map(|row| {
            let context = format!("chat request '{}'", row.id);
            SentChatRequest {
                id: parse_id(&row.id, "id", &context),
                to_identity: parse_id(&row.to_id, "to_id", &context),
                to_username: row.to_username,
                message: row.message,
                status: parse_status(&row.status, &context),
                created_at: parse_timestamp(&row.created_at, &context),
            }
        })
        .collect())
}
