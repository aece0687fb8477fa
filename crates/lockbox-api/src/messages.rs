use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use lockbox_types::api::{Claims, EnvelopeResponse, SendMessageRequest, SendMessageResponse};

use crate::auth::AppState;
use crate::envelopes::{self, OutgoingEnvelope};
use crate::error::ApiError;
use crate::extract::ApiJson;
use crate::negotiator::Actor;

pub async fn send_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let envelope = envelopes::send(
        &state,
        &Actor::from(&claims),
        OutgoingEnvelope {
            recipient: req.recipient_id,
            ciphertext: req.ciphertext,
            signature: req.signature,
            sender_public_key: req.sender_public_key,
            conversation_id: req.conversation_id,
        },
    )
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(SendMessageResponse {
            message_id: envelope.id,
            conversation_id: envelope.conversation_id,
        }),
    ))
}

pub async fn list_messages(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<EnvelopeResponse>>, ApiError> {
    Ok(Json(envelopes::list(&state, claims.sub).await?))
}

pub async fn conversation_with(
    State(state): State<AppState>,
    Path(counterpart): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<EnvelopeResponse>>, ApiError> {
    Ok(Json(
        envelopes::conversation_with(&state, claims.sub, &counterpart).await?,
    ))
}

pub async fn conversation_messages(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<EnvelopeResponse>>, ApiError> {
    Ok(Json(
        envelopes::in_conversation(&state, claims.sub, conversation_id).await?,
    ))
}
