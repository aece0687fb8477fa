use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use lockbox_types::api::{
    Claims, IncomingChatRequest, RespondChatRequestRequest, RespondChatRequestResponse,
    SendChatRequestRequest, SendChatRequestResponse, SentChatRequest,
};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::extract::ApiJson;
use crate::negotiator::{self, Actor};

pub async fn send_request(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<SendChatRequestRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let request = negotiator::send(&state, &Actor::from(&claims), &req.recipient, req.message).await?;

    Ok((
        StatusCode::CREATED,
        Json(SendChatRequestResponse {
            request_id: request.id,
        }),
    ))
}

pub async fn respond(
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<RespondChatRequestRequest>,
) -> Result<Json<RespondChatRequestResponse>, ApiError> {
    let responded =
        negotiator::respond(&state, request_id, &Actor::from(&claims), &req.action).await?;

    Ok(Json(RespondChatRequestResponse {
        request_id: responded.request.id,
        status: responded.request.status,
        conversation_id: responded.conversation.map(|c| c.id),
    }))
}

pub async fn incoming(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<IncomingChatRequest>>, ApiError> {
    Ok(Json(negotiator::incoming(&state, claims.sub).await?))
}

pub async fn sent(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<SentChatRequest>>, ApiError> {
    Ok(Json(negotiator::sent(&state, claims.sub).await?))
}
