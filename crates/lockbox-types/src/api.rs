use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::RequestStatus;

// -- JWT Claims --

/// JWT claims shared across lockbox-api (REST middleware) and lockbox-gateway
/// (WebSocket authentication).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub identity_id: Uuid,
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub identity_id: Uuid,
    pub username: String,
    pub token: String,
}

// -- Chat requests --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendChatRequestRequest {
    /// Recipient identity id or username.
    pub recipient: String,
    pub message: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SendChatRequestResponse {
    pub request_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RespondChatRequestRequest {
    /// Kept as a string so unknown actions surface as `invalid_action`
    /// rather than a deserialization rejection.
    pub action: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RespondChatRequestResponse {
    pub request_id: Uuid,
    pub status: RequestStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<Uuid>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IncomingChatRequest {
    pub id: Uuid,
    pub from_identity: Uuid,
    pub from_username: String,
    /// Sender's published KEM public key (base64), if any.
    pub from_kem_public_key: Option<String>,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SentChatRequest {
    pub id: Uuid,
    pub to_identity: Uuid,
    pub to_username: String,
    pub message: String,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
}

// -- Messages --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub recipient_id: String,
    pub ciphertext: String,
    pub signature: String,
    pub sender_public_key: String,
    pub conversation_id: Option<Uuid>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SendMessageResponse {
    pub message_id: Uuid,
    pub conversation_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvelopeResponse {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub sender_username: String,
    pub recipient_id: Uuid,
    pub ciphertext: String,
    pub signature: String,
    pub sender_public_key: String,
    pub created_at: DateTime<Utc>,
}

// -- Keys --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PublishKeyBundleRequest {
    pub kem_public_key: String,
    pub signature_public_key: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct KeyBundleResponse {
    pub identity_id: Uuid,
    pub username: String,
    pub kem_public_key: String,
    pub signature_public_key: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyKind {
    Kem,
    Signature,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GenerateKeypairRequest {
    pub kind: KeyKind,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct KeypairResponse {
    pub kind: KeyKind,
    pub algorithm: String,
    pub public_key: String,
    pub private_key: String,
    pub degraded: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EncapsulateRequest {
    pub public_key: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EncapsulateResponse {
    pub ciphertext: String,
    pub shared_secret: String,
    pub degraded: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DecapsulateRequest {
    pub ciphertext: String,
    pub private_key: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DecapsulateResponse {
    pub shared_secret: String,
    pub degraded: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SignRequest {
    /// Message bytes, base64.
    pub message: String,
    pub private_key: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SignResponse {
    pub signature: String,
    pub degraded: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VerifyRequest {
    pub message: String,
    pub signature: String,
    pub public_key: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VerifyResponse {
    pub valid: bool,
    pub degraded: bool,
}

// -- Operational --

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub crypto_mode: String,
    pub degraded: bool,
    pub kem: String,
    pub signature: String,
}

/// Body of every error response: a stable machine-readable kind plus a
/// message that is safe to show to the caller.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}
