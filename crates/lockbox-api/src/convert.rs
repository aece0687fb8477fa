//! Row -> domain/wire conversions. Corrupt values are logged and replaced
//! with defaults rather than failing a whole listing.

use chrono::{DateTime, SecondsFormat, Utc};
use tracing::warn;
use uuid::Uuid;

use lockbox_crypto::keys::to_base64;
use lockbox_db::models::{ChatRequestRow, ConversationRow, EnvelopeRow, KeyBundleRow, UserRow};
use lockbox_types::api::EnvelopeResponse;
use lockbox_types::models::{ChatRequest, Conversation, Identity, KeyBundle, RequestStatus};

/// Current time in the fixed-width RFC 3339 form the database sorts on.
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_timestamp(raw: &str, context: &str) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            // SQLite's datetime('now') format, without timezone.
            chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
                .map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt timestamp '{}' on {}: {}", raw, context, e);
            DateTime::default()
        })
}

pub fn parse_id(raw: &str, what: &str, context: &str) -> Uuid {
    raw.parse().unwrap_or_else(|e| {
        warn!("Corrupt {} '{}' on {}: {}", what, raw, context, e);
        Uuid::default()
    })
}

/// The public view of a user row; the password hash is dropped here.
pub fn identity(row: UserRow) -> Identity {
    let context = format!("identity '{}'", row.username);
    Identity {
        id: parse_id(&row.id, "id", &context),
        username: row.username,
        created_at: parse_timestamp(&row.created_at, &context),
    }
}

pub fn key_bundle(row: KeyBundleRow) -> KeyBundle {
    let context = format!("key bundle '{}'", row.identity_id);
    KeyBundle {
        identity_id: parse_id(&row.identity_id, "identity_id", &context),
        kem_public_key: row.kem_public_key,
        signature_public_key: row.signature_public_key,
        updated_at: parse_timestamp(&row.updated_at, &context),
    }
}

pub fn chat_request(row: ChatRequestRow) -> ChatRequest {
    let context = format!("chat request '{}'", row.id);
    ChatRequest {
        id: parse_id(&row.id, "id", &context),
        from_identity: parse_id(&row.from_id, "from_id", &context),
        to_identity: parse_id(&row.to_id, "to_id", &context),
        message: row.message,
        status: parse_status(&row.status, &context),
        created_at: parse_timestamp(&row.created_at, &context),
        updated_at: parse_timestamp(&row.updated_at, &context),
    }
}

pub fn parse_status(raw: &str, context: &str) -> RequestStatus {
    raw.parse().unwrap_or_else(|e| {
        // The CHECK constraint makes this unreachable short of manual edits;
        // treating it as terminal keeps respond from acting on it.
        warn!("{} on {}", e, context);
        RequestStatus::Declined
    })
}

pub fn conversation(row: ConversationRow) -> Conversation {
    let context = format!("conversation '{}'", row.id);
    Conversation {
        id: parse_id(&row.id, "id", &context),
        participant_a: parse_id(&row.participant_a, "participant_a", &context),
        participant_b: parse_id(&row.participant_b, "participant_b", &context),
        created_at: parse_timestamp(&row.created_at, &context),
    }
}

pub fn envelope(row: EnvelopeRow) -> EnvelopeResponse {
    let context = format!("envelope '{}'", row.id);
    EnvelopeResponse {
        id: parse_id(&row.id, "id", &context),
        conversation_id: parse_id(&row.conversation_id, "conversation_id", &context),
        sender_id: parse_id(&row.sender_id, "sender_id", &context),
        sender_username: row.sender_username,
        recipient_id: parse_id(&row.recipient_id, "recipient_id", &context),
        ciphertext: to_base64(&row.ciphertext),
        signature: to_base64(&row.signature),
        sender_public_key: to_base64(&row.sender_public_key),
        created_at: parse_timestamp(&row.created_at, &context),
    }
}
