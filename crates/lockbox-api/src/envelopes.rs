//! Message envelope store.
//!
//! A blind relay: envelopes are persisted exactly as the sender supplied
//! them, never decrypted or verified. Persistence is the durability
//! contract; the realtime push that follows is an optimisation whose
//! failure is never reported to the sender.

use std::str::FromStr;

use tracing::{debug, info};
use uuid::Uuid;

use lockbox_crypto::keys::{from_base64, to_base64};
use lockbox_db::queries::NewEnvelope;
use lockbox_types::api::EnvelopeResponse;
use lockbox_types::events::GatewayEvent;
use lockbox_types::models::{Conversation, MessageEnvelope};

use crate::auth::AppState;
use crate::convert::{self, now_timestamp, parse_timestamp};
use crate::error::ApiError;
use crate::negotiator::Actor;
use crate::run_blocking;

/// Upper bound on a single ciphertext blob.
pub const MAX_CIPHERTEXT_BYTES: usize = 1024 * 1024;
/// Upper bound on the signature and public key snapshot fields.
pub const MAX_ATTACHMENT_BYTES: usize = 16 * 1024;

/// Whether `send` checks that a conversation id belongs to the two parties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConversationPolicy {
    /// Accept any caller-supplied id and mint one when omitted.
    #[default]
    Open,
    /// Require an accepted conversation between exactly sender and recipient.
    Strict,
}

impl FromStr for ConversationPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "false" | "0" | "open" => Ok(Self::Open),
            "true" | "1" | "strict" => Ok(Self::Strict),
            other => Err(format!("invalid conversation policy '{}'", other)),
        }
    }
}

/// A message as submitted by its sender, fields still base64.
#[derive(Debug)]
pub struct OutgoingEnvelope {
    pub recipient: String,
    pub ciphertext: String,
    pub signature: String,
    pub sender_public_key: String,
    pub conversation_id: Option<Uuid>,
}

fn decode_field(what: &'static str, encoded: &str, max: usize) -> Result<Vec<u8>, ApiError> {
    let bytes = from_base64(what, encoded)?;
    if bytes.is_empty() {
        return Err(ApiError::validation(format!("{} must not be empty", what)));
    }
    if bytes.len() > max {
        return Err(ApiError::validation(format!(
            "{} must be at most {} bytes",
            what, max
        )));
    }
    Ok(bytes)
}

pub async fn send(
    state: &AppState,
    sender: &Actor,
    outgoing: OutgoingEnvelope,
) -> Result<MessageEnvelope, ApiError> {
    // Malformed input is rejected before anything is looked up or stored.
    let ciphertext = decode_field("ciphertext", &outgoing.ciphertext, MAX_CIPHERTEXT_BYTES)?;
    let signature = decode_field("signature", &outgoing.signature, MAX_ATTACHMENT_BYTES)?;
    let sender_public_key = decode_field(
        "sender_public_key",
        &outgoing.sender_public_key,
        MAX_ATTACHMENT_BYTES,
    )?;

    let db = state.clone();
    let recipient_ref = outgoing.recipient.clone();
    let recipient_id = run_blocking(move || db.db.resolve_user(&recipient_ref))
        .await?
        .map(|row| convert::identity(row).id)
        .ok_or(ApiError::UnknownRecipient)?;

    let conversation_id =
        resolve_conversation(state, sender.id, recipient_id, outgoing.conversation_id).await?;

    let created_at = now_timestamp();
    let envelope = MessageEnvelope {
        id: Uuid::new_v4(),
        conversation_id,
        sender_id: sender.id,
        recipient_id,
        ciphertext,
        signature,
        sender_public_key,
        created_at: parse_timestamp(&created_at, "new envelope"),
    };

    let db = state.clone();
    let stored = envelope.clone();
    let ts = created_at;
    run_blocking(move || {
        db.db.insert_envelope(&NewEnvelope {
            id: &stored.id.to_string(),
            conversation_id: &stored.conversation_id.to_string(),
            sender_id: &stored.sender_id.to_string(),
            recipient_id: &stored.recipient_id.to_string(),
            ciphertext: &stored.ciphertext,
            signature: &stored.signature,
            sender_public_key: &stored.sender_public_key,
            created_at: &ts,
        })
    })
    .await?;

    info!(
        "Envelope {} stored: {} -> {} in conversation {}",
        envelope.id, sender.id, recipient_id, conversation_id
    );

    // Best-effort only: an offline or dead recipient changes nothing here.
    state.dispatcher.notify(
        recipient_id,
        GatewayEvent::MessageCreate {
            id: envelope.id,
            conversation_id,
            sender_id: sender.id,
            sender_username: sender.username.clone(),
            recipient_id,
            ciphertext: to_base64(&envelope.ciphertext),
            signature: to_base64(&envelope.signature),
            sender_public_key: to_base64(&envelope.sender_public_key),
            timestamp: envelope.created_at,
        },
    );

    Ok(envelope)
}

async fn resolve_conversation(
    state: &AppState,
    sender: Uuid,
    recipient: Uuid,
    requested: Option<Uuid>,
) -> Result<Uuid, ApiError> {
    match (state.conversation_policy, requested) {
        (ConversationPolicy::Open, Some(id)) => Ok(id),
        (ConversationPolicy::Open, None) => Ok(Uuid::new_v4()),
        (ConversationPolicy::Strict, Some(id)) => {
            let db = state.clone();
            let conversation = run_blocking(move || db.db.get_conversation(&id.to_string()))
                .await?
                .map(convert::conversation);
            match conversation {
                Some(c) if c.is_between(sender, recipient) => Ok(c.id),
                _ => {
                    debug!(
                        "Rejecting envelope for conversation {} not between {} and {}",
                        id, sender, recipient
                    );
                    Err(ApiError::forbidden(
                        "conversation is not an accepted conversation between sender and recipient",
                    ))
                }
            }
        }
        (ConversationPolicy::Strict, None) => {
            let (a, b) = Conversation::ordered_pair(sender, recipient);
            let db = state.clone();
            run_blocking(move || db.db.find_conversation_between(&a.to_string(), &b.to_string()))
                .await?
                .map(|row| convert::conversation(row).id)
                .ok_or_else(|| {
                    ApiError::forbidden("no accepted conversation exists with this recipient")
                })
        }
    }
}

/// Every envelope `identity` sent or received, with sender names resolved.
pub async fn list(state: &AppState, identity: Uuid) -> Result<Vec<EnvelopeResponse>, ApiError> {
    let db = state.clone();
    let rows = run_blocking(move || db.db.list_envelopes_for(&identity.to_string())).await?;
    Ok(rows.into_iter().map(convert::envelope).collect())
}

/// Envelopes between `identity` and `counterpart` (id or username), oldest
/// first, ties in insertion order.
pub async fn conversation_with(
    state: &AppState,
    identity: Uuid,
    counterpart: &str,
) -> Result<Vec<EnvelopeResponse>, ApiError> {
    let db = state.clone();
    let counterpart = counterpart.to_string();
    let rows = run_blocking(move || {
        let Some(other) = db.db.resolve_user(&counterpart)? else {
            return Ok(None);
        };
        db.db
            .list_envelopes_between(&identity.to_string(), &other.id)
            .map(Some)
    })
    .await?
    .ok_or_else(|| ApiError::not_found("identity not found"))?;

    Ok(rows.into_iter().map(convert::envelope).collect())
}

/// Envelopes filed under `conversation_id`, restricted to those the caller
/// is party to.
pub async fn in_conversation(
    state: &AppState,
    identity: Uuid,
    conversation_id: Uuid,
) -> Result<Vec<EnvelopeResponse>, ApiError> {
    let db = state.clone();
    let (conversation, rows) = run_blocking(move || {
        let conversation = db.db.get_conversation(&conversation_id.to_string())?;
        let rows = db.db.list_envelopes_in_conversation(&conversation_id.to_string())?;
        Ok((conversation, rows))
    })
    .await?;

    let had_row = conversation.is_some();
    let known = had_row || !rows.is_empty();
    if let Some(conversation) = conversation.map(convert::conversation) {
        if !conversation.includes(identity) {
            return Err(ApiError::forbidden("not a participant in this conversation"));
        }
    }

    // Open-policy conversations have no row; membership is read off the
    // envelopes themselves.
    let envelopes: Vec<EnvelopeResponse> = rows
        .into_iter()
        .map(convert::envelope)
        .filter(|e| e.sender_id == identity || e.recipient_id == identity)
        .collect();

    if !known {
        return Err(ApiError::not_found("conversation not found"));
    }
    if envelopes.is_empty() && !had_row {
        return Err(ApiError::forbidden("not a participant in this conversation"));
    }
    Ok(envelopes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::negotiator;
    use crate::testing::{identity, next_event, state};

    fn outgoing(recipient: &str, body: &[u8], conversation_id: Option<Uuid>) -> OutgoingEnvelope {
        OutgoingEnvelope {
            recipient: recipient.to_string(),
            ciphertext: to_base64(body),
            signature: to_base64(b"sig"),
            sender_public_key: to_base64(b"pk"),
            conversation_id,
        }
    }

    #[tokio::test]
    async fn send_mints_conversation_and_persists_verbatim() {
        let state = state(ConversationPolicy::Open);
        let alice = identity(&state, "alice");
        let bob = identity(&state, "bob");

        let envelope = send(&state, &alice, outgoing("bob", b"\x00opaque\xff", None))
            .await
            .unwrap();
        assert_eq!(envelope.recipient_id, bob.id);
        assert_ne!(envelope.conversation_id, Uuid::nil());

        let listed = list(&state, bob.id).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, envelope.id);
        assert_eq!(listed[0].sender_username, "alice");
        assert_eq!(listed[0].ciphertext, to_base64(b"\x00opaque\xff"));
        assert_eq!(listed[0].signature, to_base64(b"sig"));
        assert_eq!(listed[0].sender_public_key, to_base64(b"pk"));
    }

    #[tokio::test]
    async fn open_policy_keeps_caller_supplied_conversation_id() {
        let state = state(ConversationPolicy::Open);
        let alice = identity(&state, "alice");
        identity(&state, "bob");

        let chosen = Uuid::new_v4();
        let envelope = send(&state, &alice, outgoing("bob", b"x", Some(chosen)))
            .await
            .unwrap();
        assert_eq!(envelope.conversation_id, chosen);
    }

    #[tokio::test]
    async fn invalid_sends_store_nothing() {
        let state = state(ConversationPolicy::Open);
        let alice = identity(&state, "alice");
        let bob = identity(&state, "bob");

        let err = send(&state, &alice, outgoing("carol", b"x", None))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::UnknownRecipient));

        let mut bad = outgoing("bob", b"x", None);
        bad.ciphertext = "not base64!".into();
        let err = send(&state, &alice, bad).await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));

        let err = send(&state, &alice, outgoing("bob", b"", None))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));

        assert!(list(&state, bob.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn send_pushes_to_online_recipient() {
        let state = state(ConversationPolicy::Open);
        let alice = identity(&state, "alice");
        let bob = identity(&state, "bob");
        let (_conn, mut rx) = state.dispatcher.register(bob.id).await;

        let envelope = send(&state, &alice, outgoing("bob", b"hello", None))
            .await
            .unwrap();

        match next_event(&mut rx).await {
            GatewayEvent::MessageCreate {
                id,
                sender_id,
                sender_username,
                ciphertext,
                ..
            } => {
                assert_eq!(id, envelope.id);
                assert_eq!(sender_id, alice.id);
                assert_eq!(sender_username, "alice");
                assert_eq!(ciphertext, to_base64(b"hello"));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn send_succeeds_when_recipient_is_offline_or_dead() {
        let state = state(ConversationPolicy::Open);
        let alice = identity(&state, "alice");
        let bob = identity(&state, "bob");

        send(&state, &alice, outgoing("bob", b"offline", None))
            .await
            .unwrap();

        // A handle whose receiver is gone.
        let (_conn, rx) = state.dispatcher.register(bob.id).await;
        drop(rx);
        send(&state, &alice, outgoing("bob", b"dead", None))
            .await
            .unwrap();

        assert_eq!(list(&state, bob.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn conversation_is_ordered_and_isolated() {
        let state = state(ConversationPolicy::Open);
        let alice = identity(&state, "alice");
        let bob = identity(&state, "bob");
        let carol = identity(&state, "carol");

        send(&state, &alice, outgoing("bob", b"1", None)).await.unwrap();
        send(&state, &carol, outgoing("alice", b"unrelated", None))
            .await
            .unwrap();
        send(&state, &bob, outgoing("alice", b"2", None)).await.unwrap();
        send(&state, &alice, outgoing("bob", b"3", None)).await.unwrap();

        let thread = conversation_with(&state, alice.id, "bob").await.unwrap();
        let bodies: Vec<_> = thread.iter().map(|e| e.ciphertext.clone()).collect();
        assert_eq!(bodies, vec![to_base64(b"1"), to_base64(b"2"), to_base64(b"3")]);

        let same = conversation_with(&state, bob.id, &alice.id.to_string())
            .await
            .unwrap();
        assert_eq!(same.len(), 3);

        let err = conversation_with(&state, alice.id, "nobody").await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn strict_policy_requires_accepted_conversation() {
        let state = state(ConversationPolicy::Strict);
        let alice = identity(&state, "alice");
        let bob = identity(&state, "bob");
        let carol = identity(&state, "carol");

        let err = send(&state, &alice, outgoing("bob", b"x", None))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));

        let request = negotiator::send(&state, &alice, "bob", None).await.unwrap();
        let conversation = negotiator::respond(&state, request.id, &bob, "accept")
            .await
            .unwrap()
            .conversation
            .unwrap();

        let resolved = send(&state, &alice, outgoing("bob", b"x", None))
            .await
            .unwrap();
        assert_eq!(resolved.conversation_id, conversation.id);

        let explicit = send(&state, &bob, outgoing("alice", b"y", Some(conversation.id)))
            .await
            .unwrap();
        assert_eq!(explicit.conversation_id, conversation.id);

        // Right id, wrong recipient.
        let err = send(&state, &alice, outgoing("carol", b"z", Some(conversation.id)))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));

        let err = send(&state, &carol, outgoing("bob", b"z", Some(Uuid::new_v4())))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));
    }

    #[tokio::test]
    async fn in_conversation_checks_membership() {
        let state = state(ConversationPolicy::Open);
        let alice = identity(&state, "alice");
        let bob = identity(&state, "bob");
        let mallory = identity(&state, "mallory");

        let request = negotiator::send(&state, &alice, "bob", None).await.unwrap();
        let conversation = negotiator::respond(&state, request.id, &bob, "accept")
            .await
            .unwrap()
            .conversation
            .unwrap();

        // Accepted but empty is a valid, empty listing.
        assert!(in_conversation(&state, alice.id, conversation.id)
            .await
            .unwrap()
            .is_empty());

        send(&state, &alice, outgoing("bob", b"1", Some(conversation.id)))
            .await
            .unwrap();
        send(&state, &bob, outgoing("alice", b"2", Some(conversation.id)))
            .await
            .unwrap();

        let listed = in_conversation(&state, bob.id, conversation.id).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].ciphertext, to_base64(b"1"));

        let err = in_conversation(&state, mallory.id, conversation.id)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));

        let err = in_conversation(&state, alice.id, Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[test]
    fn policy_parses_flag_values() {
        let parse = |s: &str| s.parse::<ConversationPolicy>();
        assert_eq!(parse("true"), Ok(ConversationPolicy::Strict));
        assert_eq!(parse("Strict"), Ok(ConversationPolicy::Strict));
        assert_eq!(parse("false"), Ok(ConversationPolicy::Open));
        assert!("sometimes".parse::<ConversationPolicy>().is_err());
        assert_eq!(ConversationPolicy::default(), ConversationPolicy::Open);
    }
}
