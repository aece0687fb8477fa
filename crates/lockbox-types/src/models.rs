use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A registered identity. Resolved through the datastore, never owned by the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub id: Uuid,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

/// The active public key material an identity has published.
/// Private keys never reach the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyBundle {
    pub identity_id: Uuid,
    pub kem_public_key: Vec<u8>,
    pub signature_public_key: Vec<u8>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Accepted,
    Declined,
}

impl RequestStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Declined => "declined",
        }
    }

    /// Accepted and declined requests never change again.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "accepted" => Ok(Self::Accepted),
            "declined" => Ok(Self::Declined),
            other => Err(format!("unknown request status '{}'", other)),
        }
    }
}

/// What the recipient of a chat request decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RespondAction {
    Accept,
    Decline,
}

impl RespondAction {
    /// Parse a wire action. Anything other than `accept`/`decline` is rejected.
    pub fn parse(action: &str) -> Option<Self> {
        match action {
            "accept" => Some(Self::Accept),
            "decline" => Some(Self::Decline),
            _ => None,
        }
    }

    pub fn resulting_status(self) -> RequestStatus {
        match self {
            Self::Accept => RequestStatus::Accepted,
            Self::Decline => RequestStatus::Declined,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub id: Uuid,
    pub from_identity: Uuid,
    pub to_identity: Uuid,
    pub message: String,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An accepted pairing of two identities. The participant pair is unordered;
/// `participant_a` always holds the lexically smaller id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub participant_a: Uuid,
    pub participant_b: Uuid,
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    /// Normalise an unordered pair so (x, y) and (y, x) compare equal.
    pub fn ordered_pair(x: Uuid, y: Uuid) -> (Uuid, Uuid) {
        if x <= y { (x, y) } else { (y, x) }
    }

    pub fn includes(&self, identity: Uuid) -> bool {
        self.participant_a == identity || self.participant_b == identity
    }

    /// True if the conversation is exactly between `x` and `y`, in either order.
    pub fn is_between(&self, x: Uuid, y: Uuid) -> bool {
        Self::ordered_pair(x, y) == (self.participant_a, self.participant_b)
    }
}

/// Messages stored on the server are always encrypted and signed client-side.
/// The server only sees ciphertext, never plaintext, and never verifies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEnvelope {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub recipient_id: Uuid,
    pub ciphertext: Vec<u8>,
    pub signature: Vec<u8>,
    pub sender_public_key: Vec<u8>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_pending_is_open() {
        assert!(!RequestStatus::Pending.is_terminal());
        assert!(RequestStatus::Accepted.is_terminal());
        assert!(RequestStatus::Declined.is_terminal());
    }

    #[test]
    fn status_parses_its_own_output() {
        for status in [RequestStatus::Pending, RequestStatus::Accepted, RequestStatus::Declined] {
            assert_eq!(status.as_str().parse::<RequestStatus>().unwrap(), status);
        }
        assert!("archived".parse::<RequestStatus>().is_err());
    }

    #[test]
    fn unknown_actions_are_rejected() {
        assert_eq!(RespondAction::parse("accept"), Some(RespondAction::Accept));
        assert_eq!(RespondAction::parse("decline"), Some(RespondAction::Decline));
        assert_eq!(RespondAction::parse("ACCEPT"), None);
        assert_eq!(RespondAction::parse("ignore"), None);
    }

    #[test]
    fn conversation_pair_is_unordered() {
        let x = Uuid::new_v4();
        let y = Uuid::new_v4();
        let (a, b) = Conversation::ordered_pair(x, y);
        let conversation = Conversation {
            id: Uuid::new_v4(),
            participant_a: a,
            participant_b: b,
            created_at: Utc::now(),
        };
        assert!(conversation.is_between(x, y));
        assert!(conversation.is_between(y, x));
        assert!(conversation.includes(x));
        assert!(!conversation.is_between(x, Uuid::new_v4()));
    }
}
