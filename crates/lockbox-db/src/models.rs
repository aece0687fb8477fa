//! Database row types: these map directly to SQLite rows.
//! Distinct from lockbox-types domain models to keep the DB layer independent.

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub password: String,
    pub created_at: String,
}

pub struct KeyBundleRow {
    pub identity_id: String,
    pub kem_public_key: Vec<u8>,
    pub signature_public_key: Vec<u8>,
    pub updated_at: String,
}

pub struct ChatRequestRow {
    pub id: String,
    pub from_id: String,
    pub to_id: String,
    pub message: String,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Pending request addressed to someone, joined with the sender's name and
/// published KEM key.
pub struct IncomingRequestRow {
    pub id: String,
    pub from_id: String,
    pub from_username: String,
    pub from_kem_public_key: Option<Vec<u8>>,
    pub message: String,
    pub created_at: String,
}

pub struct SentRequestRow {
    pub id: String,
    pub to_id: String,
    pub to_username: String,
    pub message: String,
    pub status: String,
    pub created_at: String,
}

pub struct ConversationRow {
    pub id: String,
    pub participant_a: String,
    pub participant_b: String,
    pub request_id: String,
    pub created_at: String,
}

pub struct EnvelopeRow {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub sender_username: String,
    pub recipient_id: String,
    pub ciphertext: Vec<u8>,
    pub signature: Vec<u8>,
    pub sender_public_key: Vec<u8>,
    pub created_at: String,
}

/// Outcome of registering a username.
#[derive(Debug, PartialEq, Eq)]
pub enum CreateUserOutcome {
    Created,
    UsernameTaken,
}

/// Outcome of inserting a chat request.
#[derive(Debug, PartialEq, Eq)]
pub enum InsertRequestOutcome {
    Created,
    /// A pending request for the same ordered pair already exists.
    DuplicatePending,
}

/// Outcome of moving a request out of `pending`.
#[derive(Debug, PartialEq, Eq)]
pub enum RespondOutcome {
    Updated,
    NotFound,
    /// The request had already left `pending`; carries its current status.
    AlreadyTerminal(String),
}
