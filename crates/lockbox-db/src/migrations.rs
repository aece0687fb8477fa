use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          TEXT PRIMARY KEY,
            username    TEXT NOT NULL UNIQUE,
            password    TEXT NOT NULL,
            created_at  TEXT NOT NULL
        );

        -- One active bundle per identity; publishing again replaces the row.
        CREATE TABLE IF NOT EXISTS key_bundles (
            identity_id             TEXT PRIMARY KEY REFERENCES users(id),
            kem_public_key          BLOB NOT NULL,
            signature_public_key    BLOB NOT NULL,
            updated_at              TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS chat_requests (
            id          TEXT PRIMARY KEY,
            from_id     TEXT NOT NULL REFERENCES users(id),
            to_id       TEXT NOT NULL REFERENCES users(id),
            message     TEXT NOT NULL,
            status      TEXT NOT NULL CHECK (status IN ('pending', 'accepted', 'declined')),
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL
        );

        -- At most one pending request per ordered (from, to) pair.
        CREATE UNIQUE INDEX IF NOT EXISTS idx_chat_requests_one_pending
            ON chat_requests(from_id, to_id) WHERE status = 'pending';

        CREATE INDEX IF NOT EXISTS idx_chat_requests_to
            ON chat_requests(to_id, status);

        CREATE TABLE IF NOT EXISTS conversations (
            id              TEXT PRIMARY KEY,
            participant_a   TEXT NOT NULL REFERENCES users(id),
            participant_b   TEXT NOT NULL REFERENCES users(id),
            request_id      TEXT NOT NULL UNIQUE REFERENCES chat_requests(id),
            created_at      TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_conversations_pair
            ON conversations(participant_a, participant_b);

        -- seq preserves insertion order for envelopes sharing a timestamp.
        -- conversation_id is deliberately not a foreign key: senders may name
        -- conversations minted client-side.
        CREATE TABLE IF NOT EXISTS envelopes (
            seq                 INTEGER PRIMARY KEY AUTOINCREMENT,
            id                  TEXT NOT NULL UNIQUE,
            conversation_id     TEXT NOT NULL,
            sender_id           TEXT NOT NULL REFERENCES users(id),
            recipient_id        TEXT NOT NULL REFERENCES users(id),
            ciphertext          BLOB NOT NULL,
            signature           BLOB NOT NULL,
            sender_public_key   BLOB NOT NULL,
            created_at          TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_envelopes_sender
            ON envelopes(sender_id, recipient_id, created_at);

        CREATE INDEX IF NOT EXISTS idx_envelopes_recipient
            ON envelopes(recipient_id, created_at);

        CREATE INDEX IF NOT EXISTS idx_envelopes_conversation
            ON envelopes(conversation_id, created_at);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
