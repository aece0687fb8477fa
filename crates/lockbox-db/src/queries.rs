use crate::Database;
use crate::models::{
    ChatRequestRow, ConversationRow, CreateUserOutcome, EnvelopeRow, IncomingRequestRow,
    InsertRequestOutcome, KeyBundleRow, RespondOutcome, SentRequestRow, UserRow,
};
use anyhow::Result;
use rusqlite::{Connection, Row};

const ENVELOPE_COLUMNS: &str = "e.id, e.conversation_id, e.sender_id, u.username, e.recipient_id,
     e.ciphertext, e.signature, e.sender_public_key, e.created_at";

/// Conversation to create in the same transaction that accepts a request.
pub struct NewConversation<'a> {
    pub id: &'a str,
    pub participant_a: &'a str,
    pub participant_b: &'a str,
    pub created_at: &'a str,
}

pub struct NewEnvelope<'a> {
    pub id: &'a str,
    pub conversation_id: &'a str,
    pub sender_id: &'a str,
    pub recipient_id: &'a str,
    pub ciphertext: &'a [u8],
    pub signature: &'a [u8],
    pub sender_public_key: &'a [u8],
    pub created_at: &'a str,
}

impl Database {
    // -- Users --

    /// Insert a user. A username collision, including one lost to a
    /// concurrent registration, is `UsernameTaken` rather than an error.
    pub fn create_user(
        &self,
        id: &str,
        username: &str,
        password_hash: &str,
        created_at: &str,
    ) -> Result<CreateUserOutcome> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT INTO users (id, username, password, created_at) VALUES (?1, ?2, ?3, ?4)",
                (id, username, password_hash, created_at),
            );

            match inserted {
                Ok(_) => Ok(CreateUserOutcome::Created),
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
                {
                    Ok(CreateUserOutcome::UsernameTaken)
                }
                Err(e) => Err(e.into()),
            }
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "username", username))
    }

    /// Resolve an identity by id first, then by username.
    pub fn resolve_user(&self, id_or_username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| match query_user(conn, "id", id_or_username)? {
            Some(user) => Ok(Some(user)),
            None => query_user(conn, "username", id_or_username),
        })
    }

    pub fn username_exists(&self, username: &str) -> Result<bool> {
        Ok(self.get_user_by_username(username)?.is_some())
    }

    // -- Key bundles --

    /// Publish (or replace) an identity's key bundle in one statement.
    pub fn upsert_key_bundle(
        &self,
        identity_id: &str,
        kem_public_key: &[u8],
        signature_public_key: &[u8],
        updated_at: &str,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO key_bundles (identity_id, kem_public_key, signature_public_key, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(identity_id) DO UPDATE SET
                    kem_public_key = excluded.kem_public_key,
                    signature_public_key = excluded.signature_public_key,
                    updated_at = excluded.updated_at",
                rusqlite::params![identity_id, kem_public_key, signature_public_key, updated_at],
            )?;
            Ok(())
        })
    }

    pub fn get_key_bundle(&self, identity_id: &str) -> Result<Option<KeyBundleRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT identity_id, kem_public_key, signature_public_key, updated_at
                 FROM key_bundles WHERE identity_id = ?1",
                [identity_id],
                |row| {
                    Ok(KeyBundleRow {
                        identity_id: row.get(0)?,
                        kem_public_key: row.get(1)?,
                        signature_public_key: row.get(2)?,
                        updated_at: row.get(3)?,
                    })
                },
            )
            .optional()
        })
    }

    // -- Chat requests --

    /// Insert a new pending request. The partial unique index turns a second
    /// pending request for the same ordered pair into `DuplicatePending`,
    /// even when two senders race.
    pub fn insert_chat_request(
        &self,
        id: &str,
        from_id: &str,
        to_id: &str,
        message: &str,
        created_at: &str,
    ) -> Result<InsertRequestOutcome> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT INTO chat_requests (id, from_id, to_id, message, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, 'pending', ?5, ?5)",
                rusqlite::params![id, from_id, to_id, message, created_at],
            );

            match inserted {
                Ok(_) => Ok(InsertRequestOutcome::Created),
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
                {
                    Ok(InsertRequestOutcome::DuplicatePending)
                }
                Err(e) => Err(e.into()),
            }
        })
    }

    pub fn get_chat_request(&self, id: &str) -> Result<Option<ChatRequestRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, from_id, to_id, message, status, created_at, updated_at
                 FROM chat_requests WHERE id = ?1",
                [id],
                |row| {
                    Ok(ChatRequestRow {
                        id: row.get(0)?,
                        from_id: row.get(1)?,
                        to_id: row.get(2)?,
                        message: row.get(3)?,
                        status: row.get(4)?,
                        created_at: row.get(5)?,
                        updated_at: row.get(6)?,
                    })
                },
            )
            .optional()
        })
    }

    /// Move a pending request to `status`, creating `conversation` in the same
    /// transaction. Only the first caller wins; later callers see
    /// `AlreadyTerminal`, so a retried accept can never mint a second
    /// conversation.
    pub fn respond_chat_request(
        &self,
        request_id: &str,
        status: &str,
        updated_at: &str,
        conversation: Option<NewConversation<'_>>,
    ) -> Result<RespondOutcome> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let current: Option<String> = tx
                .query_row(
                    "SELECT status FROM chat_requests WHERE id = ?1",
                    [request_id],
                    |row| row.get(0),
                )
                .optional()?;

            let Some(current) = current else {
                return Ok(RespondOutcome::NotFound);
            };
            if current != "pending" {
                return Ok(RespondOutcome::AlreadyTerminal(current));
            }

            tx.execute(
                "UPDATE chat_requests SET status = ?1, updated_at = ?2
                 WHERE id = ?3 AND status = 'pending'",
                rusqlite::params![status, updated_at, request_id],
            )?;

            if let Some(c) = conversation {
                tx.execute(
                    "INSERT INTO conversations (id, participant_a, participant_b, request_id, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    rusqlite::params![c.id, c.participant_a, c.participant_b, request_id, c.created_at],
                )?;
            }

            tx.commit()?;
            Ok(RespondOutcome::Updated)
        })
    }

    pub fn list_incoming_requests(&self, to_id: &str) -> Result<Vec<IncomingRequestRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT r.id, r.from_id, u.username, k.kem_public_key, r.message, r.created_at
                 FROM chat_requests r
                 JOIN users u ON r.from_id = u.id
                 LEFT JOIN key_bundles k ON k.identity_id = r.from_id
                 WHERE r.to_id = ?1 AND r.status = 'pending'
                 ORDER BY r.created_at ASC, r.rowid ASC",
            )?;

            let rows = stmt
                .query_map([to_id], |row| {
                    Ok(IncomingRequestRow {
                        id: row.get(0)?,
                        from_id: row.get(1)?,
                        from_username: row.get(2)?,
                        from_kem_public_key: row.get(3)?,
                        message: row.get(4)?,
                        created_at: row.get(5)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    pub fn list_sent_requests(&self, from_id: &str) -> Result<Vec<SentRequestRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT r.id, r.to_id, u.username, r.message, r.status, r.created_at
                 FROM chat_requests r
                 JOIN users u ON r.to_id = u.id
                 WHERE r.from_id = ?1
                 ORDER BY r.created_at ASC, r.rowid ASC",
            )?;

            let rows = stmt
                .query_map([from_id], |row| {
                    Ok(SentRequestRow {
                        id: row.get(0)?,
                        to_id: row.get(1)?,
                        to_username: row.get(2)?,
                        message: row.get(3)?,
                        status: row.get(4)?,
                        created_at: row.get(5)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    // -- Conversations --

    pub fn get_conversation(&self, id: &str) -> Result<Option<ConversationRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, participant_a, participant_b, request_id, created_at
                 FROM conversations WHERE id = ?1",
                [id],
                map_conversation,
            )
            .optional()
        })
    }

    /// Most recent conversation between an (already ordered) participant pair.
    pub fn find_conversation_between(
        &self,
        participant_a: &str,
        participant_b: &str,
    ) -> Result<Option<ConversationRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, participant_a, participant_b, request_id, created_at
                 FROM conversations
                 WHERE participant_a = ?1 AND participant_b = ?2
                 ORDER BY created_at DESC
                 LIMIT 1",
                [participant_a, participant_b],
                map_conversation,
            )
            .optional()
        })
    }

    pub fn count_conversations_for_request(&self, request_id: &str) -> Result<u32> {
        self.with_conn(|conn| {
            let count = conn.query_row(
                "SELECT COUNT(*) FROM conversations WHERE request_id = ?1",
                [request_id],
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }

    // -- Envelopes --

    pub fn insert_envelope(&self, envelope: &NewEnvelope<'_>) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO envelopes
                    (id, conversation_id, sender_id, recipient_id, ciphertext, signature, sender_public_key, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    envelope.id,
                    envelope.conversation_id,
                    envelope.sender_id,
                    envelope.recipient_id,
                    envelope.ciphertext,
                    envelope.signature,
                    envelope.sender_public_key,
                    envelope.created_at,
                ],
            )?;
            Ok(())
        })
    }

    /// Every envelope the identity sent or received.
    pub fn list_envelopes_for(&self, identity_id: &str) -> Result<Vec<EnvelopeRow>> {
        self.with_conn(|conn| {
            query_envelopes(
                conn,
                "e.sender_id = ?1 OR e.recipient_id = ?1",
                &[&identity_id],
            )
        })
    }

    /// Envelopes exchanged between two identities, oldest first.
    pub fn list_envelopes_between(&self, x: &str, y: &str) -> Result<Vec<EnvelopeRow>> {
        self.with_conn(|conn| {
            query_envelopes(
                conn,
                "(e.sender_id = ?1 AND e.recipient_id = ?2) OR (e.sender_id = ?2 AND e.recipient_id = ?1)",
                &[&x, &y],
            )
        })
    }

    pub fn list_envelopes_in_conversation(&self, conversation_id: &str) -> Result<Vec<EnvelopeRow>> {
        self.with_conn(|conn| {
            query_envelopes(conn, "e.conversation_id = ?1", &[&conversation_id])
        })
    }
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    // `column` is always one of our own literals, never caller input.
    let sql = format!(
        "SELECT id, username, password, created_at FROM users WHERE {} = ?1",
        column
    );
    let mut stmt = conn.prepare(&sql)?;

    let row = stmt
        .query_row([value], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                username: row.get(1)?,
                password: row.get(2)?,
                created_at: row.get(3)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn map_conversation(row: &Row<'_>) -> rusqlite::Result<ConversationRow> {
    Ok(ConversationRow {
        id: row.get(0)?,
        participant_a: row.get(1)?,
        participant_b: row.get(2)?,
        request_id: row.get(3)?,
        created_at: row.get(4)?,
    })
}

/// Ordered by creation time, ties broken by insertion order.
fn query_envelopes(
    conn: &Connection,
    filter: &str,
    params: &[&dyn rusqlite::types::ToSql],
) -> Result<Vec<EnvelopeRow>> {
    // JOIN users to fetch sender_username in a single query (no N+1)
    let sql = format!(
        "SELECT {}
         FROM envelopes e
         LEFT JOIN users u ON e.sender_id = u.id
         WHERE {}
         ORDER BY e.created_at ASC, e.seq ASC",
        ENVELOPE_COLUMNS, filter
    );
    let mut stmt = conn.prepare(&sql)?;

    let rows = stmt
        .query_map(params, |row| {
            Ok(EnvelopeRow {
                id: row.get(0)?,
                conversation_id: row.get(1)?,
                sender_id: row.get(2)?,
                sender_username: row
                    .get::<_, Option<String>>(3)?
                    .unwrap_or_else(|| "unknown".to_string()),
                recipient_id: row.get(4)?,
                ciphertext: row.get(5)?,
                signature: row.get(6)?,
                sender_public_key: row.get(7)?,
                created_at: row.get(8)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn user(db: &Database, name: &str) -> String {
        let id = Uuid::new_v4().to_string();
        assert_eq!(
            db.create_user(&id, name, "hash", "2026-01-01T00:00:00.000000Z").unwrap(),
            CreateUserOutcome::Created
        );
        id
    }

    fn envelope(db: &Database, conv: &str, from: &str, to: &str, at: &str) -> String {
        let id = Uuid::new_v4().to_string();
        db.insert_envelope(&NewEnvelope {
            id: &id,
            conversation_id: conv,
            sender_id: from,
            recipient_id: to,
            ciphertext: b"ct",
            signature: b"sig",
            sender_public_key: b"pk",
            created_at: at,
        })
        .unwrap();
        id
    }

    #[test]
    fn resolves_by_id_or_username() {
        let db = Database::open_in_memory().unwrap();
        let alice = user(&db, "alice");

        assert_eq!(db.resolve_user(&alice).unwrap().unwrap().username, "alice");
        assert_eq!(db.resolve_user("alice").unwrap().unwrap().id, alice);
        assert!(db.resolve_user("nobody").unwrap().is_none());
        assert!(db.username_exists("alice").unwrap());
    }

    #[test]
    fn duplicate_username_is_an_outcome_not_an_error() {
        let db = Database::open_in_memory().unwrap();
        user(&db, "alice");

        let outcome = db
            .create_user(
                &Uuid::new_v4().to_string(),
                "alice",
                "other-hash",
                "2026-01-01T00:00:02.000000Z",
            )
            .unwrap();
        assert_eq!(outcome, CreateUserOutcome::UsernameTaken);
        assert!(db.resolve_user("alice").unwrap().is_some());
    }

    #[test]
    fn one_pending_request_per_ordered_pair() {
        let db = Database::open_in_memory().unwrap();
        let a = user(&db, "alice");
        let b = user(&db, "bob");
        let ts = "2026-01-01T00:00:01.000000Z";

        let first = Uuid::new_v4().to_string();
        assert_eq!(
            db.insert_chat_request(&first, &a, &b, "hi", ts).unwrap(),
            InsertRequestOutcome::Created
        );
        assert_eq!(
            db.insert_chat_request(&Uuid::new_v4().to_string(), &a, &b, "hi again", ts).unwrap(),
            InsertRequestOutcome::DuplicatePending
        );
        // The reverse direction is a different ordered pair.
        assert_eq!(
            db.insert_chat_request(&Uuid::new_v4().to_string(), &b, &a, "hey", ts).unwrap(),
            InsertRequestOutcome::Created
        );

        // Once declined, a fresh request may be sent.
        assert_eq!(
            db.respond_chat_request(&first, "declined", ts, None).unwrap(),
            RespondOutcome::Updated
        );
        assert_eq!(
            db.insert_chat_request(&Uuid::new_v4().to_string(), &a, &b, "retry", ts).unwrap(),
            InsertRequestOutcome::Created
        );
    }

    #[test]
    fn respond_only_once() {
        let db = Database::open_in_memory().unwrap();
        let a = user(&db, "alice");
        let b = user(&db, "bob");
        let ts = "2026-01-01T00:00:01.000000Z";
        let req = Uuid::new_v4().to_string();
        db.insert_chat_request(&req, &a, &b, "hi", ts).unwrap();

        let conv = Uuid::new_v4().to_string();
        let outcome = db
            .respond_chat_request(
                &req,
                "accepted",
                ts,
                Some(NewConversation {
                    id: &conv,
                    participant_a: &a,
                    participant_b: &b,
                    created_at: ts,
                }),
            )
            .unwrap();
        assert_eq!(outcome, RespondOutcome::Updated);

        let second_conv = Uuid::new_v4().to_string();
        let again = db
            .respond_chat_request(
                &req,
                "accepted",
                ts,
                Some(NewConversation {
                    id: &second_conv,
                    participant_a: &a,
                    participant_b: &b,
                    created_at: ts,
                }),
            )
            .unwrap();
        assert_eq!(again, RespondOutcome::AlreadyTerminal("accepted".into()));
        assert_eq!(db.count_conversations_for_request(&req).unwrap(), 1);
        assert!(db.get_conversation(&second_conv).unwrap().is_none());

        assert_eq!(
            db.respond_chat_request("missing", "accepted", ts, None).unwrap(),
            RespondOutcome::NotFound
        );
    }

    #[test]
    fn incoming_lists_only_pending_with_sender_key() {
        let db = Database::open_in_memory().unwrap();
        let a = user(&db, "alice");
        let b = user(&db, "bob");
        let c = user(&db, "carol");
        let ts = "2026-01-01T00:00:01.000000Z";

        db.upsert_key_bundle(&a, &[1u8; 4], &[2u8; 4], ts).unwrap();
        db.insert_chat_request(&Uuid::new_v4().to_string(), &a, &b, "hi", ts).unwrap();
        let declined = Uuid::new_v4().to_string();
        db.insert_chat_request(&declined, &c, &b, "yo", ts).unwrap();
        db.respond_chat_request(&declined, "declined", ts, None).unwrap();

        let incoming = db.list_incoming_requests(&b).unwrap();
        assert_eq!(incoming.len(), 1);
        assert_eq!(incoming[0].from_username, "alice");
        assert_eq!(incoming[0].from_kem_public_key.as_deref(), Some(&[1u8; 4][..]));

        let sent = db.list_sent_requests(&c).unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].status, "declined");
        assert_eq!(sent[0].to_username, "bob");
    }

    #[test]
    fn key_bundle_is_replaced() {
        let db = Database::open_in_memory().unwrap();
        let a = user(&db, "alice");
        db.upsert_key_bundle(&a, &[1u8; 4], &[2u8; 4], "2026-01-01T00:00:01.000000Z").unwrap();
        db.upsert_key_bundle(&a, &[3u8; 4], &[4u8; 4], "2026-01-01T00:00:02.000000Z").unwrap();

        let bundle = db.get_key_bundle(&a).unwrap().unwrap();
        assert_eq!(bundle.kem_public_key, vec![3u8; 4]);
        assert_eq!(bundle.signature_public_key, vec![4u8; 4]);
        assert_eq!(bundle.updated_at, "2026-01-01T00:00:02.000000Z");
    }

    #[test]
    fn conversation_order_ignores_unrelated_traffic() {
        let db = Database::open_in_memory().unwrap();
        let a = user(&db, "alice");
        let b = user(&db, "bob");
        let c = user(&db, "carol");

        let e1 = envelope(&db, "c1", &a, &b, "2026-01-01T00:00:01.000000Z");
        envelope(&db, "c2", &a, &c, "2026-01-01T00:00:01.500000Z");
        let e2 = envelope(&db, "c1", &b, &a, "2026-01-01T00:00:02.000000Z");
        envelope(&db, "c2", &c, &a, "2026-01-01T00:00:02.500000Z");
        // Same timestamp as e2: insertion order breaks the tie.
        let e3 = envelope(&db, "c1", &a, &b, "2026-01-01T00:00:02.000000Z");

        let ids: Vec<String> = db
            .list_envelopes_between(&b, &a)
            .unwrap()
            .into_iter()
            .map(|row| row.id)
            .collect();
        assert_eq!(ids, vec![e1.clone(), e2.clone(), e3.clone()]);

        let in_conv: Vec<String> = db
            .list_envelopes_in_conversation("c1")
            .unwrap()
            .into_iter()
            .map(|row| row.id)
            .collect();
        assert_eq!(in_conv, vec![e1, e2, e3]);

        let all = db.list_envelopes_for(&a).unwrap();
        assert_eq!(all.len(), 5);
        assert!(all.iter().all(|row| row.sender_username != "unknown"));
        assert_eq!(db.list_envelopes_for(&b).unwrap().len(), 3);
    }
}
