//! Conversation lifecycle: creation, sender validation and the
//! pending -> active transition.
//!
//! Every write runs as a single unit of work (see [`Database::transaction`]);
//! a failed precondition returns early and the transaction rolls back.

use rusqlite::Connection;
use tracing::{debug, info};
use uuid::Uuid;

use spark_types::models::{
    Conversation, ConversationDetails, ConversationPreview, ConversationStatus, Message,
};

use crate::Database;
use crate::error::{StoreError, StoreResult};
use crate::models::{
    CONVERSATION_COLUMNS, MESSAGE_COLUMNS, OptionalExt, column_opt_timestamp, column_opt_uuid,
    column_status, column_timestamp, column_uuid, conversation_from_row, format_timestamp,
    message_from_row, now,
};
use crate::queries::query_user_by_id;

/// Number of messages returned with a conversation. No pagination.
pub const HISTORY_LIMIT: u32 = 50;

const OPENER_MUST_WAIT: &str = "cannot send another message until the recipient replies";
const CONVERSATION_BLOCKED: &str = "conversation is blocked";

/// Order a participant pair so the smaller id comes first.
pub fn canonical_pair(a: Uuid, b: Uuid) -> (Uuid, Uuid) {
    if a <= b { (a, b) } else { (b, a) }
}

impl Database {
    /// Create the conversation for `{sender, recipient}` together with its
    /// opening message. Fails with `Conflict` if the pair already has one.
    pub fn start_conversation(
        &self,
        sender_id: Uuid,
        recipient_id: Uuid,
        content: &str,
    ) -> StoreResult<Conversation> {
        if sender_id == recipient_id {
            return Err(StoreError::InvalidInput("cannot start a conversation with yourself"));
        }
        if content.trim().is_empty() {
            return Err(StoreError::InvalidInput("message content must not be empty"));
        }

        let (user_a, user_b) = canonical_pair(sender_id, recipient_id);

        self.transaction(|tx| {
            if query_user_by_id(tx, recipient_id)?.is_none() {
                return Err(StoreError::NotFound);
            }

            let conversation_id = Uuid::new_v4();
            let ts = now();
            let inserted = tx.execute(
                "INSERT INTO conversations
                    (id, user_a_id, user_b_id, status, message_count, created_at, updated_at)
                 VALUES (?1, ?2, ?3, 'pending', 1, ?4, ?4)
                 ON CONFLICT (user_a_id, user_b_id) DO NOTHING",
                rusqlite::params![
                    conversation_id.to_string(),
                    user_a.to_string(),
                    user_b.to_string(),
                    format_timestamp(&ts)
                ],
            )?;

            if inserted == 0 {
                debug!("Conversation between {} and {} already exists", user_a, user_b);
                return Err(StoreError::Conflict);
            }

            insert_message(tx, conversation_id, sender_id, content, true, &ts)?;

            let conversation = query_conversation(tx, conversation_id)?.ok_or_else(|| {
                StoreError::Internal(anyhow::anyhow!(
                    "conversation {} vanished after insert",
                    conversation_id
                ))
            })?;

            info!("{} started conversation {} with {}", sender_id, conversation_id, recipient_id);
            Ok(conversation)
        })
    }

    /// Append a message, enforcing the one-message-then-wait rule on the
    /// initiator of a pending conversation. The recipient's first reply
    /// activates the conversation in the same transaction.
    pub fn add_message(
        &self,
        conversation_id: Uuid,
        sender_id: Uuid,
        content: &str,
    ) -> StoreResult<Message> {
        self.add_message_then(conversation_id, sender_id, content, |_| {})
    }

    /// [`Database::add_message`] with `on_commit` called for the stored
    /// message before the next write can commit.
    pub fn add_message_then<F>(
        &self,
        conversation_id: Uuid,
        sender_id: Uuid,
        content: &str,
        on_commit: F,
    ) -> StoreResult<Message>
    where
        F: FnOnce(&Message),
    {
        if content.trim().is_empty() {
            return Err(StoreError::InvalidInput("message content must not be empty"));
        }

        self.transaction_then(
            |tx| {
                let conversation =
                    query_conversation(tx, conversation_id)?.ok_or(StoreError::NotFound)?;

                if !conversation.has_participant(sender_id) {
                    return Err(StoreError::Forbidden);
                }

                match conversation.status {
                    ConversationStatus::Blocked => {
                        return Err(StoreError::PolicyViolation(CONVERSATION_BLOCKED));
                    }
                    ConversationStatus::Pending => {
                        let opener = query_opening_sender(tx, conversation_id)?.ok_or_else(|| {
                            StoreError::Internal(anyhow::anyhow!(
                                "pending conversation {} has no opening message",
                                conversation_id
                            ))
                        })?;

                        if opener == sender_id {
                            return Err(StoreError::PolicyViolation(OPENER_MUST_WAIT));
                        }

                        tx.execute(
                            "UPDATE conversations SET status = ?2 WHERE id = ?1",
                            rusqlite::params![
                                conversation_id.to_string(),
                                ConversationStatus::Active.as_str()
                            ],
                        )?;
                        info!("Conversation {} activated by reply from {}", conversation_id, sender_id);
                    }
                    ConversationStatus::Active => {}
                }

                let ts = now();
                let message = insert_message(tx, conversation_id, sender_id, content, false, &ts)?;

                tx.execute(
                    "UPDATE conversations
                     SET message_count = message_count + 1, updated_at = ?2
                     WHERE id = ?1",
                    rusqlite::params![conversation_id.to_string(), format_timestamp(&ts)],
                )?;

                Ok(message)
            },
            on_commit,
        )
    }

    /// Conversation metadata plus the latest [`HISTORY_LIMIT`] messages,
    /// oldest first. A missing conversation and one the requester is not
    /// part of both yield `NotFound`.
    pub fn get_conversation_with_history(
        &self,
        conversation_id: Uuid,
        requesting_user_id: Uuid,
    ) -> StoreResult<ConversationDetails> {
        self.with_conn(|conn| {
            let conversation = query_conversation(conn, conversation_id)?
                .filter(|c| c.has_participant(requesting_user_id))
                .ok_or(StoreError::NotFound)?;

            let messages = query_recent_messages(conn, conversation_id, HISTORY_LIMIT)?;

            Ok(ConversationDetails {
                conversation,
                messages,
            })
        })
    }

    /// Membership check used before admitting a live viewer.
    pub fn is_participant(&self, conversation_id: Uuid, user_id: Uuid) -> StoreResult<bool> {
        self.with_conn(|conn| {
            let found = conn
                .query_row(
                    "SELECT 1 FROM conversations
                     WHERE id = ?1 AND (user_a_id = ?2 OR user_b_id = ?2)",
                    [conversation_id.to_string(), user_id.to_string()],
                    |_| Ok(()),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    /// Inbox for `user_id`, most recently updated first.
    pub fn list_conversations_for_user(
        &self,
        user_id: Uuid,
    ) -> StoreResult<Vec<ConversationPreview>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT c.id, c.status, other.id, other.display_name,
                        lm.content, lm.sender_id, lm.created_at, c.updated_at
                 FROM conversations c
                 JOIN users other ON other.id =
                     CASE WHEN c.user_a_id = ?1 THEN c.user_b_id ELSE c.user_a_id END
                 LEFT JOIN messages lm ON lm.id = (
                     SELECT m.id FROM messages m
                     WHERE m.conversation_id = c.id
                     ORDER BY m.created_at DESC, m.rowid DESC
                     LIMIT 1
                 )
                 WHERE c.user_a_id = ?1 OR c.user_b_id = ?1
                 ORDER BY c.updated_at DESC, c.rowid DESC",
            )?;

            let previews = stmt
                .query_map([user_id.to_string()], |row| {
                    Ok(ConversationPreview {
                        conversation_id: column_uuid(row, 0)?,
                        status: column_status(row, 1)?,
                        other_user_id: column_uuid(row, 2)?,
                        other_user_display_name: row.get(3)?,
                        last_message: row.get(4)?,
                        last_message_sender_id: column_opt_uuid(row, 5)?,
                        last_message_at: column_opt_timestamp(row, 6)?,
                        updated_at: column_timestamp(row, 7)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;

            Ok(previews)
        })
    }

    /// Moderation entry point. Sets the status without any transition rules.
    pub fn set_conversation_status(
        &self,
        conversation_id: Uuid,
        status: ConversationStatus,
    ) -> StoreResult<()> {
        self.transaction(|tx| {
            let changed = tx.execute(
                "UPDATE conversations SET status = ?2, updated_at = ?3 WHERE id = ?1",
                rusqlite::params![
                    conversation_id.to_string(),
                    status.as_str(),
                    format_timestamp(&now())
                ],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound);
            }
            info!("Conversation {} set to {}", conversation_id, status);
            Ok(())
        })
    }
}

fn query_conversation(conn: &Connection, id: Uuid) -> StoreResult<Option<Conversation>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM conversations WHERE id = ?1",
        CONVERSATION_COLUMNS
    ))?;

    Ok(stmt.query_row([id.to_string()], conversation_from_row).optional()?)
}

/// Sender of the opening message; falls back to the earliest message.
fn query_opening_sender(conn: &Connection, conversation_id: Uuid) -> StoreResult<Option<Uuid>> {
    let sender = conn
        .query_row(
            "SELECT sender_id FROM messages
             WHERE conversation_id = ?1
             ORDER BY is_opening_message DESC, created_at ASC, rowid ASC
             LIMIT 1",
            [conversation_id.to_string()],
            |row| column_uuid(row, 0),
        )
        .optional()?;
    Ok(sender)
}

fn query_recent_messages(
    conn: &Connection,
    conversation_id: Uuid,
    limit: u32,
) -> StoreResult<Vec<Message>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM messages
         WHERE conversation_id = ?1
         ORDER BY created_at DESC, rowid DESC
         LIMIT ?2",
        MESSAGE_COLUMNS
    ))?;

    let mut messages = stmt
        .query_map(
            rusqlite::params![conversation_id.to_string(), limit],
            message_from_row,
        )?
        .collect::<Result<Vec<_>, _>>()?;

    // Newest-first from the query; callers want oldest-first.
    messages.reverse();
    Ok(messages)
}

fn insert_message(
    conn: &Connection,
    conversation_id: Uuid,
    sender_id: Uuid,
    content: &str,
    is_opening_message: bool,
    created_at: &chrono::DateTime<chrono::Utc>,
) -> StoreResult<Message> {
    let id = Uuid::new_v4();
    conn.execute(
        "INSERT INTO messages (id, conversation_id, sender_id, content, is_opening_message, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![
            id.to_string(),
            conversation_id.to_string(),
            sender_id.to_string(),
            content,
            is_opening_message,
            format_timestamp(created_at)
        ],
    )?;

    Ok(Message {
        id,
        conversation_id,
        sender_id,
        content: content.to_string(),
        is_opening_message,
        created_at: *created_at,
    })
}
