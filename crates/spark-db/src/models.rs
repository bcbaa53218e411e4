//! Row mapping between SQLite columns and `spark-types` models.
//!
//! Ids are stored as hyphenated lowercase UUID text and timestamps as
//! fixed-width RFC 3339 UTC text, so `ORDER BY created_at` is chronological.

use anyhow::Result;
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use rusqlite::Row;
use rusqlite::types::Type;
use uuid::Uuid;

use spark_types::models::{Conversation, ConversationStatus, Message, User};

pub(crate) const USER_COLUMNS: &str =
    "id, external_uid, email, display_name, created_at, updated_at";

pub(crate) const CONVERSATION_COLUMNS: &str = "id, user_a_id, user_b_id, status, message_count, \
     photos_unlocked, names_unlocked, created_at, updated_at";

pub(crate) const MESSAGE_COLUMNS: &str =
    "id, conversation_id, sender_id, content, is_opening_message, created_at";

/// Current time, truncated to the precision the column keeps.
pub(crate) fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

pub(crate) fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn conversion_error(
    idx: usize,
    e: impl Into<Box<dyn std::error::Error + Send + Sync>>,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into())
}

pub(crate) fn column_uuid(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e| conversion_error(idx, e))
}

pub(crate) fn column_opt_uuid(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Uuid>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| s.parse().map_err(|e| conversion_error(idx, e)))
        .transpose()
}

fn parse_timestamp(raw: &str) -> std::result::Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(raw).map(|dt| dt.with_timezone(&Utc))
}

pub(crate) fn column_timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_timestamp(&raw).map_err(|e| conversion_error(idx, e))
}

pub(crate) fn column_opt_timestamp(
    row: &Row<'_>,
    idx: usize,
) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| parse_timestamp(&s).map_err(|e| conversion_error(idx, e)))
        .transpose()
}

pub(crate) fn column_status(row: &Row<'_>, idx: usize) -> rusqlite::Result<ConversationStatus> {
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e: String| conversion_error(idx, e))
}

/// Expects `USER_COLUMNS` order.
pub(crate) fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: column_uuid(row, 0)?,
        external_uid: row.get(1)?,
        email: row.get(2)?,
        display_name: row.get(3)?,
        created_at: column_timestamp(row, 4)?,
        updated_at: column_timestamp(row, 5)?,
    })
}

/// Expects `CONVERSATION_COLUMNS` order.
pub(crate) fn conversation_from_row(row: &Row<'_>) -> rusqlite::Result<Conversation> {
    Ok(Conversation {
        id: column_uuid(row, 0)?,
        user_a_id: column_uuid(row, 1)?,
        user_b_id: column_uuid(row, 2)?,
        status: column_status(row, 3)?,
        message_count: row.get(4)?,
        photos_unlocked: row.get(5)?,
        names_unlocked: row.get(6)?,
        created_at: column_timestamp(row, 7)?,
        updated_at: column_timestamp(row, 8)?,
    })
}

/// Expects `MESSAGE_COLUMNS` order.
pub(crate) fn message_from_row(row: &Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: column_uuid(row, 0)?,
        conversation_id: column_uuid(row, 1)?,
        sender_id: column_uuid(row, 2)?,
        content: row.get(3)?,
        is_opening_message: row.get(4)?,
        created_at: column_timestamp(row, 5)?,
    })
}

/// Extension trait for optional query results
pub(crate) trait OptionalExt<T> {
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
