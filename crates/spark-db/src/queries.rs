use anyhow::Result;
use rusqlite::Connection;
use uuid::Uuid;

use spark_types::models::User;

use crate::Database;
use crate::models::{OptionalExt, USER_COLUMNS, format_timestamp, now, user_from_row};

impl Database {
    // -- Users --

    /// Insert a user for `external_uid` unless one already exists.
    /// Returns the stored user and whether this call created it.
    pub fn insert_user_if_absent(
        &self,
        external_uid: &str,
        email: &str,
        display_name: &str,
    ) -> Result<(User, bool)> {
        self.transaction(|tx| {
            let ts = format_timestamp(&now());
            let inserted = tx.execute(
                "INSERT INTO users (id, external_uid, email, display_name, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)
                 ON CONFLICT (external_uid) DO NOTHING",
                rusqlite::params![
                    Uuid::new_v4().to_string(),
                    external_uid,
                    email,
                    display_name,
                    ts
                ],
            )?;

            let user = query_user_by_external_uid(tx, external_uid)?
                .ok_or_else(|| anyhow::anyhow!("user {} vanished after insert", external_uid))?;
            Ok((user, inserted > 0))
        })
    }

    pub fn get_user_by_external_uid(&self, external_uid: &str) -> Result<Option<User>> {
        self.with_conn(|conn| query_user_by_external_uid(conn, external_uid))
    }

    pub fn get_user_by_id(&self, id: Uuid) -> Result<Option<User>> {
        self.with_conn(|conn| query_user_by_id(conn, id))
    }
}

fn query_user_by_external_uid(conn: &Connection, external_uid: &str) -> Result<Option<User>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM users WHERE external_uid = ?1",
        USER_COLUMNS
    ))?;

    stmt.query_row([external_uid], user_from_row).optional()
}

pub(crate) fn query_user_by_id(conn: &Connection, id: Uuid) -> Result<Option<User>> {
    let mut stmt = conn.prepare(&format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS))?;

    stmt.query_row([id.to_string()], user_from_row).optional()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_creates_once_then_returns_existing() {
        let db = Database::open_in_memory().unwrap();

        let (first, created) = db
            .insert_user_if_absent("firebase-42", "ada@example.com", "Ada")
            .unwrap();
        assert!(created);

        let (second, created_again) = db
            .insert_user_if_absent("firebase-42", "other@example.com", "Other")
            .unwrap();
        assert!(!created_again);
        assert_eq!(first.id, second.id);
        assert_eq!(second.display_name, "Ada");
    }

    #[test]
    fn lookup_by_id_and_external_uid() {
        let db = Database::open_in_memory().unwrap();
        let (user, _) = db.insert_user_if_absent("ext-7", "", "Grace").unwrap();

        let by_id = db.get_user_by_id(user.id).unwrap().unwrap();
        assert_eq!(by_id.external_uid, "ext-7");

        assert!(db.get_user_by_external_uid("nobody").unwrap().is_none());
        assert!(db.get_user_by_id(Uuid::new_v4()).unwrap().is_none());
    }
}
