pub mod conversations;
pub mod error;
pub mod migrations;
pub mod models;
pub mod profiles;
pub mod queries;

use anyhow::Result;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::info;

pub use error::{StoreError, StoreResult};

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        // WAL mode for concurrent reads
        conn.pragma_update(None, "journal_mode", "WAL")?;

        let db = Self::init(conn)?;
        info!("Database opened at {}", path.display());
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrations::run(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))
    }

    pub fn with_conn<F, T, E>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&Connection) -> std::result::Result<T, E>,
        E: From<anyhow::Error>,
    {
        let conn = self.lock()?;
        f(&conn)
    }

    /// Unit of work: runs `f` inside an IMMEDIATE transaction.
    ///
    /// Commits when `f` returns `Ok`. Any `Err` (or a panic) drops the
    /// transaction, which rolls it back. IMMEDIATE takes the write lock at
    /// BEGIN, so read-then-write steps inside `f` never act on stale rows.
    pub fn transaction<F, T, E>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&Transaction<'_>) -> std::result::Result<T, E>,
        E: From<anyhow::Error> + From<rusqlite::Error>,
    {
        self.transaction_then(f, |_| {})
    }

    /// [`Database::transaction`], then `after_commit` on the committed value
    /// while the connection is still locked. Hooks of successive units of
    /// work therefore run in commit order. Not called when `f` fails.
    pub fn transaction_then<F, G, T, E>(&self, f: F, after_commit: G) -> std::result::Result<T, E>
    where
        F: FnOnce(&Transaction<'_>) -> std::result::Result<T, E>,
        G: FnOnce(&T),
        E: From<anyhow::Error> + From<rusqlite::Error>,
    {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = f(&tx)?;
        tx.commit()?;
        after_commit(&value);
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_unit_of_work_leaves_no_trace() {
        let db = Database::open_in_memory().unwrap();

        let result: Result<()> = db.transaction(|tx| {
            tx.execute(
                "INSERT INTO users (id, external_uid, created_at, updated_at)
                 VALUES ('u1', 'ext-1', 'now', 'now')",
                [],
            )?;
            anyhow::bail!("step two failed")
        });
        assert!(result.is_err());

        let count: i64 = db
            .with_conn(|conn| {
                conn.query_row("SELECT COUNT(*) FROM users", [], |r| r.get(0))
                    .map_err(anyhow::Error::from)
            })
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn file_backed_database_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spark.db");

        {
            let db = Database::open(&path).unwrap();
            db.insert_user_if_absent("ext-1", "a@example.com", "Ada").unwrap();
        }

        let db = Database::open(&path).unwrap();
        let user = db.get_user_by_external_uid("ext-1").unwrap();
        assert_eq!(user.map(|u| u.display_name), Some("Ada".to_string()));
    }
}
