use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (users, conversations, messages)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id              TEXT PRIMARY KEY,
                external_uid    TEXT NOT NULL UNIQUE,
                email           TEXT NOT NULL DEFAULT '',
                display_name    TEXT NOT NULL DEFAULT '',
                created_at      TEXT NOT NULL,
                updated_at      TEXT NOT NULL
            );

            -- user_a_id is always the smaller id, so one row per pair
            CREATE TABLE conversations (
                id              TEXT PRIMARY KEY,
                user_a_id       TEXT NOT NULL REFERENCES users(id),
                user_b_id       TEXT NOT NULL REFERENCES users(id),
                status          TEXT NOT NULL DEFAULT 'pending'
                                CHECK (status IN ('pending', 'active', 'blocked')),
                message_count   INTEGER NOT NULL DEFAULT 0,
                photos_unlocked INTEGER NOT NULL DEFAULT 0,
                names_unlocked  INTEGER NOT NULL DEFAULT 0,
                created_at      TEXT NOT NULL,
                updated_at      TEXT NOT NULL,
                UNIQUE (user_a_id, user_b_id),
                CHECK (user_a_id < user_b_id)
            );

            CREATE INDEX idx_conversations_user_b
                ON conversations(user_b_id);

            CREATE TABLE messages (
                id                  TEXT PRIMARY KEY,
                conversation_id     TEXT NOT NULL REFERENCES conversations(id),
                sender_id           TEXT NOT NULL REFERENCES users(id),
                content             TEXT NOT NULL,
                is_opening_message  INTEGER NOT NULL DEFAULT 0,
                created_at          TEXT NOT NULL
            );

            CREATE INDEX idx_messages_conversation
                ON messages(conversation_id, created_at);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    if version < 2 {
        info!("Running migration v2 (profiles, interests)");
        conn.execute_batch(
            "
            CREATE TABLE profiles (
                user_id             TEXT PRIMARY KEY REFERENCES users(id),
                gender              TEXT NOT NULL,
                pronouns            TEXT NOT NULL DEFAULT '',
                sexual_orientation  TEXT NOT NULL DEFAULT '[]',
                opening_question    TEXT NOT NULL,
                dealbreakers        TEXT NOT NULL DEFAULT '',
                created_at          TEXT NOT NULL,
                updated_at          TEXT NOT NULL
            );

            CREATE TABLE interests (
                id      INTEGER PRIMARY KEY AUTOINCREMENT,
                name    TEXT NOT NULL UNIQUE
            );

            CREATE TABLE user_interests (
                user_id     TEXT NOT NULL REFERENCES users(id),
                interest_id INTEGER NOT NULL REFERENCES interests(id),
                PRIMARY KEY (user_id, interest_id)
            );

            INSERT INTO schema_version (version) VALUES (2);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
