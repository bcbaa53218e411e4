//! Onboarding profiles and the shared interest vocabulary.

use anyhow::Result;
use rusqlite::Connection;
use tracing::info;
use uuid::Uuid;

use spark_types::models::Profile;

use crate::Database;
use crate::error::{StoreError, StoreResult};
use crate::models::{OptionalExt, format_timestamp, now};
use crate::queries::query_user_by_id;

impl Database {
    /// Create or replace the profile of `user_id`. The user's interest links
    /// are rebuilt from `general_interests` in the same unit of work; unknown
    /// interest names are added to the shared vocabulary.
    pub fn upsert_profile(&self, user_id: Uuid, profile: &Profile) -> StoreResult<Profile> {
        if profile.gender.trim().is_empty() {
            return Err(StoreError::InvalidInput("gender is required"));
        }
        if profile.opening_question.trim().is_empty() {
            return Err(StoreError::InvalidInput("opening question is required"));
        }
        let orientation =
            serde_json::to_string(&profile.sexual_orientation).map_err(anyhow::Error::from)?;

        self.transaction(|tx| {
            if query_user_by_id(tx, user_id)?.is_none() {
                return Err(StoreError::NotFound);
            }

            let ts = format_timestamp(&now());
            tx.execute(
                "INSERT INTO profiles (user_id, gender, pronouns, sexual_orientation,
                                       opening_question, dealbreakers, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
                 ON CONFLICT (user_id) DO UPDATE SET
                     gender = excluded.gender,
                     pronouns = excluded.pronouns,
                     sexual_orientation = excluded.sexual_orientation,
                     opening_question = excluded.opening_question,
                     dealbreakers = excluded.dealbreakers,
                     updated_at = excluded.updated_at",
                rusqlite::params![
                    user_id.to_string(),
                    profile.gender,
                    profile.pronouns,
                    orientation,
                    profile.opening_question,
                    profile.dealbreakers,
                    ts
                ],
            )?;

            tx.execute(
                "DELETE FROM user_interests WHERE user_id = ?1",
                [user_id.to_string()],
            )?;

            for name in &profile.general_interests {
                let name = name.trim();
                if name.is_empty() {
                    continue;
                }
                tx.execute(
                    "INSERT INTO interests (name) VALUES (?1) ON CONFLICT (name) DO NOTHING",
                    [name],
                )?;
                let interest_id: i64 =
                    tx.query_row("SELECT id FROM interests WHERE name = ?1", [name], |r| {
                        r.get(0)
                    })?;
                tx.execute(
                    "INSERT INTO user_interests (user_id, interest_id) VALUES (?1, ?2)
                     ON CONFLICT DO NOTHING",
                    rusqlite::params![user_id.to_string(), interest_id],
                )?;
            }

            info!("Stored profile for user {}", user_id);
            query_profile(tx, user_id)?.ok_or_else(|| {
                StoreError::Internal(anyhow::anyhow!("profile {} vanished after upsert", user_id))
            })
        })
    }

    pub fn get_profile_by_user_id(&self, user_id: Uuid) -> Result<Option<Profile>> {
        self.with_conn(|conn| query_profile(conn, user_id))
    }
}

fn query_profile(conn: &Connection, user_id: Uuid) -> Result<Option<Profile>> {
    let row = conn
        .query_row(
            "SELECT gender, pronouns, sexual_orientation, opening_question, dealbreakers
             FROM profiles WHERE user_id = ?1",
            [user_id.to_string()],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            },
        )
        .optional()?;

    let Some((gender, pronouns, orientation, opening_question, dealbreakers)) = row else {
        return Ok(None);
    };

    // Interests come back in the order they were linked
    let mut stmt = conn.prepare(
        "SELECT i.name FROM user_interests ui
         JOIN interests i ON i.id = ui.interest_id
         WHERE ui.user_id = ?1
         ORDER BY ui.rowid",
    )?;
    let general_interests = stmt
        .query_map([user_id.to_string()], |r| r.get(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;

    Ok(Some(Profile {
        gender,
        pronouns,
        sexual_orientation: serde_json::from_str(&orientation)?,
        general_interests,
        opening_question,
        dealbreakers,
    }))
}
