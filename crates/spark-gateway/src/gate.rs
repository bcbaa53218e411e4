use std::sync::Arc;

use thiserror::Error;
use tracing::{error, warn};
use uuid::Uuid;

use spark_auth::{AuthError, IdentityProvider};
use spark_db::Database;

/// Proof that a viewer may watch a conversation. Only [`AccessGate::admit`]
/// produces one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    pub conversation_id: Uuid,
    pub user_id: Uuid,
}

#[derive(Debug, Error)]
pub enum GateError {
    #[error("invalid credential")]
    Unauthenticated,

    #[error("user not found")]
    UnknownUser,

    #[error("not a participant of this conversation")]
    NotParticipant,

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Authorizes real-time subscriptions before anything touches the hub.
#[derive(Clone)]
pub struct AccessGate {
    db: Arc<Database>,
    identity: Arc<dyn IdentityProvider>,
}

impl AccessGate {
    pub fn new(db: Arc<Database>, identity: Arc<dyn IdentityProvider>) -> Self {
        Self { db, identity }
    }

    /// Credential -> external id -> local user -> membership.
    pub async fn admit(&self, token: &str, conversation_id: Uuid) -> Result<Admission, GateError> {
        if token.is_empty() {
            return Err(GateError::Unauthenticated);
        }

        let external_uid = self.identity.verify_token(token).await.map_err(|e| match e {
            AuthError::Unavailable(reason) => {
                error!("Identity provider unavailable during admission: {}", reason);
                GateError::Internal(anyhow::anyhow!("identity provider unavailable"))
            }
            other => {
                warn!("Rejected chat subscription for {}: {}", conversation_id, other);
                GateError::Unauthenticated
            }
        })?;

        let db = self.db.clone();
        let lookup = tokio::task::spawn_blocking(move || -> anyhow::Result<Option<(Uuid, bool)>> {
            let Some(user) = db.get_user_by_external_uid(&external_uid)? else {
                return Ok(None);
            };
            let member = db.is_participant(conversation_id, user.id)?;
            Ok(Some((user.id, member)))
        })
        .await
        .map_err(|e| anyhow::anyhow!("spawn_blocking join error: {}", e))??;

        match lookup {
            None => Err(GateError::UnknownUser),
            Some((user_id, false)) => {
                warn!("User {} is not part of conversation {}", user_id, conversation_id);
                Err(GateError::NotParticipant)
            }
            Some((user_id, true)) => Ok(Admission {
                conversation_id,
                user_id,
            }),
        }
    }
}
