use std::sync::Arc;

use tracing::error;

use spark_auth::IdentityProvider;
use spark_db::Database;
use spark_gateway::gate::AccessGate;
use spark_gateway::hub::Hub;

use crate::error::ApiError;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub identity: Arc<dyn IdentityProvider>,
    pub hub: Hub,
    pub gate: AccessGate,
}

impl AppStateInner {
    /// The hub is passed in so its lifetime is owned by whoever starts the
    /// server, not by a global.
    pub fn new(db: Arc<Database>, identity: Arc<dyn IdentityProvider>, hub: Hub) -> AppState {
        let gate = AccessGate::new(db.clone(), identity.clone());
        Arc::new(Self {
            db,
            identity,
            hub,
            gate,
        })
    }
}

/// Run blocking DB work off the async runtime.
pub(crate) async fn blocking<F, T, E>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, E> + Send + 'static,
    T: Send + 'static,
    E: Into<ApiError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal(anyhow::anyhow!("blocking task failed"))
        })?
        .map_err(Into::into)
}
