use std::collections::HashMap;

use async_trait::async_trait;

use crate::{AuthError, ExternalUser, IdentityProvider};

/// Fixed token table. For local development and tests.
#[derive(Debug, Default, Clone)]
pub struct StaticIdentityProvider {
    tokens: HashMap<String, String>,
    users: HashMap<String, ExternalUser>,
}

impl StaticIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `token` as a credential for `user`.
    pub fn with_user(mut self, token: &str, user: ExternalUser) -> Self {
        self.tokens.insert(token.to_string(), user.uid.clone());
        self.users.insert(user.uid.clone(), user);
        self
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentityProvider {
    async fn verify_token(&self, token: &str) -> Result<String, AuthError> {
        self.tokens.get(token).cloned().ok_or(AuthError::InvalidToken)
    }

    async fn get_user(&self, uid: &str) -> Result<ExternalUser, AuthError> {
        self.users
            .get(uid)
            .cloned()
            .ok_or_else(|| AuthError::UnknownIdentity(uid.to_string()))
    }
}
