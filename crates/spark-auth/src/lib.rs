//! External identity provider capability.
//!
//! The service never owns credentials. A bearer token is handed to an
//! [`IdentityProvider`], which either resolves it to a stable external id
//! or fails. The local user table is keyed by that id.

pub mod jwt;
pub mod memory;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

pub use jwt::{JwtConfig, JwtIdentityProvider};
pub use memory::StaticIdentityProvider;

/// Display metadata the provider holds for an identity.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ExternalUser {
    pub uid: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub display_name: String,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid or expired token")]
    InvalidToken,

    #[error("unknown identity: {0}")]
    UnknownIdentity(String),

    #[error("identity provider unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Resolve a bearer credential to the provider's stable user id.
    async fn verify_token(&self, token: &str) -> Result<String, AuthError>;

    /// Fetch display metadata for an external id. Only used by user sync.
    async fn get_user(&self, uid: &str) -> Result<ExternalUser, AuthError>;
}

/// Extract the credential from an `Authorization: Bearer <token>` value.
/// The scheme is matched case-insensitively.
pub fn bearer_token(header_value: &str) -> Option<&str> {
    let mut fields = header_value.split_whitespace();
    let scheme = fields.next()?;
    let token = fields.next()?;
    if !scheme.eq_ignore_ascii_case("bearer") || fields.next().is_some() {
        return None;
    }
    Some(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_token_parsing() {
        assert_eq!(bearer_token("Bearer abc"), Some("abc"));
        assert_eq!(bearer_token("bearer   abc"), Some("abc"));
        assert_eq!(bearer_token("Basic abc"), None);
        assert_eq!(bearer_token("Bearer"), None);
        assert_eq!(bearer_token("Bearer a b"), None);
        assert_eq!(bearer_token(""), None);
    }
}
