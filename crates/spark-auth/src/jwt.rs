use async_trait::async_trait;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::{AuthError, ExternalUser, IdentityProvider};

/// Claims we read from a provider-issued ID token.
#[derive(Debug, Deserialize)]
struct IdTokenClaims {
    sub: String,
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// HS256 secret shared with the identity provider.
    pub secret: String,
    pub issuer: Option<String>,
    pub audience: Option<String>,
    /// Base URL for profile lookups; `GET {user_url}/{uid}` must return an
    /// [`ExternalUser`] JSON body.
    pub user_url: Option<String>,
}

/// Verifies HS256 ID tokens locally and, when configured, looks up profile
/// metadata over HTTP.
pub struct JwtIdentityProvider {
    key: DecodingKey,
    validation: Validation,
    user_url: Option<String>,
    http: reqwest::Client,
}

impl JwtIdentityProvider {
    pub fn new(config: JwtConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        if let Some(issuer) = &config.issuer {
            validation.set_issuer(&[issuer]);
        }
        match &config.audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }

        Self {
            key: DecodingKey::from_secret(config.secret.as_bytes()),
            validation,
            user_url: config.user_url.map(|url| url.trim_end_matches('/').to_string()),
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl IdentityProvider for JwtIdentityProvider {
    async fn verify_token(&self, token: &str) -> Result<String, AuthError> {
        let data = decode::<IdTokenClaims>(token, &self.key, &self.validation).map_err(|e| {
            debug!("Rejected ID token: {}", e);
            AuthError::InvalidToken
        })?;

        if data.claims.sub.is_empty() {
            return Err(AuthError::InvalidToken);
        }
        Ok(data.claims.sub)
    }

    async fn get_user(&self, uid: &str) -> Result<ExternalUser, AuthError> {
        let Some(base) = &self.user_url else {
            // No profile endpoint: the id is all we know.
            return Ok(ExternalUser {
                uid: uid.to_string(),
                email: String::new(),
                display_name: String::new(),
            });
        };

        let url = format!("{}/{}", base, uid);
        let response = self.http.get(&url).send().await.map_err(|e| {
            warn!("Identity lookup for {} failed: {}", uid, e);
            AuthError::Unavailable(e.to_string())
        })?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(AuthError::UnknownIdentity(uid.to_string())),
            status if !status.is_success() => {
                warn!("Identity lookup for {} returned {}", uid, status);
                Err(AuthError::Unavailable(format!("provider returned {}", status)))
            }
            _ => response
                .json::<ExternalUser>()
                .await
                .map_err(|e| AuthError::Unavailable(e.to_string())),
        }
    }
}
