use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use spark_auth::jwt::JwtConfig;

/// Placeholder secrets that must never reach production.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me",
    "change-me-to-a-random-string",
    "dev-secret-change-me",
];

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub idp: JwtConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from any key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let secret = get("SPARK_IDP_SECRET").unwrap_or_default();
        if secret.is_empty() || PLACEHOLDER_SECRETS.contains(&secret.as_str()) {
            bail!("SPARK_IDP_SECRET is unset or still a placeholder");
        }

        let port = match get("SPARK_PORT") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("SPARK_PORT is not a valid port: {}", raw))?,
            None => 8080,
        };

        Ok(Self {
            host: get("SPARK_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            db_path: get("SPARK_DB_PATH").unwrap_or_else(|| "spark.db".into()).into(),
            idp: JwtConfig {
                secret,
                issuer: get("SPARK_IDP_ISSUER"),
                audience: get("SPARK_IDP_AUDIENCE"),
                user_url: get("SPARK_IDP_USER_URL"),
            },
        })
    }

    pub fn addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", self.host, self.port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_only_secret_is_set() {
        let cfg = config(&[("SPARK_IDP_SECRET", "s3cret")]).unwrap();
        assert_eq!(cfg.host, "0.0.0.0");
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.db_path, PathBuf::from("spark.db"));
        assert!(cfg.idp.issuer.is_none());
        assert!(cfg.idp.user_url.is_none());
        assert_eq!(cfg.addr().unwrap().port(), 8080);
    }

    #[test]
    fn missing_or_placeholder_secret_is_rejected() {
        assert!(config(&[]).is_err());
        assert!(config(&[("SPARK_IDP_SECRET", "  ")]).is_err());
        assert!(config(&[("SPARK_IDP_SECRET", "dev-secret-change-me")]).is_err());
    }

    #[test]
    fn overrides_are_read() {
        let cfg = config(&[
            ("SPARK_IDP_SECRET", "s3cret"),
            ("SPARK_HOST", "127.0.0.1"),
            ("SPARK_PORT", "9000"),
            ("SPARK_DB_PATH", "/tmp/x.db"),
            ("SPARK_IDP_ISSUER", "https://idp.example"),
            ("SPARK_IDP_AUDIENCE", "spark"),
        ])
        .unwrap();
        assert_eq!(cfg.addr().unwrap().to_string(), "127.0.0.1:9000");
        assert_eq!(cfg.db_path, PathBuf::from("/tmp/x.db"));
        assert_eq!(cfg.idp.issuer.as_deref(), Some("https://idp.example"));
        assert_eq!(cfg.idp.audience.as_deref(), Some("spark"));
    }

    #[test]
    fn bad_port_is_an_error() {
        assert!(config(&[("SPARK_IDP_SECRET", "s3cret"), ("SPARK_PORT", "http")]).is_err());
    }
}
