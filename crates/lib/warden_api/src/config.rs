//! API server configuration.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use warden_core::config::{
    DEFAULT_ACCESS_TOKEN_EXPIRY_SECS, EngineConfig, InvalidExpiry, validate_access_token_expiry,
};
use warden_core::owner::{
    ResourceOwnerProvider, StaticOwnerProvider, TrustedHeaderOwnerProvider, parse_entitlement_map,
};

/// Configuration for the API server.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    /// Address to bind the HTTP listener (e.g. "127.0.0.1:8080").
    pub bind_addr: String,
    /// PostgreSQL connection URL.
    pub pg_connection_url: String,
    /// Externally visible base URL; request URIs for the referer check are
    /// rebuilt against it.
    pub public_base_url: String,
    /// Header carrying the identity asserted by a fronting proxy.
    pub owner_header: String,
    /// Authenticate every request as this owner instead of trusting a header.
    pub static_owner: Option<String>,
    /// Entitlements per owner id.
    pub entitlements: HashMap<String, Vec<String>>,
    /// Access token lifetime in seconds.
    pub access_token_expiry: i64,
    pub allow_regex_redirect_uri: bool,
    pub allow_remote_storage_clients: bool,
}

/// Configuration errors found while reading the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var} must be an integer, got {value:?}")]
    InvalidNumber { var: &'static str, value: String },

    #[error("ACCESS_TOKEN_EXPIRY: {0}")]
    InvalidExpiry(#[from] InvalidExpiry),
}

/// Parse `ACCESS_TOKEN_EXPIRY`; unset means the default lifetime.
fn access_token_expiry(raw: Option<String>) -> Result<i64, ConfigError> {
    let Some(raw) = raw else {
        return Ok(DEFAULT_ACCESS_TOKEN_EXPIRY_SECS);
    };
    let secs = raw.trim().parse().map_err(|_| ConfigError::InvalidNumber {
        var: "ACCESS_TOKEN_EXPIRY",
        value: raw.clone(),
    })?;
    Ok(validate_access_token_expiry(secs)?)
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}

impl ApiConfig {
    /// Reads configuration from environment variables with sensible defaults.
    ///
    /// | Variable                       | Default                           |
    /// |--------------------------------|-----------------------------------|
    /// | `BIND_ADDR`                    | `127.0.0.1:8080`                  |
    /// | `DATABASE_URL`                 | `postgres://localhost:5432/warden`|
    /// | `PUBLIC_BASE_URL`              | `http://<BIND_ADDR>`              |
    /// | `OWNER_HEADER`                 | `X-Remote-User`                   |
    /// | `STATIC_OWNER`                 | unset                             |
    /// | `ENTITLEMENTS`                 | empty (`alice=applications;...`)  |
    /// | `ACCESS_TOKEN_EXPIRY`          | `3600` (1 s to 1 year)            |
    /// | `ALLOW_REGEX_REDIRECT_URI`     | `false`                           |
    /// | `ALLOW_REMOTE_STORAGE_CLIENTS` | `false`                           |
    pub fn from_env() -> Result<Self, ConfigError> {
        let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".into());
        Ok(Self {
            public_base_url: std::env::var("PUBLIC_BASE_URL")
                .unwrap_or_else(|_| format!("http://{bind_addr}")),
            bind_addr,
            pg_connection_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgres://localhost:5432/warden".into()),
            owner_header: std::env::var("OWNER_HEADER")
                .unwrap_or_else(|_| "X-Remote-User".into()),
            static_owner: std::env::var("STATIC_OWNER").ok().filter(|v| !v.is_empty()),
            entitlements: std::env::var("ENTITLEMENTS")
                .map(|v| parse_entitlement_map(&v))
                .unwrap_or_default(),
            access_token_expiry: access_token_expiry(std::env::var("ACCESS_TOKEN_EXPIRY").ok())?,
            allow_regex_redirect_uri: env_flag("ALLOW_REGEX_REDIRECT_URI"),
            allow_remote_storage_clients: env_flag("ALLOW_REMOTE_STORAGE_CLIENTS"),
        })
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            access_token_expiry: self.access_token_expiry,
            allow_regex_redirect_uri: self.allow_regex_redirect_uri,
            allow_remote_storage_clients: self.allow_remote_storage_clients,
        }
    }

    /// The owner provider this configuration asks for.
    pub fn owner_provider(&self) -> Arc<dyn ResourceOwnerProvider> {
        match &self.static_owner {
            Some(owner) => Arc::new(
                StaticOwnerProvider::new(owner.clone())
                    .with_entitlements(self.entitlements.get(owner).cloned().unwrap_or_default()),
            ),
            None => Arc::new(TrustedHeaderOwnerProvider::new(self.entitlements.clone())),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".into(),
            pg_connection_url: "postgres://localhost:5432/warden".into(),
            public_base_url: "http://127.0.0.1:8080".into(),
            owner_header: "X-Remote-User".into(),
            static_owner: None,
            entitlements: HashMap::new(),
            access_token_expiry: DEFAULT_ACCESS_TOKEN_EXPIRY_SECS,
            allow_regex_redirect_uri: false,
            allow_remote_storage_clients: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_token_expiry_is_range_checked() {
        assert_eq!(
            access_token_expiry(None).unwrap(),
            DEFAULT_ACCESS_TOKEN_EXPIRY_SECS
        );
        assert_eq!(access_token_expiry(Some(" 600 ".into())).unwrap(), 600);
        for raw in ["0", "-5", "9223372036854775807", "31536001"] {
            assert!(matches!(
                access_token_expiry(Some(raw.into())),
                Err(ConfigError::InvalidExpiry(_))
            ));
        }
        assert!(matches!(
            access_token_expiry(Some("an hour".into())),
            Err(ConfigError::InvalidNumber { .. })
        ));
    }

    #[tokio::test]
    async fn static_owner_gets_its_entitlements() {
        let config = ApiConfig {
            static_owner: Some("admin".into()),
            entitlements: parse_entitlement_map("admin=applications;bob=admin"),
            ..ApiConfig::default()
        };
        let owner = config.owner_provider().resolve(None).await.unwrap();
        assert_eq!(owner.id, "admin");
        assert!(owner.has_entitlement("applications"));
        assert!(!owner.has_entitlement("admin"));
    }

    #[tokio::test]
    async fn header_owner_requires_an_identity() {
        let owners = ApiConfig::default().owner_provider();
        assert!(owners.resolve(None).await.is_err());
        assert_eq!(owners.resolve(Some("bob")).await.unwrap().id, "bob");
    }
}
