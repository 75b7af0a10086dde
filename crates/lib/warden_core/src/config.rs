//! Engine configuration.

use thiserror::Error;

/// Default access token lifetime in seconds.
pub const DEFAULT_ACCESS_TOKEN_EXPIRY_SECS: i64 = 3600;

/// Longest access token lifetime accepted: one year.
pub const MAX_ACCESS_TOKEN_EXPIRY_SECS: i64 = 365 * 24 * 60 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error(
    "access token expiry must be between 1 and {MAX_ACCESS_TOKEN_EXPIRY_SECS} seconds, got {0}"
)]
pub struct InvalidExpiry(pub i64);

/// Check an access token lifetime, in seconds.
pub fn validate_access_token_expiry(secs: i64) -> Result<i64, InvalidExpiry> {
    if (1..=MAX_ACCESS_TOKEN_EXPIRY_SECS).contains(&secs) {
        Ok(secs)
    } else {
        Err(InvalidExpiry(secs))
    }
}

/// Knobs shared by the authorize and token engines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Lifetime of issued access tokens, in seconds.
    pub access_token_expiry: i64,
    /// Treat registered redirect URIs as anchored regular expressions.
    pub allow_regex_redirect_uri: bool,
    /// Register unknown implicit-grant clients whose id and redirect URI
    /// share a host (remoteStorage-style applications).
    pub allow_remote_storage_clients: bool,
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), InvalidExpiry> {
        validate_access_token_expiry(self.access_token_expiry).map(|_| ())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            access_token_expiry: DEFAULT_ACCESS_TOKEN_EXPIRY_SECS,
            allow_regex_redirect_uri: false,
            allow_remote_storage_clients: false,
        }
    }
}
