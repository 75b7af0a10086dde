//! The token endpoint: client authentication plus the `authorization_code`
//! and `refresh_token` grants.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::client::{ClientRecord, ClientType};
use crate::config::EngineConfig;
use crate::error::{ErrorCode, OAuthError};
use crate::models::AccessToken;
use crate::scope::ScopeSet;
use crate::storage::{Storage, StorageError};
use crate::tokens::generate_access_token;

/// Credentials from an HTTP Basic `Authorization` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicCredentials {
    pub client_id: String,
    pub secret: String,
}

/// Raw token request parameters. Validation happens in the engine, after
/// the client has been authenticated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenRequest {
    pub grant_type: Option<String>,
    pub client_id: Option<String>,
    pub code: Option<String>,
    pub redirect_uri: Option<String>,
    pub refresh_token: Option<String>,
    pub scope: Option<String>,
}

impl TokenRequest {
    pub fn from_params(params: &HashMap<String, String>) -> Self {
        let get = |name: &str| params.get(name).filter(|v| !v.is_empty()).cloned();
        Self {
            grant_type: get("grant_type"),
            client_id: get("client_id"),
            code: get("code"),
            redirect_uri: get("redirect_uri"),
            refresh_token: get("refresh_token"),
            scope: get("scope"),
        }
    }
}

/// Successful token response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub expires_in: i64,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub scope: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub token_type: &'static str,
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error(transparent)]
    OAuth(#[from] OAuthError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Exact comparison that does not leak where the two secrets first differ.
fn secrets_match(stored: &str, presented: &str) -> bool {
    stored.as_bytes().ct_eq(presented.as_bytes()).into()
}

fn oauth(code: ErrorCode, description: &str) -> TokenError {
    TokenError::OAuth(OAuthError::new(code, description))
}

pub struct TokenEngine {
    storage: Arc<dyn Storage>,
    config: EngineConfig,
}

impl TokenEngine {
    pub fn new(storage: Arc<dyn Storage>, config: EngineConfig) -> Self {
        Self { storage, config }
    }

    pub async fn handle(
        &self,
        request: &TokenRequest,
        credentials: Option<&BasicCredentials>,
    ) -> Result<TokenResponse, TokenError> {
        self.handle_at(request, credentials, Utc::now()).await
    }

    /// [`TokenEngine::handle`] against a fixed clock.
    pub async fn handle_at(
        &self,
        request: &TokenRequest,
        credentials: Option<&BasicCredentials>,
        now: DateTime<Utc>,
    ) -> Result<TokenResponse, TokenError> {
        let client = self.authenticate_client(request, credentials).await?;

        match request.grant_type.as_deref() {
            None => Err(oauth(
                ErrorCode::InvalidRequest,
                "the grant_type parameter is missing",
            )),
            Some("authorization_code") => self.authorization_code_grant(&client, request, now).await,
            Some("refresh_token") => self.refresh_token_grant(&client, request, now).await,
            Some(_) => Err(oauth(
                ErrorCode::UnsupportedGrantType,
                "the requested grant type is not supported",
            )),
        }
    }

    async fn authenticate_client(
        &self,
        request: &TokenRequest,
        credentials: Option<&BasicCredentials>,
    ) -> Result<ClientRecord, TokenError> {
        let client = match credentials {
            Some(credentials) => {
                let client = self
                    .storage
                    .get_client(&credentials.client_id)
                    .await?
                    .filter(|c| {
                        c.secret()
                            .is_some_and(|stored| secrets_match(stored, &credentials.secret))
                    })
                    .ok_or_else(|| {
                        tracing::info!(client_id = %credentials.client_id, "client authentication failed");
                        oauth(ErrorCode::InvalidClient, "client authentication failed")
                    })?;
                if request
                    .client_id
                    .as_deref()
                    .is_some_and(|id| id != client.id())
                {
                    return Err(oauth(
                        ErrorCode::InvalidClient,
                        "client_id does not match authenticated client",
                    ));
                }
                client
            }
            None => {
                let client_id = request.client_id.as_deref().ok_or_else(|| {
                    oauth(ErrorCode::InvalidClient, "client authentication required")
                })?;
                let client = self
                    .storage
                    .get_client(client_id)
                    .await?
                    .ok_or_else(|| oauth(ErrorCode::InvalidClient, "client not registered"))?;
                if client.client_type() == ClientType::WebApplication {
                    return Err(oauth(
                        ErrorCode::InvalidClient,
                        "client authentication required",
                    ));
                }
                client
            }
        };

        if client.client_type() == ClientType::UserAgentBasedApplication {
            return Err(oauth(
                ErrorCode::UnauthorizedClient,
                "this client type is not allowed to use the token endpoint",
            ));
        }
        Ok(client)
    }

    async fn authorization_code_grant(
        &self,
        client: &ClientRecord,
        request: &TokenRequest,
        now: DateTime<Utc>,
    ) -> Result<TokenResponse, TokenError> {
        let value = request
            .code
            .as_deref()
            .ok_or_else(|| oauth(ErrorCode::InvalidRequest, "the code parameter is missing"))?;
        let redirect_uri = request.redirect_uri.as_deref();

        let code = self
            .storage
            .get_authorization_code(client.id(), value, redirect_uri)
            .await?
            .ok_or_else(|| oauth(ErrorCode::InvalidGrant, "the authorization code was not found"))?;

        if code.is_expired_at(now) {
            return Err(oauth(
                ErrorCode::InvalidGrant,
                "the authorization code expired",
            ));
        }

        if !self
            .storage
            .delete_authorization_code(client.id(), value, redirect_uri)
            .await?
        {
            tracing::warn!(client_id = %client.id(), "authorization code replayed");
            return Err(oauth(
                ErrorCode::InvalidGrant,
                "the authorization code was already used",
            ));
        }

        let refresh_token = self
            .storage
            .get_approval(client.id(), &code.resource_owner_id)
            .await?
            .and_then(|approval| approval.refresh_token);

        let mut response = self
            .mint(client, &code.resource_owner_id, &code.scope, now)
            .await?;
        response.refresh_token = refresh_token;
        Ok(response)
    }

    async fn refresh_token_grant(
        &self,
        client: &ClientRecord,
        request: &TokenRequest,
        now: DateTime<Utc>,
    ) -> Result<TokenResponse, TokenError> {
        let refresh_token = request.refresh_token.as_deref().ok_or_else(|| {
            oauth(
                ErrorCode::InvalidRequest,
                "the refresh_token parameter is missing",
            )
        })?;

        let approval = self
            .storage
            .get_approval_by_refresh_token(client.id(), refresh_token)
            .await?
            .ok_or_else(|| oauth(ErrorCode::InvalidGrant, "the refresh_token was not found"))?;

        // Narrowing only. Anything else falls back to the approved scope.
        let scope = match request.scope.as_deref().map(ScopeSet::parse) {
            Some(Ok(requested)) if requested.is_subset_of(&approval.scope) => requested,
            _ => approval.scope.clone(),
        };

        self.mint(client, &approval.resource_owner_id, &scope, now)
            .await
    }

    async fn mint(
        &self,
        client: &ClientRecord,
        owner_id: &str,
        scope: &ScopeSet,
        now: DateTime<Utc>,
    ) -> Result<TokenResponse, TokenError> {
        let token = AccessToken {
            token: generate_access_token(),
            client_id: client.id().to_string(),
            resource_owner_id: owner_id.to_string(),
            scope: scope.clone(),
            issue_time: now,
            expires_in: self.config.access_token_expiry,
        };
        self.storage.store_access_token(&token).await?;
        tracing::debug!(client_id = %client.id(), owner = owner_id, "issued access token");

        Ok(TokenResponse {
            access_token: token.token,
            expires_in: token.expires_in,
            scope: token.scope.to_string(),
            refresh_token: None,
            token_type: "bearer",
        })
    }
}
