//! Token introspection (RFC 7662 style).

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::storage::{Storage, StorageError};

/// Introspection result. Inactive tokens carry nothing but `active`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Introspection {
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_type: Option<&'static str>,
    #[serde(rename = "x-entitlement", skip_serializing_if = "Option::is_none")]
    pub x_entitlement: Option<String>,
    #[serde(rename = "x-ext", skip_serializing_if = "Option::is_none")]
    pub x_ext: Option<Map<String, Value>>,
}

impl Introspection {
    pub fn inactive() -> Self {
        Self::default()
    }

    /// Entitlements of the token's owner, as a list.
    pub fn entitlements(&self) -> impl Iterator<Item = &str> {
        self.x_entitlement
            .as_deref()
            .unwrap_or_default()
            .split(' ')
            .filter(|e| !e.is_empty())
    }

    pub fn has_scope(&self, token: &str) -> bool {
        self.scope
            .as_deref()
            .is_some_and(|s| s.split(' ').any(|t| t == token))
    }
}

pub struct IntrospectionEngine {
    storage: Arc<dyn Storage>,
}

impl IntrospectionEngine {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    pub async fn introspect(&self, token: &str) -> Result<Introspection, StorageError> {
        self.introspect_at(token, Utc::now()).await
    }

    pub async fn introspect_at(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Introspection, StorageError> {
        let Some(access_token) = self.storage.get_access_token(token).await? else {
            return Ok(Introspection::inactive());
        };
        if !access_token.is_valid_at(now) {
            return Ok(Introspection::inactive());
        }

        let owner = self
            .storage
            .get_resource_owner(&access_token.resource_owner_id)
            .await?;
        let (x_entitlement, x_ext) = match owner {
            Some(owner) => (
                (!owner.entitlements.is_empty()).then(|| owner.entitlements.join(" ")),
                (!owner.ext.is_empty()).then_some(owner.ext),
            ),
            None => (None, None),
        };

        Ok(Introspection {
            active: true,
            exp: access_token.expires_at().map(|t| t.timestamp()),
            iat: Some(access_token.issue_time.timestamp()),
            scope: (!access_token.scope.is_empty()).then(|| access_token.scope.to_string()),
            client_id: Some(access_token.client_id),
            sub: Some(access_token.resource_owner_id),
            token_type: Some("bearer"),
            x_entitlement,
            x_ext,
        })
    }
}
