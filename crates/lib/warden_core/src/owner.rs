//! Resource-owner authentication capability.
//!
//! The engines only ever see a [`ResourceOwner`]. How the owner got
//! authenticated (a fronting proxy, a fixed development identity, ...) is
//! hidden behind [`ResourceOwnerProvider`].

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::models::ResourceOwner;

/// Resource-owner authentication errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OwnerError {
    #[error("Resource owner not authenticated")]
    NotAuthenticated,

    #[error("Invalid resource owner id: {0:?}")]
    InvalidId(String),
}

#[async_trait]
pub trait ResourceOwnerProvider: Send + Sync {
    /// Authenticate the current resource owner and return a stable id.
    ///
    /// `hint` carries whatever the transport extracted on the provider's
    /// behalf, e.g. the value of a trusted identity header.
    async fn authenticate(&self, hint: Option<&str>) -> Result<String, OwnerError>;

    async fn entitlements(&self, owner_id: &str) -> Vec<String>;

    async fn extra_attributes(&self, owner_id: &str) -> Map<String, Value>;

    /// Authenticate and collect everything the server remembers about the
    /// owner.
    async fn resolve(&self, hint: Option<&str>) -> Result<ResourceOwner, OwnerError> {
        let id = self.authenticate(hint).await?;
        if id.is_empty() || !id.bytes().all(|b| (0x20..=0x7e).contains(&b)) {
            return Err(OwnerError::InvalidId(id));
        }
        let entitlements = self.entitlements(&id).await;
        let ext = self.extra_attributes(&id).await;
        Ok(ResourceOwner {
            id,
            entitlements,
            ext,
        })
    }
}

/// Always authenticates the same owner. Meant for development and tests.
#[derive(Debug, Clone)]
pub struct StaticOwnerProvider {
    owner: ResourceOwner,
}

impl StaticOwnerProvider {
    pub fn new(owner_id: impl Into<String>) -> Self {
        Self {
            owner: ResourceOwner::new(owner_id),
        }
    }

    pub fn with_entitlements(mut self, entitlements: Vec<String>) -> Self {
        self.owner.entitlements = entitlements;
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.owner.ext.insert(key.into(), value);
        self
    }
}

#[async_trait]
impl ResourceOwnerProvider for StaticOwnerProvider {
    async fn authenticate(&self, _hint: Option<&str>) -> Result<String, OwnerError> {
        Ok(self.owner.id.clone())
    }

    async fn entitlements(&self, _owner_id: &str) -> Vec<String> {
        self.owner.entitlements.clone()
    }

    async fn extra_attributes(&self, _owner_id: &str) -> Map<String, Value> {
        self.owner.ext.clone()
    }
}

/// Trusts an identity asserted by a fronting proxy.
///
/// The dispatcher passes the asserted identity (typically a request header
/// set by an authenticating reverse proxy) as the hint. Entitlements come
/// from a static map keyed by owner id.
#[derive(Debug, Clone, Default)]
pub struct TrustedHeaderOwnerProvider {
    entitlements: HashMap<String, Vec<String>>,
}

impl TrustedHeaderOwnerProvider {
    pub fn new(entitlements: HashMap<String, Vec<String>>) -> Self {
        Self { entitlements }
    }
}

#[async_trait]
impl ResourceOwnerProvider for TrustedHeaderOwnerProvider {
    async fn authenticate(&self, hint: Option<&str>) -> Result<String, OwnerError> {
        match hint.map(str::trim) {
            Some(id) if !id.is_empty() => Ok(id.to_string()),
            _ => Err(OwnerError::NotAuthenticated),
        }
    }

    async fn entitlements(&self, owner_id: &str) -> Vec<String> {
        self.entitlements.get(owner_id).cloned().unwrap_or_default()
    }

    async fn extra_attributes(&self, _owner_id: &str) -> Map<String, Value> {
        Map::new()
    }
}

/// Parse an entitlement map of the form `alice=applications admin;bob=admin`.
pub fn parse_entitlement_map(raw: &str) -> HashMap<String, Vec<String>> {
    raw.split(';')
        .filter_map(|entry| {
            let (owner, list) = entry.split_once('=')?;
            let owner = owner.trim();
            if owner.is_empty() {
                return None;
            }
            Some((
                owner.to_string(),
                list.split_whitespace().map(String::from).collect(),
            ))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_provider_resolves_fixed_owner() {
        let provider = StaticOwnerProvider::new("admin")
            .with_entitlements(vec!["applications".into()])
            .with_attribute("uid", Value::from("admin"));
        let owner = provider.resolve(Some("ignored")).await.unwrap();
        assert_eq!(owner.id, "admin");
        assert!(owner.has_entitlement("applications"));
        assert_eq!(owner.ext.get("uid"), Some(&Value::from("admin")));
    }

    #[tokio::test]
    async fn header_provider_requires_identity() {
        let provider = TrustedHeaderOwnerProvider::new(parse_entitlement_map(
            "alice=applications admin; bob=",
        ));
        assert_eq!(
            provider.resolve(None).await,
            Err(OwnerError::NotAuthenticated)
        );
        assert_eq!(
            provider.resolve(Some("  ")).await,
            Err(OwnerError::NotAuthenticated)
        );

        let alice = provider.resolve(Some("alice")).await.unwrap();
        assert_eq!(alice.entitlements, vec!["applications", "admin"]);
        let bob = provider.resolve(Some("bob")).await.unwrap();
        assert!(bob.entitlements.is_empty());
    }

    #[tokio::test]
    async fn control_characters_are_rejected() {
        let provider = TrustedHeaderOwnerProvider::default();
        assert!(matches!(
            provider.resolve(Some("al\u{7f}ice")).await,
            Err(OwnerError::InvalidId(_))
        ));
    }
}
