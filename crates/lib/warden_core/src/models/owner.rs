//! Resource-owner records.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// An authenticated resource owner as remembered by the server.
///
/// Entitlements and extra attributes are refreshed every time the owner
/// passes through the authorize endpoint, so introspection can report them
/// without reaching back to the identity backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceOwner {
    pub id: String,
    #[serde(default)]
    pub entitlements: Vec<String>,
    #[serde(default)]
    pub ext: Map<String, Value>,
}

impl ResourceOwner {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn has_entitlement(&self, entitlement: &str) -> bool {
        self.entitlements.iter().any(|e| e == entitlement)
    }
}
