//! In-memory storage backed by `DashMap`.
//!
//! Every operation touches a single map entry under its shard lock, which
//! gives the same per-row atomicity the Postgres store relies on.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use super::{Storage, StorageError};
use crate::client::ClientRecord;
use crate::models::{AccessToken, Approval, AuthorizationCode, ResourceOwner};

/// Non-persistent [`Storage`] implementation.
#[derive(Default)]
pub struct MemoryStorage {
    clients: DashMap<String, ClientRecord>,
    owners: DashMap<String, ResourceOwner>,
    approvals: DashMap<(String, String), Approval>,
    access_tokens: DashMap<String, AccessToken>,
    codes: DashMap<String, AuthorizationCode>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

fn approval_key(client_id: &str, owner_id: &str) -> (String, String) {
    (client_id.to_string(), owner_id.to_string())
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn get_client(&self, client_id: &str) -> Result<Option<ClientRecord>, StorageError> {
        Ok(self.clients.get(client_id).map(|c| c.value().clone()))
    }

    async fn list_clients(&self) -> Result<Vec<ClientRecord>, StorageError> {
        let mut clients: Vec<ClientRecord> =
            self.clients.iter().map(|c| c.value().clone()).collect();
        clients.sort_by(|a, b| a.id().cmp(b.id()));
        Ok(clients)
    }

    async fn add_client(&self, client: &ClientRecord) -> Result<(), StorageError> {
        match self.clients.entry(client.id().to_string()) {
            Entry::Occupied(_) => Err(StorageError::Conflict(format!(
                "client '{}' already exists",
                client.id()
            ))),
            Entry::Vacant(slot) => {
                slot.insert(client.clone());
                Ok(())
            }
        }
    }

    async fn update_client(&self, client: &ClientRecord) -> Result<bool, StorageError> {
        match self.clients.get_mut(client.id()) {
            Some(mut existing) => {
                *existing = client.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_client(&self, client_id: &str) -> Result<bool, StorageError> {
        if self.clients.remove(client_id).is_none() {
            return Ok(false);
        }
        self.approvals.retain(|(cid, _), _| cid != client_id);
        self.access_tokens.retain(|_, t| t.client_id != client_id);
        self.codes.retain(|_, c| c.client_id != client_id);
        Ok(true)
    }

    async fn upsert_resource_owner(&self, owner: &ResourceOwner) -> Result<(), StorageError> {
        self.owners.insert(owner.id.clone(), owner.clone());
        Ok(())
    }

    async fn get_resource_owner(
        &self,
        owner_id: &str,
    ) -> Result<Option<ResourceOwner>, StorageError> {
        Ok(self.owners.get(owner_id).map(|o| o.value().clone()))
    }

    async fn get_approval(
        &self,
        client_id: &str,
        owner_id: &str,
    ) -> Result<Option<Approval>, StorageError> {
        Ok(self
            .approvals
            .get(&approval_key(client_id, owner_id))
            .map(|a| a.value().clone()))
    }

    async fn get_approval_by_refresh_token(
        &self,
        client_id: &str,
        refresh_token: &str,
    ) -> Result<Option<Approval>, StorageError> {
        Ok(self
            .approvals
            .iter()
            .find(|a| {
                a.client_id == client_id && a.refresh_token.as_deref() == Some(refresh_token)
            })
            .map(|a| a.value().clone()))
    }

    async fn upsert_approval(&self, approval: &Approval) -> Result<(), StorageError> {
        self.approvals
            .entry(approval_key(&approval.client_id, &approval.resource_owner_id))
            .and_modify(|existing| {
                existing.scope = approval.scope.clone();
                if existing.refresh_token.is_none() {
                    existing.refresh_token = approval.refresh_token.clone();
                }
            })
            .or_insert_with(|| approval.clone());
        Ok(())
    }

    async fn list_approvals(&self, owner_id: &str) -> Result<Vec<Approval>, StorageError> {
        let mut approvals: Vec<Approval> = self
            .approvals
            .iter()
            .filter(|a| a.resource_owner_id == owner_id)
            .map(|a| a.value().clone())
            .collect();
        approvals.sort_by(|a, b| a.client_id.cmp(&b.client_id));
        Ok(approvals)
    }

    async fn delete_approval(
        &self,
        client_id: &str,
        owner_id: &str,
    ) -> Result<bool, StorageError> {
        if self
            .approvals
            .remove(&approval_key(client_id, owner_id))
            .is_none()
        {
            return Ok(false);
        }
        self.access_tokens
            .retain(|_, t| !(t.client_id == client_id && t.resource_owner_id == owner_id));
        self.codes
            .retain(|_, c| !(c.client_id == client_id && c.resource_owner_id == owner_id));
        Ok(true)
    }

    async fn store_access_token(&self, token: &AccessToken) -> Result<(), StorageError> {
        match self.access_tokens.entry(token.token.clone()) {
            Entry::Occupied(_) => Err(StorageError::Conflict("access token collision".into())),
            Entry::Vacant(slot) => {
                slot.insert(token.clone());
                Ok(())
            }
        }
    }

    async fn get_access_token(&self, token: &str) -> Result<Option<AccessToken>, StorageError> {
        Ok(self.access_tokens.get(token).map(|t| t.value().clone()))
    }

    async fn delete_expired_access_tokens(
        &self,
        expired_before: DateTime<Utc>,
    ) -> Result<u64, StorageError> {
        let before = self.access_tokens.len();
        self.access_tokens
            .retain(|_, t| t.expires_at().is_some_and(|e| e >= expired_before));
        Ok(before.saturating_sub(self.access_tokens.len()) as u64)
    }

    async fn store_authorization_code(
        &self,
        code: &AuthorizationCode,
    ) -> Result<(), StorageError> {
        match self.codes.entry(code.code.clone()) {
            Entry::Occupied(_) => Err(StorageError::Conflict(
                "authorization code collision".into(),
            )),
            Entry::Vacant(slot) => {
                slot.insert(code.clone());
                Ok(())
            }
        }
    }

    async fn get_authorization_code(
        &self,
        client_id: &str,
        code: &str,
        redirect_uri: Option<&str>,
    ) -> Result<Option<AuthorizationCode>, StorageError> {
        Ok(self
            .codes
            .get(code)
            .filter(|c| c.client_id == client_id && c.redirect_uri.as_deref() == redirect_uri)
            .map(|c| c.value().clone()))
    }

    async fn delete_authorization_code(
        &self,
        client_id: &str,
        code: &str,
        redirect_uri: Option<&str>,
    ) -> Result<bool, StorageError> {
        Ok(self
            .codes
            .remove_if(code, |_, c| {
                c.client_id == client_id && c.redirect_uri.as_deref() == redirect_uri
            })
            .is_some())
    }

    async fn delete_expired_authorization_codes(
        &self,
        issued_before: DateTime<Utc>,
    ) -> Result<u64, StorageError> {
        let before = self.codes.len();
        self.codes.retain(|_, c| c.issue_time >= issued_before);
        Ok(before.saturating_sub(self.codes.len()) as u64)
    }
}
