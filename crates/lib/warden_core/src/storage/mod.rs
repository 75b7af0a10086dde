//! Persistence contract for clients, resource owners, approvals, access
//! tokens and authorization codes.
//!
//! Engines never cache what they read here; every decision is taken against
//! the state returned by the store for that request. Two implementations
//! ship with the crate: [`PgStorage`] for production and [`MemoryStorage`]
//! for tests and throwaway deployments.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::client::ClientRecord;
use crate::models::{AccessToken, Approval, AuthorizationCode, ResourceOwner};

pub use memory::MemoryStorage;
pub use postgres::PgStorage;

/// Storage errors. All of them are fatal for the request that hit them.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    DbError(#[from] sqlx::Error),

    /// A uniqueness constraint was violated, e.g. a duplicate client id or a
    /// colliding random token.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A stored row no longer passes validation.
    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

/// The storage contract.
///
/// Implementations must make [`Storage::delete_authorization_code`] a single
/// atomic conditional delete: of two concurrent calls for the same code at
/// most one may return `true`.
#[async_trait]
pub trait Storage: Send + Sync {
    // --- clients -----------------------------------------------------------

    async fn get_client(&self, client_id: &str) -> Result<Option<ClientRecord>, StorageError>;

    async fn list_clients(&self) -> Result<Vec<ClientRecord>, StorageError>;

    /// Register a new client. Fails with [`StorageError::Conflict`] when the
    /// id is taken.
    async fn add_client(&self, client: &ClientRecord) -> Result<(), StorageError>;

    /// Replace an existing client. Returns `false` when it does not exist.
    async fn update_client(&self, client: &ClientRecord) -> Result<bool, StorageError>;

    /// Delete a client together with every approval, token and code issued
    /// to it. Returns `false` when it does not exist.
    async fn delete_client(&self, client_id: &str) -> Result<bool, StorageError>;

    // --- resource owners ---------------------------------------------------

    async fn upsert_resource_owner(&self, owner: &ResourceOwner) -> Result<(), StorageError>;

    async fn get_resource_owner(&self, owner_id: &str)
    -> Result<Option<ResourceOwner>, StorageError>;

    // --- approvals ---------------------------------------------------------

    async fn get_approval(
        &self,
        client_id: &str,
        owner_id: &str,
    ) -> Result<Option<Approval>, StorageError>;

    async fn get_approval_by_refresh_token(
        &self,
        client_id: &str,
        refresh_token: &str,
    ) -> Result<Option<Approval>, StorageError>;

    /// Insert or update the approval for `(client_id, resource_owner_id)`.
    ///
    /// The scope is replaced. A refresh token already stored is kept; the
    /// one carried by `approval` is only written when none exists.
    async fn upsert_approval(&self, approval: &Approval) -> Result<(), StorageError>;

    async fn list_approvals(&self, owner_id: &str) -> Result<Vec<Approval>, StorageError>;

    /// Remove an approval together with the access tokens and unredeemed
    /// authorization codes issued under it.
    async fn delete_approval(&self, client_id: &str, owner_id: &str)
    -> Result<bool, StorageError>;

    // --- access tokens -----------------------------------------------------

    async fn store_access_token(&self, token: &AccessToken) -> Result<(), StorageError>;

    async fn get_access_token(&self, token: &str) -> Result<Option<AccessToken>, StorageError>;

    /// Delete tokens whose expiry lies before `expired_before`.
    async fn delete_expired_access_tokens(
        &self,
        expired_before: DateTime<Utc>,
    ) -> Result<u64, StorageError>;

    // --- authorization codes -----------------------------------------------

    async fn store_authorization_code(&self, code: &AuthorizationCode)
    -> Result<(), StorageError>;

    /// Look up a code by client, value and redirect URI. `redirect_uri` must
    /// match exactly, `None` only matching codes issued without one.
    async fn get_authorization_code(
        &self,
        client_id: &str,
        code: &str,
        redirect_uri: Option<&str>,
    ) -> Result<Option<AuthorizationCode>, StorageError>;

    /// Atomically delete a code. Returns `false` when no row matched, which
    /// means the code was already redeemed (or never existed).
    async fn delete_authorization_code(
        &self,
        client_id: &str,
        code: &str,
        redirect_uri: Option<&str>,
    ) -> Result<bool, StorageError>;

    /// Delete codes issued before `issued_before`.
    async fn delete_expired_authorization_codes(
        &self,
        issued_before: DateTime<Utc>,
    ) -> Result<u64, StorageError>;
}
