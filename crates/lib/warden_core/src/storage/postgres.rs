//! PostgreSQL storage.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::{Storage, StorageError};
use crate::client::{ClientData, ClientRecord};
use crate::models::{AccessToken, Approval, AuthorizationCode, ResourceOwner};
use crate::scope::ScopeSet;

const CLIENT_COLUMNS: &str = "id, name, description, secret, client_type, redirect_uri, icon, \
                              allowed_scope, contact_email, disable_user_consent";

type ClientRow = (
    String,
    String,
    Option<String>,
    Option<String>,
    String,
    String,
    Option<String>,
    String,
    Option<String>,
    bool,
);

type ApprovalRow = (String, String, String, Option<String>);

type AccessTokenRow = (String, String, String, DateTime<Utc>, i64, String);

type CodeRow = (String, String, String, Option<String>, DateTime<Utc>, String);

/// [`Storage`] backed by a Postgres connection pool.
#[derive(Clone)]
pub struct PgStorage {
    pool: PgPool,
}

impl PgStorage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn parse_scope(raw: &str) -> Result<ScopeSet, StorageError> {
    ScopeSet::parse(raw).map_err(|e| StorageError::Corrupt(format!("stored scope: {e}")))
}

/// Map a unique violation to [`StorageError::Conflict`].
fn conflict_on_unique(err: sqlx::Error, what: &str) -> StorageError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StorageError::Conflict(what.to_string())
        }
        _ => StorageError::DbError(err),
    }
}

fn client_from_row(row: ClientRow) -> Result<ClientRecord, StorageError> {
    let (
        id,
        name,
        description,
        secret,
        client_type,
        redirect_uri,
        icon,
        allowed_scope,
        contact_email,
        disable_user_consent,
    ) = row;
    ClientRecord::new(ClientData {
        id,
        name,
        description,
        secret,
        client_type,
        redirect_uri,
        icon,
        allowed_scope,
        contact_email,
        disable_user_consent,
    })
    .map_err(|e| StorageError::Corrupt(e.to_string()))
}

fn approval_from_row(row: ApprovalRow) -> Result<Approval, StorageError> {
    let (client_id, resource_owner_id, scope, refresh_token) = row;
    Ok(Approval {
        client_id,
        resource_owner_id,
        scope: parse_scope(&scope)?,
        refresh_token,
    })
}

fn access_token_from_row(row: AccessTokenRow) -> Result<AccessToken, StorageError> {
    let (token, client_id, resource_owner_id, issue_time, expires_in, scope) = row;
    Ok(AccessToken {
        token,
        client_id,
        resource_owner_id,
        scope: parse_scope(&scope)?,
        issue_time,
        expires_in,
    })
}

fn code_from_row(row: CodeRow) -> Result<AuthorizationCode, StorageError> {
    let (code, client_id, resource_owner_id, redirect_uri, issue_time, scope) = row;
    Ok(AuthorizationCode {
        code,
        client_id,
        resource_owner_id,
        redirect_uri,
        scope: parse_scope(&scope)?,
        issue_time,
    })
}

#[async_trait]
impl Storage for PgStorage {
    async fn get_client(&self, client_id: &str) -> Result<Option<ClientRecord>, StorageError> {
        let row = sqlx::query_as::<_, ClientRow>(&format!(
            "SELECT {CLIENT_COLUMNS} FROM clients WHERE id = $1"
        ))
        .bind(client_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(client_from_row).transpose()
    }

    async fn list_clients(&self) -> Result<Vec<ClientRecord>, StorageError> {
        let rows = sqlx::query_as::<_, ClientRow>(&format!(
            "SELECT {CLIENT_COLUMNS} FROM clients ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(client_from_row).collect()
    }

    async fn add_client(&self, client: &ClientRecord) -> Result<(), StorageError> {
        sqlx::query(&format!(
            "INSERT INTO clients ({CLIENT_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"
        ))
        .bind(client.id())
        .bind(client.name())
        .bind(client.description())
        .bind(client.secret())
        .bind(client.client_type().as_str())
        .bind(client.redirect_uri())
        .bind(client.icon())
        .bind(client.allowed_scope().to_string())
        .bind(client.contact_email())
        .bind(client.disable_user_consent())
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, &format!("client '{}' already exists", client.id())))?;
        Ok(())
    }

    async fn update_client(&self, client: &ClientRecord) -> Result<bool, StorageError> {
        let result = sqlx::query(
            "UPDATE clients SET name = $2, description = $3, secret = $4, client_type = $5, \
             redirect_uri = $6, icon = $7, allowed_scope = $8, contact_email = $9, \
             disable_user_consent = $10 \
             WHERE id = $1",
        )
        .bind(client.id())
        .bind(client.name())
        .bind(client.description())
        .bind(client.secret())
        .bind(client.client_type().as_str())
        .bind(client.redirect_uri())
        .bind(client.icon())
        .bind(client.allowed_scope().to_string())
        .bind(client.contact_email())
        .bind(client.disable_user_consent())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_client(&self, client_id: &str) -> Result<bool, StorageError> {
        // Approvals, tokens and codes go with it via ON DELETE CASCADE.
        let result = sqlx::query("DELETE FROM clients WHERE id = $1")
            .bind(client_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn upsert_resource_owner(&self, owner: &ResourceOwner) -> Result<(), StorageError> {
        let ext = serde_json::to_string(&owner.ext)
            .map_err(|e| StorageError::Corrupt(format!("owner attributes: {e}")))?;
        sqlx::query(
            "INSERT INTO resource_owners (id, entitlement, ext) VALUES ($1, $2, $3) \
             ON CONFLICT (id) DO UPDATE SET entitlement = EXCLUDED.entitlement, ext = EXCLUDED.ext",
        )
        .bind(&owner.id)
        .bind(owner.entitlements.join(" "))
        .bind(ext)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_resource_owner(
        &self,
        owner_id: &str,
    ) -> Result<Option<ResourceOwner>, StorageError> {
        let row = sqlx::query_as::<_, (String, String, String)>(
            "SELECT id, entitlement, ext FROM resource_owners WHERE id = $1",
        )
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some((id, entitlement, ext)) = row else {
            return Ok(None);
        };
        let ext = serde_json::from_str(&ext)
            .map_err(|e| StorageError::Corrupt(format!("owner attributes: {e}")))?;
        Ok(Some(ResourceOwner {
            id,
            entitlements: entitlement.split_whitespace().map(String::from).collect(),
            ext,
        }))
    }

    async fn get_approval(
        &self,
        client_id: &str,
        owner_id: &str,
    ) -> Result<Option<Approval>, StorageError> {
        let row = sqlx::query_as::<_, ApprovalRow>(
            "SELECT client_id, resource_owner_id, scope, refresh_token FROM approvals \
             WHERE client_id = $1 AND resource_owner_id = $2",
        )
        .bind(client_id)
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(approval_from_row).transpose()
    }

    async fn get_approval_by_refresh_token(
        &self,
        client_id: &str,
        refresh_token: &str,
    ) -> Result<Option<Approval>, StorageError> {
        let row = sqlx::query_as::<_, ApprovalRow>(
            "SELECT client_id, resource_owner_id, scope, refresh_token FROM approvals \
             WHERE client_id = $1 AND refresh_token = $2",
        )
        .bind(client_id)
        .bind(refresh_token)
        .fetch_optional(&self.pool)
        .await?;
        row.map(approval_from_row).transpose()
    }

    async fn upsert_approval(&self, approval: &Approval) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO approvals (client_id, resource_owner_id, scope, refresh_token) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (client_id, resource_owner_id) DO UPDATE SET \
               scope = EXCLUDED.scope, \
               refresh_token = COALESCE(approvals.refresh_token, EXCLUDED.refresh_token)",
        )
        .bind(&approval.client_id)
        .bind(&approval.resource_owner_id)
        .bind(approval.scope.to_string())
        .bind(approval.refresh_token.as_deref())
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "refresh token collision"))?;
        Ok(())
    }

    async fn list_approvals(&self, owner_id: &str) -> Result<Vec<Approval>, StorageError> {
        let rows = sqlx::query_as::<_, ApprovalRow>(
            "SELECT client_id, resource_owner_id, scope, refresh_token FROM approvals \
             WHERE resource_owner_id = $1 ORDER BY client_id",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(approval_from_row).collect()
    }

    async fn delete_approval(
        &self,
        client_id: &str,
        owner_id: &str,
    ) -> Result<bool, StorageError> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            "DELETE FROM approvals WHERE client_id = $1 AND resource_owner_id = $2",
        )
        .bind(client_id)
        .bind(owner_id)
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }
        sqlx::query("DELETE FROM access_tokens WHERE client_id = $1 AND resource_owner_id = $2")
            .bind(client_id)
            .bind(owner_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "DELETE FROM authorization_codes WHERE client_id = $1 AND resource_owner_id = $2",
        )
        .bind(client_id)
        .bind(owner_id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn store_access_token(&self, token: &AccessToken) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO access_tokens \
             (access_token, client_id, resource_owner_id, issue_time, expires_in, scope) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(&token.token)
        .bind(&token.client_id)
        .bind(&token.resource_owner_id)
        .bind(token.issue_time)
        .bind(token.expires_in)
        .bind(token.scope.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "access token collision"))?;
        Ok(())
    }

    async fn get_access_token(&self, token: &str) -> Result<Option<AccessToken>, StorageError> {
        let row = sqlx::query_as::<_, AccessTokenRow>(
            "SELECT access_token, client_id, resource_owner_id, issue_time, expires_in, scope \
             FROM access_tokens WHERE access_token = $1",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;
        row.map(access_token_from_row).transpose()
    }

    async fn delete_expired_access_tokens(
        &self,
        expired_before: DateTime<Utc>,
    ) -> Result<u64, StorageError> {
        let result = sqlx::query(
            "DELETE FROM access_tokens \
             WHERE issue_time + expires_in * INTERVAL '1 second' < $1",
        )
        .bind(expired_before)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn store_authorization_code(
        &self,
        code: &AuthorizationCode,
    ) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO authorization_codes \
             (authorization_code, client_id, resource_owner_id, redirect_uri, issue_time, scope) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(&code.code)
        .bind(&code.client_id)
        .bind(&code.resource_owner_id)
        .bind(code.redirect_uri.as_deref())
        .bind(code.issue_time)
        .bind(code.scope.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "authorization code collision"))?;
        Ok(())
    }

    async fn get_authorization_code(
        &self,
        client_id: &str,
        code: &str,
        redirect_uri: Option<&str>,
    ) -> Result<Option<AuthorizationCode>, StorageError> {
        let row = sqlx::query_as::<_, CodeRow>(
            "SELECT authorization_code, client_id, resource_owner_id, redirect_uri, issue_time, scope \
             FROM authorization_codes \
             WHERE client_id = $1 AND authorization_code = $2 \
               AND redirect_uri IS NOT DISTINCT FROM $3",
        )
        .bind(client_id)
        .bind(code)
        .bind(redirect_uri)
        .fetch_optional(&self.pool)
        .await?;
        row.map(code_from_row).transpose()
    }

    async fn delete_authorization_code(
        &self,
        client_id: &str,
        code: &str,
        redirect_uri: Option<&str>,
    ) -> Result<bool, StorageError> {
        let result = sqlx::query(
            "DELETE FROM authorization_codes \
             WHERE client_id = $1 AND authorization_code = $2 \
               AND redirect_uri IS NOT DISTINCT FROM $3",
        )
        .bind(client_id)
        .bind(code)
        .bind(redirect_uri)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn delete_expired_authorization_codes(
        &self,
        issued_before: DateTime<Utc>,
    ) -> Result<u64, StorageError> {
        let result = sqlx::query("DELETE FROM authorization_codes WHERE issue_time < $1")
            .bind(issued_before)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
