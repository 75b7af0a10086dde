//! The caller's own approvals (`/api/authorizations`).

use axum::Json;
use axum::extract::{Path, State};
use serde::Serialize;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::BearerToken;

/// One approval as shown to its owner.
#[derive(Debug, Serialize)]
pub struct AuthorizationInfo {
    pub client_id: String,
    pub scope: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<String>,
}

/// `GET /api/authorizations`: list approvals granted by the token's owner.
pub async fn list_authorizations_handler(
    State(state): State<AppState>,
    axum::Extension(bearer): axum::Extension<BearerToken>,
) -> AppResult<Json<Vec<AuthorizationInfo>>> {
    let approvals = state.storage.list_approvals(bearer.owner_id()).await?;
    let mut authorizations = Vec::with_capacity(approvals.len());
    for approval in approvals {
        let client = state.storage.get_client(&approval.client_id).await?;
        authorizations.push(AuthorizationInfo {
            scope: approval.scope.to_string(),
            name: client.as_ref().map(|c| c.name().to_string()),
            description: client
                .as_ref()
                .and_then(|c| c.description())
                .map(String::from),
            redirect_uri: client.as_ref().map(|c| c.redirect_uri().to_string()),
            client_id: approval.client_id,
        });
    }
    Ok(Json(authorizations))
}

/// `DELETE /api/authorizations/{client_id}`: revoke one of the owner's
/// approvals together with its access tokens and pending codes.
pub async fn delete_authorization_handler(
    State(state): State<AppState>,
    axum::Extension(bearer): axum::Extension<BearerToken>,
    Path(client_id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    if !state
        .storage
        .delete_approval(&client_id, bearer.owner_id())
        .await?
    {
        return Err(AppError::NotFound(format!("authorization for '{client_id}'")));
    }
    tracing::info!(client_id = %client_id, owner = bearer.owner_id(), "authorization revoked");
    Ok(Json(serde_json::json!({"success": true})))
}
