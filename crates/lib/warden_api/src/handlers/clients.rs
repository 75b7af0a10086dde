//! Client registration management (`/api/clients`).

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use warden_core::client::{ClientData, ClientRecord};

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::BearerToken;

/// `GET /api/clients`: list all registered clients.
pub async fn list_clients_handler(
    State(state): State<AppState>,
) -> AppResult<Json<Vec<ClientRecord>>> {
    Ok(Json(state.storage.list_clients().await?))
}

/// `POST /api/clients`: register a client.
pub async fn add_client_handler(
    State(state): State<AppState>,
    axum::Extension(bearer): axum::Extension<BearerToken>,
    Json(body): Json<ClientData>,
) -> AppResult<(StatusCode, Json<ClientRecord>)> {
    let client = ClientRecord::new(body)?;
    state.storage.add_client(&client).await?;
    tracing::info!(client_id = %client.id(), by = bearer.owner_id(), "client registered");
    Ok((StatusCode::CREATED, Json(client)))
}

/// `GET /api/clients/{id}`: fetch one client.
pub async fn get_client_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<ClientRecord>> {
    state
        .storage
        .get_client(&id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("client '{id}'")))
}

/// `PUT /api/clients/{id}`: replace a client registration.
pub async fn update_client_handler(
    State(state): State<AppState>,
    axum::Extension(bearer): axum::Extension<BearerToken>,
    Path(id): Path<String>,
    Json(body): Json<ClientData>,
) -> AppResult<Json<ClientRecord>> {
    if body.id != id {
        return Err(AppError::Validation(
            "client id in body does not match the path".into(),
        ));
    }
    let client = ClientRecord::new(body)?;
    if !state.storage.update_client(&client).await? {
        return Err(AppError::NotFound(format!("client '{id}'")));
    }
    tracing::info!(client_id = %id, by = bearer.owner_id(), "client updated");
    Ok(Json(client))
}

/// `DELETE /api/clients/{id}`: remove a client and everything issued to it.
pub async fn delete_client_handler(
    State(state): State<AppState>,
    axum::Extension(bearer): axum::Extension<BearerToken>,
    Path(id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    if !state.storage.delete_client(&id).await? {
        return Err(AppError::NotFound(format!("client '{id}'")));
    }
    tracing::info!(client_id = %id, by = bearer.owner_id(), "client removed");
    Ok(Json(serde_json::json!({"success": true})))
}
