//! `GET/POST /introspect`: token introspection.

use std::collections::HashMap;

use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use axum::{Form, Json};
use warden_core::error::{ErrorCode, OAuthError};

use crate::AppState;
use crate::error::{AppResult, no_store};

async fn introspect(state: &AppState, params: &HashMap<String, String>) -> AppResult<Response> {
    let token = params
        .get("token")
        .filter(|t| !t.is_empty())
        .ok_or_else(|| OAuthError::new(ErrorCode::InvalidRequest, "the token parameter is missing"))?;
    let result = state.introspection.introspect(token).await?;
    let mut response = Json(result).into_response();
    no_store(&mut response);
    Ok(response)
}

/// `GET /introspect?token=...`
pub async fn introspect_query_handler(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> AppResult<Response> {
    introspect(&state, &params).await
}

/// `POST /introspect` with a form-encoded `token`.
pub async fn introspect_form_handler(
    State(state): State<AppState>,
    Form(params): Form<HashMap<String, String>>,
) -> AppResult<Response> {
    introspect(&state, &params).await
}
