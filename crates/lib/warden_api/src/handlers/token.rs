//! `POST /token`: the token endpoint.

use std::collections::HashMap;

use axum::extract::State;
use axum::extract::rejection::FormRejection;
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::response::{IntoResponse, Response};
use axum::{Form, Json};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use warden_core::error::{ErrorCode, OAuthError};
use warden_core::token::{BasicCredentials, TokenError, TokenRequest};

use crate::AppState;
use crate::error::{AppError, AppResult, no_store};

/// Parse `Authorization: Basic ...`. Other schemes are ignored.
fn basic_credentials(headers: &HeaderMap) -> Result<Option<BasicCredentials>, OAuthError> {
    let Some(value) = headers.get(AUTHORIZATION) else {
        return Ok(None);
    };
    let malformed = || OAuthError::new(ErrorCode::InvalidClient, "malformed client credentials");

    let value = value.to_str().map_err(|_| malformed())?;
    let Some(encoded) = value.strip_prefix("Basic ") else {
        return Ok(None);
    };
    let decoded = STANDARD.decode(encoded.trim()).map_err(|_| malformed())?;
    let decoded = String::from_utf8(decoded).map_err(|_| malformed())?;
    let (client_id, secret) = decoded.split_once(':').ok_or_else(malformed)?;
    Ok(Some(BasicCredentials {
        client_id: client_id.to_string(),
        secret: secret.to_string(),
    }))
}

/// `POST /token`: exchange a grant for an access token.
pub async fn token_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    form: Result<Form<HashMap<String, String>>, FormRejection>,
) -> AppResult<Response> {
    let Form(params) = form.map_err(|e| {
        OAuthError::new(ErrorCode::InvalidRequest, format!("invalid request body: {e}"))
    })?;
    let credentials = basic_credentials(&headers)?;
    let request = TokenRequest::from_params(&params);

    match state.token.handle(&request, credentials.as_ref()).await {
        Ok(token) => {
            let mut response = Json(token).into_response();
            no_store(&mut response);
            Ok(response)
        }
        Err(TokenError::OAuth(e)) => {
            tracing::debug!(error = %e, "token request rejected");
            Err(e.into())
        }
        Err(TokenError::Storage(e)) => Err(e.into()),
    }
}

/// Any other method on `/token`.
pub async fn method_not_allowed() -> AppError {
    AppError::MethodNotAllowed
}
