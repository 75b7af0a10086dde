//! Application error types.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{Html, IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use warden_core::authorize::RequestError;
use warden_core::error::OAuthError;
use warden_core::owner::OwnerError;
use warden_core::storage::StorageError;

use crate::views;

/// Realm announced in `WWW-Authenticate` challenges.
pub const REALM: &str = "OAuth Server";

/// Convenience alias for handler return types.
pub type AppResult<T> = Result<T, AppError>;

/// Application-level errors with HTTP status mapping.
#[derive(Debug, Error)]
pub enum AppError {
    /// Authorization request that cannot be redirected to the client.
    #[error("Bad request: {0}")]
    BadRequest(#[from] RequestError),

    /// Token/introspection endpoint error, returned as OAuth JSON.
    #[error(transparent)]
    OAuth(#[from] OAuthError),

    #[error("Method not allowed")]
    MethodNotAllowed,

    /// Resource owner could not be authenticated on the authorize endpoint.
    #[error("Unauthorized: {0}")]
    Unauthorized(#[from] OwnerError),

    /// Bearer token failure on the management API (RFC 6750).
    #[error("Bearer error: {description}")]
    Bearer {
        status: StatusCode,
        error: Option<&'static str>,
        description: String,
    },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal server error")]
    Internal(String),
}

impl AppError {
    pub fn invalid_token(description: impl Into<String>) -> Self {
        Self::Bearer {
            status: StatusCode::UNAUTHORIZED,
            error: Some("invalid_token"),
            description: description.into(),
        }
    }

    pub fn insufficient_scope(description: impl Into<String>) -> Self {
        Self::Bearer {
            status: StatusCode::FORBIDDEN,
            error: Some("insufficient_scope"),
            description: description.into(),
        }
    }

    pub fn missing_token() -> Self {
        Self::Bearer {
            status: StatusCode::UNAUTHORIZED,
            error: None,
            description: "no token provided".into(),
        }
    }
}

/// Headers every token-bearing response carries.
pub fn no_store(response: &mut Response) {
    let headers = response.headers_mut();
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
}

fn oauth_json(status: StatusCode, error: &str, description: &str) -> Response {
    (
        status,
        Json(json!({"error": error, "error_description": description})),
    )
        .into_response()
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::BadRequest(e) => (
                StatusCode::BAD_REQUEST,
                Html(views::error_page("Bad Request", &e.to_string())),
            )
                .into_response(),
            AppError::Unauthorized(e) => (
                StatusCode::UNAUTHORIZED,
                Html(views::error_page("Unauthorized", &e.to_string())),
            )
                .into_response(),
            AppError::OAuth(e) => {
                let status =
                    StatusCode::from_u16(e.status()).unwrap_or(StatusCode::BAD_REQUEST);
                let mut response = oauth_json(status, e.error.as_str(), &e.error_description);
                if status == StatusCode::UNAUTHORIZED {
                    if let Ok(challenge) =
                        HeaderValue::from_str(&format!("Basic realm=\"{REALM}\""))
                    {
                        response
                            .headers_mut()
                            .insert(header::WWW_AUTHENTICATE, challenge);
                    }
                }
                no_store(&mut response);
                response
            }
            AppError::MethodNotAllowed => {
                let mut response = oauth_json(
                    StatusCode::METHOD_NOT_ALLOWED,
                    "invalid_request",
                    "method not allowed",
                );
                response
                    .headers_mut()
                    .insert(header::ALLOW, HeaderValue::from_static("POST"));
                response
            }
            AppError::Bearer {
                status,
                error,
                description,
            } => {
                let (challenge, mut response) = match error {
                    Some(error) => (
                        format!(
                            "Bearer realm=\"{REALM}\",error=\"{error}\",error_description=\"{description}\""
                        ),
                        oauth_json(status, error, &description),
                    ),
                    None => (format!("Bearer realm=\"{REALM}\""), status.into_response()),
                };
                if let Ok(challenge) = HeaderValue::from_str(&challenge) {
                    response
                        .headers_mut()
                        .insert(header::WWW_AUTHENTICATE, challenge);
                }
                response
            }
            AppError::Validation(m) => oauth_json(StatusCode::BAD_REQUEST, "validation_error", &m),
            AppError::NotFound(m) => oauth_json(StatusCode::NOT_FOUND, "not_found", &m),
            AppError::Conflict(m) => oauth_json(StatusCode::CONFLICT, "conflict", &m),
            AppError::Internal(m) => {
                tracing::error!(error = %m, "internal error");
                oauth_json(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "server_error",
                    "Internal server error",
                )
            }
        }
    }
}

impl From<StorageError> for AppError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::Conflict(msg) => AppError::Conflict(msg),
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl From<warden_core::client::InvalidClient> for AppError {
    fn from(e: warden_core::client::InvalidClient) -> Self {
        AppError::Validation(e.to_string())
    }
}
