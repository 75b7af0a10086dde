//! Bearer token middleware for the management API.
//!
//! Tokens are resolved through introspection, so a token is accepted here
//! exactly when the introspection endpoint would call it active.

use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use warden_core::introspect::Introspection;

use crate::AppState;
use crate::error::AppError;

/// Owner entitlement required to manage client registrations.
pub const APPLICATIONS_ENTITLEMENT: &str = "applications";

/// Token scope required to list and revoke one's own authorizations.
pub const AUTHORIZATIONS_SCOPE: &str = "authorizations";

/// The active token behind a request, stored in request extensions.
#[derive(Debug, Clone)]
pub struct BearerToken(pub Introspection);

impl BearerToken {
    /// The resource owner the token was issued to.
    pub fn owner_id(&self) -> &str {
        self.0.sub.as_deref().unwrap_or_default()
    }
}

async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<BearerToken, AppError> {
    let header = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(AppError::missing_token)?;

    let token = header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::invalid_token("invalid authorization scheme"))?;

    let introspection = state.introspection.introspect(token).await?;
    if !introspection.active {
        return Err(AppError::invalid_token("the access token is not valid"));
    }
    Ok(BearerToken(introspection))
}

/// Axum middleware: requires a token whose owner holds the
/// `applications` entitlement.
pub async fn require_applications_entitlement(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let bearer = authenticate(&state, request.headers()).await?;
    if !bearer
        .0
        .entitlements()
        .any(|e| e == APPLICATIONS_ENTITLEMENT)
    {
        tracing::info!(owner = bearer.owner_id(), "management access without entitlement");
        return Err(AppError::insufficient_scope(
            "insufficient entitlement to manage applications",
        ));
    }
    request.extensions_mut().insert(bearer);
    Ok(next.run(request).await)
}

/// Axum middleware: requires a token carrying the `authorizations` scope.
pub async fn require_authorizations_scope(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let bearer = authenticate(&state, request.headers()).await?;
    if !bearer.0.has_scope(AUTHORIZATIONS_SCOPE) {
        return Err(AppError::insufficient_scope(
            "the token does not carry the authorizations scope",
        ));
    }
    request.extensions_mut().insert(bearer);
    Ok(next.run(request).await)
}
