//! `GET/POST /authorize`: authorization requests and consent.

use std::collections::HashMap;

use axum::extract::{OriginalUri, Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use axum::Form;
use warden_core::authorize::{AuthorizeError, AuthorizeOutcome, AuthorizeRequest};
use warden_core::models::ResourceOwner;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::views;

async fn resolve_owner(state: &AppState, headers: &HeaderMap) -> AppResult<ResourceOwner> {
    let hint = headers
        .get(state.config.owner_header.as_str())
        .and_then(|v| v.to_str().ok());
    Ok(state.owners.resolve(hint).await?)
}

/// The URI the browser sees for this request, for the referer check.
fn request_uri(state: &AppState, uri: &axum::http::Uri) -> String {
    let path_and_query = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or_else(|| uri.path());
    format!(
        "{}{}",
        state.config.public_base_url.trim_end_matches('/'),
        path_and_query
    )
}

fn found(location: &str) -> AppResult<Response> {
    let location = HeaderValue::from_str(location)
        .map_err(|e| AppError::Internal(format!("unencodable redirect: {e}")))?;
    Ok((StatusCode::FOUND, [(header::LOCATION, location)]).into_response())
}

fn render(
    outcome: Result<AuthorizeOutcome, AuthorizeError>,
    owner: &ResourceOwner,
) -> AppResult<Response> {
    match outcome {
        Ok(AuthorizeOutcome::AskApproval { client, scope }) => {
            let mut response =
                Html(views::consent_page(&client, &scope, &owner.id)).into_response();
            response
                .headers_mut()
                .insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
            Ok(response)
        }
        Ok(AuthorizeOutcome::Redirect { uri }) => found(&uri),
        Err(AuthorizeError::Client(e)) => {
            tracing::debug!(error = %e, "authorization error redirected to client");
            found(&e.redirect_uri())
        }
        Err(AuthorizeError::Request(e)) => Err(e.into()),
        Err(AuthorizeError::Storage(e)) => Err(e.into()),
    }
}

/// `GET /authorize`: evaluate an authorization request.
pub async fn authorize_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> AppResult<Response> {
    let request = AuthorizeRequest::from_params(&params)?;
    let owner = resolve_owner(&state, &headers).await?;
    let outcome = state.authorize.evaluate(&request, &owner).await;
    render(outcome, &owner)
}

/// `POST /authorize`: the resource owner's answer to the consent page.
pub async fn approve_handler(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
    Form(form): Form<HashMap<String, String>>,
) -> AppResult<Response> {
    let request = AuthorizeRequest::from_params(&params)?;
    let owner = resolve_owner(&state, &headers).await?;
    let referer = headers.get(header::REFERER).and_then(|v| v.to_str().ok());
    let outcome = state
        .authorize
        .approve(&request, &form, &owner, referer, &request_uri(&state, &uri))
        .await;
    render(outcome, &owner)
}
