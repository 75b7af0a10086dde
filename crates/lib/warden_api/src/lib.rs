//! # warden_api
//!
//! HTTP API library for Warden: the OAuth endpoints plus the management API.

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod views;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use sqlx::PgPool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use warden_core::authorize::AuthorizationEngine;
use warden_core::introspect::IntrospectionEngine;
use warden_core::owner::ResourceOwnerProvider;
use warden_core::storage::Storage;
use warden_core::token::TokenEngine;

use crate::config::ApiConfig;
use crate::handlers::{authorizations, authorize, clients, introspect, token};

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<dyn Storage>,
    pub authorize: Arc<AuthorizationEngine>,
    pub token: Arc<TokenEngine>,
    pub introspection: Arc<IntrospectionEngine>,
    /// Authenticates resource owners on the authorize endpoint.
    pub owners: Arc<dyn ResourceOwnerProvider>,
    /// API configuration.
    pub config: ApiConfig,
}

impl AppState {
    /// Wire the engines to `storage` using the engine settings in `config`.
    pub fn new(
        storage: Arc<dyn Storage>,
        owners: Arc<dyn ResourceOwnerProvider>,
        config: ApiConfig,
    ) -> Self {
        let engine_config = config.engine_config();
        Self {
            authorize: Arc::new(AuthorizationEngine::new(
                Arc::clone(&storage),
                engine_config.clone(),
            )),
            token: Arc::new(TokenEngine::new(Arc::clone(&storage), engine_config)),
            introspection: Arc::new(IntrospectionEngine::new(Arc::clone(&storage))),
            storage,
            owners,
            config,
        }
    }
}

/// Run embedded database migrations.
///
/// Delegates to `warden_core::migrate::migrate()` which owns the migration files.
pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    warden_core::migrate::migrate(pool).await
}

/// Builds the Axum router with all routes and shared state.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // OAuth endpoints
    let oauth = Router::new()
        .route(
            "/authorize",
            get(authorize::authorize_handler).post(authorize::approve_handler),
        )
        .route(
            "/token",
            post(token::token_handler).fallback(token::method_not_allowed),
        )
        .route(
            "/introspect",
            get(introspect::introspect_query_handler).post(introspect::introspect_form_handler),
        );

    // Client registrations, for owners entitled to manage applications
    let applications = Router::new()
        .route(
            "/api/clients",
            get(clients::list_clients_handler).post(clients::add_client_handler),
        )
        .route(
            "/api/clients/{id}",
            get(clients::get_client_handler)
                .put(clients::update_client_handler)
                .delete(clients::delete_client_handler),
        )
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_applications_entitlement,
        ));

    // The caller's own approvals
    let approvals = Router::new()
        .route(
            "/api/authorizations",
            get(authorizations::list_authorizations_handler),
        )
        .route(
            "/api/authorizations/{client_id}",
            axum::routing::delete(authorizations::delete_authorization_handler),
        )
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_authorizations_scope,
        ));

    Router::new()
        .merge(oauth)
        .merge(applications)
        .merge(approvals)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
