//! The authorize/approve flow.
//!
//! [`AuthorizationEngine::evaluate`] decides whether a request can be
//! answered straight away or needs the resource owner's consent;
//! [`AuthorizationEngine::approve`] records that consent and issues the
//! grant. Both return either an [`AuthorizeOutcome`] or an
//! [`AuthorizeError`], which separates errors that may be sent back to the
//! client ([`ClientError`]) from errors that must stay with the resource
//! owner ([`RequestError`]).

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use url::{Url, form_urlencoded};

use crate::client::{ClientData, ClientRecord, ClientType, ResponseType};
use crate::config::EngineConfig;
use crate::error::{ErrorCode, OAuthError};
use crate::models::{AccessToken, Approval, AuthorizationCode, ResourceOwner};
use crate::scope::ScopeSet;
use crate::storage::{Storage, StorageError};
use crate::tokens::{generate_access_token, generate_authorization_code, generate_refresh_token};

/// Errors that cannot be redirected to the client, because the client or
/// its redirect target is not (yet) trusted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("missing parameter: {0}")]
    MissingParameter(&'static str),

    #[error("invalid parameter: {0}")]
    InvalidParameter(&'static str),

    #[error("client not registered")]
    UnknownClient,

    #[error("specified redirect_uri not allowed for this client")]
    RedirectUriMismatch,

    #[error("CSRF protection triggered: referer does not match request")]
    CsrfMismatch,

    #[error("approved scope is not a subset of the requested scope")]
    InvalidApprovedScope,
}

/// An OAuth error delivered to the client through its verified redirect URI.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{error}")]
pub struct ClientError {
    pub error: OAuthError,
    redirect_uri: String,
    state: Option<String>,
    fragment: bool,
}

impl ClientError {
    /// The redirect carrying `error`, `error_description` and `state`.
    pub fn redirect_uri(&self) -> String {
        let mut params = vec![
            ("error", self.error.error.as_str()),
            ("error_description", self.error.error_description.as_str()),
        ];
        if let Some(state) = &self.state {
            params.push(("state", state.as_str()));
        }
        build_redirect(&self.redirect_uri, &params, self.fragment)
    }
}

#[derive(Debug, Error)]
pub enum AuthorizeError {
    #[error(transparent)]
    Request(#[from] RequestError),

    #[error(transparent)]
    Client(ClientError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Where the flow ends up when no error occurred.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizeOutcome {
    /// Consent is needed; the caller renders a prompt for `scope`.
    AskApproval { client: ClientRecord, scope: ScopeSet },
    /// Send the user agent to `uri`.
    Redirect { uri: String },
}

/// A syntactically valid authorization request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizeRequest {
    pub client_id: String,
    pub response_type: ResponseType,
    pub redirect_uri: Option<String>,
    pub scope: ScopeSet,
    pub state: Option<String>,
}

/// VSCHAR from RFC 6749 appendix A.
fn is_vschar_string(s: &str) -> bool {
    s.bytes().all(|b| (0x20..=0x7e).contains(&b))
}

/// Parameters sent without a value are treated as omitted.
fn param<'a>(params: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    params.get(name).map(String::as_str).filter(|v| !v.is_empty())
}

impl AuthorizeRequest {
    pub fn from_params(params: &HashMap<String, String>) -> Result<Self, RequestError> {
        let client_id =
            param(params, "client_id").ok_or(RequestError::MissingParameter("client_id"))?;
        if !is_vschar_string(client_id) {
            return Err(RequestError::InvalidParameter("client_id"));
        }

        let response_type = param(params, "response_type")
            .ok_or(RequestError::MissingParameter("response_type"))?;
        let response_type = ResponseType::parse(response_type)
            .ok_or(RequestError::InvalidParameter("response_type"))?;

        let redirect_uri = param(params, "redirect_uri");
        if let Some(uri) = redirect_uri {
            let valid = Url::parse(uri).map(|u| u.fragment().is_none()).unwrap_or(false);
            if !valid {
                return Err(RequestError::InvalidParameter("redirect_uri"));
            }
        }

        let scope = match param(params, "scope") {
            Some(raw) => {
                ScopeSet::parse(raw).map_err(|_| RequestError::InvalidParameter("scope"))?
            }
            None => ScopeSet::empty(),
        };

        let state = param(params, "state");
        if state.is_some_and(|s| !is_vschar_string(s)) {
            return Err(RequestError::InvalidParameter("state"));
        }

        Ok(Self {
            client_id: client_id.to_string(),
            response_type,
            redirect_uri: redirect_uri.map(String::from),
            scope,
            state: state.map(String::from),
        })
    }
}

/// Append `params` to `base`, in the fragment or in the query string.
fn build_redirect(base: &str, params: &[(&str, &str)], fragment: bool) -> String {
    let encoded = form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params)
        .finish();
    if fragment {
        format!("{base}#{encoded}")
    } else {
        let separator = if base.contains('?') { '&' } else { '?' };
        format!("{base}{separator}{encoded}")
    }
}

/// A request that passed client, redirect, profile and scope checks.
struct Verified {
    client: ClientRecord,
    redirect_uri: String,
}

pub struct AuthorizationEngine {
    storage: Arc<dyn Storage>,
    config: EngineConfig,
}

impl AuthorizationEngine {
    pub fn new(storage: Arc<dyn Storage>, config: EngineConfig) -> Self {
        Self { storage, config }
    }

    /// Handle an authorization request for an authenticated owner.
    pub async fn evaluate(
        &self,
        request: &AuthorizeRequest,
        owner: &ResourceOwner,
    ) -> Result<AuthorizeOutcome, AuthorizeError> {
        let verified = self.verify(request, owner).await?;

        if verified.client.disable_user_consent() {
            return self
                .issue(&verified, request, &owner.id, &request.scope, Utc::now())
                .await;
        }

        let approval = self
            .storage
            .get_approval(request.client_id.as_str(), &owner.id)
            .await?;
        match approval {
            Some(approval) if request.scope.is_subset_of(&approval.scope) => {
                self.issue(&verified, request, &owner.id, &request.scope, Utc::now())
                    .await
            }
            _ => Ok(AuthorizeOutcome::AskApproval {
                client: verified.client,
                scope: request.scope.clone(),
            }),
        }
    }

    /// Handle the resource owner's answer to a consent prompt.
    ///
    /// `referer` must equal `request_uri` exactly. The form field `approval`
    /// must be `approve` to grant; an optional form `scope` narrows the
    /// grant to a subset of the requested scope.
    pub async fn approve(
        &self,
        request: &AuthorizeRequest,
        form: &HashMap<String, String>,
        owner: &ResourceOwner,
        referer: Option<&str>,
        request_uri: &str,
    ) -> Result<AuthorizeOutcome, AuthorizeError> {
        if referer != Some(request_uri) {
            tracing::warn!(client_id = %request.client_id, "approval rejected: referer mismatch");
            return Err(RequestError::CsrfMismatch.into());
        }

        let verified = self.verify(request, owner).await?;

        if param(form, "approval") != Some("approve") {
            tracing::info!(client_id = %request.client_id, owner = %owner.id, "consent rejected");
            return Err(self.client_error(
                &verified,
                request,
                ErrorCode::AccessDenied,
                "not authorized by resource owner",
            ));
        }

        let scope = match param(form, "scope") {
            Some(raw) => {
                let narrowed =
                    ScopeSet::parse(raw).map_err(|_| RequestError::InvalidApprovedScope)?;
                if !narrowed.is_subset_of(&request.scope) {
                    return Err(RequestError::InvalidApprovedScope.into());
                }
                narrowed
            }
            None => request.scope.clone(),
        };

        let refresh_token = match request.response_type {
            ResponseType::Code => Some(generate_refresh_token()),
            ResponseType::Token => None,
        };
        self.storage
            .upsert_approval(&Approval {
                client_id: verified.client.id().to_string(),
                resource_owner_id: owner.id.clone(),
                scope: scope.clone(),
                refresh_token,
            })
            .await?;
        tracing::info!(client_id = %verified.client.id(), owner = %owner.id, scope = %scope, "consent granted");

        self.issue(&verified, request, &owner.id, &scope, Utc::now())
            .await
    }

    /// Client lookup, redirect URI resolution, profile and scope gates.
    async fn verify(
        &self,
        request: &AuthorizeRequest,
        owner: &ResourceOwner,
    ) -> Result<Verified, AuthorizeError> {
        let client = match self.storage.get_client(&request.client_id).await? {
            Some(client) => client,
            None => self.register_remote_storage_client(request).await?,
        };

        let redirect_uri = match &request.redirect_uri {
            Some(uri) if client.verify_redirect_uri(uri, self.config.allow_regex_redirect_uri) => {
                uri.clone()
            }
            Some(_) => return Err(RequestError::RedirectUriMismatch.into()),
            None => client.redirect_uri().to_string(),
        };
        let verified = Verified {
            client,
            redirect_uri,
        };

        if !verified.client.client_type().allows(request.response_type) {
            return Err(self.client_error(
                &verified,
                request,
                ErrorCode::UnsupportedResponseType,
                "response_type not supported by client profile",
            ));
        }
        if !request.scope.is_subset_of(verified.client.allowed_scope()) {
            return Err(self.client_error(
                &verified,
                request,
                ErrorCode::InvalidScope,
                "not authorized to request this scope",
            ));
        }

        self.storage.upsert_resource_owner(owner).await?;
        Ok(verified)
    }

    /// Register an unknown implicit-grant client whose id and redirect URI
    /// live on the same host, when enabled.
    async fn register_remote_storage_client(
        &self,
        request: &AuthorizeRequest,
    ) -> Result<ClientRecord, AuthorizeError> {
        if !self.config.allow_remote_storage_clients
            || request.response_type != ResponseType::Token
        {
            return Err(RequestError::UnknownClient.into());
        }
        let Some(redirect_uri) = &request.redirect_uri else {
            return Err(RequestError::UnknownClient.into());
        };
        let (Ok(id_url), Ok(redirect_url)) = (Url::parse(&request.client_id), Url::parse(redirect_uri))
        else {
            return Err(RequestError::UnknownClient.into());
        };
        let host = match (id_url.host_str(), redirect_url.host_str()) {
            (Some(a), Some(b)) if a == b => a.to_string(),
            _ => return Err(RequestError::UnknownClient.into()),
        };

        let client = ClientRecord::new(ClientData {
            id: request.client_id.clone(),
            name: host,
            description: None,
            secret: None,
            client_type: ClientType::UserAgentBasedApplication.as_str().to_string(),
            redirect_uri: redirect_uri.clone(),
            icon: None,
            allowed_scope: request.scope.to_string(),
            contact_email: None,
            disable_user_consent: false,
        })
        .map_err(|_| RequestError::UnknownClient)?;

        match self.storage.add_client(&client).await {
            Ok(()) => {
                tracing::info!(client_id = %client.id(), "registered remote storage client");
                Ok(client)
            }
            // Lost a race against a concurrent registration.
            Err(StorageError::Conflict(_)) => self
                .storage
                .get_client(&request.client_id)
                .await?
                .ok_or_else(|| RequestError::UnknownClient.into()),
            Err(e) => Err(e.into()),
        }
    }

    fn client_error(
        &self,
        verified: &Verified,
        request: &AuthorizeRequest,
        code: ErrorCode,
        description: &str,
    ) -> AuthorizeError {
        AuthorizeError::Client(ClientError {
            error: OAuthError::new(code, description),
            redirect_uri: verified.redirect_uri.clone(),
            state: request.state.clone(),
            fragment: request.response_type == ResponseType::Token,
        })
    }

    /// Mint the grant for an approved request.
    async fn issue(
        &self,
        verified: &Verified,
        request: &AuthorizeRequest,
        owner_id: &str,
        scope: &ScopeSet,
        now: DateTime<Utc>,
    ) -> Result<AuthorizeOutcome, AuthorizeError> {
        let client_id = verified.client.id();
        let scope_str = scope.to_string();

        let uri = match request.response_type {
            ResponseType::Token => {
                let token = AccessToken {
                    token: generate_access_token(),
                    client_id: client_id.to_string(),
                    resource_owner_id: owner_id.to_string(),
                    scope: scope.clone(),
                    issue_time: now,
                    expires_in: self.config.access_token_expiry,
                };
                self.storage.store_access_token(&token).await?;
                tracing::debug!(client_id, owner = owner_id, "issued implicit access token");

                let expires_in = token.expires_in.to_string();
                let mut params = vec![
                    ("access_token", token.token.as_str()),
                    ("expires_in", expires_in.as_str()),
                    ("token_type", "bearer"),
                ];
                if !scope.is_empty() {
                    params.push(("scope", scope_str.as_str()));
                }
                if let Some(state) = &request.state {
                    params.push(("state", state.as_str()));
                }
                build_redirect(&verified.redirect_uri, &params, true)
            }
            ResponseType::Code => {
                let code = AuthorizationCode {
                    code: generate_authorization_code(),
                    client_id: client_id.to_string(),
                    resource_owner_id: owner_id.to_string(),
                    redirect_uri: request.redirect_uri.clone(),
                    scope: scope.clone(),
                    issue_time: now,
                };
                self.storage.store_authorization_code(&code).await?;
                tracing::debug!(client_id, owner = owner_id, "issued authorization code");

                let mut params = vec![("code", code.code.as_str())];
                if let Some(state) = &request.state {
                    params.push(("state", state.as_str()));
                }
                build_redirect(&verified.redirect_uri, &params, false)
            }
        };

        Ok(AuthorizeOutcome::Redirect { uri })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::client::tests::client_data;
    use crate::storage::MemoryStorage;

    pub(crate) const REQUEST_URI: &str = "https://auth.example.org/authorize?client_id=x";

    pub(crate) fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    pub(crate) async fn seeded_storage() -> Arc<MemoryStorage> {
        let storage = Arc::new(MemoryStorage::new());
        storage
            .add_client(&ClientRecord::new(client_data("token_client", "user_agent_based_application")).unwrap())
            .await
            .unwrap();

        let mut code_client = client_data("code_client", "code");
        code_client.secret = Some("abcdef".into());
        storage
            .add_client(&ClientRecord::new(code_client).unwrap())
            .await
            .unwrap();

        let mut wide = client_data("wide_client", "native_application");
        wide.allowed_scope = "read write".into();
        storage
            .add_client(&ClientRecord::new(wide).unwrap())
            .await
            .unwrap();

        let mut trusted = client_data("trusted_client", "web_application");
        trusted.disable_user_consent = true;
        trusted.redirect_uri = "https://example.org/cb?app=1".into();
        storage
            .add_client(&ClientRecord::new(trusted).unwrap())
            .await
            .unwrap();
        storage
    }

    fn engine(storage: Arc<MemoryStorage>) -> AuthorizationEngine {
        AuthorizationEngine::new(storage, EngineConfig::default())
    }

    fn request(pairs: &[(&str, &str)]) -> AuthorizeRequest {
        AuthorizeRequest::from_params(&params(pairs)).unwrap()
    }

    fn approve_form() -> HashMap<String, String> {
        params(&[("approval", "approve")])
    }

    fn redirect(outcome: AuthorizeOutcome) -> String {
        match outcome {
            AuthorizeOutcome::Redirect { uri } => uri,
            other => panic!("expected redirect, got {other:?}"),
        }
    }

    fn client_error(err: AuthorizeError) -> ClientError {
        match err {
            AuthorizeError::Client(e) => e,
            other => panic!("expected client error, got {other:?}"),
        }
    }

    fn fragment_params(uri: &str) -> HashMap<String, String> {
        let url = Url::parse(uri).unwrap();
        form_urlencoded::parse(url.fragment().unwrap_or("").as_bytes())
            .into_owned()
            .collect()
    }

    fn query_params(uri: &str) -> HashMap<String, String> {
        Url::parse(uri).unwrap().query_pairs().into_owned().collect()
    }

    #[test]
    fn request_parsing_rejects_bad_syntax() {
        assert_eq!(
            AuthorizeRequest::from_params(&params(&[("response_type", "token")])),
            Err(RequestError::MissingParameter("client_id"))
        );
        assert_eq!(
            AuthorizeRequest::from_params(&params(&[("client_id", "c"), ("response_type", "id_token")])),
            Err(RequestError::InvalidParameter("response_type"))
        );
        assert_eq!(
            AuthorizeRequest::from_params(&params(&[
                ("client_id", "c"),
                ("response_type", "code"),
                ("redirect_uri", "https://example.org/cb#frag"),
            ])),
            Err(RequestError::InvalidParameter("redirect_uri"))
        );
        assert_eq!(
            AuthorizeRequest::from_params(&params(&[
                ("client_id", "c"),
                ("response_type", "code"),
                ("scope", "a  b"),
            ])),
            Err(RequestError::InvalidParameter("scope"))
        );
        assert_eq!(
            AuthorizeRequest::from_params(&params(&[
                ("client_id", "c"),
                ("response_type", "code"),
                ("state", "line\nbreak"),
            ])),
            Err(RequestError::InvalidParameter("state"))
        );
    }

    #[test]
    fn empty_parameters_count_as_omitted() {
        let req = request(&[
            ("client_id", "c"),
            ("response_type", "code"),
            ("state", ""),
            ("redirect_uri", ""),
        ]);
        assert_eq!(req.state, None);
        assert_eq!(req.redirect_uri, None);
        assert!(req.scope.is_empty());
    }

    async fn add_pattern_client(storage: &MemoryStorage) {
        let mut data = client_data("pattern_client", "native_application");
        data.redirect_uri = "https://example.org/storage/[a-z]+/cb".into();
        storage
            .add_client(&ClientRecord::new(data).unwrap())
            .await
            .unwrap();
    }

    fn pattern_request() -> AuthorizeRequest {
        request(&[
            ("client_id", "pattern_client"),
            ("response_type", "code"),
            ("redirect_uri", "https://example.org/storage/alice/cb"),
            ("scope", "read"),
        ])
    }

    #[tokio::test]
    async fn regex_redirect_mode_binds_code_to_requested_uri() {
        let storage = seeded_storage().await;
        add_pattern_client(&storage).await;
        let engine = AuthorizationEngine::new(
            Arc::clone(&storage) as Arc<dyn Storage>,
            EngineConfig {
                allow_regex_redirect_uri: true,
                ..EngineConfig::default()
            },
        );
        let owner = ResourceOwner::new("alice");
        let req = pattern_request();

        assert!(matches!(
            engine.evaluate(&req, &owner).await,
            Ok(AuthorizeOutcome::AskApproval { .. })
        ));
        let uri = redirect(
            engine
                .approve(&req, &approve_form(), &owner, Some(REQUEST_URI), REQUEST_URI)
                .await
                .unwrap(),
        );
        assert!(uri.starts_with("https://example.org/storage/alice/cb?code="), "{uri}");

        let code = query_params(&uri).remove("code").unwrap();
        let stored = storage
            .get_authorization_code(
                "pattern_client",
                &code,
                Some("https://example.org/storage/alice/cb"),
            )
            .await
            .unwrap()
            .expect("code bound to the requested redirect_uri");
        assert_eq!(
            stored.redirect_uri.as_deref(),
            Some("https://example.org/storage/alice/cb")
        );
        assert!(
            storage
                .get_authorization_code("pattern_client", &code, None)
                .await
                .unwrap()
                .is_none()
        );

        // Still anchored: a trailing path does not match.
        let escaped = request(&[
            ("client_id", "pattern_client"),
            ("response_type", "code"),
            ("redirect_uri", "https://example.org/storage/alice/cb/evil"),
        ]);
        assert!(matches!(
            engine.evaluate(&escaped, &owner).await,
            Err(AuthorizeError::Request(RequestError::RedirectUriMismatch))
        ));
    }

    #[tokio::test]
    async fn regex_redirect_mode_is_off_by_default() {
        let storage = seeded_storage().await;
        add_pattern_client(&storage).await;
        let engine = engine(Arc::clone(&storage));
        let owner = ResourceOwner::new("alice");
        let req = pattern_request();

        assert!(matches!(
            engine.evaluate(&req, &owner).await,
            Err(AuthorizeError::Request(RequestError::RedirectUriMismatch))
        ));
        assert!(matches!(
            engine
                .approve(&req, &approve_form(), &owner, Some(REQUEST_URI), REQUEST_URI)
                .await,
            Err(AuthorizeError::Request(RequestError::RedirectUriMismatch))
        ));
    }

    #[tokio::test]
    async fn implicit_flow_asks_then_redirects_with_fragment() {
        let engine = engine(seeded_storage().await);
        let owner = ResourceOwner::new("alice");
        let req = request(&[
            ("client_id", "token_client"),
            ("response_type", "token"),
            ("scope", "read"),
            ("state", "xyz"),
        ]);

        match engine.evaluate(&req, &owner).await.unwrap() {
            AuthorizeOutcome::AskApproval { client, scope } => {
                assert_eq!(client.id(), "token_client");
                assert_eq!(scope.to_string(), "read");
            }
            other => panic!("expected approval prompt, got {other:?}"),
        }

        let uri = redirect(
            engine
                .approve(&req, &approve_form(), &owner, Some(REQUEST_URI), REQUEST_URI)
                .await
                .unwrap(),
        );
        assert!(uri.starts_with("https://example.org/callback.html#access_token="));
        assert!(uri.ends_with("&expires_in=3600&token_type=bearer&scope=read&state=xyz"));
        let fragment = fragment_params(&uri);
        assert_eq!(fragment["access_token"].len(), 32);
        assert!(fragment["access_token"].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn prior_approval_skips_prompt() {
        let storage = seeded_storage().await;
        let engine = engine(Arc::clone(&storage));
        let owner = ResourceOwner::new("alice");
        let req = request(&[
            ("client_id", "token_client"),
            ("response_type", "token"),
            ("scope", "read"),
        ]);
        engine
            .approve(&req, &approve_form(), &owner, Some(REQUEST_URI), REQUEST_URI)
            .await
            .unwrap();

        let uri = redirect(engine.evaluate(&req, &owner).await.unwrap());
        assert!(fragment_params(&uri).contains_key("access_token"));

        // Implicit approvals carry no refresh token.
        let approval = storage.get_approval("token_client", "alice").await.unwrap().unwrap();
        assert_eq!(approval.refresh_token, None);
        assert!(storage.get_resource_owner("alice").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn scope_outside_allowed_scope_redirects_invalid_scope() {
        let engine = engine(seeded_storage().await);
        let req = request(&[
            ("client_id", "token_client"),
            ("response_type", "token"),
            ("scope", "foo"),
            ("state", "xyz"),
        ]);
        let err = client_error(
            engine
                .evaluate(&req, &ResourceOwner::new("alice"))
                .await
                .unwrap_err(),
        );
        assert_eq!(
            err.redirect_uri(),
            "https://example.org/callback.html#error=invalid_scope&error_description=not+authorized+to+request+this+scope&state=xyz"
        );
    }

    #[tokio::test]
    async fn profile_gate_uses_query_for_code_requests() {
        let engine = engine(seeded_storage().await);
        let req = request(&[("client_id", "token_client"), ("response_type", "code")]);
        let err = client_error(
            engine
                .evaluate(&req, &ResourceOwner::new("alice"))
                .await
                .unwrap_err(),
        );
        assert_eq!(err.error.error, ErrorCode::UnsupportedResponseType);
        assert!(
            err.redirect_uri()
                .starts_with("https://example.org/callback.html?error=unsupported_response_type")
        );
    }

    #[tokio::test]
    async fn unknown_client_and_foreign_redirect_are_request_errors() {
        let engine = engine(seeded_storage().await);
        let owner = ResourceOwner::new("alice");

        let unknown = request(&[("client_id", "nobody"), ("response_type", "token")]);
        assert!(matches!(
            engine.evaluate(&unknown, &owner).await,
            Err(AuthorizeError::Request(RequestError::UnknownClient))
        ));

        let foreign = request(&[
            ("client_id", "token_client"),
            ("response_type", "token"),
            ("redirect_uri", "https://evil.example.com/callback.html"),
        ]);
        assert!(matches!(
            engine.evaluate(&foreign, &owner).await,
            Err(AuthorizeError::Request(RequestError::RedirectUriMismatch))
        ));
    }

    #[tokio::test]
    async fn referer_must_match_exactly() {
        let engine = engine(seeded_storage().await);
        let owner = ResourceOwner::new("alice");
        let req = request(&[("client_id", "token_client"), ("response_type", "token")]);

        for referer in [None, Some("https://auth.example.org/authorize?client_id=x&")] {
            assert!(matches!(
                engine
                    .approve(&req, &approve_form(), &owner, referer, REQUEST_URI)
                    .await,
                Err(AuthorizeError::Request(RequestError::CsrfMismatch))
            ));
        }
    }

    #[tokio::test]
    async fn rejecting_consent_is_access_denied() {
        let engine = engine(seeded_storage().await);
        let req = request(&[
            ("client_id", "token_client"),
            ("response_type", "token"),
            ("state", "s1"),
        ]);
        let err = client_error(
            engine
                .approve(
                    &req,
                    &params(&[("approval", "reject")]),
                    &ResourceOwner::new("alice"),
                    Some(REQUEST_URI),
                    REQUEST_URI,
                )
                .await
                .unwrap_err(),
        );
        assert_eq!(err.error.error, ErrorCode::AccessDenied);
        assert!(err.redirect_uri().ends_with("&state=s1"));
    }

    #[tokio::test]
    async fn code_flow_binds_requested_redirect_uri() {
        let storage = seeded_storage().await;
        let engine = engine(Arc::clone(&storage));
        let owner = ResourceOwner::new("alice");
        let req = request(&[
            ("client_id", "code_client"),
            ("response_type", "code"),
            ("scope", "read"),
            ("state", "xyz"),
        ]);
        let uri = redirect(
            engine
                .approve(&req, &approve_form(), &owner, Some(REQUEST_URI), REQUEST_URI)
                .await
                .unwrap(),
        );
        assert!(uri.starts_with("https://example.org/callback.html?code="));
        let query = query_params(&uri);
        assert_eq!(query["state"], "xyz");

        // Issued without redirect_uri, so stored without one.
        let code = storage
            .get_authorization_code("code_client", &query["code"], None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(code.redirect_uri, None);
        assert_eq!(code.scope.to_string(), "read");

        let approval = storage.get_approval("code_client", "alice").await.unwrap().unwrap();
        assert!(approval.refresh_token.is_some());
    }

    #[tokio::test]
    async fn disabled_consent_issues_without_storing_approval() {
        let storage = seeded_storage().await;
        let engine = engine(Arc::clone(&storage));
        let req = request(&[
            ("client_id", "trusted_client"),
            ("response_type", "code"),
            ("scope", "read"),
        ]);
        let uri = redirect(
            engine
                .evaluate(&req, &ResourceOwner::new("alice"))
                .await
                .unwrap(),
        );
        assert!(uri.starts_with("https://example.org/cb?app=1&code="));
        assert!(storage.get_approval("trusted_client", "alice").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn reconsent_replaces_scope_instead_of_union() {
        let storage = seeded_storage().await;
        let engine = engine(Arc::clone(&storage));
        let owner = ResourceOwner::new("alice");

        let wide = request(&[
            ("client_id", "wide_client"),
            ("response_type", "code"),
            ("scope", "read write"),
        ]);
        engine
            .approve(&wide, &approve_form(), &owner, Some(REQUEST_URI), REQUEST_URI)
            .await
            .unwrap();
        let first = storage.get_approval("wide_client", "alice").await.unwrap().unwrap();

        let narrow = request(&[
            ("client_id", "wide_client"),
            ("response_type", "code"),
            ("scope", "read"),
        ]);
        engine
            .approve(&narrow, &approve_form(), &owner, Some(REQUEST_URI), REQUEST_URI)
            .await
            .unwrap();

        let second = storage.get_approval("wide_client", "alice").await.unwrap().unwrap();
        assert_eq!(second.scope.to_string(), "read");
        assert_eq!(second.refresh_token, first.refresh_token);

        // The narrower approval no longer covers the wide request.
        assert!(matches!(
            engine.evaluate(&wide, &owner).await.unwrap(),
            AuthorizeOutcome::AskApproval { .. }
        ));
    }

    #[tokio::test]
    async fn partial_consent_must_narrow() {
        let storage = seeded_storage().await;
        let engine = engine(Arc::clone(&storage));
        let owner = ResourceOwner::new("alice");
        let req = request(&[
            ("client_id", "wide_client"),
            ("response_type", "token"),
            ("scope", "read write"),
        ]);

        let uri = redirect(
            engine
                .approve(
                    &req,
                    &params(&[("approval", "approve"), ("scope", "read")]),
                    &owner,
                    Some(REQUEST_URI),
                    REQUEST_URI,
                )
                .await
                .unwrap(),
        );
        assert_eq!(fragment_params(&uri)["scope"], "read");

        assert!(matches!(
            engine
                .approve(
                    &req,
                    &params(&[("approval", "approve"), ("scope", "read admin")]),
                    &owner,
                    Some(REQUEST_URI),
                    REQUEST_URI,
                )
                .await,
            Err(AuthorizeError::Request(RequestError::InvalidApprovedScope))
        ));
    }

    #[tokio::test]
    async fn remote_storage_clients_register_when_enabled() {
        let storage = seeded_storage().await;
        let req = request(&[
            ("client_id", "https://app.example.net"),
            ("response_type", "token"),
            ("redirect_uri", "https://app.example.net/receiver.html"),
            ("scope", "music:rw"),
        ]);
        let owner = ResourceOwner::new("alice");

        let disabled = engine(Arc::clone(&storage));
        assert!(matches!(
            disabled.evaluate(&req, &owner).await,
            Err(AuthorizeError::Request(RequestError::UnknownClient))
        ));

        let enabled = AuthorizationEngine::new(
            Arc::clone(&storage) as Arc<dyn Storage>,
            EngineConfig {
                allow_remote_storage_clients: true,
                ..EngineConfig::default()
            },
        );
        assert!(matches!(
            enabled.evaluate(&req, &owner).await.unwrap(),
            AuthorizeOutcome::AskApproval { .. }
        ));
        let client = storage
            .get_client("https://app.example.net")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(client.client_type(), ClientType::UserAgentBasedApplication);
        assert_eq!(client.allowed_scope().to_string(), "music:rw");

        let other_host = request(&[
            ("client_id", "https://app.example.net"),
            ("response_type", "token"),
            ("redirect_uri", "https://elsewhere.example.net/receiver.html"),
        ]);
        assert!(matches!(
            enabled.evaluate(&other_host, &owner).await,
            Err(AuthorizeError::Request(RequestError::RedirectUriMismatch))
        ));
    }
}
