//! Registered client applications.
//!
//! `ClientData` is the raw, serializable shape used by the management API,
//! the CLI import and the storage rows. `ClientRecord` is the validated form
//! the engines work with; it can only be obtained through
//! [`ClientRecord::new`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::scope::ScopeSet;
use crate::tokens::generate_client_secret;

/// A client failed validation. `field` names the offending input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid client field `{field}`: {reason}")]
pub struct InvalidClient {
    pub field: &'static str,
    pub reason: String,
}

impl InvalidClient {
    fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

/// Client profile, per RFC 6749 section 2.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientType {
    WebApplication,
    NativeApplication,
    UserAgentBasedApplication,
}

impl ClientType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WebApplication => "web_application",
            Self::NativeApplication => "native_application",
            Self::UserAgentBasedApplication => "user_agent_based_application",
        }
    }

    /// Whether this profile may use `response_type`.
    pub fn allows(&self, response_type: ResponseType) -> bool {
        match response_type {
            ResponseType::Code => matches!(self, Self::WebApplication | Self::NativeApplication),
            ResponseType::Token => matches!(
                self,
                Self::NativeApplication | Self::UserAgentBasedApplication
            ),
        }
    }
}

impl fmt::Display for ClientType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClientType {
    type Err = InvalidClient;

    /// Accepts the profile names plus the legacy `code`/`token` aliases.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "web_application" | "code" => Ok(Self::WebApplication),
            "native_application" => Ok(Self::NativeApplication),
            "user_agent_based_application" | "token" => Ok(Self::UserAgentBasedApplication),
            other => Err(InvalidClient::new(
                "type",
                format!("unsupported client type {other:?}"),
            )),
        }
    }
}

/// The `response_type` of an authorization request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseType {
    Code,
    Token,
}

impl ResponseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Code => "code",
            Self::Token => "token",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "code" => Some(Self::Code),
            "token" => Some(Self::Token),
            _ => None,
        }
    }
}

/// Unvalidated client description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientData {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    #[serde(rename = "type")]
    pub client_type: String,
    pub redirect_uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default)]
    pub allowed_scope: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_email: Option<String>,
    #[serde(default)]
    pub disable_user_consent: bool,
}

/// A validated, immutable client registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientRecord {
    id: String,
    name: String,
    description: Option<String>,
    secret: Option<String>,
    client_type: ClientType,
    redirect_uri: String,
    icon: Option<String>,
    allowed_scope: ScopeSet,
    contact_email: Option<String>,
    disable_user_consent: bool,
}

fn is_visible_ascii(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| (0x21..=0x7e).contains(&b))
}

fn validate_absolute_url(field: &'static str, value: &str) -> Result<(), InvalidClient> {
    let url = Url::parse(value).map_err(|e| InvalidClient::new(field, e.to_string()))?;
    if url.fragment().is_some() {
        return Err(InvalidClient::new(field, "must not contain a fragment"));
    }
    Ok(())
}

fn validate_email(value: &str) -> Result<(), InvalidClient> {
    let valid = match value.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.is_empty()
                && !domain.contains('@')
                && !value.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(InvalidClient::new("contact_email", "not an email address"))
    }
}

fn non_empty(field: &'static str, value: Option<String>) -> Result<Option<String>, InvalidClient> {
    match value {
        Some(v) if v.trim().is_empty() => Err(InvalidClient::new(field, "must not be empty")),
        other => Ok(other),
    }
}

impl ClientRecord {
    /// Validate `data` into a client record.
    ///
    /// A `web_application` registered without a secret gets a generated one,
    /// unless its id contains `:` (URL-shaped ids belong to self-registered
    /// clients that cannot receive a secret).
    pub fn new(data: ClientData) -> Result<Self, InvalidClient> {
        if !is_visible_ascii(&data.id) {
            return Err(InvalidClient::new("id", "must be non-empty visible ASCII"));
        }
        if data.name.trim().is_empty() {
            return Err(InvalidClient::new("name", "must not be empty"));
        }
        let description = non_empty("description", data.description)?;
        let client_type: ClientType = data.client_type.parse()?;

        let secret = match data.secret {
            Some(secret) if !is_visible_ascii(&secret) => {
                return Err(InvalidClient::new(
                    "secret",
                    "must be non-empty visible ASCII",
                ));
            }
            Some(secret) => Some(secret),
            None if client_type == ClientType::WebApplication => {
                if data.id.contains(':') {
                    return Err(InvalidClient::new(
                        "secret",
                        "required for web_application clients",
                    ));
                }
                Some(generate_client_secret())
            }
            None => None,
        };

        validate_absolute_url("redirect_uri", &data.redirect_uri)?;
        let icon = non_empty("icon", data.icon)?;
        if let Some(icon) = &icon {
            validate_absolute_url("icon", icon)?;
        }
        let allowed_scope = ScopeSet::parse(&data.allowed_scope)
            .map_err(|e| InvalidClient::new("allowed_scope", e.to_string()))?;
        let contact_email = non_empty("contact_email", data.contact_email)?;
        if let Some(email) = &contact_email {
            validate_email(email)?;
        }

        Ok(Self {
            id: data.id,
            name: data.name,
            description,
            secret,
            client_type,
            redirect_uri: data.redirect_uri,
            icon,
            allowed_scope,
            contact_email,
            disable_user_consent: data.disable_user_consent,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn secret(&self) -> Option<&str> {
        self.secret.as_deref()
    }

    pub fn client_type(&self) -> ClientType {
        self.client_type
    }

    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    pub fn icon(&self) -> Option<&str> {
        self.icon.as_deref()
    }

    pub fn allowed_scope(&self) -> &ScopeSet {
        &self.allowed_scope
    }

    pub fn contact_email(&self) -> Option<&str> {
        self.contact_email.as_deref()
    }

    pub fn disable_user_consent(&self) -> bool {
        self.disable_user_consent
    }

    /// Check a requested redirect URI against the registration.
    ///
    /// Exact matches always pass. With `allow_regex_mode` the registered URI
    /// is also tried as the anchored pattern `^<redirect_uri>$`.
    pub fn verify_redirect_uri(&self, candidate: &str, allow_regex_mode: bool) -> bool {
        if candidate == self.redirect_uri {
            return true;
        }
        if !allow_regex_mode {
            return false;
        }
        match regex::Regex::new(&format!("^{}$", self.redirect_uri)) {
            Ok(re) => re.is_match(candidate),
            Err(e) => {
                tracing::warn!(client_id = %self.id, error = %e, "registered redirect_uri is not a valid pattern");
                false
            }
        }
    }
}

impl From<&ClientRecord> for ClientData {
    fn from(client: &ClientRecord) -> Self {
        Self {
            id: client.id.clone(),
            name: client.name.clone(),
            description: client.description.clone(),
            secret: client.secret.clone(),
            client_type: client.client_type.as_str().to_string(),
            redirect_uri: client.redirect_uri.clone(),
            icon: client.icon.clone(),
            allowed_scope: client.allowed_scope.to_string(),
            contact_email: client.contact_email.clone(),
            disable_user_consent: client.disable_user_consent,
        }
    }
}

impl Serialize for ClientRecord {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        ClientData::from(self).serialize(serializer)
    }
}
