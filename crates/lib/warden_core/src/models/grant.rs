//! Approvals, authorization codes and access tokens.

use chrono::{DateTime, Duration, Utc};

use crate::scope::ScopeSet;

/// Authorization code lifetime: 10 minutes.
pub const AUTHORIZATION_CODE_EXPIRY_SECS: i64 = 600;

/// A resource owner's standing consent for one client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Approval {
    pub client_id: String,
    pub resource_owner_id: String,
    pub scope: ScopeSet,
    /// Only present for approvals made through the code flow.
    pub refresh_token: Option<String>,
}

/// A single-use authorization code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationCode {
    pub code: String,
    pub client_id: String,
    pub resource_owner_id: String,
    /// The `redirect_uri` the authorization request carried, if any.
    pub redirect_uri: Option<String>,
    pub scope: ScopeSet,
    pub issue_time: DateTime<Utc>,
}

impl AuthorizationCode {
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.issue_time + Duration::seconds(AUTHORIZATION_CODE_EXPIRY_SECS)
    }

    /// Codes are redeemable up to and including their expiry instant.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at()
    }
}

/// An opaque bearer access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub token: String,
    pub client_id: String,
    pub resource_owner_id: String,
    pub scope: ScopeSet,
    pub issue_time: DateTime<Utc>,
    /// Lifetime in seconds.
    pub expires_in: i64,
}

impl AccessToken {
    /// `None` when the lifetime does not fit the calendar.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        Duration::try_seconds(self.expires_in)
            .and_then(|lifetime| self.issue_time.checked_add_signed(lifetime))
    }

    /// A token whose expiry cannot be computed is never valid.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().is_some_and(|expires_at| now < expires_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(issued_secs_ago: i64, expires_in: i64, now: DateTime<Utc>) -> AccessToken {
        AccessToken {
            token: "t".into(),
            client_id: "c".into(),
            resource_owner_id: "o".into(),
            scope: ScopeSet::empty(),
            issue_time: now - Duration::seconds(issued_secs_ago),
            expires_in,
        }
    }

    #[test]
    fn access_token_validity_is_exclusive_of_expiry() {
        let now = Utc::now();
        assert!(token(1233, 1234, now).is_valid_at(now));
        assert!(!token(1234, 1234, now).is_valid_at(now));
        assert!(!token(1235, 1234, now).is_valid_at(now));
    }

    #[test]
    fn overflowing_lifetime_is_invalid() {
        let now = Utc::now();
        for expires_in in [i64::MAX, i64::MIN] {
            let token = token(0, expires_in, now);
            assert_eq!(token.expires_at(), None);
            assert!(!token.is_valid_at(now));
        }
    }

    #[test]
    fn code_expires_after_ten_minutes() {
        let now = Utc::now();
        let mut code = AuthorizationCode {
            code: "c".into(),
            client_id: "c".into(),
            resource_owner_id: "o".into(),
            redirect_uri: None,
            scope: ScopeSet::empty(),
            issue_time: now - Duration::seconds(600),
        };
        assert!(!code.is_expired_at(now));
        code.issue_time = now - Duration::seconds(601);
        assert!(code.is_expired_at(now));
    }
}
