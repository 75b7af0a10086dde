//! Housekeeping for expired grants.
//!
//! Expiry is always checked at use time, so purging is advisory: it only
//! keeps the tables small.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::models::grant::AUTHORIZATION_CODE_EXPIRY_SECS;
use crate::storage::{Storage, StorageError};

/// How long expired rows are kept before they are purged.
pub const PURGE_MARGIN_SECS: i64 = 8 * 60 * 60;

/// Rows removed by one purge run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeReport {
    pub access_tokens: u64,
    pub authorization_codes: u64,
}

/// Delete access tokens and authorization codes that expired more than
/// [`PURGE_MARGIN_SECS`] before `now`.
pub async fn purge_expired(
    storage: &dyn Storage,
    now: DateTime<Utc>,
) -> Result<PurgeReport, StorageError> {
    let cutoff = now - Duration::seconds(PURGE_MARGIN_SECS);
    let access_tokens = storage.delete_expired_access_tokens(cutoff).await?;
    let authorization_codes = storage
        .delete_expired_authorization_codes(
            cutoff - Duration::seconds(AUTHORIZATION_CODE_EXPIRY_SECS),
        )
        .await?;
    Ok(PurgeReport {
        access_tokens,
        authorization_codes,
    })
}

/// Run [`purge_expired`] every `every` until `cancel` fires.
pub fn spawn_purge_task(
    storage: Arc<dyn Storage>,
    every: StdDuration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    match purge_expired(storage.as_ref(), Utc::now()).await {
                        Ok(report) => tracing::debug!(
                            access_tokens = report.access_tokens,
                            authorization_codes = report.authorization_codes,
                            "purged expired grants"
                        ),
                        Err(e) => tracing::warn!(error = %e, "purging expired grants failed"),
                    }
                }
            }
        }
        tracing::debug!("purge task stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AccessToken, AuthorizationCode};
    use crate::scope::ScopeSet;
    use crate::storage::MemoryStorage;

    fn token(value: &str, issue_time: DateTime<Utc>) -> AccessToken {
        AccessToken {
            token: value.into(),
            client_id: "c".into(),
            resource_owner_id: "o".into(),
            scope: ScopeSet::empty(),
            issue_time,
            expires_in: 3600,
        }
    }

    fn code(value: &str, issue_time: DateTime<Utc>) -> AuthorizationCode {
        AuthorizationCode {
            code: value.into(),
            client_id: "c".into(),
            resource_owner_id: "o".into(),
            redirect_uri: None,
            scope: ScopeSet::empty(),
            issue_time,
        }
    }

    #[tokio::test]
    async fn purge_keeps_rows_within_margin() {
        let storage = MemoryStorage::new();
        let now = Utc::now();
        // Expired 9h ago: gone. Expired 7h ago: kept.
        storage.store_access_token(&token("old", now - Duration::hours(10))).await.unwrap();
        storage.store_access_token(&token("recent", now - Duration::hours(8))).await.unwrap();
        storage.store_authorization_code(&code("old", now - Duration::hours(9))).await.unwrap();
        storage
            .store_authorization_code(&code("recent", now - Duration::hours(8)))
            .await
            .unwrap();

        let report = purge_expired(&storage, now).await.unwrap();
        assert_eq!(
            report,
            PurgeReport {
                access_tokens: 1,
                authorization_codes: 1
            }
        );
        assert!(storage.get_access_token("recent").await.unwrap().is_some());
        assert!(storage.get_access_token("old").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn purge_task_stops_on_cancel() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let cancel = CancellationToken::new();
        let handle = spawn_purge_task(storage, StdDuration::from_millis(10), cancel.clone());
        tokio::time::sleep(StdDuration::from_millis(30)).await;
        cancel.cancel();
        handle.await.unwrap();
    }
}
