use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use crate::error::Error;
use crate::oauth::AuthorizationRequest;
use crate::store::Storage;

/// A login transaction older than this is considered abandoned.
pub const MAX_TRANSACTION_AGE: Duration = Duration::minutes(10);

/// Flow-scoped secrets kept between the redirect and the callback.
///
/// Stored as a single value so it is written and consumed in one step.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct PendingAuthTransaction {
    pub state: String,
    pub code_verifier: String,
    pub nonce: String,
    #[serde(with = "time::serde::timestamp")]
    pub created_at: OffsetDateTime,
}

impl std::fmt::Debug for PendingAuthTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingAuthTransaction")
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

impl PendingAuthTransaction {
    #[must_use]
    pub fn new(request: &AuthorizationRequest, created_at: OffsetDateTime) -> Self {
        Self {
            state: request.state.clone(),
            code_verifier: request.code_verifier.clone(),
            nonce: request.nonce.clone(),
            created_at,
        }
    }

    /// Key under `prefix`, the same prefix the token store uses.
    pub(crate) fn storage_key(prefix: &str) -> String {
        format!("{prefix}pending")
    }

    #[must_use]
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        now - self.created_at > MAX_TRANSACTION_AGE
    }

    /// Persist, replacing any earlier pending transaction.
    ///
    /// # Errors
    ///
    /// Propagates storage failures.
    pub async fn save(&self, storage: &dyn Storage, prefix: &str) -> Result<(), Error> {
        let value = serde_json::to_string(self)
            .map_err(|e| Error::Storage(format!("encode login transaction: {e}")))?;
        storage.write(&Self::storage_key(prefix), &value).await
    }

    /// Read and delete the pending transaction; a second call sees `None`.
    ///
    /// # Errors
    ///
    /// Propagates storage failures; an undecodable value is [`Error::FlowCorrupted`].
    pub async fn take(storage: &dyn Storage, prefix: &str) -> Result<Option<Self>, Error> {
        let Some(value) = storage.take(&Self::storage_key(prefix)).await? else {
            return Ok(None);
        };
        serde_json::from_str(&value)
            .map(Some)
            .map_err(|e| Error::FlowCorrupted(format!("unreadable login transaction: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;
    use crate::store::{DEFAULT_KEY_PREFIX, MemoryStorage};

    fn transaction(created_at: OffsetDateTime) -> PendingAuthTransaction {
        PendingAuthTransaction {
            state: "s".into(),
            code_verifier: "v".into(),
            nonce: "n".into(),
            created_at,
        }
    }

    #[tokio::test]
    async fn take_is_single_use() {
        let storage = MemoryStorage::new();
        let tx = transaction(datetime!(2026-01-01 0:00 UTC));
        tx.save(&storage, DEFAULT_KEY_PREFIX).await.unwrap();

        assert_eq!(
            PendingAuthTransaction::take(&storage, DEFAULT_KEY_PREFIX)
                .await
                .unwrap(),
            Some(tx)
        );
        assert_eq!(
            PendingAuthTransaction::take(&storage, DEFAULT_KEY_PREFIX)
                .await
                .unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn prefixes_keep_transactions_apart() {
        let storage = MemoryStorage::new();
        let first = transaction(datetime!(2026-01-01 0:00 UTC));
        let mut second = transaction(datetime!(2026-01-01 0:00 UTC));
        second.state = "other".into();
        first.save(&storage, "tenant1.").await.unwrap();
        second.save(&storage, "tenant2.").await.unwrap();

        assert!(storage.contains_key("tenant1.pending"));
        let taken = PendingAuthTransaction::take(&storage, "tenant2.")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(taken.state, "other");
        assert_eq!(
            PendingAuthTransaction::take(&storage, "tenant1.")
                .await
                .unwrap(),
            Some(first)
        );
    }

    #[tokio::test]
    async fn garbage_is_flow_corrupted() {
        let storage = MemoryStorage::new();
        storage
            .write(
                &PendingAuthTransaction::storage_key(DEFAULT_KEY_PREFIX),
                "{not json",
            )
            .await
            .unwrap();
        assert!(matches!(
            PendingAuthTransaction::take(&storage, DEFAULT_KEY_PREFIX).await,
            Err(Error::FlowCorrupted(_))
        ));
    }

    #[test]
    fn expiry() {
        let created = datetime!(2026-01-01 0:00 UTC);
        let tx = transaction(created);
        assert!(!tx.is_expired(created + Duration::minutes(10)));
        assert!(tx.is_expired(created + Duration::minutes(11)));
    }

    #[test]
    fn debug_hides_secrets() {
        let debug = format!("{:?}", transaction(datetime!(2026-01-01 0:00 UTC)));
        assert!(!debug.contains("code_verifier"));
    }
}
