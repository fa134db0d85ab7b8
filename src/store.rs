use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use time::OffsetDateTime;

use crate::error::Error;
use crate::token::TokenBundle;

/// Platform key-value storage (secure storage, or tab-scoped session storage on web).
#[async_trait::async_trait]
pub trait Storage: Send + Sync {
    async fn read(&self, key: &str) -> Result<Option<String>, Error>;

    async fn write(&self, key: &str, value: &str) -> Result<(), Error>;

    async fn delete(&self, key: &str) -> Result<(), Error>;

    /// Read and delete in one step.
    ///
    /// Implementations backed by a shared store should override this so two
    /// readers can never both observe the value.
    async fn take(&self, key: &str) -> Result<Option<String>, Error> {
        let value = self.read(key).await?;
        if value.is_some() {
            self.delete(key).await?;
        }
        Ok(value)
    }
}

/// In-memory storage. Cloning shares the underlying map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    inner: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.lock().contains_key(key)
    }
}

#[async_trait::async_trait]
impl Storage for MemoryStorage {
    async fn read(&self, key: &str) -> Result<Option<String>, Error> {
        Ok(self.inner.lock().get(key).cloned())
    }

    async fn write(&self, key: &str, value: &str) -> Result<(), Error> {
        self.inner.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), Error> {
        self.inner.lock().remove(key);
        Ok(())
    }

    async fn take(&self, key: &str) -> Result<Option<String>, Error> {
        Ok(self.inner.lock().remove(key))
    }
}

const ACCESS_TOKEN: &str = "access_token";
const REFRESH_TOKEN: &str = "refresh_token";
const ID_TOKEN: &str = "id_token";
const EXPIRES_AT: &str = "expires_at";

pub const DEFAULT_KEY_PREFIX: &str = "estate.auth.";

/// Persists a [`TokenBundle`] as one storage key per field.
#[derive(Clone)]
pub struct TokenStore {
    storage: Arc<dyn Storage>,
    prefix: String,
}

impl TokenStore {
    #[must_use]
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            prefix: DEFAULT_KEY_PREFIX.to_string(),
        }
    }

    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    fn key(&self, field: &str) -> String {
        format!("{}{field}", self.prefix)
    }

    /// # Errors
    ///
    /// Propagates storage failures.
    pub async fn save(&self, bundle: &TokenBundle) -> Result<(), Error> {
        self.storage
            .write(&self.key(ACCESS_TOKEN), &bundle.access_token)
            .await?;
        self.storage.write(&self.key(ID_TOKEN), &bundle.id_token).await?;
        match &bundle.refresh_token {
            Some(token) => self.storage.write(&self.key(REFRESH_TOKEN), token).await?,
            None => self.storage.delete(&self.key(REFRESH_TOKEN)).await?,
        }
        // Written last: a bundle without an expiry loads as absent.
        self.storage
            .write(
                &self.key(EXPIRES_AT),
                &bundle.expires_at.unix_timestamp().to_string(),
            )
            .await
    }

    /// Load the stored bundle; missing or unreadable fields yield `None`.
    ///
    /// # Errors
    ///
    /// Propagates storage failures.
    pub async fn load(&self) -> Result<Option<TokenBundle>, Error> {
        let Some(expires_at) = self.storage.read(&self.key(EXPIRES_AT)).await? else {
            return Ok(None);
        };
        let Some(expires_at) = expires_at
            .parse::<i64>()
            .ok()
            .and_then(|ts| OffsetDateTime::from_unix_timestamp(ts).ok())
        else {
            tracing::warn!("Stored token expiry is unreadable, ignoring stored session");
            return Ok(None);
        };
        let (Some(access_token), Some(id_token)) = (
            self.storage.read(&self.key(ACCESS_TOKEN)).await?,
            self.storage.read(&self.key(ID_TOKEN)).await?,
        ) else {
            return Ok(None);
        };
        let refresh_token = self.storage.read(&self.key(REFRESH_TOKEN)).await?;

        Ok(Some(TokenBundle::new(
            access_token,
            refresh_token,
            id_token,
            expires_at,
        )))
    }

    /// Remove every stored field. Attempts all deletes before reporting a failure.
    ///
    /// # Errors
    ///
    /// Returns the first storage failure encountered.
    pub async fn clear(&self) -> Result<(), Error> {
        let mut first_error = None;
        for field in [EXPIRES_AT, ACCESS_TOKEN, REFRESH_TOKEN, ID_TOKEN] {
            if let Err(e) = self.storage.delete(&self.key(field)).await {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    #[tokio::test]
    async fn memory_take_deletes() {
        let storage = MemoryStorage::new();
        storage.write("k", "v").await.unwrap();
        assert_eq!(storage.take("k").await.unwrap().as_deref(), Some("v"));
        assert_eq!(storage.take("k").await.unwrap(), None);
        assert!(storage.is_empty());
    }

    #[tokio::test]
    async fn token_store_round_trip() {
        let storage = MemoryStorage::new();
        let store = TokenStore::new(Arc::new(storage.clone()));
        let bundle = TokenBundle::new(
            "at",
            Some("rt".into()),
            "a.b.c",
            datetime!(2030-01-01 0:00 UTC),
        );

        store.save(&bundle).await.unwrap();
        assert!(storage.contains_key("estate.auth.access_token"));
        assert_eq!(store.load().await.unwrap(), Some(bundle));

        store.clear().await.unwrap();
        assert!(storage.is_empty());
        assert_eq!(store.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn saving_without_refresh_token_drops_old_one() {
        let storage = MemoryStorage::new();
        let store = TokenStore::new(Arc::new(storage.clone())).with_prefix("t.");
        let at = datetime!(2030-01-01 0:00 UTC);

        store
            .save(&TokenBundle::new("at", Some("rt".into()), "id", at))
            .await
            .unwrap();
        store.save(&TokenBundle::new("at2", None, "id", at)).await.unwrap();

        assert!(!storage.contains_key("t.refresh_token"));
        assert_eq!(store.load().await.unwrap().unwrap().refresh_token, None);
    }

    #[tokio::test]
    async fn partial_bundle_loads_as_absent() {
        let storage = MemoryStorage::new();
        storage.write("estate.auth.access_token", "at").await.unwrap();
        storage.write("estate.auth.expires_at", "1893456000").await.unwrap();
        let store = TokenStore::new(Arc::new(storage));
        assert_eq!(store.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn garbage_expiry_loads_as_absent() {
        let storage = MemoryStorage::new();
        storage.write("estate.auth.expires_at", "soon").await.unwrap();
        let store = TokenStore::new(Arc::new(storage));
        assert_eq!(store.load().await.unwrap(), None);
    }
}
