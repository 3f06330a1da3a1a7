use std::{collections::BTreeMap, fmt::Debug, sync::Arc};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::core::credential_offer::CredentialOffer;

pub use oid4vci_frontend::IssueStatus;

/// State of one credential offer, stored under its `issuer_state` and its pre-authorized code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialOfferSession {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer_state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_authorized_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    pub credential_offer: CredentialOffer,
    pub status: IssueStatus,
    /// Transaction code the wallet has to present at the token endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_pin: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CredentialOfferSession {
    /// Every key the session is reachable under.
    pub fn keys(&self) -> Vec<&str> {
        self.issuer_state
            .iter()
            .chain(self.pre_authorized_code.iter())
            .map(String::as_str)
            .collect()
    }

    pub fn is_expired(&self, ttl_seconds: u64, now: DateTime<Utc>) -> bool {
        elapsed_beyond(self.last_updated_at, ttl_seconds, now)
    }
}

pub(crate) fn elapsed_beyond(since: DateTime<Utc>, seconds: u64, now: DateTime<Utc>) -> bool {
    (now - since).num_seconds() > i64::try_from(seconds).unwrap_or(i64::MAX)
}

/// Key/value storage for issuer state.
///
/// `delete` and `set_new` must be atomic: when several callers delete the same key concurrently,
/// exactly one of them receives the value, and when several insert the same new key exactly one
/// of them succeeds.
#[async_trait]
pub trait Store<K, V>: Debug
where
    K: Send + Sync + 'static,
    V: Send + 'static,
{
    async fn get(&self, key: &K) -> Result<Option<V>>;

    async fn set(&self, key: K, value: V) -> Result<()>;

    /// Insert an entry unless the key is already present. Returns whether it was inserted.
    async fn set_new(&self, key: K, value: V) -> Result<bool>;

    /// Remove an entry, returning it when it was present.
    async fn delete(&self, key: &K) -> Result<Option<V>>;

    async fn has(&self, key: &K) -> Result<bool> {
        Ok(self.get(key).await?.is_some())
    }
}

/// A local in-memory store. Not for production use!
///
/// # Warning
/// This in-memory store should only be used for test purposes, it will not work for a distributed
/// deployment.
#[derive(Debug, Clone)]
pub struct MemoryStore<K, V> {
    store: Arc<Mutex<BTreeMap<K, V>>>,
}

impl<K, V> Default for MemoryStore<K, V> {
    fn default() -> Self {
        Self {
            store: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }
}

impl<K, V> MemoryStore<K, V> {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl<K, V> Store<K, V> for MemoryStore<K, V>
where
    K: Ord + Debug + Send + Sync + 'static,
    V: Clone + Debug + Send + Sync + 'static,
{
    async fn get(&self, key: &K) -> Result<Option<V>> {
        Ok(self.store.lock().await.get(key).cloned())
    }

    async fn set(&self, key: K, value: V) -> Result<()> {
        self.store.lock().await.insert(key, value);
        Ok(())
    }

    async fn set_new(&self, key: K, value: V) -> Result<bool> {
        let mut store = self.store.lock().await;
        if store.contains_key(&key) {
            return Ok(false);
        }
        store.insert(key, value);
        Ok(true)
    }

    async fn delete(&self, key: &K) -> Result<Option<V>> {
        Ok(self.store.lock().await.remove(key))
    }

    async fn has(&self, key: &K) -> Result<bool> {
        Ok(self.store.lock().await.contains_key(key))
    }
}
