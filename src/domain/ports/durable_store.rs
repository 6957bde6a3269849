//! Durable client-side key-value store port.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::domain::errors::DomainResult;

/// String values that survive a client restart.
#[async_trait]
pub trait DurableStore: Send + Sync {
    async fn get(&self, key: &str) -> DomainResult<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> DomainResult<()>;

    /// Removing a missing key is not an error.
    async fn remove(&self, key: &str) -> DomainResult<()>;
}

/// Read a JSON value stored under `key`.
pub async fn get_json<T: DeserializeOwned>(store: &dyn DurableStore, key: &str) -> DomainResult<Option<T>> {
    match store.get(key).await? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

/// Store `value` as JSON under `key`.
pub async fn set_json<T: Serialize + Sync>(store: &dyn DurableStore, key: &str, value: &T) -> DomainResult<()> {
    let raw = serde_json::to_string(value)?;
    store.set(key, &raw).await
}
