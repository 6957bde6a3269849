//! SQLite-backed durable key/value store.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;

use crate::domain::errors::DomainResult;
use crate::domain::ports::DurableStore;

#[derive(Clone)]
pub struct SqliteDurableStore {
    pool: SqlitePool,
}

impl SqliteDurableStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DurableStore for SqliteDurableStore {
    async fn get(&self, key: &str) -> DomainResult<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM client_state WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(value,)| value))
    }

    async fn set(&self, key: &str, value: &str) -> DomainResult<()> {
        sqlx::query(
            "INSERT INTO client_state (key, value, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> DomainResult<()> {
        sqlx::query("DELETE FROM client_state WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_migrated_test_pool;
    use crate::domain::ports::{get_json, set_json};
    use crate::services::{InFlightComparison, IN_FLIGHT_KEY};

    async fn setup() -> SqliteDurableStore {
        SqliteDurableStore::new(create_migrated_test_pool().await.unwrap())
    }

    #[tokio::test]
    async fn test_set_get_overwrite_remove() {
        let store = setup().await;
        assert_eq!(store.get("k").await.unwrap(), None);

        store.set("k", "one").await.unwrap();
        store.set("k", "two").await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("two"));

        store.remove("k").await.unwrap();
        store.remove("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_in_flight_marker_is_camel_case_json() {
        let store = setup().await;
        let marker = InFlightComparison {
            comparison_id: "cmp-42".into(),
            started_at: Utc::now(),
        };
        set_json(&store, IN_FLIGHT_KEY, &marker).await.unwrap();

        let raw = store.get(IN_FLIGHT_KEY).await.unwrap().unwrap();
        assert!(raw.contains("\"comparisonId\":\"cmp-42\""));
        assert!(raw.contains("\"startedAt\""));

        let back: InFlightComparison = get_json(&store, IN_FLIGHT_KEY).await.unwrap().unwrap();
        assert_eq!(back, marker);
    }
}
