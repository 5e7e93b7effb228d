//! Redis cache store. Entries are JSON strings written with `SET EX`, so
//! expiry is enforced server-side.

use super::{CacheEntry, CacheStore};
use redis::{aio::ConnectionManager, AsyncCommands, Client};
use std::time::Duration;
use taxguide_core::{AppError, AppResult};

const KEY_PREFIX: &str = "taxguide:";

#[derive(Clone)]
pub struct RedisCacheStore {
    manager: ConnectionManager,
}

impl RedisCacheStore {
    pub async fn connect(redis_url: &str) -> AppResult<Self> {
        let client = Client::open(redis_url)
            .map_err(|e| AppError::Cache(format!("Invalid Redis URL: {}", e)))?;
        let manager = ConnectionManager::new(client)
            .await
            .map_err(|e| AppError::Cache(format!("Failed to connect to Redis: {}", e)))?;

        tracing::info!("Connected to Redis cache");
        Ok(Self { manager })
    }
}

fn prefixed(key: &str) -> String {
    format!("{}{}", KEY_PREFIX, key)
}

#[async_trait::async_trait]
impl CacheStore for RedisCacheStore {
    fn backend_name(&self) -> &str {
        "redis"
    }

    async fn get(&self, key: &str) -> AppResult<Option<CacheEntry>> {
        let mut conn = self.manager.clone();
        let value: Option<String> = conn
            .get(prefixed(key))
            .await
            .map_err(|e| AppError::Cache(format!("Redis GET failed: {}", e)))?;

        value
            .map(|json| serde_json::from_str(&json).map_err(AppError::from))
            .transpose()
    }

    async fn put(&self, key: &str, entry: CacheEntry, ttl: Duration) -> AppResult<()> {
        let mut conn = self.manager.clone();
        let json = serde_json::to_string(&entry)?;
        let _: () = conn
            .set_ex(prefixed(key), json, ttl.as_secs().max(1))
            .await
            .map_err(|e| AppError::Cache(format!("Redis SET failed: {}", e)))?;
        Ok(())
    }
}
