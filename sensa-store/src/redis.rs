//! Redis cache backed by a `deadpool-redis` pool.

use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::redis::{AsyncCommands, ExistenceCheck, SetExpiry, SetOptions};
use deadpool_redis::{Config, Pool, Runtime};
use tracing::info;

use crate::{Cache, StoreError};

#[derive(Clone)]
pub struct RedisCache {
    pool: Pool,
}

impl RedisCache {
    pub fn new(url: &str) -> Result<Self, StoreError> {
        info!(url, "Creating Redis pool");
        let pool = Config::from_url(url)
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| StoreError::Transient(format!("failed to create Redis pool: {e}")))?;
        Ok(Self { pool })
    }

    /// Check connectivity with a `PING`.
    pub async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.pool.get().await?;
        let _: String = deadpool_redis::redis::cmd("PING")
            .query_async(&mut *conn)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Cache for RedisCache {
    async fn set_if_not_exist_ttl(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        if ttl.is_zero() {
            return Ok(true);
        }

        let millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
        let mut conn = self.pool.get().await?;

        // SET NX replies OK when the key was set and nil otherwise.
        let reply: Option<String> = conn
            .set_options(
                key,
                value,
                SetOptions::default()
                    .conditional_set(ExistenceCheck::NX)
                    .with_expiration(SetExpiry::PX(millis.max(1))),
            )
            .await?;
        Ok(reply.is_some())
    }
}
