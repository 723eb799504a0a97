use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::StoreError;

/// Shared key/value cache used for repeat suppression and rate limiting.
#[async_trait]
pub trait Cache: Send + Sync + 'static {
    /// Set `key` to `value` for `ttl` unless it is already set. Returns
    /// whether this call set the key. A zero `ttl` always succeeds and
    /// stores nothing.
    async fn set_if_not_exist_ttl(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError>;
}

/// Process-local cache. Expiry follows tokio's clock so paused-time tests
/// can advance it.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn set_if_not_exist_ttl(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        if ttl.is_zero() {
            return Ok(true);
        }

        let now = Instant::now();
        let mut entries = self.entries.lock()?;
        entries.retain(|_, (_, expires)| *expires > now);

        if entries.contains_key(key) {
            return Ok(false);
        }
        entries.insert(key.to_owned(), (value.to_owned(), now + ttl));
        Ok(true)
    }
}
