//! Collaborator stores consumed by the pipeline stages.
//!
//! Each capability is its own trait so a stage depends only on what it
//! uses. Every backend implements all of them.

mod cache;
mod error;
pub mod fixtures;
pub mod memory;
pub mod redis;
pub mod sqlite;
mod validate;

use async_trait::async_trait;
use sensa_core::{Alarm, Alert, DataPoint, Device, Event, Org, Rule, User};

pub use cache::{Cache, MemoryCache};
pub use error::StoreError;
pub use fixtures::{Fixtures, Seeder};
pub use memory::MemoryStore;
pub use redis::RedisCache;
pub use sqlite::SqliteStore;

/// Device directory.
#[async_trait]
pub trait DeviceReader: Send + Sync + 'static {
    async fn read_by_uniq_id(&self, uniq_id: &str) -> Result<Device, StoreError>;
}

#[async_trait]
pub trait OrgReader: Send + Sync + 'static {
    async fn read(&self, org_id: &str) -> Result<Org, StoreError>;
}

/// Rules of an org for an attribute whose device tags intersect `tags`.
#[async_trait]
pub trait RuleLister: Send + Sync + 'static {
    async fn list_by_tags(
        &self,
        org_id: &str,
        attr: &str,
        tags: &[String],
    ) -> Result<Vec<Rule>, StoreError>;
}

/// Alarms attached to a rule.
#[async_trait]
pub trait AlarmLister: Send + Sync + 'static {
    async fn list(&self, org_id: &str, rule_id: &str) -> Result<Vec<Alarm>, StoreError>;
}

/// Users of an org carrying any of `tags`.
#[async_trait]
pub trait UserLister: Send + Sync + 'static {
    async fn list_by_tags(&self, org_id: &str, tags: &[String]) -> Result<Vec<User>, StoreError>;
}

/// Data point persistence.
///
/// `(org_id, uniq_id, attr, ts)` is unique: a second create of the same key
/// fails with [`StoreError::AlreadyExists`].
#[async_trait]
pub trait PointWriter: Send + Sync + 'static {
    async fn create(&self, point: &DataPoint, org_id: &str) -> Result<(), StoreError>;
}

#[async_trait]
pub trait EventWriter: Send + Sync + 'static {
    async fn create(&self, event: &Event) -> Result<(), StoreError>;
}

#[async_trait]
pub trait AlertWriter: Send + Sync + 'static {
    async fn create(&self, alert: &Alert) -> Result<(), StoreError>;
}
