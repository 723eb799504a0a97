use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use sensa_core::{Alarm, Alert, DataPoint, Device, Event, Org, Rule, User, tags_intersect, time};

use crate::validate::{check_point, micros};
use crate::{
    AlarmLister, AlertWriter, DeviceReader, EventWriter, OrgReader, PointWriter, RuleLister,
    Seeder, StoreError, UserLister,
};

type PointKey = (String, String, String, i64);
type EventKey = (String, String, String, i64);

/// In-memory implementation of every store.
///
/// Intended for tests and single-process runs; nothing survives a restart.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    orgs: HashMap<String, Org>,
    devices: HashMap<String, Device>,
    rules: Vec<Rule>,
    alarms: Vec<Alarm>,
    users: Vec<User>,
    points: HashMap<PointKey, (String, DataPoint)>,
    events: HashMap<EventKey, Event>,
    alerts: Vec<Alert>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Persisted points with their org.
    pub fn points(&self) -> Vec<(String, DataPoint)> {
        self.lock_inner()
            .map(|inner| inner.points.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.lock_inner()
            .map(|inner| inner.events.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.lock_inner()
            .map(|inner| inner.alerts.clone())
            .unwrap_or_default()
    }

    fn lock_inner(&self) -> Result<std::sync::MutexGuard<'_, Inner>, StoreError> {
        Ok(self.inner.lock()?)
    }
}

#[async_trait]
impl DeviceReader for MemoryStore {
    async fn read_by_uniq_id(&self, uniq_id: &str) -> Result<Device, StoreError> {
        self.lock_inner()?
            .devices
            .get(uniq_id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }
}

#[async_trait]
impl OrgReader for MemoryStore {
    async fn read(&self, org_id: &str) -> Result<Org, StoreError> {
        self.lock_inner()?
            .orgs
            .get(org_id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }
}

#[async_trait]
impl RuleLister for MemoryStore {
    async fn list_by_tags(
        &self,
        org_id: &str,
        attr: &str,
        tags: &[String],
    ) -> Result<Vec<Rule>, StoreError> {
        Ok(self
            .lock_inner()?
            .rules
            .iter()
            .filter(|r| {
                r.org_id == org_id && r.attr == attr && tags_intersect(&r.device_tags, tags)
            })
            .cloned()
            .collect())
    }
}

#[async_trait]
impl AlarmLister for MemoryStore {
    async fn list(&self, org_id: &str, rule_id: &str) -> Result<Vec<Alarm>, StoreError> {
        Ok(self
            .lock_inner()?
            .alarms
            .iter()
            .filter(|a| a.org_id == org_id && a.rule_id == rule_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl UserLister for MemoryStore {
    async fn list_by_tags(&self, org_id: &str, tags: &[String]) -> Result<Vec<User>, StoreError> {
        Ok(self
            .lock_inner()?
            .users
            .iter()
            .filter(|u| u.org_id == org_id && tags_intersect(&u.tags, tags))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl PointWriter for MemoryStore {
    async fn create(&self, point: &DataPoint, org_id: &str) -> Result<(), StoreError> {
        check_point(point)?;
        let ts = point
            .ts
            .as_ref()
            .and_then(time::from_proto)
            .ok_or_else(|| StoreError::InvalidFormat("point has no valid timestamp".into()))?;

        let key = (
            org_id.to_owned(),
            point.uniq_id.clone(),
            point.attr.clone(),
            micros(ts),
        );

        let mut inner = self.lock_inner()?;
        if inner.points.contains_key(&key) {
            return Err(StoreError::AlreadyExists);
        }
        inner.points.insert(key, (org_id.to_owned(), point.clone()));
        Ok(())
    }
}

#[async_trait]
impl EventWriter for MemoryStore {
    async fn create(&self, event: &Event) -> Result<(), StoreError> {
        let key = (
            event.org_id.clone(),
            event.uniq_id.clone(),
            event.rule_id.clone(),
            micros(event.created_at),
        );

        let mut inner = self.lock_inner()?;
        if inner.events.contains_key(&key) {
            return Err(StoreError::AlreadyExists);
        }
        inner.events.insert(key, event.clone());
        Ok(())
    }
}

#[async_trait]
impl AlertWriter for MemoryStore {
    async fn create(&self, alert: &Alert) -> Result<(), StoreError> {
        self.lock_inner()?.alerts.push(alert.clone());
        Ok(())
    }
}

#[async_trait]
impl Seeder for MemoryStore {
    async fn put_org(&self, org: Org) -> Result<(), StoreError> {
        self.lock_inner()?.orgs.insert(org.id.clone(), org);
        Ok(())
    }

    async fn put_device(&self, device: Device) -> Result<(), StoreError> {
        self.lock_inner()?
            .devices
            .insert(device.uniq_id.clone(), device);
        Ok(())
    }

    async fn put_rule(&self, rule: Rule) -> Result<(), StoreError> {
        let mut inner = self.lock_inner()?;
        inner.rules.retain(|r| r.id != rule.id);
        inner.rules.push(rule);
        Ok(())
    }

    async fn put_alarm(&self, alarm: Alarm) -> Result<(), StoreError> {
        let mut inner = self.lock_inner()?;
        inner.alarms.retain(|a| a.id != alarm.id);
        inner.alarms.push(alarm);
        Ok(())
    }

    async fn put_user(&self, user: User) -> Result<(), StoreError> {
        let mut inner = self.lock_inner()?;
        inner.users.retain(|u| u.id != user.id);
        inner.users.push(user);
        Ok(())
    }
}
