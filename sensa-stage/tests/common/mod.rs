#![allow(dead_code)]

use std::time::Duration;

use async_trait::async_trait;
use prost::Message;
use prost_types::Timestamp;
use sensa_core::{DataPoint, Device, Event, Rule};
use sensa_queue::{Delivery, Subscription};
use sensa_stage::{StageContext, StageMetrics};
use sensa_store::{
    DeviceReader, EventWriter, Fixtures, MemoryStore, PointWriter, RuleLister, StoreError,
};

pub const FIXTURES: &str = r#"
[[orgs]]
id = "org-1"
name = "acme"
display_name = "Acme Alerts"

[[devices]]
id = "d-1"
org_id = "org-1"
uniq_id = "dev1"
name = "Back door"
token = "secret"
decoder = "radio_bridge_door_v1"
tags = ["door"]

[[devices]]
id = "d-2"
org_id = "org-1"
uniq_id = "dev2"
status = "disabled"
token = "secret"
tags = ["door"]

[[devices]]
id = "d-3"
org_id = "org-1"
uniq_id = "dev3"
name = "Living room"
decoder = "tektelic_home_v1"
tags = ["room"]

[[rules]]
id = "r-1"
org_id = "org-1"
name = "door opened"
device_tags = ["door"]
attr = "open"
expr = "pointVal == true"

[[rules]]
id = "r-2"
org_id = "org-1"
name = "broken"
device_tags = ["door"]
attr = "open"
expr = "pointVal + 1 > 2"

[[alarms]]
id = "a-1"
org_id = "org-1"
rule_id = "r-1"
alarm_type = "app"
user_tags = ["ops"]
subject_template = "{{ rule.name }}: {{ device.name }}"
body_template = "{{ point.attr }} is {{ point.value }}"
repeat_interval_secs = 300

[[alarms]]
id = "a-2"
org_id = "org-1"
rule_id = "r-1"
alarm_type = "sms"
user_tags = ["ops"]
subject_template = ""
body_template = "{{ device.name }} opened"
repeat_interval_secs = 300

[[alarms]]
id = "a-3"
org_id = "org-1"
rule_id = "r-1"
alarm_type = "email"
user_tags = ["ops"]
subject_template = "{{ nope }}"
body_template = "never rendered"
repeat_interval_secs = 300

[[users]]
id = "u-1"
org_id = "org-1"
name = "Kim"
email = "kim@acme.test"
app_key = "uk-1"
tags = ["ops"]
"#;

pub async fn store() -> MemoryStore {
    let store = MemoryStore::new();
    Fixtures::parse(FIXTURES)
        .unwrap()
        .seed(&store)
        .await
        .unwrap();
    store
}

pub fn ctx(name: &'static str, metrics: &StageMetrics) -> StageContext {
    StageContext::new(name, metrics.clone(), Duration::from_secs(1))
}

pub fn ts(seconds: i64) -> Timestamp {
    Timestamp { seconds, nanos: 0 }
}

pub async fn recv(sub: &Subscription) -> Option<Delivery> {
    tokio::time::timeout(Duration::from_secs(2), sub.recv())
        .await
        .ok()
        .flatten()
}

/// Receive and ack exactly `n` messages.
pub async fn collect<M: Message + Default>(sub: &Subscription, n: usize) -> Vec<M> {
    let mut out = Vec::with_capacity(n);
    for i in 0..n {
        let delivery = recv(sub)
            .await
            .unwrap_or_else(|| panic!("expected message {} of {n}", i + 1));
        out.push(M::decode(delivery.payload.clone()).unwrap());
        delivery.ack().await.unwrap();
    }
    out
}

/// Whether the subscription stays empty for a short while.
pub async fn stays_empty(sub: &Subscription) -> bool {
    tokio::time::timeout(Duration::from_millis(200), sub.recv())
        .await
        .is_err()
}

/// Poll `check` until it holds or a deadline passes.
pub async fn eventually(check: impl Fn() -> bool) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

/// Memory store whose selected calls fail with a transient error.
#[derive(Clone, Default)]
pub struct FlakyStore {
    pub inner: MemoryStore,
    pub fail_devices: bool,
    pub fail_points: bool,
    /// Event creates for this rule fail.
    pub fail_events_for: Option<&'static str>,
}

impl FlakyStore {
    pub fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            ..Default::default()
        }
    }
}

fn outage() -> StoreError {
    StoreError::Transient("connection reset".into())
}

#[async_trait]
impl DeviceReader for FlakyStore {
    async fn read_by_uniq_id(&self, uniq_id: &str) -> Result<Device, StoreError> {
        if self.fail_devices {
            return Err(outage());
        }
        self.inner.read_by_uniq_id(uniq_id).await
    }
}

#[async_trait]
impl PointWriter for FlakyStore {
    async fn create(&self, point: &DataPoint, org_id: &str) -> Result<(), StoreError> {
        if self.fail_points {
            return Err(outage());
        }
        PointWriter::create(&self.inner, point, org_id).await
    }
}

#[async_trait]
impl EventWriter for FlakyStore {
    async fn create(&self, event: &Event) -> Result<(), StoreError> {
        if self.fail_events_for == Some(event.rule_id.as_str()) {
            return Err(outage());
        }
        EventWriter::create(&self.inner, event).await
    }
}

#[async_trait]
impl RuleLister for FlakyStore {
    async fn list_by_tags(
        &self,
        org_id: &str,
        attr: &str,
        tags: &[String],
    ) -> Result<Vec<Rule>, StoreError> {
        RuleLister::list_by_tags(&self.inner, org_id, attr, tags).await
    }
}
