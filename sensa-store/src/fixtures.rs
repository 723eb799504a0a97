//! Seed data loaded from a TOML file.
//!
//! Managing orgs, devices, rules, alarms and users is outside the pipeline;
//! this is how a deployment (or a test) gets them into a store.
//!
//! ```toml
//! [[devices]]
//! id = "d-1"
//! org_id = "org-1"
//! uniq_id = "dev1"
//! status = "active"
//! decoder = "radio_bridge_door_v1"
//! tags = ["door"]
//! ```

use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;
use sensa_core::{Alarm, AlarmType, Decoder, Device, Org, Rule, Status, User};

use crate::StoreError;

/// Stores that can be populated with directory records.
#[async_trait]
pub trait Seeder: Send + Sync {
    async fn put_org(&self, org: Org) -> Result<(), StoreError>;
    async fn put_device(&self, device: Device) -> Result<(), StoreError>;
    async fn put_rule(&self, rule: Rule) -> Result<(), StoreError>;
    async fn put_alarm(&self, alarm: Alarm) -> Result<(), StoreError>;
    async fn put_user(&self, user: User) -> Result<(), StoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum FixtureError {
    #[error("failed to read fixtures: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse fixtures: {0}")]
    Toml(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
enum FixtureStatus {
    #[default]
    Active,
    Disabled,
}

impl From<FixtureStatus> for Status {
    fn from(s: FixtureStatus) -> Self {
        match s {
            FixtureStatus::Active => Status::Active,
            FixtureStatus::Disabled => Status::Disabled,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
enum FixtureDecoder {
    #[default]
    Raw,
    Gateway,
    RadioBridgeDoorV1,
    RadioBridgeDoorV2,
    GlobalsatCo2,
    TektelicHomeV1,
}

impl From<FixtureDecoder> for Decoder {
    fn from(d: FixtureDecoder) -> Self {
        match d {
            FixtureDecoder::Raw => Decoder::Raw,
            FixtureDecoder::Gateway => Decoder::Gateway,
            FixtureDecoder::RadioBridgeDoorV1 => Decoder::RadioBridgeDoorV1,
            FixtureDecoder::RadioBridgeDoorV2 => Decoder::RadioBridgeDoorV2,
            FixtureDecoder::GlobalsatCo2 => Decoder::GlobalsatCo2,
            FixtureDecoder::TektelicHomeV1 => Decoder::TektelicHomeV1,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
enum FixtureAlarmType {
    App,
    Sms,
    Email,
}

impl From<FixtureAlarmType> for AlarmType {
    fn from(t: FixtureAlarmType) -> Self {
        match t {
            FixtureAlarmType::App => AlarmType::App,
            FixtureAlarmType::Sms => AlarmType::Sms,
            FixtureAlarmType::Email => AlarmType::Email,
        }
    }
}

#[derive(Debug, Deserialize)]
struct OrgFixture {
    id: String,
    name: String,
    #[serde(default)]
    display_name: String,
    #[serde(default)]
    email: String,
}

#[derive(Debug, Deserialize)]
struct DeviceFixture {
    id: String,
    org_id: String,
    uniq_id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    status: FixtureStatus,
    #[serde(default)]
    token: String,
    #[serde(default)]
    decoder: FixtureDecoder,
    #[serde(default)]
    tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RuleFixture {
    id: String,
    org_id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    status: FixtureStatus,
    device_tags: Vec<String>,
    attr: String,
    expr: String,
}

#[derive(Debug, Deserialize)]
struct AlarmFixture {
    id: String,
    org_id: String,
    rule_id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    status: FixtureStatus,
    alarm_type: FixtureAlarmType,
    user_tags: Vec<String>,
    subject_template: String,
    body_template: String,
    #[serde(default)]
    repeat_interval_secs: u32,
}

#[derive(Debug, Deserialize)]
struct UserFixture {
    id: String,
    org_id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    phone: String,
    #[serde(default)]
    app_key: String,
    #[serde(default)]
    status: FixtureStatus,
    #[serde(default)]
    tags: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Fixtures {
    orgs: Vec<OrgFixture>,
    devices: Vec<DeviceFixture>,
    rules: Vec<RuleFixture>,
    alarms: Vec<AlarmFixture>,
    users: Vec<UserFixture>,
}

impl Fixtures {
    pub fn load(path: &Path) -> Result<Self, FixtureError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, FixtureError> {
        Ok(toml::from_str(content)?)
    }

    /// Write every record into `store`, replacing records with the same id.
    pub async fn seed(self, store: &dyn Seeder) -> Result<(), StoreError> {
        for o in self.orgs {
            store
                .put_org(Org {
                    id: o.id,
                    name: o.name,
                    display_name: o.display_name,
                    email: o.email,
                })
                .await?;
        }

        for d in self.devices {
            store
                .put_device(Device {
                    id: d.id,
                    org_id: d.org_id,
                    uniq_id: d.uniq_id,
                    name: d.name,
                    status: Status::from(d.status) as i32,
                    token: d.token,
                    decoder: Decoder::from(d.decoder) as i32,
                    tags: d.tags,
                })
                .await?;
        }

        for r in self.rules {
            store
                .put_rule(Rule {
                    id: r.id,
                    org_id: r.org_id,
                    name: r.name,
                    status: Status::from(r.status) as i32,
                    device_tags: r.device_tags,
                    attr: r.attr,
                    expr: r.expr,
                })
                .await?;
        }

        for a in self.alarms {
            store
                .put_alarm(Alarm {
                    id: a.id,
                    org_id: a.org_id,
                    rule_id: a.rule_id,
                    name: a.name,
                    status: a.status.into(),
                    alarm_type: a.alarm_type.into(),
                    user_tags: a.user_tags,
                    subject_template: a.subject_template,
                    body_template: a.body_template,
                    repeat_interval_secs: a.repeat_interval_secs,
                })
                .await?;
        }

        for u in self.users {
            store
                .put_user(User {
                    id: u.id,
                    org_id: u.org_id,
                    name: u.name,
                    email: u.email,
                    phone: u.phone,
                    app_key: u.app_key,
                    status: u.status.into(),
                    tags: u.tags,
                })
                .await?;
        }

        Ok(())
    }
}
