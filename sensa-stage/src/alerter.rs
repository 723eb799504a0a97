//! Notifies users of fired rules.
//!
//! Every alarm of a rule is handled independently and every recipient of an
//! alarm is handled independently. Nothing here requeues: a notification is
//! sent at most once per repeat interval, tracked in the cache, and each
//! attempt leaves one alert record.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use prost::Message;
use sensa_core::{Alarm, Alert, AlertStatus, DataPoint, Device, EventerOut, Org, Rule, Status, User};
use sensa_store::{AlarmLister, AlertWriter, Cache, OrgReader, UserLister};
use tracing::{Instrument, debug, error, info_span, warn};

use crate::notify::{Notifier, dispatch};
use crate::template::{Rendered, Templates};
use crate::worker::{Handler, Outcome, StageContext};

pub const NAME: &str = "alerter";

/// Stores the alerter reads from and writes to.
#[derive(Clone)]
pub struct AlerterStores {
    pub orgs: Arc<dyn OrgReader>,
    pub alarms: Arc<dyn AlarmLister>,
    pub users: Arc<dyn UserLister>,
    pub alerts: Arc<dyn AlertWriter>,
}

/// Cache key claimed before notifying `user` of `alarm` for `device`.
pub fn repeat_key(org_id: &str, device_id: &str, alarm_id: &str, user_id: &str) -> String {
    format!("sensa:alert:{org_id}:{device_id}:{alarm_id}:{user_id}")
}

struct Hit<'a> {
    org: &'a Org,
    point: &'a DataPoint,
    device: &'a Device,
    rule: &'a Rule,
}

pub struct Alerter {
    ctx: StageContext,
    stores: AlerterStores,
    cache: Arc<dyn Cache>,
    notifier: Arc<dyn Notifier>,
    templates: Templates,
}

impl Alerter {
    pub fn new(
        ctx: StageContext,
        stores: AlerterStores,
        cache: Arc<dyn Cache>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            ctx,
            stores,
            cache,
            notifier,
            templates: Templates::new(),
        }
    }

    async fn alert(&self, point: DataPoint, device: Device, rule: Rule) {
        let org = match self.ctx.bounded(self.stores.orgs.read(&device.org_id)).await {
            Ok(org) => org,
            Err(e) => {
                self.ctx.count("read_org");
                warn!(error = %e, org_id = %device.org_id, "org lookup failed");
                return;
            }
        };

        let alarms = match self
            .ctx
            .bounded(self.stores.alarms.list(&org.id, &rule.id))
            .await
        {
            Ok(alarms) => alarms,
            Err(e) => {
                self.ctx.count("list_alarms");
                warn!(error = %e, rule_id = %rule.id, "alarm lookup failed");
                return;
            }
        };

        let hit = Hit {
            org: &org,
            point: &point,
            device: &device,
            rule: &rule,
        };
        for alarm in alarms.iter().filter(|a| a.status == Status::Active) {
            self.alarm(&hit, alarm).await;
        }
    }

    async fn alarm(&self, hit: &Hit<'_>, alarm: &Alarm) {
        let users = match self
            .ctx
            .bounded(self.stores.users.list_by_tags(&hit.org.id, &alarm.user_tags))
            .await
        {
            Ok(users) => users,
            Err(e) => {
                self.ctx.count("list_users");
                warn!(error = %e, alarm_id = %alarm.id, "user lookup failed");
                return;
            }
        };
        let users: Vec<User> = users
            .into_iter()
            .filter(|u| u.status == Status::Active)
            .collect();
        if users.is_empty() {
            debug!(alarm_id = %alarm.id, "alarm has no recipients");
            return;
        }

        let rendered = match self.templates.render(alarm, hit.point, hit.rule, hit.device) {
            Ok(rendered) => rendered,
            Err(e) => {
                self.ctx.count("render");
                warn!(error = %e, alarm_id = %alarm.id, "alarm template failed");
                return;
            }
        };

        for user in &users {
            self.notify(hit, alarm, user, &rendered).await;
        }
    }

    async fn notify(&self, hit: &Hit<'_>, alarm: &Alarm, user: &User, rendered: &Rendered) {
        let key = repeat_key(&hit.org.id, &hit.device.id, &alarm.id, &user.id);
        let window = Duration::from_secs(u64::from(alarm.repeat_interval_secs));
        match self
            .ctx
            .bounded(self.cache.set_if_not_exist_ttl(&key, &hit.point.trace_id, window))
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                self.ctx.count("suppressed");
                debug!(alarm_id = %alarm.id, user_id = %user.id, "notified recently");
                return;
            }
            Err(e) => {
                self.ctx.count("repeat_cache");
                warn!(error = %e, alarm_id = %alarm.id, user_id = %user.id, "repeat check failed");
                return;
            }
        }

        let result = dispatch(
            self.notifier.as_ref(),
            alarm.alarm_type,
            hit.org,
            user,
            &rendered.subject,
            &rendered.body,
        )
        .await;

        let (status, error) = match result {
            Ok(()) => {
                self.ctx.count("sent");
                (AlertStatus::Sent, None)
            }
            Err(e) => {
                self.ctx.count("dispatch");
                warn!(
                    error = %e,
                    alarm_id = %alarm.id,
                    user_id = %user.id,
                    channel = alarm.alarm_type.as_str(),
                    "notification failed"
                );
                (AlertStatus::Error, Some(e.to_string()))
            }
        };

        let alert = Alert {
            org_id: hit.org.id.clone(),
            uniq_id: hit.device.uniq_id.clone(),
            alarm_id: alarm.id.clone(),
            user_id: user.id.clone(),
            status,
            error,
            trace_id: hit.point.trace_id.clone(),
            created_at: jiff::Timestamp::now(),
        };
        if let Err(e) = self.ctx.bounded(self.stores.alerts.create(&alert)).await {
            self.ctx.count("create_alert");
            error!(error = %e, alarm_id = %alarm.id, user_id = %user.id, "alert create failed");
        }
    }
}

#[async_trait]
impl Handler for Alerter {
    fn context(&self) -> &StageContext {
        &self.ctx
    }

    async fn handle(&self, _topic: &str, payload: &[u8]) -> Outcome {
        let msg = match EventerOut::decode(payload) {
            Ok(msg) => msg,
            Err(e) => {
                self.ctx.count("unmarshal");
                warn!(error = %e, "dropping undecodable EventerOut");
                return Outcome::Ack;
            }
        };
        let (Some(point), Some(device), Some(rule)) = (msg.point, msg.device, msg.rule) else {
            self.ctx.count("incomplete");
            return Outcome::Ack;
        };

        let span = info_span!(
            "message",
            trace_id = %point.trace_id,
            uniq_id = %point.uniq_id,
            rule_id = %rule.id
        );
        self.alert(point, device, rule).instrument(span).await;
        Outcome::Ack
    }
}
