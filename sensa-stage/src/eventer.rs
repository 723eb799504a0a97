//! Evaluates rules against validated points and records the hits.
//!
//! The inbound message is acked once the rule loop completes, whatever
//! happened to individual rules. A transient failure while recording one
//! rule's event therefore loses that event: alerting is at-most-once per
//! rule. The event record doubles as a tombstone so a redelivered message
//! never publishes the same hit twice.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use prost::Message;
use sensa_core::{DataPoint, Device, Event, EventerOut, Rule, Status, ValidatorOut, time};
use sensa_queue::Queue;
use sensa_store::{EventWriter, RuleLister, StoreError};
use tracing::{Instrument, debug, error, info_span, warn};

use crate::rule_expr;
use crate::worker::{Handler, Outcome, StageContext};

pub const NAME: &str = "eventer";

pub struct Eventer {
    ctx: StageContext,
    queue: Arc<dyn Queue>,
    rules: Arc<dyn RuleLister>,
    events: Arc<dyn EventWriter>,
    output_topic: String,
}

impl Eventer {
    pub fn new(
        ctx: StageContext,
        queue: Arc<dyn Queue>,
        rules: Arc<dyn RuleLister>,
        events: Arc<dyn EventWriter>,
        output_topic: impl Into<String>,
    ) -> Self {
        Self {
            ctx,
            queue,
            rules,
            events,
            output_topic: output_topic.into(),
        }
    }

    pub fn output_topic(&self) -> &str {
        &self.output_topic
    }

    async fn evaluate(&self, point: DataPoint, device: Device) -> Outcome {
        let rules = match self
            .ctx
            .bounded(self.rules.list_by_tags(&device.org_id, &point.attr, &device.tags))
            .await
        {
            Ok(rules) => rules,
            Err(e) => {
                self.ctx.count("list_rules");
                warn!(error = %e, "rule lookup failed");
                return Outcome::Requeue;
            }
        };

        for rule in rules {
            if rule.status() != Status::Active {
                continue;
            }
            self.apply(&point, &device, rule).await;
        }
        Outcome::Ack
    }

    async fn apply(&self, point: &DataPoint, device: &Device, rule: Rule) {
        match rule_expr::evaluate(&rule.expr, point, device) {
            Ok(true) => {}
            Ok(false) => return,
            Err(e) => {
                self.ctx.count("evaluate");
                warn!(error = %e, rule_id = %rule.id, "rule evaluation failed");
                return;
            }
        }

        let created_at = point
            .ts
            .as_ref()
            .and_then(time::from_proto)
            .unwrap_or_else(jiff::Timestamp::now);
        let event = Event {
            org_id: device.org_id.clone(),
            uniq_id: point.uniq_id.clone(),
            rule_id: rule.id.clone(),
            created_at,
            trace_id: point.trace_id.clone(),
        };

        match self.ctx.bounded(self.events.create(&event)).await {
            Ok(()) => {}
            Err(StoreError::AlreadyExists) => {
                self.ctx.count("duplicate");
                debug!(rule_id = %rule.id, "event already recorded");
                return;
            }
            Err(e) => {
                self.ctx.count("create_event");
                error!(error = %e, rule_id = %rule.id, "event create failed, event lost");
                return;
            }
        }

        let rule_id = rule.id.clone();
        let out = EventerOut {
            point: Some(point.clone()),
            device: Some(device.clone()),
            rule: Some(rule),
        };
        match self
            .queue
            .publish(&self.output_topic, Bytes::from(out.encode_to_vec()))
            .await
        {
            Ok(()) => {
                self.ctx.count("fired");
                debug!(%rule_id, "rule fired");
            }
            Err(e) => {
                self.ctx.count("publish");
                error!(error = %e, %rule_id, "publish failed, event not alerted");
            }
        }
    }
}

#[async_trait]
impl Handler for Eventer {
    fn context(&self) -> &StageContext {
        &self.ctx
    }

    async fn handle(&self, _topic: &str, payload: &[u8]) -> Outcome {
        let msg = match ValidatorOut::decode(payload) {
            Ok(msg) => msg,
            Err(e) => {
                self.ctx.count("unmarshal");
                warn!(error = %e, "dropping undecodable ValidatorOut");
                return Outcome::Ack;
            }
        };
        let (Some(point), Some(device)) = (msg.point, msg.device) else {
            self.ctx.count("incomplete");
            return Outcome::Ack;
        };

        let span = info_span!("message", trace_id = %point.trace_id, uniq_id = %point.uniq_id);
        self.evaluate(point, device).instrument(span).await
    }
}
