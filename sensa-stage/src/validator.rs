//! Authenticates points against the device directory.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use prost::Message;
use sensa_core::{DataPoint, Device, Status, ValidatorIn, ValidatorOut};
use sensa_queue::Queue;
use sensa_store::DeviceReader;
use tracing::{Instrument, debug, info_span, warn};

use crate::worker::{Handler, Outcome, StageContext, publish_all};

pub const NAME: &str = "validator";

/// Why a point was dropped. Checks run in declaration order and the first
/// failure wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    InvalidPoint,
    OrgMismatch,
    Disabled,
    TokenMismatch,
}

impl Rejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Rejection::InvalidPoint => "invalid_point",
            Rejection::OrgMismatch => "bad_org",
            Rejection::Disabled => "disabled",
            Rejection::TokenMismatch => "bad_token",
        }
    }
}

/// Check a point and its claimed org against the resolved device.
///
/// Org and token checks are skipped for transports that already
/// authenticated the payload.
pub fn check(
    point: &DataPoint,
    org_id: &str,
    skip_token: bool,
    device: &Device,
) -> Result<(), Rejection> {
    if point.attr.is_empty() || point.val_oneof.is_none() {
        return Err(Rejection::InvalidPoint);
    }
    if !skip_token && org_id != device.org_id {
        return Err(Rejection::OrgMismatch);
    }
    if device.status() != Status::Active {
        return Err(Rejection::Disabled);
    }
    if !skip_token && point.token != device.token {
        return Err(Rejection::TokenMismatch);
    }
    Ok(())
}

pub struct Validator {
    ctx: StageContext,
    queue: Arc<dyn Queue>,
    devices: Arc<dyn DeviceReader>,
    output_topic: String,
}

impl Validator {
    pub fn new(
        ctx: StageContext,
        queue: Arc<dyn Queue>,
        devices: Arc<dyn DeviceReader>,
        output_topic: impl Into<String>,
    ) -> Self {
        Self {
            ctx,
            queue,
            devices,
            output_topic: output_topic.into(),
        }
    }

    pub fn output_topic(&self) -> &str {
        &self.output_topic
    }

    async fn validate(&self, point: DataPoint, org_id: String, skip_token: bool) -> Outcome {
        let device = match self
            .ctx
            .bounded(self.devices.read_by_uniq_id(&point.uniq_id))
            .await
        {
            Ok(device) => device,
            Err(e) if e.is_transient() => {
                self.ctx.count("read_device");
                warn!(error = %e, "device lookup failed");
                return Outcome::Requeue;
            }
            Err(e) => {
                self.ctx.count("unknown_device");
                debug!(error = %e, "dropping point of unknown device");
                return Outcome::Ack;
            }
        };

        if let Err(rejection) = check(&point, &org_id, skip_token, &device) {
            self.ctx.count(rejection.as_str());
            debug!(reason = rejection.as_str(), attr = %point.attr, "dropping point");
            return Outcome::Ack;
        }

        let out = ValidatorOut {
            point: Some(point),
            device: Some(device),
        };
        let message = Bytes::from(out.encode_to_vec());
        if publish_all(self.queue.as_ref(), &self.output_topic, [message]).await {
            Outcome::Ack
        } else {
            self.ctx.count("publish");
            Outcome::Requeue
        }
    }
}

#[async_trait]
impl Handler for Validator {
    fn context(&self) -> &StageContext {
        &self.ctx
    }

    async fn handle(&self, _topic: &str, payload: &[u8]) -> Outcome {
        let msg = match ValidatorIn::decode(payload) {
            Ok(msg) => msg,
            Err(e) => {
                self.ctx.count("unmarshal");
                warn!(error = %e, "dropping undecodable ValidatorIn");
                return Outcome::Ack;
            }
        };
        let Some(point) = msg.point else {
            self.ctx.count("no_point");
            debug!("dropping ValidatorIn without a point");
            return Outcome::Ack;
        };

        let span = info_span!("message", trace_id = %point.trace_id, uniq_id = %point.uniq_id);
        self.validate(point, msg.org_id, msg.skip_token)
            .instrument(span)
            .await
    }
}
