//! Turns opaque device payloads into canonical points.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use prost::Message;
use sensa_core::adapter::{data_point, validator_in};
use sensa_core::{DecoderIn, time};
use sensa_queue::Queue;
use sensa_store::DeviceReader;
use tracing::{Instrument, debug, info_span, warn};

use crate::worker::{Handler, Outcome, StageContext, publish_all};

pub const NAME: &str = "decoder";

pub struct DecoderStage {
    ctx: StageContext,
    queue: Arc<dyn Queue>,
    devices: Arc<dyn DeviceReader>,
    validator_topic: String,
}

impl DecoderStage {
    pub fn new(
        ctx: StageContext,
        queue: Arc<dyn Queue>,
        devices: Arc<dyn DeviceReader>,
        validator_topic: impl Into<String>,
    ) -> Self {
        Self {
            ctx,
            queue,
            devices,
            validator_topic: validator_topic.into(),
        }
    }

    pub fn output_topic(&self) -> &str {
        &self.validator_topic
    }

    async fn decode(&self, msg: DecoderIn) -> Outcome {
        let device = match self
            .ctx
            .bounded(self.devices.read_by_uniq_id(&msg.uniq_id))
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
                debug!(error = %e, "dropping payload of unknown device");
                return Outcome::Ack;
            }
        };

        let kind = device.decoder();
        let decoded = sensa_decode::decode(kind, &msg.data);
        if let Some(e) = &decoded.error {
            if e.is_not_found() {
                self.ctx.count("unknown_decoder");
            } else {
                self.ctx.count("decode_error");
            }
            warn!(
                error = %e,
                decoder = kind.as_str(),
                parsed = decoded.points.len(),
                "decode incomplete"
            );
        }

        let ts = msg.ts.unwrap_or_else(time::now);
        let messages = decoded.points.into_iter().map(|point| {
            let point = data_point(point, &msg.uniq_id, ts, &msg.trace_id);
            Bytes::from(validator_in(point, &device.org_id, true).encode_to_vec())
        });

        if publish_all(self.queue.as_ref(), &self.validator_topic, messages).await {
            Outcome::Ack
        } else {
            self.ctx.count("publish");
            Outcome::Requeue
        }
    }
}

#[async_trait]
impl Handler for DecoderStage {
    fn context(&self) -> &StageContext {
        &self.ctx
    }

    async fn handle(&self, _topic: &str, payload: &[u8]) -> Outcome {
        let msg = match DecoderIn::decode(payload) {
            Ok(msg) => msg,
            Err(e) => {
                self.ctx.count("unmarshal");
                warn!(error = %e, "dropping undecodable DecoderIn");
                return Outcome::Ack;
            }
        };

        let span = info_span!("message", trace_id = %msg.trace_id, uniq_id = %msg.uniq_id);
        self.decode(msg).instrument(span).await
    }
}
