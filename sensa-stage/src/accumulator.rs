//! Persists validated points. The point store's uniqueness key makes this
//! the pipeline's deduplication boundary.

use std::sync::Arc;

use async_trait::async_trait;
use prost::Message;
use sensa_core::ValidatorOut;
use sensa_store::{PointWriter, StoreError};
use tracing::{Instrument, debug, info_span, warn};

use crate::worker::{Handler, Outcome, StageContext};

pub const NAME: &str = "accumulator";

pub struct Accumulator {
    ctx: StageContext,
    points: Arc<dyn PointWriter>,
}

impl Accumulator {
    pub fn new(ctx: StageContext, points: Arc<dyn PointWriter>) -> Self {
        Self { ctx, points }
    }
}

#[async_trait]
impl Handler for Accumulator {
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
        async {
            match self
                .ctx
                .bounded(self.points.create(&point, &device.org_id))
                .await
            {
                Ok(()) => {
                    self.ctx.count("stored");
                    Outcome::Ack
                }
                Err(StoreError::AlreadyExists) => {
                    self.ctx.count("duplicate");
                    debug!(attr = %point.attr, "point already stored");
                    Outcome::Ack
                }
                Err(StoreError::InvalidFormat(reason)) => {
                    self.ctx.count("invalid_format");
                    warn!(%reason, attr = %point.attr, "dropping unstorable point");
                    Outcome::Ack
                }
                Err(e) => {
                    self.ctx.count("create_point");
                    warn!(error = %e, "point create failed");
                    Outcome::Requeue
                }
            }
        }
        .instrument(span)
        .await
    }
}
