//! Entry point for device traffic.
//!
//! Devices publish to `v1/...` topics (protobuf or JSON points) and the LoRa
//! network server publishes to `lora/...` topics. The topic alone decides how
//! a payload is parsed; a topic that fits no template is dropped.

mod route;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use prost::Message;
use sensa_core::adapter::{data_point, mqtt_data_point, validator_in};
use sensa_core::proto::points_in_from_json;
use sensa_core::{DecoderIn, MqttPointsIn, new_trace_id, time};
use sensa_decode::chirpstack::{LoraEvent, device_event, gateway_event};
use sensa_queue::Queue;
use tracing::{Instrument, Span, debug, field, info_span, warn};

pub use route::Route;

use crate::config::TopicsConfig;
use crate::worker::{Handler, Outcome, StageContext, publish_all};

pub const NAME: &str = "ingestor";

pub struct Ingestor {
    ctx: StageContext,
    queue: Arc<dyn Queue>,
    decoder_topic: String,
    validator_topic: String,
}

impl Ingestor {
    pub fn new(ctx: StageContext, queue: Arc<dyn Queue>, topics: &TopicsConfig) -> Self {
        Self {
            ctx,
            queue,
            decoder_topic: topics.decoder_in.clone(),
            validator_topic: topics.validator_in.clone(),
        }
    }

    pub fn output_topics(&self) -> [&str; 2] {
        [&self.decoder_topic, &self.validator_topic]
    }

    async fn mqtt(
        &self,
        org_id: &str,
        topic_uniq_id: Option<&str>,
        json: bool,
        payload: &[u8],
        trace_id: &str,
    ) -> Outcome {
        let batch = if json {
            points_in_from_json(payload).map_err(|e| e.to_string())
        } else {
            MqttPointsIn::decode(payload).map_err(|e| e.to_string())
        };
        let batch = match batch {
            Ok(batch) => batch,
            Err(e) => {
                self.ctx.count("bad_payload");
                warn!(error = %e, json, "dropping undecodable points");
                return Outcome::Ack;
            }
        };

        let now = time::now();
        let mut messages = Vec::with_capacity(batch.points.len());
        for point in batch.points {
            let uniq_id = [
                topic_uniq_id,
                Some(point.uniq_id.as_str()),
                Some(batch.uniq_id.as_str()),
            ]
            .into_iter()
            .flatten()
            .find(|id| !id.is_empty())
            .map(str::to_owned);
            let Some(uniq_id) = uniq_id else {
                self.ctx.count("no_uniq_id");
                debug!(attr = %point.attr, "skipping point without a device");
                continue;
            };
            let token = if point.token.is_empty() {
                batch.token.clone()
            } else {
                point.token.clone()
            };

            let point = mqtt_data_point(point, &uniq_id, &token, now, trace_id);
            messages.push(encode(validator_in(point, org_id, false)));
        }

        self.publish(&self.validator_topic, messages).await
    }

    async fn lora(&self, uniq_id: &str, parsed: LoraEvent, trace_id: &str) -> Outcome {
        if let Some(e) = &parsed.data_error {
            self.ctx.count("bad_data");
            warn!(error = %e, "uplink data unreadable, forwarding radio points only");
        }
        let ts = time::to_proto(parsed.ts);
        let points: Vec<Bytes> = parsed
            .points
            .into_iter()
            .map(|point| encode(validator_in(data_point(point, uniq_id, ts, trace_id), "", true)))
            .collect();

        if let Outcome::Requeue = self.publish(&self.validator_topic, points).await {
            return Outcome::Requeue;
        }

        match parsed.data {
            Some(data) => {
                let msg = DecoderIn {
                    uniq_id: uniq_id.to_owned(),
                    data,
                    ts: Some(ts),
                    trace_id: trace_id.to_owned(),
                };
                self.publish(&self.decoder_topic, vec![encode(msg)]).await
            }
            None => Outcome::Ack,
        }
    }

    async fn publish(&self, topic: &str, messages: Vec<Bytes>) -> Outcome {
        let count = messages.len();
        if publish_all(self.queue.as_ref(), topic, messages).await {
            debug!(topic, count, "published");
            Outcome::Ack
        } else {
            self.ctx.count("publish");
            Outcome::Requeue
        }
    }
}

fn encode<M: Message>(msg: M) -> Bytes {
    Bytes::from(msg.encode_to_vec())
}

#[async_trait]
impl Handler for Ingestor {
    fn context(&self) -> &StageContext {
        &self.ctx
    }

    async fn handle(&self, topic: &str, payload: &[u8]) -> Outcome {
        let trace_id = new_trace_id();
        let span = info_span!("message", %trace_id, topic, uniq_id = field::Empty);

        async {
            let Some(route) = Route::parse(topic) else {
                self.ctx.count("bad_topic");
                warn!("dropping message on unknown topic");
                return Outcome::Ack;
            };

            match route {
                Route::Mqtt {
                    org_id,
                    uniq_id,
                    json,
                } => {
                    if let Some(uniq_id) = uniq_id {
                        Span::current().record("uniq_id", uniq_id);
                    }
                    self.mqtt(org_id, uniq_id, json, payload, &trace_id).await
                }
                Route::LoraGateway { uniq_id, event } => {
                    Span::current().record("uniq_id", uniq_id);
                    match gateway_event(event, payload, jiff::Timestamp::now()) {
                        Ok(parsed) => self.lora(uniq_id, parsed, &trace_id).await,
                        Err(e) => {
                            self.ctx.count("decode_error");
                            warn!(error = %e, event, "dropping gateway event");
                            Outcome::Ack
                        }
                    }
                }
                Route::LoraDevice { uniq_id, event } => {
                    Span::current().record("uniq_id", uniq_id);
                    match device_event(event, payload, jiff::Timestamp::now()) {
                        Ok(parsed) => self.lora(uniq_id, parsed, &trace_id).await,
                        Err(e) => {
                            self.ctx.count("decode_error");
                            warn!(error = %e, event, "dropping device event");
                            Outcome::Ack
                        }
                    }
                }
            }
        }
        .instrument(span)
        .await
    }
}
