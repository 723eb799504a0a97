mod common;

use std::sync::Arc;

use prost::Message;
use sensa_core::proto::data_point::ValOneof;
use sensa_core::{DataPoint, DecoderIn, EventerOut, Rule, Status, ValidatorIn, ValidatorOut};
use sensa_queue::{MemoryQueue, Queue};
use sensa_stage::{Accumulator, DecoderStage, Eventer, Handler, Outcome, StageMetrics, Validator};
use sensa_store::{DeviceReader, Seeder};

use common::{FlakyStore, collect, ctx, stays_empty, store, ts};

fn open_point(uniq_id: &str) -> DataPoint {
    DataPoint {
        uniq_id: uniq_id.into(),
        attr: "open".into(),
        val_oneof: Some(ValOneof::BoolVal(true)),
        ts: Some(ts(1_700_000_000)),
        token: "secret".into(),
        trace_id: "trace-outage".into(),
    }
}

async fn validator_out() -> Vec<u8> {
    let device = store().await.read_by_uniq_id("dev1").await.unwrap();
    ValidatorOut {
        point: Some(open_point("dev1")),
        device: Some(device),
    }
    .encode_to_vec()
}

#[tokio::test]
async fn validator_requeues_when_device_lookup_fails() {
    let metrics = StageMetrics::new();
    let devices = FlakyStore {
        fail_devices: true,
        ..FlakyStore::new(store().await)
    };
    let validator = Validator::new(
        ctx("validator", &metrics),
        Arc::new(MemoryQueue::new()),
        Arc::new(devices),
        "ValidatorOut",
    );

    let msg = ValidatorIn {
        point: Some(open_point("dev1")),
        org_id: "org-1".into(),
        skip_token: false,
    }
    .encode_to_vec();
    assert_eq!(validator.handle("ValidatorIn", &msg).await, Outcome::Requeue);
    assert_eq!(metrics.get("validator.read_device"), 1);
    assert_eq!(metrics.get("validator.unknown_device"), 0);
}

#[tokio::test]
async fn decoder_requeues_when_device_lookup_fails() {
    let queue = Arc::new(MemoryQueue::new());
    let metrics = StageMetrics::new();
    let tap = queue.subscribe("ValidatorIn", "tap").await.unwrap();
    let devices = FlakyStore {
        fail_devices: true,
        ..FlakyStore::new(store().await)
    };
    let decoder = DecoderStage::new(
        ctx("decoder", &metrics),
        queue.clone(),
        Arc::new(devices),
        "ValidatorIn",
    );

    let msg = DecoderIn {
        uniq_id: "dev1".into(),
        data: vec![0x19, 0x03, 0x01],
        ts: Some(ts(1_700_000_000)),
        trace_id: "trace-outage".into(),
    }
    .encode_to_vec();
    assert_eq!(decoder.handle("DecoderIn", &msg).await, Outcome::Requeue);
    assert_eq!(metrics.get("decoder.read_device"), 1);
    assert!(stays_empty(&tap).await);
}

#[tokio::test]
async fn accumulator_requeues_when_store_is_unavailable() {
    let metrics = StageMetrics::new();
    let points = FlakyStore {
        fail_points: true,
        ..FlakyStore::new(store().await)
    };
    let accumulator = Accumulator::new(ctx("accumulator", &metrics), Arc::new(points.clone()));

    let msg = validator_out().await;
    assert_eq!(
        accumulator.handle("ValidatorOut", &msg).await,
        Outcome::Requeue
    );
    assert_eq!(metrics.get("accumulator.create_point"), 1);
    assert!(points.inner.points().is_empty());
}

#[tokio::test]
async fn eventer_loses_only_the_failed_rule_and_acks() {
    let queue = Arc::new(MemoryQueue::new());
    let metrics = StageMetrics::new();
    let tap = queue.subscribe("EventerOut", "tap").await.unwrap();

    let inner = store().await;
    inner
        .put_rule(Rule {
            id: "r-3".into(),
            org_id: "org-1".into(),
            name: "door touched".into(),
            status: Status::Active as i32,
            device_tags: vec!["door".into()],
            attr: "open".into(),
            expr: "pointVal".into(),
        })
        .await
        .unwrap();
    let store = FlakyStore {
        fail_events_for: Some("r-1"),
        ..FlakyStore::new(inner)
    };
    let eventer = Eventer::new(
        ctx("eventer", &metrics),
        queue.clone(),
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        "EventerOut",
    );

    let msg = validator_out().await;
    assert_eq!(eventer.handle("ValidatorOut", &msg).await, Outcome::Ack);

    let fired: Vec<EventerOut> = collect(&tap, 1).await;
    assert!(stays_empty(&tap).await);
    assert_eq!(fired[0].rule.as_ref().unwrap().id, "r-3");
    assert_eq!(metrics.get("eventer.create_event"), 1);
    assert_eq!(metrics.get("eventer.fired"), 1);

    let events = store.inner.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].rule_id, "r-3");
}
