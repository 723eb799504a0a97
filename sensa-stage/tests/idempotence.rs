mod common;

use std::sync::Arc;

use bytes::Bytes;
use prost::Message;
use sensa_core::proto::data_point::ValOneof;
use sensa_core::{DataPoint, EventerOut, ValidatorOut};
use sensa_queue::{MemoryQueue, Queue};
use sensa_stage::{Accumulator, Eventer, StageMetrics, worker};
use sensa_store::DeviceReader;

use common::{collect, ctx, eventually, stays_empty, store, ts};

#[tokio::test]
async fn redelivered_point_is_stored_and_fired_once() {
    let queue = Arc::new(MemoryQueue::new());
    let metrics = StageMetrics::new();
    let store = store().await;
    let tap = queue.subscribe("EventerOut", "tap").await.unwrap();

    let accumulator = Arc::new(Accumulator::new(
        ctx("accumulator", &metrics),
        Arc::new(store.clone()),
    ));
    let eventer = Arc::new(Eventer::new(
        ctx("eventer", &metrics),
        queue.clone(),
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        "EventerOut",
    ));
    let stages = vec![
        worker::start(accumulator, queue.clone(), "ValidatorOut", "accumulator", 2)
            .await
            .unwrap(),
        worker::start(eventer, queue.clone(), "ValidatorOut", "eventer", 2)
            .await
            .unwrap(),
    ];

    let device = store.read_by_uniq_id("dev1").await.unwrap();
    let out = ValidatorOut {
        point: Some(DataPoint {
            uniq_id: "dev1".into(),
            attr: "open".into(),
            val_oneof: Some(ValOneof::BoolVal(true)),
            ts: Some(ts(1_700_000_000)),
            token: String::new(),
            trace_id: "trace-twice".into(),
        }),
        device: Some(device),
    };
    let payload = Bytes::from(out.encode_to_vec());
    queue.publish("ValidatorOut", payload.clone()).await.unwrap();
    queue.publish("ValidatorOut", payload).await.unwrap();

    let fired: Vec<EventerOut> = collect(&tap, 1).await;
    assert!(stays_empty(&tap).await);
    assert!(eventually(|| metrics.get("accumulator.duplicate") == 1).await);
    for stage in stages {
        stage.shutdown().await;
    }

    assert_eq!(fired[0].rule.as_ref().unwrap().id, "r-1");
    assert_eq!(store.points().len(), 1);
    assert_eq!(store.events().len(), 1);
    assert_eq!(metrics.get("accumulator.stored"), 1);
    assert_eq!(metrics.get("eventer.duplicate"), 1);
    assert_eq!(metrics.get("eventer.fired"), 1);
    // the broken rule fails on each delivery without blocking r-1
    assert_eq!(metrics.get("eventer.evaluate"), 2);
}

#[tokio::test]
async fn oversized_value_is_dropped_not_retried() {
    let queue = Arc::new(MemoryQueue::new());
    let metrics = StageMetrics::new();
    let store = store().await;

    let accumulator = Arc::new(Accumulator::new(
        ctx("accumulator", &metrics),
        Arc::new(store.clone()),
    ));
    let stage = worker::start(accumulator, queue.clone(), "ValidatorOut", "accumulator", 1)
        .await
        .unwrap();

    let device = store.read_by_uniq_id("dev1").await.unwrap();
    let out = ValidatorOut {
        point: Some(DataPoint {
            uniq_id: "dev1".into(),
            attr: "note".into(),
            val_oneof: Some(ValOneof::StrVal("x".repeat(5000))),
            ts: Some(ts(1_700_000_000)),
            ..Default::default()
        }),
        device: Some(device),
    };
    queue
        .publish("ValidatorOut", Bytes::from(out.encode_to_vec()))
        .await
        .unwrap();

    assert!(eventually(|| metrics.get("accumulator.invalid_format") == 1).await);
    stage.shutdown().await;
    assert!(store.points().is_empty());
    assert_eq!(metrics.get("accumulator.requeue"), 0);
}
