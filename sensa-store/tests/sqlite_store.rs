use prost_types::Timestamp;
use sensa_core::proto::data_point::ValOneof;
use sensa_core::{
    Alarm, AlarmType, Alert, AlertStatus, DataPoint, Decoder, Device, Event, Org, Rule, Status,
    User,
};
use sensa_store::{
    AlarmLister, AlertWriter, DeviceReader, EventWriter, OrgReader, PointWriter, RuleLister,
    Seeder, SqliteStore, StoreError, UserLister,
};

fn point(attr: &str, value: ValOneof, seconds: i64) -> DataPoint {
    DataPoint {
        uniq_id: "dev1".into(),
        attr: attr.into(),
        val_oneof: Some(value),
        ts: Some(Timestamp { seconds, nanos: 0 }),
        token: String::new(),
        trace_id: "trace".into(),
    }
}

async fn seeded() -> SqliteStore {
    let store = SqliteStore::in_memory().await.unwrap();

    store
        .put_org(Org {
            id: "org-1".into(),
            name: "acme".into(),
            display_name: "Acme".into(),
            email: "ops@acme.test".into(),
        })
        .await
        .unwrap();
    store
        .put_device(Device {
            id: "d-1".into(),
            org_id: "org-1".into(),
            uniq_id: "dev1".into(),
            name: "front door".into(),
            status: Status::Active as i32,
            token: "tok".into(),
            decoder: Decoder::RadioBridgeDoorV1 as i32,
            tags: vec!["door".into(), "hq".into()],
        })
        .await
        .unwrap();
    store
        .put_rule(Rule {
            id: "r-1".into(),
            org_id: "org-1".into(),
            name: "door opened".into(),
            status: Status::Active as i32,
            device_tags: vec!["door".into()],
            attr: "open".into(),
            expr: "pointVal == true".into(),
        })
        .await
        .unwrap();
    store
        .put_alarm(Alarm {
            id: "a-1".into(),
            org_id: "org-1".into(),
            rule_id: "r-1".into(),
            name: "notify".into(),
            status: Status::Active,
            alarm_type: AlarmType::Email,
            user_tags: vec!["oncall".into()],
            subject_template: "{{ rule.name }}".into(),
            body_template: "{{ point.value }}".into(),
            repeat_interval_secs: 300,
        })
        .await
        .unwrap();
    store
        .put_user(User {
            id: "u-1".into(),
            org_id: "org-1".into(),
            name: "Ana".into(),
            email: "ana@acme.test".into(),
            phone: String::new(),
            app_key: String::new(),
            status: Status::Active,
            tags: vec!["oncall".into()],
        })
        .await
        .unwrap();

    store
}

#[tokio::test]
async fn reads_directory_records() {
    let store = seeded().await;

    let device = store.read_by_uniq_id("dev1").await.unwrap();
    assert_eq!(device.decoder(), Decoder::RadioBridgeDoorV1);
    assert_eq!(device.tags, vec!["door", "hq"]);
    assert_eq!(
        store.read_by_uniq_id("missing").await,
        Err(StoreError::NotFound)
    );

    assert_eq!(store.read("org-1").await.unwrap().display_name, "Acme");

    let alarms = store.list("org-1", "r-1").await.unwrap();
    assert_eq!(alarms.len(), 1);
    assert_eq!(alarms[0].alarm_type, AlarmType::Email);
    assert_eq!(alarms[0].repeat_interval_secs, 300);
}

#[tokio::test]
async fn tag_intersection_queries() {
    let store = seeded().await;

    let rules = RuleLister::list_by_tags(&store, "org-1", "open", &["hq".into(), "door".into()])
        .await
        .unwrap();
    assert_eq!(rules.len(), 1);

    let none = RuleLister::list_by_tags(&store, "org-1", "open", &["window".into()])
        .await
        .unwrap();
    assert!(none.is_empty());

    let wrong_attr = RuleLister::list_by_tags(&store, "org-1", "count", &["door".into()])
        .await
        .unwrap();
    assert!(wrong_attr.is_empty());

    let users = UserLister::list_by_tags(&store, "org-1", &["oncall".into()])
        .await
        .unwrap();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].email, "ana@acme.test");
}

#[tokio::test]
async fn duplicate_point_is_already_exists() {
    let store = seeded().await;
    let p = point("count", ValOneof::IntVal(9), 1_700_000_000);

    PointWriter::create(&store, &p, "org-1").await.unwrap();
    assert_eq!(
        PointWriter::create(&store, &p, "org-1").await,
        Err(StoreError::AlreadyExists)
    );

    // Same key in another org is a different point.
    PointWriter::create(&store, &p, "org-2").await.unwrap();
}

#[tokio::test]
async fn oversized_values_are_invalid_format() {
    let store = seeded().await;

    let long_attr = point(&"a".repeat(41), ValOneof::IntVal(1), 1);
    assert!(matches!(
        PointWriter::create(&store, &long_attr, "org-1").await,
        Err(StoreError::InvalidFormat(_))
    ));

    let long_str = point("s", ValOneof::StrVal("x".repeat(5000)), 1);
    assert!(matches!(
        PointWriter::create(&store, &long_str, "org-1").await,
        Err(StoreError::InvalidFormat(_))
    ));
}

#[tokio::test]
async fn duplicate_event_is_already_exists() {
    let store = seeded().await;
    let event = Event {
        org_id: "org-1".into(),
        uniq_id: "dev1".into(),
        rule_id: "r-1".into(),
        created_at: jiff::Timestamp::from_second(1_700_000_000).unwrap(),
        trace_id: "trace".into(),
    };

    EventWriter::create(&store, &event).await.unwrap();
    assert_eq!(
        EventWriter::create(&store, &event).await,
        Err(StoreError::AlreadyExists)
    );
}

#[tokio::test]
async fn alerts_are_append_only() {
    let store = seeded().await;
    let alert = Alert {
        org_id: "org-1".into(),
        uniq_id: "dev1".into(),
        alarm_id: "a-1".into(),
        user_id: "u-1".into(),
        status: AlertStatus::Error,
        error: Some("no email".into()),
        trace_id: "trace".into(),
        created_at: jiff::Timestamp::now(),
    };

    AlertWriter::create(&store, &alert).await.unwrap();
    AlertWriter::create(&store, &alert).await.unwrap();
}

#[tokio::test]
async fn file_database_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sensa.db");
    let path = path.to_str().unwrap();

    {
        let store = SqliteStore::connect(path).await.unwrap();
        let p = point("count", ValOneof::IntVal(1), 42);
        PointWriter::create(&store, &p, "org-1").await.unwrap();
    }

    let store = SqliteStore::connect(path).await.unwrap();
    let p = point("count", ValOneof::IntVal(1), 42);
    assert_eq!(
        PointWriter::create(&store, &p, "org-1").await,
        Err(StoreError::AlreadyExists)
    );
}
