//! SQLite implementation of every store, with embedded migrations.
//!
//! Uniqueness and value limits are enforced by the schema; constraint
//! violations surface as [`StoreError::AlreadyExists`] and
//! [`StoreError::InvalidFormat`].

use async_trait::async_trait;
use sensa_core::proto::data_point::ValOneof;
use sensa_core::{
    Alarm, AlarmType, Alert, DataPoint, Device, Event, Org, Rule, Status, User, time,
};
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use tracing::info;

use crate::validate::micros;
use crate::{
    AlarmLister, AlertWriter, DeviceReader, EventWriter, OrgReader, PointWriter, RuleLister,
    Seeder, StoreError, UserLister,
};

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

// Rows whose JSON tag column shares an element with the bound JSON array.
const TAGS_INTERSECT: &str =
    "EXISTS (SELECT 1 FROM json_each({col}) AS t WHERE t.value IN (SELECT value FROM json_each(?)))";

fn tags_intersect(col: &str) -> String {
    TAGS_INTERSECT.replace("{col}", col)
}

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path` and migrate it.
    pub async fn connect(path: impl AsRef<str>) -> Result<Self, StoreError> {
        let url = format!("sqlite:{}?mode=rwc", path.as_ref());
        info!(%url, "Opening SQLite store");
        let pool = SqlitePoolOptions::new().connect(&url).await?;
        MIGRATOR.run(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn in_memory() -> Result<Self, StoreError> {
        // Every connection to `sqlite::memory:` is a separate database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        MIGRATOR.run(&pool).await?;
        Ok(Self { pool })
    }
}

fn tags_to_json(tags: &[String]) -> Result<String, StoreError> {
    serde_json::to_string(tags).map_err(|e| StoreError::InvalidFormat(e.to_string()))
}

fn tags_from_row(row: &SqliteRow, col: &str) -> Result<Vec<String>, StoreError> {
    let raw: String = row.try_get(col)?;
    serde_json::from_str(&raw).map_err(|e| StoreError::InvalidFormat(format!("{col}: {e}")))
}

fn status_from_row(row: &SqliteRow) -> Result<Status, StoreError> {
    let raw: i32 = row.try_get("status")?;
    Status::try_from(raw).map_err(|_| StoreError::InvalidFormat(format!("status {raw}")))
}

fn device_from_row(row: &SqliteRow) -> Result<Device, StoreError> {
    Ok(Device {
        id: row.try_get("id")?,
        org_id: row.try_get("org_id")?,
        uniq_id: row.try_get("uniq_id")?,
        name: row.try_get("name")?,
        status: status_from_row(row)? as i32,
        token: row.try_get("token")?,
        decoder: row.try_get("decoder")?,
        tags: tags_from_row(row, "tags")?,
    })
}

fn rule_from_row(row: &SqliteRow) -> Result<Rule, StoreError> {
    Ok(Rule {
        id: row.try_get("id")?,
        org_id: row.try_get("org_id")?,
        name: row.try_get("name")?,
        status: status_from_row(row)? as i32,
        device_tags: tags_from_row(row, "device_tags")?,
        attr: row.try_get("attr")?,
        expr: row.try_get("expr")?,
    })
}

fn alarm_from_row(row: &SqliteRow) -> Result<Alarm, StoreError> {
    let alarm_type: i32 = row.try_get("alarm_type")?;
    let repeat: i64 = row.try_get("repeat_interval_secs")?;

    Ok(Alarm {
        id: row.try_get("id")?,
        org_id: row.try_get("org_id")?,
        rule_id: row.try_get("rule_id")?,
        name: row.try_get("name")?,
        status: status_from_row(row)?,
        alarm_type: AlarmType::try_from(alarm_type).unwrap_or(AlarmType::Unspecified),
        user_tags: tags_from_row(row, "user_tags")?,
        subject_template: row.try_get("subject_template")?,
        body_template: row.try_get("body_template")?,
        repeat_interval_secs: u32::try_from(repeat)
            .map_err(|_| StoreError::InvalidFormat(format!("repeat interval {repeat}")))?,
    })
}

fn user_from_row(row: &SqliteRow) -> Result<User, StoreError> {
    Ok(User {
        id: row.try_get("id")?,
        org_id: row.try_get("org_id")?,
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        phone: row.try_get("phone")?,
        app_key: row.try_get("app_key")?,
        status: status_from_row(row)?,
        tags: tags_from_row(row, "tags")?,
    })
}

#[async_trait]
impl DeviceReader for SqliteStore {
    async fn read_by_uniq_id(&self, uniq_id: &str) -> Result<Device, StoreError> {
        let row = sqlx::query(
            r#"SELECT id, org_id, uniq_id, name, status, token, decoder, tags
               FROM devices WHERE uniq_id = ?"#,
        )
        .bind(uniq_id)
        .fetch_one(&self.pool)
        .await?;

        device_from_row(&row)
    }
}

#[async_trait]
impl OrgReader for SqliteStore {
    async fn read(&self, org_id: &str) -> Result<Org, StoreError> {
        let row = sqlx::query(r#"SELECT id, name, display_name, email FROM orgs WHERE id = ?"#)
            .bind(org_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(Org {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            display_name: row.try_get("display_name")?,
            email: row.try_get("email")?,
        })
    }
}

#[async_trait]
impl RuleLister for SqliteStore {
    async fn list_by_tags(
        &self,
        org_id: &str,
        attr: &str,
        tags: &[String],
    ) -> Result<Vec<Rule>, StoreError> {
        let sql = format!(
            "SELECT id, org_id, name, status, device_tags, attr, expr FROM rules \
             WHERE org_id = ? AND attr = ? AND {} ORDER BY id",
            tags_intersect("rules.device_tags")
        );
        let rows = sqlx::query(&sql)
            .bind(org_id)
            .bind(attr)
            .bind(tags_to_json(tags)?)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(rule_from_row).collect()
    }
}

#[async_trait]
impl AlarmLister for SqliteStore {
    async fn list(&self, org_id: &str, rule_id: &str) -> Result<Vec<Alarm>, StoreError> {
        let rows = sqlx::query(
            r#"SELECT id, org_id, rule_id, name, status, alarm_type, user_tags,
                      subject_template, body_template, repeat_interval_secs
               FROM alarms WHERE org_id = ? AND rule_id = ? ORDER BY id"#,
        )
        .bind(org_id)
        .bind(rule_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(alarm_from_row).collect()
    }
}

#[async_trait]
impl UserLister for SqliteStore {
    async fn list_by_tags(&self, org_id: &str, tags: &[String]) -> Result<Vec<User>, StoreError> {
        let sql = format!(
            "SELECT id, org_id, name, email, phone, app_key, status, tags FROM users \
             WHERE org_id = ? AND {} ORDER BY id",
            tags_intersect("users.tags")
        );
        let rows = sqlx::query(&sql)
            .bind(org_id)
            .bind(tags_to_json(tags)?)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(user_from_row).collect()
    }
}

#[async_trait]
impl PointWriter for SqliteStore {
    async fn create(&self, point: &DataPoint, org_id: &str) -> Result<(), StoreError> {
        let ts = point
            .ts
            .as_ref()
            .and_then(time::from_proto)
            .ok_or_else(|| StoreError::InvalidFormat("point has no valid timestamp".into()))?;

        let (mut int_val, mut fl_val, mut str_val, mut bool_val, mut bytes_val) =
            (None, None, None, None, None);
        match &point.val_oneof {
            Some(ValOneof::IntVal(v)) => int_val = Some(*v),
            Some(ValOneof::FlVal(v)) => fl_val = Some(*v),
            Some(ValOneof::StrVal(v)) => str_val = Some(v.as_str()),
            Some(ValOneof::BoolVal(v)) => bool_val = Some(*v),
            Some(ValOneof::BytesVal(v)) => bytes_val = Some(v.as_slice()),
            None => {}
        }

        sqlx::query(
            r#"
            INSERT INTO data_points
                (org_id, uniq_id, attr, int_val, fl_val, str_val, bool_val, bytes_val, created_at, trace_id)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(org_id)
        .bind(&point.uniq_id)
        .bind(&point.attr)
        .bind(int_val)
        .bind(fl_val)
        .bind(str_val)
        .bind(bool_val)
        .bind(bytes_val)
        .bind(micros(ts))
        .bind(&point.trace_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl EventWriter for SqliteStore {
    async fn create(&self, event: &Event) -> Result<(), StoreError> {
        sqlx::query(
            r#"INSERT INTO events (org_id, uniq_id, rule_id, created_at, trace_id)
               VALUES (?, ?, ?, ?, ?)"#,
        )
        .bind(&event.org_id)
        .bind(&event.uniq_id)
        .bind(&event.rule_id)
        .bind(micros(event.created_at))
        .bind(&event.trace_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl AlertWriter for SqliteStore {
    async fn create(&self, alert: &Alert) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO alerts
                (id, org_id, uniq_id, alarm_id, user_id, status, error, trace_id, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(ulid::Ulid::new().to_string())
        .bind(&alert.org_id)
        .bind(&alert.uniq_id)
        .bind(&alert.alarm_id)
        .bind(&alert.user_id)
        .bind(alert.status.as_str())
        .bind(alert.error.as_deref())
        .bind(&alert.trace_id)
        .bind(micros(alert.created_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl Seeder for SqliteStore {
    async fn put_org(&self, org: Org) -> Result<(), StoreError> {
        sqlx::query(
            r#"INSERT OR REPLACE INTO orgs (id, name, display_name, email) VALUES (?, ?, ?, ?)"#,
        )
        .bind(org.id)
        .bind(org.name)
        .bind(org.display_name)
        .bind(org.email)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn put_device(&self, device: Device) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO devices (id, org_id, uniq_id, name, status, token, decoder, tags)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&device.id)
        .bind(&device.org_id)
        .bind(&device.uniq_id)
        .bind(&device.name)
        .bind(device.status)
        .bind(&device.token)
        .bind(device.decoder)
        .bind(tags_to_json(&device.tags)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn put_rule(&self, rule: Rule) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO rules (id, org_id, name, status, device_tags, attr, expr)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&rule.id)
        .bind(&rule.org_id)
        .bind(&rule.name)
        .bind(rule.status)
        .bind(tags_to_json(&rule.device_tags)?)
        .bind(&rule.attr)
        .bind(&rule.expr)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn put_alarm(&self, alarm: Alarm) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO alarms
                (id, org_id, rule_id, name, status, alarm_type, user_tags,
                 subject_template, body_template, repeat_interval_secs)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&alarm.id)
        .bind(&alarm.org_id)
        .bind(&alarm.rule_id)
        .bind(&alarm.name)
        .bind(alarm.status as i32)
        .bind(alarm.alarm_type as i32)
        .bind(tags_to_json(&alarm.user_tags)?)
        .bind(&alarm.subject_template)
        .bind(&alarm.body_template)
        .bind(i64::from(alarm.repeat_interval_secs))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn put_user(&self, user: User) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO users (id, org_id, name, email, phone, app_key, status, tags)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&user.id)
        .bind(&user.org_id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.phone)
        .bind(&user.app_key)
        .bind(user.status as i32)
        .bind(tags_to_json(&user.tags)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
