//! Protobuf JSON mapping for MQTT ingestion payloads.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;

use super::{MqttPoint, MqttPointsIn, mqtt_point::ValOneof};
use crate::time;

#[derive(Debug, thiserror::Error)]
pub enum JsonError {
    #[error("malformed JSON: {0}")]
    Syntax(#[from] serde_json::Error),
    #[error("invalid base64 in bytesVal: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("invalid timestamp {0:?}")]
    Timestamp(String),
    #[error("point {attr:?} sets more than one value")]
    MultipleValues { attr: String },
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct JsonPointsIn {
    points: Vec<JsonPoint>,
    token: String,
    #[serde(alias = "uniq_id")]
    uniq_id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct JsonPoint {
    attr: String,
    #[serde(alias = "int_val")]
    int_val: Option<i32>,
    #[serde(alias = "fl_val")]
    fl_val: Option<f64>,
    #[serde(alias = "str_val")]
    str_val: Option<String>,
    #[serde(alias = "bool_val")]
    bool_val: Option<bool>,
    #[serde(alias = "bytes_val")]
    bytes_val: Option<String>,
    ts: Option<String>,
    #[serde(alias = "uniq_id")]
    uniq_id: String,
    token: String,
}

/// Parse a JSON-encoded `MqttPointsIn`.
pub fn points_in_from_json(payload: &[u8]) -> Result<MqttPointsIn, JsonError> {
    let raw: JsonPointsIn = serde_json::from_slice(payload)?;

    let points = raw
        .points
        .into_iter()
        .map(JsonPoint::into_proto)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(MqttPointsIn {
        points,
        token: raw.token,
        uniq_id: raw.uniq_id,
    })
}

impl JsonPoint {
    fn into_proto(self) -> Result<MqttPoint, JsonError> {
        let mut values = Vec::with_capacity(1);
        if let Some(v) = self.int_val {
            values.push(ValOneof::IntVal(v));
        }
        if let Some(v) = self.fl_val {
            values.push(ValOneof::FlVal(v));
        }
        if let Some(v) = self.str_val {
            values.push(ValOneof::StrVal(v));
        }
        if let Some(v) = self.bool_val {
            values.push(ValOneof::BoolVal(v));
        }
        if let Some(v) = self.bytes_val {
            values.push(ValOneof::BytesVal(STANDARD.decode(v)?));
        }
        if values.len() > 1 {
            return Err(JsonError::MultipleValues { attr: self.attr });
        }

        let ts = match self.ts {
            Some(raw) => {
                let parsed = raw
                    .parse::<jiff::Timestamp>()
                    .map_err(|_| JsonError::Timestamp(raw.clone()))?;
                Some(time::to_proto(parsed))
            }
            None => None,
        };

        Ok(MqttPoint {
            attr: self.attr,
            val_oneof: values.pop(),
            ts,
            uniq_id: self.uniq_id,
            token: self.token,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_camel_case_points() {
        let payload = br#"{
            "token": "secret",
            "points": [
                {"attr": "temp", "flVal": 21.5, "ts": "2024-01-02T03:04:05Z"},
                {"attr": "motion", "boolVal": true, "uniqId": "dev2"},
                {"attr": "blob", "bytesVal": "GQMB"}
            ]
        }"#;

        let parsed = points_in_from_json(payload).unwrap();
        assert_eq!(parsed.token, "secret");
        assert_eq!(parsed.points.len(), 3);
        assert_eq!(parsed.points[0].val_oneof, Some(ValOneof::FlVal(21.5)));
        assert_eq!(parsed.points[0].ts.as_ref().unwrap().seconds, 1_704_164_645);
        assert_eq!(parsed.points[1].uniq_id, "dev2");
        assert_eq!(
            parsed.points[2].val_oneof,
            Some(ValOneof::BytesVal(vec![0x19, 0x03, 0x01]))
        );
    }

    #[test]
    fn rejects_two_values_on_one_point() {
        let payload = br#"{"points": [{"attr": "x", "intVal": 1, "boolVal": false}]}"#;
        assert!(matches!(
            points_in_from_json(payload),
            Err(JsonError::MultipleValues { .. })
        ));
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            points_in_from_json(b"not json"),
            Err(JsonError::Syntax(_))
        ));
    }
}
