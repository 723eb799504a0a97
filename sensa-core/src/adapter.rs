//! Conversion of decoder output into canonical pipeline messages.

use prost_types::Timestamp;

use crate::point::{Point, Value};
use crate::proto::{DataPoint, MqttPoint, ValidatorIn, data_point::ValOneof, mqtt_point};

/// Map a point value to the wire oneof. `Absent` has no wire form.
pub fn to_val_oneof(value: Value) -> Option<ValOneof> {
    match value {
        Value::Int(v) => Some(ValOneof::IntVal(v)),
        Value::Float(v) => Some(ValOneof::FlVal(v)),
        Value::Str(v) => Some(ValOneof::StrVal(v)),
        Value::Bool(v) => Some(ValOneof::BoolVal(v)),
        Value::Bytes(v) => Some(ValOneof::BytesVal(v)),
        Value::Absent => None,
    }
}

/// Map the wire oneof back to a point value.
pub fn from_val_oneof(value: Option<&ValOneof>) -> Value {
    match value {
        Some(ValOneof::IntVal(v)) => Value::Int(*v),
        Some(ValOneof::FlVal(v)) => Value::Float(*v),
        Some(ValOneof::StrVal(v)) => Value::Str(v.clone()),
        Some(ValOneof::BoolVal(v)) => Value::Bool(*v),
        Some(ValOneof::BytesVal(v)) => Value::Bytes(v.clone()),
        None => Value::Absent,
    }
}

fn from_mqtt_oneof(value: Option<mqtt_point::ValOneof>) -> Option<ValOneof> {
    value.map(|v| match v {
        mqtt_point::ValOneof::IntVal(v) => ValOneof::IntVal(v),
        mqtt_point::ValOneof::FlVal(v) => ValOneof::FlVal(v),
        mqtt_point::ValOneof::StrVal(v) => ValOneof::StrVal(v),
        mqtt_point::ValOneof::BoolVal(v) => ValOneof::BoolVal(v),
        mqtt_point::ValOneof::BytesVal(v) => ValOneof::BytesVal(v),
    })
}

impl DataPoint {
    /// The point's value as a tagged variant.
    pub fn value(&self) -> Value {
        from_val_oneof(self.val_oneof.as_ref())
    }
}

/// Build the canonical data point for a decoded point.
pub fn data_point(point: Point, uniq_id: &str, ts: Timestamp, trace_id: &str) -> DataPoint {
    DataPoint {
        uniq_id: uniq_id.to_owned(),
        attr: point.attr,
        val_oneof: to_val_oneof(point.value),
        ts: Some(ts),
        token: String::new(),
        trace_id: trace_id.to_owned(),
    }
}

/// Build the canonical data point for a point received over MQTT.
///
/// `ts` is used when the device did not stamp the point itself.
pub fn mqtt_data_point(
    point: MqttPoint,
    uniq_id: &str,
    token: &str,
    ts: Timestamp,
    trace_id: &str,
) -> DataPoint {
    DataPoint {
        uniq_id: uniq_id.to_owned(),
        attr: point.attr,
        val_oneof: from_mqtt_oneof(point.val_oneof),
        ts: Some(point.ts.unwrap_or(ts)),
        token: token.to_owned(),
        trace_id: trace_id.to_owned(),
    }
}

/// Wrap a data point for the validator.
pub fn validator_in(point: DataPoint, org_id: &str, skip_token: bool) -> ValidatorIn {
    ValidatorIn {
        point: Some(point),
        org_id: org_id.to_owned(),
        skip_token,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts() -> Timestamp {
        Timestamp {
            seconds: 1_700_000_000,
            nanos: 0,
        }
    }

    #[test]
    fn decoded_point_becomes_data_point() {
        let dp = data_point(Point::new("count", 9), "dev1", ts(), "trace-1");
        assert_eq!(dp.uniq_id, "dev1");
        assert_eq!(dp.attr, "count");
        assert_eq!(dp.val_oneof, Some(ValOneof::IntVal(9)));
        assert_eq!(dp.trace_id, "trace-1");
        assert!(dp.token.is_empty());
        assert_eq!(dp.value(), Value::Int(9));
    }

    #[test]
    fn absent_value_has_no_oneof() {
        let dp = data_point(Point::absent("raw"), "dev1", ts(), "t");
        assert!(dp.val_oneof.is_none());
        assert_eq!(dp.value(), Value::Absent);
    }

    #[test]
    fn mqtt_point_keeps_its_own_timestamp() {
        let own = Timestamp {
            seconds: 42,
            nanos: 0,
        };
        let point = MqttPoint {
            attr: "temp".into(),
            val_oneof: Some(mqtt_point::ValOneof::FlVal(1.5)),
            ts: Some(own),
            ..Default::default()
        };

        let dp = mqtt_data_point(point, "dev1", "tok", ts(), "t");
        assert_eq!(dp.ts, Some(own));
        assert_eq!(dp.token, "tok");
        assert_eq!(dp.val_oneof, Some(ValOneof::FlVal(1.5)));
    }

    #[test]
    fn validator_in_carries_flags() {
        let dp = data_point(Point::new("open", true), "dev1", ts(), "t");
        let vin = validator_in(dp.clone(), "org-1", true);
        assert_eq!(vin.point, Some(dp));
        assert_eq!(vin.org_id, "org-1");
        assert!(vin.skip_token);
    }
}
