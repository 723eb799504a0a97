//! Wire messages exchanged between stages.
//!
//! Every inter-stage payload is binary protobuf. Field presence matters:
//! a message missing `point`, `device` or `rule` is dropped by consumers.

mod json;

pub use json::{JsonError, points_in_from_json};
use prost_types::Timestamp;

/// Lifecycle state shared by devices, rules, alarms and users.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum Status {
    Unspecified = 0,
    Active = 1,
    Disabled = 2,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Unspecified => "UNSPECIFIED",
            Status::Active => "ACTIVE",
            Status::Disabled => "DISABLED",
        }
    }
}

/// Payload format of a device.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum Decoder {
    Unspecified = 0,
    Raw = 1,
    Gateway = 2,
    RadioBridgeDoorV1 = 3,
    RadioBridgeDoorV2 = 4,
    GlobalsatCo2 = 5,
    TektelicHomeV1 = 6,
}

impl Decoder {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decoder::Unspecified => "UNSPECIFIED",
            Decoder::Raw => "RAW",
            Decoder::Gateway => "GATEWAY",
            Decoder::RadioBridgeDoorV1 => "RADIO_BRIDGE_DOOR_V1",
            Decoder::RadioBridgeDoorV2 => "RADIO_BRIDGE_DOOR_V2",
            Decoder::GlobalsatCo2 => "GLOBALSAT_CO2",
            Decoder::TektelicHomeV1 => "TEKTELIC_HOME_V1",
        }
    }
}

/// Notification channel of an alarm.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum AlarmType {
    Unspecified = 0,
    App = 1,
    Sms = 2,
    Email = 3,
}

impl AlarmType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlarmType::Unspecified => "UNSPECIFIED",
            AlarmType::App => "APP",
            AlarmType::Sms => "SMS",
            AlarmType::Email => "EMAIL",
        }
    }
}

/// A device data point as it travels through the pipeline.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DataPoint {
    #[prost(string, tag = "1")]
    pub uniq_id: String,
    #[prost(string, tag = "2")]
    pub attr: String,
    #[prost(oneof = "data_point::ValOneof", tags = "3, 4, 5, 6, 7")]
    pub val_oneof: Option<data_point::ValOneof>,
    #[prost(message, optional, tag = "8")]
    pub ts: Option<Timestamp>,
    #[prost(string, tag = "9")]
    pub token: String,
    #[prost(string, tag = "10")]
    pub trace_id: String,
}

pub mod data_point {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum ValOneof {
        #[prost(int32, tag = "3")]
        IntVal(i32),
        #[prost(double, tag = "4")]
        FlVal(f64),
        #[prost(string, tag = "5")]
        StrVal(String),
        #[prost(bool, tag = "6")]
        BoolVal(bool),
        #[prost(bytes = "vec", tag = "7")]
        BytesVal(Vec<u8>),
    }
}

/// Resolved device identity.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Device {
    #[prost(string, tag = "1")]
    pub id: String,
    #[prost(string, tag = "2")]
    pub org_id: String,
    #[prost(string, tag = "3")]
    pub uniq_id: String,
    #[prost(string, tag = "4")]
    pub name: String,
    #[prost(enumeration = "Status", tag = "5")]
    pub status: i32,
    #[prost(string, tag = "6")]
    pub token: String,
    #[prost(enumeration = "Decoder", tag = "7")]
    pub decoder: i32,
    #[prost(string, repeated, tag = "8")]
    pub tags: Vec<String>,
}

/// Boolean expression evaluated against points of matching devices.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Rule {
    #[prost(string, tag = "1")]
    pub id: String,
    #[prost(string, tag = "2")]
    pub org_id: String,
    #[prost(string, tag = "3")]
    pub name: String,
    #[prost(enumeration = "Status", tag = "4")]
    pub status: i32,
    #[prost(string, repeated, tag = "5")]
    pub device_tags: Vec<String>,
    #[prost(string, tag = "6")]
    pub attr: String,
    #[prost(string, tag = "7")]
    pub expr: String,
}

/// Opaque device payload awaiting decode.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DecoderIn {
    #[prost(string, tag = "1")]
    pub uniq_id: String,
    #[prost(bytes = "vec", tag = "2")]
    pub data: Vec<u8>,
    #[prost(message, optional, tag = "3")]
    pub ts: Option<Timestamp>,
    #[prost(string, tag = "4")]
    pub trace_id: String,
}

/// Canonical input of the validator.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ValidatorIn {
    #[prost(message, optional, tag = "1")]
    pub point: Option<DataPoint>,
    #[prost(string, tag = "2")]
    pub org_id: String,
    /// Set when the transport already authenticated the payload.
    #[prost(bool, tag = "3")]
    pub skip_token: bool,
}

/// Validated point paired with its device; the pipeline's fan-out message.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ValidatorOut {
    #[prost(message, optional, tag = "1")]
    pub point: Option<DataPoint>,
    #[prost(message, optional, tag = "2")]
    pub device: Option<Device>,
}

/// A point that satisfied a rule.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EventerOut {
    #[prost(message, optional, tag = "1")]
    pub point: Option<DataPoint>,
    #[prost(message, optional, tag = "2")]
    pub device: Option<Device>,
    #[prost(message, optional, tag = "3")]
    pub rule: Option<Rule>,
}

/// A point published by a device over MQTT.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MqttPoint {
    #[prost(string, tag = "1")]
    pub attr: String,
    #[prost(oneof = "mqtt_point::ValOneof", tags = "2, 3, 4, 5, 6")]
    pub val_oneof: Option<mqtt_point::ValOneof>,
    #[prost(message, optional, tag = "7")]
    pub ts: Option<Timestamp>,
    #[prost(string, tag = "8")]
    pub uniq_id: String,
    #[prost(string, tag = "9")]
    pub token: String,
}

pub mod mqtt_point {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum ValOneof {
        #[prost(int32, tag = "2")]
        IntVal(i32),
        #[prost(double, tag = "3")]
        FlVal(f64),
        #[prost(string, tag = "4")]
        StrVal(String),
        #[prost(bool, tag = "5")]
        BoolVal(bool),
        #[prost(bytes = "vec", tag = "6")]
        BytesVal(Vec<u8>),
    }
}

/// Batch of points published by a device over MQTT.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MqttPointsIn {
    #[prost(message, repeated, tag = "1")]
    pub points: Vec<MqttPoint>,
    #[prost(string, tag = "2")]
    pub token: String,
    #[prost(string, tag = "3")]
    pub uniq_id: String,
}
