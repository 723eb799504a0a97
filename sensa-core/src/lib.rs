pub mod adapter;
pub mod model;
pub mod point;
pub mod proto;
pub mod time;

pub use model::{Alarm, Alert, AlertStatus, Event, Org, User};
pub use point::{Point, Value};
pub use proto::{
    AlarmType, DataPoint, Decoder, DecoderIn, Device, EventerOut, MqttPoint, MqttPointsIn, Rule,
    Status, ValidatorIn, ValidatorOut,
};

/// Payload published once per topic at startup so that lookup-based brokers
/// register the topic before the first consumer attaches.
pub const PRIME_PAYLOAD: [u8; 1] = [0x00];

/// Whether a payload is the startup priming sentinel.
pub fn is_prime(payload: &[u8]) -> bool {
    payload == PRIME_PAYLOAD
}

/// Generate a fresh trace identifier for an inbound message.
pub fn new_trace_id() -> String {
    ulid::Ulid::new().to_string()
}

/// Tag-intersection match used for rule-to-device and alarm-to-user resolution.
pub fn tags_intersect(left: &[String], right: &[String]) -> bool {
    left.iter().any(|tag| right.contains(tag))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prime_payload_is_single_zero_byte() {
        assert!(is_prime(&[0x00]));
        assert!(!is_prime(&[0x00, 0x00]));
        assert!(!is_prime(&[]));
        assert!(!is_prime(&[0x01]));
    }

    #[test]
    fn tags_intersect_requires_common_tag() {
        let device = vec!["warehouse".to_string(), "cold".to_string()];
        assert!(tags_intersect(&["cold".to_string()], &device));
        assert!(!tags_intersect(&["hot".to_string()], &device));
        assert!(!tags_intersect(&[], &device));
    }
}
