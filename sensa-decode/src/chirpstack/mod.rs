//! ChirpStack v4 integration and gateway bridge events (JSON marshaler).
//!
//! Every event yields a `raw_gateway` or `raw_device` point holding the
//! canonical JSON of the inbound document, followed by the typed fields the
//! event carries.

mod device;
mod gateway;
mod model;

use std::time::Duration;

use jiff::Timestamp;
use sensa_core::Point;

pub use device::device_event;
pub use gateway::gateway_event;

use crate::DecodeError;

/// How far in the past an externally reported time may lie and still be
/// trusted.
pub const TIME_VALIDITY: Duration = Duration::from_secs(15 * 60);

/// Points parsed from one network server event.
#[derive(Debug, Clone, PartialEq)]
pub struct LoraEvent {
    pub points: Vec<Point>,
    /// Time to stamp the points with.
    pub ts: Timestamp,
    /// Opaque application payload of a device uplink, to be decoded by the
    /// device's own decoder.
    pub data: Option<Vec<u8>>,
    /// Set when the uplink carried a `data` field that could not be read.
    /// The radio metadata points are still returned.
    pub data_error: Option<DecodeError>,
}

/// Pick the reported time when it is plausible, else `now`.
///
/// Devices and gateways with unset clocks report times far in the past or in
/// the future.
pub fn valid_time(reported: Option<Timestamp>, now: Timestamp) -> Timestamp {
    match reported {
        Some(t) if t <= now && now.duration_since(t).unsigned_abs() <= TIME_VALIDITY => t,
        _ => now,
    }
}

fn raw_point(
    attr: &'static str,
    decoder: &'static str,
    payload: &[u8],
) -> Result<(serde_json::Value, Point), DecodeError> {
    let doc: serde_json::Value = serde_json::from_slice(payload)
        .map_err(|e| DecodeError::format(decoder, e.to_string(), payload))?;
    let canonical = doc.to_string();
    Ok((doc, Point::new(attr, canonical)))
}

fn parse<T: serde::de::DeserializeOwned>(
    decoder: &'static str,
    doc: serde_json::Value,
    payload: &[u8],
) -> Result<T, DecodeError> {
    serde_json::from_value(doc).map_err(|e| DecodeError::format(decoder, e.to_string(), payload))
}

fn saturate(v: u32) -> i32 {
    i32::try_from(v).unwrap_or(i32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> Timestamp {
        s.parse().unwrap()
    }

    #[test]
    fn recent_past_time_is_trusted() {
        let now = ts("2024-05-01T12:00:00Z");
        let reported = ts("2024-05-01T11:50:00Z");
        assert_eq!(valid_time(Some(reported), now), reported);
    }

    #[test]
    fn stale_future_or_missing_time_falls_back() {
        let now = ts("2024-05-01T12:00:00Z");
        assert_eq!(valid_time(Some(ts("2024-05-01T11:44:59Z")), now), now);
        assert_eq!(valid_time(Some(ts("2024-05-01T12:00:01Z")), now), now);
        assert_eq!(valid_time(Some(ts("1970-01-01T00:00:00Z")), now), now);
        assert_eq!(valid_time(None, now), now);
    }

    #[test]
    fn boundary_is_inclusive() {
        let now = ts("2024-05-01T12:00:00Z");
        let edge = ts("2024-05-01T11:45:00Z");
        assert_eq!(valid_time(Some(edge), now), edge);
    }
}
