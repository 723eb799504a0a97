//! Radio Bridge wireless door sensors.
//!
//! Byte 0 carries a rolling packet counter in its low nibble, byte 1 the
//! event type.

use sensa_core::Point;

use crate::DecodeError;

const DOOR_EVENT: u8 = 0x03;
const SUPERVISORY_EVENT: u8 = 0x01;
const TAMPER_EVENT: u8 = 0x02;

fn count(b: u8) -> Point {
    Point::new("count", i32::from(b & 0x0f))
}

fn door_state(decoder: &'static str, b: u8, data: &[u8]) -> Result<Point, DecodeError> {
    match b {
        0x00 => Ok(Point::new("open", false)),
        0x01 => Ok(Point::new("open", true)),
        other => Err(DecodeError::format(
            decoder,
            format!("unknown door state {other:#04x}"),
            data,
        )),
    }
}

pub(crate) fn door_v1(data: &[u8], points: &mut Vec<Point>) -> Result<(), DecodeError> {
    const NAME: &str = "radio_bridge_door_v1";

    if data.len() != 3 {
        return Err(DecodeError::format(
            NAME,
            format!("expected 3 bytes, got {}", data.len()),
            data,
        ));
    }
    if data[1] != DOOR_EVENT {
        return Err(DecodeError::format(
            NAME,
            format!("unexpected event type {:#04x}", data[1]),
            data,
        ));
    }

    points.push(count(data[0]));
    points.push(door_state(NAME, data[2], data)?);
    Ok(())
}

pub(crate) fn door_v2(data: &[u8], points: &mut Vec<Point>) -> Result<(), DecodeError> {
    const NAME: &str = "radio_bridge_door_v2";

    if data.len() < 3 {
        return Err(DecodeError::format(
            NAME,
            format!("expected at least 3 bytes, got {}", data.len()),
            data,
        ));
    }

    points.push(count(data[0]));

    match data[1] {
        SUPERVISORY_EVENT => {
            if data.len() < 5 {
                return Err(DecodeError::format(
                    NAME,
                    format!("supervisory event needs 5 bytes, got {}", data.len()),
                    data,
                ));
            }
            // Voltage is packed as one digit per nibble: 0x29 is 2.9 V.
            let battery = f64::from((data[4] >> 4) * 10 + (data[4] & 0x0f)) / 10.0;
            points.push(Point::new("battery_v", battery));
        }
        TAMPER_EVENT => points.push(Point::new("tamper", data[2] != 0)),
        DOOR_EVENT => points.push(door_state(NAME, data[2], data)?),
        other => {
            return Err(DecodeError::format(
                NAME,
                format!("unknown event type {other:#04x}"),
                data,
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use sensa_core::Value;

    use super::*;

    fn run(
        f: fn(&[u8], &mut Vec<Point>) -> Result<(), DecodeError>,
        hex: &str,
    ) -> (Vec<Point>, Result<(), DecodeError>) {
        let data = hex::decode(hex).unwrap();
        let mut points = Vec::new();
        let res = f(&data, &mut points);
        (points, res)
    }

    #[test]
    fn door_v1_open_and_closed() {
        let (points, res) = run(door_v1, "190301");
        assert!(res.is_ok());
        assert_eq!(
            points,
            vec![Point::new("count", 9), Point::new("open", true)]
        );

        let (points, res) = run(door_v1, "1a0300");
        assert!(res.is_ok());
        assert_eq!(points[0].value, Value::Int(10));
        assert_eq!(points[1].value, Value::Bool(false));
    }

    #[test]
    fn door_v1_rejects_wrong_length_and_type() {
        let (points, res) = run(door_v1, "1903");
        assert!(points.is_empty());
        let err = res.unwrap_err();
        assert!(err.to_string().ends_with("1903"), "{err}");

        let (points, res) = run(door_v1, "190201");
        assert!(points.is_empty());
        assert!(res.is_err());
    }

    #[test]
    fn door_v1_bad_state_keeps_count() {
        let (points, res) = run(door_v1, "190307");
        assert_eq!(points, vec![Point::new("count", 9)]);
        assert!(matches!(res, Err(DecodeError::Format { .. })));
    }

    #[test]
    fn door_v2_events() {
        let (points, res) = run(door_v2, "1501000029");
        assert!(res.is_ok());
        assert_eq!(
            points,
            vec![Point::new("count", 5), Point::new("battery_v", 2.9)]
        );

        let (points, res) = run(door_v2, "120201");
        assert!(res.is_ok());
        assert_eq!(points[1], Point::new("tamper", true));

        let (points, res) = run(door_v2, "130300");
        assert!(res.is_ok());
        assert_eq!(points[1], Point::new("open", false));
    }

    #[test]
    fn door_v2_short_supervisory_keeps_count() {
        let (points, res) = run(door_v2, "150100");
        assert_eq!(points, vec![Point::new("count", 5)]);
        assert!(res.is_err());
    }

    #[test]
    fn door_v2_unknown_event() {
        let (points, res) = run(door_v2, "1009ff");
        assert_eq!(points.len(), 1);
        assert!(res.is_err());
    }
}
