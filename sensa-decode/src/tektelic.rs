//! Tektelic Smart Room ("Home") sensor.
//!
//! The payload is a sequence of `{channel, type, value}` triplets. The width
//! of `value` depends on the channel/type pair.

use sensa_core::Point;

use crate::DecodeError;
use crate::units::c_to_f;

const NAME: &str = "tektelic_home_v1";

#[derive(Clone, Copy)]
enum Field {
    Battery,
    Open,
    Light,
    Temperature,
    Humidity,
    OpenCount,
    Motion,
    MotionCount,
}

impl Field {
    fn from_tag(channel: u8, kind: u8) -> Option<Self> {
        match (channel, kind) {
            (0x00, 0xff) => Some(Field::Battery),
            (0x01, 0x00) => Some(Field::Open),
            (0x02, 0x00) => Some(Field::Light),
            (0x03, 0x67) => Some(Field::Temperature),
            (0x04, 0x68) => Some(Field::Humidity),
            (0x08, 0x04) => Some(Field::OpenCount),
            (0x0a, 0x00) => Some(Field::Motion),
            (0x0d, 0x04) => Some(Field::MotionCount),
            _ => None,
        }
    }

    fn width(self) -> usize {
        match self {
            Field::Open | Field::Light | Field::Humidity | Field::Motion => 1,
            Field::Battery | Field::Temperature | Field::OpenCount | Field::MotionCount => 2,
        }
    }

    fn push(self, v: &[u8], points: &mut Vec<Point>) {
        match self {
            Field::Battery => {
                let volts = f64::from(i16::from_be_bytes([v[0], v[1]])) / 100.0;
                points.push(Point::new("battery_v", volts));
            }
            Field::Open => points.push(Point::new("open", v[0] != 0)),
            Field::Light => points.push(Point::new("light_detected", v[0] != 0)),
            Field::Temperature => {
                let temp_c = f64::from(i16::from_be_bytes([v[0], v[1]])) / 10.0;
                points.push(Point::new("temp_c", temp_c));
                points.push(Point::new("temp_f", c_to_f(temp_c)));
            }
            Field::Humidity => points.push(Point::new("humidity", f64::from(v[0]) / 2.0)),
            Field::OpenCount => {
                points.push(Point::new("open_count", i32::from(u16::from_be_bytes([v[0], v[1]]))))
            }
            Field::Motion => points.push(Point::new("motion", v[0] != 0)),
            Field::MotionCount => points.push(Point::new(
                "motion_count",
                i32::from(u16::from_be_bytes([v[0], v[1]])),
            )),
        }
    }
}

pub(crate) fn home_v1(data: &[u8], points: &mut Vec<Point>) -> Result<(), DecodeError> {
    let mut rest = data;

    while !rest.is_empty() {
        let [channel, kind, tail @ ..] = rest else {
            return Err(DecodeError::format(NAME, "trailing byte after last field", data));
        };

        let Some(field) = Field::from_tag(*channel, *kind) else {
            return Err(DecodeError::format(
                NAME,
                format!("unknown field {channel:02x}{kind:02x}"),
                data,
            ));
        };

        let width = field.width();
        if tail.len() < width {
            return Err(DecodeError::format(
                NAME,
                format!("field {channel:02x}{kind:02x} needs {width} bytes"),
                data,
            ));
        }

        let (value, next) = tail.split_at(width);
        field.push(value, points);
        rest = next;
    }

    Ok(())
}
