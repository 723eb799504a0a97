use sensa_core::Point;

use crate::DecodeError;
use crate::units::c_to_f;

const NAME: &str = "globalsat_co2";
const CO2_TYPE: u8 = 0x01;

/// Globalsat LS-11x CO2 sensor: type byte, temperature, humidity and CO2,
/// all big-endian.
pub(crate) fn co2(data: &[u8], points: &mut Vec<Point>) -> Result<(), DecodeError> {
    let &[kind, t0, t1, h0, h1, c0, c1] = data else {
        return Err(DecodeError::format(
            NAME,
            format!("expected 7 bytes, got {}", data.len()),
            data,
        ));
    };
    if kind != CO2_TYPE {
        return Err(DecodeError::format(
            NAME,
            format!("unexpected device type {kind:#04x}"),
            data,
        ));
    }

    let temp_c = f64::from(i16::from_be_bytes([t0, t1])) / 100.0;
    let humidity = (f64::from(u16::from_be_bytes([h0, h1])) / 100.0).min(100.0);
    let co2 = i32::from(u16::from_be_bytes([c0, c1]));

    points.push(Point::new("temp_c", temp_c));
    points.push(Point::new("temp_f", c_to_f(temp_c)));
    points.push(Point::new("humidity", humidity));
    points.push(Point::new("co2_ppm", co2));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(hex: &str) -> (Vec<Point>, Result<(), DecodeError>) {
        let data = hex::decode(hex).unwrap();
        let mut points = Vec::new();
        let res = co2(&data, &mut points);
        (points, res)
    }

    #[test]
    fn decodes_all_channels() {
        let (points, res) = run("01092913880190");
        assert!(res.is_ok());
        assert_eq!(
            points,
            vec![
                Point::new("temp_c", 23.45),
                Point::new("temp_f", 74.2),
                Point::new("humidity", 50.0),
                Point::new("co2_ppm", 400),
            ]
        );
    }

    #[test]
    fn negative_temperature_and_capped_humidity() {
        let (points, res) = run("01fc1829040190");
        assert!(res.is_ok());
        assert_eq!(points[0], Point::new("temp_c", -10.0));
        assert_eq!(points[1], Point::new("temp_f", 14.0));
        assert_eq!(points[2], Point::new("humidity", 100.0));
    }

    #[test]
    fn rejects_bad_type_and_length() {
        let (points, res) = run("02092913880190");
        assert!(points.is_empty());
        assert!(res.is_err());

        let (points, res) = run("010929");
        assert!(points.is_empty());
        assert!(res.unwrap_err().to_string().contains("010929"));
    }
}
