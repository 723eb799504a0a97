use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use jiff::Timestamp;
use sensa_core::Point;

use super::model::{
    DeviceAck, DeviceJoin, DeviceLog, DeviceStatus, DeviceTxAck, DeviceUplink, RxInfo, Timed,
};
use super::{LoraEvent, parse, raw_point, saturate, valid_time};
use crate::DecodeError;

const NAME: &str = "chirpstack_device";

/// Parse an application integration event for a device.
pub fn device_event(
    event: &str,
    payload: &[u8],
    now: Timestamp,
) -> Result<LoraEvent, DecodeError> {
    let (doc, raw) = raw_point("raw_device", NAME, payload)?;
    let mut points = vec![raw];
    let mut data = None;
    let mut data_error = None;

    let reported = match event {
        "up" => {
            let up: DeviceUplink = parse(NAME, doc, payload)?;
            if let Some(rx) = strongest(up.rx_info) {
                points.push(Point::new("gateway_id", rx.gateway_id));
                points.push(Point::new("lora_rssi", rx.rssi));
                points.push(Point::new("snr", rx.snr));
                points.push(Point::new("channel", saturate(rx.channel)));
            }
            points.push(Point::new("frequency", saturate(up.tx_info.frequency)));
            if let Some(sf) = up.tx_info.spreading_factor() {
                points.push(Point::new("sf", saturate(sf)));
            }
            points.push(Point::new("adr", up.adr));
            points.push(Point::new("data_rate", saturate(up.dr)));
            points.push(Point::new("fcnt", saturate(up.f_cnt)));
            points.push(Point::new("fport", saturate(up.f_port)));
            points.push(Point::new("confirmed", up.confirmed));

            if let Some(encoded) = up.data.filter(|d| !d.is_empty()) {
                match STANDARD.decode(&encoded) {
                    Ok(bytes) => data = Some(bytes),
                    Err(e) => {
                        data_error = Some(DecodeError::format(
                            NAME,
                            format!("invalid data: {e}"),
                            encoded.as_bytes(),
                        ));
                    }
                }
            }
            up.time
        }
        "join" => {
            let join: DeviceJoin = parse(NAME, doc, payload)?;
            points.push(Point::new("join", true));
            points.push(Point::new("dev_addr", join.dev_addr));
            join.time
        }
        "ack" => {
            let ack: DeviceAck = parse(NAME, doc, payload)?;
            points.push(Point::new("ack", ack.acknowledged));
            ack.time
        }
        "txack" => {
            let txack: DeviceTxAck = parse(NAME, doc, payload)?;
            points.push(Point::new("tx_ack_gateway", txack.gateway_id));
            txack.time
        }
        "status" => {
            let status: DeviceStatus = parse(NAME, doc, payload)?;
            if !status.battery_level_unavailable {
                points.push(Point::new("battery_pct", status.battery_level));
            }
            points.push(Point::new("margin", status.margin));
            points.push(Point::new("external_power", status.external_power_source));
            status.time
        }
        "log" => {
            let log: DeviceLog = parse(NAME, doc, payload)?;
            points.push(Point::new("log_level", log.level));
            points.push(Point::new("log_code", log.code));
            points.push(Point::new("log_desc", log.description));
            log.time
        }
        "location" | "integration" => {
            let timed: Timed = parse(NAME, doc, payload)?;
            timed.time
        }
        other => {
            return Err(DecodeError::format(
                NAME,
                format!("unknown device event {other:?}"),
                payload,
            ));
        }
    };

    Ok(LoraEvent {
        points,
        ts: valid_time(reported, now),
        data,
        data_error,
    })
}

/// The reception with the highest RSSI.
fn strongest(mut rx: Vec<RxInfo>) -> Option<RxInfo> {
    rx.sort_by(|a, b| b.rssi.cmp(&a.rssi));
    rx.into_iter().next()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> Timestamp {
        "2024-05-01T12:00:00Z".parse().unwrap()
    }

    const UPLINK: &[u8] = br#"{
        "deduplicationId": "3ac7e3c4-4401-4b8d-9386-a5c902f9202d",
        "time": "2024-05-01T11:58:00Z",
        "deviceInfo": {"tenantId": "t", "applicationId": "a", "devEui": "0101010101010101"},
        "devAddr": "00189440",
        "adr": true,
        "dr": 5,
        "fCnt": 10,
        "fPort": 1,
        "confirmed": false,
        "data": "GQMB",
        "rxInfo": [
            {"gatewayId": "weak", "rssi": -110, "snr": -2.5, "channel": 0},
            {"gatewayId": "strong", "rssi": -48, "snr": 10.5, "channel": 3},
            {"gatewayId": "middle", "rssi": -80, "snr": 4.0, "channel": 1}
        ],
        "txInfo": {"frequency": 868300000, "modulation": {"lora": {"bandwidth": 125000, "spreadingFactor": 9}}}
    }"#;

    #[test]
    fn uplink_picks_strongest_reception_and_forwards_data() {
        let parsed = device_event("up", UPLINK, now()).unwrap();

        assert_eq!(parsed.points[0].attr, "raw_device");
        assert_eq!(
            &parsed.points[1..],
            &[
                Point::new("gateway_id", "strong"),
                Point::new("lora_rssi", -48),
                Point::new("snr", 10.5),
                Point::new("channel", 3),
                Point::new("frequency", 868_300_000),
                Point::new("sf", 9),
                Point::new("adr", true),
                Point::new("data_rate", 5),
                Point::new("fcnt", 10),
                Point::new("fport", 1),
                Point::new("confirmed", false),
            ]
        );
        assert_eq!(parsed.data, Some(vec![0x19, 0x03, 0x01]));
        assert_eq!(parsed.ts, "2024-05-01T11:58:00Z".parse::<Timestamp>().unwrap());
    }

    #[test]
    fn unreadable_data_keeps_radio_points() {
        let payload = br#"{
            "fCnt": 7,
            "fPort": 2,
            "data": "not*base64",
            "rxInfo": [{"gatewayId": "g1", "rssi": -80, "snr": 3.5}]
        }"#;
        let parsed = device_event("up", payload, now()).unwrap();

        assert!(parsed.data.is_none());
        let err = parsed.data_error.unwrap();
        assert!(err.to_string().contains("invalid data"), "{err}");
        assert!(parsed.points.contains(&Point::new("gateway_id", "g1")));
        assert!(parsed.points.contains(&Point::new("fcnt", 7)));
        assert!(parsed.points.contains(&Point::new("fport", 2)));
    }

    #[test]
    fn uplink_without_reception_or_data() {
        let parsed = device_event("up", br#"{"fCnt": 1}"#, now()).unwrap();
        assert!(parsed.data.is_none());
        assert!(parsed.points.iter().all(|p| p.attr != "gateway_id"));
        assert_eq!(parsed.ts, now());
    }

    #[test]
    fn status_and_log_events() {
        let status = br#"{"margin": 7, "externalPowerSource": true, "batteryLevel": 82.5}"#;
        let parsed = device_event("status", status, now()).unwrap();
        assert_eq!(
            &parsed.points[1..],
            &[
                Point::new("battery_pct", 82.5),
                Point::new("margin", 7),
                Point::new("external_power", true),
            ]
        );

        let log = br#"{"level": "ERROR", "code": "UPLINK_CODEC", "description": "boom"}"#;
        let parsed = device_event("log", log, now()).unwrap();
        assert_eq!(
            &parsed.points[1..],
            &[
                Point::new("log_level", "ERROR"),
                Point::new("log_code", "UPLINK_CODEC"),
                Point::new("log_desc", "boom"),
            ]
        );
    }

    #[test]
    fn join_ack_txack() {
        let parsed = device_event("join", br#"{"devAddr": "01020304"}"#, now()).unwrap();
        assert_eq!(parsed.points[1], Point::new("join", true));
        assert_eq!(parsed.points[2], Point::new("dev_addr", "01020304"));

        let parsed = device_event("ack", br#"{"acknowledged": true}"#, now()).unwrap();
        assert_eq!(parsed.points[1], Point::new("ack", true));

        let parsed = device_event("txack", br#"{"gatewayId": "g1"}"#, now()).unwrap();
        assert_eq!(parsed.points[1], Point::new("tx_ack_gateway", "g1"));
    }

    #[test]
    fn metadata_only_events() {
        for event in ["location", "integration"] {
            let parsed = device_event(event, b"{}", now()).unwrap();
            assert_eq!(parsed.points.len(), 1);
            assert_eq!(parsed.points[0].attr, "raw_device");
        }
    }

    #[test]
    fn rejects_unknown_event_and_bad_data() {
        assert!(device_event("downlink", b"{}", now()).is_err());
        assert!(device_event("up", br#"{"data": "!!"}"#, now()).is_err());
    }
}
