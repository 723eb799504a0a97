use jiff::Timestamp;
use sensa_core::Point;

use super::model::{ConnState, GatewayStats, GatewayUplink};
use super::{LoraEvent, parse, raw_point, saturate, valid_time};
use crate::DecodeError;

const NAME: &str = "chirpstack_gateway";

/// Parse a gateway bridge event (`up`, `stats` or `conn`).
pub fn gateway_event(
    event: &str,
    payload: &[u8],
    now: Timestamp,
) -> Result<LoraEvent, DecodeError> {
    let (doc, raw) = raw_point("raw_gateway", NAME, payload)?;
    let mut points = vec![raw];

    let ts = match event {
        "up" => {
            let up: GatewayUplink = parse(NAME, doc, payload)?;
            points.push(Point::new("frequency", saturate(up.tx_info.frequency)));
            if let Some(sf) = up.tx_info.spreading_factor() {
                points.push(Point::new("sf", saturate(sf)));
            }
            points.push(Point::new("lora_rssi", up.rx_info.rssi));
            points.push(Point::new("snr", up.rx_info.snr));
            points.push(Point::new("channel", saturate(up.rx_info.channel)));
            valid_time(up.rx_info.time, now)
        }
        "stats" => {
            let stats: GatewayStats = parse(NAME, doc, payload)?;
            points.push(Point::new("rx_received", saturate(stats.rx_packets_received)));
            points.push(Point::new(
                "rx_received_valid",
                saturate(stats.rx_packets_received_ok),
            ));
            points.push(Point::new("tx_received", saturate(stats.tx_packets_received)));
            points.push(Point::new("tx_transmitted", saturate(stats.tx_packets_emitted)));
            valid_time(stats.time, now)
        }
        "conn" => {
            let conn: ConnState = parse(NAME, doc, payload)?;
            points.push(Point::new("conn", conn.state));
            now
        }
        other => {
            return Err(DecodeError::format(
                NAME,
                format!("unknown gateway event {other:?}"),
                payload,
            ));
        }
    };

    Ok(LoraEvent {
        points,
        ts,
        data: None,
        data_error: None,
    })
}
