//! Subset of the ChirpStack v4 JSON documents the parsers read. Unknown
//! fields are ignored.

use jiff::Timestamp;
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(super) struct LoraModulation {
    pub spreading_factor: u32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct Modulation {
    pub lora: Option<LoraModulation>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(super) struct TxInfo {
    pub frequency: u32,
    pub modulation: Option<Modulation>,
}

impl TxInfo {
    pub fn spreading_factor(&self) -> Option<u32> {
        self.modulation
            .as_ref()
            .and_then(|m| m.lora.as_ref())
            .map(|l| l.spreading_factor)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(super) struct RxInfo {
    pub gateway_id: String,
    pub time: Option<Timestamp>,
    pub rssi: i32,
    pub snr: f64,
    pub channel: u32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(super) struct GatewayUplink {
    pub tx_info: TxInfo,
    pub rx_info: RxInfo,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(super) struct GatewayStats {
    pub time: Option<Timestamp>,
    pub rx_packets_received: u32,
    pub rx_packets_received_ok: u32,
    pub tx_packets_received: u32,
    pub tx_packets_emitted: u32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct ConnState {
    pub state: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(super) struct DeviceUplink {
    pub time: Option<Timestamp>,
    pub dev_addr: String,
    pub adr: bool,
    pub dr: u32,
    pub f_cnt: u32,
    pub f_port: u32,
    pub confirmed: bool,
    /// Base64 application payload.
    pub data: Option<String>,
    pub rx_info: Vec<RxInfo>,
    pub tx_info: TxInfo,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(super) struct DeviceJoin {
    pub time: Option<Timestamp>,
    pub dev_addr: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(super) struct DeviceAck {
    pub time: Option<Timestamp>,
    pub acknowledged: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(super) struct DeviceTxAck {
    pub time: Option<Timestamp>,
    pub gateway_id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(super) struct DeviceStatus {
    pub time: Option<Timestamp>,
    pub margin: i32,
    pub external_power_source: bool,
    pub battery_level_unavailable: bool,
    pub battery_level: f64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct DeviceLog {
    pub time: Option<Timestamp>,
    pub level: String,
    pub code: String,
    pub description: String,
}

/// Fields shared by events that carry nothing else of interest.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct Timed {
    pub time: Option<Timestamp>,
}
