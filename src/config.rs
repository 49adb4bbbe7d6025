/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 2/10/25
******************************************************************************/

//! Match configuration shapes. Deserialization only: no file IO, no CLI,
//! no validation beyond what `serde` gives for free. Section and field
//! names mirror the configuration file a match is started from.

use std::collections::HashMap;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EngineConfig {
    pub market_data_file: String,
    pub match_events_file: String,
    pub speed: f64,
    pub tick_interval: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ExecutionConfig {
    pub listen_address: String,
    pub port: u16,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FeesConfig {
    pub maker: f64,
    pub taker: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InformationConfig {
    pub host: String,
    pub port: u16,
    pub interface: Option<String>,
    pub allow_broadcast: bool,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InstrumentConfig {
    pub tick_size: i64,
    pub etf_clamp: f64,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LimitsConfig {
    pub active_order_count_limit: usize,
    pub active_volume_limit: u64,
    pub message_frequency_interval: f64,
    pub message_frequency_limit: usize,
    pub position_limit: i64,
}

/// The whole of a match's configuration. `traders` maps a competitor name
/// to the shared secret it must present at login.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MatchConfig {
    pub engine: EngineConfig,
    pub execution: ExecutionConfig,
    pub fees: FeesConfig,
    pub information: InformationConfig,
    pub instrument: InstrumentConfig,
    pub limits: LimitsConfig,
    pub traders: HashMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_from_json() {
        let json = r#"{
            "Engine": {"MarketDataFile": "market.csv", "MatchEventsFile": "events.csv", "Speed": 1.0, "TickInterval": 0.25},
            "Execution": {"ListenAddress": "127.0.0.1", "Port": 9999},
            "Fees": {"Maker": -0.0001, "Taker": 0.0002},
            "Information": {"Host": "127.0.0.1", "Port": 9998, "Interface": null, "AllowBroadcast": false},
            "Instrument": {"TickSize": 100, "EtfClamp": 0.1},
            "Limits": {"ActiveOrderCountLimit": 10, "ActiveVolumeLimit": 200, "MessageFrequencyInterval": 1.0, "MessageFrequencyLimit": 50, "PositionLimit": 100},
            "Traders": {"alice": "secret"}
        }"#;
        let config: MatchConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.instrument.tick_size, 100);
        assert_eq!(config.traders.get("alice").map(String::as_str), Some("secret"));
    }
}
