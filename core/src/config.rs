use serde::Deserialize;
use std::path::Path;
use tracing::warn;

/// Fixed constants shared by the coordinator and the metadata fetcher.
pub const PKTIDX_MARGIN: i64 = 1024;
pub const HPGDOMAIN: &str = "bluse";
pub const STREAM_TYPE: &str = "cbf.antenna_channelised_voltage";
pub const FENG_TYPE: &str = "wide.antenna-channelised-voltage";
pub const SLACK_CHANNEL: &str = "meerkat-obs-log";
pub const PROXY_CHANNEL: &str = "slack-messages";
pub const NOT_TRACKING_SETTLE: std::time::Duration = std::time::Duration::from_millis(100);

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    pub hashpipe_instances: Vec<String>,
    pub streams_per_instance: Vec<u32>,
    #[serde(default)]
    pub sensors_per_antenna: Vec<String>,
    #[serde(default)]
    pub cbf_sensors_on_configure: Vec<String>,
    #[serde(default)]
    pub stream_sensors: Vec<String>,
    #[serde(default)]
    pub cbf_sensors: Vec<String>,
    #[serde(default)]
    pub sensors_on_configure: Vec<String>,
    #[serde(default)]
    pub array_sensors: Vec<String>,
    #[serde(default)]
    pub stream_sensors_on_configure: Vec<String>,
}

impl Config {
    /// Returns the per-instance stream capacity `S`. `streams_per_instance`
    /// is a list in the YAML source but only the first entry is used,
    /// matching `config()` in the original coordinator.
    pub fn streams_per_instance(&self) -> u32 {
        self.streams_per_instance.first().copied().unwrap_or(0)
    }
}

/// Loads the YAML config file. On failure, logs and returns `None` so the
/// caller can keep running with whatever in-memory config it already had.
pub fn load_config(path: &Path) -> Option<Config> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) => {
            warn!("Configuration not updated; old configuration might be present: {e}");
            return None;
        }
    };
    match serde_yaml::from_str::<Config>(&raw) {
        Ok(cfg) => Some(cfg),
        Err(e) => {
            warn!("Configuration not updated; old configuration might be present: {e}");
            None
        }
    }
}
