//! Configuration – reads `~/.hearth/config.toml`, then applies environment
//! overrides.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use hearth_types::HearthError;
use serde::{Deserialize, Serialize};

/// Daemon configuration. Every field falls back to its default when absent
/// from the file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Port for the HTTP API and WebSocket viewers.
    pub http_port: u16,

    /// Broker URL, `mqtt://host[:port]`.
    pub mqtt_url: String,

    /// When false the bridge runs on an in-process bus only.
    pub mqtt_enabled: bool,

    pub mqtt_client_id: String,

    /// Namespace shared with the hardware nodes (`home/lights/...`).
    pub topic_prefix: String,

    pub simulate_sensors: bool,

    pub sim_interval_secs: u64,

    /// Frames a viewer may fall behind before it is disconnected.
    pub viewer_queue_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: 5000,
            mqtt_url: "mqtt://localhost:1883".to_string(),
            mqtt_enabled: true,
            mqtt_client_id: "hearthd".to_string(),
            topic_prefix: "home".to_string(),
            simulate_sensors: true,
            sim_interval_secs: 5,
            viewer_queue_capacity: 256,
        }
    }
}

impl Config {
    /// Simulation period; never shorter than one second.
    pub fn sim_interval(&self) -> Duration {
        Duration::from_secs(self.sim_interval_secs.max(1))
    }
}

/// Path of the config file: `$HEARTH_CONFIG`, else `~/.hearth/config.toml`.
pub fn config_path() -> PathBuf {
    if let Ok(path) = std::env::var("HEARTH_CONFIG") {
        return PathBuf::from(path);
    }
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".hearth").join("config.toml")
}

/// Load the config file. Returns `None` if it does not exist.
pub fn load() -> Result<Option<Config>, HearthError> {
    load_from(&config_path())
}

pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, HearthError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|e| {
        HearthError::Config(format!("failed to read {}: {e}", path.display()))
    })?;
    let cfg = toml::from_str(&raw).map_err(|e| {
        HearthError::Config(format!("failed to parse {}: {e}", path.display()))
    })?;
    Ok(Some(cfg))
}

/// Apply environment overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `HEARTH_HTTP_PORT`, `PORT` | `http_port` |
/// | `HEARTH_MQTT_URL`, `MQTT_URL` | `mqtt_url` |
/// | `HEARTH_MQTT_ENABLED` | `mqtt_enabled` |
/// | `HEARTH_MQTT_CLIENT_ID` | `mqtt_client_id` |
/// | `HEARTH_TOPIC_PREFIX` | `topic_prefix` |
/// | `HEARTH_SIMULATE_SENSORS`, `SIMULATE_SENSORS` | `simulate_sensors` |
/// | `HEARTH_SIM_INTERVAL_SECS` | `sim_interval_secs` |
/// | `HEARTH_VIEWER_QUEUE` | `viewer_queue_capacity` |
///
/// The `HEARTH_*` name wins when both are set. Values that do not parse are
/// ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    apply_overrides(cfg, |name| std::env::var(name).ok());
}

pub(crate) fn apply_overrides(cfg: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    let var = |names: &[&str]| names.iter().find_map(|name| lookup(name));

    if let Some(port) = var(&["HEARTH_HTTP_PORT", "PORT"]).and_then(|v| v.trim().parse().ok()) {
        cfg.http_port = port;
    }
    if let Some(url) = var(&["HEARTH_MQTT_URL", "MQTT_URL"]).filter(|v| !v.trim().is_empty()) {
        cfg.mqtt_url = url.trim().to_string();
    }
    if let Some(enabled) = var(&["HEARTH_MQTT_ENABLED"]).and_then(|v| parse_flag(&v)) {
        cfg.mqtt_enabled = enabled;
    }
    if let Some(id) = var(&["HEARTH_MQTT_CLIENT_ID"]).filter(|v| !v.trim().is_empty()) {
        cfg.mqtt_client_id = id.trim().to_string();
    }
    if let Some(prefix) = var(&["HEARTH_TOPIC_PREFIX"]) {
        cfg.topic_prefix = prefix.trim().to_string();
    }
    if let Some(simulate) =
        var(&["HEARTH_SIMULATE_SENSORS", "SIMULATE_SENSORS"]).and_then(|v| parse_flag(&v))
    {
        cfg.simulate_sensors = simulate;
    }
    if let Some(secs) = var(&["HEARTH_SIM_INTERVAL_SECS"])
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|secs| *secs > 0)
    {
        cfg.sim_interval_secs = secs;
    }
    if let Some(capacity) = var(&["HEARTH_VIEWER_QUEUE"])
        .and_then(|v| v.trim().parse::<usize>().ok())
        .filter(|capacity| *capacity > 0)
    {
        cfg.viewer_queue_capacity = capacity;
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
