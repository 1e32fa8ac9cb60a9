use std::fmt;

use serde::Serialize;

use crate::settings::RemoteSettings;

/// One fresh pair of sensor readings. Replaced wholesale every pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SensorSample {
    #[serde(rename = "temperature")]
    pub temperature_c: f32,
    pub presence: bool,
    #[serde(rename = "sampledAtMs")]
    pub sampled_at_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActuatorKind {
    Fan,
    Light,
}

impl ActuatorKind {
    pub const ALL: [Self; 2] = [Self::Fan, Self::Light];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fan => "fan",
            Self::Light => "light",
        }
    }
}

impl fmt::Display for ActuatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ActuatorState {
    pub on: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ControllerStatus {
    pub sample: Option<SensorSample>,
    #[serde(rename = "sensorValid")]
    pub sensor_valid: bool,
    #[serde(rename = "fanOn")]
    pub fan_on: bool,
    #[serde(rename = "lightOn")]
    pub light_on: bool,
    #[serde(rename = "lightPolicy")]
    pub light_policy: &'static str,
    pub settings: Option<RemoteSettings>,
    #[serde(rename = "settingsAgeMs")]
    pub settings_age_ms: Option<u64>,
    #[serde(rename = "lastFetchError")]
    pub last_fetch_error: Option<String>,
    #[serde(rename = "inLightWindow")]
    pub in_light_window: bool,
    #[serde(rename = "failSafe")]
    pub fail_safe: Option<&'static str>,
    #[serde(rename = "consecutiveFailures")]
    pub consecutive_failures: u32,
    #[serde(rename = "linkUp")]
    pub link_up: bool,
    #[serde(rename = "timeSynced")]
    pub time_synced: bool,
    #[serde(rename = "localTime")]
    pub local_time: String,
    pub transitions: u64,
    #[serde(rename = "uptimeMs")]
    pub uptime_ms: u64,
}
