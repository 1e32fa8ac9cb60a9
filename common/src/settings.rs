use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    ports::{Transport, TransportError},
    time_of_day::{TimeOfDay, TimeOfDayError},
};

/// Thresholds pulled from the configuration service. Only ever replaced as a
/// whole; there is no partially-updated value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RemoteSettings {
    #[serde(rename = "temperatureTrigger")]
    pub temperature_trigger_c: f32,
    #[serde(rename = "lightOnTime")]
    pub light_on: TimeOfDay,
    #[serde(rename = "lightOffTime")]
    pub light_off: TimeOfDay,
    /// What the user originally asked for (e.g. `sunset`), informational only.
    #[serde(rename = "originalLight", skip_serializing_if = "Option::is_none")]
    pub original_light: Option<String>,
}

/// Body of `GET /settings`.
#[derive(Debug, Deserialize)]
struct SettingsPayload {
    user_temp: f64,
    user_light: String,
    light_time_off: String,
    #[serde(default)]
    original_light: Option<String>,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("settings endpoint answered HTTP {0}")]
    Status(u16),
    #[error("settings body is not valid JSON: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("settings field `{field}` rejected: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

impl TryFrom<SettingsPayload> for RemoteSettings {
    type Error = FetchError;

    fn try_from(payload: SettingsPayload) -> Result<Self, Self::Error> {
        let trigger = payload.user_temp as f32;
        if !trigger.is_finite() {
            return Err(FetchError::InvalidField {
                field: "user_temp",
                reason: format!("{} is not a usable temperature", payload.user_temp),
            });
        }

        let parse_time = |field: &'static str, value: &str| {
            value
                .parse::<TimeOfDay>()
                .map_err(|err: TimeOfDayError| FetchError::InvalidField {
                    field,
                    reason: err.to_string(),
                })
        };

        Ok(Self {
            temperature_trigger_c: trigger,
            light_on: parse_time("user_light", &payload.user_light)?,
            light_off: parse_time("light_time_off", &payload.light_time_off)?,
            original_light: payload.original_light,
        })
    }
}

/// Decode a settings body. All fields are validated before anything is
/// returned, so a bad body never yields a half-usable value.
pub fn parse_settings(body: &[u8]) -> Result<RemoteSettings, FetchError> {
    let payload: SettingsPayload = serde_json::from_slice(body)?;
    RemoteSettings::try_from(payload)
}

/// Last successfully fetched settings. `None` until the first good sync.
#[derive(Debug, Clone, Default)]
pub struct SettingsCache {
    current: Option<RemoteSettings>,
    updated_at_ms: Option<u64>,
}

impl SettingsCache {
    pub fn current(&self) -> Option<&RemoteSettings> {
        self.current.as_ref()
    }

    pub fn is_valid(&self) -> bool {
        self.current.is_some()
    }

    pub fn age_ms(&self, now_ms: u64) -> Option<u64> {
        self.updated_at_ms.map(|at| now_ms.saturating_sub(at))
    }

    fn replace(&mut self, settings: RemoteSettings, now_ms: u64) {
        self.current = Some(settings);
        self.updated_at_ms = Some(now_ms);
    }
}

#[derive(Debug, Clone)]
pub struct SettingsSynchronizer {
    path: String,
    last_error: Option<String>,
}

impl SettingsSynchronizer {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            last_error: None,
        }
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Fetch and, on success, swap the cache contents. On any failure the cache
    /// is left exactly as it was.
    pub fn sync<T: Transport>(
        &mut self,
        transport: &mut T,
        cache: &mut SettingsCache,
        now_ms: u64,
    ) -> Result<RemoteSettings, FetchError> {
        match self.fetch(transport) {
            Ok(settings) => {
                cache.replace(settings.clone(), now_ms);
                self.last_error = None;
                Ok(settings)
            }
            Err(err) => {
                self.last_error = Some(err.to_string());
                Err(err)
            }
        }
    }

    fn fetch<T: Transport>(&self, transport: &mut T) -> Result<RemoteSettings, FetchError> {
        let response = transport.get(&self.path)?;
        if !response.is_success() {
            return Err(FetchError::Status(response.status));
        }
        parse_settings(&response.body)
    }
}
