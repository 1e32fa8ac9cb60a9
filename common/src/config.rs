use serde::{Deserialize, Serialize};

/// How the light output combines the schedule window with presence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LightPolicy {
    /// On only while inside the window and presence is detected.
    #[default]
    PresenceInWindow,
    /// On for the whole window; outside it, follows presence.
    WindowOrPresence,
}

impl LightPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PresenceInWindow => "presence_in_window",
            Self::WindowOrPresence => "window_or_presence",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    pub settings_sync_interval_ms: u64,
    pub telemetry_interval_ms: u64,
    pub clock_refresh_interval_ms: u64,
    pub failure_threshold: u32,
    pub sensor_stale_timeout_ms: u64,
    pub min_valid_temp_c: f32,
    pub max_valid_temp_c: f32,
    pub light_policy: LightPolicy,
    pub idle_yield_ms: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            settings_sync_interval_ms: 5_000,
            telemetry_interval_ms: 5_000,
            clock_refresh_interval_ms: 60_000,
            failure_threshold: 3,
            sensor_stale_timeout_ms: 30_000,
            min_valid_temp_c: -55.0,
            max_valid_temp_c: 125.0,
            light_policy: LightPolicy::PresenceInWindow,
            idle_yield_ms: 50,
        }
    }
}

impl ControllerConfig {
    pub fn sanitize(&mut self) {
        let defaults = Self::default();

        self.settings_sync_interval_ms = self.settings_sync_interval_ms.max(1_000);
        self.telemetry_interval_ms = self.telemetry_interval_ms.max(1_000);
        self.clock_refresh_interval_ms = self.clock_refresh_interval_ms.max(1_000);
        self.failure_threshold = self.failure_threshold.max(1);
        self.sensor_stale_timeout_ms = self
            .sensor_stale_timeout_ms
            .max(self.settings_sync_interval_ms);
        self.idle_yield_ms = self.idle_yield_ms.min(1_000);

        let range_ok = self.min_valid_temp_c.is_finite()
            && self.max_valid_temp_c.is_finite()
            && self.min_valid_temp_c < self.max_valid_temp_c;
        if !range_ok {
            self.min_valid_temp_c = defaults.min_valid_temp_c;
            self.max_valid_temp_c = defaults.max_valid_temp_c;
        }
    }

    pub fn is_plausible_temp(&self, temp_c: f32) -> bool {
        temp_c.is_finite() && (self.min_valid_temp_c..=self.max_valid_temp_c).contains(&temp_c)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub wifi_ssid: String,
    pub wifi_pass: String,
    pub api_base_url: String,
    pub settings_path: String,
    pub telemetry_path: String,
    pub request_timeout_ms: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            wifi_ssid: String::new(),
            wifi_pass: String::new(),
            api_base_url: "http://127.0.0.1:8000".to_string(),
            settings_path: "/settings".to_string(),
            telemetry_path: "/sensor-data".to_string(),
            request_timeout_ms: 10_000,
        }
    }
}

impl NetworkConfig {
    pub fn sanitize(&mut self) {
        let trimmed = self.api_base_url.trim().trim_end_matches('/');
        self.api_base_url = trimmed.to_string();

        for path in [&mut self.settings_path, &mut self.telemetry_path] {
            if !path.starts_with('/') {
                path.insert(0, '/');
            }
        }

        self.request_timeout_ms = self.request_timeout_ms.clamp(1_000, 60_000);
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base_url, path)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HardwareConfig {
    pub temp_pin: i32,
    pub pir_pin: i32,
    pub fan_pin: i32,
    pub light_pin: i32,
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            temp_pin: 4,
            pir_pin: 15,
            fan_pin: 23,
            light_pin: 22,
        }
    }
}

impl HardwareConfig {
    pub fn sanitize(&mut self) {
        let defaults = Self::default();
        for (pin, fallback) in [
            (&mut self.temp_pin, defaults.temp_pin),
            (&mut self.pir_pin, defaults.pir_pin),
            (&mut self.fan_pin, defaults.fan_pin),
            (&mut self.light_pin, defaults.light_pin),
        ] {
            if !(0..=48).contains(&*pin) {
                *pin = fallback;
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub controller: ControllerConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub hardware: HardwareConfig,
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            controller: ControllerConfig::default(),
            network: NetworkConfig::default(),
            hardware: HardwareConfig::default(),
            timezone: default_timezone(),
        }
    }
}

impl RuntimeConfig {
    pub fn sanitize(&mut self) {
        self.controller.sanitize();
        self.network.sanitize();
        self.hardware.sanitize();
        if self.timezone.trim().is_empty() {
            self.timezone = default_timezone();
        }
    }
}

fn default_timezone() -> String {
    "UTC".to_string()
}
