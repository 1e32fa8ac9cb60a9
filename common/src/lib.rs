pub mod config;
pub mod engine;
pub mod failsafe;
pub mod ports;
pub mod scheduler;
pub mod settings;
pub mod telemetry;
pub mod time_of_day;
pub mod timer;
pub mod types;

pub use config::{ControllerConfig, HardwareConfig, LightPolicy, NetworkConfig, RuntimeConfig};
pub use engine::{decide, ActuationEngine, Decision, EngineAction, SwitchReason};
pub use failsafe::{FailSafe, FailSafeCause};
pub use ports::{
    ActuatorError, Actuators, Clock, HttpResponse, SensorError, SensorGateway, Transport,
    TransportError, TEMPERATURE_SENTINEL_C,
};
pub use scheduler::{ControlLoop, PassReport};
pub use settings::{parse_settings, FetchError, RemoteSettings, SettingsCache, SettingsSynchronizer};
pub use telemetry::{SendError, TelemetryPayload, TelemetryReporter, TIMESTAMP_FORMAT};
pub use time_of_day::{in_window, TimeOfDay, TimeOfDayError};
pub use timer::PeriodicTimer;
pub use types::{ActuatorKind, ActuatorState, ControllerStatus, SensorSample};
