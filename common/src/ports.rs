//! Collaborator seams. The control loop only talks to hardware, the network
//! and the clock through these traits; `controller` supplies one impl per
//! target and the tests supply scripted fakes.

use chrono::NaiveDateTime;
use thiserror::Error;

use crate::types::ActuatorKind;

/// Monotonic tick plus best-effort local wall time.
pub trait Clock {
    /// Milliseconds since boot; never goes backwards.
    fn monotonic_ms(&self) -> u64;

    /// Local wall-clock time. Falls back to the free-running local clock when
    /// the time service has not answered yet.
    fn wall_time(&self) -> NaiveDateTime;

    /// Resynchronize with the time service. Returns whether wall time is
    /// currently trusted.
    fn refresh(&mut self) -> bool {
        true
    }
}

/// What one-wire temperature drivers report when the probe does not answer.
pub const TEMPERATURE_SENTINEL_C: f32 = -127.0;

pub trait SensorGateway {
    /// Degrees Celsius. May return a driver sentinel on a failed read.
    fn read_temperature(&mut self) -> f32;

    fn read_presence(&mut self) -> bool;
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SensorError {
    #[error("temperature probe not found")]
    NotFound,
    #[error("temperature probe read failed: {0}")]
    Read(String),
    #[error("implausible temperature reading {0:.2}°C")]
    Implausible(f32),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to drive {actuator} output: {reason}")]
pub struct ActuatorError {
    pub actuator: ActuatorKind,
    pub reason: String,
}

pub trait Actuators {
    fn set(&mut self, actuator: ActuatorKind, on: bool) -> Result<(), ActuatorError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("network link is down")]
    LinkDown,
    #[error("request timed out")]
    Timeout,
    #[error("request failed: {0}")]
    Request(String),
}

/// Blocking HTTP exchange with the configuration/telemetry service. Paths are
/// relative to the configured base URL; timeouts are enforced here.
pub trait Transport {
    fn is_connected(&self) -> bool;

    fn get(&mut self, path: &str) -> Result<HttpResponse, TransportError>;

    fn post_json(&mut self, path: &str, body: &[u8]) -> Result<HttpResponse, TransportError>;
}
