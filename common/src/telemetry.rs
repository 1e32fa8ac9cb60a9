use chrono::NaiveDateTime;
use serde::Serialize;
use thiserror::Error;

use crate::{
    ports::{Transport, TransportError},
    types::SensorSample,
};

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Body of `POST /sensor-data`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetryPayload {
    pub temperature: f32,
    pub presence: bool,
    pub datetime: String,
}

impl TelemetryPayload {
    pub fn new(sample: &SensorSample, at: NaiveDateTime) -> Self {
        Self {
            temperature: sample.temperature_c,
            presence: sample.presence,
            datetime: at.format(TIMESTAMP_FORMAT).to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum SendError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("collector answered HTTP {0}")]
    Status(u16),
    #[error("failed to encode telemetry: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Fire-and-forget uploader: one attempt per call, nothing is queued.
#[derive(Debug, Clone)]
pub struct TelemetryReporter {
    path: String,
    sent: u64,
    failed: u64,
}

impl TelemetryReporter {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            sent: 0,
            failed: 0,
        }
    }

    pub fn sent(&self) -> u64 {
        self.sent
    }

    pub fn failed(&self) -> u64 {
        self.failed
    }

    pub fn report<T: Transport>(
        &mut self,
        transport: &mut T,
        sample: &SensorSample,
        at: NaiveDateTime,
    ) -> Result<(), SendError> {
        let result = Self::submit(&self.path, transport, &TelemetryPayload::new(sample, at));
        match &result {
            Ok(()) => self.sent += 1,
            Err(_) => self.failed += 1,
        }
        result
    }

    fn submit<T: Transport>(
        path: &str,
        transport: &mut T,
        payload: &TelemetryPayload,
    ) -> Result<(), SendError> {
        let body = serde_json::to_vec(payload)?;
        let response = transport.post_json(path, &body)?;
        if response.is_success() {
            Ok(())
        } else {
            Err(SendError::Status(response.status))
        }
    }
}
