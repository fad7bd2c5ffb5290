use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::types::unit::UnitId;

/// Errors surfaced by the job queue to its callers.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The request named a malformed unit or action.
    #[error("validation error: {0}")]
    Validation(String),

    /// `complete` was called for a unit with no pending job.
    #[error("no pending job for unit {0}")]
    NotFound(UnitId),

    #[error("no completed job for unit {0}")]
    NoResult(UnitId),
}

/// Hardware faults that abort the action being executed.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("motor: {0}")]
    Motor(#[source] io::Error),

    #[error("distance sensor: {0}")]
    Sensor(#[source] io::Error),

    #[error("limit switch: {0}")]
    LimitSwitch(#[source] io::Error),

    #[error("sensor returned an unusable reading: {0}")]
    BadReading(String),

    #[error("raise did not reach the distance limit within {0:?}")]
    RaiseTimeout(Duration),

    #[error(transparent)]
    Capture(#[from] CaptureError),
}

/// Faults while opening, reading or writing camera media.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to open video source {source_name:?}")]
    Open { source_name: String },

    #[error("failed to create media sink {path:?}: {error}")]
    Sink { path: String, error: io::Error },

    #[error("capture worker failed: {0}")]
    Worker(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Failures talking to the queue or the media ingest endpoint.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("{status} - {body}")]
    Status { status: u16, body: String },

    #[error("reading {path:?}: {error}")]
    File { path: String, error: io::Error },
}

/// Errors that stop the device agent itself.
#[derive(Debug, Error)]
pub enum AgentError {
    /// The motor could not be de-energised, so the physical state of the
    /// unit is unknown.
    #[error("failed to stop motor, unit is in an unknown state: {0}")]
    UnsafeStop(#[source] DeviceError),
}

pub type Result<T, E = QueueError> = std::result::Result<T, E>;
