use chrono::{Local, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::action::Action;
use super::unit::UnitId;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Success,
    Error,
}

/// Names of the files produced by a capture window.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct CapturedFiles {
    pub image: String,
    pub video: String,
}

/// The result a device reports when it completes a job. The queue stores it
/// without interpreting it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JobOutcome {
    pub status: OutcomeStatus,
    pub unit_id: UnitId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<Action>,
    pub timestamp: String,
    /// Seconds spent on the raise, or on the lower for lower-only jobs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
    pub files: Option<CapturedFiles>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend_response: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobOutcome {
    pub fn success(unit_id: UnitId, action: Action) -> Self {
        Self::new(OutcomeStatus::Success, unit_id, Some(action))
    }

    pub fn failure(
        unit_id: UnitId,
        action: Option<Action>,
        error: impl ToString,
    ) -> Self {
        Self {
            error: Some(error.to_string()),
            ..Self::new(OutcomeStatus::Error, unit_id, action)
        }
    }

    fn new(
        status: OutcomeStatus,
        unit_id: UnitId,
        action: Option<Action>,
    ) -> Self {
        Self {
            status,
            unit_id,
            action,
            timestamp: Utc::now().to_rfc3339(),
            duration_secs: None,
            files: None,
            backend_response: None,
            backend_error: None,
            error: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Success
    }
}

/// Local wall-clock stamp used in capture file names, e.g.
/// `20250101_093000`.
pub fn file_stamp() -> String {
    Local::now().format("%Y%m%d_%H%M%S").to_string()
}
