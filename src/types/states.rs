use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Where a job is in its lifecycle, along with any state-specific data.
///
/// There is no in-progress state: once the device has fetched a job it holds
/// that state locally until it reports completion.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Completed {
        completed_at: DateTime<Utc>,
        /// Whatever the device reported, stored verbatim.
        result: Value,
    },
}

impl JobState {
    pub fn is_pending(&self) -> bool {
        matches!(self, JobState::Pending)
    }
}
