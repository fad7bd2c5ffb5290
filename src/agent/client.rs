//! The device's view of the job queue.
use std::time::Duration;

use reqwest::{Client, Response};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::error::{QueueError, TransportError};
use crate::types::action::Action;
use crate::types::outcome::JobOutcome;
use crate::types::unit::UnitId;

#[derive(Debug, Deserialize)]
struct PollResponse {
    has_job: bool,
    #[serde(default)]
    job_data: Option<Value>,
}

/// A job as fetched by the device. Only the fields the device acts on are
/// kept; the action stays unparsed so that a job the device does not
/// understand can still be reported back as failed.
#[derive(Clone, Debug, PartialEq)]
pub struct AssignedJob {
    pub action: String,
    pub requested_at: Option<String>,
}

impl AssignedJob {
    fn from_value(job: &Value) -> Self {
        Self {
            action: match &job["action"] {
                Value::String(s) => s.clone(),
                Value::Null => String::new(),
                other => other.to_string(),
            },
            requested_at: job["timestamp"].as_str().map(str::to_string),
        }
    }

    pub fn action(&self) -> Result<Action, QueueError> {
        self.action.parse()
    }
}

/// Polls and completes jobs for one unit.
#[derive(Clone, Debug)]
pub struct QueueClient {
    client: Client,
    base_url: String,
    unit_id: UnitId,
}

impl QueueClient {
    pub fn new(
        base_url: &str,
        unit_id: UnitId,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            unit_id,
        })
    }

    pub fn unit_id(&self) -> UnitId {
        self.unit_id
    }

    async fn check(response: Response) -> Result<Response, TransportError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        Err(TransportError::Status {
            status: status.as_u16(),
            body: response.text().await.unwrap_or_default(),
        })
    }

    /// Fetches the unit's pending job, if there is one. The job stays
    /// pending on the queue until [`QueueClient::complete`].
    pub async fn poll(&self) -> Result<Option<AssignedJob>, TransportError> {
        let url = format!("{}/jobs/{}", self.base_url, self.unit_id);
        let response = Self::check(self.client.get(&url).send().await?).await?;
        let body: PollResponse = response.json().await?;

        debug!(has_job = body.has_job, "polled queue");

        Ok(match (body.has_job, body.job_data) {
            (true, Some(job)) => Some(AssignedJob::from_value(&job)),
            _ => None,
        })
    }

    /// Reports the outcome of the unit's pending job.
    pub async fn complete(
        &self,
        outcome: &JobOutcome,
    ) -> Result<(), TransportError> {
        let url = format!("{}/jobs/{}/complete", self.base_url, self.unit_id);
        Self::check(self.client.post(&url).json(outcome).send().await?).await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_assigned_job() {
        let job = AssignedJob::from_value(&json!({
            "unit_id": 1,
            "action": "lift",
            "timestamp": "2025-01-01T00:00:00Z",
            "status": "pending",
        }));
        assert_eq!(job.action().unwrap(), Action::RaiseAndCapture);
        assert_eq!(job.requested_at.as_deref(), Some("2025-01-01T00:00:00Z"));

        let job = AssignedJob::from_value(&json!({"action": 7}));
        assert!(job.action().is_err());
        assert_eq!(job.requested_at, None);
    }
}
