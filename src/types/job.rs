use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::action::Action;
use super::states::JobState;
use super::unit::UnitId;

/// One requested action for a unit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub unit_id: UnitId,
    pub action: Action,
    /// When the caller asked for the action. Kept exactly as supplied; the
    /// server fills it with the creation time when absent.
    #[serde(rename = "timestamp")]
    pub requested_at: String,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub state: JobState, // also contains completion data
}

impl Job {
    pub fn new(
        unit_id: UnitId,
        action: Action,
        requested_at: Option<String>,
    ) -> Self {
        let created_at = Utc::now();

        Self {
            unit_id,
            action,
            requested_at: requested_at
                .unwrap_or_else(|| created_at.to_rfc3339()),
            created_at,
            state: JobState::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::*;

    #[test]
    fn test_wire_format() {
        let mut job = Job::new(UnitId(3), Action::Raise, Some("t0".into()));

        let v: Value = serde_json::to_value(&job).unwrap();
        assert_eq!(v["unit_id"], json!(3));
        assert_eq!(v["action"], json!("raise"));
        assert_eq!(v["timestamp"], json!("t0"));
        assert_eq!(v["status"], json!("pending"));
        assert!(v.get("result").is_none());

        job.state = JobState::Completed {
            completed_at: Utc::now(),
            result: json!({"status": "success"}),
        };
        let v: Value = serde_json::to_value(&job).unwrap();
        assert_eq!(v["status"], json!("completed"));
        assert_eq!(v["result"]["status"], json!("success"));

        let back: Job = serde_json::from_value(v).unwrap();
        assert_eq!(back, job);
    }

    #[test]
    fn test_default_timestamp() {
        let job = Job::new(UnitId(1), Action::Lower, None);
        assert_eq!(job.requested_at, job.created_at.to_rfc3339());
    }
}
