use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::QueueError;

/// What a job asks the unit to do.
///
/// Older firmware and frontends use the `lift*` names; those are accepted on
/// input and always reported back under the canonical name.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Raise until the net is at the surface and leave it there.
    #[serde(alias = "lift_up")]
    Raise,
    /// Raise, record a capture window while holding, then lower back down
    /// for as long as the raise took.
    #[serde(alias = "lift")]
    RaiseAndCapture,
    /// Lower for a fixed duration without sensor feedback.
    #[serde(alias = "lift_down")]
    Lower,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Raise => "raise",
            Action::RaiseAndCapture => "raise_and_capture",
            Action::Lower => "lower",
        }
    }
}

impl FromStr for Action {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "raise" | "lift_up" => Action::Raise,
            "raise_and_capture" | "lift" => Action::RaiseAndCapture,
            "lower" | "lift_down" => Action::Lower,
            other => {
                return Err(QueueError::Validation(format!(
                    "unknown action {other:?}"
                )))
            },
        })
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
