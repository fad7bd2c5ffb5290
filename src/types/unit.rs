use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::QueueError;

/// Identifies one physical installation with its own motor, sensor and
/// camera.
#[derive(
    Clone,
    Copy,
    Debug,
    Eq,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
    Deserialize,
)]
#[serde(transparent)]
pub struct UnitId(pub i64);

impl UnitId {
    /// Validates a unit identifier as it arrives in a JSON body. Integers are
    /// taken as-is; strings must hold a base-10 integer, since older
    /// frontends send the id quoted.
    pub fn from_json(value: &Value) -> Result<Self, QueueError> {
        match value {
            Value::Number(n) => n.as_i64().map(UnitId).ok_or_else(|| {
                QueueError::Validation(format!(
                    "unit_id must be an integer, got {n}"
                ))
            }),
            Value::String(s) => s.parse(),
            Value::Null => Err(QueueError::Validation(
                "unit_id is required".to_string(),
            )),
            other => Err(QueueError::Validation(format!(
                "unit_id must be an integer, got {other}"
            ))),
        }
    }
}

impl FromStr for UnitId {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<i64>().map(UnitId).map_err(|_| {
            QueueError::Validation(format!(
                "unit_id must be an integer, got {s:?}"
            ))
        })
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_from_json() {
        assert_eq!(UnitId::from_json(&json!(3)).unwrap(), UnitId(3));
        assert_eq!(UnitId::from_json(&json!("12")).unwrap(), UnitId(12));
        assert_eq!(UnitId::from_json(&json!(" 7 ")).unwrap(), UnitId(7));

        for bad in [
            json!(1.5),
            json!("pond-1"),
            json!(""),
            json!(null),
            json!([1]),
        ] {
            assert!(
                matches!(
                    UnitId::from_json(&bad),
                    Err(QueueError::Validation(_))
                ),
                "{bad} should be rejected"
            );
        }
    }
}
