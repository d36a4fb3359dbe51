use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Reading;

/// Why a reading was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum SkipReason {
    WeightIsZero,
}

impl SkipReason {
    pub fn as_str(self) -> &'static str {
        match self {
            SkipReason::WeightIsZero => "weight is zero",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownSkipReason(pub String);

impl fmt::Display for UnknownSkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown skip reason: {}", self.0)
    }
}

impl std::error::Error for UnknownSkipReason {}

impl FromStr for SkipReason {
    type Err = UnknownSkipReason;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "weight is zero" => Ok(SkipReason::WeightIsZero),
            other => Err(UnknownSkipReason(other.to_string())),
        }
    }
}

impl From<SkipReason> for String {
    fn from(reason: SkipReason) -> Self {
        reason.as_str().to_string()
    }
}

impl TryFrom<String> for SkipReason {
    type Error = UnknownSkipReason;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Outcome of validating a reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Accepted,
    Skipped(SkipReason),
}

/// Applies the line's acceptance rule to a reading.
///
/// A zero weight means the head fired without product on the scale; such
/// readings are audited but never counted. Everything else is accepted,
/// whatever its status code.
pub fn classify(reading: &Reading) -> Classification {
    if reading.weight == 0 {
        Classification::Skipped(SkipReason::WeightIsZero)
    } else {
        Classification::Accepted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StatusCode;

    fn reading(weight: i64, status: i64) -> Reading {
        Reading {
            ts: "2024-05-01 08:00:00".into(),
            count: 10,
            status: StatusCode(status),
            weight,
            prefix: Some("L1".into()),
        }
    }

    #[test]
    fn zero_weight_is_skipped() {
        assert_eq!(
            classify(&reading(0, 1)),
            Classification::Skipped(SkipReason::WeightIsZero)
        );
    }

    #[test]
    fn any_other_weight_is_accepted() {
        for weight in [1, 250, -5, i64::MAX] {
            assert_eq!(classify(&reading(weight, 1)), Classification::Accepted);
        }
    }

    #[test]
    fn status_does_not_affect_classification() {
        for status in [8, 25, 73, 90, 8201, -1] {
            assert_eq!(classify(&reading(100, status)), Classification::Accepted);
        }
    }

    #[test]
    fn skip_reason_text_roundtrips() {
        assert_eq!(SkipReason::WeightIsZero.to_string(), "weight is zero");
        assert_eq!(
            "weight is zero".parse::<SkipReason>(),
            Ok(SkipReason::WeightIsZero)
        );
        assert!("too light".parse::<SkipReason>().is_err());
    }
}
