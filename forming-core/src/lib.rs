pub mod classify;

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

pub use classify::{Classification, SkipReason, classify};

// Readings are written once and never mutated, so `Box<str>` keeps them
// compact and avoids accidental growth of what is effectively a frozen
// string.
type BoxStr = Box<str>;

/// Identifier assigned by the store to an accepted reading.
///
/// Identifiers are monotonic within one store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub i64);

/// Identifier assigned by the store to a skip record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SkipId(pub i64);

/// Status code reported by a weighing head.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusCode(pub i64);

impl StatusCode {
    pub const MACHINE_OFF: StatusCode = StatusCode(8);
    pub const UNDER_WEIGHT: StatusCode = StatusCode(25);
    pub const OVER_WEIGHT: StatusCode = StatusCode(73);
    pub const IDLE: StatusCode = StatusCode(90);
    pub const METAL_DETECTED: StatusCode = StatusCode(8201);

    /// Operator-facing label, as printed on the production sheet.
    pub fn label(self) -> Cow<'static, str> {
        match self {
            Self::MACHINE_OFF => Cow::Borrowed("Mesin Mati"),
            Self::IDLE => Cow::Borrowed("Idle"),
            Self::METAL_DETECTED => Cow::Borrowed("Detect Metal"),
            Self::UNDER_WEIGHT => Cow::Borrowed("Under Weight"),
            Self::OVER_WEIGHT => Cow::Borrowed("Over Weight"),
            StatusCode(other) => Cow::Owned(format!("Unknown ({other})")),
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One telemetry event published by a weighing/counting device.
///
/// Readings are untrusted input. Older firmware publishes the numeric
/// fields under their register names (`reg2`, `reg5`, `reg114`), which are
/// accepted as aliases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reading {
    /// Device-local timestamp, kept verbatim.
    pub ts: BoxStr,
    /// Total pack count.
    #[serde(alias = "reg2")]
    pub count: i64,
    #[serde(alias = "reg5")]
    pub status: StatusCode,
    /// Weight in grams.
    #[serde(alias = "reg114")]
    pub weight: i64,
    /// Identifier of the originating line. An empty prefix is treated as
    /// absent.
    #[serde(default, deserialize_with = "empty_as_none")]
    pub prefix: Option<BoxStr>,
}

fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<BoxStr>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<BoxStr>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.is_empty()))
}

/// An accepted reading as persisted by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub id: RecordId,
    #[serde(flatten)]
    pub reading: Reading,
    /// Server-side ingestion time.
    pub received_at: jiff::Timestamp,
}

/// A reading that failed validation, kept for audit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkipRecord {
    pub id: SkipId,
    #[serde(flatten)]
    pub reading: Reading,
    pub reason: SkipReason,
    pub skipped_at: jiff::Timestamp,
}

/// Per-prefix totals over a trailing window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub prefix: BoxStr,
    pub count: u64,
    /// Sum of weights in grams.
    pub total_weight: i64,
}

/// Label used for readings that carry no prefix.
pub const UNKNOWN_PREFIX: &str = "Unknown";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_canonical_fields() {
        let reading: Reading = serde_json::from_str(
            r#"{"ts":"2024-05-01 08:00:00","weight":250,"count":12,"status":25,"prefix":"L1"}"#,
        )
        .unwrap();

        assert_eq!(reading.weight, 250);
        assert_eq!(reading.count, 12);
        assert_eq!(reading.status, StatusCode::UNDER_WEIGHT);
        assert_eq!(reading.prefix.as_deref(), Some("L1"));
    }

    #[test]
    fn decodes_register_aliases() {
        let reading: Reading = serde_json::from_str(
            r#"{"ts":"2024-05-01 08:00:00","reg2":3,"reg5":90,"reg114":125,"prefix":"L2"}"#,
        )
        .unwrap();

        assert_eq!(reading.count, 3);
        assert_eq!(reading.status, StatusCode::IDLE);
        assert_eq!(reading.weight, 125);
    }

    #[test]
    fn empty_or_missing_prefix_is_absent() {
        let empty: Reading = serde_json::from_str(
            r#"{"ts":"t","weight":1,"count":1,"status":1,"prefix":""}"#,
        )
        .unwrap();
        let missing: Reading =
            serde_json::from_str(r#"{"ts":"t","weight":1,"count":1,"status":1}"#).unwrap();

        assert_eq!(empty.prefix, None);
        assert_eq!(missing.prefix, None);
    }

    #[test]
    fn rejects_non_numeric_weight() {
        let result = serde_json::from_str::<Reading>(
            r#"{"ts":"t","weight":"heavy","count":1,"status":1}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn status_labels() {
        assert_eq!(StatusCode(8).label(), "Mesin Mati");
        assert_eq!(StatusCode(90).label(), "Idle");
        assert_eq!(StatusCode(8201).label(), "Detect Metal");
        assert_eq!(StatusCode(25).label(), "Under Weight");
        assert_eq!(StatusCode(73).label(), "Over Weight");
        assert_eq!(StatusCode(1).label(), "Unknown (1)");
    }
}
