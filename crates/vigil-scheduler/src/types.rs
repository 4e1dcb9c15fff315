//! Scheduler data model: the persisted item and occurrence-log records.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// A persisted reminder item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    /// Store-assigned integer ID (SQLite rowid).
    pub id: i64,
    /// Optional owner identifier.
    pub user_id: Option<i64>,
    /// Short label, spoken before the message.
    pub title: String,
    /// Notification body.
    pub message: String,
    /// `HH:MM` or `HH:MM:SS`; validated before acceptance, parsed again at
    /// trigger registration through the same `TimeOfDay` type.
    pub time_of_day: String,
    /// A disabled item has no live trigger.
    pub enabled: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Fields supplied by the CRUD caller when creating or replacing an item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewItem {
    pub user_id: Option<i64>,
    pub title: String,
    pub message: String,
    pub time_of_day: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// Delivery state of one occurrence. STARTED is the claim marker; SUCCESS and
/// FAILED are terminal and written at most once per (item, scheduled-for).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OccurrenceStatus {
    Started,
    Success,
    Failed,
}

impl std::fmt::Display for OccurrenceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OccurrenceStatus::Started => "STARTED",
            OccurrenceStatus::Success => "SUCCESS",
            OccurrenceStatus::Failed => "FAILED",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for OccurrenceStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "STARTED" => Ok(OccurrenceStatus::Started),
            "SUCCESS" => Ok(OccurrenceStatus::Success),
            "FAILED" => Ok(OccurrenceStatus::Failed),
            other => Err(format!("unknown occurrence status: {other}")),
        }
    }
}

/// One recorded delivery attempt for a concrete occurrence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OccurrenceLog {
    pub id: i64,
    pub item_id: i64,
    /// The calendar date + time-of-day this occurrence represents. Together
    /// with `item_id` it is the idempotency key.
    pub scheduled_for: NaiveDateTime,
    pub status: OccurrenceStatus,
    pub error: Option<String>,
    pub created_at: NaiveDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_roundtrip() {
        for s in [
            OccurrenceStatus::Started,
            OccurrenceStatus::Success,
            OccurrenceStatus::Failed,
        ] {
            let parsed: OccurrenceStatus = s.to_string().parse().expect("parse failed");
            assert_eq!(parsed, s);
        }
    }

    #[test]
    fn status_rejects_unknown() {
        assert!("DONE".parse::<OccurrenceStatus>().is_err());
    }

    #[test]
    fn new_item_enabled_defaults_to_true() {
        let item: NewItem = serde_json::from_str(
            r#"{"user_id":null,"title":"복약","message":"약 드실 시간입니다","time_of_day":"22:55"}"#,
        )
        .expect("deserialize failed");
        assert!(item.enabled);
    }
}
