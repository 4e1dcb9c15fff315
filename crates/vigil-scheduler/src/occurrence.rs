//! Occurrence math and the exactly-once occurrence guard.

use std::sync::Mutex;

use chrono::{Duration, NaiveDateTime, NaiveTime};
use rusqlite::{Connection, OptionalExtension};
use tracing::{error, warn};
use vigil_core::TimeOfDay;

use crate::db::{fmt_ts, init_db};
use crate::error::Result;
use crate::types::OccurrenceStatus;

fn as_naive_time(tod: TimeOfDay) -> NaiveTime {
    // TimeOfDay components are range-checked at construction, so this can
    // only be midnight-by-fallback for a corrupted value.
    NaiveTime::from_hms_opt(tod.hour as u32, tod.minute as u32, tod.second as u32)
        .unwrap_or(NaiveTime::MIN)
}

/// Compute the next occurrence of `tod` to honour, as of `now`.
///
/// The result may lie in the past: a today-occurrence that was missed by no
/// more than `grace` is still returned so it runs once with its original
/// scheduled-for (the restart/misfire path). Beyond the grace window the
/// occurrence is dropped and tomorrow's is returned instead. `after` is the
/// previously dispatched occurrence, which is never returned again.
pub fn next_occurrence(
    tod: TimeOfDay,
    now: NaiveDateTime,
    grace: Duration,
    after: Option<NaiveDateTime>,
) -> NaiveDateTime {
    let mut candidate = now.date().and_time(as_naive_time(tod));

    if let Some(prev) = after {
        if candidate <= prev {
            return prev.date().succ_opt().unwrap_or(prev.date()).and_time(as_naive_time(tod));
        }
    }

    if now - candidate > grace {
        // Missed beyond the grace window, skip to tomorrow.
        candidate = candidate
            .date()
            .succ_opt()
            .map(|d| d.and_time(as_naive_time(tod)))
            .unwrap_or(candidate);
    }

    candidate
}

/// Result of a claim attempt for one (item, scheduled-for) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// This process won the claim; a STARTED row with `log_id` now exists and
    /// exactly one terminal promotion must follow.
    Claimed { log_id: i64 },
    /// A record for this pair already exists; skip execution, not an error.
    AlreadyHandled,
}

/// Enforces at-most-one terminal log per (item, scheduled-for).
///
/// The claim is a STARTED row insert; the store's `UNIQUE (item_id,
/// scheduled_for)` constraint is the final arbiter when two fires race for
/// the same pair. Terminal rows are immutable: promotion is a row-level
/// UPDATE guarded by `status = 'STARTED'`.
pub struct OccurrenceGuard {
    conn: Mutex<Connection>,
}

impl OccurrenceGuard {
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Claim the pair. Queries first (cheap common case), inserts the STARTED
    /// marker, and treats a unique-constraint violation as `AlreadyHandled`.
    pub fn claim(&self, item_id: i64, scheduled_for: NaiveDateTime) -> Result<ClaimOutcome> {
        let conn = self.conn.lock().unwrap();
        let sched_str = fmt_ts(scheduled_for);

        let existing: Option<i64> = conn
            .query_row(
                "SELECT id FROM occurrence_logs WHERE item_id = ?1 AND scheduled_for = ?2",
                rusqlite::params![item_id, sched_str],
                |row| row.get(0),
            )
            .optional()?;
        if existing.is_some() {
            return Ok(ClaimOutcome::AlreadyHandled);
        }

        let now_str = fmt_ts(chrono::Local::now().naive_local());
        match conn.execute(
            "INSERT INTO occurrence_logs (item_id, scheduled_for, status, error, created_at)
             VALUES (?1, ?2, ?3, NULL, ?4)",
            rusqlite::params![
                item_id,
                sched_str,
                OccurrenceStatus::Started.to_string(),
                now_str
            ],
        ) {
            Ok(_) => Ok(ClaimOutcome::Claimed {
                log_id: conn.last_insert_rowid(),
            }),
            // Another fire inserted between our SELECT and INSERT. The
            // constraint decides, and losing it means "already handled".
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Ok(ClaimOutcome::AlreadyHandled)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Promote the STARTED claim row to SUCCESS. No-op if the row is already
    /// terminal.
    pub fn record_success(&self, log_id: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE occurrence_logs SET status = ?1, error = NULL
             WHERE id = ?2 AND status = ?3",
            rusqlite::params![
                OccurrenceStatus::Success.to_string(),
                log_id,
                OccurrenceStatus::Started.to_string()
            ],
        )?;
        Ok(())
    }

    /// Promote the STARTED claim row to FAILED with error detail.
    pub fn record_failure(&self, log_id: i64, detail: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE occurrence_logs SET status = ?1, error = ?2
             WHERE id = ?3 AND status = ?4",
            rusqlite::params![
                OccurrenceStatus::Failed.to_string(),
                detail,
                log_id,
                OccurrenceStatus::Started.to_string()
            ],
        )?;
        Ok(())
    }
}

/// The delivery worker reports outcomes through this seam; failures to write
/// the log are logged and swallowed so one bad write can never stop the
/// delivery loop.
impl vigil_speech::DeliverySink for OccurrenceGuard {
    fn delivered(&self, log_id: i64) {
        if let Err(e) = self.record_success(log_id) {
            error!(log_id, error = %e, "failed to record delivery success");
        }
    }

    fn failed(&self, log_id: i64, detail: &str) {
        warn!(log_id, %detail, "delivery failed");
        if let Err(e) = self.record_failure(log_id, detail) {
            error!(log_id, error = %e, "failed to record delivery failure");
        }
    }
}
