//! SQLite schema and the item/log store.

use std::sync::Mutex;

use chrono::NaiveDateTime;
use rusqlite::Connection;

use crate::error::{Result, SchedulerError};
use crate::types::{Item, NewItem, OccurrenceLog, OccurrenceStatus};

/// Persisted timestamps are naive local wall-clock strings in this format.
pub(crate) const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub(crate) fn fmt_ts(t: NaiveDateTime) -> String {
    t.format(TS_FORMAT).to_string()
}

pub(crate) fn parse_ts(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, TS_FORMAT).ok()
}

/// Initialise the scheduler schema in `conn`.
///
/// Creates both tables (idempotent). The `UNIQUE (item_id, scheduled_for)`
/// constraint on `occurrence_logs` is the idempotency key for deliveries:
/// a second claim for the same occurrence fails at the store, not in memory.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS schedule_items (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id       INTEGER,
            title         TEXT    NOT NULL,
            message       TEXT    NOT NULL,
            time_of_day   TEXT    NOT NULL,   -- HH:MM or HH:MM:SS
            enabled       INTEGER NOT NULL DEFAULT 1,
            created_at    TEXT    NOT NULL,
            updated_at    TEXT    NOT NULL
        ) STRICT;

        CREATE TABLE IF NOT EXISTS occurrence_logs (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            item_id       INTEGER NOT NULL
                          REFERENCES schedule_items(id) ON DELETE CASCADE,
            scheduled_for TEXT    NOT NULL,   -- local wall-clock, second precision
            status        TEXT    NOT NULL,   -- STARTED | SUCCESS | FAILED
            error         TEXT,
            created_at    TEXT    NOT NULL,
            UNIQUE (item_id, scheduled_for)
        ) STRICT;

        -- Cascade deletes and per-item log queries.
        CREATE INDEX IF NOT EXISTS idx_occurrence_logs_item_id
            ON occurrence_logs (item_id);
        ",
    )?;
    Ok(())
}

/// Item CRUD and log queries over one SQLite connection.
///
/// Thread-safe the way the rest of the system is: a `Mutex<Connection>` held
/// only for the duration of each short, non-interactive statement.
pub struct ScheduleStore {
    conn: Mutex<Connection>,
}

impl ScheduleStore {
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn insert_item(&self, new: &NewItem) -> Result<Item> {
        let conn = self.conn.lock().unwrap();
        let now = chrono::Local::now().naive_local();
        let now_str = fmt_ts(now);
        conn.execute(
            "INSERT INTO schedule_items
             (user_id, title, message, time_of_day, enabled, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
            rusqlite::params![
                new.user_id,
                new.title,
                new.message,
                new.time_of_day,
                new.enabled as i64,
                now_str,
            ],
        )?;
        Ok(Item {
            id: conn.last_insert_rowid(),
            user_id: new.user_id,
            title: new.title.clone(),
            message: new.message.clone(),
            time_of_day: new.time_of_day.clone(),
            enabled: new.enabled,
            created_at: now,
            updated_at: now,
        })
    }

    /// Full replace of the mutable fields. Returns the updated record, or
    /// `ItemNotFound` when no row matches.
    pub fn update_item(&self, id: i64, new: &NewItem) -> Result<Item> {
        let conn = self.conn.lock().unwrap();
        let now_str = fmt_ts(chrono::Local::now().naive_local());
        let n = conn.execute(
            "UPDATE schedule_items
             SET user_id = ?1, title = ?2, message = ?3, time_of_day = ?4,
                 enabled = ?5, updated_at = ?6
             WHERE id = ?7",
            rusqlite::params![
                new.user_id,
                new.title,
                new.message,
                new.time_of_day,
                new.enabled as i64,
                now_str,
                id,
            ],
        )?;
        if n == 0 {
            return Err(SchedulerError::ItemNotFound { id });
        }
        drop(conn);
        self.get_item(id)?.ok_or(SchedulerError::ItemNotFound { id })
    }

    /// Delete an item; its occurrence logs cascade at the store.
    pub fn delete_item(&self, id: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let n = conn.execute("DELETE FROM schedule_items WHERE id = ?1", [id])?;
        if n == 0 {
            return Err(SchedulerError::ItemNotFound { id });
        }
        Ok(())
    }

    pub fn get_item(&self, id: i64) -> Result<Option<Item>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(
            "SELECT id, user_id, title, message, time_of_day, enabled, created_at, updated_at
             FROM schedule_items WHERE id = ?1",
        )?;
        let mut rows = stmt.query_map([id], row_to_item)?;
        Ok(rows.next().transpose()?)
    }

    /// All items, newest first. Used by the HTTP list endpoint.
    pub fn list_items(&self) -> Result<Vec<Item>> {
        self.query_items(
            "SELECT id, user_id, title, message, time_of_day, enabled, created_at, updated_at
             FROM schedule_items ORDER BY id DESC",
        )
    }

    /// Enabled items only, the startup rehydration snapshot.
    pub fn list_enabled_items(&self) -> Result<Vec<Item>> {
        self.query_items(
            "SELECT id, user_id, title, message, time_of_day, enabled, created_at, updated_at
             FROM schedule_items WHERE enabled = 1 ORDER BY id",
        )
    }

    fn query_items(&self, sql: &str) -> Result<Vec<Item>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(sql)?;
        let items = stmt
            .query_map([], row_to_item)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(items)
    }

    pub fn find_log(
        &self,
        item_id: i64,
        scheduled_for: NaiveDateTime,
    ) -> Result<Option<OccurrenceLog>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(
            "SELECT id, item_id, scheduled_for, status, error, created_at
             FROM occurrence_logs WHERE item_id = ?1 AND scheduled_for = ?2",
        )?;
        let mut rows = stmt.query_map(
            rusqlite::params![item_id, fmt_ts(scheduled_for)],
            row_to_log,
        )?;
        Ok(rows.next().transpose()?)
    }

    /// Recent occurrence logs, newest first.
    pub fn recent_logs(&self, limit: usize) -> Result<Vec<OccurrenceLog>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(
            "SELECT id, item_id, scheduled_for, status, error, created_at
             FROM occurrence_logs ORDER BY id DESC LIMIT ?1",
        )?;
        let logs = stmt
            .query_map([limit as i64], row_to_log)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(logs)
    }
}

fn row_to_item(row: &rusqlite::Row<'_>) -> std::result::Result<Item, rusqlite::Error> {
    let created_at_str: String = row.get(6)?;
    let updated_at_str: String = row.get(7)?;
    Ok(Item {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        message: row.get(3)?,
        time_of_day: row.get(4)?,
        enabled: row.get::<_, i64>(5)? != 0,
        created_at: parse_ts(&created_at_str).unwrap_or_default(),
        updated_at: parse_ts(&updated_at_str).unwrap_or_default(),
    })
}

fn row_to_log(row: &rusqlite::Row<'_>) -> std::result::Result<OccurrenceLog, rusqlite::Error> {
    let scheduled_for_str: String = row.get(2)?;
    let status_str: String = row.get(3)?;
    let created_at_str: String = row.get(5)?;
    Ok(OccurrenceLog {
        id: row.get(0)?,
        item_id: row.get(1)?,
        scheduled_for: parse_ts(&scheduled_for_str).unwrap_or_default(),
        status: status_str
            .parse()
            .unwrap_or(OccurrenceStatus::Failed),
        error: row.get(4)?,
        created_at: parse_ts(&created_at_str).unwrap_or_default(),
    })
}
