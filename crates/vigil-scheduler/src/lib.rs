//! `vigil-scheduler`: recurring time-of-day triggers with exactly-once
//! occurrence logging.
//!
//! # Overview
//!
//! Items live in a SQLite `schedule_items` table. The [`engine::SchedulerEngine`]
//! owns a [`registry::TriggerRegistry`] of one background trigger task per
//! enabled item; each task sleeps until the item's next daily occurrence and
//! then sends a fire command back into the engine's single command loop. The
//! [`occurrence::OccurrenceGuard`] claims each (item, scheduled-for) pair in
//! `occurrence_logs` (a `UNIQUE` constraint is the final arbiter) before the
//! delivery text is handed to the speech queue.
//!
//! # Concurrency shape
//!
//! All registry mutation and fire evaluation happens inside one engine task,
//! so no two operations for the same item can interleave. Item CRUD callers
//! reach that task through a [`engine::SchedulerHandle`], whose calls are
//! acknowledged only after the registry reflects the store.

pub mod db;
pub mod engine;
pub mod error;
pub mod occurrence;
pub mod registry;
pub mod types;

pub use db::{init_db, ScheduleStore};
pub use engine::{compose_text, FireOutcome, SchedulerEngine, SchedulerHandle};
pub use error::{Result, SchedulerError};
pub use occurrence::{next_occurrence, ClaimOutcome, OccurrenceGuard};
pub use types::{Item, NewItem, OccurrenceLog, OccurrenceStatus};
