//! The scheduling engine: a single command loop that owns the trigger
//! registry and turns trigger fires into claimed, queued deliveries.

use std::sync::Arc;

use chrono::{Duration, NaiveDateTime};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{error, info};
use vigil_speech::{DeliveryQueue, DeliveryRequest};

use crate::db::ScheduleStore;
use crate::error::{Result, SchedulerError};
use crate::occurrence::{ClaimOutcome, OccurrenceGuard};
use crate::registry::TriggerRegistry;
use crate::types::Item;

/// Spoken when an item has neither title nor message.
pub const FALLBACK_PHRASE: &str = "알림 시간입니다.";

/// Delivery text: `"{title}. {message}"` when both are present, the non-empty
/// one alone otherwise, the fallback phrase when both are empty.
pub fn compose_text(title: &str, message: &str) -> String {
    match (title.trim(), message.trim()) {
        ("", "") => FALLBACK_PHRASE.to_string(),
        (t, "") => t.to_string(),
        ("", m) => m.to_string(),
        (t, m) => format!("{t}. {m}"),
    }
}

/// Everything that enters the serialized scheduling domain.
#[derive(Debug)]
pub enum Command {
    /// Create-or-replace the trigger for `item` (remove when disabled or
    /// invalid). Acked once the registry reflects the store.
    Upsert {
        item: Item,
        ack: oneshot::Sender<()>,
    },
    /// Remove the trigger if present.
    Remove {
        item_id: i64,
        ack: oneshot::Sender<()>,
    },
    /// A trigger task reached its scheduled instant.
    Fire {
        item_id: i64,
        generation: u64,
        scheduled_for: NaiveDateTime,
    },
}

/// How one fire was resolved. Always logged, never discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireOutcome {
    /// First claim for this occurrence; delivery text queued.
    Dispatched,
    /// A log row for this pair already exists; execution skipped.
    AlreadyHandled,
    /// The fire came from a replaced or removed trigger generation.
    Stale,
    /// The item was deleted between registration and fire.
    ItemGone,
    /// The item was disabled between registration and fire.
    Disabled,
}

/// Shared handle for the CRUD collaborator. Each call is acknowledged only
/// after the engine has updated the registry, so "store row written" and
/// "trigger updated" are observed as one step by any later fire.
#[derive(Clone)]
pub struct SchedulerHandle {
    tx: mpsc::Sender<Command>,
}

impl SchedulerHandle {
    pub async fn on_item_created(&self, item: Item) -> Result<()> {
        self.upsert(item).await
    }

    pub async fn on_item_updated(&self, item: Item) -> Result<()> {
        self.upsert(item).await
    }

    pub async fn on_item_deleted(&self, item_id: i64) -> Result<()> {
        let (ack, done) = oneshot::channel();
        self.tx
            .send(Command::Remove { item_id, ack })
            .await
            .map_err(|_| SchedulerError::EngineUnavailable)?;
        done.await.map_err(|_| SchedulerError::EngineUnavailable)
    }

    async fn upsert(&self, item: Item) -> Result<()> {
        let (ack, done) = oneshot::channel();
        self.tx
            .send(Command::Upsert { item, ack })
            .await
            .map_err(|_| SchedulerError::EngineUnavailable)?;
        done.await.map_err(|_| SchedulerError::EngineUnavailable)
    }
}

/// Owns the registry and the command receiver; composes guard and queue.
pub struct SchedulerEngine {
    store: Arc<ScheduleStore>,
    guard: Arc<OccurrenceGuard>,
    queue: DeliveryQueue,
    registry: TriggerRegistry,
    rx: mpsc::Receiver<Command>,
}

impl SchedulerEngine {
    /// Build the engine and its handle. `misfire_grace_secs` bounds how late
    /// a fire may still execute (see `SchedulerConfig`).
    pub fn new(
        store: Arc<ScheduleStore>,
        guard: Arc<OccurrenceGuard>,
        queue: DeliveryQueue,
        misfire_grace_secs: u64,
    ) -> (Self, SchedulerHandle) {
        let (tx, rx) = mpsc::channel(256);
        let registry =
            TriggerRegistry::new(Duration::seconds(misfire_grace_secs as i64), tx.clone());
        (
            Self {
                store,
                guard,
                queue,
                registry,
                rx,
            },
            SchedulerHandle { tx },
        )
    }

    /// Main loop. Rehydrates triggers from the store, then processes commands
    /// until `shutdown` broadcasts `true`. A failed fire is logged and the
    /// loop continues; only the shutdown signal ends it.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!("scheduler engine started");
        self.rehydrate();

        loop {
            tokio::select! {
                maybe = self.rx.recv() => match maybe {
                    Some(cmd) => self.handle(cmd),
                    // Unreachable while the registry holds a sender clone,
                    // but a closed channel still means there is nothing left
                    // to schedule.
                    None => break,
                },
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("scheduler engine shutting down");
                        break;
                    }
                }
            }
        }

        self.registry.shutdown();
    }

    /// Register a trigger for every persisted item. An occurrence missed
    /// while the process was down, but still inside the grace window, fires
    /// immediately with its original scheduled-for.
    fn rehydrate(&mut self) {
        match self.store.list_items() {
            Ok(items) => {
                for item in &items {
                    self.registry.upsert(item);
                }
                info!(
                    items = items.len(),
                    registered = self.registry.len(),
                    "triggers rehydrated from store"
                );
            }
            Err(e) => error!(error = %e, "rehydration query failed, no triggers registered"),
        }
    }

    fn handle(&mut self, cmd: Command) {
        match cmd {
            Command::Upsert { item, ack } => {
                self.registry.upsert(&item);
                let _ = ack.send(());
            }
            Command::Remove { item_id, ack } => {
                self.registry.remove(item_id);
                let _ = ack.send(());
            }
            Command::Fire {
                item_id,
                generation,
                scheduled_for,
            } => match self.handle_fire(item_id, generation, scheduled_for) {
                Ok(outcome) => {
                    info!(item_id, %scheduled_for, ?outcome, "fire handled");
                }
                Err(e) => {
                    error!(item_id, %scheduled_for, error = %e, "fire handling failed");
                }
            },
        }
    }

    /// One fire: validate the trigger is still current, claim the occurrence,
    /// queue the delivery on first claim.
    fn handle_fire(
        &mut self,
        item_id: i64,
        generation: u64,
        scheduled_for: NaiveDateTime,
    ) -> Result<FireOutcome> {
        if self.registry.generation(item_id) != Some(generation) {
            return Ok(FireOutcome::Stale);
        }

        let Some(item) = self.store.get_item(item_id)? else {
            self.registry.remove(item_id);
            return Ok(FireOutcome::ItemGone);
        };
        if !item.enabled {
            // Should have been unregistered by the CRUD path; make it true now.
            self.registry.remove(item_id);
            return Ok(FireOutcome::Disabled);
        }

        match self.guard.claim(item_id, scheduled_for)? {
            ClaimOutcome::AlreadyHandled => Ok(FireOutcome::AlreadyHandled),
            ClaimOutcome::Claimed { log_id } => {
                self.queue.enqueue(DeliveryRequest {
                    log_id: Some(log_id),
                    text: compose_text(&item.title, &item.message),
                });
                Ok(FireOutcome::Dispatched)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::occurrence::next_occurrence;
    use crate::types::{NewItem, OccurrenceStatus};
    use rusqlite::Connection;
    use std::path::PathBuf;
    use vigil_core::TimeOfDay;

    fn temp_db_path(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("vigil-engine-{tag}-{}.db", std::process::id()))
    }

    struct Stack {
        store: Arc<ScheduleStore>,
        engine: SchedulerEngine,
        handle: SchedulerHandle,
        rx: mpsc::UnboundedReceiver<DeliveryRequest>,
        path: PathBuf,
    }

    fn open_stack(tag: &str, grace_secs: u64) -> Stack {
        let path = temp_db_path(tag);
        let _ = std::fs::remove_file(&path);
        let store =
            Arc::new(ScheduleStore::new(Connection::open(&path).unwrap()).expect("store init"));
        let guard =
            Arc::new(OccurrenceGuard::new(Connection::open(&path).unwrap()).expect("guard init"));
        let (queue, rx, _stats) = DeliveryQueue::new();
        let (engine, handle) = SchedulerEngine::new(Arc::clone(&store), guard, queue, grace_secs);
        Stack {
            store,
            engine,
            handle,
            rx,
            path,
        }
    }

    fn new_item(time_of_day: &str, enabled: bool) -> NewItem {
        NewItem {
            user_id: None,
            title: "복약".into(),
            message: "약 드실 시간입니다".into(),
            time_of_day: time_of_day.into(),
            enabled,
        }
    }

    async fn wait_for_log(
        store: &ScheduleStore,
        item_id: i64,
        scheduled_for: NaiveDateTime,
        timeout_ms: u64,
    ) -> Option<crate::types::OccurrenceLog> {
        let deadline = std::time::Instant::now() + std::time::Duration::from_millis(timeout_ms);
        while std::time::Instant::now() < deadline {
            if let Some(log) = store.find_log(item_id, scheduled_for).unwrap() {
                return Some(log);
            }
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        }
        None
    }

    // --- compose_text ----------------------------------------------------

    #[test]
    fn composes_title_and_message() {
        assert_eq!(
            compose_text("복약", "약 드실 시간입니다"),
            "복약. 약 드실 시간입니다"
        );
    }

    #[test]
    fn composes_single_sides_and_fallback() {
        assert_eq!(compose_text("복약", ""), "복약");
        assert_eq!(compose_text("", "약 드실 시간입니다"), "약 드실 시간입니다");
        assert_eq!(compose_text("", ""), FALLBACK_PHRASE);
        assert_eq!(compose_text("  ", "  "), FALLBACK_PHRASE);
    }

    // --- fire handling (direct, inside the engine domain) ----------------

    #[tokio::test]
    async fn fire_claims_once_and_enqueues_composed_text() {
        let mut stack = open_stack("fire-once", 600);
        let item = stack.store.insert_item(&new_item("22:55", true)).unwrap();
        stack.engine.registry.upsert(&item);
        let generation = stack.engine.registry.generation(item.id).unwrap();
        let sched = crate::db::parse_ts("2026-08-29 22:55:00").unwrap();

        let first = stack.engine.handle_fire(item.id, generation, sched).unwrap();
        assert_eq!(first, FireOutcome::Dispatched);
        // Same occurrence firing again (restart replay, duplicate wake) is
        // already handled, never delivered twice.
        let second = stack.engine.handle_fire(item.id, generation, sched).unwrap();
        assert_eq!(second, FireOutcome::AlreadyHandled);

        let req = stack.rx.try_recv().expect("expected one delivery");
        assert_eq!(req.text, "복약. 약 드실 시간입니다");
        assert!(req.log_id.is_some());
        assert!(stack.rx.try_recv().is_err());

        let log = stack.store.find_log(item.id, sched).unwrap().unwrap();
        assert_eq!(log.status, OccurrenceStatus::Started);
        let _ = std::fs::remove_file(stack.path);
    }

    #[tokio::test]
    async fn stale_generation_fire_is_dropped() {
        let mut stack = open_stack("stale", 600);
        let item = stack.store.insert_item(&new_item("09:00", true)).unwrap();
        stack.engine.registry.upsert(&item);
        let old_generation = stack.engine.registry.generation(item.id).unwrap();

        // Time-of-day changed before the old fire was processed.
        let mut changed = new_item("10:30", true);
        changed.title = item.title.clone();
        let updated = stack.store.update_item(item.id, &changed).unwrap();
        stack.engine.registry.upsert(&updated);

        let old_sched = crate::db::parse_ts("2026-08-29 09:00:00").unwrap();
        let outcome = stack
            .engine
            .handle_fire(item.id, old_generation, old_sched)
            .unwrap();
        assert_eq!(outcome, FireOutcome::Stale);
        // No log is ever produced for the old time.
        assert!(stack.store.find_log(item.id, old_sched).unwrap().is_none());
        assert!(stack.rx.try_recv().is_err());
        let _ = std::fs::remove_file(stack.path);
    }

    #[tokio::test]
    async fn disabled_item_fire_produces_no_log() {
        let mut stack = open_stack("disabled", 600);
        let item = stack.store.insert_item(&new_item("09:00", true)).unwrap();
        stack.engine.registry.upsert(&item);
        let generation = stack.engine.registry.generation(item.id).unwrap();

        // Disabled in the store, fire still in flight.
        stack
            .store
            .update_item(item.id, &new_item("09:00", false))
            .unwrap();

        let sched = crate::db::parse_ts("2026-08-29 09:00:00").unwrap();
        let outcome = stack.engine.handle_fire(item.id, generation, sched).unwrap();
        assert_eq!(outcome, FireOutcome::Disabled);
        assert!(stack.engine.registry.generation(item.id).is_none());
        assert!(stack.store.find_log(item.id, sched).unwrap().is_none());
        assert!(stack.rx.try_recv().is_err());
        let _ = std::fs::remove_file(stack.path);
    }

    #[tokio::test]
    async fn deleted_item_fire_unregisters() {
        let mut stack = open_stack("gone", 600);
        let item = stack.store.insert_item(&new_item("09:00", true)).unwrap();
        stack.engine.registry.upsert(&item);
        let generation = stack.engine.registry.generation(item.id).unwrap();

        stack.store.delete_item(item.id).unwrap();

        let sched = crate::db::parse_ts("2026-08-29 09:00:00").unwrap();
        let outcome = stack.engine.handle_fire(item.id, generation, sched).unwrap();
        assert_eq!(outcome, FireOutcome::ItemGone);
        assert!(stack.engine.registry.generation(item.id).is_none());
        let _ = std::fs::remove_file(stack.path);
    }

    // --- full loop -------------------------------------------------------

    #[tokio::test]
    async fn created_item_fires_at_its_time_of_day() {
        let mut stack = open_stack("live-fire", 600);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let engine_task = tokio::spawn(stack.engine.run(shutdown_rx));

        // An occurrence two seconds from now.
        let now = chrono::Local::now().naive_local();
        let at = now + Duration::seconds(2);
        let tod_str = at.format("%H:%M:%S").to_string();
        let item = stack.store.insert_item(&new_item(&tod_str, true)).unwrap();
        stack.handle.on_item_created(item.clone()).await.unwrap();

        let tod: TimeOfDay = tod_str.parse().unwrap();
        let expected = next_occurrence(tod, now, Duration::seconds(600), None);
        let log = wait_for_log(&stack.store, item.id, expected, 8000)
            .await
            .expect("no occurrence log produced");
        assert_eq!(log.scheduled_for, expected);

        let req = stack.rx.recv().await.expect("no delivery queued");
        assert_eq!(req.text, "복약. 약 드실 시간입니다");

        let _ = shutdown_tx.send(true);
        engine_task.await.unwrap();
        let _ = std::fs::remove_file(stack.path);
    }

    #[tokio::test]
    async fn delivery_is_promoted_to_success_end_to_end() {
        let path = temp_db_path("end-to-end");
        let _ = std::fs::remove_file(&path);
        let store =
            Arc::new(ScheduleStore::new(Connection::open(&path).unwrap()).expect("store init"));
        let guard =
            Arc::new(OccurrenceGuard::new(Connection::open(&path).unwrap()).expect("guard init"));
        let (queue, delivery_rx, stats) = DeliveryQueue::new();
        let (engine, handle) = SchedulerEngine::new(Arc::clone(&store), Arc::clone(&guard), queue, 600);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let worker = tokio::spawn(vigil_speech::run_worker(
            delivery_rx,
            stats,
            Box::new(vigil_speech::NullSpeech),
            Arc::clone(&guard) as Arc<dyn vigil_speech::DeliverySink>,
            shutdown_rx.clone(),
        ));
        let engine_task = tokio::spawn(engine.run(shutdown_rx));

        let now = chrono::Local::now().naive_local();
        let at = now + Duration::seconds(2);
        let tod_str = at.format("%H:%M:%S").to_string();
        let item = store.insert_item(&new_item(&tod_str, true)).unwrap();
        handle.on_item_created(item.clone()).await.unwrap();

        let tod: TimeOfDay = tod_str.parse().unwrap();
        let expected = next_occurrence(tod, now, Duration::seconds(600), None);

        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(8);
        let mut terminal = None;
        while std::time::Instant::now() < deadline {
            if let Some(log) = store.find_log(item.id, expected).unwrap() {
                if log.status == OccurrenceStatus::Success {
                    terminal = Some(log);
                    break;
                }
            }
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        }
        let log = terminal.expect("claim was never promoted to SUCCESS");
        assert_eq!(log.scheduled_for, expected);
        assert!(log.error.is_none());

        let _ = shutdown_tx.send(true);
        engine_task.await.unwrap();
        worker.await.unwrap();
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn rehydration_honours_missed_occurrence_within_grace() {
        let mut stack = open_stack("rehydrate", 600);

        // Item whose occurrence passed two minutes ago, inside the 10-minute
        // grace window. A restart must fire it once with the original time.
        // Whole-second `now`: the time-of-day round-trips through "%H:%M:%S".
        let now = chrono::Timelike::with_nanosecond(&chrono::Local::now().naive_local(), 0).unwrap();
        let missed = now - Duration::seconds(120);
        let tod_str = missed.format("%H:%M:%S").to_string();
        let item = stack.store.insert_item(&new_item(&tod_str, true)).unwrap();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let engine_task = tokio::spawn(stack.engine.run(shutdown_rx));

        let tod: TimeOfDay = tod_str.parse().unwrap();
        let expected = next_occurrence(tod, now, Duration::seconds(600), None);
        assert_eq!(expected.time(), missed.time());

        let log = wait_for_log(&stack.store, item.id, expected, 4000)
            .await
            .expect("missed occurrence did not fire");
        // Scheduled-for is the original due time, not the restart time.
        assert_eq!(log.scheduled_for, expected);

        let _ = shutdown_tx.send(true);
        engine_task.await.unwrap();
        let _ = std::fs::remove_file(stack.path);
    }

    #[tokio::test]
    async fn disabled_item_is_not_rehydrated() {
        let mut stack = open_stack("rehydrate-disabled", 600);

        let now = chrono::Local::now().naive_local();
        let missed = now - Duration::seconds(120);
        let tod_str = missed.format("%H:%M:%S").to_string();
        let item = stack.store.insert_item(&new_item(&tod_str, false)).unwrap();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let engine_task = tokio::spawn(stack.engine.run(shutdown_rx));

        let tod: TimeOfDay = tod_str.parse().unwrap();
        let expected = next_occurrence(tod, now, Duration::seconds(600), None);
        assert!(wait_for_log(&stack.store, item.id, expected, 1500).await.is_none());

        let _ = shutdown_tx.send(true);
        engine_task.await.unwrap();
        let _ = std::fs::remove_file(stack.path);
    }

    #[tokio::test]
    async fn handle_reports_unavailable_after_shutdown() {
        let stack = open_stack("unavailable", 600);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let engine_task = tokio::spawn(stack.engine.run(shutdown_rx));

        let _ = shutdown_tx.send(true);
        engine_task.await.unwrap();

        let item = stack.store.insert_item(&new_item("09:00", true)).unwrap();
        let err = stack.handle.on_item_created(item).await.unwrap_err();
        assert!(matches!(err, SchedulerError::EngineUnavailable));
        let _ = std::fs::remove_file(stack.path);
    }
}
