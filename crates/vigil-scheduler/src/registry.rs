//! The trigger registry: one live daily trigger task per enabled item.
//!
//! Only the engine's command loop ever touches the registry, which is what
//! makes create/replace/remove atomic from a caller's point of view: there
//! is no window where two triggers for the same item are both live. Each
//! trigger carries a generation number; a fire from a replaced generation is
//! simply stale and the engine drops it.

use std::collections::HashMap;

use chrono::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use vigil_core::TimeOfDay;

use crate::engine::Command;
use crate::occurrence::next_occurrence;
use crate::types::Item;

struct Trigger {
    generation: u64,
    task: JoinHandle<()>,
}

pub struct TriggerRegistry {
    triggers: HashMap<i64, Trigger>,
    next_generation: u64,
    grace: Duration,
    fire_tx: mpsc::Sender<Command>,
}

impl TriggerRegistry {
    pub(crate) fn new(grace: Duration, fire_tx: mpsc::Sender<Command>) -> Self {
        Self {
            triggers: HashMap::new(),
            next_generation: 0,
            grace,
            fire_tx,
        }
    }

    /// Create-or-replace the trigger for `item`. A disabled item, or one
    /// whose stored time-of-day no longer parses, gets any existing trigger
    /// removed instead (no-op when absent).
    pub fn upsert(&mut self, item: &Item) {
        if !item.enabled {
            self.remove(item.id);
            return;
        }
        let tod: TimeOfDay = match item.time_of_day.parse() {
            Ok(t) => t,
            Err(e) => {
                // Validation normally rejects this before the store write;
                // a bad stored value leaves the item unregistered.
                warn!(item_id = item.id, error = %e, "unparseable time_of_day, item left unregistered");
                self.remove(item.id);
                return;
            }
        };

        // Abort-then-spawn inside the single engine domain: no double-firing
        // window, and the generation bump invalidates any fire the old task
        // already queued.
        if let Some(old) = self.triggers.remove(&item.id) {
            old.task.abort();
        }
        self.next_generation += 1;
        let generation = self.next_generation;
        let task = tokio::spawn(run_trigger(
            item.id,
            generation,
            tod,
            self.grace,
            self.fire_tx.clone(),
        ));
        self.triggers.insert(item.id, Trigger { generation, task });
        info!(item_id = item.id, time_of_day = %tod, generation, "trigger registered");
    }

    /// Remove the trigger if present; no-op otherwise.
    pub fn remove(&mut self, item_id: i64) {
        if let Some(old) = self.triggers.remove(&item_id) {
            old.task.abort();
            info!(item_id, "trigger removed");
        }
    }

    /// Current generation for a registered item, `None` when unregistered.
    pub fn generation(&self, item_id: i64) -> Option<u64> {
        self.triggers.get(&item_id).map(|t| t.generation)
    }

    pub fn len(&self) -> usize {
        self.triggers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triggers.is_empty()
    }

    /// Abort every trigger task. Pending un-fired occurrences are discarded:
    /// no log, no error.
    pub fn shutdown(&mut self) {
        for (item_id, trigger) in self.triggers.drain() {
            trigger.task.abort();
            debug!(item_id, "trigger aborted on shutdown");
        }
    }
}

/// One trigger's life: sleep until the next occurrence, fire, repeat.
///
/// A wake that arrives later than the grace window (suspended clock, long
/// pause) drops that occurrence instead of executing it late; a wake within
/// the window still fires with the original scheduled-for.
async fn run_trigger(
    item_id: i64,
    generation: u64,
    tod: TimeOfDay,
    grace: Duration,
    fire_tx: mpsc::Sender<Command>,
) {
    let mut last: Option<chrono::NaiveDateTime> = None;
    loop {
        let now = chrono::Local::now().naive_local();
        let scheduled_for = next_occurrence(tod, now, grace, last);

        if scheduled_for > now {
            let wait = (scheduled_for - now).to_std().unwrap_or_default();
            debug!(item_id, %scheduled_for, wait_secs = wait.as_secs(), "trigger sleeping");
            tokio::time::sleep(wait).await;

            let woke = chrono::Local::now().naive_local();
            if woke - scheduled_for > grace {
                warn!(item_id, %scheduled_for, "fire missed beyond grace window, dropped");
                last = Some(scheduled_for);
                continue;
            }
        }
        // else: a past occurrence still inside the grace window (startup
        // after a restart). Fire immediately with the original time.

        if fire_tx
            .send(Command::Fire {
                item_id,
                generation,
                scheduled_for,
            })
            .await
            .is_err()
        {
            // Engine loop is gone, nothing left to fire into.
            return;
        }
        last = Some(scheduled_for);
    }
}
