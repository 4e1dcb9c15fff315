//! The delivery queue: unbounded FIFO in, one synthesis call at a time out.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::NaiveDateTime;
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::engine::SpeechEngine;

/// One queued delivery. `log_id` refers to the STARTED occurrence-log row the
/// scheduler claimed before enqueueing; `None` for debug deliveries that have
/// no occurrence behind them.
#[derive(Debug, Clone)]
pub struct DeliveryRequest {
    pub log_id: Option<i64>,
    pub text: String,
}

/// Where the worker reports terminal outcomes. Implemented by the scheduler's
/// occurrence guard; the worker itself never touches the database schema.
pub trait DeliverySink: Send + Sync {
    fn delivered(&self, log_id: i64);
    fn failed(&self, log_id: i64, detail: &str);
}

/// Observable counters, polled by operators and tests via `/speech/status`.
#[derive(Debug, Default)]
pub struct DeliveryStats {
    depth: AtomicUsize,
    spoken: AtomicU64,
    last_spoken_at: Mutex<Option<NaiveDateTime>>,
    last_error: Mutex<Option<String>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub queue_depth: usize,
    pub spoken_count: u64,
    pub last_spoken_at: Option<String>,
    pub last_error: Option<String>,
}

impl DeliveryStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            queue_depth: self.depth.load(Ordering::Relaxed),
            spoken_count: self.spoken.load(Ordering::Relaxed),
            last_spoken_at: self
                .last_spoken_at
                .lock()
                .unwrap()
                .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string()),
            last_error: self.last_error.lock().unwrap().clone(),
        }
    }

    fn record_success(&self) {
        self.spoken.fetch_add(1, Ordering::Relaxed);
        *self.last_spoken_at.lock().unwrap() = Some(chrono::Local::now().naive_local());
        *self.last_error.lock().unwrap() = None;
    }

    fn record_error(&self, detail: &str) {
        *self.last_error.lock().unwrap() = Some(detail.to_string());
    }
}

/// Producer half of the queue. Cheap to clone; `enqueue` never blocks, so the
/// trigger-firing path is never stalled by a slow synthesizer.
#[derive(Clone)]
pub struct DeliveryQueue {
    tx: mpsc::UnboundedSender<DeliveryRequest>,
    stats: Arc<DeliveryStats>,
}

impl DeliveryQueue {
    /// Build the queue. The returned receiver must be handed to [`run_worker`].
    pub fn new() -> (Self, mpsc::UnboundedReceiver<DeliveryRequest>, Arc<DeliveryStats>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let stats = Arc::new(DeliveryStats::default());
        (
            Self {
                tx,
                stats: Arc::clone(&stats),
            },
            rx,
            stats,
        )
    }

    pub fn enqueue(&self, request: DeliveryRequest) {
        self.stats.depth.fetch_add(1, Ordering::Relaxed);
        if self.tx.send(request).is_err() {
            // Worker already shut down. Drop silently, no terminal log.
            self.stats.depth.fetch_sub(1, Ordering::Relaxed);
            warn!("delivery queue closed, request dropped");
        }
    }

    pub fn stats(&self) -> Arc<DeliveryStats> {
        Arc::clone(&self.stats)
    }
}

/// The single consumer. Owns the speech engine handle exclusively; drains the
/// queue in FIFO order, one request fully processed (including the blocking
/// synthesis call) before the next is dequeued. A synthesis failure is
/// recorded and the loop continues; it only exits on the shutdown signal or
/// when every producer handle is gone.
pub async fn run_worker(
    mut rx: mpsc::UnboundedReceiver<DeliveryRequest>,
    stats: Arc<DeliveryStats>,
    engine: Box<dyn SpeechEngine>,
    sink: Arc<dyn DeliverySink>,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(backend = engine.name(), "delivery worker started");

    loop {
        let request = tokio::select! {
            maybe = rx.recv() => match maybe {
                Some(r) => r,
                None => break,
            },
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("delivery worker shutting down");
                    break;
                }
                continue;
            }
        };

        debug!(log_id = ?request.log_id, "delivery dequeued");
        match engine.speak(&request.text).await {
            Ok(()) => {
                stats.record_success();
                if let Some(log_id) = request.log_id {
                    sink.delivered(log_id);
                }
                info!(log_id = ?request.log_id, "delivery spoken");
            }
            Err(e) => {
                let detail = e.to_string();
                stats.record_error(&detail);
                if let Some(log_id) = request.log_id {
                    sink.failed(log_id, &detail);
                }
                warn!(log_id = ?request.log_id, error = %detail, "delivery failed");
            }
        }
        stats.depth.fetch_sub(1, Ordering::Relaxed);
    }
}
