//! `vigil-speech`: serialized text-to-speech delivery.
//!
//! Trigger fires must never wait on a slow synthesizer, and the synthesizer
//! itself is not safe for concurrent use. This crate decouples the two: an
//! unbounded FIFO accepts delivery requests without blocking, and a single
//! consumer task (the sole owner of the [`SpeechEngine`] handle) drains it
//! strictly in order, fully finishing one synthesis call before dequeuing the
//! next. Outcomes are reported back through the [`DeliverySink`] trait so the
//! scheduler's occurrence log stays the source of truth.

pub mod engine;
pub mod error;
pub mod queue;

pub use engine::{CommandSpeech, NullSpeech, SpeechEngine};
pub use error::SpeechError;
pub use queue::{run_worker, DeliveryQueue, DeliveryRequest, DeliverySink, DeliveryStats, StatsSnapshot};
