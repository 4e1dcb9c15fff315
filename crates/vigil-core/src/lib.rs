//! `vigil-core`: shared foundation for the Vigil reminder service.
//!
//! Holds the pieces every other crate needs: the configuration loader
//! (`vigil.toml` + `VIGIL_*` env overrides), the shared error type, and the
//! time-of-day value type used by both item validation and trigger
//! registration so the two can never disagree about what `"22:55"` means.

pub mod config;
pub mod error;
pub mod timeofday;

pub use config::VigilConfig;
pub use error::{Result, VigilError};
pub use timeofday::TimeOfDay;
