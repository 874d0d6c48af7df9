//! Risk signal detection for coaching organizations.
//!
//! Raw attendance, session-log, pending-report and check-in records are pulled
//! from a [`source::SignalDataSource`], run through the builders in [`risk`],
//! ranked by [`ranking`] and cached per organization by [`engine::SignalEngine`].

pub mod cache;
pub mod config;
pub mod copilot;
pub mod db;
pub mod engine;
pub mod error;
pub mod models;
pub mod ranking;
pub mod report;
pub mod risk;
pub mod source;
pub mod telemetry;
pub mod window;

pub use cache::{InMemorySignalCache, SignalCache};
pub use config::{EngineConfig, SignalThresholds};
pub use copilot::{get_recommended_signal_actions, sort_copilot_signals};
pub use engine::SignalEngine;
pub use error::EngineError;
pub use models::{Severity, Signal, SignalScope, SignalType};
pub use source::{DataSnapshot, SignalDataSource, SnapshotSource};
