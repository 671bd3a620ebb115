//! rollcall-service — turns probe images into attendance records.
//!
//! Orchestrates the analyzer engine, the in-memory roster, the matcher,
//! and the ledger. Matching runs against a point-in-time roster snapshot;
//! the ledger's uniqueness constraint makes recording idempotent per
//! (student, session, day).

pub mod config;
pub mod engine;
pub mod error;
pub mod roster;
pub mod service;

pub use config::Config;
pub use engine::{spawn_analyzer, AnalyzerHandle, EngineError};
pub use error::{EnrollError, Fault, MarkError};
pub use roster::Roster;
pub use service::{AttendanceOutcome, AttendanceService};
