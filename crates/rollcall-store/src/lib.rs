//! rollcall-store — SQLite persistence for students, sessions, and the
//! attendance ledger.
//!
//! The ledger's at-most-one-record-per-(student, session, day) property
//! is enforced by a UNIQUE index, not by check-then-insert; a constraint
//! violation surfaces as [`StoreError::AttendanceExists`].

pub mod models;
pub mod schema;
pub mod store;

pub use models::{AttendanceRecord, AttendanceReportRow, Session, Student, STATUS_PRESENT};
pub use store::{AttendanceDb, StoreError};
