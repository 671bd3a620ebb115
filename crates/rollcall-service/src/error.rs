use chrono::NaiveDate;
use thiserror::Error;

use rollcall_store::StoreError;

use crate::engine::EngineError;

/// Unexpected system malfunction, kept apart from the domain errors so
/// callers can tell a business-rule violation from a broken collaborator.
/// Surfaced unmodified; never mapped to a domain variant.
#[derive(Error, Debug)]
pub enum Fault {
    #[error("storage fault: {0}")]
    Store(StoreError),
    #[error("analyzer fault: {0}")]
    Engine(#[from] EngineError),
}

/// Why an enrollment was refused.
#[derive(Error, Debug)]
pub enum EnrollError {
    #[error("no face detected in enrollment image")]
    NoFaceDetected,
    #[error("enrollment image contains {count} faces; exactly one is required")]
    AmbiguousEnrollment { count: usize },
    #[error("roll number {roll_number} is already enrolled")]
    DuplicateRollNumber { roll_number: String },
    #[error(transparent)]
    Fault(#[from] Fault),
}

/// Why a probe did not produce a new attendance record.
#[derive(Error, Debug)]
pub enum MarkError {
    #[error("no face detected in probe image")]
    NoFaceDetected,
    #[error("no students are enrolled")]
    EmptyRoster,
    #[error("no match: closest candidate {best_name} at distance {best_distance:.3}")]
    NoMatch { best_name: String, best_distance: f32 },
    #[error("attendance already marked for {student_name} on {date}")]
    DuplicateAttendance {
        student_name: String,
        date: NaiveDate,
    },
    #[error("unknown session: {session_id}")]
    UnknownSession { session_id: String },
    #[error(transparent)]
    Fault(#[from] Fault),
}
