use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

/// The only attendance status the ledger records.
pub const STATUS_PRESENT: &str = "present";

/// An enrolled student. The embedding lives in the same row but is only
/// surfaced through the roster load path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Student {
    pub id: String,
    pub name: String,
    pub roll_number: String,
    /// Reference to the enrollment image, if the caller keeps one.
    pub image_ref: Option<String>,
    pub created_at: String,
}

/// A class/subject offering against which attendance is recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub code: String,
    pub name: String,
    pub faculty: String,
    pub created_at: String,
}

/// One durable presence event. Never updated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub id: String,
    pub student_id: String,
    pub session_id: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub status: String,
}

/// A ledger row joined with student and session labels, for reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttendanceReportRow {
    pub record_id: String,
    pub student_id: String,
    pub student_name: String,
    pub roll_number: String,
    pub session_id: String,
    pub session_code: String,
    pub session_name: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub status: String,
}
