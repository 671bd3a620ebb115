use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{NaiveDate, NaiveTime, Utc};
use rusqlite::{params, Connection};
use thiserror::Error;
use uuid::Uuid;

use rollcall_core::{DimensionMismatch, Embedding, RosterEntry};

use crate::models::{AttendanceRecord, AttendanceReportRow, Session, Student, STATUS_PRESENT};
use crate::schema;

const DATE_FMT: &str = "%Y-%m-%d";
const TIME_FMT: &str = "%H:%M:%S";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("i/o: {0}")]
    Io(String),
    #[error("connection lock poisoned")]
    Lock,
    #[error("student not found: {0}")]
    StudentNotFound(String),
    #[error("session not found: {0}")]
    SessionNotFound(String),
    #[error("roll number already registered: {0}")]
    RollNumberTaken(String),
    #[error("session code already registered: {0}")]
    SessionCodeTaken(String),
    #[error("attendance already recorded for student {student_id} on {date}")]
    AttendanceExists { student_id: String, date: NaiveDate },
    #[error("stored embedding for student {student_id} is malformed")]
    MalformedEmbedding {
        student_id: String,
        #[source]
        source: DimensionMismatch,
    },
}

/// SQLite-backed attendance database.
///
/// Thread-safe via an internal `Mutex<Connection>`; every operation runs
/// inside one critical section, so check-then-act sequences within a
/// single call cannot interleave with other writers.
pub struct AttendanceDb {
    conn: Mutex<Connection>,
}

impl AttendanceDb {
    /// Open (or create) the database at `path` and apply the schema.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Io(e.to_string()))?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        schema::apply_schema(&conn)?;
        tracing::info!(path = %path.display(), "attendance database opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    // --- students ---

    /// Persist a newly enrolled student.
    ///
    /// The UNIQUE constraint on `roll_number` is the uniqueness authority;
    /// a violation maps to [`StoreError::RollNumberTaken`] and leaves the
    /// existing row untouched.
    pub fn add_student(
        &self,
        name: &str,
        roll_number: &str,
        embedding: &Embedding,
        image_ref: Option<&str>,
    ) -> Result<Student, StoreError> {
        let conn = self.lock()?;
        let id = Uuid::new_v4().to_string();
        let created_at = Utc::now().to_rfc3339();

        conn.execute(
            "INSERT INTO students (id, name, roll_number, embedding, image_ref, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                id,
                name,
                roll_number,
                embedding.to_le_bytes(),
                image_ref,
                created_at
            ],
        )
        .map_err(|e| on_unique(e, || StoreError::RollNumberTaken(roll_number.to_string())))?;

        tracing::info!(student_id = %id, roll_number, "student enrolled");
        Ok(Student {
            id,
            name: name.to_string(),
            roll_number: roll_number.to_string(),
            image_ref: image_ref.map(ToOwned::to_owned),
            created_at,
        })
    }

    pub fn list_students(&self) -> Result<Vec<Student>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, roll_number, image_ref, created_at FROM students \
             ORDER BY roll_number",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(Student {
                id: row.get(0)?,
                name: row.get(1)?,
                roll_number: row.get(2)?,
                image_ref: row.get(3)?,
                created_at: row.get(4)?,
            })
        })?;
        rows.collect::<rusqlite::Result<_>>().map_err(Into::into)
    }

    /// Load every enrolled identity with its embedding, validating each
    /// stored blob before it can reach a distance computation.
    pub fn load_roster(&self) -> Result<Vec<RosterEntry>, StoreError> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT id, name, roll_number, embedding FROM students ORDER BY roll_number")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Vec<u8>>(3)?,
            ))
        })?;

        let mut roster = Vec::new();
        for r in rows {
            let (student_id, name, roll_number, blob) = r?;
            let embedding =
                Embedding::from_le_bytes(&blob).map_err(|source| StoreError::MalformedEmbedding {
                    student_id: student_id.clone(),
                    source,
                })?;
            roster.push(RosterEntry {
                student_id,
                name,
                roll_number,
                embedding,
            });
        }
        tracing::debug!(count = roster.len(), "roster loaded");
        Ok(roster)
    }

    /// Remove a student and, in the same transaction, every attendance
    /// record that references them.
    pub fn remove_student(&self, student_id: &str) -> Result<(), StoreError> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction()?;
        let cascaded = tx.execute(
            "DELETE FROM attendance WHERE student_id = ?1",
            params![student_id],
        )?;
        let removed = tx.execute("DELETE FROM students WHERE id = ?1", params![student_id])?;
        if removed == 0 {
            return Err(StoreError::StudentNotFound(student_id.to_string()));
        }
        tx.commit()?;
        tracing::info!(student_id, cascaded, "student removed");
        Ok(())
    }

    // --- sessions ---

    pub fn add_session(
        &self,
        code: &str,
        name: &str,
        faculty: &str,
    ) -> Result<Session, StoreError> {
        let conn = self.lock()?;
        let id = Uuid::new_v4().to_string();
        let created_at = Utc::now().to_rfc3339();

        conn.execute(
            "INSERT INTO sessions (id, code, name, faculty, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, code, name, faculty, created_at],
        )
        .map_err(|e| on_unique(e, || StoreError::SessionCodeTaken(code.to_string())))?;

        tracing::info!(session_id = %id, code, "session created");
        Ok(Session {
            id,
            code: code.to_string(),
            name: name.to_string(),
            faculty: faculty.to_string(),
            created_at,
        })
    }

    pub fn list_sessions(&self) -> Result<Vec<Session>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT id, code, name, faculty, created_at FROM sessions ORDER BY code")?;
        let rows = stmt.query_map([], |row| {
            Ok(Session {
                id: row.get(0)?,
                code: row.get(1)?,
                name: row.get(2)?,
                faculty: row.get(3)?,
                created_at: row.get(4)?,
            })
        })?;
        rows.collect::<rusqlite::Result<_>>().map_err(Into::into)
    }

    pub fn session_by_code(&self, code: &str) -> Result<Session, StoreError> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT id, code, name, faculty, created_at FROM sessions WHERE code = ?1",
            params![code],
            |row| {
                Ok(Session {
                    id: row.get(0)?,
                    code: row.get(1)?,
                    name: row.get(2)?,
                    faculty: row.get(3)?,
                    created_at: row.get(4)?,
                })
            },
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => StoreError::SessionNotFound(code.to_string()),
            other => StoreError::Sqlite(other),
        })
    }

    /// Remove a session and, in the same transaction, every attendance
    /// record recorded against it.
    pub fn remove_session(&self, session_id: &str) -> Result<(), StoreError> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction()?;
        let cascaded = tx.execute(
            "DELETE FROM attendance WHERE session_id = ?1",
            params![session_id],
        )?;
        let removed = tx.execute("DELETE FROM sessions WHERE id = ?1", params![session_id])?;
        if removed == 0 {
            return Err(StoreError::SessionNotFound(session_id.to_string()));
        }
        tx.commit()?;
        tracing::info!(session_id, cascaded, "session removed");
        Ok(())
    }

    // --- ledger ---

    /// Record presence for one (student, session, day) key.
    ///
    /// A single INSERT; the `idx_attendance_once_per_day` UNIQUE index
    /// guarantees that of N concurrent calls for the same key exactly one
    /// succeeds and the rest observe [`StoreError::AttendanceExists`].
    pub fn mark_attendance(
        &self,
        student_id: &str,
        session_id: &str,
        date: NaiveDate,
        time: NaiveTime,
    ) -> Result<AttendanceRecord, StoreError> {
        let conn = self.lock()?;

        // Verified under the same lock as the INSERT below, so a missing
        // session cannot be misreported as a ledger conflict.
        let session_exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sessions WHERE id = ?1)",
            params![session_id],
            |row| row.get(0),
        )?;
        if !session_exists {
            return Err(StoreError::SessionNotFound(session_id.to_string()));
        }

        let id = Uuid::new_v4().to_string();
        conn.execute(
            "INSERT INTO attendance (id, student_id, session_id, date, time, status) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                id,
                student_id,
                session_id,
                date.format(DATE_FMT).to_string(),
                time.format(TIME_FMT).to_string(),
                STATUS_PRESENT
            ],
        )
        .map_err(|e| match &e {
            rusqlite::Error::SqliteFailure(f, _)
                if f.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
            {
                StoreError::AttendanceExists {
                    student_id: student_id.to_string(),
                    date,
                }
            }
            rusqlite::Error::SqliteFailure(f, _)
                if f.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY =>
            {
                StoreError::StudentNotFound(student_id.to_string())
            }
            _ => StoreError::Sqlite(e),
        })?;

        tracing::info!(record_id = %id, student_id, session_id, date = %date, "attendance recorded");
        Ok(AttendanceRecord {
            id,
            student_id: student_id.to_string(),
            session_id: session_id.to_string(),
            date,
            time,
            status: STATUS_PRESENT.to_string(),
        })
    }

    // --- reporting read surface ---

    pub fn records_on_date(&self, date: NaiveDate) -> Result<Vec<AttendanceReportRow>, StoreError> {
        self.report_query(
            "WHERE a.date = ?1 ORDER BY a.time",
            params![date.format(DATE_FMT).to_string()],
        )
    }

    pub fn records_for_session(
        &self,
        session_id: &str,
    ) -> Result<Vec<AttendanceReportRow>, StoreError> {
        self.report_query("WHERE a.session_id = ?1 ORDER BY a.date, a.time", params![session_id])
    }

    pub fn records_for_student(
        &self,
        student_id: &str,
    ) -> Result<Vec<AttendanceReportRow>, StoreError> {
        self.report_query("WHERE a.student_id = ?1 ORDER BY a.date, a.time", params![student_id])
    }

    fn report_query(
        &self,
        tail: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<AttendanceReportRow>, StoreError> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT a.id, a.student_id, s.name, s.roll_number, \
                    a.session_id, c.code, c.name, a.date, a.time, a.status \
             FROM attendance a \
             JOIN students s ON s.id = a.student_id \
             JOIN sessions c ON c.id = a.session_id \
             {tail}"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params, row_to_report)?;
        rows.collect::<rusqlite::Result<_>>().map_err(Into::into)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Lock)
    }
}

/// Map a UNIQUE-constraint violation to a domain conflict; anything else
/// stays a storage fault.
fn on_unique(err: rusqlite::Error, conflict: impl FnOnce() -> StoreError) -> StoreError {
    match &err {
        rusqlite::Error::SqliteFailure(f, _)
            if f.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
        {
            conflict()
        }
        _ => StoreError::Sqlite(err),
    }
}

fn row_to_report(row: &rusqlite::Row<'_>) -> rusqlite::Result<AttendanceReportRow> {
    let date_text: String = row.get(7)?;
    let time_text: String = row.get(8)?;
    Ok(AttendanceReportRow {
        record_id: row.get(0)?,
        student_id: row.get(1)?,
        student_name: row.get(2)?,
        roll_number: row.get(3)?,
        session_id: row.get(4)?,
        session_code: row.get(5)?,
        session_name: row.get(6)?,
        date: parse_text(7, &date_text, DATE_FMT, NaiveDate::parse_from_str)?,
        time: parse_text(8, &time_text, TIME_FMT, NaiveTime::parse_from_str)?,
        status: row.get(9)?,
    })
}

fn parse_text<T>(
    idx: usize,
    text: &str,
    fmt: &str,
    parse: impl Fn(&str, &str) -> Result<T, chrono::ParseError>,
) -> rusqlite::Result<T> {
    parse(text, fmt).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}
