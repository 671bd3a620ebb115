//! Database schema.
//!
//! Uniqueness lives in the schema: `students.roll_number`,
//! `sessions.code`, and the ledger key `(student_id, session_id, date)`
//! are all UNIQUE so concurrent writers race against SQLite, not against
//! application-level checks.

use rusqlite::Connection;

/// Apply the full schema. Idempotent.
pub fn apply_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS students (
            id          TEXT PRIMARY KEY,
            name        TEXT NOT NULL,
            roll_number TEXT NOT NULL UNIQUE,
            embedding   BLOB NOT NULL,
            image_ref   TEXT,
            created_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS sessions (
            id          TEXT PRIMARY KEY,
            code        TEXT NOT NULL UNIQUE,
            name        TEXT NOT NULL,
            faculty     TEXT NOT NULL,
            created_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS attendance (
            id          TEXT PRIMARY KEY,
            student_id  TEXT NOT NULL REFERENCES students (id),
            session_id  TEXT NOT NULL REFERENCES sessions (id),
            date        TEXT NOT NULL,
            time        TEXT NOT NULL,
            status      TEXT NOT NULL
        );

        CREATE UNIQUE INDEX IF NOT EXISTS idx_attendance_once_per_day
            ON attendance (student_id, session_id, date);",
    )
}
