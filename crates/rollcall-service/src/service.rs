use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime};
use serde::Serialize;

use rollcall_core::{MatchDecision, Matcher, NearestMatcher, RosterEntry};
use rollcall_store::{AttendanceDb, StoreError, Student};

use crate::engine::AnalyzerHandle;
use crate::error::{EnrollError, Fault, MarkError};
use crate::roster::Roster;

/// A successful match-and-record: who was recognized and how close the
/// probe was.
#[derive(Debug, Clone, Serialize)]
pub struct AttendanceOutcome {
    pub record_id: String,
    pub student_id: String,
    pub student_name: String,
    pub distance: f32,
}

/// The attendance service: enrollment validation, nearest-neighbor
/// matching, and idempotent recording.
pub struct AttendanceService {
    db: Arc<AttendanceDb>,
    roster: Roster,
    analyzer: AnalyzerHandle,
    matcher: NearestMatcher,
    threshold: f32,
}

impl AttendanceService {
    /// Build the service, loading the roster from the database.
    pub fn new(
        db: Arc<AttendanceDb>,
        analyzer: AnalyzerHandle,
        threshold: f32,
    ) -> Result<Self, Fault> {
        let roster = Roster::new(db.load_roster().map_err(Fault::Store)?);
        tracing::info!(students = roster.len(), threshold, "attendance service ready");
        Ok(Self {
            db,
            roster,
            analyzer,
            matcher: NearestMatcher,
            threshold,
        })
    }

    /// Enroll a new student from a single-face image.
    ///
    /// Zero or multiple detected faces refuse the enrollment without
    /// touching the store or the roster. The roll-number UNIQUE
    /// constraint is the duplicate authority; the roster check is only a
    /// cheap early reject.
    pub async fn enroll(
        &self,
        name: &str,
        roll_number: &str,
        image: Vec<u8>,
        image_ref: Option<&str>,
    ) -> Result<Student, EnrollError> {
        if self.roster.contains_roll(roll_number) {
            return Err(EnrollError::DuplicateRollNumber {
                roll_number: roll_number.to_string(),
            });
        }

        let mut faces = self.analyzer.detect(image).await.map_err(Fault::Engine)?;
        let face = match faces.len() {
            0 => return Err(EnrollError::NoFaceDetected),
            1 => faces.remove(0),
            count => {
                tracing::warn!(count, roll_number, "ambiguous enrollment image refused");
                return Err(EnrollError::AmbiguousEnrollment { count });
            }
        };

        let student = self
            .db
            .add_student(name, roll_number, &face.embedding, image_ref)
            .map_err(|e| match e {
                StoreError::RollNumberTaken(roll_number) => {
                    EnrollError::DuplicateRollNumber { roll_number }
                }
                other => EnrollError::Fault(Fault::Store(other)),
            })?;

        self.roster
            .insert(RosterEntry {
                student_id: student.id.clone(),
                name: student.name.clone(),
                roll_number: student.roll_number.clone(),
                embedding: face.embedding,
            })
            .map_err(|dup| EnrollError::DuplicateRollNumber { roll_number: dup.0 })?;

        Ok(student)
    }

    /// Match a probe image against the roster and record presence for the
    /// recognized student.
    ///
    /// Matches against one roster snapshot taken before analysis; no lock
    /// is held while the analyzer runs. When the probe contains several
    /// faces, every face is scored and the globally closest decision
    /// wins.
    pub async fn match_and_record(
        &self,
        image: Vec<u8>,
        session_id: &str,
        date: NaiveDate,
        time: NaiveTime,
    ) -> Result<AttendanceOutcome, MarkError> {
        let snapshot = self.roster.snapshot();

        let faces = self.analyzer.detect(image).await.map_err(Fault::Engine)?;
        if faces.is_empty() {
            return Err(MarkError::NoFaceDetected);
        }
        if snapshot.is_empty() {
            return Err(MarkError::EmptyRoster);
        }

        // compare() yields None only for an empty roster, so a missing
        // minimum here can only mean the snapshot had no entries.
        let decision = faces
            .iter()
            .filter_map(|f| self.matcher.compare(&f.embedding, &snapshot, self.threshold))
            .min_by(|a, b| a.distance().total_cmp(&b.distance()))
            .ok_or(MarkError::EmptyRoster)?;

        // The decision's id came out of this snapshot, so the lookup
        // cannot miss; the id itself is the fallback label.
        let name_of = |id: &str| {
            snapshot
                .iter()
                .find(|e| e.student_id == id)
                .map(|e| e.name.clone())
                .unwrap_or_else(|| id.to_string())
        };

        match decision {
            MatchDecision::Matched {
                student_id,
                distance,
            } => {
                let student_name = name_of(&student_id);
                let record = self
                    .db
                    .mark_attendance(&student_id, session_id, date, time)
                    .map_err(|e| match e {
                        StoreError::AttendanceExists { .. } => MarkError::DuplicateAttendance {
                            student_name: student_name.clone(),
                            date,
                        },
                        StoreError::SessionNotFound(session_id) => {
                            MarkError::UnknownSession { session_id }
                        }
                        other => MarkError::Fault(Fault::Store(other)),
                    })?;

                tracing::info!(
                    student_id = %student_id,
                    session_id,
                    date = %date,
                    distance,
                    "attendance marked"
                );
                Ok(AttendanceOutcome {
                    record_id: record.id,
                    student_id,
                    student_name,
                    distance,
                })
            }
            MatchDecision::Rejected {
                student_id,
                distance,
            } => {
                tracing::debug!(
                    best_candidate = %student_id,
                    distance,
                    threshold = self.threshold,
                    "probe rejected"
                );
                Err(MarkError::NoMatch {
                    best_name: name_of(&student_id),
                    best_distance: distance,
                })
            }
        }
    }

    /// Remove a student from the store and the roster, cascading to their
    /// attendance records.
    pub fn remove_student(&self, student_id: &str) -> Result<(), StoreError> {
        self.db.remove_student(student_id)?;
        self.roster.remove(student_id);
        Ok(())
    }

    pub fn roster_size(&self) -> usize {
        self.roster.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::spawn_analyzer;
    use rollcall_core::{
        AnalyzerError, DetectedFace, Embedding, FaceAnalyzer, FaceRegion, EMBEDDING_DIM,
    };

    /// Deterministic analyzer: every byte of the image becomes one face
    /// whose embedding is seeded by that byte (value / 100 in the first
    /// component). An empty image has no faces.
    struct StubAnalyzer;

    impl FaceAnalyzer for StubAnalyzer {
        fn detect_faces(&mut self, image: &[u8]) -> Result<Vec<DetectedFace>, AnalyzerError> {
            Ok(image
                .iter()
                .map(|&b| {
                    let mut values = vec![0.0f32; EMBEDDING_DIM];
                    values[0] = b as f32 / 100.0;
                    DetectedFace {
                        region: FaceRegion {
                            x: 0.0,
                            y: 0.0,
                            width: 64.0,
                            height: 64.0,
                            confidence: 0.99,
                        },
                        embedding: Embedding::new(values).unwrap(),
                    }
                })
                .collect())
        }
    }

    fn test_service() -> (tempfile::TempDir, Arc<AttendanceDb>, AttendanceService) {
        let dir = tempfile::TempDir::new().expect("create temp dir");
        let db = Arc::new(AttendanceDb::open(&dir.path().join("attendance.db")).expect("open db"));
        let service = AttendanceService::new(Arc::clone(&db), spawn_analyzer(StubAnalyzer), 0.6)
            .expect("build service");
        (dir, db, service)
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 10).unwrap()
    }

    fn nine_am() -> NaiveTime {
        NaiveTime::from_hms_opt(9, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn enroll_and_match() {
        let (_dir, db, service) = test_service();
        let session = db.add_session("CS101", "Data Structures", "Dr. Iyer").unwrap();

        let student = service
            .enroll("Asha Rao", "21CS001", vec![10], None)
            .await
            .expect("enroll");
        assert_eq!(service.roster_size(), 1);

        // Probe seeded at 12 is 0.02 away from the enrolled 10.
        let outcome = service
            .match_and_record(vec![12], &session.id, day(), nine_am())
            .await
            .expect("match and record");
        assert_eq!(outcome.student_id, student.id);
        assert_eq!(outcome.student_name, "Asha Rao");
        assert!((outcome.distance - 0.02).abs() < 1e-5);
        assert_eq!(db.records_on_date(day()).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn second_mark_same_day_is_duplicate() {
        let (_dir, db, service) = test_service();
        let session = db.add_session("CS101", "Data Structures", "Dr. Iyer").unwrap();
        service
            .enroll("Asha Rao", "21CS001", vec![10], None)
            .await
            .unwrap();

        service
            .match_and_record(vec![10], &session.id, day(), nine_am())
            .await
            .expect("first mark");
        let err = service
            .match_and_record(vec![10], &session.id, day(), nine_am())
            .await
            .unwrap_err();

        match err {
            MarkError::DuplicateAttendance {
                student_name,
                date,
            } => {
                assert_eq!(student_name, "Asha Rao");
                assert_eq!(date, day());
            }
            other => panic!("expected duplicate, got {other:?}"),
        }
        assert_eq!(db.records_on_date(day()).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn enroll_refuses_zero_and_multiple_faces() {
        let (_dir, db, service) = test_service();

        let err = service
            .enroll("Nobody", "21CS009", vec![], None)
            .await
            .unwrap_err();
        assert!(matches!(err, EnrollError::NoFaceDetected));

        let err = service
            .enroll("Crowd", "21CS010", vec![10, 30], None)
            .await
            .unwrap_err();
        assert!(matches!(err, EnrollError::AmbiguousEnrollment { count: 2 }));

        // Neither attempt touched the store or the roster.
        assert!(db.list_students().unwrap().is_empty());
        assert_eq!(service.roster_size(), 0);
    }

    #[tokio::test]
    async fn duplicate_roll_number_keeps_original_embedding() {
        let (_dir, _db, service) = test_service();
        service
            .enroll("Asha Rao", "21CS001", vec![10], None)
            .await
            .unwrap();

        let err = service
            .enroll("Impostor", "21CS001", vec![90], None)
            .await
            .unwrap_err();
        assert!(
            matches!(err, EnrollError::DuplicateRollNumber { ref roll_number } if roll_number == "21CS001")
        );
        assert_eq!(service.roster_size(), 1);

        // A probe near the original embedding still resolves to the
        // original student, so the stored vector was not replaced.
        let snapshot = service.roster.snapshot();
        assert_eq!(snapshot[0].name, "Asha Rao");
        assert_eq!(snapshot[0].embedding.values()[0], 0.1);
    }

    #[tokio::test]
    async fn probe_without_face_and_empty_roster() {
        let (_dir, db, service) = test_service();
        let session = db.add_session("CS101", "Data Structures", "Dr. Iyer").unwrap();

        let err = service
            .match_and_record(vec![10], &session.id, day(), nine_am())
            .await
            .unwrap_err();
        assert!(matches!(err, MarkError::EmptyRoster));

        service
            .enroll("Asha Rao", "21CS001", vec![10], None)
            .await
            .unwrap();
        let err = service
            .match_and_record(vec![], &session.id, day(), nine_am())
            .await
            .unwrap_err();
        assert!(matches!(err, MarkError::NoFaceDetected));
    }

    #[tokio::test]
    async fn rejection_names_the_closest_candidate() {
        let (_dir, db, service) = test_service();
        let session = db.add_session("CS101", "Data Structures", "Dr. Iyer").unwrap();
        service
            .enroll("Asha Rao", "21CS001", vec![10], None)
            .await
            .unwrap();
        service
            .enroll("Vikram Shah", "21CS002", vec![100], None)
            .await
            .unwrap();

        // Probe at 2.4 is 1.4 from Vikram (1.0) and 2.3 from Asha.
        let err = service
            .match_and_record(vec![240], &session.id, day(), nine_am())
            .await
            .unwrap_err();
        match err {
            MarkError::NoMatch {
                best_name,
                best_distance,
            } => {
                assert_eq!(best_name, "Vikram Shah");
                assert!((best_distance - 1.4).abs() < 1e-5);
            }
            other => panic!("expected no-match, got {other:?}"),
        }
        assert!(db.records_on_date(day()).unwrap().is_empty());
    }

    #[tokio::test]
    async fn multi_face_probe_takes_the_closest_decision() {
        let (_dir, db, service) = test_service();
        let session = db.add_session("CS101", "Data Structures", "Dr. Iyer").unwrap();
        service
            .enroll("Asha Rao", "21CS001", vec![10], None)
            .await
            .unwrap();
        service
            .enroll("Vikram Shah", "21CS002", vec![100], None)
            .await
            .unwrap();

        // Two faces in the probe; the one at 98 is closest to Vikram.
        let outcome = service
            .match_and_record(vec![60, 98], &session.id, day(), nine_am())
            .await
            .expect("match");
        assert_eq!(outcome.student_name, "Vikram Shah");
    }

    #[tokio::test]
    async fn unknown_session_is_reported_as_such() {
        let (_dir, _db, service) = test_service();
        service
            .enroll("Asha Rao", "21CS001", vec![10], None)
            .await
            .unwrap();

        let err = service
            .match_and_record(vec![10], "missing-session", day(), nine_am())
            .await
            .unwrap_err();
        assert!(matches!(err, MarkError::UnknownSession { .. }));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_marks_yield_one_success() {
        let (_dir, db, service) = test_service();
        let session = db.add_session("CS101", "Data Structures", "Dr. Iyer").unwrap();
        service
            .enroll("Asha Rao", "21CS001", vec![10], None)
            .await
            .unwrap();

        let service = Arc::new(service);
        let mut handles = Vec::new();
        for _ in 0..6 {
            let service = Arc::clone(&service);
            let session_id = session.id.clone();
            handles.push(tokio::spawn(async move {
                service
                    .match_and_record(vec![10], &session_id, day(), nine_am())
                    .await
            }));
        }

        let mut successes = 0;
        let mut duplicates = 0;
        for h in handles {
            match h.await.unwrap() {
                Ok(_) => successes += 1,
                Err(MarkError::DuplicateAttendance { .. }) => duplicates += 1,
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }
        assert_eq!(successes, 1);
        assert_eq!(duplicates, 5);
        assert_eq!(db.records_on_date(day()).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn removing_a_student_empties_the_roster() {
        let (_dir, db, service) = test_service();
        let session = db.add_session("CS101", "Data Structures", "Dr. Iyer").unwrap();
        let student = service
            .enroll("Asha Rao", "21CS001", vec![10], None)
            .await
            .unwrap();

        service.remove_student(&student.id).expect("remove");
        assert_eq!(service.roster_size(), 0);

        let err = service
            .match_and_record(vec![10], &session.id, day(), nine_am())
            .await
            .unwrap_err();
        assert!(matches!(err, MarkError::EmptyRoster));
    }
}
