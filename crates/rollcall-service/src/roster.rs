//! In-memory roster of enrolled embeddings.
//!
//! Readers take an `Arc` snapshot and match against it; a mutation swaps
//! in a fresh `Arc`, so a snapshot taken before the mutation is never
//! affected mid-scan.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use thiserror::Error;

use rollcall_core::RosterEntry;

#[derive(Error, Debug)]
#[error("roll number {0} already present in roster")]
pub struct DuplicateRoll(pub String);

pub struct Roster {
    entries: RwLock<Arc<Vec<RosterEntry>>>,
}

impl Roster {
    pub fn new(entries: Vec<RosterEntry>) -> Self {
        Self {
            entries: RwLock::new(Arc::new(entries)),
        }
    }

    /// Point-in-time view for one match request.
    pub fn snapshot(&self) -> Arc<Vec<RosterEntry>> {
        Arc::clone(&self.read())
    }

    pub fn contains_roll(&self, roll_number: &str) -> bool {
        self.read().iter().any(|e| e.roll_number == roll_number)
    }

    pub fn insert(&self, entry: RosterEntry) -> Result<(), DuplicateRoll> {
        let mut guard = self.write();
        if guard.iter().any(|e| e.roll_number == entry.roll_number) {
            return Err(DuplicateRoll(entry.roll_number));
        }
        let mut next = guard.as_ref().clone();
        next.push(entry);
        *guard = Arc::new(next);
        Ok(())
    }

    /// Remove a student's entry. Returns whether anything was removed.
    pub fn remove(&self, student_id: &str) -> bool {
        let mut guard = self.write();
        let mut next = guard.as_ref().clone();
        let before = next.len();
        next.retain(|e| e.student_id != student_id);
        let removed = next.len() < before;
        if removed {
            *guard = Arc::new(next);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    // A poisoned lock only means a writer panicked mid-swap; the Arc
    // inside is still consistent, so recover the guard.
    fn read(&self) -> RwLockReadGuard<'_, Arc<Vec<RosterEntry>>> {
        self.entries.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Arc<Vec<RosterEntry>>> {
        self.entries.write().unwrap_or_else(|e| e.into_inner())
    }
}
