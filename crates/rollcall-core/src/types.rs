use serde::{Deserialize, Serialize};
use thiserror::Error;

/// System-wide embedding dimension. Every stored and probed vector must
/// have exactly this many components.
pub const EMBEDDING_DIM: usize = 128;

/// Maximum embedding distance accepted as a positive identity match.
pub const DEFAULT_MATCH_THRESHOLD: f32 = 0.6;

#[derive(Error, Debug)]
#[error("embedding has {got} dimensions, expected {expected}")]
pub struct DimensionMismatch {
    pub expected: usize,
    pub got: usize,
}

/// Fixed-length face embedding vector.
///
/// Construction validates the dimension up front, so distance computation
/// never has to deal with ragged vectors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Embedding {
    values: Vec<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Result<Self, DimensionMismatch> {
        if values.len() != EMBEDDING_DIM {
            return Err(DimensionMismatch {
                expected: EMBEDDING_DIM,
                got: values.len(),
            });
        }
        Ok(Self { values })
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Compute Euclidean distance to another embedding.
    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }

    /// Serialize to a little-endian `f32` byte blob for storage.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        self.values.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    /// Deserialize from a little-endian `f32` byte blob.
    ///
    /// Rejects blobs of the wrong length so a malformed row fails at the
    /// storage boundary instead of inside a distance computation.
    pub fn from_le_bytes(blob: &[u8]) -> Result<Self, DimensionMismatch> {
        if blob.len() != EMBEDDING_DIM * std::mem::size_of::<f32>() {
            return Err(DimensionMismatch {
                expected: EMBEDDING_DIM,
                got: blob.len() / std::mem::size_of::<f32>(),
            });
        }
        let values = blob
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        Ok(Self { values })
    }
}

/// One enrolled identity as seen by the matcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RosterEntry {
    pub student_id: String,
    pub name: String,
    pub roll_number: String,
    pub embedding: Embedding,
}

/// Outcome of comparing a probe embedding against a roster snapshot.
///
/// `Rejected` carries the closest-but-over-threshold candidate for
/// diagnostic messaging.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchDecision {
    Matched { student_id: String, distance: f32 },
    Rejected { student_id: String, distance: f32 },
}

impl MatchDecision {
    pub fn distance(&self) -> f32 {
        match self {
            Self::Matched { distance, .. } | Self::Rejected { distance, .. } => *distance,
        }
    }

    pub fn student_id(&self) -> &str {
        match self {
            Self::Matched { student_id, .. } | Self::Rejected { student_id, .. } => student_id,
        }
    }

    pub fn is_match(&self) -> bool {
        matches!(self, Self::Matched { .. })
    }
}

/// Strategy for comparing a probe embedding against a roster of enrolled
/// students. Holds no state across calls.
pub trait Matcher {
    /// Returns `None` only for an empty roster.
    fn compare(
        &self,
        probe: &Embedding,
        roster: &[RosterEntry],
        threshold: f32,
    ) -> Option<MatchDecision>;
}

/// Euclidean nearest-neighbor matcher.
///
/// Always scans the full roster and decides on the global minimum
/// distance, so enumeration order never affects the outcome. Equal
/// distances break to the lowest student id.
pub struct NearestMatcher;

impl Matcher for NearestMatcher {
    fn compare(
        &self,
        probe: &Embedding,
        roster: &[RosterEntry],
        threshold: f32,
    ) -> Option<MatchDecision> {
        let mut best: Option<(&RosterEntry, f32)> = None;

        for entry in roster {
            let distance = probe.euclidean_distance(&entry.embedding);
            let closer = match best {
                None => true,
                Some((prev, prev_distance)) => {
                    distance < prev_distance
                        || (distance == prev_distance && entry.student_id < prev.student_id)
                }
            };
            if closer {
                best = Some((entry, distance));
            }
        }

        let (entry, distance) = best?;
        tracing::debug!(
            student_id = %entry.student_id,
            distance,
            threshold,
            "nearest roster candidate"
        );

        // Strictly below threshold counts as a match.
        Some(if distance < threshold {
            MatchDecision::Matched {
                student_id: entry.student_id.clone(),
                distance,
            }
        } else {
            MatchDecision::Rejected {
                student_id: entry.student_id.clone(),
                distance,
            }
        })
    }
}
