//! rollcall-core — Embedding types and the nearest-neighbor matcher.
//!
//! Pure decision logic: no I/O, no storage, no clock. Face detection and
//! embedding extraction are consumed through the [`FaceAnalyzer`] trait.

pub mod analyzer;
pub mod types;

pub use analyzer::{AnalyzerError, DetectedFace, FaceAnalyzer, FaceRegion};
pub use types::{
    DimensionMismatch, Embedding, MatchDecision, Matcher, NearestMatcher, RosterEntry,
    DEFAULT_MATCH_THRESHOLD, EMBEDDING_DIM,
};
