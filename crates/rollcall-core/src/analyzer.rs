//! Face-analysis capability consumed by the service.
//!
//! Region detection and embedding extraction are supplied by a
//! collaborator; the core only defines the contract.

use crate::types::Embedding;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalyzerError {
    #[error("image decode failed: {0}")]
    Decode(String),
    #[error("inference failed: {0}")]
    Inference(String),
}

/// Location and confidence of a detected face within an image.
#[derive(Debug, Clone)]
pub struct FaceRegion {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
}

/// One detected face: where it is and what it embeds to.
#[derive(Debug, Clone)]
pub struct DetectedFace {
    pub region: FaceRegion,
    pub embedding: Embedding,
}

/// Detects face regions in raw image bytes and extracts one embedding per
/// region. Implementations may hold mutable inference state; the service
/// serializes access on a dedicated engine thread.
pub trait FaceAnalyzer {
    fn detect_faces(&mut self, image: &[u8]) -> Result<Vec<DetectedFace>, AnalyzerError>;
}
