use crate::core::fingerprint::Fingerprint;
use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};

/// Hamming distance at or below which two different fingerprints are
/// considered the same photo. Tunable; observed cross-pipeline drift on
/// sample images stays well under it.
pub const DEFAULT_THRESHOLD: u32 = 6;

const MAX_DISTANCE: u32 = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SimilarityClass {
    Identical,
    NearDuplicate,
    Distinct,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comparison {
    pub distance: u32,
    pub class: SimilarityClass,
}

impl Comparison {
    /// Identical or near-duplicate.
    pub fn is_match(&self) -> bool {
        self.class != SimilarityClass::Distinct
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimilarityComparator {
    threshold: u32,
}

impl SimilarityComparator {
    pub fn new(threshold: u32) -> Result<Self> {
        if threshold > MAX_DISTANCE {
            return Err(EngineError::argument(format!(
                "threshold {} exceeds {} bits",
                threshold, MAX_DISTANCE
            )));
        }
        Ok(Self { threshold })
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn compare(&self, a: &Fingerprint, b: &Fingerprint) -> Comparison {
        self.classify(hamming_distance(a.as_bytes(), b.as_bytes()))
    }

    /// Compare raw fingerprint bytes, which must have equal length.
    pub fn compare_bytes(&self, a: &[u8], b: &[u8]) -> Result<Comparison> {
        if a.len() != b.len() {
            return Err(EngineError::argument(format!(
                "cannot compare fingerprints of {} and {} bytes",
                a.len(),
                b.len()
            )));
        }
        Ok(self.classify(hamming_distance(a, b)))
    }

    /// Compare two hex-encoded fingerprints as stored in the `files` table.
    pub fn compare_hex(&self, a: &str, b: &str) -> Result<Comparison> {
        let (a, b) = (a.trim(), b.trim());
        if a.len() != b.len() {
            return Err(EngineError::argument(format!(
                "cannot compare fingerprints of {} and {} hex characters",
                a.len(),
                b.len()
            )));
        }
        Ok(self.compare(&Fingerprint::from_hex(a)?, &Fingerprint::from_hex(b)?))
    }

    fn classify(&self, distance: u32) -> Comparison {
        let class = if distance == 0 {
            SimilarityClass::Identical
        } else if distance <= self.threshold {
            SimilarityClass::NearDuplicate
        } else {
            SimilarityClass::Distinct
        };
        Comparison { distance, class }
    }
}

impl Default for SimilarityComparator {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

fn hamming_distance(a: &[u8], b: &[u8]) -> u32 {
    a.iter().zip(b).map(|(x, y)| (x ^ y).count_ones()).sum()
}

/// Compare with the default threshold.
pub fn compare(a: &Fingerprint, b: &Fingerprint) -> Comparison {
    SimilarityComparator::default().compare(a, b)
}
