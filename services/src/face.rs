use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ServiceError;

/// Fixed-length feature vector representing a face. Produced by an external
/// extractor; this crate only stores and compares vectors, never raw media.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding(pub Vec<f32>);

impl Embedding {
    /// Euclidean distance between two embeddings. Vectors of different
    /// dimension can never belong to the same identity, so the distance is
    /// infinite.
    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
        if self.0.len() != other.0.len() {
            return f32::INFINITY;
        }
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| (a - b) * (a - b))
            .sum::<f32>()
            .sqrt()
    }
}

/// Accept iff the captured embedding is within `tolerance` of the enrolled
/// one. The boundary is inclusive: distance equal to the tolerance passes.
pub fn matches(captured: &Embedding, stored: &Embedding, tolerance: f32) -> bool {
    captured.euclidean_distance(stored) <= tolerance
}

/// Persistence of enrolled embeddings, keyed by student number. One vector
/// per student; `put` overwrites on re-enrollment.
pub trait EmbeddingStore: Send + Sync {
    fn put(&self, student_number: &str, embedding: &Embedding) -> Result<(), ServiceError>;
    fn get(&self, student_number: &str) -> Result<Option<Embedding>, ServiceError>;
    fn delete(&self, student_number: &str) -> Result<(), ServiceError>;
}

/// External capture capability: raw image bytes in, feature vector out.
/// Failures (no face detected, unreadable image) surface as `CaptureError`.
pub trait EmbeddingExtractor: Send + Sync {
    fn extract(&self, image: &[u8]) -> Result<Embedding, ServiceError>;
}

/// File-per-student embedding store: `<root>/<student_number>.json`.
pub struct FsEmbeddingStore {
    root: PathBuf,
}

impl FsEmbeddingStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, student_number: &str) -> PathBuf {
        self.root.join(format!("{student_number}.json"))
    }
}

impl EmbeddingStore for FsEmbeddingStore {
    fn put(&self, student_number: &str, embedding: &Embedding) -> Result<(), ServiceError> {
        fs::create_dir_all(&self.root)?;
        let json = serde_json::to_vec(embedding)?;
        fs::write(self.path_for(student_number), json)?;
        Ok(())
    }

    fn get(&self, student_number: &str) -> Result<Option<Embedding>, ServiceError> {
        let path = self.path_for(student_number);
        if !Path::new(&path).exists() {
            return Ok(None);
        }
        let bytes = fs::read(path)?;
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    fn delete(&self, student_number: &str) -> Result<(), ServiceError> {
        let path = self.path_for(student_number);
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_is_zero_for_identical_vectors() {
        let e = Embedding(vec![0.1, 0.2, 0.3]);
        assert_eq!(e.euclidean_distance(&e), 0.0);
    }

    #[test]
    fn dimension_mismatch_never_matches() {
        let a = Embedding(vec![0.0; 128]);
        let b = Embedding(vec![0.0; 64]);
        assert_eq!(a.euclidean_distance(&b), f32::INFINITY);
        assert!(!matches(&a, &b, 100.0));
    }

    #[test]
    fn tolerance_boundary_is_inclusive() {
        let a = Embedding(vec![0.0, 0.0]);
        let b = Embedding(vec![0.6, 0.0]);
        let d = a.euclidean_distance(&b);
        assert!(matches(&a, &b, d));
        assert!(!matches(&a, &b, d - 1e-4));
    }

    #[test]
    fn fs_store_roundtrip_overwrite_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsEmbeddingStore::new(dir.path());

        assert!(store.get("s1").unwrap().is_none());

        let first = Embedding(vec![1.0, 2.0]);
        store.put("s1", &first).unwrap();
        assert_eq!(store.get("s1").unwrap(), Some(first));

        // Re-enrollment overwrites.
        let second = Embedding(vec![3.0, 4.0]);
        store.put("s1", &second).unwrap();
        assert_eq!(store.get("s1").unwrap(), Some(second));

        store.delete("s1").unwrap();
        assert!(store.get("s1").unwrap().is_none());
        // Deleting an absent embedding is not an error.
        store.delete("s1").unwrap();
    }
}
