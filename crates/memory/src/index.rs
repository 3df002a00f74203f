//! Nearest-neighbor index over chunk embeddings.

use neurorag_common::{RagError, Result};
use std::cmp::Ordering;

/// A query hit: where the vector sits in the index, which chunk it belongs
/// to, and how far it is from the query.
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor {
    pub position: usize,
    pub chunk_id: String,
    pub distance: f32,
}

/// k-nearest-neighbor index that can be rebuilt from a full vector set.
///
/// Implementations may be approximate; callers only rely on results being
/// ordered by ascending distance.
pub trait VectorIndex: Send + Sync {
    /// Replace the index contents with `vectors`, in order.
    fn rebuild(&mut self, vectors: Vec<(String, Vec<f32>)>);

    /// Up to `k` neighbors of `vector`, closest first.
    ///
    /// `k` is clamped to the number of indexed vectors.
    fn query(&self, vector: &[f32], k: usize) -> Result<Vec<Neighbor>>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Exhaustive Euclidean scan.
#[derive(Debug, Default)]
pub struct FlatIndex {
    ids: Vec<String>,
    vectors: Vec<Vec<f32>>,
}

impl FlatIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_vectors(vectors: Vec<(String, Vec<f32>)>) -> Self {
        let mut index = Self::new();
        index.rebuild(vectors);
        index
    }
}

impl VectorIndex for FlatIndex {
    fn rebuild(&mut self, vectors: Vec<(String, Vec<f32>)>) {
        let (ids, vectors): (Vec<String>, Vec<Vec<f32>>) = vectors.into_iter().unzip();
        self.ids = ids;
        self.vectors = vectors;
    }

    fn query(&self, vector: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        if self.vectors.is_empty() {
            return Err(RagError::EmptyIndex);
        }
        if let Some(dim) = self.vectors.first().map(Vec::len) {
            if vector.len() != dim {
                return Err(RagError::Validation(format!(
                    "query vector has {} dimensions, index holds {}-dim vectors",
                    vector.len(),
                    dim
                )));
            }
        }

        let k = k.min(self.vectors.len());
        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(pos, v)| (pos, euclidean_distance(vector, v)))
            .collect();

        // Stable sort keeps insertion order among equal distances.
        scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(position, distance)| Neighbor {
                position,
                chunk_id: self.ids[position].clone(),
                distance,
            })
            .collect())
    }

    fn len(&self) -> usize {
        self.vectors.len()
    }
}

pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, v: &[f32]) -> (String, Vec<f32>) {
        (id.to_string(), v.to_vec())
    }

    #[test]
    fn test_query_empty_index() {
        let index = FlatIndex::new();
        let err = index.query(&[1.0, 0.0], 5).unwrap_err();
        assert!(matches!(err, RagError::EmptyIndex));
    }

    #[test]
    fn test_query_orders_by_distance() {
        let index = FlatIndex::from_vectors(vec![
            entry("far", &[10.0, 10.0]),
            entry("near", &[1.0, 0.0]),
            entry("mid", &[3.0, 4.0]),
        ]);

        let hits = index.query(&[0.0, 0.0], 3).unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["near", "mid", "far"]);
        assert_eq!(hits[0].position, 1);
        assert!((hits[1].distance - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_k_is_clamped_to_size() {
        let index = FlatIndex::from_vectors(vec![entry("a", &[0.0]), entry("b", &[1.0])]);
        let hits = index.query(&[0.0], 5).unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn test_rebuild_replaces_contents() {
        let mut index = FlatIndex::from_vectors(vec![entry("a", &[0.0]), entry("b", &[1.0])]);
        index.rebuild(vec![entry("c", &[2.0])]);
        assert_eq!(index.len(), 1);

        let hits = index.query(&[0.0], 5).unwrap();
        assert_eq!(hits[0].chunk_id, "c");
        assert_eq!(hits[0].position, 0);
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let index = FlatIndex::from_vectors(vec![entry("a", &[0.0, 1.0])]);
        assert!(index.query(&[0.0], 1).is_err());
    }

    #[test]
    fn test_euclidean_distance() {
        assert_eq!(euclidean_distance(&[0.0, 0.0], &[3.0, 4.0]), 5.0);
        assert_eq!(euclidean_distance(&[1.0, 1.0], &[1.0, 1.0]), 0.0);
    }
}
