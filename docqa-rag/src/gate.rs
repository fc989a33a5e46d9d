//! Corpus-level relevance check run before any retrieval work.

use tracing::debug;

use crate::embedding::{dot, l2_norm};
use crate::index::VectorIndex;

/// Decides whether a query is about the corpus's subject matter at all.
///
/// The centroid of every indexed vector is computed once, at construction,
/// and a query is in-domain when its cosine similarity to that centroid
/// reaches the threshold. An empty index has no centroid and admits nothing.
#[derive(Debug, Clone)]
pub struct DomainGate {
    centroid: Option<Vec<f32>>,
    threshold: f32,
}

impl DomainGate {
    /// Build a gate for `index` with the given similarity threshold.
    pub fn new(index: &VectorIndex, threshold: f32) -> Self {
        let centroid = index.centroid().and_then(|mut c| {
            let norm = l2_norm(&c);
            if norm == 0.0 || !norm.is_finite() {
                return None;
            }
            c.iter_mut().for_each(|v| *v /= norm);
            Some(c)
        });
        Self { centroid, threshold }
    }

    /// The configured threshold.
    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Cosine similarity between `query` and the corpus centroid, or `None`
    /// when there is no centroid or the dimensions differ.
    pub fn similarity(&self, query: &[f32]) -> Option<f32> {
        let centroid = self.centroid.as_deref()?;
        if centroid.len() != query.len() {
            return None;
        }
        let norm = l2_norm(query);
        if norm == 0.0 {
            return None;
        }
        Some(dot(centroid, query) / norm)
    }

    /// Whether the query vector is close enough to the corpus to answer.
    pub fn is_in_domain(&self, query: &[f32]) -> bool {
        let similarity = self.similarity(query);
        debug!(?similarity, threshold = self.threshold, "domain gate");
        similarity.is_some_and(|s| s >= self.threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index(rows: &[[f32; 2]]) -> VectorIndex {
        let mut index = VectorIndex::new(2);
        for row in rows {
            index.push(row).unwrap();
        }
        index
    }

    #[test]
    fn query_near_centroid_is_in_domain() {
        let gate = DomainGate::new(&index(&[[1.0, 0.0], [0.0, 1.0]]), 0.55);
        let diagonal = std::f32::consts::FRAC_1_SQRT_2;
        assert!(gate.is_in_domain(&[diagonal, diagonal]));
        assert!(gate.is_in_domain(&[1.0, 0.0]));
        assert!(!gate.is_in_domain(&[-1.0, 0.0]));
    }

    #[test]
    fn empty_index_admits_nothing() {
        let gate = DomainGate::new(&VectorIndex::new(2), -1.0);
        assert!(!gate.is_in_domain(&[1.0, 0.0]));
    }

    #[test]
    fn opposing_vectors_cancel_to_no_centroid() {
        let gate = DomainGate::new(&index(&[[1.0, 0.0], [-1.0, 0.0]]), -1.0);
        assert_eq!(gate.similarity(&[1.0, 0.0]), None);
    }
}
