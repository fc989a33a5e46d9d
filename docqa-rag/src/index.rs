//! Flat vector index over unit-normalized embeddings.
//!
//! This module provides [`VectorIndex`], an exhaustive nearest-neighbour index
//! stored as one contiguous row-major buffer, and [`KnowledgeIndex`], which
//! pairs the vectors with the chunk metadata they were built from. Row `i` of
//! the vectors always describes `metadata[i]`; the pair is only ever
//! constructed, loaded, and replaced as a unit.

use std::cmp::Ordering;

use crate::document::{Chunk, SearchResult};
use crate::embedding::{dot, l2_norm};
use crate::error::{RagError, Result};

/// Vectors whose norm strays further than this from 1.0 are rejected.
pub const NORM_TOLERANCE: f32 = 1e-3;

/// An append-only collection of fixed-dimension unit vectors.
///
/// Similarity between two rows is their dot product, which for unit vectors
/// is exactly the cosine similarity (and equals `1 - d/2` for the squared
/// Euclidean distance `d`).
#[derive(Debug, Clone, PartialEq)]
pub struct VectorIndex {
    dimensions: usize,
    data: Vec<f32>,
}

impl VectorIndex {
    /// Create an empty index for vectors of the given dimension.
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions, data: Vec::new() }
    }

    /// Create an index from a row-major buffer of `dimensions`-wide rows.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::IndexLoad`] if `dimensions` is zero, the buffer
    /// length is not a multiple of it, or any row is not unit length.
    pub fn from_raw(dimensions: usize, data: Vec<f32>) -> Result<Self> {
        if dimensions == 0 {
            return Err(RagError::IndexLoad("vector dimension must be greater than zero".into()));
        }
        if data.len() % dimensions != 0 {
            return Err(RagError::IndexLoad(format!(
                "buffer of {} values is not a whole number of {dimensions}-dimensional rows",
                data.len()
            )));
        }
        let index = Self { dimensions, data };
        if let Some((row, norm)) = index.rows().map(l2_norm).enumerate().find(|(_, n)| !is_unit(*n))
        {
            return Err(RagError::IndexLoad(format!("row {row} is not unit length (norm {norm})")));
        }
        Ok(index)
    }

    /// Append a unit vector as the next row and return its row number.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::EmbeddingService`] if the vector has the wrong
    /// dimension or is not unit length.
    pub fn push(&mut self, vector: &[f32]) -> Result<usize> {
        self.check_query(vector)?;
        let norm = l2_norm(vector);
        if !is_unit(norm) {
            return Err(RagError::embedding(
                "index",
                format!("vector is not unit length (norm {norm})"),
            ));
        }
        self.data.extend_from_slice(vector);
        Ok(self.len() - 1)
    }

    /// Dimension of every row.
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.data.len() / self.dimensions.max(1)
    }

    /// Whether the index has no rows.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The vector stored at `row`, if any.
    pub fn row(&self, row: usize) -> Option<&[f32]> {
        let start = row.checked_mul(self.dimensions)?;
        self.data.get(start..start.checked_add(self.dimensions)?)
    }

    /// Iterate rows in order.
    pub fn rows(&self) -> impl Iterator<Item = &[f32]> {
        self.data.chunks_exact(self.dimensions.max(1))
    }

    /// The raw row-major buffer.
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Mean of all rows, or `None` for an empty index.
    pub fn centroid(&self) -> Option<Vec<f32>> {
        if self.is_empty() {
            return None;
        }
        let mut sum = vec![0.0f64; self.dimensions];
        for row in self.rows() {
            for (acc, value) in sum.iter_mut().zip(row) {
                *acc += f64::from(*value);
            }
        }
        let count = self.len() as f64;
        Some(sum.into_iter().map(|v| (v / count) as f32).collect())
    }

    /// The `k` rows most similar to `query`, as `(row, similarity)` pairs.
    ///
    /// Results are ordered by descending similarity, ties broken by ascending
    /// row number.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::EmbeddingService`] if `query` has the wrong dimension.
    pub fn nearest(&self, query: &[f32], k: usize) -> Result<Vec<(usize, f32)>> {
        self.check_query(query)?;
        let mut scored: Vec<(usize, f32)> =
            self.rows().enumerate().map(|(row, vector)| (row, dot(vector, query))).collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal).then(a.0.cmp(&b.0)));
        scored.truncate(k);
        Ok(scored)
    }

    fn check_query(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimensions {
            return Err(RagError::embedding(
                "index",
                format!("expected {} dimensions, got {}", self.dimensions, vector.len()),
            ));
        }
        Ok(())
    }
}

fn is_unit(norm: f32) -> bool {
    (norm - 1.0).abs() < NORM_TOLERANCE
}

/// A vector index together with its aligned chunk metadata table.
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::KnowledgeIndex;
///
/// let index = KnowledgeIndex::load("embeddings/vectors.bin", "embeddings/metadata.json")?;
/// let hits = index.search(&query_vector, 10, 0.6)?;
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct KnowledgeIndex {
    vectors: VectorIndex,
    metadata: Vec<Chunk>,
}

impl KnowledgeIndex {
    /// Pair `vectors` with `metadata`, reassigning every chunk id to its row.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::IndexLoad`] if the row counts differ.
    pub fn new(vectors: VectorIndex, mut metadata: Vec<Chunk>) -> Result<Self> {
        if vectors.len() != metadata.len() {
            return Err(RagError::IndexLoad(format!(
                "vector index has {} rows but metadata has {} entries",
                vectors.len(),
                metadata.len()
            )));
        }
        for (row, chunk) in metadata.iter_mut().enumerate() {
            chunk.id = row;
        }
        Ok(Self { vectors, metadata })
    }

    /// The vector rows.
    pub fn vectors(&self) -> &VectorIndex {
        &self.vectors
    }

    /// The metadata table, in row order.
    pub fn metadata(&self) -> &[Chunk] {
        &self.metadata
    }

    /// Number of indexed chunks.
    pub fn len(&self) -> usize {
        self.metadata.len()
    }

    /// Whether the index holds no chunks.
    pub fn is_empty(&self) -> bool {
        self.metadata.is_empty()
    }

    /// The chunks most similar to `query`, keeping at most `k` hits whose
    /// similarity is at least `threshold`.
    ///
    /// An empty result is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::EmbeddingService`] if `query` has the wrong dimension.
    pub fn search(&self, query: &[f32], k: usize, threshold: f32) -> Result<Vec<SearchResult>> {
        Ok(self
            .vectors
            .nearest(query, k)?
            .into_iter()
            .filter(|(_, score)| *score >= threshold)
            .map(|(row, score)| SearchResult { chunk: self.metadata[row].clone(), score })
            .collect())
    }
}
