//! Embedding service trait and vector normalization.

use async_trait::async_trait;

use crate::error::{RagError, Result};

/// A service that generates vector embeddings from text input.
///
/// Implementations wrap a specific embedding backend behind a unified async
/// interface. The default [`embed_batch`](EmbeddingService::embed_batch)
/// implementation calls [`embed`](EmbeddingService::embed) sequentially;
/// backends that support native batching should override it.
///
/// Returned vectors need not be normalized; the pipeline normalizes every
/// vector with [`normalize`] before storing or comparing it.
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::EmbeddingService;
///
/// let service = MyEmbeddingService::new();
/// let embedding = service.embed("hello world").await?;
/// assert_eq!(embedding.len(), service.dimensions());
/// ```
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    /// Generate an embedding vector for a single text input.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embedding vectors for a batch of text inputs, in input order.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// Return the dimensionality of embeddings produced by this service.
    fn dimensions(&self) -> usize;
}

/// Scale `vector` to unit L2 length in place.
///
/// # Errors
///
/// Returns [`RagError::EmbeddingService`] if the vector is empty or its norm
/// is zero or not finite, since such a vector has no direction to compare.
pub fn normalize(vector: &mut [f32]) -> Result<()> {
    let norm = l2_norm(vector);
    if vector.is_empty() || !norm.is_finite() || norm == 0.0 {
        return Err(RagError::embedding(
            "normalize",
            format!("cannot normalize vector of length {} with norm {norm}", vector.len()),
        ));
    }
    for value in vector.iter_mut() {
        *value /= norm;
    }
    Ok(())
}

/// Euclidean length of a vector.
pub fn l2_norm(vector: &[f32]) -> f32 {
    vector.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Dot product of two equally sized vectors; cosine similarity for unit vectors.
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}
