//! Index construction: chunks → embeddings → [`KnowledgeIndex`].

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::document::Chunk;
use crate::embedding::{EmbeddingService, l2_norm, normalize};
use crate::error::{RagError, Result};
use crate::index::{KnowledgeIndex, VectorIndex};

/// Default number of chunk texts per embedding request.
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Number of leading vectors whose raw norm is logged at debug level.
const SAMPLE_NORMS: usize = 5;

/// Embeds chunks in fixed-size batches and assembles them into an index.
///
/// The build is all-or-nothing: any failed or malformed batch aborts it and
/// nothing is returned for persisting.
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::{IndexBuilder, read_corpus};
///
/// let chunks = read_corpus("chunks/chunks.json", "Consumer Report 2025")?;
/// let index = IndexBuilder::new(Arc::new(embedder)).batch_size(10).build(chunks).await?;
/// index.save("embeddings/vectors.bin", "embeddings/metadata.json")?;
/// ```
pub struct IndexBuilder {
    embedder: Arc<dyn EmbeddingService>,
    batch_size: usize,
}

impl IndexBuilder {
    /// Create a builder using [`DEFAULT_BATCH_SIZE`].
    pub fn new(embedder: Arc<dyn EmbeddingService>) -> Self {
        Self { embedder, batch_size: DEFAULT_BATCH_SIZE }
    }

    /// Set the number of texts per embedding request.
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Embed every chunk and return the aligned index.
    ///
    /// Chunk ids are reassigned to their row numbers, which follow input order.
    ///
    /// # Errors
    ///
    /// - [`RagError::Config`] if the batch size is zero or `chunks` is empty.
    /// - [`RagError::EmbeddingService`] if a batch call fails, returns the
    ///   wrong number of vectors, or returns a vector with no direction or
    ///   whose dimension differs from the first vector's.
    pub async fn build(&self, chunks: Vec<Chunk>) -> Result<KnowledgeIndex> {
        if self.batch_size == 0 {
            return Err(RagError::Config("batch_size must be greater than zero".into()));
        }
        if chunks.is_empty() {
            return Err(RagError::Config("cannot build an index from an empty corpus".into()));
        }

        let total_batches = chunks.len().div_ceil(self.batch_size);
        let mut vectors: Option<VectorIndex> = None;

        for (batch_index, batch) in chunks.chunks(self.batch_size).enumerate() {
            let texts: Vec<&str> = batch.iter().map(|c| c.text.as_str()).collect();
            let embeddings = self.embedder.embed_batch(&texts).await.map_err(|e| {
                error!(batch = batch_index, error = %e, "embedding batch failed");
                e.into_embedding("index-builder")
            })?;

            if embeddings.len() != texts.len() {
                return Err(RagError::embedding(
                    "index-builder",
                    format!(
                        "batch {batch_index} returned {} embeddings for {} texts",
                        embeddings.len(),
                        texts.len()
                    ),
                ));
            }

            for mut embedding in embeddings {
                let vectors = vectors.get_or_insert_with(|| self.first_row_index(embedding.len()));
                if vectors.len() < SAMPLE_NORMS {
                    debug!(row = vectors.len(), norm = l2_norm(&embedding), "raw vector norm");
                }
                normalize(&mut embedding)?;
                vectors.push(&embedding)?;
            }

            debug!(batch = batch_index + 1, total_batches, "embedded batch");
        }

        let vectors = vectors.ok_or_else(|| {
            RagError::embedding("index-builder", "embedding service returned no vectors")
        })?;
        let index = KnowledgeIndex::new(vectors, chunks)?;
        info!(
            rows = index.len(),
            dimensions = index.vectors().dimensions(),
            "built index"
        );
        Ok(index)
    }

    /// The first returned vector fixes the index dimension.
    fn first_row_index(&self, dimensions: usize) -> VectorIndex {
        let advertised = self.embedder.dimensions();
        if dimensions != advertised {
            warn!(advertised, returned = dimensions, "embedding dimension differs from the configured one");
        }
        VectorIndex::new(dimensions)
    }
}
