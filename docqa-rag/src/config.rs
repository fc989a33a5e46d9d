//! Configuration for chunking, index building, and retrieval.

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

/// Configuration parameters for the retrieval pipeline.
///
/// Deserializes from partial JSON: missing fields take their defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RagConfig {
    /// Maximum chunk size in words (the chunker's token proxy).
    pub chunk_max_tokens: usize,
    /// Number of trailing sentences repeated at the start of the next chunk.
    pub chunk_overlap_sentences: usize,
    /// Number of chunk texts sent per embedding request.
    pub embed_batch_size: usize,
    /// Number of nearest neighbours to fetch per query.
    pub top_k: usize,
    /// Minimum cosine similarity for a search hit to be kept.
    pub similarity_threshold: f32,
    /// Minimum cosine similarity between the query and the corpus centroid.
    pub domain_threshold: f32,
    /// Token budget for the context handed to the generation call.
    pub context_max_tokens: usize,
    /// Maximum number of sub-questions retrieved concurrently.
    pub max_concurrency: usize,
    /// Number of characters of each chunk shown to the reranker.
    pub rerank_preview_chars: usize,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            chunk_max_tokens: 500,
            chunk_overlap_sentences: 1,
            embed_batch_size: 10,
            top_k: 10,
            similarity_threshold: 0.6,
            domain_threshold: 0.55,
            context_max_tokens: 4000,
            max_concurrency: 4,
            rerank_preview_chars: 300,
        }
    }
}

impl RagConfig {
    /// Create a new builder for constructing a [`RagConfig`].
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }

    /// Check that the parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if:
    /// - `chunk_max_tokens == 0`
    /// - `chunk_overlap_sentences >= chunk_max_tokens`
    /// - `embed_batch_size`, `top_k`, `context_max_tokens` or `max_concurrency` is zero
    /// - a threshold is not a finite value in `[-1, 1]`
    pub fn validate(&self) -> Result<()> {
        if self.chunk_max_tokens == 0 {
            return Err(RagError::Config("chunk_max_tokens must be greater than zero".into()));
        }
        if self.chunk_overlap_sentences >= self.chunk_max_tokens {
            return Err(RagError::Config(format!(
                "chunk_overlap_sentences ({}) must be less than chunk_max_tokens ({})",
                self.chunk_overlap_sentences, self.chunk_max_tokens
            )));
        }
        for (name, value) in [
            ("embed_batch_size", self.embed_batch_size),
            ("top_k", self.top_k),
            ("context_max_tokens", self.context_max_tokens),
            ("max_concurrency", self.max_concurrency),
        ] {
            if value == 0 {
                return Err(RagError::Config(format!("{name} must be greater than zero")));
            }
        }
        for (name, value) in [
            ("similarity_threshold", self.similarity_threshold),
            ("domain_threshold", self.domain_threshold),
        ] {
            if !value.is_finite() || !(-1.0..=1.0).contains(&value) {
                return Err(RagError::Config(format!("{name} ({value}) must be within [-1, 1]")));
            }
        }
        Ok(())
    }
}

/// Builder for constructing a validated [`RagConfig`].
#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    config: RagConfig,
}

impl RagConfigBuilder {
    /// Set the maximum chunk size in words.
    pub fn chunk_max_tokens(mut self, max_tokens: usize) -> Self {
        self.config.chunk_max_tokens = max_tokens;
        self
    }

    /// Set the number of overlapping sentences between consecutive chunks.
    pub fn chunk_overlap_sentences(mut self, overlap: usize) -> Self {
        self.config.chunk_overlap_sentences = overlap;
        self
    }

    /// Set the embedding batch size.
    pub fn embed_batch_size(mut self, batch_size: usize) -> Self {
        self.config.embed_batch_size = batch_size;
        self
    }

    /// Set the number of nearest neighbours fetched per query.
    pub fn top_k(mut self, k: usize) -> Self {
        self.config.top_k = k;
        self
    }

    /// Set the minimum similarity for search hits.
    pub fn similarity_threshold(mut self, threshold: f32) -> Self {
        self.config.similarity_threshold = threshold;
        self
    }

    /// Set the minimum query-to-centroid similarity for in-domain queries.
    pub fn domain_threshold(mut self, threshold: f32) -> Self {
        self.config.domain_threshold = threshold;
        self
    }

    /// Set the context token budget.
    pub fn context_max_tokens(mut self, max_tokens: usize) -> Self {
        self.config.context_max_tokens = max_tokens;
        self
    }

    /// Set the multi-hop fan-out limit.
    pub fn max_concurrency(mut self, limit: usize) -> Self {
        self.config.max_concurrency = limit;
        self
    }

    /// Set the reranker preview length in characters.
    pub fn rerank_preview_chars(mut self, chars: usize) -> Self {
        self.config.rerank_preview_chars = chars;
        self
    }

    /// Build the [`RagConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] under the conditions listed on
    /// [`RagConfig::validate`].
    pub fn build(self) -> Result<RagConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
