//! Error types for the `docqa-rag` crate.

use thiserror::Error;

/// Errors that can occur in retrieval operations.
#[derive(Debug, Error)]
pub enum RagError {
    /// The embedding service failed or returned a malformed vector.
    #[error("Embedding service error ({provider}): {message}")]
    EmbeddingService {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// The completion service failed.
    #[error("Completion service error ({provider}): {message}")]
    CompletionService {
        /// The completion provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// The persisted index is missing, truncated, or out of alignment with
    /// its metadata table.
    #[error("Index load error: {0}")]
    IndexLoad(String),

    /// A reranker response could not be parsed into a ranking.
    ///
    /// The pipeline never returns this variant; the reranker absorbs it and
    /// keeps the original order.
    #[error("Rerank parse error: {0}")]
    RerankParse(String),

    /// A configuration validation error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// An I/O error while reading or writing index artifacts.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A JSON (de)serialization error for corpus or metadata files.
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

impl RagError {
    /// Shorthand for an [`RagError::EmbeddingService`] error.
    pub fn embedding(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::EmbeddingService { provider: provider.into(), message: message.into() }
    }

    /// Report any failure of an embedding call as [`RagError::EmbeddingService`],
    /// keeping errors that already are one.
    pub(crate) fn into_embedding(self, provider: &str) -> Self {
        match self {
            e @ Self::EmbeddingService { .. } => e,
            other => Self::embedding(provider, other.to_string()),
        }
    }

    /// Shorthand for a [`RagError::CompletionService`] error.
    pub fn completion(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CompletionService { provider: provider.into(), message: message.into() }
    }
}

/// A convenience result type for retrieval operations.
pub type Result<T> = std::result::Result<T, RagError>;
