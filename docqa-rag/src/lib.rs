//! # docqa-rag
//!
//! Retrieval pipeline for answering questions against a fixed document corpus.
//!
//! Offline, a [`SentenceChunker`] splits documents into overlapping passages
//! and an [`IndexBuilder`] embeds them into a [`KnowledgeIndex`]: unit vectors
//! plus the chunk metadata, aligned row for row and persisted as a pair. At
//! query time the [`QueryPipeline`] embeds the question, rejects it early if
//! the [`DomainGate`] finds it unrelated to the corpus, retrieves (optionally
//! per sub-question via the [`QueryDecomposer`]), reranks through the
//! completion service, and trims the result to the generation model's
//! context budget.
//!
//! The embedding and completion services are injected as trait objects.
//! Enable the `openai` feature for OpenAI / Azure OpenAI HTTP clients and
//! `hf-tokenizer` for exact token counting with a Hugging Face tokenizer.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use docqa_rag::{KnowledgeIndex, QueryPipeline, QueryRequest};
//!
//! let pipeline = QueryPipeline::builder()
//!     .embedding_service(Arc::new(embedder))
//!     .completion_service(Arc::new(chat))
//!     .index(KnowledgeIndex::load("embeddings/vectors.bin", "embeddings/metadata.json")?)
//!     .build()?;
//! let outcome = pipeline.query(&QueryRequest::new("What are the key trends?")).await?;
//! ```

pub mod budget;
pub mod builder;
pub mod chunking;
pub mod completion;
pub mod config;
pub mod decompose;
pub mod document;
pub mod embedding;
pub mod error;
pub mod gate;
pub mod generate;
pub mod index;
pub mod pipeline;
pub mod reranker;
pub mod store;

#[cfg(feature = "openai")]
pub mod openai;

pub use budget::{HeuristicTokenCounter, TokenCounter, filter_chunks};
#[cfg(feature = "hf-tokenizer")]
pub use budget::HfTokenCounter;
pub use builder::{DEFAULT_BATCH_SIZE, IndexBuilder};
pub use chunking::{Chunker, SentenceChunker, chunk_text, split_sentences, word_count};
pub use completion::{CompletionOptions, CompletionService, Message, Role};
pub use config::{RagConfig, RagConfigBuilder};
pub use decompose::QueryDecomposer;
pub use document::{Chunk, CorpusEntry, Reference, SearchResult, references_for};
pub use embedding::{EmbeddingService, normalize};
pub use error::{RagError, Result};
pub use gate::DomainGate;
pub use generate::{Answer, AnswerGenerator};
pub use index::{KnowledgeIndex, VectorIndex};
#[cfg(feature = "openai")]
pub use openai::{Endpoint, OpenAiCompletionService, OpenAiEmbeddingService};
pub use pipeline::{
    OUT_OF_DOMAIN_MESSAGE, QueryOutcome, QueryPipeline, QueryPipelineBuilder, QueryRequest,
    RetrievalStrategy, dedup_by_text,
};
pub use reranker::{LlmReranker, NoOpReranker, Reranker, parse_ranking};
pub use store::{read_corpus, write_corpus};
