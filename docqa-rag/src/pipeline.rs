//! Query pipeline orchestrator.
//!
//! The [`QueryPipeline`] answers retrieval requests against a loaded
//! [`KnowledgeIndex`] by composing an [`EmbeddingService`], a
//! [`CompletionService`] (for reranking and decomposition), a [`Reranker`]
//! and a [`TokenCounter`].
//!
//! # Example
//!
//! ```rust,ignore
//! use docqa_rag::{KnowledgeIndex, QueryPipeline, QueryRequest, RagConfig};
//!
//! let pipeline = QueryPipeline::builder()
//!     .config(RagConfig::default())
//!     .embedding_service(Arc::new(embedder))
//!     .completion_service(Arc::new(chat))
//!     .index(KnowledgeIndex::load("embeddings/vectors.bin", "embeddings/metadata.json")?)
//!     .build()?;
//!
//! let outcome = pipeline.query(&QueryRequest::multi_hop("What does the report recommend?")).await?;
//! ```

use std::collections::HashSet;
use std::sync::Arc;

use arc_swap::ArcSwap;
use futures::{StreamExt, TryStreamExt, stream};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::budget::{HeuristicTokenCounter, TokenCounter, filter_chunks};
use crate::completion::CompletionService;
use crate::config::RagConfig;
use crate::decompose::QueryDecomposer;
use crate::document::{Chunk, Reference, references_for};
use crate::embedding::{EmbeddingService, normalize};
use crate::error::{RagError, Result};
use crate::gate::DomainGate;
use crate::index::KnowledgeIndex;
use crate::reranker::{LlmReranker, Reranker};

/// Reply for questions the corpus cannot answer.
pub const OUT_OF_DOMAIN_MESSAGE: &str =
    "I'm sorry, your question appears to be outside the scope of the provided document.";

/// How a query is turned into retrieval calls.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalStrategy {
    /// Retrieve for the query as asked.
    #[default]
    SingleHop,
    /// Decompose the query and retrieve for every sub-question.
    MultiHop,
}

/// A retrieval request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueryRequest {
    /// The user's question.
    pub query: String,
    /// Neighbours per retrieval; the configured `top_k` when `None`.
    #[serde(default)]
    pub k: Option<usize>,
    /// Single- or multi-hop retrieval.
    #[serde(default)]
    pub strategy: RetrievalStrategy,
}

impl QueryRequest {
    /// A single-hop request with the configured `k`.
    pub fn new(query: impl Into<String>) -> Self {
        Self { query: query.into(), k: None, strategy: RetrievalStrategy::SingleHop }
    }

    /// A multi-hop request with the configured `k`.
    pub fn multi_hop(query: impl Into<String>) -> Self {
        Self { strategy: RetrievalStrategy::MultiHop, ..Self::new(query) }
    }

    /// Override the number of neighbours per retrieval.
    pub fn with_k(mut self, k: usize) -> Self {
        self.k = Some(k);
        self
    }
}

/// The result of [`QueryPipeline::query`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum QueryOutcome {
    /// The query is in scope; `chunks` is the ranked, budget-trimmed context.
    Answerable {
        /// Context chunks in presentation order.
        chunks: Vec<Chunk>,
        /// Sources of `chunks`, numbered from 1.
        references: Vec<Reference>,
    },
    /// The query is unrelated to the corpus. No completion call was made.
    OutOfDomain {
        /// A user-presentable explanation.
        message: String,
    },
}

impl QueryOutcome {
    /// The context chunks, empty when out of domain.
    pub fn chunks(&self) -> &[Chunk] {
        match self {
            Self::Answerable { chunks, .. } => chunks,
            Self::OutOfDomain { .. } => &[],
        }
    }

    /// The references, empty when out of domain.
    pub fn references(&self) -> &[Reference] {
        match self {
            Self::Answerable { references, .. } => references,
            Self::OutOfDomain { .. } => &[],
        }
    }

    /// Whether the query was gated out.
    pub fn is_out_of_domain(&self) -> bool {
        matches!(self, Self::OutOfDomain { .. })
    }
}

/// The index and the gate derived from it, swapped together.
struct Snapshot {
    index: Arc<KnowledgeIndex>,
    gate: DomainGate,
}

impl Snapshot {
    fn new(index: KnowledgeIndex, domain_threshold: f32) -> Self {
        let gate = DomainGate::new(index.vectors(), domain_threshold);
        Self { index: Arc::new(index), gate }
    }

    /// A query vector of another width came from a different embedding model.
    fn check_dimensions(&self, vector: &[f32]) -> Result<()> {
        let expected = self.index.vectors().dimensions();
        if vector.len() != expected {
            return Err(RagError::embedding(
                "query",
                format!("query vector has {} dimensions, index has {expected}", vector.len()),
            ));
        }
        Ok(())
    }
}

/// The retrieval pipeline.
///
/// Queries run against a shared, read-only snapshot of the index. Each query
/// loads the snapshot once, so a concurrent [`swap_index`](Self::swap_index)
/// never mixes vectors and metadata from different builds. Construct one via
/// [`QueryPipeline::builder()`].
pub struct QueryPipeline {
    config: RagConfig,
    embedder: Arc<dyn EmbeddingService>,
    reranker: Arc<dyn Reranker>,
    decomposer: QueryDecomposer,
    token_counter: Arc<dyn TokenCounter>,
    snapshot: ArcSwap<Snapshot>,
}

impl QueryPipeline {
    /// Create a new [`QueryPipelineBuilder`].
    pub fn builder() -> QueryPipelineBuilder {
        QueryPipelineBuilder::default()
    }

    /// Return a reference to the pipeline configuration.
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// The index currently served.
    pub fn index(&self) -> Arc<KnowledgeIndex> {
        Arc::clone(&self.snapshot.load().index)
    }

    /// Replace the served index (vectors and metadata together).
    ///
    /// Queries already running finish against the index they started with.
    pub fn swap_index(&self, index: KnowledgeIndex) {
        let rows = index.len();
        self.snapshot.store(Arc::new(Snapshot::new(index, self.config.domain_threshold)));
        info!(rows, "swapped index");
    }

    /// Embed and normalize a query.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::EmbeddingService`] if the call fails or the vector
    /// cannot be normalized.
    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = self.embedder.embed(text).await.map_err(|e| {
            error!(error = %e, "query embedding failed");
            e.into_embedding("query")
        })?;
        normalize(&mut vector)?;
        Ok(vector)
    }

    /// Whether a normalized query vector is in scope for the current index.
    pub fn is_in_domain(&self, query_vector: &[f32]) -> bool {
        self.snapshot.load().gate.is_in_domain(query_vector)
    }

    /// Single-hop retrieval: embed → search → rerank.
    ///
    /// Returns at most `k` chunks at or above the similarity threshold, in
    /// reranked order. An empty result is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::EmbeddingService`] if the query cannot be embedded.
    pub async fn retrieve_top_k(&self, query: &str, k: usize) -> Result<Vec<Chunk>> {
        let snapshot = self.snapshot.load_full();
        let vector = self.embed_query(query).await?;
        self.search_and_rerank(&snapshot, query, &vector, k).await
    }

    /// Multi-hop retrieval: decompose, retrieve per sub-question, merge.
    ///
    /// Sub-questions are retrieved concurrently (at most `max_concurrency`
    /// at a time); results are concatenated in sub-question order and
    /// deduplicated by chunk text, keeping first occurrences. A failed
    /// decomposition yields no sub-questions and therefore no chunks.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::EmbeddingService`] if any sub-question cannot be
    /// embedded.
    pub async fn multi_hop_retrieve(&self, query: &str, k: usize) -> Result<Vec<Chunk>> {
        let snapshot = self.snapshot.load_full();
        self.multi_hop_in(&snapshot, query, k).await
    }

    /// Trim `chunks` to the configured context budget (strict prefix).
    pub fn filter_chunks(&self, chunks: Vec<Chunk>) -> Vec<Chunk> {
        filter_chunks(chunks, self.config.context_max_tokens, self.token_counter.as_ref())
    }

    /// Run the full pipeline: embed → gate → retrieve → budget.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::EmbeddingService`] if the query or a sub-question
    /// cannot be embedded. Out-of-domain queries are an
    /// [`QueryOutcome::OutOfDomain`] value, not an error.
    pub async fn query(&self, request: &QueryRequest) -> Result<QueryOutcome> {
        let snapshot = self.snapshot.load_full();
        let query = request.query.as_str();
        let k = request.k.unwrap_or(self.config.top_k);

        let vector = self.embed_query(query).await?;
        snapshot.check_dimensions(&vector)?;
        if !snapshot.gate.is_in_domain(&vector) {
            info!(query, "query is out of domain");
            return Ok(QueryOutcome::OutOfDomain { message: OUT_OF_DOMAIN_MESSAGE.to_string() });
        }

        let retrieved = match request.strategy {
            RetrievalStrategy::SingleHop => {
                self.search_and_rerank(&snapshot, query, &vector, k).await?
            }
            RetrievalStrategy::MultiHop => self.multi_hop_in(&snapshot, query, k).await?,
        };
        let retrieved_count = retrieved.len();
        let chunks = self.filter_chunks(retrieved);
        let references = references_for(&chunks);

        info!(
            strategy = ?request.strategy,
            retrieved = retrieved_count,
            kept = chunks.len(),
            "query completed"
        );
        Ok(QueryOutcome::Answerable { chunks, references })
    }

    async fn search_and_rerank(
        &self,
        snapshot: &Snapshot,
        query: &str,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<Chunk>> {
        let hits = snapshot.index.search(vector, k, self.config.similarity_threshold)?;
        if hits.is_empty() {
            return Ok(Vec::new());
        }
        let reranked = self.reranker.rerank(query, hits).await;
        Ok(reranked.into_iter().map(|hit| hit.chunk).collect())
    }

    async fn multi_hop_in(&self, snapshot: &Snapshot, query: &str, k: usize) -> Result<Vec<Chunk>> {
        let sub_questions = match self.decomposer.decompose(query).await {
            Ok(questions) => questions,
            Err(e) => {
                warn!(error = %e, "query decomposition failed, no sub-questions");
                Vec::new()
            }
        };

        let per_question: Vec<Vec<Chunk>> = stream::iter(&sub_questions)
            .map(|sub_question| async move {
                let vector = self.embed_query(sub_question).await?;
                self.search_and_rerank(snapshot, sub_question, &vector, k).await
            })
            .buffered(self.config.max_concurrency)
            .try_collect()
            .await?;

        Ok(dedup_by_text(per_question.into_iter().flatten()))
    }
}

/// Drop chunks whose text already appeared earlier, keeping first occurrences.
pub fn dedup_by_text(chunks: impl IntoIterator<Item = Chunk>) -> Vec<Chunk> {
    let mut seen = HashSet::new();
    chunks.into_iter().filter(|chunk| seen.insert(chunk.text.clone())).collect()
}

/// Builder for constructing a [`QueryPipeline`].
///
/// The embedding service, completion service and index are required. The
/// reranker defaults to an [`LlmReranker`] over the completion service, the
/// token counter to [`HeuristicTokenCounter`] and the config to
/// [`RagConfig::default()`].
#[derive(Default)]
pub struct QueryPipelineBuilder {
    config: Option<RagConfig>,
    embedder: Option<Arc<dyn EmbeddingService>>,
    completion: Option<Arc<dyn CompletionService>>,
    reranker: Option<Arc<dyn Reranker>>,
    token_counter: Option<Arc<dyn TokenCounter>>,
    index: Option<KnowledgeIndex>,
}

impl QueryPipelineBuilder {
    /// Set the pipeline configuration.
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the embedding service used for queries.
    pub fn embedding_service(mut self, service: Arc<dyn EmbeddingService>) -> Self {
        self.embedder = Some(service);
        self
    }

    /// Set the completion service used for reranking and decomposition.
    pub fn completion_service(mut self, service: Arc<dyn CompletionService>) -> Self {
        self.completion = Some(service);
        self
    }

    /// Replace the default LLM reranker.
    pub fn reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    /// Replace the default token counter.
    pub fn token_counter(mut self, counter: Arc<dyn TokenCounter>) -> Self {
        self.token_counter = Some(counter);
        self
    }

    /// Set the index to serve.
    pub fn index(mut self, index: KnowledgeIndex) -> Self {
        self.index = Some(index);
        self
    }

    /// Build the [`QueryPipeline`], validating the config and required fields.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if a required field is missing or the
    /// config is invalid.
    pub fn build(self) -> Result<QueryPipeline> {
        let config = self.config.unwrap_or_default();
        config.validate()?;
        let embedder = self
            .embedder
            .ok_or_else(|| RagError::Config("embedding_service is required".to_string()))?;
        let completion = self
            .completion
            .ok_or_else(|| RagError::Config("completion_service is required".to_string()))?;
        let index = self.index.ok_or_else(|| RagError::Config("index is required".to_string()))?;

        let reranker = self.reranker.unwrap_or_else(|| {
            Arc::new(
                LlmReranker::new(Arc::clone(&completion))
                    .with_preview_chars(config.rerank_preview_chars),
            )
        });
        let token_counter = self.token_counter.unwrap_or_else(|| Arc::new(HeuristicTokenCounter));
        let snapshot = ArcSwap::from_pointee(Snapshot::new(index, config.domain_threshold));

        Ok(QueryPipeline {
            config,
            embedder,
            reranker,
            decomposer: QueryDecomposer::new(completion),
            token_counter,
            snapshot,
        })
    }
}
