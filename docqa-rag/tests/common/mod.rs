//! Fake embedding and completion services shared by the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use docqa_rag::{
    Chunk, CompletionOptions, CompletionService, EmbeddingService, KnowledgeIndex, Message,
    RagError, Result, VectorIndex, normalize,
};

/// Embeds texts by exact lookup in a table. Unknown texts are an embedding error.
pub struct TableEmbedder {
    dims: usize,
    table: HashMap<String, Vec<f32>>,
    batch_calls: AtomicUsize,
}

impl TableEmbedder {
    pub fn new(dims: usize) -> Self {
        Self { dims, table: HashMap::new(), batch_calls: AtomicUsize::new(0) }
    }

    pub fn with(mut self, text: &str, vector: &[f32]) -> Self {
        self.table.insert(text.to_string(), vector.to_vec());
        self
    }

    pub fn batch_calls(&self) -> usize {
        self.batch_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingService for TableEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.table
            .get(text)
            .cloned()
            .ok_or_else(|| RagError::embedding("table", format!("no vector for {text:?}")))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }

    fn dimensions(&self) -> usize {
        self.dims
    }
}

/// Replies according to which prompt it receives. A missing script is a
/// completion error.
#[derive(Default)]
pub struct ScriptedCompletion {
    decomposition: Option<String>,
    ranking: Option<String>,
    answer: Option<String>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedCompletion {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decomposition(mut self, output: &str) -> Self {
        self.decomposition = Some(output.to_string());
        self
    }

    pub fn ranking(mut self, output: &str) -> Self {
        self.ranking = Some(output.to_string());
        self
    }

    pub fn answer(mut self, output: &str) -> Self {
        self.answer = Some(output.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionService for ScriptedCompletion {
    async fn complete(&self, messages: &[Message], _options: CompletionOptions) -> Result<String> {
        let prompt = messages.last().map(|m| m.content.clone()).unwrap_or_default();
        self.prompts.lock().unwrap().push(prompt.clone());

        let script = if prompt.starts_with("Decompose") {
            &self.decomposition
        } else if prompt.contains("rank them by their relevance") {
            &self.ranking
        } else {
            &self.answer
        };
        script.clone().ok_or_else(|| RagError::completion("scripted", "no scripted reply"))
    }
}

/// Build an index from `(text, source, vector)` rows, normalizing each vector.
pub fn index_of<const N: usize>(rows: &[(&str, &str, [f32; N])]) -> KnowledgeIndex {
    let mut vectors = VectorIndex::new(N);
    let mut metadata = Vec::new();
    for (row, (text, source, vector)) in rows.iter().enumerate() {
        let mut vector = vector.to_vec();
        normalize(&mut vector).unwrap();
        vectors.push(&vector).unwrap();
        metadata.push(Chunk::new(row, *text, *source));
    }
    KnowledgeIndex::new(vectors, metadata).unwrap()
}
