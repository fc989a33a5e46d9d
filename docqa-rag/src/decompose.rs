//! Query decomposition for multi-hop retrieval.

use std::sync::Arc;

use tracing::debug;

use crate::completion::{
    ASSISTANT_SYSTEM_PROMPT, CompletionOptions, CompletionService, Message,
};
use crate::error::Result;

const DECOMPOSE_OPTIONS: CompletionOptions =
    CompletionOptions { temperature: 0.0, max_tokens: 800 };

/// Splits a complex question into simpler sub-questions with one completion call.
///
/// Sub-questions are taken line by line and are not validated further;
/// retrieval tolerates noisy lines (at worst they match nothing).
pub struct QueryDecomposer {
    completion: Arc<dyn CompletionService>,
}

impl QueryDecomposer {
    /// Create a decomposer backed by `completion`.
    pub fn new(completion: Arc<dyn CompletionService>) -> Self {
        Self { completion }
    }

    /// Ask the completion service for the sub-questions of `query`, in order.
    ///
    /// # Errors
    ///
    /// Propagates the completion service's error.
    pub async fn decompose(&self, query: &str) -> Result<Vec<String>> {
        let prompt = format!(
            "Decompose the following complex query into simpler sub-questions:\n\n\
             Query: {query}\n\nSub-questions:"
        );
        let messages = [Message::system(ASSISTANT_SYSTEM_PROMPT), Message::user(prompt)];
        let output = self.completion.complete(&messages, DECOMPOSE_OPTIONS).await?;
        let sub_questions = split_sub_questions(&output);
        debug!(count = sub_questions.len(), "decomposed query");
        Ok(sub_questions)
    }
}

/// One sub-question per non-blank line, trimmed.
pub fn split_sub_questions(output: &str) -> Vec<String> {
    output.lines().map(str::trim).filter(|l| !l.is_empty()).map(str::to_owned).collect()
}
