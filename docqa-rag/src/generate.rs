//! Grounded answer generation from a retrieval outcome.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::completion::{
    ASSISTANT_SYSTEM_PROMPT, CompletionOptions, CompletionService, Message,
};
use crate::document::{Chunk, Reference};
use crate::error::Result;
use crate::pipeline::QueryOutcome;

const ANSWER_OPTIONS: CompletionOptions = CompletionOptions { temperature: 0.3, max_tokens: 800 };

/// A generated reply with the sources it was grounded on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Answer {
    /// The reply text.
    pub text: String,
    /// Sources of the context the reply was generated from.
    pub references: Vec<Reference>,
}

/// Produces the final answer from a [`QueryOutcome`].
pub struct AnswerGenerator {
    completion: Arc<dyn CompletionService>,
}

impl AnswerGenerator {
    /// Create a generator backed by `completion`.
    pub fn new(completion: Arc<dyn CompletionService>) -> Self {
        Self { completion }
    }

    /// Answer `query` from `outcome`.
    ///
    /// Out-of-domain outcomes are answered with their message and no
    /// completion call.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::CompletionService`](crate::RagError::CompletionService)
    /// if generation fails.
    pub async fn answer(&self, query: &str, outcome: &QueryOutcome) -> Result<Answer> {
        let (chunks, references) = match outcome {
            QueryOutcome::OutOfDomain { message } => {
                return Ok(Answer { text: message.clone(), references: Vec::new() });
            }
            QueryOutcome::Answerable { chunks, references } => (chunks, references),
        };

        let messages =
            [Message::system(ASSISTANT_SYSTEM_PROMPT), Message::user(answer_prompt(query, chunks))];
        let text = self.completion.complete(&messages, ANSWER_OPTIONS).await.map_err(|e| {
            error!(error = %e, "answer generation failed");
            e
        })?;

        info!(context_chunks = chunks.len(), "generated answer");
        Ok(Answer { text: text.trim().to_string(), references: references.clone() })
    }
}

/// The grounded-answer prompt: context passages separated by blank lines,
/// followed by the question.
pub fn answer_prompt(query: &str, chunks: &[Chunk]) -> String {
    let context = chunks.iter().map(|c| c.text.as_str()).collect::<Vec<_>>().join("\n\n");
    format!(
        "Answer the question using only the context below. If the context does not \
         contain the answer, say that you do not know.\n\n\
         Context:\n{context}\n\nQuestion: {query}\n\nAnswer:"
    )
}
