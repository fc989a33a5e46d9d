//! Rerankers that reorder search results by query relevance.
//!
//! [`LlmReranker`] asks the completion service for a relevance ordering and
//! parses it strictly. Whatever the model returns, reranking never fails and
//! never empties a non-empty candidate list: unparseable output and service
//! errors both fall back to the incoming order.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::completion::{
    ASSISTANT_SYSTEM_PROMPT, CompletionOptions, CompletionService, Message,
};
use crate::document::SearchResult;
use crate::error::{RagError, Result};

/// A reranker that reorders search results.
///
/// Implementations return a permutation of (a subset of) the input. They
/// must not fail: a reranker that cannot judge relevance returns its input
/// unchanged.
#[async_trait]
pub trait Reranker: Send + Sync {
    /// Rerank search results given the original query.
    async fn rerank(&self, query: &str, results: Vec<SearchResult>) -> Vec<SearchResult>;
}

/// A no-op reranker that returns results unchanged.
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::NoOpReranker;
///
/// let reranker = NoOpReranker;
/// let reranked = reranker.rerank("query", results).await;
/// // reranked == results
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpReranker;

#[async_trait]
impl Reranker for NoOpReranker {
    async fn rerank(&self, _query: &str, results: Vec<SearchResult>) -> Vec<SearchResult> {
        results
    }
}

/// Default number of characters of each chunk shown to the model.
pub const DEFAULT_PREVIEW_CHARS: usize = 300;

const RERANK_OPTIONS: CompletionOptions = CompletionOptions { temperature: 0.0, max_tokens: 300 };

/// Reranks with a single completion call that lists the candidates and asks
/// for their numbers in order of relevance, one per line.
///
/// Numbers the model never mentions are dropped from the result, so the
/// output may be shorter than the input.
pub struct LlmReranker {
    completion: Arc<dyn CompletionService>,
    preview_chars: usize,
}

impl LlmReranker {
    /// Create a reranker backed by `completion`.
    pub fn new(completion: Arc<dyn CompletionService>) -> Self {
        Self { completion, preview_chars: DEFAULT_PREVIEW_CHARS }
    }

    /// Set how many characters of each chunk the prompt includes.
    pub fn with_preview_chars(mut self, chars: usize) -> Self {
        self.preview_chars = chars;
        self
    }

    /// Build the ranking prompt for `results`.
    pub fn prompt(&self, query: &str, results: &[SearchResult]) -> String {
        let mut prompt = format!(
            "You are a helpful assistant. Given the query and the following chunks, \
             rank them by their relevance to the query.\n\nQuery: {query}\n\nChunks:\n"
        );
        for (i, result) in results.iter().enumerate() {
            let preview: String = result
                .chunk
                .text
                .chars()
                .take(self.preview_chars)
                .map(|c| if c == '\n' { ' ' } else { c })
                .collect();
            prompt.push_str(&format!("{}. ({}) {preview}...\n\n", i + 1, result.chunk.source));
        }
        prompt.push_str(
            "Return the chunk numbers in order of relevance, one per line (e.g., 3, 1, 2).",
        );
        prompt
    }
}

#[async_trait]
impl Reranker for LlmReranker {
    async fn rerank(&self, query: &str, results: Vec<SearchResult>) -> Vec<SearchResult> {
        if results.is_empty() {
            return results;
        }

        let messages =
            [Message::system(ASSISTANT_SYSTEM_PROMPT), Message::user(self.prompt(query, &results))];
        let output = match self.completion.complete(&messages, RERANK_OPTIONS).await {
            Ok(output) => output,
            Err(e) => {
                warn!(error = %e, "rerank call failed, keeping retrieval order");
                return results;
            }
        };
        debug!(output = %output, "reranker raw output");

        match parse_ranking(&output, results.len()) {
            Ok(order) => apply_ranking(results, &order),
            Err(e) => {
                warn!(error = %e, "unusable rerank output, keeping retrieval order");
                results
            }
        }
    }
}

/// Parse a model's ranking into zero-based indices into a list of `len`
/// candidates.
///
/// Each line is trimmed of whitespace and surrounding `,` and `.`; lines
/// that are then a plain decimal number in `1..=len` count, first mention
/// wins, everything else is ignored.
///
/// # Errors
///
/// Returns [`RagError::RerankParse`] if no line yields a valid index.
pub fn parse_ranking(output: &str, len: usize) -> Result<Vec<usize>> {
    let mut order = Vec::new();
    let mut seen = vec![false; len];

    for line in output.lines() {
        let token = line.trim().trim_matches(|c: char| c == ',' || c == '.' || c.is_whitespace());
        if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
            continue;
        }
        let Ok(number) = token.parse::<usize>() else {
            continue;
        };
        if (1..=len).contains(&number) && !seen[number - 1] {
            seen[number - 1] = true;
            order.push(number - 1);
        }
    }

    if order.is_empty() {
        return Err(RagError::RerankParse(format!(
            "no candidate number in 1..={len} found in {} line(s)",
            output.lines().count()
        )));
    }
    Ok(order)
}

/// Reorder `results` by zero-based `order`, dropping unmentioned entries.
fn apply_ranking(results: Vec<SearchResult>, order: &[usize]) -> Vec<SearchResult> {
    let mut slots: Vec<Option<SearchResult>> = results.into_iter().map(Some).collect();
    order.iter().filter_map(|&i| slots.get_mut(i).and_then(Option::take)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_and_punctuated_lines() {
        assert_eq!(parse_ranking("2\n1\n3", 3).unwrap(), vec![1, 0, 2]);
        assert_eq!(parse_ranking(" 3.\n1,\n", 3).unwrap(), vec![2, 0]);
    }

    #[test]
    fn ignores_out_of_range_duplicates_and_prose() {
        let output = "Here is the ranking:\n4\n0\n2\n2\nChunk 1\n1";
        assert_eq!(parse_ranking(output, 3).unwrap(), vec![1, 0]);
    }

    #[test]
    fn rejects_signed_and_inline_numbers() {
        assert!(parse_ranking("+1\n-2\n3, 1, 2", 3).is_err());
    }

    #[test]
    fn empty_output_is_a_parse_error() {
        assert!(matches!(parse_ranking("", 2), Err(RagError::RerankParse(_))));
    }
}
