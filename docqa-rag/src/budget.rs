//! Context-window budgeting for the generation call.

use crate::document::Chunk;

/// Counts tokens the way the downstream generation model does.
pub trait TokenCounter: Send + Sync {
    /// Number of tokens in `text`.
    fn count(&self, text: &str) -> usize;
}

/// Approximates BPE token counts at four characters per token.
///
/// Never reports fewer tokens than the text has words, which keeps short
/// word-heavy text from being undercounted.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicTokenCounter;

impl TokenCounter for HeuristicTokenCounter {
    fn count(&self, text: &str) -> usize {
        let by_chars = text.chars().count().div_ceil(4);
        by_chars.max(text.split_whitespace().count())
    }
}

/// Token counts from a Hugging Face `tokenizer.json` matching the generation
/// model.
///
/// Only available with the `hf-tokenizer` feature.
#[cfg(feature = "hf-tokenizer")]
pub struct HfTokenCounter {
    tokenizer: tokenizers::Tokenizer,
}

#[cfg(feature = "hf-tokenizer")]
impl HfTokenCounter {
    /// Load a tokenizer from a `tokenizer.json` file.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`](crate::RagError::Config) if the file
    /// cannot be read or parsed.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let tokenizer = tokenizers::Tokenizer::from_file(path.as_ref()).map_err(|e| {
            crate::RagError::Config(format!(
                "cannot load tokenizer {}: {e}",
                path.as_ref().display()
            ))
        })?;
        Ok(Self { tokenizer })
    }
}

#[cfg(feature = "hf-tokenizer")]
impl TokenCounter for HfTokenCounter {
    fn count(&self, text: &str) -> usize {
        match self.tokenizer.encode(text, false) {
            Ok(encoding) => encoding.len(),
            Err(e) => {
                tracing::warn!(error = %e, "tokenizer failed, falling back to estimate");
                HeuristicTokenCounter.count(text)
            }
        }
    }
}

/// Keep the longest prefix of `chunks` whose total token count fits in
/// `max_tokens`.
///
/// Selection stops at the first chunk that does not fit, even if a later,
/// smaller one would, so rank order is preserved.
pub fn filter_chunks(
    chunks: Vec<Chunk>,
    max_tokens: usize,
    counter: &dyn TokenCounter,
) -> Vec<Chunk> {
    let mut total = 0;
    let mut kept = Vec::with_capacity(chunks.len());
    for chunk in chunks {
        let tokens = counter.count(&chunk.text);
        if total + tokens > max_tokens {
            break;
        }
        total += tokens;
        kept.push(chunk);
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heuristic_rounds_up_and_respects_word_count() {
        assert_eq!(HeuristicTokenCounter.count(""), 0);
        assert_eq!(HeuristicTokenCounter.count("abcde"), 2);
        assert_eq!(HeuristicTokenCounter.count("a b c d e"), 5);
    }
}
