//! Sentence-window document chunking.
//!
//! Documents are split at sentence boundaries and packed into chunks whose
//! word count stays within a budget. The last few sentences of each chunk are
//! repeated at the start of the next one so that context carries across
//! chunk boundaries.

use std::sync::LazyLock;

use regex::Regex;

/// Whitespace that follows sentence-ending punctuation.
static SENTENCE_BOUNDARY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.!?]\s+").expect("sentence boundary regex is valid"));

/// A strategy for splitting document text into chunk texts.
///
/// Returns an empty `Vec` for empty or whitespace-only text.
pub trait Chunker: Send + Sync {
    /// Split a document into chunk texts, in document order.
    fn chunk(&self, text: &str) -> Vec<String>;
}

/// Packs whole sentences into word-bounded chunks with sentence overlap.
///
/// # Example
///
/// ```rust
/// use docqa_rag::{Chunker, SentenceChunker};
///
/// let chunker = SentenceChunker::new(8, 1);
/// let chunks = chunker.chunk("Cats are mammals. Dogs are mammals too. Birds can fly.");
/// assert_eq!(chunks.len(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct SentenceChunker {
    max_tokens: usize,
    overlap_sentences: usize,
}

impl SentenceChunker {
    /// Create a new `SentenceChunker`.
    ///
    /// # Arguments
    ///
    /// * `max_tokens` - maximum number of words per chunk
    /// * `overlap_sentences` - number of sentences repeated across a chunk boundary
    pub fn new(max_tokens: usize, overlap_sentences: usize) -> Self {
        Self { max_tokens, overlap_sentences }
    }
}

impl Default for SentenceChunker {
    fn default() -> Self {
        Self::new(500, 1)
    }
}

impl Chunker for SentenceChunker {
    fn chunk(&self, text: &str) -> Vec<String> {
        chunk_text(text, self.max_tokens, self.overlap_sentences)
    }
}

/// Split text into sentences, keeping the terminating punctuation.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    for boundary in SENTENCE_BOUNDARY.find_iter(text) {
        // Punctuation is a single ASCII byte, so `+ 1` stays on a char boundary.
        push_trimmed(&mut sentences, &text[start..boundary.start() + 1]);
        start = boundary.end();
    }
    push_trimmed(&mut sentences, &text[start..]);
    sentences
}

fn push_trimmed<'a>(sentences: &mut Vec<&'a str>, sentence: &'a str) {
    let sentence = sentence.trim();
    if !sentence.is_empty() {
        sentences.push(sentence);
    }
}

/// Number of whitespace-separated words, the chunker's token proxy.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Split `text` into chunks of at most `max_tokens` words.
///
/// A sentence longer than `max_tokens` becomes its own oversized chunk. The
/// overlap carried into a new chunk is dropped when it would push that chunk
/// over budget, so every chunk holds at least one sentence the previous chunk
/// did not end with.
pub fn chunk_text(text: &str, max_tokens: usize, overlap_sentences: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut buffer: Vec<&str> = Vec::new();
    let mut buffer_tokens = 0;

    for sentence in split_sentences(text) {
        let tokens = word_count(sentence);

        if !buffer.is_empty() && buffer_tokens + tokens > max_tokens {
            chunks.push(buffer.join(" "));

            let closed = buffer.len() - overlap_sentences.min(buffer.len());
            buffer.drain(..closed);
            buffer_tokens = buffer.iter().map(|s| word_count(s)).sum();

            if buffer_tokens + tokens > max_tokens {
                buffer.clear();
                buffer_tokens = 0;
            }
        }

        buffer.push(sentence);
        buffer_tokens += tokens;
    }

    if !buffer.is_empty() {
        chunks.push(buffer.join(" "));
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_terminal_punctuation() {
        let sentences = split_sentences("One. Two!  Three?\nFour");
        assert_eq!(sentences, vec!["One.", "Two!", "Three?", "Four"]);
    }

    #[test]
    fn decimal_points_do_not_split() {
        assert_eq!(split_sentences("Sales grew 3.5 percent. Costs fell."), vec![
            "Sales grew 3.5 percent.",
            "Costs fell."
        ]);
    }

    #[test]
    fn empty_document_yields_no_chunks() {
        assert!(chunk_text("", 10, 1).is_empty());
        assert!(chunk_text("   \n ", 10, 1).is_empty());
    }

    #[test]
    fn oversized_sentence_is_kept_whole() {
        let long = "one two three four five six seven eight.";
        let chunks = chunk_text(&format!("Short one. {long} Tail here."), 4, 1);
        assert_eq!(chunks, vec!["Short one.", long, "Tail here."]);
    }
}
