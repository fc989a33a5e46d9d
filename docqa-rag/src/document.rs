//! Data types for chunks, corpus entries, search hits, and references.

use serde::{Deserialize, Serialize};

/// A retrieval unit: a bounded excerpt of a source document.
///
/// `id` is the row of this chunk's vector in the [`VectorIndex`](crate::VectorIndex)
/// it was built into. The metadata file does not store it; it is reassigned
/// from the row position whenever the index is loaded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chunk {
    /// Row ordinal in the vector index.
    #[serde(skip)]
    pub id: usize,
    /// The text content of the chunk.
    pub text: String,
    /// Human-readable name of the source document.
    pub source: String,
    /// Optional link to the source document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl Chunk {
    /// Create a chunk without a URL.
    pub fn new(id: usize, text: impl Into<String>, source: impl Into<String>) -> Self {
        Self { id, text: text.into(), source: source.into(), url: None }
    }
}

/// One entry of a chunk corpus file.
///
/// Chunker output is a plain array of strings; enriched corpora carry a
/// source (and optionally a URL) per entry. Both shapes may be mixed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum CorpusEntry {
    /// Bare chunk text from the chunker.
    Text(String),
    /// Chunk text with its source attribution.
    Sourced {
        /// The chunk text.
        text: String,
        /// Source document name.
        source: String,
        /// Optional link to the source.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
    },
}

impl CorpusEntry {
    /// Turn the entry into a [`Chunk`] with the given id, using
    /// `default_source` for bare text entries.
    pub fn into_chunk(self, id: usize, default_source: &str) -> Chunk {
        match self {
            Self::Text(text) => Chunk::new(id, text, default_source),
            Self::Sourced { text, source, url } => Chunk { id, text, source, url },
        }
    }
}

/// Convert corpus entries into chunks with ids assigned in file order.
pub fn chunks_from_corpus(entries: Vec<CorpusEntry>, default_source: &str) -> Vec<Chunk> {
    entries.into_iter().enumerate().map(|(i, e)| e.into_chunk(i, default_source)).collect()
}

/// A retrieved [`Chunk`] paired with its cosine similarity to the query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResult {
    /// The retrieved chunk.
    pub chunk: Chunk,
    /// Cosine similarity to the query (higher is more relevant).
    pub score: f32,
}

/// A citation for the answer, derived per query from the final chunk selection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Reference {
    /// 1-based position in presentation order.
    pub id: usize,
    /// Title of the source.
    pub title: String,
    /// Link to the source, empty when unknown.
    pub url: String,
}

/// Build the reference list for a chunk selection: one entry per distinct
/// source, numbered in order of first appearance.
pub fn references_for(chunks: &[Chunk]) -> Vec<Reference> {
    let mut references: Vec<Reference> = Vec::new();
    for chunk in chunks {
        let url = chunk.url.clone().unwrap_or_default();
        if references.iter().any(|r| r.title == chunk.source && r.url == url) {
            continue;
        }
        references.push(Reference { id: references.len() + 1, title: chunk.source.clone(), url });
    }
    references
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corpus_accepts_strings_and_objects() {
        let json = r#"["plain text", {"text": "enriched", "source": "Report", "url": "https://x"}]"#;
        let entries: Vec<CorpusEntry> = serde_json::from_str(json).unwrap();
        let chunks = chunks_from_corpus(entries, "Default");
        assert_eq!(chunks[0], Chunk::new(0, "plain text", "Default"));
        assert_eq!(chunks[1].id, 1);
        assert_eq!(chunks[1].source, "Report");
        assert_eq!(chunks[1].url.as_deref(), Some("https://x"));
    }

    #[test]
    fn references_are_distinct_and_one_based() {
        let chunks = vec![
            Chunk::new(4, "a", "Report"),
            Chunk::new(2, "b", "Survey"),
            Chunk::new(7, "c", "Report"),
        ];
        let refs = references_for(&chunks);
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0], Reference { id: 1, title: "Report".into(), url: String::new() });
        assert_eq!(refs[1].id, 2);
        assert_eq!(refs[1].title, "Survey");
    }
}
