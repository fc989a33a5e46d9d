//! Support code for the `docqa` binary: on-disk layout of the data folder
//! and configuration loading.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use docqa_rag::RagConfig;

/// Source attributed to corpus entries that carry none.
pub const DEFAULT_SOURCE: &str = "corpus";

/// Locations of the corpus and index files under a data folder.
///
/// ```text
/// <root>/chunks/chunks.json
/// <root>/embeddings/vectors.bin
/// <root>/embeddings/metadata.json
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataLayout {
    root: PathBuf,
}

impl DataLayout {
    /// Lay out files under `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The data folder.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The chunk corpus written by `docqa chunk`.
    pub fn chunks_file(&self) -> PathBuf {
        self.root.join("chunks").join("chunks.json")
    }

    /// The little-endian vector file.
    pub fn vectors_file(&self) -> PathBuf {
        self.root.join("embeddings").join("vectors.bin")
    }

    /// The JSON row metadata aligned with the vector file.
    pub fn metadata_file(&self) -> PathBuf {
        self.root.join("embeddings").join("metadata.json")
    }

    /// Create the `chunks/` and `embeddings/` directories if missing.
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [self.root.join("chunks"), self.root.join("embeddings")] {
            fs::create_dir_all(&dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }
        Ok(())
    }
}

/// Load a [`RagConfig`] from a JSON file, or the defaults when `path` is `None`.
///
/// Missing fields take their defaults; the result is validated.
pub fn load_config(path: Option<&Path>) -> Result<RagConfig> {
    let config = match path {
        Some(path) => {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("failed to read config {}", path.display()))?;
            serde_json::from_str::<RagConfig>(&raw)
                .with_context(|| format!("invalid config {}", path.display()))?
        }
        None => RagConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_paths() {
        let layout = DataLayout::new("/data");
        assert_eq!(layout.chunks_file(), PathBuf::from("/data/chunks/chunks.json"));
        assert_eq!(layout.vectors_file(), PathBuf::from("/data/embeddings/vectors.bin"));
        assert_eq!(layout.metadata_file(), PathBuf::from("/data/embeddings/metadata.json"));
    }

    #[test]
    fn ensure_dirs_creates_both() {
        let dir = tempfile::tempdir().unwrap();
        let layout = DataLayout::new(dir.path());
        layout.ensure_dirs().unwrap();
        assert!(dir.path().join("chunks").is_dir());
        assert!(dir.path().join("embeddings").is_dir());
    }

    #[test]
    fn partial_config_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"top_k": 3, "domain_threshold": 0.4}"#).unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.top_k, 3);
        assert_eq!(config.domain_threshold, 0.4);
        assert_eq!(config.chunk_max_tokens, 500);
    }

    #[test]
    fn invalid_config_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"top_k": 0}"#).unwrap();
        assert!(load_config(Some(&path)).is_err());
    }

    #[test]
    fn no_path_gives_defaults() {
        assert_eq!(load_config(None).unwrap(), RagConfig::default());
    }
}
