//! On-disk index artifacts.
//!
//! A built index is persisted as two files that are only meaningful together:
//!
//! - the vector file, little-endian binary: magic `DQVI`, `u32` format
//!   version, `u32` dimension, `u64` row count, then `rows × dimension` `f32`s;
//! - the metadata file, a JSON array of `{text, source, url?}` objects in row
//!   order.
//!
//! Saving writes both files next to their targets under temporary names and
//! renames them into place only once both are complete.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::document::{Chunk, CorpusEntry, chunks_from_corpus};
use crate::error::{RagError, Result};
use crate::index::{KnowledgeIndex, VectorIndex};

const MAGIC: &[u8; 4] = b"DQVI";
const FORMAT_VERSION: u32 = 1;
const HEADER_LEN: usize = 4 + 4 + 4 + 8;

/// Serialize a vector index into the binary vector-file format.
pub fn encode_vectors(vectors: &VectorIndex) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN + vectors.as_slice().len() * 4);
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    out.extend_from_slice(&(vectors.dimensions() as u32).to_le_bytes());
    out.extend_from_slice(&(vectors.len() as u64).to_le_bytes());
    for value in vectors.as_slice() {
        out.extend_from_slice(&value.to_le_bytes());
    }
    out
}

/// Parse the binary vector-file format.
///
/// # Errors
///
/// Returns [`RagError::IndexLoad`] on a bad magic number, an unsupported
/// version, a truncated or oversized payload, or rows that are not unit length.
pub fn decode_vectors(bytes: &[u8]) -> Result<VectorIndex> {
    let header = bytes
        .get(..HEADER_LEN)
        .ok_or_else(|| RagError::IndexLoad("vector file is shorter than its header".into()))?;
    if &header[0..4] != MAGIC {
        return Err(RagError::IndexLoad("vector file has an unknown format".into()));
    }
    let version = u32::from_le_bytes(fixed(&header[4..8]));
    if version != FORMAT_VERSION {
        return Err(RagError::IndexLoad(format!("unsupported vector file version {version}")));
    }
    let dimensions = u32::from_le_bytes(fixed(&header[8..12])) as usize;
    let rows = u64::from_le_bytes(fixed(&header[12..20]));

    let payload = &bytes[HEADER_LEN..];
    let expected = usize::try_from(rows)
        .ok()
        .and_then(|r| r.checked_mul(dimensions))
        .and_then(|n| n.checked_mul(4))
        .ok_or_else(|| RagError::IndexLoad(format!("row count {rows} is out of range")))?;
    if payload.len() != expected {
        return Err(RagError::IndexLoad(format!(
            "vector file declares {rows} rows of {dimensions} dimensions ({expected} bytes) \
             but carries {} bytes",
            payload.len()
        )));
    }

    let data = payload.chunks_exact(4).map(|b| f32::from_le_bytes(fixed(b))).collect();
    VectorIndex::from_raw(dimensions, data)
}

fn fixed<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(bytes);
    out
}

/// Read a chunk corpus file (JSON array of strings or `{text, source}` objects).
///
/// Bare strings are attributed to `default_source`. Chunk ids follow file order.
pub fn read_corpus(path: impl AsRef<Path>, default_source: &str) -> Result<Vec<Chunk>> {
    let reader = BufReader::new(File::open(path.as_ref())?);
    let entries: Vec<CorpusEntry> = serde_json::from_reader(reader)?;
    Ok(chunks_from_corpus(entries, default_source))
}

/// Write chunk texts as a corpus file of plain strings.
pub fn write_corpus(path: impl AsRef<Path>, chunks: &[String]) -> Result<()> {
    write_atomically(path.as_ref(), |w| Ok(serde_json::to_writer_pretty(w, chunks)?))
}

impl KnowledgeIndex {
    /// Load an index from its vector file and metadata file.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::IndexLoad`] if either file is missing or
    /// unreadable, either is malformed, or their row counts differ.
    pub fn load(vectors_path: impl AsRef<Path>, metadata_path: impl AsRef<Path>) -> Result<Self> {
        let vectors_path = vectors_path.as_ref();
        let metadata_path = metadata_path.as_ref();

        let mut bytes = Vec::new();
        File::open(vectors_path)
            .and_then(|f| BufReader::new(f).read_to_end(&mut bytes))
            .map_err(|e| {
                RagError::IndexLoad(format!("cannot read {}: {e}", vectors_path.display()))
            })?;
        let vectors = decode_vectors(&bytes)?;

        let metadata_file = File::open(metadata_path).map_err(|e| {
            RagError::IndexLoad(format!("cannot read {}: {e}", metadata_path.display()))
        })?;
        let metadata: Vec<Chunk> =
            serde_json::from_reader(BufReader::new(metadata_file)).map_err(|e| {
                RagError::IndexLoad(format!("invalid metadata {}: {e}", metadata_path.display()))
            })?;

        let index = Self::new(vectors, metadata)?;
        info!(
            rows = index.len(),
            dimensions = index.vectors().dimensions(),
            vectors = %vectors_path.display(),
            "loaded index"
        );
        Ok(index)
    }

    /// Persist the index as a vector file and a metadata file.
    ///
    /// Both files are staged under temporary names first; the targets are
    /// only replaced once both have been written. If the metadata file cannot
    /// be moved into place, the previous vector file is restored so the pair
    /// on disk never mixes two builds.
    pub fn save(
        &self,
        vectors_path: impl AsRef<Path>,
        metadata_path: impl AsRef<Path>,
    ) -> Result<()> {
        let vectors_path = vectors_path.as_ref();
        let metadata_path = metadata_path.as_ref();

        let staged_vectors =
            stage(vectors_path, |w| Ok(w.write_all(&encode_vectors(self.vectors()))?))?;
        let staged_metadata = match stage(metadata_path, |w| {
            Ok(serde_json::to_writer_pretty(w, self.metadata())?)
        }) {
            Ok(path) => path,
            Err(e) => {
                let _ = fs::remove_file(&staged_vectors);
                return Err(e);
            }
        };

        let discard_staged = || {
            let _ = fs::remove_file(&staged_vectors);
            let _ = fs::remove_file(&staged_metadata);
        };

        let backup = staging_path(vectors_path, "bak");
        let had_previous = vectors_path.exists();
        if had_previous {
            if let Err(e) = fs::rename(vectors_path, &backup) {
                discard_staged();
                return Err(e.into());
            }
        }
        let restore_previous = || {
            if had_previous {
                let _ = fs::rename(&backup, vectors_path);
            } else {
                let _ = fs::remove_file(vectors_path);
            }
        };

        if let Err(e) = fs::rename(&staged_vectors, vectors_path) {
            restore_previous();
            discard_staged();
            return Err(e.into());
        }
        if let Err(e) = fs::rename(&staged_metadata, metadata_path) {
            warn!(error = %e, metadata = %metadata_path.display(), "restoring previous vectors");
            restore_previous();
            discard_staged();
            return Err(e.into());
        }
        if had_previous {
            let _ = fs::remove_file(&backup);
        }
        info!(rows = self.len(), vectors = %vectors_path.display(), "saved index");
        Ok(())
    }
}

fn staging_path(target: &Path, suffix: &str) -> PathBuf {
    let mut name = target.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".");
    name.push(suffix);
    target.with_file_name(name)
}

fn stage(target: &Path, write: impl FnOnce(&mut BufWriter<File>) -> Result<()>) -> Result<PathBuf> {
    if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let staged = staging_path(target, "tmp");
    let mut writer = BufWriter::new(File::create(&staged)?);
    write(&mut writer)?;
    writer.flush()?;
    debug!(path = %staged.display(), "staged artifact");
    Ok(staged)
}

fn write_atomically(
    target: &Path,
    write: impl FnOnce(&mut BufWriter<File>) -> Result<()>,
) -> Result<()> {
    let staged = stage(target, write)?;
    fs::rename(staged, target)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> VectorIndex {
        let mut index = VectorIndex::new(2);
        index.push(&[1.0, 0.0]).unwrap();
        index.push(&[0.6, 0.8]).unwrap();
        index
    }

    #[test]
    fn header_layout_is_stable() {
        let bytes = encode_vectors(&sample());
        assert_eq!(&bytes[..4], b"DQVI");
        assert_eq!(bytes.len(), HEADER_LEN + 2 * 2 * 4);
        assert_eq!(decode_vectors(&bytes).unwrap(), sample());
    }

    #[test]
    fn truncated_payload_is_rejected() {
        let bytes = encode_vectors(&sample());
        let err = decode_vectors(&bytes[..bytes.len() - 1]).unwrap_err();
        assert!(matches!(err, RagError::IndexLoad(_)));
    }

    #[test]
    fn unknown_magic_is_rejected() {
        let mut bytes = encode_vectors(&sample());
        bytes[0] = b'X';
        assert!(matches!(decode_vectors(&bytes), Err(RagError::IndexLoad(_))));
    }
}
