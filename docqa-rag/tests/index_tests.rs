//! Vector index search, thresholds and row/metadata alignment.

mod common;

use common::index_of;
use docqa_rag::embedding::l2_norm;
use docqa_rag::{Chunk, KnowledgeIndex, RagError, VectorIndex, normalize};
use proptest::prelude::*;

fn at_similarity(s: f32) -> [f32; 2] {
    [s, (1.0 - s * s).sqrt()]
}

#[test]
fn threshold_keeps_only_close_neighbours() {
    let index = index_of(&[
        ("close", "doc", at_similarity(0.9)),
        ("borderline", "doc", at_similarity(0.55)),
        ("far", "doc", at_similarity(0.2)),
    ]);

    let hits = index.search(&[1.0, 0.0], 3, 0.6).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].chunk.text, "close");
    assert!((hits[0].score - 0.9).abs() < 1e-3);
}

#[test]
fn nothing_above_threshold_is_empty_not_error() {
    let index = index_of(&[("far", "doc", at_similarity(0.2))]);
    assert!(index.search(&[1.0, 0.0], 5, 0.6).unwrap().is_empty());
}

#[test]
fn ties_break_by_ascending_row() {
    let index = index_of(&[
        ("a", "doc", [0.0, 1.0]),
        ("b", "doc", [1.0, 0.0]),
        ("c", "doc", [1.0, 0.0]),
        ("d", "doc", [1.0, 0.0]),
    ]);

    let hits = index.search(&[1.0, 0.0], 3, 0.0).unwrap();
    let texts: Vec<&str> = hits.iter().map(|h| h.chunk.text.as_str()).collect();
    assert_eq!(texts, vec!["b", "c", "d"]);
    assert_eq!(hits[0].chunk.id, 1);
}

#[test]
fn k_larger_than_index_returns_all_rows() {
    let index = index_of(&[("a", "doc", [1.0, 0.0]), ("b", "doc", [0.6, 0.8])]);
    assert_eq!(index.search(&[1.0, 0.0], 10, -1.0).unwrap().len(), 2);
}

#[test]
fn query_dimension_mismatch_is_an_embedding_error() {
    let index = index_of(&[("a", "doc", [1.0, 0.0])]);
    let err = index.search(&[1.0, 0.0, 0.0], 1, 0.0).unwrap_err();
    assert!(matches!(err, RagError::EmbeddingService { .. }));
}

#[test]
fn misaligned_metadata_is_rejected() {
    let mut vectors = VectorIndex::new(2);
    vectors.push(&[1.0, 0.0]).unwrap();
    vectors.push(&[0.0, 1.0]).unwrap();

    let err = KnowledgeIndex::new(vectors, vec![Chunk::new(0, "only one", "doc")]).unwrap_err();
    assert!(matches!(err, RagError::IndexLoad(_)));
}

#[test]
fn metadata_ids_follow_rows() {
    let mut vectors = VectorIndex::new(2);
    vectors.push(&[1.0, 0.0]).unwrap();
    vectors.push(&[0.0, 1.0]).unwrap();
    let metadata = vec![Chunk::new(41, "first", "doc"), Chunk::new(7, "second", "doc")];

    let index = KnowledgeIndex::new(vectors, metadata).unwrap();
    let ids: Vec<usize> = index.metadata().iter().map(|c| c.id).collect();
    assert_eq!(ids, vec![0, 1]);
}

#[test]
fn push_rejects_wrong_dimension_and_unnormalized_rows() {
    let mut vectors = VectorIndex::new(3);
    assert!(matches!(vectors.push(&[1.0, 0.0]), Err(RagError::EmbeddingService { .. })));
    assert!(matches!(vectors.push(&[3.0, 4.0, 0.0]), Err(RagError::EmbeddingService { .. })));
    assert!(vectors.is_empty());
}

#[test]
fn from_raw_rejects_partial_rows_and_unnormalized_rows() {
    assert!(matches!(VectorIndex::from_raw(2, vec![1.0, 0.0, 1.0]), Err(RagError::IndexLoad(_))));
    assert!(matches!(VectorIndex::from_raw(2, vec![3.0, 4.0]), Err(RagError::IndexLoad(_))));
    assert!(matches!(VectorIndex::from_raw(0, vec![]), Err(RagError::IndexLoad(_))));
    assert_eq!(VectorIndex::from_raw(2, vec![0.6, 0.8]).unwrap().len(), 1);
}

#[test]
fn centroid_is_mean_of_rows() {
    let mut vectors = VectorIndex::new(2);
    vectors.push(&[1.0, 0.0]).unwrap();
    vectors.push(&[0.0, 1.0]).unwrap();
    assert_eq!(vectors.centroid().unwrap(), vec![0.5, 0.5]);
    assert!(VectorIndex::new(2).centroid().is_none());
}

/// Generate a non-zero L2-normalized embedding of the given dimension.
fn arb_normalized_embedding(dim: usize) -> impl Strategy<Value = Vec<f32>> {
    proptest::collection::vec(-1.0f32..1.0f32, dim).prop_filter_map("non-zero embedding", |mut v| {
        if l2_norm(&v) < 1e-3 {
            return None;
        }
        normalize(&mut v).ok()?;
        Some(v)
    })
}

fn build(rows: &[Vec<f32>], dim: usize) -> KnowledgeIndex {
    let mut vectors = VectorIndex::new(dim);
    let mut metadata = Vec::new();
    for (i, row) in rows.iter().enumerate() {
        vectors.push(row).unwrap();
        metadata.push(Chunk::new(i, format!("chunk {i}"), "doc"));
    }
    KnowledgeIndex::new(vectors, metadata).unwrap()
}

/// **Vector normalization**
/// *For any* non-zero vector, normalizing it yields unit length within 1e-3.
mod prop_normalization {
    use super::*;

    proptest! {
        #[test]
        fn normalized_vectors_are_unit_length(
            mut v in proptest::collection::vec(-100.0f32..100.0f32, 1..64),
        ) {
            prop_assume!(l2_norm(&v) > 1e-3);
            normalize(&mut v).unwrap();
            prop_assert!((l2_norm(&v) - 1.0).abs() < 1e-3);
        }
    }
}

/// **Search ordering and threshold monotonicity**
/// *For any* index and query, results are ordered by descending similarity,
/// bounded by `k`, and raising the threshold never grows the result set.
mod prop_search {
    use super::*;

    const DIM: usize = 8;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn ordered_bounded_and_monotone(
            rows in proptest::collection::vec(arb_normalized_embedding(DIM), 1..20),
            query in arb_normalized_embedding(DIM),
            k in 1usize..25,
            low in -1.0f32..1.0f32,
            delta in 0.0f32..1.0f32,
        ) {
            let index = build(&rows, DIM);
            let high = low + delta;

            let loose = index.search(&query, k, low).unwrap();
            let strict = index.search(&query, k, high).unwrap();

            prop_assert!(loose.len() <= k.min(rows.len()));
            prop_assert!(strict.len() <= loose.len());
            for pair in loose.windows(2) {
                prop_assert!(pair[0].score >= pair[1].score);
            }
            for hit in &strict {
                prop_assert!(hit.score >= high);
            }
        }
    }
}
