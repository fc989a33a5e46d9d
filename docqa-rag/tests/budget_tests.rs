//! Context budget filtering.

use docqa_rag::{Chunk, HeuristicTokenCounter, TokenCounter, filter_chunks};
use proptest::prelude::*;

/// Counts whitespace-separated words.
struct WordCounter;

impl TokenCounter for WordCounter {
    fn count(&self, text: &str) -> usize {
        text.split_whitespace().count()
    }
}

fn chunks(texts: &[&str]) -> Vec<Chunk> {
    texts.iter().enumerate().map(|(i, t)| Chunk::new(i, *t, "doc")).collect()
}

#[test]
fn stops_at_first_chunk_over_budget() {
    let input = chunks(&["one two three", "four five six seven", "eight"]);
    let kept = filter_chunks(input.clone(), 6, &WordCounter);
    // "eight" would fit but follows an excluded chunk.
    assert_eq!(kept, input[..1].to_vec());
}

#[test]
fn exact_budget_is_inclusive() {
    let input = chunks(&["one two", "three four"]);
    assert_eq!(filter_chunks(input.clone(), 4, &WordCounter), input);
}

#[test]
fn oversized_first_chunk_yields_nothing() {
    assert!(filter_chunks(chunks(&["one two three"]), 2, &WordCounter).is_empty());
}

#[test]
fn heuristic_counter_covers_long_words() {
    let counter = HeuristicTokenCounter;
    assert_eq!(counter.count("internationalization"), 5);
    assert_eq!(counter.count("a b c"), 3);
}

/// **Budget filter prefix property**
/// *For any* chunk list and budget, the output is a prefix of the input whose
/// token total fits the budget, and adding the next chunk would overflow it.
mod prop_budget_prefix {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn output_is_maximal_fitting_prefix(
            texts in proptest::collection::vec("[a-z]{1,8}( [a-z]{1,8}){0,12}", 0..15),
            max_tokens in 0usize..80,
        ) {
            let input: Vec<Chunk> =
                texts.iter().enumerate().map(|(i, t)| Chunk::new(i, t.clone(), "doc")).collect();
            let counter = HeuristicTokenCounter;
            let kept = filter_chunks(input.clone(), max_tokens, &counter);

            prop_assert_eq!(&input[..kept.len()], &kept[..]);
            let total: usize = kept.iter().map(|c| counter.count(&c.text)).sum();
            prop_assert!(total <= max_tokens);
            if let Some(next) = input.get(kept.len()) {
                prop_assert!(total + counter.count(&next.text) > max_tokens);
            }
        }
    }
}
