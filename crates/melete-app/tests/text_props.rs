//! Property tests for the text utilities.

use proptest::prelude::*;

use melete_app::text::{chunk_text, cleanup_text, split_sentences};

proptest! {
    #[test]
    fn cleanup_is_idempotent(input in ".{0,200}") {
        let once = cleanup_text(&input);
        let twice = cleanup_text(&once);
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn cleanup_with_markdown_noise_is_idempotent(
        words in proptest::collection::vec("[a-z]{1,8}", 0..20),
        markers in proptest::collection::vec(
            prop::sample::select(vec!["**", "*", "_", "__", "`", "```", "# ", "[", "](x)"]),
            0..10
        )
    ) {
        let mut assembled = String::new();
        for (i, word) in words.iter().enumerate() {
            if let Some(marker) = markers.get(i % markers.len().max(1)) {
                assembled.push_str(marker);
            }
            assembled.push_str(word);
            assembled.push(' ');
        }
        let once = cleanup_text(&assembled);
        let twice = cleanup_text(&once);
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn chunks_obey_the_bound_except_lone_oversized_sentences(
        text in "[A-Za-z .!?]{0,300}",
        max_len in 5usize..60
    ) {
        let sentences = split_sentences(&text);
        let chunks = chunk_text(&text, max_len);

        for chunk in &chunks {
            if chunk.chars().count() > max_len {
                prop_assert!(
                    sentences.iter().any(|sentence| sentence == chunk),
                    "oversized chunk must be a single sentence: {chunk:?}"
                );
            }
        }

        prop_assert_eq!(chunks.join(" "), sentences.join(" "));
    }

    #[test]
    fn sentence_splitting_loses_no_non_whitespace_content(text in "[a-z .!?]{0,200}") {
        let rejoined: String = split_sentences(&text).join(" ");
        let squash = |s: &str| s.chars().filter(|c| !c.is_whitespace()).collect::<String>();
        prop_assert_eq!(squash(&rejoined), squash(&text));
    }
}
