//! Sentence segmentation and bounded chunking of cleaned source text.
//!
//! Splitting happens after a sentence terminator (`.`, `!`, `?`) that is
//! followed by whitespace or end of input. The regex crate has no lookbehind,
//! so the boundary scan is written by hand. Both functions are pure and their
//! output is restartable; nothing here streams.

/// Split text into trimmed sentences. Terminator runs (`?!`) stay attached to
/// their sentence; abbreviations like "e.g." split the same way the original
/// boundary rule did.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        current.push(ch);
        if matches!(ch, '.' | '!' | '?')
            && chars.peek().is_none_or(|next| next.is_whitespace())
        {
            push_trimmed(&mut sentences, &mut current);
        }
    }
    push_trimmed(&mut sentences, &mut current);

    sentences
}

fn push_trimmed(sentences: &mut Vec<String>, current: &mut String) {
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        sentences.push(trimmed.to_string());
    }
    current.clear();
}

/// Greedily pack sentences into chunks of at most `max_len` characters
/// (joined by single spaces). A lone sentence longer than `max_len` is
/// emitted whole as an oversized chunk rather than split mid-sentence.
pub fn chunk_text(text: &str, max_len: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for sentence in split_sentences(text) {
        let sentence_len = sentence.chars().count();
        if current.is_empty() {
            current = sentence;
            current_len = sentence_len;
            continue;
        }
        if current_len + 1 + sentence_len > max_len {
            chunks.push(std::mem::take(&mut current));
            current = sentence;
            current_len = sentence_len;
        } else {
            current.push(' ');
            current.push_str(&sentence);
            current_len += 1 + sentence_len;
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_terminators_followed_by_whitespace() {
        let sentences = split_sentences("First one. Second one! Third one? Fourth");
        assert_eq!(
            sentences,
            vec!["First one.", "Second one!", "Third one?", "Fourth"]
        );
    }

    #[test]
    fn terminator_runs_stay_attached() {
        let sentences = split_sentences("Really?! Yes.");
        assert_eq!(sentences, vec!["Really?!", "Yes."]);
    }

    #[test]
    fn no_split_without_following_whitespace() {
        let sentences = split_sentences("Version 1.2 shipped");
        assert_eq!(sentences, vec!["Version 1.2 shipped"]);
    }

    #[test]
    fn empty_and_whitespace_inputs_yield_nothing() {
        assert!(split_sentences("").is_empty());
        assert!(split_sentences("   \n\t ").is_empty());
    }

    #[test]
    fn chunks_respect_the_length_bound() {
        let text = "Aaa bbb. Ccc ddd. Eee fff. Ggg hhh.";
        let chunks = chunk_text(text, 20);
        assert_eq!(chunks, vec!["Aaa bbb. Ccc ddd.", "Eee fff. Ggg hhh."]);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 20);
        }
    }

    #[test]
    fn oversized_sentence_is_emitted_whole() {
        let long = "This single sentence is far longer than the configured bound.";
        let text = format!("Short. {long} Tail.");
        let chunks = chunk_text(&text, 10);
        assert_eq!(chunks, vec!["Short.", long, "Tail."]);
    }

    #[test]
    fn joined_chunks_reconstruct_the_sentence_stream() {
        let text = "One sentence here. Another follows!  A third?\nAnd a trailing fragment";
        let sentences = split_sentences(text);
        let chunks = chunk_text(text, 25);
        assert_eq!(chunks.join(" "), sentences.join(" "));
    }
}
