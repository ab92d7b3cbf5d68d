//! Parsing of backend output into structured sections.
//!
//! The backend is instructed to open every section with a `Topic:` line; the
//! parser walks the response line by line, collecting a title and body per
//! block. When nothing parses, callers substitute a single placeholder
//! section so the client never receives an empty structure silently.

use melete_server::{DEFAULT_SENTENCE_FORMAT, SectionSentence, StructuredSection};
use uuid::Uuid;

use crate::text::split_sentences;

pub const SECTION_MARKER: &str = "Topic:";
const UNTITLED_TOPIC: &str = "Untitled topic";
const PLACEHOLDER_TITLE: &str = "Study notes";
const PLACEHOLDER_TEXT: &str = "The generated content could not be organized into titled \
sections. Try generating this tab again.";

struct SectionBuilder {
    title: String,
    lines: Vec<String>,
}

/// Split the raw response on `Topic:` markers. Content before the first
/// marker is discarded; blocks whose body yields no sentences are dropped.
pub fn parse_sections(raw: &str) -> Vec<StructuredSection> {
    let mut sections = Vec::new();
    let mut current: Option<SectionBuilder> = None;

    for line in raw.lines() {
        let trimmed = line.trim();
        // Tolerate decoration the backend sometimes adds around the marker,
        // e.g. "**Topic: X**" or "## Topic: X".
        let normalized = trimmed.trim_start_matches(['#', '*', ' ']);

        if let Some(rest) = normalized.strip_prefix(SECTION_MARKER) {
            if let Some(builder) = current.take() {
                finalize(builder, &mut sections);
            }
            let title = rest.trim().trim_matches('*').trim();
            current = Some(SectionBuilder {
                title: title.to_string(),
                lines: Vec::new(),
            });
        } else if let Some(builder) = current.as_mut()
            && !trimmed.is_empty()
        {
            builder.lines.push(trimmed.to_string());
        }
    }

    if let Some(builder) = current.take() {
        finalize(builder, &mut sections);
    }

    sections
}

fn finalize(builder: SectionBuilder, sections: &mut Vec<StructuredSection>) {
    let body = builder.lines.join(" ");
    let sentences: Vec<SectionSentence> = split_sentences(&body)
        .into_iter()
        .map(|text| SectionSentence {
            id: Uuid::new_v4().to_string(),
            text,
            format: DEFAULT_SENTENCE_FORMAT.to_string(),
        })
        .collect();

    if sentences.is_empty() {
        return;
    }

    let title = if builder.title.is_empty() {
        UNTITLED_TOPIC.to_string()
    } else {
        builder.title
    };

    sections.push(StructuredSection { title, sentences });
}

/// The single well-formed section substituted when parsing yields nothing.
pub fn placeholder_section(title_hint: &str) -> StructuredSection {
    let hint = title_hint.trim();
    let title = if hint.is_empty() {
        PLACEHOLDER_TITLE.to_string()
    } else {
        hint.to_string()
    };

    StructuredSection {
        title,
        sentences: vec![SectionSentence {
            id: Uuid::new_v4().to_string(),
            text: PLACEHOLDER_TEXT.to_string(),
            format: DEFAULT_SENTENCE_FORMAT.to_string(),
        }],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_parse_in_order_with_titles_and_sentences() {
        let raw = "Topic: Photosynthesis\nPlants capture light. They produce sugar.\n\n\
                   Topic: Respiration\nCells burn sugar for energy.";
        let sections = parse_sections(raw);

        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].title, "Photosynthesis");
        assert_eq!(sections[0].sentences.len(), 2);
        assert_eq!(sections[0].sentences[0].text, "Plants capture light.");
        assert_eq!(sections[0].sentences[0].format, "regular");
        assert_eq!(sections[1].title, "Respiration");
        assert_eq!(sections[1].sentences.len(), 1);
    }

    #[test]
    fn sentence_ids_are_unique() {
        let raw = "Topic: One\nA. B. C.";
        let sections = parse_sections(raw);
        let ids: Vec<&str> = sections[0]
            .sentences
            .iter()
            .map(|s| s.id.as_str())
            .collect();
        let mut deduped = ids.clone();
        deduped.sort_unstable();
        deduped.dedup();
        assert_eq!(deduped.len(), ids.len());
    }

    #[test]
    fn decorated_markers_still_parse() {
        let raw = "**Topic: Bold Title**\nBody sentence.\n## Topic: Heading Title\nMore body.";
        let sections = parse_sections(raw);
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].title, "Bold Title");
        assert_eq!(sections[1].title, "Heading Title");
    }

    #[test]
    fn preamble_before_the_first_marker_is_ignored() {
        let raw = "Sure, here is your study guide!\n\nTopic: Only Section\nThe content.";
        let sections = parse_sections(raw);
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].title, "Only Section");
    }

    #[test]
    fn untitled_blocks_get_a_fallback_title() {
        let raw = "Topic:\nBody without a title.";
        let sections = parse_sections(raw);
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].title, UNTITLED_TOPIC);
    }

    #[test]
    fn marker_without_body_is_not_a_section() {
        assert!(parse_sections("Topic: Empty\n\nTopic: Also Empty").is_empty());
    }

    #[test]
    fn output_without_markers_parses_to_nothing() {
        assert!(parse_sections("Just a paragraph of prose with no markers.").is_empty());
        assert!(parse_sections("").is_empty());
    }

    #[test]
    fn placeholder_section_is_well_formed() {
        let section = placeholder_section("");
        assert!(!section.title.is_empty());
        assert_eq!(section.sentences.len(), 1);
        assert!(!section.sentences[0].text.is_empty());

        let hinted = placeholder_section("Biology Review");
        assert_eq!(hinted.title, "Biology Review");
    }
}
