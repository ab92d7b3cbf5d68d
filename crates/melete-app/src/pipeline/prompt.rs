//! Prompt construction for the content generation pipeline.
//!
//! These helpers stay pure: they clean and fold labeled source text into a
//! bounded prompt body and render the system/user instructions for the
//! requested artifact kind. Budget accounting is reported back so the
//! orchestrator can log what was dropped.

use melete_server::{GenerationKind, SourceText};

use crate::text::{chunk_text, cleanup_text};

const FOLD_CHUNK_CHARS: usize = 1_000;
const DEFAULT_QUIZ_QUESTIONS: usize = 10;
const FALLBACK_SOURCE_LABEL: &str = "Untitled source";

const GUIDE_SYSTEM_PROMPT: &str = "You are an expert study assistant. Organize the provided \
material into clearly titled study sections. Start every section with a line of the exact form \
`Topic: <section title>` and follow it with the section content written as complete sentences. \
Respond with plain text only; do not use markdown formatting.";

const QUIZ_SYSTEM_PROMPT: &str = "You are an expert quiz writer. Turn the provided material into \
quiz sections. Start every section with a line of the exact form `Topic: <section title>` and \
follow it with the questions for that section, one complete sentence per question, each ending \
with a question mark. Respond with plain text only; do not use markdown formatting.";

/// Complete prompt package for one generation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationPrompt {
    pub system_message: String,
    pub user_message: String,
}

/// Source text folded into a single labeled body, with budget accounting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoldedSources {
    pub body: String,
    pub included: usize,
    pub dropped: usize,
    pub truncated: bool,
}

/// Clean each source, label it, and pack it into at most `max_chars`
/// characters of body text. Sources past the budget are dropped whole; the
/// source straddling the boundary is cut on chunk boundaries.
pub fn fold_sources(sources: &[SourceText], max_chars: usize) -> FoldedSources {
    let mut body = String::new();
    let mut used = 0usize;
    let mut included = 0usize;
    let mut dropped = 0usize;
    let mut truncated = false;

    for source in sources {
        let cleaned = cleanup_text(&source.text);
        if cleaned.is_empty() {
            continue;
        }

        if used >= max_chars {
            dropped += 1;
            continue;
        }

        let remaining = max_chars - used;
        let cleaned_len = cleaned.chars().count();
        let taken = if cleaned_len <= remaining {
            cleaned
        } else {
            truncated = true;
            let mut acc = String::new();
            let mut acc_len = 0usize;
            for chunk in chunk_text(&cleaned, FOLD_CHUNK_CHARS) {
                let chunk_len = chunk.chars().count() + usize::from(!acc.is_empty());
                if acc_len + chunk_len > remaining {
                    break;
                }
                if !acc.is_empty() {
                    acc.push(' ');
                }
                acc.push_str(&chunk);
                acc_len += chunk_len;
            }
            if acc.is_empty() {
                dropped += 1;
                continue;
            }
            acc
        };

        used += taken.chars().count();
        let label = source.label.trim();
        let label = if label.is_empty() {
            FALLBACK_SOURCE_LABEL
        } else {
            label
        };
        body.push_str(&format!("Document: {label}\n{taken}\n\n"));
        included += 1;
    }

    FoldedSources {
        body,
        included,
        dropped,
        truncated,
    }
}

/// Render the system and user prompts for the requested artifact.
pub fn build_generation_prompt(
    title: &str,
    kind: GenerationKind,
    question_count: Option<usize>,
    body: &str,
) -> GenerationPrompt {
    match kind {
        GenerationKind::Guide => GenerationPrompt {
            system_message: GUIDE_SYSTEM_PROMPT.to_string(),
            user_message: format!(
                "Create a study guide titled \"{title}\" from the material below. Cover every \
                 major idea and keep sections focused.\n\n{body}"
            ),
        },
        GenerationKind::Quiz => {
            let questions = question_count.unwrap_or(DEFAULT_QUIZ_QUESTIONS).max(1);
            GenerationPrompt {
                system_message: QUIZ_SYSTEM_PROMPT.to_string(),
                user_message: format!(
                    "Write a quiz titled \"{title}\" with {questions} questions in total, based \
                     only on the material below.\n\n{body}"
                ),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(label: &str, text: &str) -> SourceText {
        SourceText {
            label: label.to_string(),
            text: text.to_string(),
        }
    }

    #[test]
    fn folded_sources_are_labeled_and_cleaned() {
        let folded = fold_sources(
            &[
                source("lecture.pdf", "# Heading\nMitochondria produce **ATP**."),
                source("", "Plain note."),
            ],
            10_000,
        );

        assert_eq!(folded.included, 2);
        assert_eq!(folded.dropped, 0);
        assert!(!folded.truncated);
        assert!(
            folded
                .body
                .contains("Document: lecture.pdf\nHeading Mitochondria produce ATP.")
        );
        assert!(folded.body.contains("Document: Untitled source\nPlain note."));
    }

    #[test]
    fn sources_past_the_budget_are_dropped_whole() {
        let folded = fold_sources(
            &[
                source("a", "First source sentence."),
                source("b", "Second source sentence."),
            ],
            22,
        );

        assert_eq!(folded.included, 1);
        assert_eq!(folded.dropped, 1);
        assert!(folded.body.contains("First source sentence."));
        assert!(!folded.body.contains("Second"));
    }

    #[test]
    fn a_straddling_source_is_cut_on_chunk_boundaries() {
        let long_text = (0..50)
            .map(|i| format!("Sentence number {i} fills some space."))
            .collect::<Vec<_>>()
            .join(" ");
        let folded = fold_sources(&[source("big", &long_text)], 1_200);

        assert_eq!(folded.included, 1);
        assert!(folded.truncated);
        assert!(folded.body.chars().count() < long_text.chars().count());
    }

    #[test]
    fn empty_sources_are_skipped_silently() {
        let folded = fold_sources(&[source("empty", "   \n")], 100);
        assert_eq!(folded.included, 0);
        assert_eq!(folded.dropped, 0);
        assert!(folded.body.is_empty());
    }

    #[test]
    fn guide_prompt_carries_the_section_marker_instruction() {
        let prompt = build_generation_prompt("Cell Biology", GenerationKind::Guide, None, "body");
        assert!(prompt.system_message.contains("Topic:"));
        assert!(prompt.user_message.contains("Cell Biology"));
        assert!(prompt.user_message.ends_with("body"));
    }

    #[test]
    fn quiz_prompt_defaults_the_question_count() {
        let prompt = build_generation_prompt("Algebra", GenerationKind::Quiz, None, "body");
        assert!(prompt.user_message.contains("10 questions"));

        let prompt = build_generation_prompt("Algebra", GenerationKind::Quiz, Some(5), "body");
        assert!(prompt.user_message.contains("5 questions"));
        assert!(prompt.system_message.contains("Topic:"));
    }
}
