//! Pure helpers for the content generation pipeline.
//!
//! Prompt construction and response parsing live here so the orchestrator in
//! `crate::services` stays focused on IO, registration, and cancellation.

pub mod prompt;
pub mod sections;

pub use prompt::{FoldedSources, GenerationPrompt, build_generation_prompt, fold_sources};
pub use sections::{SECTION_MARKER, parse_sections, placeholder_section};
