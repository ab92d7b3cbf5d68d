//! Text utilities kept pure for reuse across services and pipelines.
//!
//! Functions exposed here must remain side-effect free so they can be
//! composed from orchestrators without introducing hidden IO or mutable
//! state.

pub mod chunker;
pub mod cleanup;

pub use chunker::{chunk_text, split_sentences};
pub use cleanup::cleanup_text;
