//! Orchestration layer for IO-bound services.
//!
//! Modules exposed here coordinate external systems (the generative backend,
//! the stream registry) and must avoid embedding pure transforms. Keep
//! stateless helpers in `crate::text` and `crate::pipeline` so concurrency
//! and resource accounting stay localized.

pub mod chat;
pub mod orchestrator;
pub mod registry;

pub use chat::{ChatBackend, ChatCall, ChatError, HttpChatBackend, ResponseFormat, UserContent, UserPart};
pub use orchestrator::{
    GenerationError, GenerationOrchestrator, GenerationRequest, OrchestratorOptions,
};
pub use registry::{RegisteredStream, StreamKey, StreamRegistry};
