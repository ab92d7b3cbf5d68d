//! Content generation orchestrator.
//!
//! Folds collected source text into one backend call, tracks the call under
//! the stream registry so a later request can abort it, and parses the
//! response into structured sections. An aborted call surfaces as
//! [`GenerationError::Aborted`], distinct from backend failures.

use std::sync::Arc;

use bon::Builder;
use melete_server::{GenerationKind, SourceText, StructuredSection};
use thiserror::Error;

use crate::pipeline::{build_generation_prompt, fold_sources, parse_sections, placeholder_section};
use crate::services::chat::{ChatBackend, ChatCall, ChatError, UserContent};
use crate::services::registry::{StreamKey, StreamRegistry};

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generation aborted before completion")]
    Aborted,
    #[error(transparent)]
    Backend(ChatError),
}

#[derive(Debug, Clone, Builder)]
pub struct OrchestratorOptions {
    #[builder(into)]
    pub model: String,
    #[builder(default = 4096)]
    pub max_tokens: u32,
    #[builder(default = 0.7)]
    pub temperature: f32,
    #[builder(default = 24_000)]
    pub max_source_chars: usize,
}

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub key: StreamKey,
    pub title: String,
    pub kind: GenerationKind,
    pub question_count: Option<usize>,
    pub sources: Vec<SourceText>,
}

pub struct GenerationOrchestrator {
    backend: Arc<dyn ChatBackend>,
    registry: Arc<StreamRegistry>,
    options: OrchestratorOptions,
}

impl GenerationOrchestrator {
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        registry: Arc<StreamRegistry>,
        options: OrchestratorOptions,
    ) -> Self {
        Self {
            backend,
            registry,
            options,
        }
    }

    pub async fn generate(
        &self,
        request: GenerationRequest,
    ) -> Result<Vec<StructuredSection>, GenerationError> {
        let folded = fold_sources(&request.sources, self.options.max_source_chars);
        if folded.dropped > 0 || folded.truncated {
            tracing::warn!(
                included = folded.included,
                dropped = folded.dropped,
                truncated = folded.truncated,
                "source material exceeded the prompt budget"
            );
        }

        let prompt = build_generation_prompt(
            &request.title,
            request.kind,
            request.question_count,
            &folded.body,
        );

        let call = ChatCall::builder()
            .model(self.options.model.as_str())
            .system_prompt(prompt.system_message)
            .user_content(UserContent::Text(prompt.user_message))
            .max_tokens(self.options.max_tokens)
            .temperature(self.options.temperature)
            .build();

        let registered = self.registry.register(request.key.clone());

        match self.backend.complete(call, &registered.token).await {
            Ok(content) => {
                self.registry.complete(&request.key, registered.id);
                let sections = parse_sections(&content);
                if sections.is_empty() {
                    tracing::warn!(
                        title = %request.title,
                        "backend response carried no section markers; substituting placeholder"
                    );
                    return Ok(vec![placeholder_section(&request.title)]);
                }
                Ok(sections)
            }
            // An abort already removed the registry entry.
            Err(ChatError::Aborted) => Err(GenerationError::Aborted),
            Err(error) => {
                self.registry.complete(&request.key, registered.id);
                Err(GenerationError::Backend(error))
            }
        }
    }
}
