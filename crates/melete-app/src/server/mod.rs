//! HTTP service wiring.
//!
//! Implements the server crate's provider traits over the conversion and
//! generation cores and exposes the `serve` entrypoint used by the binary.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use melete_server::{
    ConversionError, ConversionOutcome, ConversionProvider, ConversionRequest, ConvertRoute,
    GenerationCall, GenerationCallError, GenerationOutcome, GenerationProvider,
    RemoteConversionRequest,
};

use crate::config::AppConfig;
use crate::error::AppError;
use crate::extract::ocr::{OcrExtractor, OcrOptions};
use crate::extract::pdf_remote::RemotePdfExtractor;
use crate::extract::{DocumentConverter, ExtractError, ExtractionResult};
use crate::format::DocumentFormat;
use crate::services::chat::{ChatBackend, HttpChatBackend};
use crate::services::orchestrator::{
    GenerationError, GenerationOrchestrator, GenerationRequest, OrchestratorOptions,
};
use crate::services::registry::{StreamKey, StreamRegistry};
use crate::storage::TempStorageBridge;

const REMOTE_FILE_NAME: &str = "remote-document";

/// Conversion side of the HTTP surface: sniffing, adapter dispatch, and the
/// temporary storage bridge for URL-referenced documents.
pub struct ConversionService {
    converter: Arc<DocumentConverter>,
    bridge: TempStorageBridge,
}

impl ConversionService {
    pub fn new(converter: Arc<DocumentConverter>, bridge: TempStorageBridge) -> Self {
        Self { converter, bridge }
    }

    fn resolve_format(
        route: Option<ConvertRoute>,
        media_type: &str,
    ) -> Result<DocumentFormat, ConversionError> {
        match route {
            Some(ConvertRoute::Word) => Ok(DocumentFormat::Word),
            Some(ConvertRoute::Slides) => Ok(DocumentFormat::SlideDeck),
            Some(ConvertRoute::Image) => Ok(DocumentFormat::Image),
            Some(ConvertRoute::Pdf) => Ok(DocumentFormat::Pdf),
            None => DocumentFormat::from_media_type(media_type)
                .map_err(|err| ConversionError::unsupported(err.media_type)),
        }
    }
}

fn outcome_from_result(result: ExtractionResult) -> ConversionOutcome {
    ConversionOutcome {
        text: result.text,
        slide_count: result.metadata.slide_count,
        page_count: result.metadata.page_count,
    }
}

fn map_extract_error(error: ExtractError) -> ConversionError {
    match error {
        ExtractError::Unsupported(err) => ConversionError::unsupported(err.media_type),
        other => ConversionError::extraction(other.to_string()),
    }
}

#[async_trait]
impl ConversionProvider for ConversionService {
    async fn convert(
        &self,
        request: ConversionRequest,
    ) -> Result<ConversionOutcome, ConversionError> {
        let format = Self::resolve_format(request.route, &request.media_type)?;
        let result = self
            .converter
            .convert(format, request.bytes, &request.file_name)
            .await
            .map_err(map_extract_error)?;
        Ok(outcome_from_result(result))
    }

    async fn convert_remote(
        &self,
        request: RemoteConversionRequest,
    ) -> Result<ConversionOutcome, ConversionError> {
        let format = DocumentFormat::from_media_type(&request.media_type)
            .map_err(|err| ConversionError::unsupported(err.media_type))?;

        let local = self
            .bridge
            .download_to_local(&request.url)
            .await
            .map_err(|error| ConversionError::download(&request.url, error.to_string()))?;
        let bytes = self
            .bridge
            .read_bytes(local.path())
            .await
            .map_err(|error| ConversionError::download(&request.url, error.to_string()))?;

        let file_name = request
            .file_name
            .unwrap_or_else(|| REMOTE_FILE_NAME.to_string());
        let result = self
            .converter
            .convert(format, Bytes::from(bytes), &file_name)
            .await
            .map_err(map_extract_error)?;

        // `local` drops here, removing the staged copy on every path.
        Ok(outcome_from_result(result))
    }
}

/// Generation side of the HTTP surface: orchestrator plus the stream
/// registry the cancel endpoint reaches into.
pub struct GenerationService {
    orchestrator: GenerationOrchestrator,
    registry: Arc<StreamRegistry>,
}

impl GenerationService {
    pub fn new(orchestrator: GenerationOrchestrator, registry: Arc<StreamRegistry>) -> Self {
        Self {
            orchestrator,
            registry,
        }
    }
}

#[async_trait]
impl GenerationProvider for GenerationService {
    async fn generate(
        &self,
        call: GenerationCall,
    ) -> Result<GenerationOutcome, GenerationCallError> {
        let request = GenerationRequest {
            key: StreamKey::new(call.notebook_id, call.tab_id),
            title: call.title,
            kind: call.kind,
            question_count: call.question_count,
            sources: call.sources,
        };

        match self.orchestrator.generate(request).await {
            Ok(sections) => Ok(GenerationOutcome::Completed { sections }),
            Err(GenerationError::Aborted) => Ok(GenerationOutcome::Aborted),
            Err(GenerationError::Backend(error)) => {
                Err(GenerationCallError::backend(error.to_string()))
            }
        }
    }

    async fn cancel(&self, notebook_id: &str, tab_id: &str) -> bool {
        self.registry.abort(&StreamKey::new(notebook_id, tab_id))
    }
}

/// Assemble the full service graph from configuration. Fails fast when the
/// backend API key is missing.
pub fn build_services(
    config: &AppConfig,
) -> Result<(Arc<ConversionService>, Arc<GenerationService>), AppError> {
    let backend: Arc<dyn ChatBackend> =
        Arc::new(HttpChatBackend::from_env(config.generation.api_base.clone())?);
    let registry = Arc::new(StreamRegistry::new());

    let ocr = OcrExtractor::new(
        Arc::clone(&backend),
        OcrOptions::builder()
            .model(config.generation.ocr_model.as_str())
            .max_tokens(config.generation.max_tokens)
            .build(),
    );
    let pdf = config
        .convert
        .pdf_api_base
        .as_deref()
        .map(RemotePdfExtractor::new);
    let converter = Arc::new(DocumentConverter::new(Some(ocr), pdf));

    let scratch_dir = config
        .storage
        .scratch_dir
        .clone()
        .or_else(|| crate::config::default_scratch_dir().ok());
    let bridge = TempStorageBridge::new(scratch_dir);
    let conversion = Arc::new(ConversionService::new(converter, bridge));

    let orchestrator = GenerationOrchestrator::new(
        backend,
        Arc::clone(&registry),
        OrchestratorOptions::builder()
            .model(config.generation.model.as_str())
            .max_tokens(config.generation.max_tokens)
            .temperature(config.generation.temperature)
            .max_source_chars(config.generation.max_source_chars)
            .build(),
    );
    let generation = Arc::new(GenerationService::new(orchestrator, registry));

    Ok((conversion, generation))
}

pub async fn serve(config: AppConfig) -> Result<(), AppError> {
    let (conversion, generation) = build_services(&config)?;
    melete_server::serve(config.server, conversion, generation).await?;
    Ok(())
}
