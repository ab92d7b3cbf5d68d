use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_SENTENCE_FORMAT: &str = "regular";
pub const MAX_SOURCE_COUNT: usize = 64;
pub const MAX_TITLE_LEN: usize = 512;

/// Adapter family a conversion request is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConvertRoute {
    Word,
    Slides,
    Image,
    Pdf,
}

impl fmt::Display for ConvertRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConvertRoute::Word => "word",
            ConvertRoute::Slides => "slides",
            ConvertRoute::Image => "image",
            ConvertRoute::Pdf => "pdf",
        };
        f.write_str(label)
    }
}

/// One uploaded document awaiting text extraction.
#[derive(Debug, Clone)]
pub struct ConversionRequest {
    pub file_name: String,
    pub media_type: String,
    pub bytes: Bytes,
    /// Adapter forced by the per-format endpoints; `None` means the provider
    /// sniffs the declared media type.
    pub route: Option<ConvertRoute>,
}

/// A document referenced by object-storage URL instead of inline bytes.
#[derive(Debug, Clone)]
pub struct RemoteConversionRequest {
    pub url: String,
    pub media_type: String,
    pub file_name: Option<String>,
}

/// Extracted text plus per-format metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversionOutcome {
    pub text: String,
    pub slide_count: Option<usize>,
    pub page_count: Option<usize>,
}

#[async_trait]
pub trait ConversionProvider: Send + Sync + 'static {
    async fn convert(
        &self,
        request: ConversionRequest,
    ) -> Result<ConversionOutcome, ConversionError>;

    async fn convert_remote(
        &self,
        request: RemoteConversionRequest,
    ) -> Result<ConversionOutcome, ConversionError>;
}

#[derive(Debug, Clone)]
pub struct ConversionError {
    pub kind: ConversionErrorKind,
    pub message: String,
}

#[derive(Debug, Clone)]
pub enum ConversionErrorKind {
    /// Declared media type matches no known adapter.
    Unsupported { media_type: String },
    /// The underlying parser or remote conversion service failed.
    Extraction,
    /// The object-storage blob could not be materialized locally.
    Download { url: String },
}

impl ConversionError {
    pub fn unsupported(media_type: impl Into<String>) -> Self {
        let media_type = media_type.into();
        ConversionError {
            message: format!("unsupported media type `{media_type}`"),
            kind: ConversionErrorKind::Unsupported { media_type },
        }
    }

    pub fn extraction(message: impl Into<String>) -> Self {
        ConversionError {
            kind: ConversionErrorKind::Extraction,
            message: message.into(),
        }
    }

    pub fn download(url: impl Into<String>, message: impl Into<String>) -> Self {
        ConversionError {
            kind: ConversionErrorKind::Download { url: url.into() },
            message: message.into(),
        }
    }
}

impl fmt::Display for ConversionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ConversionError {}

/// What kind of study artifact a generation call produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum GenerationKind {
    #[default]
    Guide,
    Quiz,
}

/// A labeled block of source text folded into the generation prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceText {
    pub label: String,
    pub text: String,
}

/// One generation request, keyed so a later cancel can reach it.
#[derive(Debug, Clone)]
pub struct GenerationCall {
    pub notebook_id: String,
    pub tab_id: String,
    pub title: String,
    pub kind: GenerationKind,
    pub question_count: Option<usize>,
    pub sources: Vec<SourceText>,
}

/// A titled block of generated content, the unit the presentation layer
/// consumes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StructuredSection {
    pub title: String,
    pub sentences: Vec<SectionSentence>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SectionSentence {
    pub id: String,
    pub text: String,
    pub format: String,
}

#[derive(Debug, Clone)]
pub enum GenerationOutcome {
    Completed { sections: Vec<StructuredSection> },
    /// The in-flight call was cancelled; not a failure.
    Aborted,
}

#[derive(Debug, Clone)]
pub struct GenerationCallError {
    pub message: String,
}

impl GenerationCallError {
    pub fn backend(message: impl Into<String>) -> Self {
        GenerationCallError {
            message: message.into(),
        }
    }
}

impl fmt::Display for GenerationCallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for GenerationCallError {}

#[async_trait]
pub trait GenerationProvider: Send + Sync + 'static {
    async fn generate(
        &self,
        call: GenerationCall,
    ) -> Result<GenerationOutcome, GenerationCallError>;

    /// Abort the in-flight generation registered under the composite id.
    /// Returns `true` only when a live registration was signalled.
    async fn cancel(&self, notebook_id: &str, tab_id: &str) -> bool;
}
