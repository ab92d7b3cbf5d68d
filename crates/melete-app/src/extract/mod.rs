//! Extractor adapters behind a uniform `(bytes) -> text` contract.
//!
//! Every adapter normalizes its failure into [`ExtractError`] at this
//! boundary; nothing below it leaks library-specific errors into the HTTP
//! layer. CPU-bound archive parsing runs on the blocking pool.

pub mod ocr;
pub mod pdf_remote;
pub mod slides;
pub mod word;

use bytes::Bytes;
use thiserror::Error;

use crate::format::{DocumentFormat, UnsupportedFormat};
use ocr::OcrExtractor;
use pdf_remote::RemotePdfExtractor;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractionMetadata {
    pub slide_count: Option<usize>,
    pub page_count: Option<usize>,
}

/// Extracted text plus per-format metadata, immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionResult {
    pub text: String,
    pub metadata: ExtractionMetadata,
}

impl ExtractionResult {
    fn plain(text: String) -> Self {
        Self {
            text,
            metadata: ExtractionMetadata::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error(transparent)]
    Unsupported(#[from] UnsupportedFormat),
    #[error("{format} extraction failed: {details}")]
    Failed {
        format: DocumentFormat,
        details: String,
    },
    #[error("extraction task join failed: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}

impl ExtractError {
    fn failed(format: DocumentFormat, error: impl std::fmt::Display) -> Self {
        ExtractError::Failed {
            format,
            details: error.to_string(),
        }
    }
}

/// Tagged dispatch over the four extractor adapters. Network-backed adapters
/// are optional; converting through an unconfigured one fails with a
/// signaled extraction error.
pub struct DocumentConverter {
    ocr: Option<OcrExtractor>,
    pdf: Option<RemotePdfExtractor>,
}

impl DocumentConverter {
    pub fn new(ocr: Option<OcrExtractor>, pdf: Option<RemotePdfExtractor>) -> Self {
        Self { ocr, pdf }
    }

    /// Sniff the declared media type and dispatch to the matching adapter.
    pub async fn convert_media_type(
        &self,
        media_type: &str,
        bytes: Bytes,
        file_name: &str,
    ) -> Result<ExtractionResult, ExtractError> {
        let format = DocumentFormat::from_media_type(media_type)?;
        self.convert(format, bytes, file_name).await
    }

    pub async fn convert(
        &self,
        format: DocumentFormat,
        bytes: Bytes,
        file_name: &str,
    ) -> Result<ExtractionResult, ExtractError> {
        match format {
            DocumentFormat::Word => {
                let text = tokio::task::spawn_blocking(move || word::extract_word_text(&bytes))
                    .await?
                    .map_err(|error| ExtractError::failed(DocumentFormat::Word, error))?;
                Ok(ExtractionResult::plain(text))
            }
            DocumentFormat::SlideDeck => {
                let deck = tokio::task::spawn_blocking(move || slides::extract_slide_text(&bytes))
                    .await?
                    .map_err(|error| ExtractError::failed(DocumentFormat::SlideDeck, error))?;
                Ok(ExtractionResult {
                    text: deck.text,
                    metadata: ExtractionMetadata {
                        slide_count: Some(deck.slide_count),
                        page_count: None,
                    },
                })
            }
            DocumentFormat::Image => {
                let Some(ocr) = &self.ocr else {
                    return Err(ExtractError::failed(
                        DocumentFormat::Image,
                        "image OCR backend is not configured",
                    ));
                };
                let text = ocr
                    .extract(&bytes)
                    .await
                    .map_err(|error| ExtractError::failed(DocumentFormat::Image, error))?;
                Ok(ExtractionResult::plain(text))
            }
            DocumentFormat::Pdf => {
                let Some(pdf) = &self.pdf else {
                    return Err(ExtractError::failed(
                        DocumentFormat::Pdf,
                        "remote PDF conversion is not configured",
                    ));
                };
                let converted = pdf
                    .extract(&bytes, file_name)
                    .await
                    .map_err(|error| ExtractError::failed(DocumentFormat::Pdf, error))?;
                Ok(ExtractionResult {
                    text: converted.text,
                    metadata: ExtractionMetadata {
                        slide_count: None,
                        page_count: converted.page_count,
                    },
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bare_converter() -> DocumentConverter {
        DocumentConverter::new(None, None)
    }

    #[tokio::test]
    async fn unknown_media_type_is_rejected_before_dispatch() {
        let converter = bare_converter();
        let err = converter
            .convert_media_type("text/html", Bytes::from_static(b"<html/>"), "page.html")
            .await
            .expect_err("unsupported type must fail");
        assert!(matches!(err, ExtractError::Unsupported(_)));
    }

    #[tokio::test]
    async fn unconfigured_network_adapters_fail_with_details() {
        let converter = bare_converter();

        let err = converter
            .convert(DocumentFormat::Image, Bytes::from_static(b"png"), "scan.png")
            .await
            .expect_err("missing ocr backend must fail");
        assert!(err.to_string().contains("not configured"), "{err}");

        let err = converter
            .convert(DocumentFormat::Pdf, Bytes::from_static(b"pdf"), "doc.pdf")
            .await
            .expect_err("missing pdf service must fail");
        assert!(err.to_string().contains("not configured"), "{err}");
    }

    #[tokio::test]
    async fn word_failures_surface_both_strategy_messages() {
        let converter = bare_converter();
        let err = converter
            .convert(
                DocumentFormat::Word,
                Bytes::from_static(b"not a zip"),
                "broken.docx",
            )
            .await
            .expect_err("garbage docx must fail");
        let message = err.to_string();
        assert!(message.contains("word extraction failed"), "{message}");
        assert!(message.contains("primary strategy failed"), "{message}");
        assert!(message.contains("fallback strategy failed"), "{message}");
    }
}
