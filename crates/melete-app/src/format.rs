//! Media-type sniffing for uploaded documents.
//!
//! Dispatch trusts the caller-supplied media type entirely; there is no
//! content-based sniffing. A mislabeled upload is routed to the wrong
//! adapter, which then fails extraction with a signaled error.

use std::fmt;

use thiserror::Error;

const WORD_DOCX: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
const WORD_LEGACY: &str = "application/msword";
const SLIDES_PPTX: &str =
    "application/vnd.openxmlformats-officedocument.presentationml.presentation";
const SLIDES_LEGACY: &str = "application/vnd.ms-powerpoint";
const PDF: &str = "application/pdf";
const IMAGE_PREFIX: &str = "image/";

/// Declared media type matched no known extractor adapter.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unsupported media type `{media_type}`")]
pub struct UnsupportedFormat {
    pub media_type: String,
}

/// The extractor adapter family a document is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentFormat {
    Word,
    SlideDeck,
    Pdf,
    Image,
}

impl DocumentFormat {
    /// Resolve the adapter for a declared media type. Parameters after `;`
    /// are ignored and matching is case-insensitive.
    pub fn from_media_type(media_type: &str) -> Result<Self, UnsupportedFormat> {
        let essence = media_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        match essence.as_str() {
            WORD_DOCX | WORD_LEGACY => Ok(Self::Word),
            SLIDES_PPTX | SLIDES_LEGACY => Ok(Self::SlideDeck),
            PDF => Ok(Self::Pdf),
            _ if essence.starts_with(IMAGE_PREFIX) => Ok(Self::Image),
            _ => Err(UnsupportedFormat {
                media_type: media_type.to_string(),
            }),
        }
    }

    /// Extension-based resolution for the CLI path, where no declared media
    /// type exists.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "docx" | "doc" => Some(Self::Word),
            "pptx" | "ppt" => Some(Self::SlideDeck),
            "pdf" => Some(Self::Pdf),
            "png" | "jpg" | "jpeg" | "webp" | "gif" | "bmp" => Some(Self::Image),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Word => "word",
            Self::SlideDeck => "slide-deck",
            Self::Pdf => "pdf",
            Self::Image => "image",
        }
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_supported_type_maps_to_exactly_one_adapter() {
        let cases = [
            (WORD_DOCX, DocumentFormat::Word),
            (WORD_LEGACY, DocumentFormat::Word),
            (SLIDES_PPTX, DocumentFormat::SlideDeck),
            (SLIDES_LEGACY, DocumentFormat::SlideDeck),
            (PDF, DocumentFormat::Pdf),
            ("image/png", DocumentFormat::Image),
            ("image/jpeg", DocumentFormat::Image),
            ("image/webp", DocumentFormat::Image),
        ];

        for (media_type, expected) in cases {
            let resolved = DocumentFormat::from_media_type(media_type)
                .expect("supported type must resolve");
            assert_eq!(resolved, expected, "wrong adapter for {media_type}");
        }
    }

    #[test]
    fn unsupported_types_fail() {
        for media_type in [
            "text/html",
            "application/zip",
            "video/mp4",
            "application/octet-stream",
            "",
        ] {
            let err = DocumentFormat::from_media_type(media_type)
                .expect_err("unsupported type must fail");
            assert_eq!(err.media_type, media_type);
        }
    }

    #[test]
    fn parameters_and_case_are_ignored() {
        let resolved = DocumentFormat::from_media_type("Application/PDF; charset=binary")
            .expect("parameterized pdf resolves");
        assert_eq!(resolved, DocumentFormat::Pdf);
    }

    #[test]
    fn extension_resolution_covers_cli_inputs() {
        assert_eq!(
            DocumentFormat::from_extension("DOCX"),
            Some(DocumentFormat::Word)
        );
        assert_eq!(
            DocumentFormat::from_extension("pptx"),
            Some(DocumentFormat::SlideDeck)
        );
        assert_eq!(DocumentFormat::from_extension("txt"), None);
    }
}
