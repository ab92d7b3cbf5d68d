//! Image text extraction through the vision-capable generation backend.
//!
//! Each request gets its own worker: the image is decoded, bounded to a
//! maximum edge, re-encoded as JPEG on the blocking pool, and shipped to the
//! backend as a base64 data URL. All worker state is dropped on every exit
//! path. Recognition is not cancellable mid-flight; once issued, the call
//! runs to completion.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use bon::Builder;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::GenericImageView;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::services::chat::{ChatBackend, ChatCall, ChatError, UserContent, UserPart};

const OCR_SYSTEM_PROMPT: &str = "You are a meticulous OCR engine. Return a faithful plain-text \
transcription of the supplied image, preserving reading order. Do not invent content and do not \
add commentary.";
const OCR_USER_PROMPT: &str = "Transcribe all text in this image.";
const JPEG_QUALITY: u8 = 90;

#[derive(Debug, Error)]
pub enum OcrExtractError {
    #[error("failed to decode image: {0}")]
    Decode(#[source] image::ImageError),
    #[error("failed to encode image: {0}")]
    Encode(#[source] image::ImageError),
    #[error("ocr task join failed: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
    #[error(transparent)]
    Backend(#[from] ChatError),
}

/// Parameters controlling OCR execution.
#[derive(Debug, Clone, Builder)]
pub struct OcrOptions {
    #[builder(into)]
    pub model: String,
    #[builder(default = 1280)]
    pub image_max_edge: u32,
    #[builder(default = 4096)]
    pub max_tokens: u32,
}

pub struct OcrExtractor {
    backend: Arc<dyn ChatBackend>,
    options: OcrOptions,
}

impl OcrExtractor {
    pub fn new(backend: Arc<dyn ChatBackend>, options: OcrOptions) -> Self {
        Self { backend, options }
    }

    pub async fn extract(&self, bytes: &[u8]) -> Result<String, OcrExtractError> {
        let owned = bytes.to_vec();
        let max_edge = self.options.image_max_edge;
        let prepared =
            tokio::task::spawn_blocking(move || prepare_image_for_ocr(&owned, max_edge)).await??;

        let data_url = format!(
            "data:image/jpeg;base64,{}",
            BASE64_STANDARD.encode(&prepared)
        );

        let call = ChatCall::builder()
            .model(self.options.model.as_str())
            .system_prompt(OCR_SYSTEM_PROMPT)
            .user_content(UserContent::Parts(vec![
                UserPart::ImageDataUrl(data_url),
                UserPart::Text(OCR_USER_PROMPT.to_string()),
            ]))
            .max_tokens(self.options.max_tokens)
            .temperature(0.0)
            .build();

        // Recognition runs to completion; the token exists only to satisfy
        // the backend contract and is never signalled.
        let cancel = CancellationToken::new();
        let text = self.backend.complete(call, &cancel).await?;
        Ok(text.trim().to_string())
    }
}

/// Decode the buffer, cap its longest edge, and re-encode as JPEG for upload.
fn prepare_image_for_ocr(bytes: &[u8], max_edge: u32) -> Result<Vec<u8>, OcrExtractError> {
    let mut dyn_image = image::load_from_memory(bytes).map_err(OcrExtractError::Decode)?;

    let max_edge = max_edge.max(1);
    let (width, height) = dyn_image.dimensions();
    let longest_edge = width.max(height);

    if longest_edge > max_edge {
        let scale = max_edge as f32 / longest_edge as f32;
        let target_width = ((width as f32 * scale).round() as u32).max(1);
        let target_height = ((height as f32 * scale).round() as u32).max(1);
        dyn_image = dyn_image.resize(target_width, target_height, FilterType::CatmullRom);
    }

    // JPEG carries no alpha channel; flatten before encoding.
    let rgb = dyn_image.to_rgb8();
    let mut buffer = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buffer, JPEG_QUALITY);
    encoder
        .encode_image(&rgb)
        .map_err(OcrExtractError::Encode)?;

    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct RecordingBackend {
        calls: Mutex<Vec<ChatCall>>,
        response: String,
    }

    impl RecordingBackend {
        fn new(response: &str) -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                response: response.to_string(),
            })
        }
    }

    #[async_trait]
    impl ChatBackend for RecordingBackend {
        async fn complete(
            &self,
            call: ChatCall,
            _cancel: &CancellationToken,
        ) -> Result<String, ChatError> {
            self.calls.lock().expect("call log lock poisoned").push(call);
            Ok(self.response.clone())
        }
    }

    fn tiny_png() -> Vec<u8> {
        let image = image::DynamicImage::ImageRgba8(image::RgbaImage::from_pixel(
            4,
            4,
            image::Rgba([200, 10, 10, 255]),
        ));
        let mut bytes = Vec::new();
        image
            .write_to(
                &mut std::io::Cursor::new(&mut bytes),
                image::ImageFormat::Png,
            )
            .expect("png encodes");
        bytes
    }

    #[tokio::test]
    async fn recognized_text_comes_back_trimmed() {
        let backend = RecordingBackend::new("  The quick brown fox.\n");
        let extractor = OcrExtractor::new(
            backend.clone(),
            OcrOptions::builder().model("vision-model").build(),
        );

        let text = extractor.extract(&tiny_png()).await.expect("ocr succeeds");
        assert_eq!(text, "The quick brown fox.");

        let calls = backend.calls.lock().expect("call log lock poisoned");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].model, "vision-model");
        let UserContent::Parts(parts) = &calls[0].user_content else {
            panic!("ocr call must carry content parts");
        };
        let UserPart::ImageDataUrl(url) = &parts[0] else {
            panic!("first part must be the image");
        };
        assert!(url.starts_with("data:image/jpeg;base64,"));
    }

    #[tokio::test]
    async fn undecodable_bytes_fail_before_the_backend_call() {
        let backend = RecordingBackend::new("unused");
        let extractor = OcrExtractor::new(
            backend.clone(),
            OcrOptions::builder().model("vision-model").build(),
        );

        let err = extractor
            .extract(b"not an image at all")
            .await
            .expect_err("garbage must fail");
        assert!(matches!(err, OcrExtractError::Decode(_)));
        assert!(
            backend
                .calls
                .lock()
                .expect("call log lock poisoned")
                .is_empty(),
            "no backend call may be issued for an undecodable image"
        );
    }

    #[test]
    fn oversized_images_are_bounded_to_the_max_edge() {
        let image = image::DynamicImage::ImageRgba8(image::RgbaImage::from_pixel(
            64,
            16,
            image::Rgba([0, 0, 0, 255]),
        ));
        let mut bytes = Vec::new();
        image
            .write_to(
                &mut std::io::Cursor::new(&mut bytes),
                image::ImageFormat::Png,
            )
            .expect("png encodes");

        let prepared = prepare_image_for_ocr(&bytes, 32).expect("preparation succeeds");
        let reloaded = image::load_from_memory(&prepared).expect("jpeg decodes");
        assert_eq!(reloaded.dimensions().0, 32);
        assert_eq!(reloaded.dimensions().1, 8);
    }
}
