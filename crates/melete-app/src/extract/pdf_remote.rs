//! PDF text extraction through the remote conversion service.
//!
//! The protocol has three steps: request a presigned upload slot, PUT the raw
//! bytes to it, then ask the service to convert the uploaded object. The
//! service reports the extracted text together with its page count.

use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const PRESIGN_STEP: &str = "presign";
const UPLOAD_STEP: &str = "upload";
const CONVERT_STEP: &str = "convert";
const PDF_CONTENT_TYPE: &str = "application/pdf";

#[derive(Debug, Error)]
pub enum PdfRemoteError {
    #[error("{step} request failed: {source}")]
    Http {
        step: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("{step} returned status {status}")]
    Status { step: &'static str, status: u16 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemotePdfText {
    pub text: String,
    pub page_count: Option<usize>,
}

#[derive(Debug, Serialize)]
struct PresignRequest<'a> {
    name: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PresignResponse {
    upload_url: String,
    file_url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ConvertRequest<'a> {
    url: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConvertResponse {
    text: String,
    #[serde(default)]
    page_count: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct RemotePdfExtractor {
    client: reqwest::Client,
    api_base: String,
}

impl RemotePdfExtractor {
    pub fn new(api_base: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
        }
    }

    pub async fn extract(
        &self,
        bytes: &[u8],
        file_name: &str,
    ) -> Result<RemotePdfText, PdfRemoteError> {
        let presign_url = format!("{}/presign", self.api_base);
        let presign = expect_success(
            PRESIGN_STEP,
            self.client
                .post(&presign_url)
                .json(&PresignRequest { name: file_name })
                .send()
                .await,
        )?
        .json::<PresignResponse>()
        .await
        .map_err(|source| PdfRemoteError::Http {
            step: PRESIGN_STEP,
            source,
        })?;

        expect_success(
            UPLOAD_STEP,
            self.client
                .put(&presign.upload_url)
                .header(CONTENT_TYPE, PDF_CONTENT_TYPE)
                .body(bytes.to_vec())
                .send()
                .await,
        )?;

        let convert_url = format!("{}/convert", self.api_base);
        let converted = expect_success(
            CONVERT_STEP,
            self.client
                .post(&convert_url)
                .json(&ConvertRequest {
                    url: &presign.file_url,
                })
                .send()
                .await,
        )?
        .json::<ConvertResponse>()
        .await
        .map_err(|source| PdfRemoteError::Http {
            step: CONVERT_STEP,
            source,
        })?;

        tracing::debug!(
            page_count = ?converted.page_count,
            text_len = converted.text.len(),
            "remote pdf conversion completed"
        );

        Ok(RemotePdfText {
            text: converted.text,
            page_count: converted.page_count,
        })
    }
}

fn expect_success(
    step: &'static str,
    result: Result<reqwest::Response, reqwest::Error>,
) -> Result<reqwest::Response, PdfRemoteError> {
    let response = result.map_err(|source| PdfRemoteError::Http { step, source })?;
    let status = response.status();
    if !status.is_success() {
        return Err(PdfRemoteError::Status {
            step,
            status: status.as_u16(),
        });
    }
    Ok(response)
}
