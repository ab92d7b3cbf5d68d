//! Web server entrypoints live here.

use std::{
    future::Future,
    net::{IpAddr, SocketAddr},
    sync::Arc,
    time::Duration,
};

use axum::{
    Extension, Json, Router,
    body::Body,
    extract::{DefaultBodyLimit, MatchedPath, Multipart, State, connect_info::ConnectInfo},
    http::{HeaderMap, HeaderName, HeaderValue, Method, Request, StatusCode, header::RETRY_AFTER},
    middleware::{self, Next},
    response::IntoResponse,
    routing::{get, post},
};
use bytes::Bytes;
use governor::clock::Clock;
use governor::{DefaultKeyedRateLimiter, Quota, clock::DefaultClock};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::{net::TcpListener, sync::watch};
use tower_http::{
    classify::ServerErrorsFailureClass,
    cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::config::{CorsConfig, RateLimitConfig, RouteLimitConfig, ServerConfig};
use crate::convert::{
    ConversionError, ConversionErrorKind, ConversionOutcome, ConversionProvider,
    ConversionRequest, ConvertRoute, GenerationCall, GenerationCallError, GenerationKind,
    GenerationOutcome, GenerationProvider, MAX_SOURCE_COUNT, MAX_TITLE_LEN,
    RemoteConversionRequest, SourceText, StructuredSection,
};

const HEALTHZ_PATH: &str = "/v1/healthz";
const CONVERT_PATH: &str = "/v1/convert";
const CONVERT_WORD_PATH: &str = "/v1/convert/word";
const CONVERT_SLIDES_PATH: &str = "/v1/convert/slides";
const CONVERT_IMAGE_PATH: &str = "/v1/convert/image";
const CONVERT_PDF_PATH: &str = "/v1/convert/pdf";
const CONVERT_REMOTE_PATH: &str = "/v1/convert/remote";
const GENERATE_PATH: &str = "/v1/generate";
const CANCEL_PATH: &str = "/v1/generate/cancel";
const HEALTHZ_STATUS: &str = "ok";
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

const FILE_FIELD: &str = "file";
const TOTAL_CHUNKS_FIELD: &str = "totalChunks";
const CHUNK_INDEX_FIELD: &str = "chunkIndex";
const MAX_URL_LEN: usize = 2_048;

const ERROR_INVALID_PARAMETER: &str = "invalid_parameter";
const ERROR_UNSUPPORTED_MEDIA_TYPE: &str = "unsupported_media_type";
const ERROR_EXTRACTION_FAILED: &str = "extraction_failed";
const ERROR_DOWNLOAD_FAILED: &str = "download_failed";
const ERROR_GENERATION_FAILED: &str = "generation_failed";
const ERROR_NOT_FOUND: &str = "not_found";
const ERROR_METHOD_NOT_ALLOWED: &str = "method_not_allowed";
const ERROR_RATE_LIMITED: &str = "rate_limited";
const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Debug, Serialize, Copy, Clone, PartialEq, Eq)]
struct HealthzResponse {
    status: &'static str,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum ShutdownEvent {
    Pending,
    CtrlC,
    SigTerm,
    ListenerFailed,
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("listen address may not be empty")]
    EmptyListenAddr,
    #[error("invalid listen address `{address}`: {source}")]
    InvalidListenAddr {
        address: String,
        #[source]
        source: std::net::AddrParseError,
    },
    #[error("failed to bind to {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to determine local address: {source}")]
    LocalAddr {
        #[source]
        source: std::io::Error,
    },
    #[error("axum server error: {source}")]
    Serve {
        #[source]
        source: std::io::Error,
    },
    #[error("invalid CORS configuration: {reason}")]
    CorsConfig { reason: String },
}

pub type DynConversionProvider = Arc<dyn ConversionProvider>;
pub type DynGenerationProvider = Arc<dyn GenerationProvider>;
type ApiStateHandle = Arc<ApiState>;

#[derive(Clone)]
struct ApiState {
    conversion: DynConversionProvider,
    generation: DynGenerationProvider,
}

#[derive(Debug, Clone, Serialize)]
struct ApiErrorBody {
    error: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_after_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_id: Option<String>,
}

#[derive(Debug, Clone)]
struct ApiError {
    status: StatusCode,
    body: ApiErrorBody,
}

impl ApiError {
    fn new(status: StatusCode, error: &'static str, message: impl Into<String>) -> Self {
        ApiError {
            status,
            body: ApiErrorBody {
                error,
                message: message.into(),
                field: None,
                retry_after_ms: None,
                request_id: None,
            },
        }
    }

    fn with_field(mut self, field: &str) -> Self {
        debug_assert!(!field.is_empty());
        self.body.field = Some(field.to_string());
        self
    }

    fn with_request_id(mut self, request_id: Option<&str>) -> Self {
        if let Some(id) = request_id {
            self.body.request_id = Some(id.to_string());
        }
        self
    }

    fn with_retry_after(mut self, retry_after_ms: u64) -> Self {
        self.body.retry_after_ms = Some(retry_after_ms);
        self
    }

    fn invalid_param(field: &str, message: impl Into<String>) -> Self {
        ApiError::new(StatusCode::BAD_REQUEST, ERROR_INVALID_PARAMETER, message).with_field(field)
    }

    fn unsupported_media_type(media_type: &str) -> Self {
        ApiError::new(
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ERROR_UNSUPPORTED_MEDIA_TYPE,
            format!("unsupported media type `{media_type}`"),
        )
    }

    fn extraction_failed(details: impl Into<String>) -> Self {
        ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            ERROR_EXTRACTION_FAILED,
            details,
        )
    }

    fn download_failed(details: impl Into<String>) -> Self {
        ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            ERROR_DOWNLOAD_FAILED,
            details,
        )
    }

    fn generation_failed(details: impl Into<String>) -> Self {
        ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            ERROR_GENERATION_FAILED,
            details,
        )
    }

    fn resource_not_found(path: &str) -> Self {
        ApiError::new(
            StatusCode::NOT_FOUND,
            ERROR_NOT_FOUND,
            format!("resource `{path}` not found"),
        )
    }

    fn method_not_allowed(method: &str, path: &str) -> Self {
        ApiError::new(
            StatusCode::METHOD_NOT_ALLOWED,
            ERROR_METHOD_NOT_ALLOWED,
            format!("method `{method}` not allowed for `{path}`"),
        )
    }

    fn rate_limited(retry_after_ms: u64) -> Self {
        ApiError::new(
            StatusCode::TOO_MANY_REQUESTS,
            ERROR_RATE_LIMITED,
            "rate limit exceeded; retry after backoff",
        )
        .with_retry_after(retry_after_ms)
    }
}

impl From<ConversionError> for ApiError {
    fn from(error: ConversionError) -> Self {
        match error.kind {
            ConversionErrorKind::Unsupported { media_type } => {
                ApiError::unsupported_media_type(&media_type)
            }
            ConversionErrorKind::Extraction => {
                tracing::error!(message = %error.message, "document conversion failed");
                ApiError::extraction_failed(error.message)
            }
            ConversionErrorKind::Download { url } => {
                tracing::error!(%url, message = %error.message, "blob download failed");
                ApiError::download_failed(error.message)
            }
        }
    }
}

impl From<GenerationCallError> for ApiError {
    fn from(error: GenerationCallError) -> Self {
        tracing::error!(message = %error.message, "content generation failed");
        ApiError::generation_failed(error.message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (self.status, Json(self.body)).into_response()
    }
}

#[derive(Clone)]
struct RateLimitState {
    convert: Arc<DefaultKeyedRateLimiter<String>>,
    generate: Arc<DefaultKeyedRateLimiter<String>>,
}

impl RateLimitState {
    fn new(cfg: &RateLimitConfig) -> Arc<Self> {
        let window_ms = cfg.window_ms.get();
        Arc::new(Self {
            convert: Arc::new(build_keyed_limiter(&cfg.convert, window_ms)),
            generate: Arc::new(build_keyed_limiter(&cfg.generate, window_ms)),
        })
    }
}

fn build_keyed_limiter(
    route: &RouteLimitConfig,
    window_ms: u64,
) -> DefaultKeyedRateLimiter<String> {
    // Replenish one cell per window_ms / max_requests so the route sees at
    // most `max_requests` per window on average, with `burst` headroom.
    let replenish_ms = (window_ms / u64::from(route.max_requests.get())).max(1);
    let quota = Quota::with_period(Duration::from_millis(replenish_ms))
        .expect("replenish interval is non-zero")
        .allow_burst(route.burst);
    DefaultKeyedRateLimiter::<String>::keyed(quota)
}

async fn rate_limit_middleware(
    State(state): State<Arc<RateLimitState>>,
    req: Request<Body>,
    next: Next,
) -> axum::response::Response {
    let path = matched_path_or_uri(&req);
    let (bucket, limiter) = if path.starts_with(CONVERT_PATH) {
        ("convert", &state.convert)
    } else if path.starts_with(GENERATE_PATH) {
        ("generate", &state.generate)
    } else {
        return next.run(req).await;
    };

    let ip = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip())
        .unwrap_or_else(|| IpAddr::from([0, 0, 0, 0]));
    let key = format!("{bucket}:{ip}");

    match limiter.check_key(&key) {
        Ok(()) => next.run(req).await,
        Err(negative) => {
            let now = DefaultClock::default().now();
            let wait = negative.wait_time_from(now);
            let mut response = ApiError::rate_limited(wait.as_millis() as u64)
                .with_request_id(header_request_id(req.headers()).as_deref())
                .into_response();
            let secs = std::cmp::max(1u64, (wait.as_millis() as u64).div_ceil(1_000));
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(RETRY_AFTER, value);
            }
            response
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ConvertResponse {
    success: bool,
    text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    slide_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    page_count: Option<usize>,
}

impl From<ConversionOutcome> for ConvertResponse {
    fn from(outcome: ConversionOutcome) -> Self {
        ConvertResponse {
            success: true,
            text: outcome.text,
            slide_count: outcome.slide_count,
            page_count: outcome.page_count,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ChunkAckResponse {
    success: bool,
    is_chunk: bool,
    chunk_index: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoteConvertBody {
    url: String,
    media_type: String,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateBody {
    notebook_id: String,
    tab_id: String,
    title: String,
    #[serde(default)]
    kind: GenerationKind,
    #[serde(default)]
    question_count: Option<usize>,
    sources: Vec<SourceText>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    success: bool,
    aborted: bool,
    sections: Vec<StructuredSection>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CancelBody {
    notebook_id: String,
    tab_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CancelResponse {
    success: bool,
    was_aborted: bool,
}

/// Everything a single multipart upload carried.
#[derive(Debug)]
struct UploadForm {
    file_name: String,
    media_type: String,
    bytes: Bytes,
    total_chunks: Option<usize>,
    chunk_index: Option<usize>,
}

async fn read_upload(multipart: &mut Multipart) -> Result<UploadForm, ApiError> {
    let mut file: Option<(String, String, Bytes)> = None;
    let mut total_chunks = None;
    let mut chunk_index = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|error| ApiError::invalid_param("multipart", error.to_string()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            FILE_FIELD => {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let media_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field.bytes().await.map_err(|error| {
                    ApiError::invalid_param(FILE_FIELD, format!("failed to read file: {error}"))
                })?;
                file = Some((file_name, media_type, bytes));
            }
            TOTAL_CHUNKS_FIELD => {
                total_chunks = Some(read_count_field(TOTAL_CHUNKS_FIELD, field).await?);
            }
            CHUNK_INDEX_FIELD => {
                chunk_index = Some(read_count_field(CHUNK_INDEX_FIELD, field).await?);
            }
            _ => {
                // Unknown fields are drained and ignored.
                let _ = field.bytes().await;
            }
        }
    }

    let Some((file_name, media_type, bytes)) = file else {
        return Err(ApiError::invalid_param(FILE_FIELD, "no file uploaded"));
    };
    if bytes.is_empty() {
        return Err(ApiError::invalid_param(FILE_FIELD, "uploaded file is empty"));
    }

    Ok(UploadForm {
        file_name,
        media_type,
        bytes,
        total_chunks,
        chunk_index,
    })
}

async fn read_count_field(
    name: &'static str,
    field: axum::extract::multipart::Field<'_>,
) -> Result<usize, ApiError> {
    let text = field
        .text()
        .await
        .map_err(|error| ApiError::invalid_param(name, error.to_string()))?;
    text.trim()
        .parse::<usize>()
        .map_err(|_| ApiError::invalid_param(name, "must be a non-negative integer"))
}

async fn healthz() -> impl IntoResponse {
    debug_assert_eq!(HEALTHZ_STATUS, "ok");
    Json(HealthzResponse {
        status: HEALTHZ_STATUS,
    })
}

async fn convert_auto(
    Extension(state): Extension<ApiStateHandle>,
    mut multipart: Multipart,
) -> Result<axum::response::Response, ApiError> {
    let form = read_upload(&mut multipart).await?;
    convert_with_route(&state, form, None).await
}

async fn convert_word(
    Extension(state): Extension<ApiStateHandle>,
    mut multipart: Multipart,
) -> Result<axum::response::Response, ApiError> {
    let form = read_upload(&mut multipart).await?;
    convert_with_route(&state, form, Some(ConvertRoute::Word)).await
}

async fn convert_slides(
    Extension(state): Extension<ApiStateHandle>,
    mut multipart: Multipart,
) -> Result<axum::response::Response, ApiError> {
    let form = read_upload(&mut multipart).await?;

    // The client-side chunked-upload path only ever acknowledged chunks; no
    // reassembly exists, so a non-final chunk is acked and discarded. The
    // final chunk falls through and is converted on its own.
    if let (Some(total), Some(index)) = (form.total_chunks, form.chunk_index)
        && total > 1
        && index + 1 < total
    {
        tracing::debug!(total, index, "acknowledging slide-deck upload chunk");
        return Ok(Json(ChunkAckResponse {
            success: true,
            is_chunk: true,
            chunk_index: index,
        })
        .into_response());
    }

    convert_with_route(&state, form, Some(ConvertRoute::Slides)).await
}

async fn convert_image(
    Extension(state): Extension<ApiStateHandle>,
    mut multipart: Multipart,
) -> Result<axum::response::Response, ApiError> {
    let form = read_upload(&mut multipart).await?;
    convert_with_route(&state, form, Some(ConvertRoute::Image)).await
}

async fn convert_pdf(
    Extension(state): Extension<ApiStateHandle>,
    mut multipart: Multipart,
) -> Result<axum::response::Response, ApiError> {
    let form = read_upload(&mut multipart).await?;
    convert_with_route(&state, form, Some(ConvertRoute::Pdf)).await
}

async fn convert_with_route(
    state: &ApiState,
    form: UploadForm,
    route: Option<ConvertRoute>,
) -> Result<axum::response::Response, ApiError> {
    let request = ConversionRequest {
        file_name: form.file_name,
        media_type: form.media_type,
        bytes: form.bytes,
        route,
    };
    let outcome = state.conversion.convert(request).await?;
    Ok(Json(ConvertResponse::from(outcome)).into_response())
}

async fn convert_remote(
    Extension(state): Extension<ApiStateHandle>,
    Json(body): Json<RemoteConvertBody>,
) -> Result<Json<ConvertResponse>, ApiError> {
    let url = body.url.trim().to_string();
    if url.is_empty() {
        return Err(ApiError::invalid_param("url", "must not be empty"));
    }
    if url.len() > MAX_URL_LEN {
        return Err(ApiError::invalid_param(
            "url",
            format!("must be at most {MAX_URL_LEN} characters"),
        ));
    }
    let media_type = body.media_type.trim().to_string();
    if media_type.is_empty() {
        return Err(ApiError::invalid_param("mediaType", "must not be empty"));
    }

    let outcome = state
        .conversion
        .convert_remote(RemoteConversionRequest {
            url,
            media_type,
            file_name: body.name,
        })
        .await?;
    Ok(Json(ConvertResponse::from(outcome)))
}

async fn generate(
    Extension(state): Extension<ApiStateHandle>,
    Json(body): Json<GenerateBody>,
) -> Result<Json<GenerateResponse>, ApiError> {
    let notebook_id = trim_non_empty("notebookId", body.notebook_id)?;
    let tab_id = trim_non_empty("tabId", body.tab_id)?;
    let title = trim_non_empty("title", body.title)?;
    if title.len() > MAX_TITLE_LEN {
        return Err(ApiError::invalid_param(
            "title",
            format!("must be at most {MAX_TITLE_LEN} characters"),
        ));
    }
    if body.sources.is_empty() {
        return Err(ApiError::invalid_param("sources", "must not be empty"));
    }
    if body.sources.len() > MAX_SOURCE_COUNT {
        return Err(ApiError::invalid_param(
            "sources",
            format!("must include at most {MAX_SOURCE_COUNT} entries"),
        ));
    }

    let call = GenerationCall {
        notebook_id,
        tab_id,
        title,
        kind: body.kind,
        question_count: body.question_count,
        sources: body.sources,
    };

    match state.generation.generate(call).await? {
        GenerationOutcome::Completed { sections } => Ok(Json(GenerateResponse {
            success: true,
            aborted: false,
            sections,
        })),
        // An abort is a normal outcome the client asked for, not a failure.
        GenerationOutcome::Aborted => Ok(Json(GenerateResponse {
            success: false,
            aborted: true,
            sections: Vec::new(),
        })),
    }
}

async fn generate_cancel(
    Extension(state): Extension<ApiStateHandle>,
    Json(body): Json<CancelBody>,
) -> Result<Json<CancelResponse>, ApiError> {
    let notebook_id = trim_non_empty("notebookId", body.notebook_id)?;
    let tab_id = trim_non_empty("tabId", body.tab_id)?;

    let was_aborted = state.generation.cancel(&notebook_id, &tab_id).await;
    Ok(Json(CancelResponse {
        success: true,
        was_aborted,
    }))
}

async fn method_not_allowed_handler(request: Request<Body>) -> axum::response::Response {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let request_id = header_request_id(request.headers());
    ApiError::method_not_allowed(&method, &path)
        .with_request_id(request_id.as_deref())
        .into_response()
}

async fn not_found_handler(request: Request<Body>) -> axum::response::Response {
    let path = request.uri().path().to_string();
    let request_id = header_request_id(request.headers());
    ApiError::resource_not_found(&path)
        .with_request_id(request_id.as_deref())
        .into_response()
}

fn trim_non_empty(field: &'static str, value: String) -> Result<String, ApiError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ApiError::invalid_param(field, "must not be empty"));
    }
    Ok(trimmed.to_string())
}

fn matched_path_or_uri<B>(request: &Request<B>) -> String {
    if let Some(path) = request.extensions().get::<MatchedPath>() {
        return path.as_str().to_string();
    }
    request.uri().path().to_string()
}

fn header_request_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(|value| value.to_string())
}

/// Build the bare API router with its state attached but no middleware.
/// `serve` wraps this with tracing, rate limiting, CORS, and body limits.
pub fn build_api_router(
    conversion: DynConversionProvider,
    generation: DynGenerationProvider,
) -> Router {
    debug_assert!(HEALTHZ_PATH.starts_with("/v1/"));

    let state: ApiStateHandle = Arc::new(ApiState {
        conversion,
        generation,
    });

    Router::new()
        .route(
            HEALTHZ_PATH,
            get(healthz).fallback(method_not_allowed_handler),
        )
        .route(
            CONVERT_PATH,
            post(convert_auto).fallback(method_not_allowed_handler),
        )
        .route(
            CONVERT_WORD_PATH,
            post(convert_word).fallback(method_not_allowed_handler),
        )
        .route(
            CONVERT_SLIDES_PATH,
            post(convert_slides).fallback(method_not_allowed_handler),
        )
        .route(
            CONVERT_IMAGE_PATH,
            post(convert_image).fallback(method_not_allowed_handler),
        )
        .route(
            CONVERT_PDF_PATH,
            post(convert_pdf).fallback(method_not_allowed_handler),
        )
        .route(
            CONVERT_REMOTE_PATH,
            post(convert_remote).fallback(method_not_allowed_handler),
        )
        .route(
            GENERATE_PATH,
            post(generate).fallback(method_not_allowed_handler),
        )
        .route(
            CANCEL_PATH,
            post(generate_cancel).fallback(method_not_allowed_handler),
        )
        .layer(Extension(state))
}

pub async fn serve(
    config: ServerConfig,
    conversion: DynConversionProvider,
    generation: DynGenerationProvider,
) -> Result<(), ServerError> {
    let listen_addr = parse_listen_addr(&config.listen_addr)?;
    let listener = bind_listener(listen_addr).await?;

    let local_addr = listener
        .local_addr()
        .map_err(|source| ServerError::LocalAddr { source })?;
    tracing::info!(%local_addr, "melete server listening");

    let (shutdown_tx, shutdown_rx) = watch::channel(ShutdownEvent::Pending);
    let shutdown_future = broadcast_shutdown(shutdown_tx);

    let app = build_app_router(&config, conversion, generation)?;
    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();

    let mut server_future = Box::pin(async move {
        axum::serve(listener, make_service)
            .with_graceful_shutdown(shutdown_future)
            .await
    });

    let drain_rx = shutdown_rx.clone();
    let mut drain_timeout = Box::pin(drain_timeout_future(drain_rx));

    tokio::select! {
        result = server_future.as_mut() => {
            if let Err(source) = result {
                return Err(ServerError::Serve { source });
            }
        }
        _ = drain_timeout.as_mut() => {
            // Timeout elapsed; dropping the server future forces termination.
        }
    }

    let final_event = *shutdown_rx.borrow();
    if final_event == ShutdownEvent::Pending {
        tracing::info!("server stopped without external shutdown signal");
    } else {
        tracing::info!(?final_event, "server shutdown complete");
    }

    Ok(())
}

fn build_app_router(
    config: &ServerConfig,
    conversion: DynConversionProvider,
    generation: DynGenerationProvider,
) -> Result<Router, ServerError> {
    let mut router = build_api_router(conversion, generation).fallback(not_found_handler);

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(|request: &Request<_>| {
            let path = matched_path_or_uri(request);
            let request_id =
                header_request_id(request.headers()).unwrap_or_else(|| "-".to_string());
            tracing::info_span!(
                "http.request",
                method = %request.method(),
                path = %path,
                request_id = %request_id
            )
        })
        .on_response(
            |response: &axum::response::Response, latency: Duration, span: &tracing::Span| {
                let status = response.status().as_u16();
                let latency_ms = latency.as_millis().min(u128::from(u64::MAX)) as u64;
                tracing::info!(parent: span, status, latency_ms, "request completed");
            },
        )
        .on_failure(
            |error: ServerErrorsFailureClass, latency: Duration, span: &tracing::Span| {
                let latency_ms = latency.as_millis().min(u128::from(u64::MAX)) as u64;
                tracing::error!(parent: span, latency_ms, error = %error, "request failed");
            },
        );

    if config.rate_limit.enabled {
        let limiter_state = RateLimitState::new(&config.rate_limit);
        router = router.layer(middleware::from_fn_with_state(
            limiter_state,
            rate_limit_middleware,
        ));
    }

    if config.cors.enabled {
        router = router.layer(build_cors_layer(&config.cors)?);
    }

    router = router
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(trace_layer);

    let request_id_header = HeaderName::from_static(REQUEST_ID_HEADER);
    let make_request_id = MakeRequestUuid;
    router = router
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        .layer(SetRequestIdLayer::new(request_id_header, make_request_id));

    Ok(router)
}

fn build_cors_layer(config: &CorsConfig) -> Result<CorsLayer, ServerError> {
    let origins: Vec<HeaderValue> = config
        .allow_origins
        .iter()
        .map(|origin| {
            HeaderValue::from_str(origin).map_err(|err| ServerError::CorsConfig {
                reason: format!("origin `{origin}` is not a valid header value: {err}"),
            })
        })
        .collect::<Result<_, _>>()?;

    let methods: Vec<Method> = config
        .allow_methods
        .iter()
        .map(|method| {
            Method::from_bytes(method.as_bytes()).map_err(|_| ServerError::CorsConfig {
                reason: format!("method `{method}` failed to parse"),
            })
        })
        .collect::<Result<_, _>>()?;

    let allow_headers: Vec<HeaderName> = config
        .allow_headers
        .iter()
        .map(|name| {
            HeaderName::from_bytes(name.as_bytes()).map_err(|err| ServerError::CorsConfig {
                reason: format!("header `{name}` is invalid: {err}"),
            })
        })
        .collect::<Result<_, _>>()?;

    let mut cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(AllowMethods::list(methods))
        .max_age(Duration::from_secs(config.max_age_secs));

    if !allow_headers.is_empty() {
        cors = cors.allow_headers(AllowHeaders::list(allow_headers));
    }

    Ok(cors)
}

async fn wait_for_shutdown() -> ShutdownEvent {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => ShutdownEvent::CtrlC,
            Err(error) => {
                tracing::warn!(%error, "failed to capture Ctrl+C signal");
                ShutdownEvent::ListenerFailed
            }
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => match term.recv().await {
                Some(_) => ShutdownEvent::SigTerm,
                None => ShutdownEvent::ListenerFailed,
            },
            Err(error) => {
                tracing::warn!(%error, "failed to capture SIGTERM");
                ShutdownEvent::ListenerFailed
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending();

    tokio::select! {
        event = ctrl_c => event,
        event = sigterm => event,
    }
}

fn parse_listen_addr(addr: &str) -> Result<SocketAddr, ServerError> {
    let trimmed = addr.trim();
    if trimmed.is_empty() {
        return Err(ServerError::EmptyListenAddr);
    }

    trimmed
        .parse()
        .map_err(|source| ServerError::InvalidListenAddr {
            address: trimmed.to_string(),
            source,
        })
}

async fn bind_listener(addr: SocketAddr) -> Result<TcpListener, ServerError> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind {
            address: addr.to_string(),
            source,
        })
}

fn broadcast_shutdown(
    sender: watch::Sender<ShutdownEvent>,
) -> impl Future<Output = ()> + Send + 'static {
    async move {
        let event = wait_for_shutdown().await;
        debug_assert!(event != ShutdownEvent::Pending);
        if let Err(error) = sender.send(event) {
            tracing::warn!(?event, %error, "failed to broadcast shutdown event");
        }
    }
}

fn drain_timeout_future(
    mut receiver: watch::Receiver<ShutdownEvent>,
) -> impl Future<Output = ()> + Send + 'static {
    async move {
        if receiver.changed().await.is_ok() {
            let event = *receiver.borrow_and_update();
            tracing::info!(?event, "shutdown signal received; draining connections");
            tokio::time::sleep(DRAIN_TIMEOUT).await;
            tracing::warn!(
                ?event,
                seconds = DRAIN_TIMEOUT.as_secs(),
                "graceful shutdown timed out; continuing shutdown"
            );
        }
    }
}
