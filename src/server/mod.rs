pub mod data_url;

use std::sync::Arc;

use axum::{
    Router,
    extract::{
        DefaultBodyLimit, Multipart, State,
        multipart::{MultipartError, MultipartRejection},
        rejection::JsonRejection,
    },
    http::{StatusCode, header::CONTENT_TYPE},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use log::{debug, error, warn};
use serde::Deserialize;
use tower_http::cors::CorsLayer;

use crate::{
    decision::{Decider, Strategy},
    error::{DetectorError, ErrorKind, Result},
    report::{
        ClassifierReport, DetailError, EnvelopeError, ForensicReport, HealthReport, ProxyReport,
        ResourceHealth,
    },
};

pub const UPLOAD_FIELD: &str = "file";

pub struct AppState {
    pub decider: Decider,
    /// Plain client for the image proxy; the judge owns its own.
    pub http: reqwest::Client,
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(decider: Decider, max_upload_bytes: usize) -> Self {
        Self {
            decider,
            http: reqwest::Client::new(),
            max_upload_bytes,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    pub image: String,
}

#[derive(Debug, Deserialize)]
pub struct ProxyRequest {
    pub url: String,
}

pub fn app(state: Arc<AppState>) -> Router {
    let body_limit = state.max_upload_bytes;

    Router::new()
        .route("/", get(root))
        .route("/api/health", get(health))
        .route("/api/detect", post(detect))
        .route("/api/analyze", post(analyze))
        .route("/api/audit", post(audit))
        .route("/api/proxy-image", post(proxy_image))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InputValidation => StatusCode::BAD_REQUEST,
        ErrorKind::ResourceLoad => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Inference | ErrorKind::ExternalService => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// The classifier endpoint answers `{"detail": ..}`, the judge endpoints
/// `{"success": false, "error": ..}`.
#[derive(Debug, Clone, Copy)]
enum ErrorStyle {
    Detail,
    Envelope,
}

#[derive(Debug)]
pub struct ApiError {
    error: DetectorError,
    status: StatusCode,
    style: ErrorStyle,
}

impl ApiError {
    fn new(error: DetectorError, style: ErrorStyle) -> Self {
        Self {
            status: status_for(error.kind()),
            error,
            style,
        }
    }

    fn detail(error: DetectorError) -> Self {
        Self::new(error, ErrorStyle::Detail)
    }

    fn envelope(error: DetectorError) -> Self {
        Self::new(error, ErrorStyle::Envelope)
    }

    /// An extractor rejection; a body over the size limit keeps its 413.
    fn rejected(status: StatusCode, message: String, style: ErrorStyle) -> Self {
        let mut api_error = Self::new(DetectorError::InvalidRequest(message), style);
        if status == StatusCode::PAYLOAD_TOO_LARGE {
            api_error.status = status;
        }
        api_error
    }
}

impl From<MultipartError> for ApiError {
    fn from(e: MultipartError) -> Self {
        Self::rejected(e.status(), e.body_text(), ErrorStyle::Detail)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.error.kind();
        let status = self.status;
        let message = self.error.to_string();

        if status.is_server_error() {
            error!("{:?} failure ({}): {}", kind, status, message);
        } else {
            warn!("Rejected request ({}): {}", status, message);
        }

        match self.style {
            ErrorStyle::Detail => (status, Json(DetailError { detail: message })).into_response(),
            ErrorStyle::Envelope => (
                status,
                Json(EnvelopeError {
                    success: false,
                    error: message,
                }),
            )
                .into_response(),
        }
    }
}

async fn root() -> Json<HealthReport> {
    Json(HealthReport::ok())
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthReport> {
    Json(HealthReport {
        classifier: Some(ResourceHealth::from(state.decider.classifier())),
        judge: Some(ResourceHealth::from(state.decider.judge())),
        ..HealthReport::ok()
    })
}

async fn detect(
    State(state): State<Arc<AppState>>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> std::result::Result<Json<ClassifierReport>, ApiError> {
    let mut multipart =
        multipart.map_err(|e| ApiError::rejected(e.status(), e.body_text(), ErrorStyle::Detail))?;
    let bytes = read_upload(&mut multipart).await?;

    let verdict = state
        .decider
        .decide(bytes, Strategy::Classifier)
        .await
        .map_err(ApiError::detail)?;

    Ok(Json(ClassifierReport::from(&verdict)))
}

async fn read_upload(multipart: &mut Multipart) -> std::result::Result<Vec<u8>, ApiError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let is_image = field
            .content_type()
            .is_some_and(|content_type| content_type.starts_with("image/"));
        if !is_image {
            return Err(ApiError::detail(DetectorError::InvalidImage(
                "File is not an image.".into(),
            )));
        }

        let bytes = field.bytes().await?;
        return Ok(bytes.to_vec());
    }

    Err(ApiError::detail(DetectorError::InvalidRequest(format!(
        "multipart field {:?} is missing",
        UPLOAD_FIELD
    ))))
}

async fn analyze(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<AnalyzeRequest>, JsonRejection>,
) -> std::result::Result<Json<ForensicReport>, ApiError> {
    judge_data_url(&state, payload, Strategy::Forensic).await
}

async fn audit(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<AnalyzeRequest>, JsonRejection>,
) -> std::result::Result<Json<ForensicReport>, ApiError> {
    judge_data_url(&state, payload, Strategy::CompressionAudit).await
}

async fn judge_data_url(
    state: &AppState,
    payload: std::result::Result<Json<AnalyzeRequest>, JsonRejection>,
    strategy: Strategy,
) -> std::result::Result<Json<ForensicReport>, ApiError> {
    let Json(request) = payload
        .map_err(|e| ApiError::rejected(e.status(), e.body_text(), ErrorStyle::Envelope))?;
    let image = data_url::parse(&request.image).map_err(ApiError::envelope)?;
    debug!(
        "{:?} request: {} bytes declared as {}",
        strategy,
        image.data.len(),
        image.mime_type.as_deref().unwrap_or("unknown type")
    );

    let verdict = state
        .decider
        .decide(image.data, strategy)
        .await
        .map_err(ApiError::envelope)?;

    Ok(Json(ForensicReport::from(&verdict)))
}

async fn proxy_image(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<ProxyRequest>, JsonRejection>,
) -> std::result::Result<Json<ProxyReport>, ApiError> {
    let Json(request) = payload
        .map_err(|e| ApiError::rejected(e.status(), e.body_text(), ErrorStyle::Envelope))?;

    fetch_as_data_url(&state.http, &request.url, state.max_upload_bytes)
        .await
        .map(|data_uri| Json(ProxyReport { data_uri }))
        .map_err(ApiError::envelope)
}

async fn fetch_as_data_url(http: &reqwest::Client, url: &str, limit: usize) -> Result<String> {
    let url = reqwest::Url::parse(url)
        .map_err(|e| DetectorError::InvalidRequest(format!("invalid url {:?}: {}", url, e)))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(DetectorError::InvalidRequest(format!(
            "unsupported url scheme {:?}",
            url.scheme()
        )));
    }

    let mut resp = http.get(url).send().await?;
    if !resp.status().is_success() {
        return Err(DetectorError::ExternalService(format!(
            "upstream image request failed ({})",
            resp.status().as_u16()
        )));
    }

    let mime_type = resp
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.split(';').next().unwrap_or(value).trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| "image/jpeg".to_string());

    if resp.content_length().is_some_and(|length| length > limit as u64) {
        return Err(too_large(limit));
    }

    let mut bytes = Vec::new();
    while let Some(chunk) = resp.chunk().await? {
        if bytes.len() + chunk.len() > limit {
            return Err(too_large(limit));
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(data_url::encode(&mime_type, &bytes))
}

fn too_large(limit: usize) -> DetectorError {
    DetectorError::InvalidRequest(format!("upstream image exceeds {} bytes", limit))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for(ErrorKind::InputValidation), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(ErrorKind::ResourceLoad), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(status_for(ErrorKind::Inference), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(status_for(ErrorKind::ExternalService), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_only_size_rejections_keep_their_status() {
        let err = ApiError::rejected(StatusCode::PAYLOAD_TOO_LARGE, "too big".into(), ErrorStyle::Detail);
        assert_eq!(err.into_response().status(), StatusCode::PAYLOAD_TOO_LARGE);

        let err = ApiError::rejected(
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            "not json".into(),
            ErrorStyle::Envelope,
        );
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_proxy_rejects_bad_urls() {
        let http = reqwest::Client::new();
        let err = fetch_as_data_url(&http, "not a url", 1024).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InputValidation);

        let err = fetch_as_data_url(&http, "file:///etc/passwd", 1024).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InputValidation);
    }
}
