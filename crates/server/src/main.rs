//! textscan REST API server
//!
//! Single-image text detection over HTTP. The OCR engine is created once at
//! startup and shared by every request.

use anyhow::Context;
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use core_pipeline::export::write_csv;
use core_pipeline::preprocess::load_image_from_memory;
use core_pipeline::{
    filter_by_confidence, Detection, Detector, FilterKind, PipelineConfig, PipelineError,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

/// Uploads larger than this are rejected
const MAX_UPLOAD_BYTES: usize = 32 * 1024 * 1024;

struct AppState {
    detector: Detector,
    default_threshold: f64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config_path = std::env::var_os("TEXTSCAN_CONFIG").map(PathBuf::from);
    let config = PipelineConfig::load_or_default(config_path.as_deref())?;

    let state = Arc::new(AppState {
        detector: config.detector()?,
        default_threshold: config.detect.threshold,
    });

    let addr = std::env::var("TEXTSCAN_ADDR").unwrap_or_else(|_| "127.0.0.1:3000".to_string());
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app(state)).await?;
    Ok(())
}

fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/filters", get(list_filters))
        .route("/api/detect", post(detect_json))
        .route("/api/detect/csv", post(detect_csv))
        .layer(axum::extract::DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}

async fn list_filters() -> Json<Vec<FilterInfo>> {
    Json(
        FilterKind::ALL
            .iter()
            .map(|kind| FilterInfo {
                index: kind.index(),
                name: kind.name(),
            })
            .collect(),
    )
}

async fn detect_json(
    State(state): State<Arc<AppState>>,
    Query(params): Query<DetectParams>,
    body: Bytes,
) -> Result<Json<DetectResponse>, ApiError> {
    let (filter, threshold, all) = run_detection(&state, params, body).await?;
    let detections = filter_by_confidence(&all, threshold);
    Ok(Json(DetectResponse {
        filter,
        threshold,
        total: all.len(),
        detections,
    }))
}

async fn detect_csv(
    State(state): State<Arc<AppState>>,
    Query(params): Query<DetectParams>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let (_, threshold, all) = run_detection(&state, params, body).await?;
    let mut csv = Vec::new();
    write_csv(&filter_by_confidence(&all, threshold), &mut csv)?;
    Ok(([(header::CONTENT_TYPE, "text/csv")], csv).into_response())
}

/// Decode the upload and run OCR off the async runtime
async fn run_detection(
    state: &AppState,
    params: DetectParams,
    body: Bytes,
) -> Result<(FilterKind, f64, Vec<Detection>), ApiError> {
    let filter = params
        .filter
        .as_deref()
        .map_or(FilterKind::None, FilterKind::parse_lenient);
    let threshold = params.threshold.unwrap_or(state.default_threshold);
    let detector = state.detector.clone();

    let detections = tokio::task::spawn_blocking(move || {
        let image = load_image_from_memory(&body)?;
        detector.detect(&image, filter)
    })
    .await
    .map_err(|e| ApiError::internal(format!("detection task failed: {e}")))??;

    tracing::info!(%filter, threshold, detections = detections.len(), "image processed");
    Ok((filter, threshold, detections))
}

#[derive(Deserialize)]
struct DetectParams {
    filter: Option<String>,
    threshold: Option<f64>,
}

#[derive(Serialize)]
struct FilterInfo {
    index: usize,
    name: &'static str,
}

#[derive(Serialize)]
struct DetectResponse {
    filter: FilterKind,
    threshold: f64,
    /// Detections before thresholding
    total: usize,
    detections: Vec<Detection>,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn internal(message: String) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message,
        }
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        let status = match &err {
            PipelineError::ImageLoad { .. } => StatusCode::BAD_REQUEST,
            PipelineError::OcrTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(status = %self.status, "{}", self.message);
        }
        (
            self.status,
            Json(ErrorBody {
                error: self.message,
            }),
        )
            .into_response()
    }
}
