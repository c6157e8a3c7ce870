//! REST API for the attendance front-end
//!
//! Camera control, the live feed, and the attendance poll used by the browser
//! UI. Every handler only touches non-blocking controller operations.
//! Default port: 5000

use anyhow::{Context, Result};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::CorsLayer;
use tracing::{debug, info};

use crate::error::SessionError;
use crate::session::{AttendanceRecord, SessionController, SessionStatus};

/// Default API port
pub const DEFAULT_API_PORT: u16 = 5000;

/// Shared state for API handlers
pub struct ApiState {
    pub controller: SessionController,
    pub started_at: Instant,
}

impl ApiState {
    pub fn new(controller: SessionController) -> Self {
        Self {
            controller,
            started_at: Instant::now(),
        }
    }
}

/// Request body for a direct (non-camera) scan
#[derive(Debug, Deserialize)]
pub struct SubmitScanRequest {
    #[serde(rename = "studentName")]
    pub student_name: Option<String>,
    #[serde(rename = "studentId")]
    pub student_id: Option<String>,
}

/// Successful response, optionally carrying a record
#[derive(Debug, Serialize)]
pub struct ScanResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<AttendanceRecord>,
}

impl ScanResponse {
    fn ok(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            success: true,
            message: Some(message.into()),
            data: None,
        })
    }

    fn record(record: AttendanceRecord) -> Json<Self> {
        Json(Self {
            success: true,
            message: None,
            data: Some(record),
        })
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub uptime_secs: u64,
}

/// API error response
#[derive(Debug, Serialize)]
pub struct ApiError {
    #[serde(skip)]
    status: StatusCode,
    success: bool,
    message: String,
    #[serde(rename = "alreadyScanned", skip_serializing_if = "std::ops::Not::not")]
    already_scanned: bool,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            success: false,
            message: message.into(),
            already_scanned: false,
        }
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Duplicate { .. } => Self {
                already_scanned: true,
                ..Self::bad_request(err.to_string())
            },
            SessionError::MissingField(_) => Self::bad_request("Missing data"),
            SessionError::Spawn(_) => Self {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                ..Self::bad_request(err.to_string())
            },
            SessionError::AlreadyRunning | SessionError::NotRunning => {
                Self::bad_request(err.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

/// Build the API router
pub fn build_router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/api/camera/start", post(start_camera))
        .route("/api/camera/stop", post(stop_camera))
        .route("/api/camera/status", get(camera_status))
        .route("/api/camera-feed", get(camera_feed))
        .route("/api/get-latest-scan", get(latest_scan))
        .route("/api/student-scan", post(student_scan))
        .route("/api/reset-scans", post(reset_scans))
        .route("/api/health", get(health_check))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// POST /api/camera/start - Spawn the capture loop
async fn start_camera(State(state): State<Arc<ApiState>>) -> Result<Json<ScanResponse>, ApiError> {
    state.controller.start()?;
    Ok(ScanResponse::ok("Camera started"))
}

/// POST /api/camera/stop - Ask the capture loop to stop
async fn stop_camera(State(state): State<Arc<ApiState>>) -> Result<Json<ScanResponse>, ApiError> {
    state.controller.stop()?;
    Ok(ScanResponse::ok("Camera stopped"))
}

/// GET /api/camera/status
async fn camera_status(State(state): State<Arc<ApiState>>) -> Json<SessionStatus> {
    Json(state.controller.status())
}

/// GET /api/camera-feed - Latest encoded frame, 204 before the first one
async fn camera_feed(State(state): State<Arc<ApiState>>) -> Response {
    match state.controller.latest_frame() {
        Some(frame) => (
            [
                (header::CONTENT_TYPE, "image/jpeg"),
                (header::CACHE_CONTROL, "no-store"),
            ],
            frame.jpeg,
        )
            .into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

/// GET /api/get-latest-scan - Pop one pending attendance record
async fn latest_scan(State(state): State<Arc<ApiState>>) -> Response {
    match state.controller.next_record() {
        Some(record) => {
            debug!("Delivering scan for {}", record.student_name);
            ScanResponse::record(record).into_response()
        }
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

/// POST /api/student-scan - Direct submission bypassing the camera
async fn student_scan(
    State(state): State<Arc<ApiState>>,
    body: Result<Json<SubmitScanRequest>, JsonRejection>,
) -> Result<Json<ScanResponse>, ApiError> {
    let Json(req) = body.map_err(|e| {
        debug!("Rejected scan body: {}", e);
        ApiError::bad_request("Missing data")
    })?;

    let record = state.controller.submit(
        req.student_name.as_deref().unwrap_or_default(),
        req.student_id.as_deref().unwrap_or_default(),
    )?;

    info!("✅ Scan submitted for {} ({})", record.student_name, record.student_id);
    Ok(ScanResponse::ok(format!("Scan recorded for {}", record.student_name)))
}

/// POST /api/reset-scans
async fn reset_scans(State(state): State<Arc<ApiState>>) -> Json<ScanResponse> {
    state.controller.reset();
    ScanResponse::ok("All scans reset")
}

/// GET /api/health - Health check endpoint
async fn health_check(State(state): State<Arc<ApiState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "running",
        uptime_secs: state.started_at.elapsed().as_secs(),
    })
}

/// Start the API server and serve until `shutdown` resolves
pub async fn start_server(
    state: Arc<ApiState>,
    host: &str,
    port: u16,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let router = build_router(state);

    let addr = format!("{}:{}", host, port);
    info!("Starting attendance API server on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind API server on {}", addr))?;

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .context("API server error")?;

    Ok(())
}
