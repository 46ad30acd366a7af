//! HTTP surface for the tracker.
//!
//! Handlers are thin: they decode the request, call into [`Tracker`] and
//! serialize whatever comes back. Errors map onto status codes in
//! [`ApiError`].

use std::sync::Arc;

use axum::extract::multipart::{Multipart, MultipartError, MultipartRejection};
use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, warn};
use uuid::Uuid;

use crate::error::TrackerError;
use crate::ingest;
use crate::models::{
    ClassInfo, ClassSummary, EventRow, IngestReport, RosterReplaced, StudentProfile, StudentRow,
};
use crate::tracker::Tracker;

#[derive(Clone)]
pub struct AppState {
    pub tracker: Arc<Tracker>,
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(tracker: Arc<Tracker>, max_upload_bytes: usize) -> Self {
        Self {
            tracker,
            max_upload_bytes,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let upload_limit = DefaultBodyLimit::max(state.max_upload_bytes);

    Router::new()
        .route("/health", get(health))
        .route("/api/classes", get(list_classes))
        .route("/api/classes/:class_id/students", get(class_students))
        .route("/api/class_summary/:class_id", get(class_summary))
        .route("/api/student/:student_id", get(student_profile))
        .route("/api/unmatched", get(list_unmatched))
        .route("/api/resolve_match", post(resolve_match))
        .route("/api/upload_events", post(upload_events))
        .route("/api/upload_students", post(upload_students))
        .layer(upload_limit)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug)]
pub struct ApiError(TrackerError);

impl From<TrackerError> for ApiError {
    fn from(err: TrackerError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self.0 {
            TrackerError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg),
            TrackerError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            TrackerError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            TrackerError::Storage(err) => {
                error!(error = ?err, "request failed in storage layer");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "STORAGE_ERROR",
                    "the tracker could not save or load data".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

#[derive(Debug, Serialize)]
pub struct Listing<T> {
    pub rows: usize,
    pub data: Vec<T>,
}

impl<T> From<Vec<T>> for Listing<T> {
    fn from(data: Vec<T>) -> Self {
        Self {
            rows: data.len(),
            data,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ResolveRequest {
    #[serde(alias = "attendance_id")]
    pub row_id: String,
    pub student_id: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct UploadEventsQuery {
    pub class_id: Option<String>,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: "placement-tracker",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn list_classes(State(state): State<AppState>) -> Json<Vec<ClassInfo>> {
    Json(state.tracker.list_classes().await)
}

async fn class_students(
    State(state): State<AppState>,
    Path(class_id): Path<String>,
) -> Json<Listing<StudentRow>> {
    Json(state.tracker.class_students(&class_id).await.into())
}

async fn class_summary(
    State(state): State<AppState>,
    Path(class_id): Path<String>,
) -> Json<ClassSummary> {
    Json(state.tracker.class_summary(&class_id).await)
}

async fn student_profile(
    State(state): State<AppState>,
    Path(student_id): Path<String>,
) -> ApiResult<StudentProfile> {
    Ok(Json(state.tracker.student_profile(&student_id).await?))
}

async fn list_unmatched(State(state): State<AppState>) -> Json<Listing<EventRow>> {
    Json(state.tracker.list_unmatched().await.into())
}

async fn resolve_match(
    State(state): State<AppState>,
    payload: Result<Json<ResolveRequest>, JsonRejection>,
) -> ApiResult<EventRow> {
    let Json(request) = payload.map_err(|rejection| {
        warn!(reason = %rejection.body_text(), "rejected resolve payload");
        TrackerError::validation("resolve request needs a row_id and a student_id")
    })?;
    let row_id = Uuid::parse_str(request.row_id.trim()).map_err(|_| {
        TrackerError::not_found(format!("event row {} does not exist", request.row_id.trim()))
    })?;
    let row = state.tracker.resolve(row_id, &request.student_id).await?;
    Ok(Json(row))
}

async fn upload_events(
    State(state): State<AppState>,
    Query(query): Query<UploadEventsQuery>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<IngestReport> {
    let bytes = read_upload(multipart).await?;
    let rows = ingest::parse_events(&bytes)?;
    let report = state
        .tracker
        .ingest(query.class_id.as_deref(), rows)
        .await?;
    Ok(Json(report))
}

async fn upload_students(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<RosterReplaced> {
    let bytes = read_upload(multipart).await?;
    let students = ingest::parse_students(&bytes)?;
    Ok(Json(state.tracker.replace_roster(students).await?))
}

/// Contents of the `file` part of a multipart upload.
async fn read_upload(
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Vec<u8>, TrackerError> {
    let mut multipart = multipart.map_err(|rejection| {
        warn!(reason = %rejection.body_text(), "rejected upload request");
        TrackerError::validation("upload must be a multipart/form-data request")
    })?;
    let unreadable = |err: MultipartError| {
        warn!(reason = %err, "unreadable multipart upload");
        TrackerError::validation("upload could not be read")
    };

    while let Some(field) = multipart.next_field().await.map_err(unreadable)? {
        if field.name() == Some("file") {
            let bytes = field.bytes().await.map_err(unreadable)?;
            return Ok(bytes.to_vec());
        }
    }

    Err(TrackerError::validation("upload is missing a file field"))
}
