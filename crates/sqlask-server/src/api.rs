//! HTTP routes over the pipeline
//!
//! - `POST /upload` - multipart `file`, stored and registered as a table
//! - `POST /query` - `{tableName, naturalLanguageQuery}` answered with rows
//! - `GET /datasets/:id/schema` - current columns of a dataset
//! - `GET /health`
//! - `GET /metrics` - Prometheus text format
//!
//! Pipeline work runs on its own task so a dropped connection does not
//! abandon a half-finished table load.

use axum::{
    extract::{multipart::MultipartError, rejection::JsonRejection, DefaultBodyLimit, Multipart, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use sqlask_core::prelude::*;
use std::path::{Path as FsPath, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::CorsLayer;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::metrics::Metrics;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub metrics: Arc<Metrics>,
    /// Uploaded files land here as `<id>.<ext>`
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    pub table_name: String,
    pub natural_language_query: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub message: String,
    #[serde(flatten)]
    pub registration: Registration,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaResponse {
    pub table_name: String,
    pub columns: Vec<ColumnDescriptor>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug)]
pub enum ApiError {
    Pipeline(PipelineError),
    BadRequest(String),
    Internal(String),
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        ApiError::Pipeline(err)
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        ApiError::BadRequest(err.body_text())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(err: JsonRejection) -> Self {
        ApiError::BadRequest(err.body_text())
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        ApiError::Internal(err.to_string())
    }
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidIdentifier => StatusCode::BAD_REQUEST,
        ErrorKind::SourceUnreadable => StatusCode::NOT_FOUND,
        ErrorKind::SchemaEmpty | ErrorKind::ExecutionFailed => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::TranslationInvalid => StatusCode::BAD_GATEWAY,
        ErrorKind::TranslationUnavailable | ErrorKind::StoreUnavailable => StatusCode::SERVICE_UNAVAILABLE,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Pipeline(err) => (
                status_for(err.kind()),
                ErrorResponse {
                    error: err.kind().to_string(),
                    detail: err.public_detail().map(str::to_string),
                },
            ),
            ApiError::BadRequest(msg) => {
                warn!(error = %msg, "Rejected request");
                (
                    StatusCode::BAD_REQUEST,
                    ErrorResponse {
                        error: "INVALID_REQUEST".to_string(),
                        detail: Some(msg),
                    },
                )
            }
            ApiError::Internal(msg) => {
                error!(error = %msg, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse {
                        error: "INTERNAL".to_string(),
                        detail: None,
                    },
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

/// Extension to store an upload under; unrecognized ones are read as CSV
fn upload_extension(file_name: &str) -> String {
    FsPath::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| SourceFormat::from_extension(ext).is_some())
        .map(str::to_ascii_lowercase)
        .unwrap_or_else(|| "csv".to_string())
}

/// Write `<dir>/<id>.<ext>` by renaming a fully written sibling over it, so a
/// concurrent table load never reads a truncated file.
pub async fn store_upload(dir: &FsPath, id: &DatasetId, ext: &str, bytes: &[u8]) -> std::io::Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(format!("{id}.{ext}"));
    let staging = dir.join(format!(".{id}.{}.partial", Uuid::new_v4().simple()));

    if let Err(e) = tokio::fs::write(&staging, bytes).await {
        let _ = tokio::fs::remove_file(&staging).await;
        return Err(e);
    }
    if let Err(e) = tokio::fs::rename(&staging, &path).await {
        let _ = tokio::fs::remove_file(&staging).await;
        return Err(e);
    }
    Ok(path)
}

async fn upload_handler(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let span = info_span!("upload", request_id = %Uuid::new_v4());

    async move {
        while let Some(field) = multipart.next_field().await? {
            if field.name() != Some("file") {
                continue;
            }

            let file_name = field
                .file_name()
                .map(str::to_string)
                .ok_or_else(|| ApiError::BadRequest("field 'file' has no filename".to_string()))?;
            let id = DatasetId::from_filename(&file_name)?;
            let bytes = field.bytes().await?;

            let dir = state.upload_dir.clone();
            let pipeline = state.pipeline.clone();
            let task = async move {
                let path = store_upload(&dir, &id, &upload_extension(&file_name), &bytes).await?;
                info!(file = %file_name, path = %path.display(), bytes = bytes.len(), "Stored upload");
                pipeline
                    .register(&file_name, SourceFile::new(path))
                    .await
                    .map_err(ApiError::from)
            };
            let registration = tokio::spawn(task.in_current_span()).await??;
            state.metrics.uploads_total.inc();

            return Ok(Json(UploadResponse {
                message: "File uploaded and table created successfully".to_string(),
                registration,
            }));
        }

        Err(ApiError::BadRequest("missing multipart field 'file'".to_string()))
    }
    .instrument(span)
    .await
}

async fn query_handler(
    State(state): State<AppState>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<QueryOutcome>, ApiError> {
    let Json(request) = payload?;
    if request.natural_language_query.trim().is_empty() {
        return Err(ApiError::BadRequest("naturalLanguageQuery is empty".to_string()));
    }

    let span = info_span!("query", request_id = %Uuid::new_v4(), table = %request.table_name);
    let started = Instant::now();

    let pipeline = state.pipeline.clone();
    let result = tokio::spawn(
        async move {
            pipeline
                .ask(&request.table_name, &request.natural_language_query)
                .await
        }
        .instrument(span.clone()),
    )
    .await?;

    let elapsed = started.elapsed().as_secs_f64();
    match result {
        Ok(outcome) => {
            state.metrics.record_query("ok", elapsed);
            span.in_scope(|| info!(rows = outcome.length, elapsed_secs = elapsed, "Answered query"));
            Ok(Json(outcome))
        }
        Err(err) => {
            state.metrics.record_query(err.kind().as_str(), elapsed);
            span.in_scope(|| warn!(kind = %err.kind(), error = %err, "Query failed"));
            Err(err.into())
        }
    }
}

async fn schema_handler(
    State(state): State<AppState>,
    Path(dataset): Path<String>,
) -> Result<Json<SchemaResponse>, ApiError> {
    let pipeline = state.pipeline.clone();
    let lookup = dataset.clone();
    let columns = tokio::spawn(async move { pipeline.describe(&lookup).await }).await??;

    Ok(Json(SchemaResponse {
        table_name: dataset,
        columns,
    }))
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn metrics_handler(State(state): State<AppState>) -> Result<Response, ApiError> {
    let body = state
        .metrics
        .render()
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body).into_response())
}

pub fn router(state: AppState) -> Router {
    let body_limit = state.max_upload_bytes;

    Router::new()
        .route("/upload", post(upload_handler))
        .route("/query", post(query_handler))
        .route("/datasets/:id/schema", get(schema_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
