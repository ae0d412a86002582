use std::sync::Arc;
use std::time::Instant;
use axum::extract::multipart::MultipartRejection;
use axum::extract::query::QueryRejection;
use axum::extract::{DefaultBodyLimit, Multipart, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use log::{debug, warn};
use tower_http::cors::CorsLayer;
use crate::error::{ErrorKind, PipelineError};
use crate::modules::{EmotionClassifier, ImageStore, LandmarkDetector};
use crate::pipeline::pipeline::{FaceOverlayPipeline, ImageOperation};
use crate::server::models::{ApiError, HealthResponse, ProcessQuery, ProcessResponse, UploadResponse};

const FILE_FIELD: &str = "file";
const MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

type SharedPipeline<D, E, S> = Arc<FaceOverlayPipeline<D, E, S>>;

/// router builds the HTTP surface around `pipeline`.
///
/// # Arguments
/// * `pipeline` - shared pipeline, one per process
///
/// # Returns
/// * `Router` - routes `/upload`, `/process` and `/health` with permissive CORS
pub fn router<D, E, S>(pipeline: SharedPipeline<D, E, S>) -> Router
where
    D: LandmarkDetector + 'static,
    E: EmotionClassifier + 'static,
    S: ImageStore + 'static,
{
    Router::new()
        .route("/upload", post(upload::<D, E, S>))
        .route("/process", get(process::<D, E, S>))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(CorsLayer::permissive())
        .with_state(pipeline)
}

/// read_file_field returns the client filename and the content of the `file` form field.
async fn read_file_field(multipart: Result<Multipart, MultipartRejection>) -> Result<(String, Vec<u8>), PipelineError> {
    let mut multipart = match multipart {
        Ok(multipart) => multipart,
        Err(rejection) => {
            warn!("upload without a multipart body: {rejection}");
            return Err(PipelineError::missing_file())
        }
    };

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => return Err(PipelineError::missing_file()),
            Err(e) => {
                return Err(PipelineError::new(ErrorKind::MissingFile, format!("the form could not be read: {e}")))
            }
        };
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        // a `file` field without a filename counts as an empty selection
        let filename = match field.file_name() {
            None | Some("") => return Err(PipelineError::empty_filename()),
            Some(name) => name.to_string(),
        };
        let content = field
            .bytes()
            .await
            .map_err(|e| PipelineError::new(ErrorKind::MissingFile, format!("the file could not be read: {e}")))?;
        return Ok((filename, content.to_vec()))
    }
}

async fn upload<D, E, S>(
    State(pipeline): State<SharedPipeline<D, E, S>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, ApiError>
where
    D: LandmarkDetector + 'static,
    E: EmotionClassifier + 'static,
    S: ImageStore + 'static,
{
    let started = Instant::now();
    let (filename, content) = read_file_field(multipart).await?;
    debug!("received {filename} ({} bytes)", content.len());

    let output = pipeline.process_upload(&filename, &content).await?;
    debug!("upload of {filename} handled in {:?}", started.elapsed());
    Ok(Json(output.into()))
}

async fn process<D, E, S>(
    State(pipeline): State<SharedPipeline<D, E, S>>,
    query: Result<Query<ProcessQuery>, QueryRejection>,
) -> Result<Json<ProcessResponse>, ApiError>
where
    D: LandmarkDetector + 'static,
    E: EmotionClassifier + 'static,
    S: ImageStore + 'static,
{
    let query = match query {
        Ok(Query(query)) => query,
        Err(rejection) => {
            warn!("ignoring malformed query: {rejection}");
            ProcessQuery::default()
        }
    };
    let operation = query
        .operation
        .as_deref()
        .map(ImageOperation::parse)
        .unwrap_or_default();

    let output = pipeline.process_transform(query.session_id.as_deref(), operation).await?;
    Ok(Json(output.into()))
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok".to_string() })
}
