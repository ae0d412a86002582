use axum::response::{IntoResponse, Response};
use axum::Json;
use log::error;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::error::{ErrorKind, PipelineError};
use crate::pipeline::pipeline::{ProcessOutput, UploadOutput};

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct UploadResponse {
    pub image_with_points_base64: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub dominant_emotion: Option<String>,
    pub drive_id: String,
    pub session_id: Uuid,
}

impl From<UploadOutput> for UploadResponse {
    fn from(output: UploadOutput) -> Self {
        UploadResponse {
            image_with_points_base64: output.image_with_points_base64,
            dominant_emotion: output.dominant_emotion,
            drive_id: output.drive_id,
            session_id: output.session_id,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct ProcessResponse {
    pub image_with_points_base64: String,
}

impl From<ProcessOutput> for ProcessResponse {
    fn from(output: ProcessOutput) -> Self {
        ProcessResponse {
            image_with_points_base64: output.image_with_points_base64,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ProcessQuery {
    pub operation: Option<String>,
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_kind: ErrorKind,
}

/// Wraps a [`PipelineError`] so it renders as a JSON body with status 200.
#[derive(Debug)]
pub struct ApiError(pub PipelineError);

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error!("request failed ({:?}): {}", self.0.kind, self.0.message);
        Json(ErrorResponse {
            error: self.0.message,
            error_kind: self.0.kind,
        })
        .into_response()
    }
}
