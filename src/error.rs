use serde::Serialize;
use thiserror::Error;

/// Closed set of failure kinds reported to API callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    MissingFile,
    EmptyFilename,
    DecodeError,
    NoFace,
    NoCachedImage,
    InferenceError,
    UploadError,
    InternalError,
}

#[derive(Debug, Error)]
#[error("{message}")]
pub struct PipelineError {
    pub kind: ErrorKind,
    pub message: String,
}

impl PipelineError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        PipelineError {
            kind,
            message: message.into(),
        }
    }

    /// with_source formats `err` with its whole cause chain after `context`.
    pub fn with_source(kind: ErrorKind, context: &str, err: anyhow::Error) -> Self {
        PipelineError::new(kind, format!("{context}: {err:#}"))
    }

    pub fn missing_file() -> Self {
        PipelineError::new(ErrorKind::MissingFile, "the request has no `file` field")
    }

    pub fn empty_filename() -> Self {
        PipelineError::new(ErrorKind::EmptyFilename, "no image was selected for upload")
    }

    pub fn no_cached_image() -> Self {
        PipelineError::new(ErrorKind::NoCachedImage, "no image has been uploaded for this session")
    }
}
