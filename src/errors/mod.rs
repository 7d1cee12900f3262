use std::io;
use std::path::{Path, PathBuf};
use actix_web::{HttpResponse, ResponseError};
use actix_web::http::StatusCode;
use serde_json::json;
use thiserror::Error;

/// Failure of the external transcoder. Every cause (missing tool, bad codec,
/// unreadable input, unwritable output) collapses into this one kind.
#[derive(Debug, Error)]
#[error("conversion of {} failed: {message}", .source_path.display())]
pub struct ConversionError {
    pub source_path: PathBuf,
    pub message: String,
}

impl ConversionError {
    pub fn new(source_path: &Path, message: impl Into<String>) -> Self {
        Self {
            source_path: source_path.to_path_buf(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum PackError {
    #[error("IO error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Wav error: {0}")]
    Wav(#[from] hound::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid pack descriptor {}: {message}", .path.display())]
    Descriptor { path: PathBuf, message: String },
    #[error("Invalid manifest: {0}")]
    InvalidManifest(String),
    #[error("Invalid build command: {0}")]
    InvalidCommand(String),
    #[error("Network error after {attempts} attempt(s): {message}")]
    Network { attempts: u32, message: String },
    #[error(transparent)]
    Conversion(#[from] ConversionError),
    #[error("No source file for sound \"{0}\"")]
    LookupGap(String),
    #[error("Target {} is already being assembled", .0.display())]
    TargetBusy(PathBuf),
    #[error("Assembly cancelled")]
    Cancelled,
    #[error("Unknown job: {0}")]
    UnknownJob(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Background task failed: {0}")]
    Task(String),
}

pub type PackResult<T> = Result<T, PackError>;

impl PackError {
    /// Wraps an io error with the path it happened on.
    pub fn io(path: impl AsRef<Path>, source: io::Error) -> Self {
        PackError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            PackError::Io { .. } => "io",
            PackError::Wav(_) => "wav",
            PackError::Json(_) => "json",
            PackError::Descriptor { .. } => "descriptor",
            PackError::InvalidManifest(_) => "invalid_manifest",
            PackError::InvalidCommand(_) => "invalid_command",
            PackError::Network { .. } => "network",
            PackError::Conversion(_) => "conversion",
            PackError::LookupGap(_) => "lookup_gap",
            PackError::TargetBusy(_) => "target_busy",
            PackError::Cancelled => "cancelled",
            PackError::UnknownJob(_) => "unknown_job",
            PackError::Config(_) => "config",
            PackError::Task(_) => "task",
        }
    }
}

impl ResponseError for PackError {
    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .json(json!({"error": self.to_string(), "error_type": self.kind()}))
    }

    fn status_code(&self) -> StatusCode {
        match self {
            PackError::InvalidCommand(_) | PackError::Descriptor { .. } => StatusCode::BAD_REQUEST,
            PackError::UnknownJob(_) => StatusCode::NOT_FOUND,
            PackError::TargetBusy(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
