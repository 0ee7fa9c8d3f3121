use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OcrJobsError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Job error: {0}")]
    Job(#[from] JobError),

    #[error("Recognition error: {0}")]
    Recognition(#[from] RecognitionError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },
}

/// Rejections of submission parameters. Raised before any job row exists.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Language '{language}' is not installed (available: {available})")]
    UnsupportedLanguage { language: String, available: String },

    #[error("Resolution must be a positive integer no greater than {max}, got '{value}'")]
    InvalidResolution { value: String, max: u32 },

    #[error("Segmentation mode '{value}' is not supported (allowed: {allowed})")]
    UnsupportedSegmentationMode { value: String, allowed: String },

    #[error("Malformed engine flags '{flags}': {reason}")]
    MalformedEngineFlags { flags: String, reason: String },

    #[error("Upload is empty")]
    EmptyUpload,
}

impl ValidationError {
    /// Machine-readable reason returned to HTTP clients.
    pub fn code(&self) -> &'static str {
        match self {
            ValidationError::UnsupportedLanguage { .. } => "unsupported_language",
            ValidationError::InvalidResolution { .. } => "invalid_resolution",
            ValidationError::UnsupportedSegmentationMode { .. } => "unsupported_segmentation_mode",
            ValidationError::MalformedEngineFlags { .. } => "malformed_engine_flags",
            ValidationError::EmptyUpload => "empty_upload",
        }
    }
}

#[derive(Error, Debug)]
pub enum JobError {
    #[error("Job not found: {0}")]
    NotFound(String),

    #[error("Job {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: String,
        from: String,
        to: String,
    },

    #[error("Invalid token for job {id}: {reason}")]
    InvalidToken { id: String, reason: String },

    #[error("Store error: {0}")]
    Store(#[from] crate::db::DatabaseError),
}

/// Failures of the decode-then-recognize pipeline. Always terminal for the job.
#[derive(Error, Debug)]
pub enum RecognitionError {
    #[error("Failed to decode {format} document: {reason}")]
    Decode { format: String, reason: String },

    #[error("Unsupported document format: {0}")]
    UnsupportedFormat(String),

    #[error("Recognition engine unavailable: {0}")]
    EngineUnavailable(String),

    #[error("Recognition engine failed: {0}")]
    EngineFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Recognition task panicked: {0}")]
    Panicked(String),
}

impl RecognitionError {
    pub(crate) fn decode(format: &str, reason: impl Into<String>) -> Self {
        RecognitionError::Decode {
            format: format.to_string(),
            reason: reason.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Failed to spawn worker: {0}")]
    SpawnFailed(String),

    #[error("Worker channel closed unexpectedly")]
    ChannelClosed,

    #[error("Job {0} is already scheduled")]
    AlreadyScheduled(String),
}

pub type Result<T> = std::result::Result<T, OcrJobsError>;
