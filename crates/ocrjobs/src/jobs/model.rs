//! Job and recognition-token types shared by the store, manager and API.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a job: `pending -> processing -> {completed, failed}`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "processing" => Some(JobStatus::Processing),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// State name exposed by the HTTP API.
    pub fn api_state(&self) -> ApiState {
        match self {
            JobStatus::Pending => ApiState::Pending,
            JobStatus::Processing => ApiState::Running,
            JobStatus::Completed => ApiState::Success,
            JobStatus::Failed => ApiState::Failed,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApiState {
    Pending,
    Running,
    Success,
    Failed,
}

/// Kind of uploaded document, recorded when processing begins.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum FileType {
    #[serde(rename = "PDF")]
    Pdf,
    #[serde(rename = "Image")]
    Image,
}

impl FileType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileType::Pdf => "PDF",
            FileType::Image => "Image",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PDF" => Some(FileType::Pdf),
            "Image" => Some(FileType::Image),
            _ => None,
        }
    }

    /// Detects the type from the upload name, falling back to the PDF magic
    /// number. Anything that is not a PDF is treated as an image and left to
    /// the decoder to reject.
    pub fn detect(file_name: &str, bytes: &[u8]) -> Self {
        let by_name = mime_guess::from_path(Path::new(file_name)).first();
        match by_name {
            Some(mime) if mime.essence_str() == "application/pdf" => FileType::Pdf,
            Some(mime) if mime.type_() == mime_guess::mime::IMAGE => FileType::Image,
            _ if bytes.starts_with(b"%PDF-") => FileType::Pdf,
            _ => FileType::Image,
        }
    }
}

pub const DEFAULT_LANGUAGE: &str = "eng";
pub const DEFAULT_SEGMENTATION_MODE: u8 = 3;

/// Engine parameters supplied at submission. Immutable once stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecognitionParams {
    pub language: String,
    pub segmentation_mode: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_flags: Option<String>,
}

impl Default for RecognitionParams {
    fn default() -> Self {
        Self {
            language: DEFAULT_LANGUAGE.to_string(),
            segmentation_mode: DEFAULT_SEGMENTATION_MODE,
            resolution: None,
            extra_flags: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PageDimensions {
    pub page_number: u32,
    pub width: u32,
    pub height: u32,
}

/// One recognized text unit (page, block, paragraph, line or word).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecognitionToken {
    pub level: i32,
    pub page_number: u32,
    pub block_num: i32,
    pub par_num: i32,
    pub line_num: i32,
    pub word_num: i32,
    pub left: i32,
    pub top: i32,
    pub width: i32,
    pub height: i32,
    /// Negative (-1) for structural levels that carry no text.
    pub confidence: f64,
    pub text: String,
}

/// A job as stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: String,
    pub file_name: String,
    pub file_type: Option<FileType>,
    pub status: JobStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub page_count: Option<u32>,
    pub page_dimensions: Option<Vec<PageDimensions>>,
    pub recognition_params: RecognitionParams,
    pub error_message: Option<String>,
}

/// Result of a status query. `results` is only present for completed jobs.
#[derive(Debug, Clone, Serialize)]
pub struct JobView {
    pub job_id: String,
    pub state: ApiState,
    pub status: JobStatus,
    pub file_name: String,
    pub file_type: Option<FileType>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub page_count: Option<u32>,
    pub pages: Option<Vec<PageDimensions>>,
    pub recognition_params: RecognitionParams,
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<RecognitionToken>>,
}

impl JobView {
    pub fn new(record: JobRecord, tokens: Option<Vec<RecognitionToken>>) -> Self {
        Self {
            job_id: record.id,
            state: record.status.api_state(),
            status: record.status,
            file_name: record.file_name,
            file_type: record.file_type,
            start_time: record.start_time,
            end_time: record.end_time,
            page_count: record.page_count,
            pages: record.page_dimensions,
            recognition_params: record.recognition_params,
            error_message: record.error_message,
            results: tokens,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JobSummary {
    pub job_id: String,
    pub file_name: String,
    pub file_type: Option<FileType>,
    pub state: ApiState,
    pub status: JobStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub page_count: Option<u32>,
    pub error_message: Option<String>,
}

impl From<JobRecord> for JobSummary {
    fn from(record: JobRecord) -> Self {
        Self {
            job_id: record.id,
            file_name: record.file_name,
            file_type: record.file_type,
            state: record.status.api_state(),
            status: record.status,
            start_time: record.start_time,
            end_time: record.end_time,
            page_count: record.page_count,
            error_message: record.error_message,
        }
    }
}

/// Listing buckets. `Active` covers both pending and processing jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusFilter {
    Active,
    Completed,
    Failed,
    All,
}

impl StatusFilter {
    /// Parses the `status` query value (`pending|completed|failed|all`).
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(StatusFilter::Active),
            "completed" => Some(StatusFilter::Completed),
            "failed" => Some(StatusFilter::Failed),
            "all" => Some(StatusFilter::All),
            _ => None,
        }
    }

    pub fn statuses(&self) -> &'static [JobStatus] {
        match self {
            StatusFilter::Active => &[JobStatus::Pending, JobStatus::Processing],
            StatusFilter::Completed => &[JobStatus::Completed],
            StatusFilter::Failed => &[JobStatus::Failed],
            StatusFilter::All => &[],
        }
    }
}

/// Whole-store counts, independent of the requested filter.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct StatusCounts {
    /// pending + processing
    pub active: u64,
    pub completed: u64,
    pub failed: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobListing {
    pub jobs: Vec<JobSummary>,
    pub counts: StatusCounts,
    /// Number of jobs matching the filter, ignoring pagination.
    pub total: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct Page {
    pub limit: u64,
    pub offset: u64,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            limit: 100,
            offset: 0,
        }
    }
}
