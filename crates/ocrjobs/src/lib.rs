pub mod config;
pub mod db;
pub mod error;
pub mod health;
pub mod jobs;
pub mod processor;
pub mod service;
pub mod validation;
pub mod worker;

pub use config::{load_config, ServiceConfig};
pub use db::{Database, DatabaseError};
pub use error::{
    ConfigError, JobError, OcrJobsError, RecognitionError, Result, ValidationError, WorkerError,
};
pub use health::{CheckResult, HealthChecker, HealthReport};
pub use jobs::{JobManager, JobStatus, JobView, StatusFilter};
pub use processor::{DocumentDecoder, PageDecoder, RecognitionEngine, Recognizer, TesseractEngine};
pub use service::{OcrService, ServiceInfo};
pub use validation::{EngineFlag, ParamValidator, RawParams};
pub use worker::{OcrTask, WorkerPool};
