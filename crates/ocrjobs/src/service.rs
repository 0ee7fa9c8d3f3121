//! Ties validation, the lifecycle manager and the worker pool together for
//! the request path.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{OcrJobsError, ValidationError};
use crate::health::{HealthChecker, HealthReport};
use crate::jobs::{JobListing, JobManager, JobView, Page, StatusFilter};
use crate::validation::{ParamValidator, RawParams};
use crate::worker::{OcrTask, WorkerPool};

const UNNAMED_UPLOAD: &str = "upload";

/// What this instance can recognize and where it runs.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceInfo {
    pub languages: Vec<String>,
    /// Engine banner, or the reason it could not be read.
    pub engine_version: String,
    pub engine_available: bool,
    pub service_version: &'static str,
    pub os: &'static str,
    pub architecture: &'static str,
    pub current_time: DateTime<Utc>,
}

#[derive(Clone)]
pub struct OcrService {
    manager: JobManager,
    pool: Arc<WorkerPool>,
    validator: Arc<ParamValidator>,
    health: HealthChecker,
}

impl OcrService {
    pub fn new(
        manager: JobManager,
        pool: Arc<WorkerPool>,
        validator: ParamValidator,
        health: HealthChecker,
    ) -> Self {
        Self {
            manager,
            pool,
            validator: Arc::new(validator),
            health,
        }
    }

    pub fn manager(&self) -> &JobManager {
        &self.manager
    }

    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    /// Validates, records and schedules an upload, returning the new job id.
    ///
    /// Validation failures create no job. If scheduling fails after the job
    /// row exists, the job is failed so it cannot linger as `pending`.
    pub fn submit_upload(
        &self,
        file_name: &str,
        bytes: Vec<u8>,
        raw: &RawParams,
    ) -> Result<String, OcrJobsError> {
        if bytes.is_empty() {
            return Err(ValidationError::EmptyUpload.into());
        }
        let params = self.validator.validate(raw)?;

        let file_name = match file_name.trim() {
            "" => UNNAMED_UPLOAD,
            name => name,
        };
        let job_id = self.manager.submit(file_name, &params)?;

        if let Err(e) = self
            .pool
            .submit(OcrTask::new(&job_id, file_name, bytes, params))
        {
            let message = format!("Could not schedule job: {}", e);
            if let Err(fail_err) = self.manager.fail(&job_id, &message) {
                log::error!("Job {} is unscheduled and could not be failed: {}", job_id, fail_err);
            }
            return Err(e.into());
        }

        Ok(job_id)
    }

    pub fn query(&self, job_id: &str) -> Result<JobView, OcrJobsError> {
        Ok(self.manager.query(job_id)?)
    }

    pub fn list_jobs(&self, filter: StatusFilter, page: Page) -> Result<JobListing, OcrJobsError> {
        Ok(self.manager.list_jobs(filter, page)?)
    }

    pub fn health(&self) -> HealthReport {
        self.health.run()
    }

    /// Languages accepted at submission plus engine and host details.
    /// Blocking: asks the engine for its version.
    pub fn info(&self) -> ServiceInfo {
        let (engine_version, engine_available) = match self.health.engine_version() {
            Ok(version) => (version, true),
            Err(e) => (format!("unavailable: {}", e), false),
        };

        ServiceInfo {
            languages: self.validator.languages().map(str::to_string).collect(),
            engine_version,
            engine_available,
            service_version: env!("CARGO_PKG_VERSION"),
            os: std::env::consts::OS,
            architecture: std::env::consts::ARCH,
            current_time: Utc::now(),
        }
    }

    /// Stops intake and waits for running tasks; queued tasks are failed.
    pub fn shutdown(&self) {
        self.pool.shutdown();
        self.pool.wait();
    }
}
