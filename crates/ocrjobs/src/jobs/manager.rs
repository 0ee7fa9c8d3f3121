//! Job lifecycle manager.
//!
//! The only writer of job and token rows. Every state change is a single
//! conditional update (or one transaction for completion), so the row
//! invariants hold no matter how calls interleave:
//! `end_time` is set iff the job is terminal, `error_message` iff it failed,
//! and tokens exist only for completed jobs.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Connection;

use crate::db::job_repo::{self, JobFilter, JobRow};
use crate::db::{token_repo, Database, DatabaseError};
use crate::error::JobError;
use crate::jobs::model::{
    FileType, JobListing, JobRecord, JobStatus, JobSummary, JobView, Page, PageDimensions,
    RecognitionParams, RecognitionToken, StatusCounts, StatusFilter,
};

const FALLBACK_FAILURE_MESSAGE: &str = "Processing failed without an error message";

// ─── Helpers ────────────────────────────────────────────────────────────────

fn format_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(s: &str, job_id: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|e| {
            log::warn!("Failed to parse timestamp '{}' for job {}: {}", s, job_id, e);
            Utc::now()
        })
}

fn parse_status(s: &str, job_id: &str) -> JobStatus {
    JobStatus::parse(s).unwrap_or_else(|| {
        log::warn!(
            "Unknown job status '{}' for job {}, treating as processing",
            s,
            job_id
        );
        JobStatus::Processing
    })
}

fn record_from_row(row: JobRow) -> Result<JobRecord, DatabaseError> {
    let recognition_params: RecognitionParams = serde_json::from_str(&row.recognition_params)
        .map_err(|source| DatabaseError::Serialize {
            column: "recognition_params",
            source,
        })?;
    let page_dimensions = row
        .page_dimensions
        .as_deref()
        .map(serde_json::from_str::<Vec<PageDimensions>>)
        .transpose()
        .map_err(|source| DatabaseError::Serialize {
            column: "page_dimensions",
            source,
        })?;

    Ok(JobRecord {
        status: parse_status(&row.status, &row.id),
        file_type: row.file_type.as_deref().and_then(FileType::parse),
        start_time: parse_timestamp(&row.start_time, &row.id),
        end_time: row.end_time.as_deref().map(|t| parse_timestamp(t, &row.id)),
        page_count: row.page_count,
        page_dimensions,
        recognition_params,
        error_message: row.error_message,
        file_name: row.file_name,
        id: row.id,
    })
}

/// Explains why a conditional update touched no row.
fn rejected_transition(conn: &Connection, id: &str, to: JobStatus) -> JobError {
    match job_repo::find_by_id(conn, id) {
        Ok(Some(row)) => JobError::InvalidTransition {
            id: id.to_string(),
            from: row.status,
            to: to.as_str().to_string(),
        },
        Ok(None) => JobError::NotFound(id.to_string()),
        Err(e) => JobError::Store(e),
    }
}

// ─── JobManager ─────────────────────────────────────────────────────────────

/// Owns job identity, state transitions and result recording.
#[derive(Clone)]
pub struct JobManager {
    db: Database,
}

impl JobManager {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Creates a `pending` job and returns its id. Does no recognition work.
    pub fn submit(&self, file_name: &str, params: &RecognitionParams) -> Result<String, JobError> {
        let id = uuid::Uuid::new_v4().to_string();
        let recognition_params =
            serde_json::to_string(params).map_err(|source| DatabaseError::Serialize {
                column: "recognition_params",
                source,
            })?;

        let row = JobRow {
            id: id.clone(),
            file_name: file_name.to_string(),
            file_type: None,
            status: JobStatus::Pending.as_str().to_string(),
            start_time: format_timestamp(Utc::now()),
            end_time: None,
            page_count: None,
            page_dimensions: None,
            recognition_params,
            error_message: None,
        };

        self.db.with_conn(|conn| job_repo::insert(conn, &row))?;
        log::info!("Job {} submitted ({})", id, file_name);
        Ok(id)
    }

    /// Current job record without tokens.
    pub fn get(&self, job_id: &str) -> Result<JobRecord, JobError> {
        let row = self
            .db
            .with_conn(|conn| job_repo::find_by_id(conn, job_id))?
            .ok_or_else(|| JobError::NotFound(job_id.to_string()))?;
        Ok(record_from_row(row)?)
    }

    /// Latest committed state of a job; tokens are included only once it
    /// has completed. Row and tokens are read under the same lock.
    pub fn query(&self, job_id: &str) -> Result<JobView, JobError> {
        let (row, tokens) = self.db.with_conn(|conn| {
            let Some(row) = job_repo::find_by_id(conn, job_id)? else {
                return Ok((None, None));
            };
            let tokens = if row.status == JobStatus::Completed.as_str() {
                Some(token_repo::find_by_job(conn, job_id)?)
            } else {
                None
            };
            Ok((Some(row), tokens))
        })?;

        let row = row.ok_or_else(|| JobError::NotFound(job_id.to_string()))?;
        Ok(JobView::new(record_from_row(row)?, tokens))
    }

    /// pending -> processing.
    pub fn mark_processing(&self, job_id: &str, file_type: FileType) -> Result<(), JobError> {
        self.db.with_conn(|conn| {
            if job_repo::mark_processing(conn, job_id, file_type.as_str())? == 1 {
                Ok(Ok(()))
            } else {
                Ok(Err(rejected_transition(conn, job_id, JobStatus::Processing)))
            }
        })??;
        log::debug!("Job {} processing ({})", job_id, file_type.as_str());
        Ok(())
    }

    /// processing -> completed, storing page dimensions and the full token
    /// batch in one transaction. An empty token batch is valid.
    pub fn complete(
        &self,
        job_id: &str,
        pages: &[PageDimensions],
        tokens: &[RecognitionToken],
    ) -> Result<(), JobError> {
        let page_count = pages.len() as u32;
        if let Some(bad) = tokens
            .iter()
            .find(|t| t.page_number == 0 || t.page_number > page_count)
        {
            return Err(JobError::InvalidToken {
                id: job_id.to_string(),
                reason: format!(
                    "page number {} outside 1..={}",
                    bad.page_number, page_count
                ),
            });
        }

        let dimensions = serde_json::to_string(pages).map_err(|source| DatabaseError::Serialize {
            column: "page_dimensions",
            source,
        })?;
        let end_time = format_timestamp(Utc::now());

        self.db.with_tx(|tx| {
            let changed =
                job_repo::mark_completed(tx, job_id, &end_time, page_count, &dimensions)?;
            if changed != 1 {
                return Err(rejected_transition(tx, job_id, JobStatus::Completed));
            }
            token_repo::insert_batch(tx, job_id, tokens)?;
            Ok(())
        })?;

        log::info!(
            "Job {} completed: {} page(s), {} token(s)",
            job_id,
            page_count,
            tokens.len()
        );
        Ok(())
    }

    /// Moves a non-terminal job to `failed`.
    ///
    /// Returns `false` without touching the row when the job is already
    /// terminal, so repeated calls keep the first `end_time` and message.
    pub fn fail(&self, job_id: &str, message: &str) -> Result<bool, JobError> {
        let message = match message.trim() {
            "" => FALLBACK_FAILURE_MESSAGE,
            _ => message,
        };
        let end_time = format_timestamp(Utc::now());

        let outcome = self.db.with_conn(|conn| {
            if job_repo::mark_failed(conn, job_id, &end_time, message)? == 1 {
                return Ok(Ok(true));
            }
            match job_repo::find_by_id(conn, job_id)? {
                Some(_) => Ok(Ok(false)),
                None => Ok(Err(JobError::NotFound(job_id.to_string()))),
            }
        })??;

        if outcome {
            log::warn!("Job {} failed: {}", job_id, message);
        } else {
            log::debug!("Job {} already terminal, ignoring failure: {}", job_id, message);
        }
        Ok(outcome)
    }

    /// Lists jobs in a bucket. Counts always cover the whole store.
    pub fn list_jobs(&self, filter: StatusFilter, page: Page) -> Result<JobListing, JobError> {
        let repo_filter = JobFilter {
            statuses: filter
                .statuses()
                .iter()
                .map(|s| s.as_str().to_string())
                .collect(),
            limit: Some(page.limit),
            offset: Some(page.offset),
        };

        let (rows, total, counts) = self.db.with_conn(|conn| {
            let counts = StatusCounts {
                active: job_repo::count_by_status(conn, JobStatus::Pending.as_str())?
                    + job_repo::count_by_status(conn, JobStatus::Processing.as_str())?,
                completed: job_repo::count_by_status(conn, JobStatus::Completed.as_str())?,
                failed: job_repo::count_by_status(conn, JobStatus::Failed.as_str())?,
            };
            let (rows, total) = job_repo::query(conn, &repo_filter)?;
            Ok((rows, total, counts))
        })?;

        let jobs = rows
            .into_iter()
            .map(|row| record_from_row(row).map(JobSummary::from))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(JobListing {
            jobs,
            counts,
            total,
        })
    }

    /// Jobs left in `processing`, e.g. by a process that died mid-task.
    pub fn orphaned_jobs(&self) -> Result<Vec<String>, JobError> {
        Ok(self.db.with_conn(|conn| {
            job_repo::find_ids_by_status(conn, JobStatus::Processing.as_str())
        })?)
    }

    /// Operator-triggered reconciliation: fails every orphaned job.
    pub fn fail_orphans(&self, message: &str) -> Result<usize, JobError> {
        let mut failed = 0;
        for id in self.orphaned_jobs()? {
            if self.fail(&id, message)? {
                failed += 1;
            }
        }
        Ok(failed)
    }
}
