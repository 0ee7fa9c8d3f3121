//! Row-level operations for the `jobs` table.
//!
//! Functions take a `&Connection` so the manager can compose several of
//! them under one lock or inside one transaction. State-changing updates are
//! conditional on the current status and report how many rows they touched.

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::DatabaseError;

/// A raw job row from the database.
#[derive(Debug, Clone)]
pub struct JobRow {
    pub id: String,
    pub file_name: String,
    pub file_type: Option<String>,
    pub status: String,
    pub start_time: String,
    pub end_time: Option<String>,
    pub page_count: Option<u32>,
    pub page_dimensions: Option<String>,
    pub recognition_params: String,
    pub error_message: Option<String>,
}

impl JobRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            file_name: row.get("file_name")?,
            file_type: row.get("file_type")?,
            status: row.get("status")?,
            start_time: row.get("start_time")?,
            end_time: row.get("end_time")?,
            page_count: row.get("page_count")?,
            page_dimensions: row.get("page_dimensions")?,
            recognition_params: row.get("recognition_params")?,
            error_message: row.get("error_message")?,
        })
    }
}

/// Query filter parameters for job listing.
#[derive(Debug, Default, Clone)]
pub struct JobFilter {
    /// Matches any of these statuses; empty means all.
    pub statuses: Vec<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

/// Inserts a new job row.
pub fn insert(conn: &Connection, job: &JobRow) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO jobs (id, file_name, file_type, status, start_time, end_time,
         page_count, page_dimensions, recognition_params, error_message)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            job.id,
            job.file_name,
            job.file_type,
            job.status,
            job.start_time,
            job.end_time,
            job.page_count,
            job.page_dimensions,
            job.recognition_params,
            job.error_message,
        ],
    )?;
    Ok(())
}

/// Finds a job by its ID.
pub fn find_by_id(conn: &Connection, id: &str) -> Result<Option<JobRow>, DatabaseError> {
    let row = conn
        .query_row("SELECT * FROM jobs WHERE id = ?1", params![id], JobRow::from_row)
        .optional()?;
    Ok(row)
}

/// pending -> processing. Returns the number of rows changed (0 or 1).
pub fn mark_processing(
    conn: &Connection,
    id: &str,
    file_type: &str,
) -> Result<usize, DatabaseError> {
    let changed = conn.execute(
        "UPDATE jobs SET status = 'processing', file_type = ?2
         WHERE id = ?1 AND status = 'pending'",
        params![id, file_type],
    )?;
    Ok(changed)
}

/// processing -> completed. Returns the number of rows changed (0 or 1).
pub fn mark_completed(
    conn: &Connection,
    id: &str,
    end_time: &str,
    page_count: u32,
    page_dimensions: &str,
) -> Result<usize, DatabaseError> {
    let changed = conn.execute(
        "UPDATE jobs SET status = 'completed', end_time = ?2, page_count = ?3,
         page_dimensions = ?4, error_message = NULL
         WHERE id = ?1 AND status = 'processing'",
        params![id, end_time, page_count, page_dimensions],
    )?;
    Ok(changed)
}

/// pending|processing -> failed. Returns the number of rows changed (0 or 1).
pub fn mark_failed(
    conn: &Connection,
    id: &str,
    end_time: &str,
    error_message: &str,
) -> Result<usize, DatabaseError> {
    let changed = conn.execute(
        "UPDATE jobs SET status = 'failed', end_time = ?2, error_message = ?3
         WHERE id = ?1 AND status IN ('pending', 'processing')",
        params![id, end_time, error_message],
    )?;
    Ok(changed)
}

/// Queries jobs with filters, returning (rows, total_count).
pub fn query(conn: &Connection, filter: &JobFilter) -> Result<(Vec<JobRow>, u64), DatabaseError> {
    let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

    let where_clause = if filter.statuses.is_empty() {
        String::new()
    } else {
        let placeholders: Vec<String> = filter
            .statuses
            .iter()
            .map(|status| {
                param_values.push(Box::new(status.clone()));
                format!("?{}", param_values.len())
            })
            .collect();
        format!("WHERE status IN ({})", placeholders.join(", "))
    };

    // Count total matching rows.
    let count_sql = format!("SELECT COUNT(*) FROM jobs {}", where_clause);
    let params_ref: Vec<&dyn rusqlite::types::ToSql> =
        param_values.iter().map(|p| p.as_ref()).collect();
    let total: u64 = conn.query_row(&count_sql, params_ref.as_slice(), |r| r.get(0))?;

    // Fetch paginated results.
    let limit = filter.limit.unwrap_or(100) as i64;
    let offset = filter.offset.unwrap_or(0) as i64;
    param_values.push(Box::new(limit));
    param_values.push(Box::new(offset));
    let query_sql = format!(
        "SELECT * FROM jobs {} ORDER BY start_time DESC, id LIMIT ?{} OFFSET ?{}",
        where_clause,
        param_values.len() - 1,
        param_values.len()
    );

    let params_ref: Vec<&dyn rusqlite::types::ToSql> =
        param_values.iter().map(|p| p.as_ref()).collect();
    let mut stmt = conn.prepare(&query_sql)?;
    let rows: Vec<JobRow> = stmt
        .query_map(params_ref.as_slice(), JobRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok((rows, total))
}

/// Counts jobs with the given status.
pub fn count_by_status(conn: &Connection, status: &str) -> Result<u64, DatabaseError> {
    let count: u64 = conn.query_row(
        "SELECT COUNT(*) FROM jobs WHERE status = ?1",
        params![status],
        |r| r.get(0),
    )?;
    Ok(count)
}

/// IDs of all jobs currently in `status`, oldest first.
pub fn find_ids_by_status(conn: &Connection, status: &str) -> Result<Vec<String>, DatabaseError> {
    let mut stmt = conn.prepare("SELECT id FROM jobs WHERE status = ?1 ORDER BY start_time")?;
    let ids = stmt
        .query_map(params![status], |r| r.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(ids)
}
