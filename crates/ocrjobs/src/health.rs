//! Readiness checks: recognition engine, store round-trip, free disk.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use rusqlite::params;
use serde::Serialize;
use sysinfo::Disks;

use crate::db::Database;
use crate::error::RecognitionError;
use crate::processor::RecognitionEngine;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CheckResult {
    pub name: &'static str,
    pub ok: bool,
    pub detail: String,
}

impl CheckResult {
    fn pass(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            ok: true,
            detail: detail.into(),
        }
    }

    fn fail(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            ok: false,
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub healthy: bool,
    pub checks: Vec<CheckResult>,
}

impl HealthReport {
    fn from_checks(checks: Vec<CheckResult>) -> Self {
        Self {
            healthy: checks.iter().all(|c| c.ok),
            checks,
        }
    }

    /// First failing check, in execution order.
    pub fn failed_check(&self) -> Option<&CheckResult> {
        self.checks.iter().find(|c| !c.ok)
    }
}

#[derive(Clone)]
pub struct HealthChecker {
    db: Database,
    engine: Arc<dyn RecognitionEngine>,
    database_path: PathBuf,
    /// 0 disables the disk check.
    min_free_disk_bytes: u64,
}

impl HealthChecker {
    pub fn new(
        db: Database,
        engine: Arc<dyn RecognitionEngine>,
        database_path: impl Into<PathBuf>,
        min_free_disk_bytes: u64,
    ) -> Self {
        Self {
            db,
            engine,
            database_path: database_path.into(),
            min_free_disk_bytes,
        }
    }

    /// Runs every check. Blocking: spawns the engine and scans mounts.
    pub fn run(&self) -> HealthReport {
        let report =
            HealthReport::from_checks(vec![self.check_engine(), self.check_database(), self.check_disk()]);

        if let Some(failed) = report.failed_check() {
            log::warn!("Health check '{}' failed: {}", failed.name, failed.detail);
        }
        report
    }

    /// Version banner of the recognition engine. Blocking.
    pub fn engine_version(&self) -> Result<String, RecognitionError> {
        self.engine.version()
    }

    fn check_engine(&self) -> CheckResult {
        match self.engine_version() {
            Ok(version) => CheckResult::pass("engine", version),
            Err(e) => CheckResult::fail("engine", e.to_string()),
        }
    }

    fn check_database(&self) -> CheckResult {
        let probe_id = uuid::Uuid::new_v4().to_string();
        let written_at = Utc::now().to_rfc3339();

        let result = self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO health_probe (id, written_at) VALUES (?1, ?2)",
                params![probe_id, written_at],
            )?;
            let deleted = conn.execute("DELETE FROM health_probe WHERE id = ?1", params![probe_id])?;
            Ok(deleted)
        });

        match result {
            Ok(1) => CheckResult::pass("database", "write/delete round-trip ok"),
            Ok(n) => CheckResult::fail("database", format!("probe delete removed {} rows", n)),
            Err(e) => CheckResult::fail("database", e.to_string()),
        }
    }

    fn check_disk(&self) -> CheckResult {
        if self.min_free_disk_bytes == 0 {
            return CheckResult::pass("disk", "check disabled");
        }

        let target = storage_dir(&self.database_path);
        let disks = Disks::new_with_refreshed_list();

        // The disk holding a path is the one with the longest mount-point prefix.
        let disk = disks
            .list()
            .iter()
            .filter(|d| target.starts_with(d.mount_point()))
            .max_by_key(|d| d.mount_point().as_os_str().len());

        match disk {
            Some(disk) if disk.available_space() >= self.min_free_disk_bytes => CheckResult::pass(
                "disk",
                format!(
                    "{} bytes free on {}",
                    disk.available_space(),
                    disk.mount_point().display()
                ),
            ),
            Some(disk) => CheckResult::fail(
                "disk",
                format!(
                    "only {} bytes free on {} (minimum {})",
                    disk.available_space(),
                    disk.mount_point().display(),
                    self.min_free_disk_bytes
                ),
            ),
            None => CheckResult::fail(
                "disk",
                format!("no mounted disk found for {}", target.display()),
            ),
        }
    }
}

/// Absolute directory that holds the database file.
fn storage_dir(database_path: &Path) -> PathBuf {
    let dir = match database_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    dir.canonicalize()
        .or_else(|_| std::env::current_dir())
        .unwrap_or(dir)
}
