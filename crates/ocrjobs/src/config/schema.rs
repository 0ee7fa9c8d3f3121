use serde::{Deserialize, Serialize};

use crate::jobs::{DEFAULT_LANGUAGE, DEFAULT_SEGMENTATION_MODE};

pub const CONFIG_VERSION: &str = "1.0";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_database_path")]
    pub database_path: String,
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
    /// Fail jobs left in `processing` by a previous process before serving.
    #[serde(default)]
    pub fail_orphans_on_startup: bool,
    #[serde(default)]
    pub ocr: OcrConfig,
    #[serde(default)]
    pub health: HealthConfig,
}

fn default_version() -> String {
    CONFIG_VERSION.to_string()
}

fn default_bind_address() -> String {
    "0.0.0.0:8000".to_string()
}

fn default_database_path() -> String {
    "ocr_results.db".to_string()
}

fn default_worker_count() -> usize {
    num_cpus::get()
}

fn default_max_upload_bytes() -> usize {
    50 * 1024 * 1024
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            bind_address: default_bind_address(),
            database_path: default_database_path(),
            worker_count: default_worker_count(),
            max_upload_bytes: default_max_upload_bytes(),
            fail_orphans_on_startup: false,
            ocr: OcrConfig::default(),
            health: HealthConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrConfig {
    #[serde(default = "default_tesseract_path")]
    pub tesseract_path: String,
    #[serde(default = "default_pdftoppm_path")]
    pub pdftoppm_path: String,
    #[serde(default = "default_pdfinfo_path")]
    pub pdfinfo_path: String,
    #[serde(default = "default_language")]
    pub default_language: String,
    #[serde(default = "default_segmentation_mode")]
    pub default_segmentation_mode: u8,
    /// DPI used to rasterize PDFs when the submission names none.
    #[serde(default = "default_resolution")]
    pub default_resolution: u32,
}

fn default_tesseract_path() -> String {
    "tesseract".to_string()
}

fn default_pdftoppm_path() -> String {
    "pdftoppm".to_string()
}

fn default_pdfinfo_path() -> String {
    "pdfinfo".to_string()
}

fn default_language() -> String {
    DEFAULT_LANGUAGE.to_string()
}

fn default_segmentation_mode() -> u8 {
    DEFAULT_SEGMENTATION_MODE
}

fn default_resolution() -> u32 {
    300
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            tesseract_path: default_tesseract_path(),
            pdftoppm_path: default_pdftoppm_path(),
            pdfinfo_path: default_pdfinfo_path(),
            default_language: default_language(),
            default_segmentation_mode: default_segmentation_mode(),
            default_resolution: default_resolution(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    #[serde(default = "default_min_free_disk_bytes")]
    pub min_free_disk_bytes: u64,
}

fn default_min_free_disk_bytes() -> u64 {
    1024 * 1024 * 1024
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            min_free_disk_bytes: default_min_free_disk_bytes(),
        }
    }
}
