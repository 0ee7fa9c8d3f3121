//! Test harness for isolated service execution.

#![allow(dead_code)]

use std::io::Cursor;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tempfile::TempDir;

use ocrjobs::config::OcrConfig;
use ocrjobs::jobs::{JobRecord, JobStatus};
use ocrjobs::{
    Database, DocumentDecoder, HealthChecker, JobManager, OcrService, ParamValidator,
    RecognitionEngine, Recognizer, WorkerPool,
};

use super::engine::FakeEngine;

/// A service wired to a fake engine and a store in a temp directory.
pub struct TestHarness {
    /// Holds the database file for the harness lifetime.
    temp_dir: TempDir,
    pub engine: Arc<FakeEngine>,
    pub manager: JobManager,
    pub service: OcrService,
}

impl TestHarness {
    pub fn new(engine: FakeEngine) -> Self {
        Self::with_workers(engine, 2)
    }

    pub fn with_workers(engine: FakeEngine, workers: usize) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let db_path = temp_dir.path().join("ocr_results.db");
        let db = Database::open(&db_path).expect("Failed to open database");

        let engine = Arc::new(engine);
        let dyn_engine: Arc<dyn RecognitionEngine> = engine.clone();
        let ocr = OcrConfig::default();

        let manager = JobManager::new(db.clone());
        let recognizer = Recognizer::new(dyn_engine.clone(), DocumentDecoder::new(&ocr));
        let pool = WorkerPool::new(manager.clone(), recognizer, workers).expect("Failed to start pool");
        let validator = ParamValidator::from_engine(dyn_engine.as_ref(), &ocr).expect("languages");
        let health = HealthChecker::new(db, dyn_engine, &db_path, 0);

        let service = OcrService::new(manager.clone(), Arc::new(pool), validator, health);

        Self {
            temp_dir,
            engine,
            manager,
            service,
        }
    }

    /// Polls until the job is terminal, panicking after ten seconds.
    pub fn wait_for_terminal(&self, job_id: &str) -> JobRecord {
        self.wait_for(job_id, |status| status.is_terminal())
    }

    pub fn wait_for(&self, job_id: &str, done: impl Fn(JobStatus) -> bool) -> JobRecord {
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            let record = self.manager.get(job_id).expect("job exists");
            if done(record.status) {
                return record;
            }
            assert!(
                Instant::now() < deadline,
                "job {} stuck in {}",
                job_id,
                record.status
            );
            thread::sleep(Duration::from_millis(10));
        }
    }

    pub fn shutdown(&self) {
        self.service.shutdown();
    }
}

fn encode_png(img: image::GrayImage) -> Vec<u8> {
    let mut out = Vec::new();
    image::DynamicImage::ImageLuma8(img)
        .write_to(&mut Cursor::new(&mut out), image::ImageFormat::Png)
        .expect("Failed to encode PNG");
    out
}

/// White page with a black bar standing in for a line of text.
pub fn text_page() -> Vec<u8> {
    let mut img = image::GrayImage::from_pixel(120, 60, image::Luma([255]));
    for x in 10..110 {
        for y in 25..35 {
            img.put_pixel(x, y, image::Luma([0]));
        }
    }
    encode_png(img)
}

pub fn blank_page() -> Vec<u8> {
    encode_png(image::GrayImage::from_pixel(120, 60, image::Luma([255])))
}
