#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex};

use ocrjobs::error::RecognitionError;
use ocrjobs::jobs::{RecognitionParams, RecognitionToken};
use ocrjobs::processor::{DecodedPage, RecognitionEngine};

/// How the fake engine responds to `recognize`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeMode {
    /// One page-level row, plus a word for every page containing dark pixels.
    Ink,
    /// Every call fails as if the engine exited non-zero.
    Fail,
    /// Every call panics.
    Panic,
}

/// Deterministic stand-in for tesseract.
///
/// Calls block while the gate is closed, which lets tests observe jobs in
/// `pending` and `processing`.
pub struct FakeEngine {
    mode: FakeMode,
    languages: Vec<String>,
    gate_open: Mutex<bool>,
    gate: Condvar,
    calls: AtomicUsize,
}

impl FakeEngine {
    pub fn new(mode: FakeMode) -> Self {
        Self {
            mode,
            languages: vec!["eng".to_string(), "deu".to_string()],
            gate_open: Mutex::new(true),
            gate: Condvar::new(),
            calls: AtomicUsize::new(0),
        }
    }

    /// Starts closed: `recognize` blocks until `open_gate`.
    pub fn gated(mode: FakeMode) -> Self {
        let engine = Self::new(mode);
        *engine.gate_open.lock().unwrap() = false;
        engine
    }

    pub fn open_gate(&self) {
        *self.gate_open.lock().unwrap() = true;
        self.gate.notify_all();
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn has_ink(page: &DecodedPage) -> bool {
    image::load_from_memory(&page.png)
        .map(|img| img.to_luma8().pixels().any(|p| p.0[0] < 128))
        .unwrap_or(false)
}

impl RecognitionEngine for FakeEngine {
    fn recognize(
        &self,
        page: &DecodedPage,
        _params: &RecognitionParams,
    ) -> Result<Vec<RecognitionToken>, RecognitionError> {
        {
            let mut open = self.gate_open.lock().unwrap();
            while !*open {
                open = self.gate.wait(open).unwrap();
            }
        }
        self.calls.fetch_add(1, Ordering::SeqCst);

        match self.mode {
            FakeMode::Fail => {
                return Err(RecognitionError::EngineFailed(
                    "fake engine refused the page".to_string(),
                ))
            }
            FakeMode::Panic => panic!("fake engine crashed"),
            FakeMode::Ink => {}
        }

        let mut tokens = vec![RecognitionToken {
            level: 1,
            page_number: 1,
            block_num: 0,
            par_num: 0,
            line_num: 0,
            word_num: 0,
            left: 0,
            top: 0,
            width: page.width as i32,
            height: page.height as i32,
            confidence: -1.0,
            text: String::new(),
        }];

        if has_ink(page) {
            tokens.push(RecognitionToken {
                level: 5,
                page_number: 1,
                block_num: 1,
                par_num: 1,
                line_num: 1,
                word_num: 1,
                left: 4,
                top: 4,
                width: page.width as i32 / 2,
                height: page.height as i32 / 2,
                confidence: 96.0,
                text: "Hello".to_string(),
            });
        }

        Ok(tokens)
    }

    fn installed_languages(&self) -> Result<Vec<String>, RecognitionError> {
        Ok(self.languages.clone())
    }

    fn version(&self) -> Result<String, RecognitionError> {
        Ok("fake 1.0".to_string())
    }
}
