//! Application state management

use ocrjobs::OcrService;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    service: OcrService,
}

impl AppState {
    pub fn new(service: OcrService) -> Self {
        Self { service }
    }

    pub fn service(&self) -> &OcrService {
        &self.service
    }
}
