use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use crate::error::{OcrJobsError, RecognitionError};
use crate::jobs::{FileType, JobManager, RecognitionParams};
use crate::processor::Recognizer;

/// One accepted upload waiting for a worker.
#[derive(Clone)]
pub struct OcrTask {
    pub job_id: String,
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub params: RecognitionParams,
}

impl std::fmt::Debug for OcrTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OcrTask")
            .field("job_id", &self.job_id)
            .field("file_name", &self.file_name)
            .field("bytes", &self.bytes.len())
            .field("params", &self.params)
            .finish()
    }
}

impl OcrTask {
    pub fn new(
        job_id: impl Into<String>,
        file_name: impl Into<String>,
        bytes: Vec<u8>,
        params: RecognitionParams,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            file_name: file_name.into(),
            bytes,
            params,
        }
    }

    /// Drives the job to a terminal state.
    ///
    /// Any error or panic ends in `fail`. If recording the failure also
    /// errors, the job keeps its last durable state and is logged as orphaned.
    pub(crate) fn execute(&self, manager: &JobManager, recognizer: &Recognizer) {
        let _span = tracing::info_span!("worker.task", job_id = %self.job_id).entered();

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.run(manager, recognizer)));

        let failure = match outcome {
            Ok(Ok(())) => return,
            Ok(Err(e)) => e.to_string(),
            Err(payload) => RecognitionError::Panicked(panic_message(payload.as_ref())).to_string(),
        };

        match manager.fail(&self.job_id, &failure) {
            Ok(true) => {}
            Ok(false) => log::debug!(
                "Job {} was already terminal when its task failed: {}",
                self.job_id,
                failure
            ),
            Err(e) => log::error!(
                "Job {} could not be marked failed ({}); left orphaned after: {}",
                self.job_id,
                e,
                failure
            ),
        }
    }

    fn run(&self, manager: &JobManager, recognizer: &Recognizer) -> Result<(), OcrJobsError> {
        let file_type = FileType::detect(&self.file_name, &self.bytes);
        manager.mark_processing(&self.job_id, file_type)?;

        let output = recognizer.run(&self.bytes, file_type, &self.params)?;
        manager.complete(&self.job_id, &output.pages, &output.tokens)?;
        Ok(())
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
