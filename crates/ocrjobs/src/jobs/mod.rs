pub mod manager;
pub mod model;

pub use manager::JobManager;
pub use model::{
    ApiState, FileType, JobListing, JobRecord, JobStatus, JobSummary, JobView, Page,
    PageDimensions, RecognitionParams, RecognitionToken, StatusCounts, StatusFilter,
    DEFAULT_LANGUAGE, DEFAULT_SEGMENTATION_MODE,
};
