pub mod pool;
pub mod task;

pub use pool::{WorkerPool, SHUTDOWN_MESSAGE};
pub use task::OcrTask;
