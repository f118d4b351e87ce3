pub mod context;
pub mod job;
pub mod pool;

pub use context::JobContext;
pub use job::{JobOutcome, WorkerSettings};
pub use pool::WorkerPool;

// Re-export crossbeam_channel for embedding applications
pub use crossbeam_channel;
