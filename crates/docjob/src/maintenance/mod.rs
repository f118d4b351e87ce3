//! Periodic maintenance: stale-job timeout and retention purge.

pub mod scanner;
pub mod scheduler;

pub use scanner::{MaintenanceScanner, ScanReport, STALE_JOB_MESSAGE};
pub use scheduler::MaintenanceScheduler;
