pub mod broadcast;
pub mod config;
pub mod coordinator;
pub mod db;
pub mod dedup;
pub mod error;
pub mod lifecycle;
pub mod maintenance;
pub mod model;
pub mod processor;
pub mod sanitize;
pub mod storage;
pub mod store;
pub mod telemetry;
pub mod worker;

pub use broadcast::{LifecycleBroadcaster, LifecycleEvent};
pub use config::{load_config, Config, DedupPolicy};
pub use coordinator::{CoordinatorSettings, JobCoordinator, JobStatistics, ProgressOutcome};
pub use dedup::{DedupIndex, MemoryDedupIndex, SqliteDedupIndex};
pub use error::{
    ConfigError, DocjobError, JobError, ProcessorError, Result, StorageError, TelemetryError,
    WorkerError,
};
pub use lifecycle::Completion;
pub use maintenance::{MaintenanceScanner, MaintenanceScheduler, ScanReport};
pub use model::{JobRecord, JobStatus, JobStatusView, NewJob, SubmitResponse};
pub use processor::{Processor, ProcessorOutput, ProcessorRegistry, ProgressSink};
pub use storage::{ArtifactStore, FilesystemArtifactStore, NoopArtifactStore};
pub use store::{JobPredicate, JobQuery, JobStore, MemoryJobStore, QueryOrder, SqliteJobStore};
pub use telemetry::init_logging;
pub use worker::{JobOutcome, WorkerPool, WorkerSettings};
