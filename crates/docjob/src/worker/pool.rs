use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use log::{debug, error, info, warn};
use tracing::info_span;

use crate::coordinator::JobCoordinator;
use crate::error::{JobError, ProcessorError, WorkerError};
use crate::model::JobRecord;
use crate::processor::{ProcessorOutput, ProcessorRegistry, ProgressSink};
use crate::sanitize::redact_url;
use crate::worker::context::JobContext;
use crate::worker::job::{JobOutcome, WorkerSettings};

/// Outcomes buffered per worker before new ones are dropped.
const OUTCOME_BUFFER_PER_WORKER: usize = 64;

/// Threads that claim jobs from the coordinator and run their processors.
///
/// Workers pull: each loops on `claim_next`, and when the queue is empty
/// waits on the coordinator's work signal for at most `poll_interval`.
pub struct WorkerPool {
    outcome_receiver: Receiver<JobOutcome>,
    workers: Vec<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl WorkerPool {
    pub fn start(
        coordinator: Arc<JobCoordinator>,
        registry: Arc<ProcessorRegistry>,
        settings: WorkerSettings,
    ) -> Result<Self, WorkerError> {
        if settings.worker_count == 0 {
            return Err(WorkerError::SpawnFailed(
                "worker_count must be > 0".to_string(),
            ));
        }

        let (outcome_sender, outcome_receiver) =
            bounded::<JobOutcome>(settings.worker_count * OUTCOME_BUFFER_PER_WORKER);
        let shutdown = Arc::new(AtomicBool::new(false));
        let settings = Arc::new(settings);

        let mut workers = Vec::with_capacity(settings.worker_count);

        for worker_id in 0..settings.worker_count {
            let worker = Worker {
                id: worker_id,
                coordinator: Arc::clone(&coordinator),
                registry: Arc::clone(&registry),
                settings: Arc::clone(&settings),
                shutdown: Arc::clone(&shutdown),
            };
            let outcome_tx = outcome_sender.clone();

            let spawned = thread::Builder::new()
                .name(format!("docjob-worker-{}", worker_id))
                .spawn(move || worker.run(outcome_tx));

            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    shutdown.store(true, Ordering::Relaxed);
                    for handle in workers {
                        let _ = handle.join();
                    }
                    return Err(WorkerError::SpawnFailed(e.to_string()));
                }
            }
        }

        info!("Started {} workers", settings.worker_count);

        Ok(Self {
            outcome_receiver,
            workers,
            shutdown,
        })
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    pub fn try_recv_outcome(&self) -> Option<JobOutcome> {
        self.outcome_receiver.try_recv().ok()
    }

    pub fn recv_outcome_timeout(&self, timeout: Duration) -> Option<JobOutcome> {
        self.outcome_receiver.recv_timeout(timeout).ok()
    }

    pub fn shutdown(&self) {
        info!("Shutting down worker pool...");
        self.shutdown.store(true, Ordering::Relaxed);
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    /// Joins all workers. Call [`shutdown`](Self::shutdown) first; a worker
    /// finishes the job it is processing before it exits.
    pub fn wait(self) -> Result<(), WorkerError> {
        let mut panicked = 0;
        for (i, worker) in self.workers.into_iter().enumerate() {
            if let Err(e) = worker.join() {
                error!("Worker {} panicked: {:?}", i, e);
                panicked += 1;
            } else {
                debug!("Worker {} finished", i);
            }
        }

        info!("All workers have stopped");
        if panicked > 0 {
            return Err(WorkerError::Panicked(panicked));
        }
        Ok(())
    }
}

struct Worker {
    id: usize,
    coordinator: Arc<JobCoordinator>,
    registry: Arc<ProcessorRegistry>,
    settings: Arc<WorkerSettings>,
    shutdown: Arc<AtomicBool>,
}

impl Worker {
    fn run(self, outcome_sender: Sender<JobOutcome>) {
        debug!("Worker {} started", self.id);
        let work_signal = self.coordinator.work_signal();

        loop {
            if self.shutdown.load(Ordering::Relaxed) {
                debug!("Worker {} received shutdown signal", self.id);
                break;
            }

            match self.coordinator.claim_next() {
                Ok(job) => {
                    let outcome = self.process(job);
                    if outcome_sender.try_send(outcome).is_err() {
                        debug!("Worker {} dropped an outcome: nobody is reading", self.id);
                    }
                }
                Err(JobError::NoWorkAvailable) => {
                    match work_signal.recv_timeout(self.settings.poll_interval) {
                        Ok(()) | Err(RecvTimeoutError::Timeout) => continue,
                        Err(RecvTimeoutError::Disconnected) => {
                            thread::sleep(self.settings.poll_interval)
                        }
                    }
                }
                Err(e) => {
                    warn!("Worker {} could not claim a job: {}", self.id, e);
                    thread::sleep(self.settings.poll_interval);
                }
            }
        }

        debug!("Worker {} stopped", self.id);
    }

    fn process(&self, job: JobRecord) -> JobOutcome {
        let _job_span = info_span!(
            "job",
            job_id = %job.id,
            tool = %job.tool_name,
            worker = self.id
        )
        .entered();

        if let Some(outcome) = self.try_reuse(&job) {
            return outcome;
        }

        let ctx = JobContext::new(Arc::clone(&self.coordinator), &job.id);
        let (result, attempts) = self.run_processor(&job, &ctx);

        match result {
            Ok(output) => self.record_success(&job, output, attempts),
            Err(ProcessorError::Cancelled) => {
                info!("Job {} stopped after cancellation", job.id);
                self.current_outcome(&job, attempts)
            }
            Err(e) => match self.coordinator.fail(&job.id, &e.to_string()) {
                Ok(failed) => JobOutcome::new(&failed, attempts),
                Err(JobError::IllegalTransition { .. }) => self.current_outcome(&job, attempts),
                Err(record_err) => {
                    error!("Could not record failure of job {}: {}", job.id, record_err);
                    JobOutcome::new(&job, attempts).with_error(e)
                }
            },
        }
    }

    /// Completes the job from an earlier result for the same input, if any.
    fn try_reuse(&self, job: &JobRecord) -> Option<JobOutcome> {
        let existing = match self.coordinator.find_reusable(job) {
            Ok(Some(existing)) => existing,
            Ok(None) => return None,
            Err(e) => {
                warn!("Reuse lookup for job {} failed: {}", job.id, e);
                return None;
            }
        };

        match self.coordinator.reuse_result(&job.id, &existing) {
            Ok(done) => Some(JobOutcome::new(&done, 0)),
            Err(JobError::IllegalTransition { .. }) => Some(self.current_outcome(job, 0)),
            Err(e) => {
                warn!("Could not reuse result for job {}: {}", job.id, e);
                None
            }
        }
    }

    /// Runs the processor, retrying retryable failures.
    fn run_processor(
        &self,
        job: &JobRecord,
        ctx: &JobContext,
    ) -> (Result<ProcessorOutput, ProcessorError>, u32) {
        let processor = match self.registry.get(&job.tool_name) {
            Some(processor) => processor,
            None => return (Err(ProcessorError::UnsupportedTool(job.tool_name.clone())), 0),
        };

        let max_attempts = self.settings.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match processor.process(job, ctx) {
                Ok(output) => return (Ok(output), attempt),
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    warn!(
                        "Attempt {}/{} for job {} failed: {}",
                        attempt, max_attempts, job.id, e
                    );
                    thread::sleep(self.settings.retry_delay);
                    if ctx.is_cancelled() {
                        return (Err(ProcessorError::Cancelled), attempt);
                    }
                }
                Err(e) => return (Err(e), attempt),
            }
        }
    }

    fn record_success(&self, job: &JobRecord, output: ProcessorOutput, attempts: u32) -> JobOutcome {
        match self
            .coordinator
            .complete(&job.id, &output.result_url, &output.result_hash)
        {
            Ok(done) => JobOutcome::new(&done, attempts).with_data(output.data),
            Err(JobError::IllegalTransition { from, .. }) => {
                // Cancelled or timed out while running: nothing references the artifact.
                info!(
                    "Job {} became {} before completion, discarding {}",
                    job.id,
                    from,
                    redact_url(&output.result_url)
                );
                self.coordinator.reclaim(&output.result_url);
                self.current_outcome(job, attempts)
            }
            Err(e) => {
                error!("Could not record completion of job {}: {}", job.id, e);
                JobOutcome::new(job, attempts).with_error(e)
            }
        }
    }

    fn current_outcome(&self, job: &JobRecord, attempts: u32) -> JobOutcome {
        match self.coordinator.get_status(&job.id) {
            Ok(current) => JobOutcome::new(&current, attempts),
            Err(e) => JobOutcome::new(job, attempts).with_error(e),
        }
    }
}
