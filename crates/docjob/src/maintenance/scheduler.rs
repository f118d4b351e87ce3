//! Periodic maintenance scheduler.
//!
//! Runs the scanner on a fixed interval in a background thread and supports
//! manual runs via a broadcast trigger.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tokio::sync::broadcast;

use crate::error::WorkerError;
use crate::maintenance::scanner::{MaintenanceScanner, ScanReport};

pub struct MaintenanceScheduler {
    scanner: Arc<MaintenanceScanner>,
    interval: Duration,
    shutdown: Arc<AtomicBool>,
    trigger_tx: broadcast::Sender<()>,
    last_report: Arc<Mutex<Option<ScanReport>>>,
}

impl MaintenanceScheduler {
    pub fn new(scanner: Arc<MaintenanceScanner>, interval: Duration) -> Self {
        let (trigger_tx, _) = broadcast::channel(16);
        Self {
            scanner,
            interval,
            shutdown: Arc::new(AtomicBool::new(false)),
            trigger_tx,
            last_report: Arc::new(Mutex::new(None)),
        }
    }

    /// Start the maintenance loop in a background thread.
    pub fn start(&self) -> Result<JoinHandle<()>, WorkerError> {
        let scanner = Arc::clone(&self.scanner);
        let shutdown = Arc::clone(&self.shutdown);
        let last_report = Arc::clone(&self.last_report);
        let interval = self.interval;
        let mut trigger_rx = self.trigger_tx.subscribe();

        thread::Builder::new()
            .name("docjob-maintenance".to_string())
            .spawn(move || {
                let rt = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(rt) => rt,
                    Err(e) => {
                        log::error!("Failed to build maintenance runtime: {}", e);
                        return;
                    }
                };

                rt.block_on(async {
                    let mut interval_timer = tokio::time::interval(interval);
                    interval_timer.tick().await; // skip immediate first tick

                    loop {
                        if shutdown.load(Ordering::Acquire) {
                            break;
                        }

                        tokio::select! {
                            _ = interval_timer.tick() => {},
                            Ok(()) = trigger_rx.recv() => {
                                log::info!("Manual maintenance run triggered");
                            },
                        }

                        if shutdown.load(Ordering::Acquire) {
                            break;
                        }

                        let report = scanner.run();
                        for error in &report.errors {
                            log::error!("Maintenance error: {}", error);
                        }
                        match last_report.lock() {
                            Ok(mut slot) => *slot = Some(report),
                            Err(poisoned) => *poisoned.into_inner() = Some(report),
                        }
                    }
                });
                log::debug!("Maintenance scheduler stopped");
            })
            .map_err(|e| WorkerError::SpawnFailed(e.to_string()))
    }

    /// Requests an immediate run. Has no effect if the loop is not running.
    pub fn trigger(&self) {
        let _ = self.trigger_tx.send(());
    }

    /// Signals the scheduler to stop and wakes it up.
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::Release);
        let _ = self.trigger_tx.send(());
    }

    /// Report of the most recent run, if any.
    pub fn last_report(&self) -> Option<ScanReport> {
        match self.last_report.lock() {
            Ok(slot) => slot.clone(),
            Err(poisoned) => {
                log::warn!("Maintenance report lock poisoned, recovering");
                poisoned.into_inner().clone()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::JobCoordinator;
    use crate::model::{JobRecord, JobStatus, NewJob};
    use std::time::Instant;

    fn scanner_with_stale_job() -> (Arc<JobCoordinator>, Arc<MaintenanceScanner>) {
        let coordinator = Arc::new(JobCoordinator::in_memory());
        let created = chrono::Utc::now() - chrono::Duration::hours(2);
        let record = JobRecord::new_pending("stale", &NewJob::new("compare", "a.pdf", 1), created);
        coordinator.store().create(record).unwrap();

        let scanner = Arc::new(MaintenanceScanner::new(
            Arc::clone(&coordinator),
            chrono::Duration::hours(1),
            chrono::Duration::days(30),
        ));
        (coordinator, scanner)
    }

    #[test]
    fn test_scheduler_shutdown() {
        let (_, scanner) = scanner_with_stale_job();
        let scheduler = MaintenanceScheduler::new(scanner, Duration::from_millis(50));
        let handle = scheduler.start().unwrap();

        std::thread::sleep(Duration::from_millis(100));
        scheduler.stop();

        handle.join().expect("scheduler thread panicked");
    }

    #[test]
    fn test_manual_trigger_runs_scan() {
        let (coordinator, scanner) = scanner_with_stale_job();
        let scheduler = MaintenanceScheduler::new(scanner, Duration::from_secs(3600));
        let handle = scheduler.start().unwrap();

        // The trigger receiver is subscribed in start(), so this is buffered.
        scheduler.trigger();

        let deadline = Instant::now() + Duration::from_secs(5);
        while scheduler.last_report().is_none() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }

        assert_eq!(scheduler.last_report().unwrap().timed_out, 1);
        assert_eq!(coordinator.get_status("stale").unwrap().status, JobStatus::Failed);

        scheduler.stop();
        handle.join().expect("scheduler thread panicked");
    }
}
