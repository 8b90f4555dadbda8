//! Background jobs
//!
//! Indexing and re-analysis run on one worker thread at a time. A second
//! launch while a job is active is rejected with [`JobError::Busy`]; jobs
//! are never queued or interleaved. There is no cancellation: a job runs to
//! completion or failure.
//!
//! Progress flows one way from the worker to a [`ProgressObserver`] and is
//! made non-decreasing by [`MonotonicProgress`].
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use cratedig::job::{JobRunner, NoProgress};
//!
//! let runner = JobRunner::new();
//! let handle = runner
//!     .spawn("count", Arc::new(NoProgress), |progress| {
//!         progress.progress(100);
//!         Ok(42usize)
//!     })
//!     .unwrap();
//! assert_eq!(handle.join().unwrap(), 42);
//! ```

use std::any::Any;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crate::error::{IndexError, JobError};

/// Receiver of job progress
///
/// Both channels are fire-and-forget.
pub trait ProgressObserver: Send + Sync {
    /// Completion percentage, 0 to 100
    fn progress(&self, percent: u8);

    /// Free-text status line
    fn status(&self, message: &str);
}

/// Observer that ignores everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressObserver for NoProgress {
    fn progress(&self, _percent: u8) {}
    fn status(&self, _message: &str) {}
}

/// Forwards only percentages above the last one forwarded
pub struct MonotonicProgress<'a> {
    inner: &'a dyn ProgressObserver,
    last: AtomicI32,
}

impl<'a> MonotonicProgress<'a> {
    /// Wrap an observer
    pub fn new(inner: &'a dyn ProgressObserver) -> Self {
        Self {
            inner,
            last: AtomicI32::new(-1),
        }
    }
}

impl ProgressObserver for MonotonicProgress<'_> {
    fn progress(&self, percent: u8) {
        let percent = percent.min(100);
        let previous = self.last.fetch_max(percent as i32, Ordering::AcqRel);
        if (percent as i32) > previous {
            self.inner.progress(percent);
        }
    }

    fn status(&self, message: &str) {
        self.inner.status(message);
    }
}

/// `round(100 * done / total)` as a percentage
pub fn percent_of(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    ((100.0 * done as f64 / total as f64).round() as u64).min(100) as u8
}

type Slot = Arc<Mutex<Option<String>>>;

/// Releases the runner slot when the worker exits, including by panic
struct SlotGuard(Slot);

impl Drop for SlotGuard {
    fn drop(&mut self) {
        match self.0.lock() {
            Ok(mut active) => *active = None,
            Err(poisoned) => *poisoned.into_inner() = None,
        }
    }
}

/// Single-slot job launcher
#[derive(Debug, Clone, Default)]
pub struct JobRunner {
    active: Slot,
}

/// Handle to a running job
#[derive(Debug)]
pub struct JobHandle<T> {
    name: String,
    thread: JoinHandle<Result<T, IndexError>>,
}

impl JobRunner {
    /// Runner with no active job
    pub fn new() -> Self {
        Self::default()
    }

    /// Name of the running job, if any
    pub fn active_job(&self) -> Option<String> {
        match self.active.lock() {
            Ok(active) => active.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Whether a job is running
    pub fn is_busy(&self) -> bool {
        self.active_job().is_some()
    }

    /// Start `job` on a new worker thread
    ///
    /// The job receives the observer wrapped in [`MonotonicProgress`].
    ///
    /// # Errors
    ///
    /// Returns `JobError::Busy` if another job is still running
    pub fn spawn<T, F>(
        &self,
        name: &str,
        observer: Arc<dyn ProgressObserver>,
        job: F,
    ) -> Result<JobHandle<T>, JobError>
    where
        T: Send + 'static,
        F: FnOnce(&dyn ProgressObserver) -> Result<T, IndexError> + Send + 'static,
    {
        {
            let mut active = self
                .active
                .lock()
                .map_err(|_| JobError::WorkerPanicked("job slot poisoned".to_string()))?;
            if let Some(running) = active.as_ref() {
                log::warn!("Rejecting job '{}': '{}' is still running", name, running);
                return Err(JobError::Busy(running.clone()));
            }
            *active = Some(name.to_string());
        }

        let guard = SlotGuard(Arc::clone(&self.active));
        let job_name = name.to_string();
        let spawned = thread::Builder::new()
            .name(format!("job-{}", name))
            .spawn(move || {
                let _guard = guard;
                log::info!("Job '{}' started", job_name);
                let progress = MonotonicProgress::new(observer.as_ref());
                let result = job(&progress);
                match &result {
                    Ok(_) => log::info!("Job '{}' finished", job_name),
                    Err(e) => log::warn!("Job '{}' failed: {}", job_name, e),
                }
                result
            });

        match spawned {
            Ok(thread) => Ok(JobHandle {
                name: name.to_string(),
                thread,
            }),
            // The closure (and its guard) was dropped, so the slot is free again
            Err(e) => Err(JobError::WorkerPanicked(format!("cannot spawn worker: {}", e))),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

impl<T> JobHandle<T> {
    /// Job name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the worker has exited
    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Wait for the job and return its result
    ///
    /// # Errors
    ///
    /// `JobError::Index` if the job failed, `JobError::WorkerPanicked` if it panicked
    pub fn join(self) -> Result<T, JobError> {
        match self.thread.join() {
            Ok(result) => Ok(result?),
            Err(payload) => Err(JobError::WorkerPanicked(panic_message(payload.as_ref()))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    #[derive(Default)]
    struct Recorder {
        percents: Mutex<Vec<u8>>,
        statuses: Mutex<Vec<String>>,
    }

    impl ProgressObserver for Recorder {
        fn progress(&self, percent: u8) {
            self.percents.lock().unwrap().push(percent);
        }
        fn status(&self, message: &str) {
            self.statuses.lock().unwrap().push(message.to_string());
        }
    }

    #[test]
    fn test_monotonic_progress_drops_regressions() {
        let recorder = Recorder::default();
        let progress = MonotonicProgress::new(&recorder);
        for p in [0, 10, 5, 10, 50, 120, 99] {
            progress.progress(p);
        }
        progress.status("done");
        assert_eq!(*recorder.percents.lock().unwrap(), vec![0, 10, 50, 100]);
        assert_eq!(*recorder.statuses.lock().unwrap(), vec!["done".to_string()]);
    }

    #[test]
    fn test_percent_of() {
        assert_eq!(percent_of(1, 3), 33);
        assert_eq!(percent_of(2, 3), 67);
        assert_eq!(percent_of(3, 3), 100);
        assert_eq!(percent_of(0, 0), 100);
    }

    #[test]
    fn test_second_job_rejected_while_busy() {
        let runner = JobRunner::new();
        let (release_tx, release_rx) = mpsc::channel::<()>();

        let first = runner
            .spawn("index", Arc::new(NoProgress), move |_| {
                release_rx.recv_timeout(Duration::from_secs(10)).ok();
                Ok(1usize)
            })
            .unwrap();
        assert_eq!(runner.active_job().as_deref(), Some("index"));

        match runner.spawn("reanalyze", Arc::new(NoProgress), |_| Ok(2usize)) {
            Err(JobError::Busy(running)) => assert_eq!(running, "index"),
            other => panic!("expected Busy, got {:?}", other.map(|h| h.name().to_string())),
        }

        release_tx.send(()).unwrap();
        assert_eq!(first.join().unwrap(), 1);
        assert!(!runner.is_busy());

        let second = runner.spawn("reanalyze", Arc::new(NoProgress), |_| Ok(2usize)).unwrap();
        assert_eq!(second.join().unwrap(), 2);
    }

    #[test]
    fn test_panicking_job_frees_slot() {
        let runner = JobRunner::new();
        let handle = runner
            .spawn("boom", Arc::new(NoProgress), |_| -> Result<(), IndexError> {
                panic!("worker exploded")
            })
            .unwrap();
        match handle.join() {
            Err(JobError::WorkerPanicked(msg)) => assert!(msg.contains("worker exploded")),
            other => panic!("unexpected {:?}", other),
        }
        assert!(!runner.is_busy());
    }

    #[test]
    fn test_job_receives_monotonic_observer() {
        let runner = JobRunner::new();
        let recorder = Arc::new(Recorder::default());
        let handle = runner
            .spawn("progress", recorder.clone(), |progress| {
                progress.progress(40);
                progress.progress(20);
                progress.progress(100);
                Ok(())
            })
            .unwrap();
        handle.join().unwrap();
        assert_eq!(*recorder.percents.lock().unwrap(), vec![40, 100]);
    }
}
