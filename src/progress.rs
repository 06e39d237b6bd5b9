//! Periodic progress reports for a running batch.
//!
//! The monitor only ever *reads* a [`RemainingTasks`] implementation; it has no
//! say in scheduling. Any pool that can count its outstanding chunks can be
//! watched.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use log::info;

/// Default polling interval.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);

/// Something that knows how much work is left.
pub trait RemainingTasks: Sync {
    /// Number of task groups not yet finished.
    fn remaining_chunks(&self) -> usize;

    /// Number of tasks per group.
    fn chunk_size(&self) -> usize;

    /// Estimated remaining task count.
    fn remaining_tasks(&self) -> usize {
        self.remaining_chunks() * self.chunk_size()
    }
}

/// Lock-free countdown of outstanding chunks.
#[derive(Debug)]
pub struct ChunkCounter {
    remaining: AtomicUsize,
    chunk_size: usize,
}

impl ChunkCounter {
    /// A counter for `total_tasks` tasks split in chunks of `chunk_size`.
    pub fn new(total_tasks: usize, chunk_size: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            remaining: AtomicUsize::new(total_tasks.div_ceil(chunk_size)),
            chunk_size,
        }
    }

    /// Mark one chunk as finished.
    pub fn complete_chunk(&self) {
        // saturating: a spurious extra call must not wrap around
        let _ = self
            .remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    }
}

impl RemainingTasks for ChunkCounter {
    fn remaining_chunks(&self) -> usize {
        self.remaining.load(Ordering::Acquire)
    }

    fn chunk_size(&self) -> usize {
        self.chunk_size
    }
}

/// Logs the remaining task count every `interval` until told to stop.
#[derive(Clone, Debug)]
pub struct ProgressMonitor {
    label: String,
    interval: Duration,
}

impl ProgressMonitor {
    pub fn new(label: impl Into<String>, interval: Duration) -> Self {
        Self {
            label: label.into(),
            interval,
        }
    }

    /// Poll `tasks` until `done` receives a message or is disconnected, or
    /// nothing remains. Returns the number of reports emitted.
    pub fn watch<T>(&self, tasks: &T, done: &Receiver<()>) -> usize
    where
        T: RemainingTasks + ?Sized,
    {
        let mut reports = 0;
        loop {
            let remaining = tasks.remaining_tasks();
            if remaining == 0 {
                break;
            }
            info!("{}: Tasks remaining = {}", self.label, remaining);
            reports += 1;
            match done.recv_timeout(self.interval) {
                Err(RecvTimeoutError::Timeout) => continue,
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        reports
    }

    /// Run `work` on the current thread while a scoped thread watches `tasks`.
    /// Returns once `work` is done and the monitor has stopped.
    pub fn run_monitored<T, F, R>(&self, tasks: &T, work: F) -> R
    where
        T: RemainingTasks + ?Sized,
        F: FnOnce() -> R,
    {
        let (done_tx, done_rx) = crossbeam_channel::bounded::<()>(1);
        thread::scope(|scope| {
            scope.spawn(move || self.watch(tasks, &done_rx));
            let result = work();
            drop(done_tx);
            result
        })
    }
}
