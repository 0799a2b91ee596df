//! Job Queue
//!
//! Render effects do not re-run inline on every write; their scheduler
//! enqueues an update job here instead. The queue deduplicates by job
//! identity, so a burst of synchronous writes touching the same effect
//! collapses into a single execution at the next flush — the
//! microtask-equivalent boundary.
//!
//! Flushing snapshots the queue and executes the snapshot in insertion
//! order. Jobs enqueued *while* flushing land in the queue for the next
//! cycle, never in the in-progress snapshot; `flush_jobs` keeps starting new
//! cycles until the queue stays empty. A panicking job aborts its cycle:
//! jobs already executed stay executed, and only work enqueued after the
//! snapshot survives in the queue.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace};

/// A unit of deferred work, deduplicated by reference identity.
pub type Job = Arc<dyn Fn() + Send + Sync>;

static QUEUE: Mutex<Vec<Job>> = Mutex::new(Vec::new());
static PENDING: AtomicBool = AtomicBool::new(false);

/// Enqueue `job` unless the very same job is already queued, and mark a
/// flush as pending.
pub fn queue_job(job: &Job) {
    let mut queue = QUEUE.lock();
    if !queue.iter().any(|queued| Arc::ptr_eq(queued, job)) {
        trace!(queued = queue.len() + 1, "job enqueued");
        queue.push(Arc::clone(job));
    }
    PENDING.store(true, Ordering::Release);
}

/// Is a flush pending? Embedders drive [`flush_jobs`] off this after their
/// synchronous unit of work completes.
pub fn has_pending_jobs() -> bool {
    PENDING.load(Ordering::Acquire)
}

/// Run every queued job.
///
/// Executes in snapshot cycles: each cycle drains the queue and runs the
/// drained jobs once, in the order they were first enqueued. Work enqueued
/// during a cycle runs in a subsequent cycle of the same call.
pub fn flush_jobs() {
    loop {
        let batch: Vec<Job> = {
            let mut queue = QUEUE.lock();
            if queue.is_empty() {
                PENDING.store(false, Ordering::Release);
                return;
            }
            std::mem::take(&mut *queue)
        };

        debug!(jobs = batch.len(), "flush cycle");
        for job in batch {
            job();
        }
    }
}

/// Serializes tests that share the process-wide queue.
#[cfg(test)]
pub(crate) fn test_flush_lock() -> parking_lot::MutexGuard<'static, ()> {
    static LOCK: Mutex<()> = Mutex::new(());
    LOCK.lock()
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
