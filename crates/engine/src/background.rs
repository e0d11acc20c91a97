//! Fixed-size worker pool.
//!
//! Runs both per-item extraction work and per-file import work. Tasks run in
//! FIFO order; each submission returns a [`TaskHandle`] the caller collects
//! and waits on. A panicking task is caught and reported through its handle
//! as `TaskFailed`; the worker thread survives.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, error};
use vitrum_core::{VitrumError, VitrumResult};

/// Pool metrics snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Number of tasks waiting in the queue.
    pub queue_depth: usize,
    /// Number of tasks currently being executed by workers.
    pub active_tasks: usize,
    /// Total number of tasks finished since pool creation, panics included.
    pub tasks_completed: u64,
    /// Number of worker threads.
    pub worker_count: usize,
}

type Job = Box<dyn FnOnce() + Send>;

struct PoolInner {
    queue: Mutex<VecDeque<Job>>,
    work_ready: Condvar,
    drain_cond: Condvar,
    shutdown: AtomicBool,
    queue_depth: AtomicUsize,
    active_tasks: AtomicUsize,
    tasks_completed: AtomicU64,
}

// ============================================================================
// TaskHandle
// ============================================================================

struct Slot<T> {
    result: Mutex<Option<VitrumResult<T>>>,
    ready: Condvar,
}

/// Handle on the result of one submitted task.
pub struct TaskHandle<T> {
    slot: Arc<Slot<T>>,
}

impl<T> TaskHandle<T> {
    /// Block until the task has finished and take its result.
    pub fn wait(self) -> VitrumResult<T> {
        let mut result = self.slot.result.lock();
        loop {
            if let Some(r) = result.take() {
                return r;
            }
            self.slot.ready.wait(&mut result);
        }
    }

    /// Whether the task has finished.
    pub fn is_finished(&self) -> bool {
        self.slot.result.lock().is_some()
    }
}

impl<T> std::fmt::Debug for TaskHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle")
            .field("finished", &self.is_finished())
            .finish()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "(non-string panic)".to_string())
}

// ============================================================================
// WorkerPool
// ============================================================================

/// A fixed pool of worker threads executing tasks in FIFO order.
pub struct WorkerPool {
    inner: Arc<PoolInner>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    num_threads: usize,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("stats", &self.stats())
            .finish()
    }
}

impl WorkerPool {
    /// Create a pool with the given number of worker threads (at least one).
    ///
    /// Workers are named `vitrum-worker-0`, `vitrum-worker-1`, etc.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if a worker thread cannot be spawned.
    pub fn new(num_threads: usize) -> VitrumResult<Self> {
        let num_threads = num_threads.max(1);
        let inner = Arc::new(PoolInner {
            queue: Mutex::new(VecDeque::new()),
            work_ready: Condvar::new(),
            drain_cond: Condvar::new(),
            shutdown: AtomicBool::new(false),
            queue_depth: AtomicUsize::new(0),
            active_tasks: AtomicUsize::new(0),
            tasks_completed: AtomicU64::new(0),
        });

        let pool = Self {
            inner,
            workers: Mutex::new(Vec::with_capacity(num_threads)),
            num_threads,
        };
        for i in 0..num_threads {
            let inner = Arc::clone(&pool.inner);
            let handle = std::thread::Builder::new()
                .name(format!("vitrum-worker-{}", i))
                .spawn(move || worker_loop(&inner))?;
            pool.workers.lock().push(handle);
        }
        debug!(threads = num_threads, "Started worker pool");
        Ok(pool)
    }

    /// Number of worker threads.
    pub fn threads(&self) -> usize {
        self.num_threads
    }

    /// Submit a task; never blocks on the task itself.
    ///
    /// # Errors
    ///
    /// Returns `TaskFailed` if the pool has been shut down.
    pub fn submit<T, F>(&self, work: F) -> VitrumResult<TaskHandle<T>>
    where
        T: Send + 'static,
        F: FnOnce() -> VitrumResult<T> + Send + 'static,
    {
        if self.inner.shutdown.load(AtomicOrdering::Acquire) {
            return Err(VitrumError::TaskFailed(
                "worker pool is shut down".to_string(),
            ));
        }

        let slot = Arc::new(Slot {
            result: Mutex::new(None),
            ready: Condvar::new(),
        });
        let task_slot = Arc::clone(&slot);
        let job: Job = Box::new(move || {
            let result = match std::panic::catch_unwind(std::panic::AssertUnwindSafe(work)) {
                Ok(r) => r,
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    error!(panic = %message, "Worker task panicked");
                    Err(VitrumError::TaskFailed(message))
                }
            };
            *task_slot.result.lock() = Some(result);
            task_slot.ready.notify_all();
        });

        {
            let mut queue = self.inner.queue.lock();
            queue.push_back(job);
            self.inner.queue_depth.fetch_add(1, AtomicOrdering::Release);
        }

        self.inner.work_ready.notify_one();
        Ok(TaskHandle { slot })
    }

    /// Block until all queued and in-flight tasks have completed.
    ///
    /// Workers remain running after drain completes.
    pub fn drain(&self) {
        let mut queue = self.inner.queue.lock();
        while self.inner.queue_depth.load(AtomicOrdering::Acquire) > 0
            || self.inner.active_tasks.load(AtomicOrdering::Acquire) > 0
        {
            self.inner.drain_cond.wait(&mut queue);
        }
    }

    /// Signal workers to exit and join them; queued tasks still run first.
    pub fn shutdown(&self) {
        self.inner.shutdown.store(true, AtomicOrdering::Release);

        // Notify under the queue lock so no worker misses the wakeup
        {
            let _queue = self.inner.queue.lock();
            self.inner.work_ready.notify_all();
        }

        let mut workers = self.workers.lock();
        for handle in workers.drain(..) {
            if handle.join().is_err() {
                error!("Worker thread exited abnormally");
            }
        }
    }

    /// Return a snapshot of pool metrics.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            queue_depth: self.inner.queue_depth.load(AtomicOrdering::Relaxed),
            active_tasks: self.inner.active_tasks.load(AtomicOrdering::Relaxed),
            tasks_completed: self.inner.tasks_completed.load(AtomicOrdering::Relaxed),
            worker_count: self.num_threads,
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Decrements `active_tasks` and wakes drain waiters when the task ends.
struct ActiveTaskGuard<'a> {
    inner: &'a PoolInner,
}

impl<'a> Drop for ActiveTaskGuard<'a> {
    fn drop(&mut self) {
        let prev_active = self.inner.active_tasks.fetch_sub(1, AtomicOrdering::Release);
        self.inner
            .tasks_completed
            .fetch_add(1, AtomicOrdering::Relaxed);

        if prev_active == 1 && self.inner.queue_depth.load(AtomicOrdering::Acquire) == 0 {
            let _queue = self.inner.queue.lock();
            self.inner.drain_cond.notify_all();
        }
    }
}

fn worker_loop(inner: &PoolInner) {
    loop {
        let job = {
            let mut queue = inner.queue.lock();
            loop {
                if let Some(job) = queue.pop_front() {
                    inner.queue_depth.fetch_sub(1, AtomicOrdering::Release);
                    inner.active_tasks.fetch_add(1, AtomicOrdering::Release);
                    break job;
                }
                if inner.shutdown.load(AtomicOrdering::Acquire) {
                    return;
                }
                inner.work_ready.wait(&mut queue);
            }
        };

        let _guard = ActiveTaskGuard { inner };
        // Panics are caught inside the job and land in its handle
        job();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;

    #[test]
    fn test_submit_and_wait() {
        let pool = WorkerPool::new(2).unwrap();
        let handles: Vec<_> = (0..10)
            .map(|i| pool.submit(move || Ok(i * 2)).unwrap())
            .collect();
        let results: Vec<i32> = handles.into_iter().map(|h| h.wait().unwrap()).collect();
        assert_eq!(results, (0..10).map(|i| i * 2).collect::<Vec<_>>());
    }

    #[test]
    fn test_fifo_on_single_worker() {
        let pool = WorkerPool::new(1).unwrap();
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..5 {
            let o = Arc::clone(&order);
            pool.submit(move || {
                o.lock().push(i);
                Ok(())
            })
            .unwrap();
        }
        pool.drain();
        assert_eq!(*order.lock(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_error_result_is_delivered() {
        let pool = WorkerPool::new(1).unwrap();
        let handle = pool
            .submit(|| -> VitrumResult<()> { Err(VitrumError::storage("boom")) })
            .unwrap();
        assert!(matches!(handle.wait(), Err(VitrumError::Storage(_))));
    }

    #[test]
    fn test_panic_becomes_task_failed() {
        let pool = WorkerPool::new(1).unwrap();
        let bad = pool
            .submit(|| -> VitrumResult<()> { panic!("intentional test panic") })
            .unwrap();
        let good = pool.submit(|| Ok(7)).unwrap();
        match bad.wait() {
            Err(VitrumError::TaskFailed(msg)) => assert!(msg.contains("intentional")),
            other => panic!("unexpected {:?}", other.map(|_| ())),
        }
        assert_eq!(good.wait().unwrap(), 7);
        pool.drain();
        assert_eq!(pool.stats().tasks_completed, 2);
    }

    #[test]
    fn test_tasks_run_concurrently() {
        let pool = WorkerPool::new(2).unwrap();
        let barrier = Arc::new(Barrier::new(2));
        let handles: Vec<_> = (0..2)
            .map(|_| {
                let b = Arc::clone(&barrier);
                pool.submit(move || {
                    b.wait();
                    Ok(())
                })
                .unwrap()
            })
            .collect();
        for h in handles {
            h.wait().unwrap();
        }
    }

    #[test]
    fn test_submit_after_shutdown_rejected() {
        let pool = WorkerPool::new(1).unwrap();
        pool.shutdown();
        pool.shutdown();
        assert!(pool.submit(|| Ok(())).is_err());
    }

    #[test]
    fn test_shutdown_runs_queued_tasks() {
        let pool = WorkerPool::new(1).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..20 {
            let c = Arc::clone(&counter);
            pool.submit(move || {
                c.fetch_add(1, AtomicOrdering::Relaxed);
                Ok(())
            })
            .unwrap();
        }
        pool.shutdown();
        assert_eq!(counter.load(AtomicOrdering::Relaxed), 20);
    }

    #[test]
    fn test_drain_returns_when_idle() {
        let pool = WorkerPool::new(3).unwrap();
        pool.drain();
        assert_eq!(pool.stats().worker_count, 3);
        assert_eq!(WorkerPool::new(0).unwrap().threads(), 1);
    }
}
