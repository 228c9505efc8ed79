//! Best-effort deferred tasks.
//!
//! Sections defer watcher and listener registration so construction stays
//! cheap. A task runs at the first of: the host yielding ([`IdleScheduler::run_pending`]),
//! its timeout expiring ([`IdleScheduler::run_expired`]), or a driver tick.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::task::JoinHandle;

type TaskFn = Box<dyn FnOnce() + Send + 'static>;

struct IdleTask {
    label: &'static str,
    deadline: Option<Instant>,
    run: TaskFn,
}

/// Queue of deferred tasks. Clones share the queue.
#[derive(Clone, Default)]
pub struct IdleScheduler {
    queue: Arc<Mutex<VecDeque<IdleTask>>>,
    default_timeout: Option<Duration>,
}

impl std::fmt::Debug for IdleScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdleScheduler")
            .field("pending", &self.pending())
            .field("default_timeout", &self.default_timeout)
            .finish()
    }
}

impl IdleScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scheduler whose tasks fall back to running after `timeout`.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            queue: Arc::default(),
            default_timeout: Some(timeout),
        }
    }

    /// Defer `task` using the scheduler's default timeout.
    pub fn schedule(&self, label: &'static str, task: impl FnOnce() + Send + 'static) {
        self.push(label, self.default_timeout, Box::new(task));
    }

    /// Defer `task`, forcing it to run once `timeout` has elapsed.
    pub fn schedule_with_timeout(
        &self,
        label: &'static str,
        timeout: Duration,
        task: impl FnOnce() + Send + 'static,
    ) {
        self.push(label, Some(timeout), Box::new(task));
    }

    fn push(&self, label: &'static str, timeout: Option<Duration>, run: TaskFn) {
        let deadline = timeout.map(|t| Instant::now() + t);
        self.queue.lock().push_back(IdleTask { label, deadline, run });
        tracing::trace!(label, "idle task scheduled");
    }

    /// Number of queued tasks.
    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }

    /// Run every queued task, including tasks queued while running.
    ///
    /// The queue lock is released while a task runs. Returns the number of
    /// tasks run.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        loop {
            let next = self.queue.lock().pop_front();
            let Some(task) = next else {
                break;
            };
            tracing::trace!(label = task.label, "running idle task");
            (task.run)();
            ran += 1;
        }
        ran
    }

    /// Run only tasks whose timeout has expired.
    pub fn run_expired(&self) -> usize {
        let now = Instant::now();
        let expired: Vec<IdleTask> = {
            let mut queue = self.queue.lock();
            let (expired, waiting): (VecDeque<_>, VecDeque<_>) = queue
                .drain(..)
                .partition(|t| t.deadline.map(|d| d <= now).unwrap_or(false));
            *queue = waiting;
            expired.into_iter().collect()
        };
        let ran = expired.len();
        for task in expired {
            tracing::trace!(label = task.label, "idle task timed out, running");
            (task.run)();
        }
        ran
    }

    /// Spawn a tokio task that drains the queue every `period`.
    pub fn spawn_driver(&self, period: Duration) -> JoinHandle<()> {
        let scheduler = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                scheduler.run_pending();
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_run_pending_in_order() {
        let scheduler = IdleScheduler::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            let log = log.clone();
            scheduler.schedule("push", move || log.lock().push(i));
        }
        assert_eq!(scheduler.pending(), 3);
        assert_eq!(scheduler.run_pending(), 3);
        assert_eq!(*log.lock(), vec![0, 1, 2]);
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn test_tasks_can_schedule_tasks() {
        let scheduler = IdleScheduler::new();
        let count = Arc::new(AtomicUsize::new(0));
        let inner = scheduler.clone();
        let c = count.clone();
        scheduler.schedule("outer", move || {
            c.fetch_add(1, Ordering::SeqCst);
            let c2 = c.clone();
            inner.schedule("inner", move || {
                c2.fetch_add(1, Ordering::SeqCst);
            });
        });
        assert_eq!(scheduler.run_pending(), 2);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_run_expired_only_runs_due_tasks() {
        let scheduler = IdleScheduler::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        scheduler.schedule_with_timeout("due", Duration::ZERO, move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        let c = count.clone();
        scheduler.schedule("idle", move || {
            c.fetch_add(10, Ordering::SeqCst);
        });
        assert_eq!(scheduler.run_expired(), 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.pending(), 1);
    }

    #[tokio::test]
    async fn test_driver_drains_queue() {
        let scheduler = IdleScheduler::with_timeout(Duration::from_secs(60));
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        scheduler.schedule("tick", move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        let handle = scheduler.spawn_driver(Duration::from_millis(5));
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.abort();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
