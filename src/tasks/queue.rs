//! The queue, its worker pool and the drain barrier.

use std::any::Any;
use std::fmt::Display;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};
use parking_lot::{Condvar, Mutex, RwLock};
use tracing::{debug, info};

use crate::config::TaskSettings;
use crate::error::{Error, Result};

use super::deferred::{Deferred, DeferredThen};
use super::observer::{FailureStage, SilentObserver, TaskFailure, TaskObserver};

/// One unit of deferred work, target and callback already bound to their
/// arguments. Returns the failure, if any, for the observer.
type Job = Box<dyn FnOnce() -> Option<TaskFailure> + Send + 'static>;

/// Worker pool size.
#[derive(Clone, Copy, Debug)]
pub struct TaskQueueConfig {
    pub worker_threads: usize,
}

impl Default for TaskQueueConfig {
    fn default() -> Self {
        Self { worker_threads: 10 }
    }
}

impl From<&TaskSettings> for TaskQueueConfig {
    fn from(s: &TaskSettings) -> Self {
        Self { worker_threads: s.worker_threads }
    }
}

/// A fire-and-forget task queue backed by a fixed pool of OS threads.
///
/// Cloning is cheap; every clone submits into the same queue. Submission
/// never blocks: the queue is unbounded. Tasks are dequeued in submission
/// order, but with more than one worker they may complete in any order.
///
/// ```rust
/// use tsu_common::tasks::{TaskQueue, TaskQueueConfig};
///
/// let queue = TaskQueue::start(TaskQueueConfig { worker_threads: 2 }).unwrap();
/// queue
///     .submit_then(
///         || Ok::<_, std::io::Error>(21),
///         |n| {
///             assert_eq!(n, 21);
///             Ok::<_, std::io::Error>(())
///         },
///     )
///     .unwrap();
/// queue.drain();
/// ```
#[derive(Clone)]
pub struct TaskQueue {
    inner: Arc<Inner>,
}

struct Inner {
    // `None` once shut down. Dropping the last sender lets workers exit.
    sender: RwLock<Option<Sender<Job>>>,
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

/// The part of the queue the workers hold. It must not own the sender.
struct Shared {
    // queued + in-flight
    pending: Mutex<usize>,
    idle: Condvar,
    observer: Arc<dyn TaskObserver>,
}

impl Shared {
    fn task_done(&self) {
        let mut pending = self.pending.lock();
        *pending -= 1;
        if *pending == 0 {
            self.idle.notify_all();
        }
    }
}

impl TaskQueue {
    /// Starts `config.worker_threads` workers that discard task failures.
    pub fn start(config: TaskQueueConfig) -> Result<Self> {
        Self::start_with_observer(config, SilentObserver)
    }

    /// Starts the pool with a custom failure observer.
    pub fn start_with_observer(
        config: TaskQueueConfig,
        observer: impl TaskObserver,
    ) -> Result<Self> {
        if config.worker_threads == 0 {
            return Err(Error::Config("task queue needs at least one worker thread".into()));
        }

        let (sender, receiver) = crossbeam_channel::unbounded::<Job>();
        let shared = Arc::new(Shared {
            pending: Mutex::new(0),
            idle: Condvar::new(),
            observer: Arc::new(observer),
        });

        let mut workers = Vec::with_capacity(config.worker_threads);
        for id in 0..config.worker_threads {
            let receiver = receiver.clone();
            let shared = Arc::clone(&shared);
            let handle = thread::Builder::new()
                .name(format!("tsu-task-{id}"))
                .spawn(move || worker_loop(receiver, shared))?;
            workers.push(handle);
        }

        info!(workers = config.worker_threads, "task queue started");

        Ok(Self {
            inner: Arc::new(Inner {
                sender: RwLock::new(Some(sender)),
                shared,
                workers: Mutex::new(workers),
            }),
        })
    }

    /// Enqueues `target` and returns immediately.
    ///
    /// An `Err` from the target, or a panic, goes to the observer.
    pub fn submit<F, T, E>(&self, target: F) -> Result<()>
    where
        F: FnOnce() -> std::result::Result<T, E> + Send + 'static,
        T: 'static,
        E: Display + 'static,
    {
        self.enqueue(Box::new(move || run_stage(FailureStage::Target, target).err()))
    }

    /// Enqueues `target`; if it succeeds, `callback` runs with its value on
    /// the same worker.
    ///
    /// Extra callback arguments are captured by the callback closure.
    pub fn submit_then<F, T, E, C, E2>(&self, target: F, callback: C) -> Result<()>
    where
        F: FnOnce() -> std::result::Result<T, E> + Send + 'static,
        T: 'static,
        E: Display + 'static,
        C: FnOnce(T) -> std::result::Result<(), E2> + Send + 'static,
        E2: Display + 'static,
    {
        self.enqueue(Box::new(move || {
            let value = match run_stage(FailureStage::Target, target) {
                Ok(value) => value,
                Err(failure) => return Some(failure),
            };
            run_stage(FailureStage::Callback, move || callback(value)).err()
        }))
    }

    /// Wraps `f` so that calling the wrapper enqueues `f(args)` instead of
    /// running it.
    pub fn defer<F>(&self, f: F) -> Deferred<F> {
        Deferred::new(self.clone(), f)
    }

    /// Like [`defer`](Self::defer), with a completion callback.
    pub fn defer_then<F, C>(&self, f: F, callback: C) -> DeferredThen<F, C> {
        DeferredThen::new(self.clone(), f, callback)
    }

    /// Blocks until every submitted task has finished.
    ///
    /// Returns immediately when nothing is pending. Must not be called from
    /// inside a task: the calling task counts as in-flight.
    pub fn drain(&self) {
        let mut pending = self.inner.shared.pending.lock();
        while *pending > 0 {
            self.inner.shared.idle.wait(&mut pending);
        }
    }

    /// Queued plus in-flight tasks.
    pub fn pending(&self) -> usize {
        *self.inner.shared.pending.lock()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.sender.read().is_none()
    }

    /// Stops accepting work, waits for the backlog and joins the workers.
    ///
    /// Later submissions fail with [`Error::QueueClosed`]. Calling it again
    /// is a no-op.
    pub fn shutdown(&self) {
        let sender = self.inner.sender.write().take();
        if sender.is_none() {
            return;
        }
        // Disconnects the channel; workers exit once it is empty.
        drop(sender);

        info!(pending = self.pending(), "task queue shutting down");
        self.drain();

        let workers = std::mem::take(&mut *self.inner.workers.lock());
        let current = thread::current().id();
        for handle in workers {
            if handle.thread().id() != current {
                let _ = handle.join();
            }
        }
        info!("task queue stopped");
    }

    fn enqueue(&self, job: Job) -> Result<()> {
        let sender = self.inner.sender.read();
        let Some(sender) = sender.as_ref() else {
            return Err(Error::QueueClosed);
        };

        // Count before sending so a concurrent drain cannot miss the task.
        *self.inner.shared.pending.lock() += 1;
        if sender.send(job).is_err() {
            self.inner.shared.task_done();
            return Err(Error::QueueClosed);
        }
        Ok(())
    }
}

fn worker_loop(receiver: Receiver<Job>, shared: Arc<Shared>) {
    let current = thread::current();
    let name = current.name().unwrap_or("?");
    debug!(worker = name, "worker started");

    // `iter` blocks between tasks and ends once every sender is gone.
    for job in receiver.iter() {
        if let Some(failure) = job() {
            let observer = &shared.observer;
            let _ = panic::catch_unwind(AssertUnwindSafe(|| observer.on_failure(&failure)));
        }
        shared.task_done();
    }

    debug!(worker = name, "worker stopped");
}

fn run_stage<F, T, E>(stage: FailureStage, f: F) -> std::result::Result<T, TaskFailure>
where
    F: FnOnce() -> std::result::Result<T, E>,
    E: Display,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(TaskFailure { stage, message: e.to_string(), panicked: false }),
        Err(payload) => Err(TaskFailure { stage, message: panic_message(&*payload), panicked: true }),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    fn queue(workers: usize) -> TaskQueue {
        TaskQueue::start(TaskQueueConfig { worker_threads: workers }).unwrap()
    }

    #[derive(Default)]
    struct Collect(Mutex<Vec<TaskFailure>>);

    impl TaskObserver for Arc<Collect> {
        fn on_failure(&self, failure: &TaskFailure) {
            self.0.lock().push(failure.clone());
        }
    }

    #[test]
    fn test_zero_workers_rejected() {
        let err = TaskQueue::start(TaskQueueConfig { worker_threads: 0 }).err();
        assert!(matches!(err, Some(Error::Config(_))));
    }

    #[test]
    fn test_drain_on_empty_queue_returns() {
        let q = queue(2);
        let started = Instant::now();
        q.drain();
        assert!(started.elapsed() < Duration::from_millis(100));
        assert_eq!(q.pending(), 0);
    }

    #[test]
    fn test_every_task_runs_once() {
        let q = queue(4);
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..200 {
            let counter = Arc::clone(&counter);
            q.submit(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>(())
            })
            .unwrap();
        }
        q.drain();
        assert_eq!(counter.load(Ordering::SeqCst), 200);
        assert_eq!(q.pending(), 0);
    }

    #[test]
    fn test_single_worker_preserves_fifo() {
        let q = queue(1);
        let seen = Arc::new(Mutex::new(Vec::new()));
        for i in 0..20 {
            let seen = Arc::clone(&seen);
            q.submit(move || {
                seen.lock().push(i);
                Ok::<_, String>(())
            })
            .unwrap();
        }
        q.drain();
        assert_eq!(*seen.lock(), (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn test_submit_does_not_block_on_slow_task() {
        let q = queue(1);
        q.submit(|| {
            thread::sleep(Duration::from_millis(300));
            Ok::<_, String>(())
        })
        .unwrap();

        let started = Instant::now();
        for _ in 0..10 {
            q.submit(|| Ok::<_, String>(())).unwrap();
        }
        assert!(started.elapsed() < Duration::from_millis(100));
        q.drain();
    }

    #[test]
    fn test_failures_do_not_stop_the_worker() {
        let failures = Arc::new(Collect::default());
        let q = TaskQueue::start_with_observer(
            TaskQueueConfig { worker_threads: 1 },
            Arc::clone(&failures),
        )
        .unwrap();
        let ran = Arc::new(AtomicUsize::new(0));

        q.submit(|| Err::<(), _>("boom")).unwrap();
        q.submit(|| -> std::result::Result<(), String> { panic!("kaboom") }).unwrap();
        let after = Arc::clone(&ran);
        q.submit(move || {
            after.fetch_add(1, Ordering::SeqCst);
            Ok::<_, String>(())
        })
        .unwrap();
        q.drain();

        assert_eq!(ran.load(Ordering::SeqCst), 1);
        let failures = failures.0.lock();
        assert_eq!(failures.len(), 2);
        assert_eq!(failures[0].message, "boom");
        assert!(!failures[0].panicked);
        assert_eq!(failures[1].message, "kaboom");
        assert!(failures[1].panicked);
        assert!(failures.iter().all(|f| f.stage == FailureStage::Target));
    }

    #[test]
    fn test_callback_receives_target_value() {
        let q = queue(2);
        let got = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&got);
        let suffix = String::from("!");
        q.submit_then(
            || Ok::<_, String>(41 + 1),
            move |n| {
                *sink.lock() = Some(format!("{n}{suffix}"));
                Ok::<_, String>(())
            },
        )
        .unwrap();
        q.drain();
        assert_eq!(got.lock().as_deref(), Some("42!"));
    }

    #[test]
    fn test_callback_skipped_when_target_fails() {
        let failures = Arc::new(Collect::default());
        let q = TaskQueue::start_with_observer(
            TaskQueueConfig { worker_threads: 1 },
            Arc::clone(&failures),
        )
        .unwrap();
        let called = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&called);
        q.submit_then(
            || Err::<u8, _>("nope"),
            move |_| {
                c.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>(())
            },
        )
        .unwrap();
        q.drain();
        assert_eq!(called.load(Ordering::SeqCst), 0);
        assert_eq!(failures.0.lock()[0].stage, FailureStage::Target);
    }

    #[test]
    fn test_callback_failure_reported_separately() {
        let failures = Arc::new(Collect::default());
        let q = TaskQueue::start_with_observer(
            TaskQueueConfig { worker_threads: 1 },
            Arc::clone(&failures),
        )
        .unwrap();
        q.submit_then(|| Ok::<_, String>(()), |()| Err::<(), _>("callback broke")).unwrap();
        q.drain();
        let failures = failures.0.lock();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].stage, FailureStage::Callback);
        assert_eq!(failures[0].message, "callback broke");
    }

    #[test]
    fn test_shutdown_finishes_backlog_and_rejects_new_work() {
        let q = queue(2);
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..10 {
            let counter = Arc::clone(&counter);
            q.submit(move || {
                thread::sleep(Duration::from_millis(5));
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>(())
            })
            .unwrap();
        }
        q.shutdown();
        assert_eq!(counter.load(Ordering::SeqCst), 10);
        assert!(q.is_closed());
        assert!(matches!(q.submit(|| Ok::<_, String>(())), Err(Error::QueueClosed)));
        q.shutdown();
    }
}
