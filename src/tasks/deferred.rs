//! Non-blocking proxies over plain functions.
//!
//! ```rust
//! use tsu_common::tasks::{TaskQueue, TaskQueueConfig};
//!
//! fn notify((user, event): (String, &'static str)) -> Result<(), std::io::Error> {
//!     // talk to the mail server...
//!     # let _ = (user, event);
//!     Ok(())
//! }
//!
//! let queue = TaskQueue::start(TaskQueueConfig::default()).unwrap();
//! let notify_later = queue.defer(notify);
//! notify_later.call(("alice".to_owned(), "signup")).unwrap(); // returns at once
//! queue.drain();
//! ```

use std::fmt::Display;
use std::sync::Arc;

use crate::error::Result;

use super::queue::TaskQueue;

/// A function whose calls are enqueued instead of executed.
///
/// Arguments are passed as a single value; use a tuple for several.
pub struct Deferred<F> {
    queue: TaskQueue,
    f: Arc<F>,
}

impl<F> Deferred<F> {
    pub(crate) fn new(queue: TaskQueue, f: F) -> Self {
        Self { queue, f: Arc::new(f) }
    }

    pub fn call<A, T, E>(&self, args: A) -> Result<()>
    where
        F: Fn(A) -> std::result::Result<T, E> + Send + Sync + 'static,
        A: Send + 'static,
        T: 'static,
        E: Display + 'static,
    {
        let f = Arc::clone(&self.f);
        self.queue.submit(move || f(args))
    }
}

impl<F> Clone for Deferred<F> {
    fn clone(&self) -> Self {
        Self { queue: self.queue.clone(), f: Arc::clone(&self.f) }
    }
}

/// A [`Deferred`] whose successful results are handed to a callback.
pub struct DeferredThen<F, C> {
    queue: TaskQueue,
    f: Arc<F>,
    callback: Arc<C>,
}

impl<F, C> DeferredThen<F, C> {
    pub(crate) fn new(queue: TaskQueue, f: F, callback: C) -> Self {
        Self { queue, f: Arc::new(f), callback: Arc::new(callback) }
    }

    pub fn call<A, T, E, E2>(&self, args: A) -> Result<()>
    where
        F: Fn(A) -> std::result::Result<T, E> + Send + Sync + 'static,
        C: Fn(T) -> std::result::Result<(), E2> + Send + Sync + 'static,
        A: Send + 'static,
        T: 'static,
        E: Display + 'static,
        E2: Display + 'static,
    {
        let f = Arc::clone(&self.f);
        let callback = Arc::clone(&self.callback);
        self.queue.submit_then(move || f(args), move |value| callback(value))
    }
}

impl<F, C> Clone for DeferredThen<F, C> {
    fn clone(&self) -> Self {
        Self {
            queue: self.queue.clone(),
            f: Arc::clone(&self.f),
            callback: Arc::clone(&self.callback),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::TaskQueueConfig;
    use parking_lot::Mutex;

    #[test]
    fn test_deferred_call_runs_on_worker() {
        let queue = TaskQueue::start(TaskQueueConfig { worker_threads: 2 }).unwrap();
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        let record = queue.defer(move |(a, b): (u32, u32)| {
            sink.lock().push(a + b);
            Ok::<_, String>(())
        });

        record.call((1, 2)).unwrap();
        record.clone().call((3, 4)).unwrap();
        queue.drain();

        let mut got = log.lock().clone();
        got.sort();
        assert_eq!(got, vec![3, 7]);
    }

    #[test]
    fn test_deferred_then_passes_result_to_callback() {
        let queue = TaskQueue::start(TaskQueueConfig { worker_threads: 1 }).unwrap();
        let results = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&results);
        let square = queue.defer_then(
            |n: i64| Ok::<_, String>(n * n),
            move |sq: i64| {
                sink.lock().push(sq);
                Ok::<_, String>(())
            },
        );

        for n in 1..=3 {
            square.call(n).unwrap();
        }
        queue.drain();
        assert_eq!(*results.lock(), vec![1, 4, 9]);
    }
}
