//! Deferred task queue.
//!
//! Moves side effects that the caller does not need to wait for (sending a
//! notification, writing an audit line, warming a cache) off the request
//! path and onto a fixed pool of background threads.
//!
//! ```text
//!  request threads                       worker threads
//!  ───────────────                       ──────────────
//!  submit(f) ──┐                     ┌──► recv ─► f() ─► callback(v)
//!  submit(g) ──┼──► unbounded FIFO ──┼──► recv ─► g()
//!  defer(h)  ──┘                     └──► recv ─► ...
//!
//!  drain() blocks until queued + in-flight == 0
//! ```
//!
//! Failure policy is best effort: a target or callback that returns `Err` or
//! panics is handed to the [`TaskObserver`] (silent unless configured) and
//! the worker moves on. There is no retry, no cancellation, no timeout and
//! no backpressure.

mod deferred;
mod observer;
mod queue;

pub use deferred::{Deferred, DeferredThen};
pub use observer::{FailureStage, LogObserver, SilentObserver, TaskFailure, TaskObserver};
pub use queue::{TaskQueue, TaskQueueConfig};
