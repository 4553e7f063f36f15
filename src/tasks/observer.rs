//! Failure observers.
//!
//! A task that fails (returns `Err` or panics) never reaches the submitter.
//! The queue hands the failure to a [`TaskObserver`] instead and moves on to
//! the next task. The default observer, [`SilentObserver`], drops it.
//!
//! ```text
//! worker ── run target ──► Err / panic ──► TaskObserver::on_failure(&TaskFailure)
//!        └─ run callback ─► Err / panic ──┘
//! ```

use std::fmt;

/// Which half of a task failed.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FailureStage {
    Target,
    Callback,
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Target => "target",
            Self::Callback => "callback",
        })
    }
}

/// A failed task, as seen by an observer.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TaskFailure {
    pub stage: FailureStage,
    /// The error's `Display` output, or the panic payload.
    pub message: String,
    pub panicked: bool,
}

/// Receives every task failure, on the worker thread that hit it.
///
/// Implementations should return quickly: the worker does not pick up its
/// next task until `on_failure` returns.
pub trait TaskObserver: Send + Sync + 'static {
    fn on_failure(&self, failure: &TaskFailure);
}

/// Discards failures. The default.
#[derive(Clone, Copy, Debug, Default)]
pub struct SilentObserver;

impl TaskObserver for SilentObserver {
    fn on_failure(&self, _failure: &TaskFailure) {}
}

/// Logs failures at `warn` level.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogObserver;

impl TaskObserver for LogObserver {
    fn on_failure(&self, failure: &TaskFailure) {
        tracing::warn!(
            stage = %failure.stage,
            panicked = failure.panicked,
            "deferred task failed: {}",
            failure.message
        );
    }
}
