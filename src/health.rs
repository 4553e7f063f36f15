//! Health-check handlers.
//!
//! | Probe | Path | Question |
//! |---|---|---|
//! | **Liveness** | `/healthz` | Is the process alive? |
//! | **Readiness** | `/readyz` | Can the process take more work? |
//!
//! ```rust,no_run
//! use tsu_common::{Router, health, tasks::{TaskQueue, TaskQueueConfig}};
//!
//! let queue = TaskQueue::start(TaskQueueConfig::default()).unwrap();
//! let app = Router::new()
//!     .get("/healthz", health::liveness)
//!     .get("/readyz", health::readiness(queue, 10_000));
//! ```

use http::StatusCode;

use crate::handler::{BoxFuture, Handler};
use crate::tasks::TaskQueue;
use crate::{Request, Response};

/// Always `200 OK` with body `"ok"`.
pub async fn liveness(_req: Request) -> Response {
    Response::text("ok")
}

/// `200 OK` while the deferred task backlog is at most `max_pending`,
/// `503` once the workers fall behind. A closed queue is never ready.
pub fn readiness(queue: TaskQueue, max_pending: usize) -> impl Handler {
    move |_req: Request| -> BoxFuture {
        let ready = !queue.is_closed() && queue.pending() <= max_pending;
        Box::pin(async move {
            if ready {
                Response::text("ready")
            } else {
                Response::status(StatusCode::SERVICE_UNAVAILABLE)
            }
        })
    }
}
