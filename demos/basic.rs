//! Minimal tsu-common site: a cached page, a JSONP endpoint, deferred work
//! and health checks.
//!
//! Run with:
//!   RUST_LOG=debug TSU_SECURE__SKIP_HTTPS=true cargo run --example basic
//!
//! Try:
//!   curl -H 'host: example.ru' http://localhost:3000/
//!   curl 'http://localhost:3000/stats?callback=show'
//!   curl -X POST http://localhost:3000/subscribe -d 'alice@example.com'
//!   curl http://localhost:3000/readyz

use std::sync::Arc;
use std::time::Duration;

use http::StatusCode;
use serde_json::json;
use tsu_common::cache::{MemoryCache, Memo, ViewCache, cache_view};
use tsu_common::config::Settings;
use tsu_common::jsonp::{JsonResult, jsonp};
use tsu_common::middleware::{CompressHtml, HttpsRedirect, LocaleByTld};
use tsu_common::tasks::{LogObserver, TaskQueue};
use tsu_common::{BoxFuture, Request, Response, Router, Server, health};

#[tokio::main]
async fn main() -> tsu_common::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let settings = Settings::load(None)?;
    let queue = TaskQueue::start_with_observer((&settings.tasks).into(), LogObserver)?;
    let backend = Arc::new(MemoryCache::new());

    let home_cache = ViewCache::new(backend.clone(), "home", &settings);
    let visits = Memo::new(backend, "visits", &settings.cache).with_ttl(Duration::from_secs(30));

    let stats = move |_req: Request| {
        let visits = visits.clone();
        async move {
            // Stand-in for an expensive aggregate query.
            let total: u64 = visits.memoize(&[&"all"], || (1..=1000).sum());
            let result: JsonResult = Ok(json!({ "visits": total }));
            result
        }
    };

    let mut app = Router::new()
        .get("/", cache_view(home_cache, home))
        .get("/stats", jsonp(stats))
        .post("/subscribe", subscribe(queue.clone()))
        .get("/healthz", health::liveness)
        .get("/readyz", health::readiness(queue.clone(), 1_000))
        .layer(HttpsRedirect::skip(settings.secure.skip_https));
    if let Some(locale) = LocaleByTld::new(&settings.locale) {
        app = app.layer(locale);
    }
    let app = app.layer(CompressHtml::new(settings.debug));

    Server::bind("0.0.0.0:3000").with_task_queue(queue).serve(app).await
}

// GET /  (cached per language; see the X-Cache headers)
async fn home(req: Request) -> Response {
    let language = req.language().unwrap_or("en");
    Response::html(format!(
        "<html>\n  <body>\n    <h1>hello ({language})</h1>\n  </body>\n</html>"
    ))
}

// POST /subscribe  (responds at once, mails from a worker thread)
fn subscribe(queue: TaskQueue) -> impl tsu_common::Handler {
    let welcome = queue.defer(|email: String| {
        std::thread::sleep(Duration::from_millis(200));
        tracing::info!(%email, "welcome mail sent");
        Ok::<_, std::io::Error>(())
    });
    move |req: Request| -> BoxFuture {
        let email = String::from_utf8_lossy(req.body()).trim().to_owned();
        let queued = !email.is_empty() && welcome.call(email).is_ok();
        Box::pin(async move {
            if queued {
                Response::status(StatusCode::ACCEPTED)
            } else {
                Response::status(StatusCode::BAD_REQUEST)
            }
        })
    }
}
