//! Whole-response caching for handlers.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::config::Settings;
use crate::handler::{Handler, around};
use crate::request::Request;
use crate::response::Response;

use super::backend::CacheBackend;
use super::memo::Memo;

/// Where and how [`cache_view`] stores responses.
#[derive(Clone)]
pub struct ViewCache {
    memo: Memo,
    anonymous_only: bool,
    debug: bool,
}

impl ViewCache {
    /// `name` identifies the view in cache keys; use one per handler.
    pub fn new(backend: Arc<dyn CacheBackend>, name: &str, settings: &Settings) -> Self {
        Self {
            memo: Memo::new(backend, name, &settings.cache),
            anonymous_only: settings.cache.anonymous_only,
            debug: settings.debug,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.memo = self.memo.with_ttl(ttl);
        self
    }

    /// `[username, language, path]`, or `None` when the request must not be
    /// served from cache.
    fn key_chunks(&self, req: &Request) -> Option<Vec<String>> {
        if self.anonymous_only && req.is_authenticated() {
            return None;
        }
        // Submitted forms and query-dependent pages are never cached.
        if req.has_query() || req.has_form_data() {
            return None;
        }
        let username = req.user().map(|u| u.username.clone()).unwrap_or_default();
        let language = req.language().unwrap_or_default().to_owned();
        Some(vec![username, language, req.path().to_owned()])
    }
}

/// Caches whole responses of `handler`.
///
/// A cached response is replayed as stored, including the `X-Cache: Miss`
/// headers from the request that filled it. Server errors are not stored.
///
/// ```rust
/// use std::sync::Arc;
/// use tsu_common::{Request, Response, Router};
/// use tsu_common::cache::{MemoryCache, ViewCache, cache_view};
/// use tsu_common::config::Settings;
///
/// async fn article(_req: Request) -> Response { Response::html("<h1>news</h1>") }
///
/// let settings = Settings::default();
/// let cache = ViewCache::new(Arc::new(MemoryCache::new()), "article", &settings);
/// let app = Router::new().get("/news", cache_view(cache, article));
/// ```
pub fn cache_view(cache: ViewCache, handler: impl Handler) -> impl Handler {
    let cache = Arc::new(cache);
    around(handler, move |req, inner| {
        let cache = Arc::clone(&cache);
        async move {
            let Some(chunks) = cache.key_chunks(&req) else {
                return inner.call(req).await;
            };
            let key = cache.memo.key(&chunks);
            if let Some(hit) = cache.memo.lookup::<Response>(&key) {
                return hit;
            }

            let mut res = inner.call(req).await;
            if !cache.debug {
                add_expiry_headers(&mut res, cache.memo.ttl(), Utc::now());
            }
            if !res.status_code().is_server_error() {
                cache.memo.store(&key, &res);
            }
            res
        }
    })
}

fn add_expiry_headers(res: &mut Response, ttl: Duration, now: DateTime<Utc>) {
    let expiry = chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| now.checked_add_signed(ttl))
        .unwrap_or(now);
    res.set_header("expires", http_date(expiry));
    res.set_header("x-cache-expires", http_date(expiry));
    res.set_header("x-cache-time", http_date(now));
    res.set_header("x-cache", "Miss");
    patch_max_age(res, ttl.as_secs());
}

/// RFC 9110 IMF-fixdate, e.g. `Sun, 06 Nov 1994 08:49:37 GMT`.
fn http_date(at: DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Sets `max-age` in `Cache-Control`, keeping the other directives.
fn patch_max_age(res: &mut Response, max_age: u64) {
    let mut directives: Vec<String> = res
        .header("cache-control")
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|d| !d.is_empty() && !d.to_ascii_lowercase().starts_with("max-age"))
        .map(str::to_owned)
        .collect();
    directives.push(format!("max-age={max_age}"));
    res.set_header("cache-control", directives.join(", "));
}
