//! JSON / JSONP views.
//!
//! ```rust
//! use serde_json::json;
//! use tsu_common::{Request, Router};
//! use tsu_common::jsonp::{JsonResult, jsonp};
//!
//! async fn stats(_req: Request) -> JsonResult {
//!     Ok(json!({"visits": 42}))
//! }
//!
//! // GET /stats?callback=show  →  show({"visits": 42})
//! let app = Router::new().get("/stats", jsonp(stats));
//! ```

use std::future::Future;
use std::sync::Arc;

use http::StatusCode;
use serde::Serialize;
use serde_json::Value;
use serde_json::ser::PrettyFormatter;

use crate::handler::{BoxFuture, Handler};
use crate::request::Request;
use crate::response::{ContentType, Response};

/// A JSON payload, or a finished response passed through untouched.
pub type JsonResult = Result<Value, Response>;

/// Serialises the view's value as `application/javascript`, wrapped in
/// `callback(...)` when the request has a `callback` query parameter.
///
/// Output is indented for browsers and compact for `XMLHttpRequest`s.
/// Values under a top-level `"errors"` object are flattened to strings.
pub fn jsonp<F, Fut>(view: F) -> impl Handler
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = JsonResult> + Send + 'static,
{
    let view = Arc::new(view);
    move |req: Request| -> BoxFuture {
        let view = Arc::clone(&view);
        Box::pin(async move {
            let callback = req.query_param("callback");
            let pretty = !req.is_ajax();
            match view(req).await {
                Ok(value) => render(value, callback.as_deref(), pretty),
                Err(res) => res,
            }
        })
    }
}

fn render(mut value: Value, callback: Option<&str>, pretty: bool) -> Response {
    if let Some(callback) = callback {
        if !is_valid_callback(callback) {
            return Response::builder().status(StatusCode::BAD_REQUEST).text("invalid callback");
        }
    }

    stringify_errors(&mut value);
    let body = match serialize(&value, pretty) {
        Ok(body) => body,
        Err(e) => {
            tracing::error!("jsonp serialisation failed: {e}");
            return Response::status(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };

    let body = match callback {
        Some(callback) => {
            let mut wrapped = Vec::with_capacity(body.len() + callback.len() + 2);
            wrapped.extend_from_slice(callback.as_bytes());
            wrapped.push(b'(');
            wrapped.extend_from_slice(&body);
            wrapped.push(b')');
            wrapped
        }
        None => body,
    };
    Response::builder().bytes(ContentType::JavaScript, body)
}

fn serialize(value: &Value, pretty: bool) -> serde_json::Result<Vec<u8>> {
    if !pretty {
        return serde_json::to_vec(value);
    }
    let mut buf = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(b"    "));
    value.serialize(&mut ser)?;
    Ok(buf)
}

/// Form-style `{"errors": {"field": [...]}}` becomes `{"errors": {"field": "..."}}`.
fn stringify_errors(value: &mut Value) {
    let Some(Value::Object(errors)) = value.get_mut("errors") else {
        return;
    };
    for error in errors.values_mut() {
        let text = match &*error {
            Value::String(_) => continue,
            Value::Array(items) => items
                .iter()
                .map(|item| match item {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect::<Vec<_>>()
                .join(" "),
            other => other.to_string(),
        };
        *error = Value::String(text);
    }
}

/// JavaScript identifier path such as `jQuery123_456` or `app.render`.
fn is_valid_callback(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 128
        && name.bytes().all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'$' | b'.'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Router;
    use bytes::Bytes;
    use serde_json::json;

    fn get(uri: &str, ajax: bool) -> Request {
        let mut builder = http::Request::builder().uri(uri);
        if ajax {
            builder = builder.header("x-requested-with", "XMLHttpRequest");
        }
        Request::from(builder.body(Bytes::new()).unwrap())
    }

    async fn data(_req: Request) -> JsonResult {
        Ok(json!({"a": 1}))
    }

    async fn form_errors(_req: Request) -> JsonResult {
        Ok(json!({"errors": {"email": ["Required.", "Invalid."], "age": 3, "name": "Bad."}}))
    }

    async fn denied(_req: Request) -> JsonResult {
        Err(Response::status(StatusCode::FORBIDDEN))
    }

    fn app() -> Router {
        Router::new()
            .get("/data", jsonp(data))
            .get("/form", jsonp(form_errors))
            .get("/denied", jsonp(denied))
    }

    #[tokio::test]
    async fn test_callback_wraps_compact_json_for_ajax() {
        let res = app().handle(get("/data?callback=cb", true)).await;
        assert_eq!(res.body(), b"cb({\"a\":1})");
        assert_eq!(res.header("content-type"), Some("application/javascript"));
    }

    #[tokio::test]
    async fn test_browser_gets_indented_json() {
        let res = app().handle(get("/data", false)).await;
        assert_eq!(res.body(), b"{\n    \"a\": 1\n}");
    }

    #[tokio::test]
    async fn test_errors_are_flattened() {
        let res = app().handle(get("/form", true)).await;
        let value: Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(
            value,
            json!({"errors": {"email": "Required. Invalid.", "age": "3", "name": "Bad."}})
        );
    }

    #[tokio::test]
    async fn test_response_passes_through_and_bad_callback_rejected() {
        let res = app().handle(get("/denied?callback=cb", true)).await;
        assert_eq!(res.status_code(), StatusCode::FORBIDDEN);

        let res = app().handle(get("/data?callback=alert(1)", true)).await;
        assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_escaped_callback_is_decoded() {
        let res = app().handle(get("/data?callback=app%2Erender", true)).await;
        assert_eq!(res.status_code(), StatusCode::OK);
        assert_eq!(res.body(), b"app.render({\"a\":1})");
    }
}
