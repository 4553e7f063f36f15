//! HTTPS redirect.

use http::Method;

use crate::handler::{Handler, around};
use crate::request::Request;
use crate::response::Response;

use super::Middleware;

/// Redirects insecure `GET` requests to the same URL over HTTPS.
///
/// Other methods pass through: redirecting a `POST` would drop its body.
/// Behind a TLS-terminating proxy, make sure it sets `X-Forwarded-Proto`.
#[derive(Clone, Copy, Debug, Default)]
pub struct HttpsRedirect {
    skip: bool,
}

impl HttpsRedirect {
    pub fn new() -> Self {
        Self { skip: false }
    }

    /// Disabled redirect, for local development (`secure.skip_https`).
    pub fn skip(skip: bool) -> Self {
        Self { skip }
    }
}

impl Middleware for HttpsRedirect {
    fn on_request(&self, req: &mut Request) -> Option<Response> {
        if self.skip {
            return None;
        }
        secure_redirect(req)
    }
}

/// Applies [`HttpsRedirect`] to one handler.
pub fn force_secure(skip: bool, handler: impl Handler) -> impl Handler {
    around(handler, move |req, inner| async move {
        if !skip {
            if let Some(redirect) = secure_redirect(&req) {
                return redirect;
            }
        }
        inner.call(req).await
    })
}

fn secure_redirect(req: &Request) -> Option<Response> {
    if *req.method() != Method::GET || req.is_secure() {
        return None;
    }
    // Drop the port: the HTTPS listener is on its own.
    let domain = req.host()?.split(':').next().unwrap_or_default();
    if domain.is_empty() {
        return None;
    }
    let location = format!("https://{domain}{}", req.full_path());
    tracing::debug!(%location, "redirecting to https");
    Some(Response::redirect(&location))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Router;
    use bytes::Bytes;
    use http::StatusCode;

    fn request(method: Method, uri: &str, headers: &[(&str, &str)]) -> Request {
        let mut builder = http::Request::builder().method(method).uri(uri);
        for (k, v) in headers {
            builder = builder.header(*k, *v);
        }
        Request::from(builder.body(Bytes::new()).unwrap())
    }

    async fn page(_req: Request) -> Response {
        Response::text("page")
    }

    #[test]
    fn test_insecure_get_redirects_without_port() {
        let mut req = request(Method::GET, "/a/b?c=d", &[("host", "example.com:8080")]);
        let res = HttpsRedirect::new().on_request(&mut req).unwrap();
        assert_eq!(res.status_code(), StatusCode::FOUND);
        assert_eq!(res.header("location"), Some("https://example.com/a/b?c=d"));
    }

    #[test]
    fn test_secure_post_and_skipped_pass_through() {
        let mut secure = request(
            Method::GET,
            "/",
            &[("host", "example.com"), ("x-forwarded-proto", "https")],
        );
        assert!(HttpsRedirect::new().on_request(&mut secure).is_none());

        let mut post = request(Method::POST, "/", &[("host", "example.com")]);
        assert!(HttpsRedirect::new().on_request(&mut post).is_none());

        let mut get = request(Method::GET, "/", &[("host", "example.com")]);
        assert!(HttpsRedirect::skip(true).on_request(&mut get).is_none());
    }

    #[tokio::test]
    async fn test_force_secure_decorator() {
        let router = Router::new()
            .get("/secure", force_secure(false, page))
            .get("/open", force_secure(true, page));

        let res = router.handle(request(Method::GET, "/secure", &[("host", "example.com")])).await;
        assert_eq!(res.header("location"), Some("https://example.com/secure"));

        let res = router.handle(request(Method::GET, "/open", &[("host", "example.com")])).await;
        assert_eq!(res.body(), b"page");
    }
}
