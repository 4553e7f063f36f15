//! HTML whitespace compression.

use std::sync::LazyLock;

use http::StatusCode;
use regex::bytes::Regex;

use crate::response::Response;

use super::Middleware;

static TAG_GAP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r">\s+<").expect("static regex"));

/// Removes whitespace between HTML tags: `<p>\n  <b>` becomes `<p><b>`.
pub fn strip_spaces_between_tags(html: &[u8]) -> Vec<u8> {
    TAG_GAP.replace_all(html, &b"><"[..]).into_owned()
}

/// Shrinks successful `text/html` responses with [`strip_spaces_between_tags`].
///
/// Inactive in debug mode so served markup stays readable.
#[derive(Clone, Copy, Debug, Default)]
pub struct CompressHtml {
    debug: bool,
}

impl CompressHtml {
    pub fn new(debug: bool) -> Self {
        Self { debug }
    }
}

impl Middleware for CompressHtml {
    fn on_response(&self, mut res: Response) -> Response {
        let is_html = res.header("content-type").is_some_and(|ct| ct.contains("text/html"));
        if self.debug || res.status_code() != StatusCode::OK || !is_html {
            return res;
        }
        let body = strip_spaces_between_tags(res.body());
        res.set_header("content-length", body.len().to_string());
        res.set_body(body);
        res
    }
}
