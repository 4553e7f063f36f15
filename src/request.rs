//! Incoming HTTP request type.
//!
//! Besides the wire data, a request carries the per-request state that
//! middleware and view decorators read and write: the active language, the
//! session and the authenticated user.

use std::collections::HashMap;

use bytes::Bytes;
use http::{HeaderMap, Method, Uri};

/// An incoming HTTP request with its body fully buffered.
pub struct Request {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
    pub(crate) params: HashMap<String, String>,
    language: Option<String>,
    session: Session,
    user: Option<User>,
}

impl Request {
    pub(crate) fn from_parts(parts: http::request::Parts, body: Bytes) -> Self {
        Self {
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            body,
            params: HashMap::new(),
            language: None,
            session: Session::default(),
            user: None,
        }
    }

    pub fn method(&self) -> &Method { &self.method }
    pub fn uri(&self) -> &Uri { &self.uri }
    pub fn path(&self) -> &str { self.uri.path() }
    pub fn query(&self) -> Option<&str> { self.uri.query() }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn body(&self) -> &[u8] { &self.body }

    /// Header value as text. Non-ASCII values read as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/users/{id}`, `req.param("id")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// `Host` header, falling back to the URI authority. Includes the port.
    pub fn host(&self) -> Option<&str> {
        self.header("host").or_else(|| self.uri.authority().map(|a| a.as_str()))
    }

    /// Path plus query string, e.g. `/search?q=rust`.
    pub fn full_path(&self) -> String {
        match self.uri.query() {
            Some(q) => format!("{}?{q}", self.uri.path()),
            None => self.uri.path().to_owned(),
        }
    }

    /// True for `https` URIs and for requests the proxy marked with
    /// `X-Forwarded-Proto: https`.
    pub fn is_secure(&self) -> bool {
        self.uri.scheme_str() == Some("https")
            || self
                .header("x-forwarded-proto")
                .is_some_and(|p| p.eq_ignore_ascii_case("https"))
    }

    pub fn is_ajax(&self) -> bool {
        self.header("x-requested-with") == Some("XMLHttpRequest")
    }

    /// First value of a query parameter, form-decoded (`%XX` escapes and
    /// `+` for space).
    pub fn query_param(&self, name: &str) -> Option<String> {
        self.query()?
            .split('&')
            .filter(|pair| !pair.is_empty())
            .map(|pair| pair.split_once('=').unwrap_or((pair, "")))
            .find(|(k, _)| form_decode(k) == name)
            .map(|(_, v)| form_decode(v))
    }

    pub fn has_query(&self) -> bool {
        self.query().is_some_and(|q| !q.is_empty())
    }

    /// A non-empty urlencoded or multipart form body.
    pub fn has_form_data(&self) -> bool {
        !self.body.is_empty()
            && self.header("content-type").is_some_and(|ct| {
                ct.starts_with("application/x-www-form-urlencoded")
                    || ct.starts_with("multipart/form-data")
            })
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.headers
            .get_all(http::header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v)
    }

    /// Language chosen for this request, if the host decided one.
    pub fn language(&self) -> Option<&str> { self.language.as_deref() }
    pub fn set_language(&mut self, language: impl Into<String>) {
        self.language = Some(language.into());
    }

    pub fn session(&self) -> &Session { &self.session }
    pub fn session_mut(&mut self) -> &mut Session { &mut self.session }

    /// The authenticated user, set by the application's auth layer.
    pub fn user(&self) -> Option<&User> { self.user.as_ref() }
    pub fn set_user(&mut self, user: User) { self.user = Some(user); }
    pub fn is_authenticated(&self) -> bool { self.user.is_some() }
}

impl From<http::Request<Bytes>> for Request {
    fn from(req: http::Request<Bytes>) -> Self {
        let (parts, body) = req.into_parts();
        Self::from_parts(parts, body)
    }
}

/// An authenticated user.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct User {
    pub username: String,
}

impl User {
    pub fn new(username: impl Into<String>) -> Self {
        Self { username: username.into() }
    }
}

/// Per-request session data.
///
/// Loading and persisting sessions belongs to the application; this type
/// only records values and whether anything changed.
#[derive(Clone, Debug, Default)]
pub struct Session {
    values: HashMap<String, String>,
    modified: bool,
}

impl Session {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
        self.modified = true;
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }
}

fn form_decode(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    String::from_utf8_lossy(&urlencoding::decode_binary(spaced.as_bytes())).into_owned()
}
