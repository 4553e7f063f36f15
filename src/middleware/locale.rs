//! Language by top-level domain.

use std::collections::HashMap;

use tracing::debug;

use crate::config::LocaleSettings;
use crate::request::Request;

use super::Middleware;

/// Serves one code base under several country domains by inferring the
/// language from the host's TLD (`example.ru` → `ru`).
///
/// Only kicks in for visitors without an explicit preference: a language
/// stored in the session or in the language cookie wins, and so does a
/// browser whose `Accept-Language` already names the current language.
/// The inferred language is written to the request and persisted in the
/// session.
#[derive(Clone, Debug)]
pub struct LocaleByTld {
    by_tld: HashMap<String, String>,
    default_language: String,
    cookie_name: String,
    session_key: String,
}

impl LocaleByTld {
    /// `None` when localisation is switched off (`locale.enabled = false`).
    pub fn new(settings: &LocaleSettings) -> Option<Self> {
        if !settings.enabled {
            return None;
        }
        Some(Self {
            by_tld: settings.by_tld.clone(),
            default_language: settings.default_language.clone(),
            cookie_name: settings.cookie_name.clone(),
            session_key: settings.session_key.clone(),
        })
    }

    fn has_preference(&self, req: &Request) -> bool {
        req.session().contains(&self.session_key) || req.cookie(&self.cookie_name).is_some()
    }

    fn language_for_host(&self, host: &str) -> &str {
        let domain = host.split(':').next().unwrap_or_default();
        let tld = domain.rsplit('.').next().unwrap_or_default();
        self.by_tld
            .get(&tld.to_ascii_lowercase())
            .map(String::as_str)
            .unwrap_or(&self.default_language)
    }
}

impl Middleware for LocaleByTld {
    fn on_request(&self, req: &mut Request) -> Option<crate::Response> {
        if self.has_preference(req) {
            return None;
        }

        let current = req.language().unwrap_or(&self.default_language);
        let accepted = req.header("accept-language").unwrap_or_default();
        if accepted.contains(current) {
            return None;
        }

        let language = self.language_for_host(req.host().unwrap_or_default()).to_owned();
        if language.is_empty() {
            return None;
        }

        debug!(%language, host = req.host().unwrap_or_default(), "language inferred from domain");
        req.session_mut().insert(self.session_key.clone(), language.clone());
        req.set_language(language);
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn middleware() -> LocaleByTld {
        LocaleByTld::new(&LocaleSettings::default()).unwrap()
    }

    fn request(headers: &[(&str, &str)]) -> Request {
        let mut builder = http::Request::builder().uri("/");
        for (k, v) in headers {
            builder = builder.header(*k, *v);
        }
        Request::from(builder.body(Bytes::new()).unwrap())
    }

    #[test]
    fn test_disabled_when_localisation_off() {
        let settings = LocaleSettings { enabled: false, ..Default::default() };
        assert!(LocaleByTld::new(&settings).is_none());
    }

    #[test]
    fn test_tld_sets_language_and_session() {
        let mut req = request(&[("host", "shop.example.ua:8000"), ("accept-language", "fr-FR")]);
        assert!(middleware().on_request(&mut req).is_none());
        assert_eq!(req.language(), Some("ru"));
        assert_eq!(req.session().get("tsu_language"), Some("ru"));
    }

    #[test]
    fn test_unknown_tld_falls_back_to_default() {
        let mut req = request(&[("host", "example.de")]);
        middleware().on_request(&mut req);
        assert_eq!(req.language(), Some("en"));
    }

    #[test]
    fn test_accept_language_match_keeps_current() {
        let mut req = request(&[("host", "example.cn"), ("accept-language", "de-DE,de;q=0.9")]);
        req.set_language("de");
        middleware().on_request(&mut req);
        assert_eq!(req.language(), Some("de"));
        assert!(!req.session().is_modified());
    }

    #[test]
    fn test_explicit_preference_wins() {
        let mut by_cookie = request(&[("host", "example.th"), ("cookie", "tsu_language=en")]);
        middleware().on_request(&mut by_cookie);
        assert_eq!(by_cookie.language(), None);

        let mut by_session = request(&[("host", "example.th")]);
        by_session.session_mut().insert("tsu_language", "fr");
        middleware().on_request(&mut by_session);
        assert_eq!(by_session.language(), None);
    }
}
