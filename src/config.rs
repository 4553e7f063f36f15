//! Process-wide settings.
//!
//! Settings are read once at startup from an optional file (TOML, YAML or
//! JSON, chosen by extension) with `TSU_`-prefixed environment variables
//! layered on top. Nested keys use `__`:
//!
//! ```text
//! TSU_DEBUG=true
//! TSU_TASKS__WORKER_THREADS=4
//! TSU_CDN__DISTRIBUTION_ID=E2QWRUHAPOMQZL
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Disables response decoration (cache headers, HTML compression).
    pub debug: bool,
    pub tasks: TaskSettings,
    pub cache: CacheSettings,
    pub secure: SecureSettings,
    pub locale: LocaleSettings,
    pub assets: AssetSettings,
    pub cdn: CdnSettings,
}

impl Settings {
    /// Loads `.env`, then `path` (if any), then the `TSU_*` environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }
        let settings: Settings = builder
            .add_source(
                config::Environment::with_prefix("TSU")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.tasks.worker_threads == 0 {
            return Err(Error::Config("tasks.worker_threads must be at least 1".into()));
        }
        if self.cdn.batch_size == 0 || self.cdn.max_batches == 0 {
            return Err(Error::Config(
                "cdn.batch_size and cdn.max_batches must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TaskSettings {
    pub worker_threads: usize,
}

impl Default for TaskSettings {
    fn default() -> Self {
        Self { worker_threads: 10 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub key_prefix: String,
    /// Default TTL for cached views and memoized calls.
    pub seconds: u64,
    /// Never cache responses for authenticated users.
    pub anonymous_only: bool,
}

impl CacheSettings {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.seconds)
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self { key_prefix: String::new(), seconds: 600, anonymous_only: false }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SecureSettings {
    pub skip_https: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LocaleSettings {
    /// Equivalent of i18n being switched on for the site.
    pub enabled: bool,
    pub default_language: String,
    pub cookie_name: String,
    pub session_key: String,
    pub by_tld: HashMap<String, String>,
}

impl Default for LocaleSettings {
    fn default() -> Self {
        let by_tld = [
            ("ae", "ar"),
            ("cn", "zh-cn"),
            ("hk", "zh-cn"),
            ("tw", "zh-cn"),
            ("th", "th"),
            ("ru", "ru"),
            ("ua", "ru"),
            ("ca", "en"),
            ("uk", "en"),
            ("us", "en"),
        ]
        .into_iter()
        .map(|(tld, lang)| (tld.to_owned(), lang.to_owned()))
        .collect();

        Self {
            enabled: true,
            default_language: "en".into(),
            cookie_name: "tsu_language".into(),
            session_key: "tsu_language".into(),
            by_tld,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CssCompressor {
    Csstidy,
    #[default]
    Yui,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JsCompressor {
    #[default]
    Closure,
    Yui,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AssetSettings {
    /// Asset names (relative to the static root) that are copied verbatim.
    pub no_compress: Vec<String>,
    pub css_compressor: CssCompressor,
    pub js_compressor: JsCompressor,
    pub csstidy_options: String,
    pub yui_jar: PathBuf,
    pub closure_jar: PathBuf,
    pub closure_options: String,
    pub punypng_keys: Vec<String>,
    pub punypng_endpoint: String,
}

impl Default for AssetSettings {
    fn default() -> Self {
        Self {
            no_compress: Vec::new(),
            css_compressor: CssCompressor::default(),
            js_compressor: JsCompressor::default(),
            csstidy_options: "--template=highest --remove_last_;=true --silent=true".into(),
            yui_jar: PathBuf::from("yuicompressor.jar"),
            closure_jar: PathBuf::from("compiler.jar"),
            closure_options: "--compilation_level SIMPLE_OPTIMIZATIONS --warning_level QUIET"
                .into(),
            punypng_keys: Vec::new(),
            punypng_endpoint: "http://www.punypng.com/api/optimize".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CdnSettings {
    pub distribution_id: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub static_url: String,
    /// Paths per invalidation request.
    pub batch_size: usize,
    /// Requests per run; `batch_size * max_batches` is the hard cap.
    pub max_batches: usize,
}

impl CdnSettings {
    pub fn max_paths(&self) -> usize {
        self.batch_size.saturating_mul(self.max_batches)
    }

    /// Returns the distribution id and credentials, or a `Config` error
    /// naming every missing key.
    pub fn require(&self) -> Result<CdnCredentials<'_>> {
        let missing: Vec<&str> = [
            ("cdn.access_key_id", self.access_key_id.is_none()),
            ("cdn.secret_access_key", self.secret_access_key.is_none()),
            ("cdn.distribution_id", self.distribution_id.is_none()),
        ]
        .into_iter()
        .filter_map(|(key, absent)| absent.then_some(key))
        .collect();

        match (&self.access_key_id, &self.secret_access_key, &self.distribution_id) {
            (Some(access_key_id), Some(secret_access_key), Some(distribution_id)) => {
                Ok(CdnCredentials { access_key_id, secret_access_key, distribution_id })
            }
            _ => Err(Error::Config(format!("please specify {} in settings", missing.join(", ")))),
        }
    }
}

impl Default for CdnSettings {
    fn default() -> Self {
        Self {
            distribution_id: None,
            access_key_id: None,
            secret_access_key: None,
            static_url: "/static/".into(),
            batch_size: 1000,
            max_batches: 3,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CdnCredentials<'a> {
    pub access_key_id: &'a str,
    pub secret_access_key: &'a str,
    pub distribution_id: &'a str,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let s = Settings::default();
        assert_eq!(s.tasks.worker_threads, 10);
        assert_eq!(s.cache.ttl(), Duration::from_secs(600));
        assert_eq!(s.locale.by_tld.get("ua").map(String::as_str), Some("ru"));
        assert_eq!(s.cdn.max_paths(), 3000);
        assert!(s.validate().is_ok());
    }

    #[test]
    fn test_zero_workers_rejected() {
        let mut s = Settings::default();
        s.tasks.worker_threads = 0;
        assert!(matches!(s.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_load_from_file_keeps_unset_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "debug = true\n[tasks]\nworker_threads = 3\n[cdn]\nstatic_url = \"https://cdn.example.com/s/\""
        )
        .unwrap();

        let s = Settings::load(Some(file.path())).unwrap();
        assert!(s.debug);
        assert_eq!(s.tasks.worker_threads, 3);
        assert_eq!(s.cdn.static_url, "https://cdn.example.com/s/");
        assert_eq!(s.cdn.batch_size, 1000);
        assert_eq!(s.locale.default_language, "en");
    }

    #[test]
    fn test_require_names_missing_keys() {
        let cdn = CdnSettings { access_key_id: Some("AK".into()), ..Default::default() };
        let err = cdn.require().unwrap_err().to_string();
        assert!(err.contains("cdn.secret_access_key"));
        assert!(err.contains("cdn.distribution_id"));
        assert!(!err.contains("cdn.access_key_id"));
    }
}
