//! Static asset compression.
//!
//! ```text
//!  name, source ──► Autocompressor ──► Asset ──► CompressingStorage ──► root/name
//!                     │
//!                     ├─ .css  → csstidy | YUI
//!                     ├─ .js   → Closure | YUI
//!                     └─ image → ImageOptimizer (punypng)
//! ```
//!
//! Compression is best effort: a compressor that is missing, fails or makes
//! a file bigger is logged and the original content is stored instead.

mod command;
mod image;
mod storage;

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::config::{AssetSettings, CssCompressor, JsCompressor};
use crate::error::Result;

pub use command::{CommandCompressor, INPUT};
pub use image::{ApiKeys, ImageOptimizer, PunyPng};
pub use storage::CompressingStorage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Css,
    Js,
    Image,
    Other,
}

impl AssetKind {
    pub fn from_name(name: &str) -> Self {
        let ext = Path::new(name)
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "css" => Self::Css,
            "js" => Self::Js,
            "jpg" | "jpeg" | "png" | "gif" => Self::Image,
            _ => Self::Other,
        }
    }
}

/// Content to store: the untouched source, or a compressed temp copy that
/// is deleted on drop.
#[derive(Debug)]
pub enum Asset {
    Original(PathBuf),
    Compressed(NamedTempFile),
}

impl Asset {
    pub fn path(&self) -> &Path {
        match self {
            Self::Original(path) => path,
            Self::Compressed(file) => file.path(),
        }
    }

    pub fn is_compressed(&self) -> bool {
        matches!(self, Self::Compressed(_))
    }
}

/// Picks a compressor by file kind.
#[derive(Clone)]
pub struct Autocompressor {
    no_compress: HashSet<String>,
    css: Option<CommandCompressor>,
    js: Option<CommandCompressor>,
    images: Option<Arc<dyn ImageOptimizer>>,
}

impl Autocompressor {
    /// A compressor that copies everything verbatim.
    pub fn passthrough() -> Self {
        Self { no_compress: HashSet::new(), css: None, js: None, images: None }
    }

    /// Builds the configured compressors. Image optimisation is enabled
    /// only when at least one punypng key is set.
    pub fn from_settings(settings: &AssetSettings) -> Result<Self> {
        let css = match settings.css_compressor {
            CssCompressor::Csstidy => CommandCompressor::csstidy(&settings.csstidy_options),
            CssCompressor::Yui => CommandCompressor::yui_css(&settings.yui_jar),
        };
        let js = match settings.js_compressor {
            JsCompressor::Closure => {
                CommandCompressor::closure(&settings.closure_jar, &settings.closure_options)
            }
            JsCompressor::Yui => CommandCompressor::yui_js(&settings.yui_jar),
        };
        let images: Option<Arc<dyn ImageOptimizer>> = if settings.punypng_keys.is_empty() {
            None
        } else {
            Some(Arc::new(PunyPng::new(&settings.punypng_endpoint, settings.punypng_keys.clone())?))
        };

        Ok(Self {
            no_compress: settings.no_compress.iter().cloned().collect(),
            css: Some(css),
            js: Some(js),
            images,
        })
    }

    pub fn with_css(mut self, compressor: CommandCompressor) -> Self {
        self.css = Some(compressor);
        self
    }

    pub fn with_js(mut self, compressor: CommandCompressor) -> Self {
        self.js = Some(compressor);
        self
    }

    pub fn with_images(mut self, optimizer: Arc<dyn ImageOptimizer>) -> Self {
        self.images = Some(optimizer);
        self
    }

    pub fn skip(mut self, name: impl Into<String>) -> Self {
        self.no_compress.insert(name.into());
        self
    }

    /// Compresses `source`, stored as `name`. Never fails: any compressor
    /// error falls back to the original file.
    pub async fn compress(&self, name: &str, source: &Path) -> Asset {
        if self.no_compress.contains(name) {
            debug!(name, "listed in no_compress, copying verbatim");
            return Asset::Original(source.to_path_buf());
        }

        let compressed = match AssetKind::from_name(name) {
            AssetKind::Css => self.run(&self.css, source).await,
            AssetKind::Js => self.run(&self.js, source).await,
            AssetKind::Image => match &self.images {
                Some(optimizer) => optimizer.optimize(source).await,
                None => Ok(None),
            },
            AssetKind::Other => Ok(None),
        };

        match compressed {
            Ok(Some(file)) => Asset::Compressed(file),
            Ok(None) => Asset::Original(source.to_path_buf()),
            Err(e) => {
                warn!(name, "compression failed, storing original: {e}");
                Asset::Original(source.to_path_buf())
            }
        }
    }

    async fn run(
        &self,
        compressor: &Option<CommandCompressor>,
        source: &Path,
    ) -> Result<Option<NamedTempFile>> {
        match compressor {
            Some(compressor) => compressor.compress(source).await.map(Some),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use async_trait::async_trait;

    #[test]
    fn test_kind_from_name() {
        assert_eq!(AssetKind::from_name("css/site.CSS"), AssetKind::Css);
        assert_eq!(AssetKind::from_name("app.min.js"), AssetKind::Js);
        assert_eq!(AssetKind::from_name("img/logo.jpeg"), AssetKind::Image);
        assert_eq!(AssetKind::from_name("favicon.ico"), AssetKind::Other);
        assert_eq!(AssetKind::from_name("README"), AssetKind::Other);
    }

    #[test]
    fn test_from_settings_without_keys_has_no_image_optimizer() {
        let auto = Autocompressor::from_settings(&AssetSettings::default()).unwrap();
        assert!(auto.images.is_none());
        assert_eq!(auto.css.as_ref().map(CommandCompressor::name), Some("yui_css_compressor"));
        assert_eq!(auto.js.as_ref().map(CommandCompressor::name), Some("gclosure_compiler"));
    }

    struct Broken;

    #[async_trait]
    impl ImageOptimizer for Broken {
        async fn optimize(&self, _path: &Path) -> Result<Option<NamedTempFile>> {
            Err(Error::KeysExhausted)
        }
    }

    #[tokio::test]
    async fn test_optimizer_error_falls_back_to_original() {
        let src = command::write_temp(b"png", Path::new("a.png")).unwrap();
        let auto = Autocompressor::passthrough().with_images(Arc::new(Broken));
        let asset = auto.compress("a.png", src.path()).await;
        assert!(!asset.is_compressed());
        assert_eq!(asset.path(), src.path());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_no_compress_and_failures_keep_original() {
        let src = command::write_temp(b"a { b: c }", Path::new("a.css")).unwrap();

        let failing = Autocompressor::passthrough()
            .with_css(CommandCompressor::new("false", "false", Vec::<String>::new()));
        assert!(!failing.compress("a.css", src.path()).await.is_compressed());

        let strip = CommandCompressor::new("strip", "tr", ["-d", " "]).with_stdin();
        let auto = Autocompressor::passthrough().with_css(strip).skip("vendor/a.css");
        assert!(!auto.compress("vendor/a.css", src.path()).await.is_compressed());

        let asset = auto.compress("site/a.css", src.path()).await;
        assert!(asset.is_compressed());
        assert_eq!(std::fs::read(asset.path()).unwrap(), b"a{b:c}");
    }
}
