//! Storage that writes assets under a root directory, compressing them on save.

use std::path::{Component, Path, PathBuf};

use tracing::info;

use crate::error::{Error, Result};

use super::Autocompressor;

/// File system storage that compresses assets on save.
#[derive(Clone)]
pub struct CompressingStorage {
    root: PathBuf,
    compressor: Autocompressor,
}

impl CompressingStorage {
    pub fn new(root: impl Into<PathBuf>, compressor: Autocompressor) -> Self {
        Self { root: root.into(), compressor }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Destination of `name`. Names are `/`-separated and relative; anything
    /// that would escape the root is rejected.
    pub fn path(&self, name: &str) -> Result<PathBuf> {
        let relative = Path::new(name);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if name.is_empty() || escapes {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("invalid asset name {name:?}"),
            )));
        }
        Ok(self.root.join(relative))
    }

    /// Compresses `source` and writes the result to `root/name`.
    pub async fn save(&self, name: &str, source: &Path) -> Result<PathBuf> {
        let dest = self.path(name)?;
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let asset = self.compressor.compress(name, source).await;
        tokio::fs::copy(asset.path(), &dest).await?;
        info!(name, compressed = asset.is_compressed(), "saved asset");
        Ok(dest)
    }
}
