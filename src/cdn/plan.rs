//! Mapping collected files to CDN paths, and the batch limits around it.

use std::io::Write;
use std::path::PathBuf;

use reqwest::Url;

use crate::error::{Error, Result};

/// CDN paths to invalidate, already split against the provider's limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidationPlan {
    paths: Vec<String>,
    batch_size: usize,
}

impl InvalidationPlan {
    /// Maps collected file names to URL paths under `static_url`.
    ///
    /// More than `batch_size * max_batches` paths is a
    /// [`TooManyInvalidations`](Error::TooManyInvalidations) error; the
    /// paths are dumped to a JSON file so they can be invalidated by hand.
    pub fn new(
        static_url: &str,
        files: &[String],
        batch_size: usize,
        max_batches: usize,
    ) -> Result<Self> {
        let base = static_base(static_url)?;
        let paths = files
            .iter()
            .filter(|f| !f.is_empty())
            .map(|f| {
                base.join(f).map(|url| url.path().to_owned()).map_err(|e| {
                    Error::Config(format!("cannot map {f:?} under {static_url:?}: {e}"))
                })
            })
            .collect::<Result<Vec<String>>>()?;

        let max = batch_size.saturating_mul(max_batches);
        if paths.len() > max {
            let manifest = dump_manifest(&paths)?;
            return Err(Error::TooManyInvalidations { max, manifest });
        }
        Ok(Self { paths, batch_size: batch_size.max(1) })
    }

    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Consecutive chunks of at most `batch_size` paths.
    pub fn batches(&self) -> std::slice::Chunks<'_, String> {
        self.paths.chunks(self.batch_size)
    }
}

/// Writes `paths` as an indented JSON array to a temp file that outlives
/// the process.
pub fn dump_manifest(paths: &[String]) -> Result<PathBuf> {
    let mut file = tempfile::Builder::new()
        .prefix("tsu-invalidate-")
        .suffix(".json")
        .tempfile()?;
    serde_json::to_writer_pretty(&mut file, paths)?;
    file.flush()?;
    let path = file.into_temp_path().keep().map_err(|e| e.error)?;
    Ok(path)
}

/// `static_url` resolved against a placeholder origin, so absolute,
/// protocol-relative and path-only forms all yield the same path.
fn static_base(static_url: &str) -> Result<Url> {
    Url::parse("http://localhost/")
        .and_then(|origin| origin.join(static_url))
        .map_err(|e| Error::Config(format!("invalid cdn.static_url {static_url:?}: {e}")))
}
