//! Static file collection.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::{debug, info, warn};

use crate::assets::CompressingStorage;
use crate::error::Result;

#[derive(Debug, Default)]
pub struct CollectReport {
    /// `/`-separated names, relative to the source directory, in walk order.
    pub copied: Vec<String>,
    pub unmodified: usize,
}

/// Copies every file under `source_dir` into `storage`, skipping files
/// whose stored copy is at least as new as the source.
pub async fn collect(source_dir: &Path, storage: &CompressingStorage) -> Result<CollectReport> {
    let mut report = CollectReport::default();
    for (name, source) in walk(source_dir)? {
        let dest = storage.path(&name)?;
        if !is_stale(&source, &dest)? {
            debug!(%name, "unmodified, skipping");
            report.unmodified += 1;
            continue;
        }
        storage.save(&name, &source).await?;
        report.copied.push(name);
    }
    info!(
        copied = report.copied.len(),
        unmodified = report.unmodified,
        "collected static files into {}",
        storage.root().display()
    );
    Ok(report)
}

fn is_stale(source: &Path, dest: &Path) -> Result<bool> {
    let dest_modified = match std::fs::metadata(dest) {
        Ok(meta) => meta.modified()?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(true),
        Err(e) => return Err(e.into()),
    };
    let source_modified: SystemTime = std::fs::metadata(source)?.modified()?;
    Ok(dest_modified < source_modified)
}

/// Files under `root` as `(relative name, path)`, sorted for a stable order.
///
/// Symlinks are followed. A directory reached twice through links is walked
/// once, and dangling links are skipped.
fn walk(root: &Path) -> Result<Vec<(String, PathBuf)>> {
    let mut files = Vec::new();
    let mut seen = HashSet::new();
    let mut dirs = vec![root.to_path_buf()];
    while let Some(dir) = dirs.pop() {
        if !seen.insert(std::fs::canonicalize(&dir)?) {
            debug!(dir = %dir.display(), "already walked, skipping");
            continue;
        }
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            let meta = match std::fs::metadata(&path) {
                Ok(meta) => meta,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    warn!(path = %path.display(), "dangling symlink, skipping");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            if meta.is_dir() {
                dirs.push(path);
                continue;
            }
            let Ok(relative) = path.strip_prefix(root) else { continue };
            let name = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            files.push((name, path));
        }
    }
    files.sort();
    Ok(files)
}
