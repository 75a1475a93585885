//! Target path resolution and once-per-run directory creation.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::OnceCell;

use crate::error::{Error, Result};

/// Join an archive-relative `name` onto `root`.
///
/// Rejects absolute names, NUL bytes and any `..` segment, so the result
/// always stays under `root`. On Windows, segments with a `:` (drive
/// prefixes, alternate data streams) are rejected too. Both separators are
/// accepted.
pub fn resolve(root: &Path, name: &str) -> Result<PathBuf> {
    let traversal = || Error::PathTraversal {
        entry: name.to_string(),
    };

    if name.starts_with('/') || name.starts_with('\\') || name.contains('\0') {
        return Err(traversal());
    }

    let mut resolved = root.to_path_buf();
    for segment in name.split(['/', '\\']) {
        match segment {
            "" | "." => {}
            ".." => return Err(traversal()),
            s if cfg!(windows) && s.contains(':') => return Err(traversal()),
            s => resolved.push(s),
        }
    }

    Ok(resolved)
}

/// Sibling path a file is written to before being renamed into place.
pub fn partial_path(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    target.with_file_name(format!(".{name}.partial"))
}

/// Directories known to exist during one run.
///
/// Each distinct directory is created at most once no matter how many
/// workers ask for it; latecomers wait for the first creation to finish.
#[derive(Debug, Default)]
pub struct DirectoryCache {
    dirs: Mutex<HashMap<PathBuf, Arc<OnceCell<()>>>>,
    created: AtomicUsize,
}

impl DirectoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache that treats `root` as already present.
    pub fn rooted_at(root: &Path) -> Self {
        let cache = Self::new();
        let _ = cache.cell(root).set(());
        cache
    }

    /// Number of physical creation calls issued so far.
    pub fn created(&self) -> usize {
        self.created.load(Ordering::Relaxed)
    }

    /// Ensure the parent directory of a file path exists.
    pub async fn ensure_parent(&self, path: &Path) -> Result<()> {
        match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => self.ensure_dir(parent).await,
            _ => Ok(()),
        }
    }

    /// Ensure `dir` and its ancestors exist.
    pub async fn ensure_dir(&self, dir: &Path) -> Result<()> {
        let cell = self.cell(dir);
        cell.get_or_try_init(|| async {
            // create_dir_all already treats an existing directory as success
            tokio::fs::create_dir_all(dir).await.map_err(Error::io_at(dir))?;
            self.created.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(dir = %dir.display(), "created directory");
            Ok::<_, Error>(())
        })
        .await?;

        for ancestor in dir.ancestors().skip(1) {
            if ancestor.as_os_str().is_empty() || self.cell(ancestor).set(()).is_err() {
                break;
            }
        }
        Ok(())
    }

    fn cell(&self, dir: &Path) -> Arc<OnceCell<()>> {
        self.dirs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(dir.to_path_buf())
            .or_default()
            .clone()
    }
}
