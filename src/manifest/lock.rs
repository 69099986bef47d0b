//! Single-writer guard around manifest read-modify-write cycles.
//!
//! A stage run holds an exclusive advisory lock on `state/manifest.lock` from
//! before it loads the manifest until after its final save. A concurrent run
//! against the same project fails fast instead of losing updates.
use anyhow::{anyhow, Context, Result};
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

/// Held for the duration of a run; the OS lock is released on drop.
#[derive(Debug)]
pub struct ManifestLock {
    path: PathBuf,
    _file: File,
}

impl ManifestLock {
    /// Take the exclusive lock or fail if another run already holds it.
    pub fn acquire(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)
            .with_context(|| format!("open manifest lock {}", path.display()))?;
        fs4::FileExt::try_lock_exclusive(&file).map_err(|err| {
            anyhow!(
                "manifest is locked by another run ({}): {err}",
                path.display()
            )
        })?;
        tracing::debug!(path = %path.display(), "manifest lock acquired");
        Ok(Self {
            path: path.to_path_buf(),
            _file: file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
