//! Staging directory preparation and file helpers.
//!
//! Every export job starts from an empty staging tree; nothing accumulates
//! across runs, so failed jobs never need rollback.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::error::{ExportError, Result, StagingContext};

/// Delete `staging_dir` if present and recreate it empty.
pub fn prepare_staging_dir(staging_dir: &Path) -> Result<()> {
    if staging_dir.exists() {
        fs::remove_dir_all(staging_dir).staging_context(|| {
            format!(
                "removing previous staging directory '{}'",
                staging_dir.display()
            )
        })?;
    }
    fs::create_dir_all(staging_dir).staging_context(|| {
        format!("creating staging directory '{}'", staging_dir.display())
    })?;
    tracing::debug!(path = %staging_dir.display(), "prepared staging directory");
    Ok(())
}

/// Write `content` to `staging_dir/rel`, creating parent directories.
pub fn write_file(staging_dir: &Path, rel: &str, content: impl AsRef<[u8]>) -> Result<PathBuf> {
    let full_path = staging_dir.join(rel);
    if let Some(parent) = full_path.parent() {
        fs::create_dir_all(parent)
            .staging_context(|| format!("creating directory '{}'", parent.display()))?;
    }
    fs::write(&full_path, content)
        .staging_context(|| format!("writing '{}'", full_path.display()))?;
    Ok(full_path)
}

pub fn create_dir(staging_dir: &Path, rel: &str) -> Result<PathBuf> {
    let full_path = staging_dir.join(rel);
    fs::create_dir_all(&full_path)
        .staging_context(|| format!("creating directory '{}'", full_path.display()))?;
    Ok(full_path)
}

/// Copy a regular file into the staging tree.
pub fn copy_file(src: &Path, dst: &Path) -> Result<()> {
    let meta = fs::metadata(src)
        .staging_context(|| format!("reading metadata of '{}'", src.display()))?;
    if !meta.is_file() {
        return Err(ExportError::StagingLayout(format!(
            "'{}' is not a regular file",
            src.display()
        )));
    }
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)
            .staging_context(|| format!("creating directory '{}'", parent.display()))?;
    }
    fs::copy(src, dst).staging_context(|| {
        format!("copying '{}' to '{}'", src.display(), dst.display())
    })?;
    Ok(())
}

/// Exclusive lock on a staging directory for the lifetime of one job.
///
/// The lock file lives next to the staging directory (`.<name>.lock`) so it
/// survives the directory being recreated and is never archived.
#[derive(Debug)]
pub struct StagingLock {
    _file: File,
    path: PathBuf,
}

impl StagingLock {
    pub fn acquire(staging_dir: &Path) -> Result<Self> {
        let path = lock_path(staging_dir)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .staging_context(|| format!("creating directory '{}'", parent.display()))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .staging_context(|| format!("opening staging lock '{}'", path.display()))?;

        if file.try_lock_exclusive().is_err() {
            return Err(ExportError::StagingLayout(format!(
                "staging directory '{}' is in use by another export job",
                staging_dir.display()
            )));
        }

        Ok(Self { _file: file, path })
    }
}

impl Drop for StagingLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

fn lock_path(staging_dir: &Path) -> Result<PathBuf> {
    let name = staging_dir
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| {
            ExportError::StagingLayout(format!(
                "staging directory '{}' has no usable name",
                staging_dir.display()
            ))
        })?;
    let parent = staging_dir.parent().unwrap_or_else(|| Path::new("."));
    Ok(parent.join(format!(".{name}.lock")))
}
