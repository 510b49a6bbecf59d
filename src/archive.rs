//! Package a staging directory into one compressed artifact.
//!
//! Wraps a tar-compatible executable. The archive contains the staging
//! directory itself (by base name), so unpacking recreates one top-level
//! directory.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::{ExportError, Result, StagingContext};

/// Diagnostic tar prints when a file is touched while being archived.
/// Packaging still succeeds when this is the only complaint.
pub const BENIGN_RACE_MARKER: &str = "file changed as we read it";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    Gzip,
    Bzip2,
}

impl Compression {
    fn create_flag(self) -> &'static str {
        match self {
            Compression::Gzip => "-czf",
            Compression::Bzip2 => "-cjf",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Archiver {
    program: PathBuf,
    compression: Compression,
}

impl Archiver {
    pub fn new(compression: Compression) -> Self {
        Self {
            program: PathBuf::from("tar"),
            compression,
        }
    }

    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    /// Archive `staging_dir` into `output_dir/artifact_name`.
    ///
    /// Returns the artifact name. The process runs in the staging
    /// directory's parent (normally `output_dir`) and archives the staging
    /// directory's base name.
    pub fn package(
        &self,
        artifact_name: &str,
        output_dir: &Path,
        staging_dir: &Path,
    ) -> Result<String> {
        if !staging_dir.is_dir() {
            return Err(ExportError::StagingLayout(format!(
                "cannot package '{}': not an existing directory",
                staging_dir.display()
            )));
        }
        let base_name = staging_dir.file_name().ok_or_else(|| {
            ExportError::StagingLayout(format!(
                "cannot package '{}': directory has no base name",
                staging_dir.display()
            ))
        })?;
        let work_dir = match staging_dir.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        fs::create_dir_all(output_dir).staging_context(|| {
            format!("creating output directory '{}'", output_dir.display())
        })?;
        let output_dir = fs::canonicalize(output_dir).staging_context(|| {
            format!("resolving output directory '{}'", output_dir.display())
        })?;
        let artifact = output_dir.join(artifact_name);

        let mut cmd = Command::new(&self.program);
        cmd.arg(self.compression.create_flag())
            .arg(&artifact)
            .arg(base_name)
            .current_dir(&work_dir);
        tracing::info!(
            program = %self.program.display(),
            artifact = %artifact.display(),
            source = %staging_dir.display(),
            "packaging"
        );

        let output = cmd.output().map_err(|err| {
            ExportError::Archive(format!(
                "failed to run '{}': {err}",
                self.program.display()
            ))
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            if stderr.contains(BENIGN_RACE_MARKER) {
                tracing::warn!(
                    artifact = %artifact.display(),
                    stderr = %stderr.trim(),
                    "ignoring changed-file warning from archiver"
                );
            } else {
                return Err(ExportError::Archive(format!(
                    "'{}' failed packaging '{}' ({}): stdout: [{}] stderr: [{}]",
                    self.program.display(),
                    artifact_name,
                    output.status,
                    stdout.trim(),
                    stderr.trim()
                )));
            }
        }

        if !artifact.is_file() {
            return Err(ExportError::Archive(format!(
                "'{}' reported success but '{}' was not created",
                self.program.display(),
                artifact.display()
            )));
        }

        Ok(artifact_name.to_string())
    }
}
