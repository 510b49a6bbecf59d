//! Test doubles shared by the unit tests.

use std::cell::RefCell;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::image::{ImageClient, ImageClientError};
use crate::model::ImageInfo;

/// Records pulls and saves; a save writes a small placeholder archive.
#[derive(Debug, Default)]
pub(crate) struct FakeImageClient {
    fail_reference: Option<String>,
    pull_calls: RefCell<Vec<(String, ImageInfo, Duration)>>,
    pulled: RefCell<Vec<String>>,
    saves: RefCell<Vec<(PathBuf, Vec<String>)>>,
}

impl FakeImageClient {
    pub(crate) fn failing_on(reference: &str) -> Self {
        Self {
            fail_reference: Some(reference.to_string()),
            ..Default::default()
        }
    }

    /// Every attempted pull, including failed ones.
    pub(crate) fn pull_calls(&self) -> Vec<(String, ImageInfo, Duration)> {
        self.pull_calls.borrow().clone()
    }

    /// Local names of successful pulls.
    pub(crate) fn pulls(&self) -> Vec<String> {
        self.pulled.borrow().clone()
    }

    pub(crate) fn saves(&self) -> Vec<(PathBuf, Vec<String>)> {
        self.saves.borrow().clone()
    }
}

impl ImageClient for FakeImageClient {
    fn pull(
        &self,
        reference: &str,
        credentials: &ImageInfo,
        timeout: Duration,
    ) -> Result<String, ImageClientError> {
        self.pull_calls
            .borrow_mut()
            .push((reference.to_string(), credentials.clone(), timeout));
        if self.fail_reference.as_deref() == Some(reference) {
            return Err(ImageClientError::Failed {
                command: format!("docker pull {reference}"),
                status: "exit status: 1".to_string(),
                stderr: "manifest unknown".to_string(),
            });
        }
        self.pulled.borrow_mut().push(reference.to_string());
        Ok(reference.to_string())
    }

    fn save(&self, destination: &Path, images: &[String]) -> Result<(), ImageClientError> {
        fs::write(destination, images.join("\n")).map_err(|source| {
            ImageClientError::Spawn {
                command: "fake save".to_string(),
                source,
            }
        })?;
        self.saves
            .borrow_mut()
            .push((destination.to_path_buf(), images.to_vec()));
        Ok(())
    }
}

/// Write an executable `/bin/sh` script into `dir`.
pub(crate) fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}
