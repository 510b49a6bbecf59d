//! Container image access.
//!
//! - [`ImageClient`] - the pull/save contract the exporters depend on
//! - [`docker`] - implementation backed by the `docker` CLI
//! - [`materialize`] - pull a set of images and save them as one archive

pub mod docker;
pub mod materialize;

use std::io;
use std::path::Path;
use std::time::Duration;

use thiserror::Error;

use crate::model::ImageInfo;

pub use docker::DockerCli;
pub use materialize::{ImageSource, MaterializeOutcome, Materializer};

/// Per-pull bound used when the export config does not override it.
pub const DEFAULT_PULL_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum ImageClientError {
    #[error("failed to run '{command}'")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("'{command}' exited with {status}: {stderr}")]
    Failed {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("'{command}' timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },

    /// The per-pull registry auth directory could not be created.
    #[error("creating registry auth directory")]
    AuthDir {
        #[source]
        source: io::Error,
    },
}

/// Pull and save operations of a container image client.
///
/// Each call is atomic from the exporter's point of view.
pub trait ImageClient {
    /// Pull `reference` with the given registry credentials, returning the
    /// local image name to hand to [`ImageClient::save`].
    fn pull(
        &self,
        reference: &str,
        credentials: &ImageInfo,
        timeout: Duration,
    ) -> Result<String, ImageClientError>;

    /// Save all `images` into a single archive at `destination`.
    fn save(&self, destination: &Path, images: &[String]) -> Result<(), ImageClientError>;
}
