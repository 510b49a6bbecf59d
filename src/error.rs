//! Error taxonomy for export jobs.
//!
//! Every variant aborts the enclosing job. Nothing in this crate retries;
//! callers that want a retry policy wrap the whole [`crate::Exporter::export`]
//! call.

use std::error::Error as StdError;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::image::ImageClientError;

pub type Result<T> = std::result::Result<T, ExportError>;

/// Boxed cause for manifest serialization or checksum failures.
pub type BoxedCause = Box<dyn StdError + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum ExportError {
    /// Staging directory could not be prepared, written or verified.
    #[error("staging: {context}")]
    Staging {
        context: String,
        #[source]
        source: io::Error,
    },

    /// Staging layout is unusable (missing directory, held lock, ...).
    #[error("staging: {0}")]
    StagingLayout(String),

    /// Registry pull failed for one component or plugin image.
    #[error("pulling image '{reference}' for {owner}")]
    Pull {
        owner: String,
        reference: String,
        #[source]
        source: ImageClientError,
    },

    /// Batched image save failed.
    #[error("saving {} image(s) to '{}'", images.len(), destination.display())]
    Save {
        destination: PathBuf,
        images: Vec<String>,
        #[source]
        source: ImageClientError,
    },

    /// Manifest, metadata or file-list generation failed.
    #[error("manifest: {context}")]
    Manifest {
        context: String,
        #[source]
        source: BoxedCause,
    },

    /// Archiving subprocess failed or produced no artifact.
    #[error("archive: {0}")]
    Archive(String),

    /// A pipeline step failed; the step's own error is the source.
    #[error("staging step '{step}' failed")]
    Step {
        step: String,
        #[source]
        source: Box<ExportError>,
    },

    #[error("reading export config '{}'", path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("parsing export config '{}'", path.display())]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid export config: {0}")]
    Config(String),

    #[error("export cancelled before {0}")]
    Cancelled(String),
}

impl ExportError {
    pub fn is_cancelled(&self) -> bool {
        match self {
            ExportError::Cancelled(_) => true,
            ExportError::Step { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }
}

/// Attach staging context to I/O failures.
pub(crate) trait StagingContext<T> {
    fn staging_context<F>(self, context: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> StagingContext<T> for io::Result<T> {
    fn staging_context<F>(self, context: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|source| ExportError::Staging {
            context: context(),
            source,
        })
    }
}

/// Attach manifest context to serialization, decoding or hashing failures.
pub(crate) trait ManifestContext<T> {
    fn manifest_context<F>(self, context: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ManifestContext<T> for std::result::Result<T, E>
where
    E: StdError + Send + Sync + 'static,
{
    fn manifest_context<F>(self, context: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|source| ExportError::Manifest {
            context: context(),
            source: Box::new(source),
        })
    }
}
