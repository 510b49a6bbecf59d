//! Export an application descriptor as a self-contained package.
//!
//! Two package formats are supported:
//!
//! - **cpk** - nested container manifest (`files/image.json`), the component
//!   image archive, a checksummed `filelist` and `package.json`, bzip2
//!   compressed
//! - **ram** - the whole descriptor as `metadata.json`, plus batched
//!   component and plugin image archives in offline mode, gzip compressed
//!
//! # Architecture
//!
//! ```text
//! ApplicationDescriptor
//!     │
//!     ▼
//! Exporter (export)
//!     ├── staging: lock, delete and recreate the staging directory
//!     ├── image::Materializer: pull references, one batched save
//!     ├── manifest::ExportFormat
//!     │       ├── cpk: pipeline::Pipeline of staging steps
//!     │       └── ram: picture, credential scrubbing, metadata.json
//!     └── archive::Archiver: staging directory -> one artifact
//!     │
//!     ▼
//! ExportResult { package_path, package_name }
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use app_export::{DockerCli, ExportConfig, ExportJob, ExportMode, Exporter, FormatKind};
//!
//! let job = ExportJob::new(ExportMode::Offline, "/var/exports/shop-1.0", FormatKind::Ram);
//! let docker = DockerCli::new();
//! let result = Exporter::new(job, ExportConfig::default(), &docker).export(&app)?;
//! println!("{}", result.package_path.display());
//! ```

pub mod archive;
pub mod cancel;
pub mod config;
pub mod error;
pub mod export;
pub mod image;
pub mod manifest;
pub mod model;
pub mod naming;
pub mod pipeline;
pub mod staging;

#[cfg(test)]
mod test_support;

pub use archive::{Archiver, Compression};
pub use cancel::CancelFlag;
pub use config::{ExportConfig, VendorConfig};
pub use error::{ExportError, Result};
pub use export::{ExportJob, ExportResult, Exporter};
pub use image::{DockerCli, ImageClient, ImageClientError};
pub use manifest::{ExportFormat, FormatKind};
pub use model::{ApplicationDescriptor, Component, ExportMode, ImageInfo, Plugin};
pub use naming::compose_name;
pub use pipeline::{Pipeline, StagingStep};
