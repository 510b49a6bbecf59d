//! Package formats.
//!
//! An [`ExportFormat`] turns a descriptor into the metadata a package needs
//! and names the artifact:
//!
//! - [`cpk`] - nested container manifest, file list and package descriptor
//!   for the first component, staged by a [`crate::pipeline::Pipeline`]
//! - [`ram`] - flat `metadata.json` dump of the whole descriptor
//!
//! The job selects a format through [`FormatKind`]; nothing downstream
//! inspects concrete types.

pub mod cpk;
pub mod filelist;
pub mod ram;

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::archive::Compression;
use crate::cancel::CancelFlag;
use crate::config::ExportConfig;
use crate::error::Result;
use crate::image::ImageClient;
use crate::model::{ApplicationDescriptor, ExportMode};

pub use cpk::CpkFormat;
pub use ram::RamFormat;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatKind {
    Cpk,
    Ram,
}

impl fmt::Display for FormatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormatKind::Cpk => write!(f, "cpk"),
            FormatKind::Ram => write!(f, "ram"),
        }
    }
}

impl FromStr for FormatKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cpk" => Ok(FormatKind::Cpk),
            "ram" => Ok(FormatKind::Ram),
            other => Err(format!(
                "unsupported package format '{other}' (expected 'cpk' or 'ram')"
            )),
        }
    }
}

/// What a format may touch while writing its manifest.
pub struct ExportContext<'a> {
    pub staging_dir: &'a Path,
    pub mode: ExportMode,
    pub image_client: &'a dyn ImageClient,
    pub cancel: &'a CancelFlag,
}

pub trait ExportFormat {
    fn kind(&self) -> FormatKind;

    /// File name of the final artifact.
    fn package_name(&self, app: &ApplicationDescriptor) -> String;

    fn compression(&self) -> Compression;

    /// Whether offline exports bundle `component-images.tar` and
    /// `plugins-images.tar` before the manifest is written.
    fn bundles_offline_images(&self) -> bool;

    /// Write the format's metadata into the staging directory.
    ///
    /// May mutate `app` (credential scrubbing, picture annotations); the
    /// caller passes a job-local copy.
    fn write_manifest(
        &self,
        ctx: &ExportContext<'_>,
        app: &mut ApplicationDescriptor,
    ) -> Result<()>;
}

/// Build the format for `kind` with its default steps.
pub fn format_for(
    kind: FormatKind,
    config: &ExportConfig,
    cancel: &CancelFlag,
) -> Box<dyn ExportFormat> {
    match kind {
        FormatKind::Cpk => Box::new(CpkFormat::new(config, cancel)),
        FormatKind::Ram => Box::new(RamFormat::new(config.ram_suffix.clone())),
    }
}
