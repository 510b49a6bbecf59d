//! Flat descriptor-dump package (ram): `metadata.json` plus, offline, the
//! batched image archives and the application picture.

use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use uuid::Uuid;

use super::{ExportContext, ExportFormat, FormatKind};
use crate::archive::Compression;
use crate::error::{ManifestContext, Result};
use crate::model::{ApplicationDescriptor, ExportMode, ImageInfo};
use crate::naming::compose_name;
use crate::staging;

pub const METADATA_FILE: &str = "metadata.json";
pub const PICTURE_DATA_ANNOTATION: &str = "image_base64_string";
pub const PICTURE_SUFFIX_ANNOTATION: &str = "suffix";
pub const PICTURE_NAME_ANNOTATION: &str = "picture_name";
const DEFAULT_PICTURE_SUFFIX: &str = "jpg";

#[derive(Debug, Clone)]
pub struct RamFormat {
    suffix: String,
}

impl RamFormat {
    pub fn new(suffix: impl Into<String>) -> Self {
        Self {
            suffix: suffix.into(),
        }
    }
}

impl Default for RamFormat {
    fn default() -> Self {
        Self::new("ram")
    }
}

impl ExportFormat for RamFormat {
    fn kind(&self) -> FormatKind {
        FormatKind::Ram
    }

    fn package_name(&self, app: &ApplicationDescriptor) -> String {
        format!(
            "{}-{}-{}.tar.gz",
            compose_name(&app.app_name),
            app.app_version,
            self.suffix
        )
    }

    fn compression(&self) -> Compression {
        Compression::Gzip
    }

    fn bundles_offline_images(&self) -> bool {
        true
    }

    fn write_manifest(
        &self,
        ctx: &ExportContext<'_>,
        app: &mut ApplicationDescriptor,
    ) -> Result<()> {
        if ctx.mode == ExportMode::Offline {
            if let Err(err) = save_picture(app, ctx.staging_dir) {
                tracing::error!(
                    app = %app.app_name,
                    error = %err,
                    "saving application picture failed"
                );
            }
            scrub_credentials(app);
        }
        write_metadata(app, ctx.staging_dir)
    }
}

/// Decode the base64 picture annotation into `<uuid>.<suffix>` in the
/// staging directory and replace the annotation with the file name.
///
/// Returns the file name, or `None` when the descriptor carries no picture.
pub fn save_picture(app: &mut ApplicationDescriptor, staging_dir: &Path) -> Result<Option<String>> {
    let Some(encoded) = app.annotations.get(PICTURE_DATA_ANNOTATION) else {
        return Ok(None);
    };
    let bytes = STANDARD
        .decode(encoded.trim())
        .manifest_context(|| "decoding application picture".to_string())?;
    let suffix = app
        .annotations
        .get(PICTURE_SUFFIX_ANNOTATION)
        .map(String::as_str)
        .unwrap_or(DEFAULT_PICTURE_SUFFIX);
    let file_name = format!("{}.{suffix}", Uuid::new_v4().simple());
    staging::write_file(staging_dir, &file_name, bytes)?;

    app.annotations.remove(PICTURE_DATA_ANNOTATION);
    app.annotations
        .insert(PICTURE_NAME_ANNOTATION.to_string(), file_name.clone());
    tracing::debug!(file = %file_name, "saved application picture");
    Ok(Some(file_name))
}

/// Clear every component and plugin registry credential record.
pub fn scrub_credentials(app: &mut ApplicationDescriptor) {
    for component in &mut app.components {
        component.app_image = ImageInfo::default();
    }
    for plugin in &mut app.plugins {
        plugin.plugin_image = ImageInfo::default();
    }
}

pub fn write_metadata(app: &ApplicationDescriptor, staging_dir: &Path) -> Result<()> {
    let meta = serde_json::to_string_pretty(app)
        .manifest_context(|| format!("serializing metadata of '{}'", app.app_name))?;
    staging::write_file(staging_dir, METADATA_FILE, meta)?;
    Ok(())
}
