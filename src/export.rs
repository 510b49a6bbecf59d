//! Export orchestration: one job, one staging directory, one artifact.
//!
//! 1. lock and recreate the staging directory
//! 2. offline formats that bundle images: save component images, then
//!    plugin images, each as one archive
//! 3. format-specific manifest
//! 4. archive the staging directory into the output directory

use std::path::PathBuf;
use std::time::Instant;

use crate::archive::Archiver;
use crate::cancel::CancelFlag;
use crate::config::ExportConfig;
use crate::error::Result;
use crate::image::{ImageClient, ImageSource, Materializer};
use crate::manifest::{format_for, ExportContext, ExportFormat, FormatKind};
use crate::model::{ApplicationDescriptor, ExportMode};
use crate::staging::{self, StagingLock};

pub const COMPONENT_IMAGES: &str = "component-images.tar";
pub const PLUGIN_IMAGES: &str = "plugins-images.tar";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportJob {
    pub mode: ExportMode,
    /// Exclusively owned by this job; deleted and recreated on start.
    pub staging_dir: PathBuf,
    pub output_dir: PathBuf,
    pub format: FormatKind,
}

impl ExportJob {
    /// Job whose artifact lands next to the staging directory.
    pub fn new(mode: ExportMode, staging_dir: impl Into<PathBuf>, format: FormatKind) -> Self {
        let staging_dir = staging_dir.into();
        let output_dir = match staging_dir.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        Self {
            mode,
            staging_dir,
            output_dir,
            format,
        }
    }

    pub fn with_output_dir(mut self, output_dir: impl Into<PathBuf>) -> Self {
        self.output_dir = output_dir.into();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportResult {
    pub package_path: PathBuf,
    pub package_name: String,
}

pub struct Exporter<'a> {
    job: ExportJob,
    config: ExportConfig,
    images: &'a dyn ImageClient,
    cancel: CancelFlag,
}

impl<'a> Exporter<'a> {
    pub fn new(job: ExportJob, config: ExportConfig, images: &'a dyn ImageClient) -> Self {
        Self {
            job,
            config,
            images,
            cancel: CancelFlag::default(),
        }
    }

    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run the whole job. Nothing is returned unless every stage succeeded.
    pub fn export(&self, app: &ApplicationDescriptor) -> Result<ExportResult> {
        let start = Instant::now();
        let job = &self.job;
        tracing::info!(
            app = %app.app_name,
            version = %app.app_version,
            format = %job.format,
            mode = %job.mode,
            staging = %job.staging_dir.display(),
            "starting export"
        );

        let _lock = StagingLock::acquire(&job.staging_dir)?;
        self.cancel.check("preparing staging directory")?;
        staging::prepare_staging_dir(&job.staging_dir)?;

        let format = format_for(job.format, &self.config, &self.cancel);
        let mut app = app.clone();

        if job.mode == ExportMode::Offline && format.bundles_offline_images() {
            self.save_bundled_images(&app)?;
        }

        let ctx = ExportContext {
            staging_dir: &job.staging_dir,
            mode: job.mode,
            image_client: self.images,
            cancel: &self.cancel,
        };
        format.write_manifest(&ctx, &mut app)?;
        tracing::info!(app = %app.app_name, "wrote package metadata");

        self.cancel.check("archiving")?;
        let name = self.package(format.as_ref(), &app)?;
        let package_path = job.output_dir.join(&name);

        tracing::info!(
            app = %app.app_name,
            package = %package_path.display(),
            elapsed = ?start.elapsed(),
            "export complete"
        );
        Ok(ExportResult {
            package_path,
            package_name: name,
        })
    }

    fn save_bundled_images(&self, app: &ApplicationDescriptor) -> Result<()> {
        let materializer = Materializer::new(self.images)
            .with_timeout(self.config.pull_timeout())
            .with_cancel_flag(self.cancel.clone());

        if app.components.is_empty() {
            tracing::warn!(app = %app.app_name, "no components, skipping component images");
        } else {
            let sources: Vec<_> = app.components.iter().map(ImageSource::from_component).collect();
            materializer.materialize_set(
                &sources,
                &self.config.dependent_images,
                &self.staged(COMPONENT_IMAGES),
            )?;
        }

        if app.plugins.is_empty() {
            tracing::warn!(app = %app.app_name, "no plugins, skipping plugin images");
        } else {
            let sources: Vec<_> = app.plugins.iter().map(ImageSource::from_plugin).collect();
            materializer.materialize_set(&sources, &[], &self.staged(PLUGIN_IMAGES))?;
        }
        Ok(())
    }

    fn package(&self, format: &dyn ExportFormat, app: &ApplicationDescriptor) -> Result<String> {
        Archiver::new(format.compression())
            .with_program(self.config.archiver.clone())
            .package(
                &format.package_name(app),
                &self.job.output_dir,
                &self.job.staging_dir,
            )
    }

    fn staged(&self, name: &str) -> PathBuf {
        self.job.staging_dir.join(name)
    }
}
