//! Ordered staging steps run against one component and one staging tree.
//!
//! The caller builds the step list explicitly; there is no process-wide
//! registry. New package contents are added by pushing new steps, not by
//! editing existing ones.
//!
//! # Example
//!
//! ```rust,ignore
//! use app_export::pipeline::{step_fn, Pipeline};
//! use app_export::staging;
//!
//! let pipeline = Pipeline::new()
//!     .step(step_fn("readme", |staging_dir, component, _images| {
//!         staging::write_file(staging_dir, "README", &component.component_key)?;
//!         Ok(())
//!     }));
//! pipeline.run(staging_dir, &component, &docker, &cancel)?;
//! ```

pub mod steps;

use std::path::Path;
use std::time::Instant;

use crate::cancel::CancelFlag;
use crate::error::{ExportError, Result};
use crate::image::ImageClient;
use crate::model::Component;
use crate::naming::memory_class;

pub use steps::default_pipeline;

/// One unit of staging work.
///
/// A step writes its contribution into the staging directory and shares
/// nothing else with other steps.
pub trait StagingStep {
    /// Name for logging and error context.
    fn name(&self) -> &str;

    fn run(
        &self,
        staging_dir: &Path,
        component: &Component,
        images: &dyn ImageClient,
    ) -> Result<()>;
}

/// Adapter turning a plain function into a [`StagingStep`].
pub struct FnStep<F> {
    name: String,
    f: F,
}

impl<F> StagingStep for FnStep<F>
where
    F: Fn(&Path, &Component, &dyn ImageClient) -> Result<()>,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn run(
        &self,
        staging_dir: &Path,
        component: &Component,
        images: &dyn ImageClient,
    ) -> Result<()> {
        (self.f)(staging_dir, component, images)
    }
}

pub fn step_fn<F>(name: impl Into<String>, f: F) -> FnStep<F>
where
    F: Fn(&Path, &Component, &dyn ImageClient) -> Result<()>,
{
    FnStep {
        name: name.into(),
        f,
    }
}

#[derive(Default)]
pub struct Pipeline {
    steps: Vec<Box<dyn StagingStep>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a step; builder form of [`Pipeline::push`].
    pub fn step(mut self, step: impl StagingStep + 'static) -> Self {
        self.push(step);
        self
    }

    pub fn push(&mut self, step: impl StagingStep + 'static) {
        self.steps.push(Box::new(step));
    }

    pub fn names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    /// Run every step in order. The first failure stops the run; files
    /// already written stay in place.
    pub fn run(
        &self,
        staging_dir: &Path,
        component: &Component,
        images: &dyn ImageClient,
        cancel: &CancelFlag,
    ) -> Result<()> {
        tracing::info!(
            component = %component.component_key,
            version = %component.deploy_version,
            memory = memory_class(component.memory),
            steps = self.steps.len(),
            "staging component"
        );
        for step in &self.steps {
            let name = step.name();
            cancel.check(&format!("step '{name}'"))?;

            let start = Instant::now();
            step.run(staging_dir, component, images).map_err(|err| ExportError::Step {
                step: name.to_string(),
                source: Box::new(err),
            })?;
            tracing::info!(
                step = name,
                component = %component.component_key,
                elapsed = ?start.elapsed(),
                "staging step complete"
            );
        }
        Ok(())
    }
}
