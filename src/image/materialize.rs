//! Pull a set of images and write them into one local archive.

use std::path::Path;
use std::time::{Duration, Instant};

use super::{ImageClient, DEFAULT_PULL_TIMEOUT};
use crate::cancel::CancelFlag;
use crate::error::{ExportError, Result};
use crate::model::{Component, ImageInfo, Plugin};

/// One image to materialize, with the component or plugin that owns it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSource {
    /// Used in logs and pull errors, e.g. `component 'web'`.
    pub owner: String,
    pub reference: String,
    pub credentials: ImageInfo,
}

impl ImageSource {
    pub fn from_component(component: &Component) -> Self {
        Self {
            owner: format!("component '{}'", component.display_name()),
            reference: component.share_image.clone(),
            credentials: component.app_image.clone(),
        }
    }

    pub fn from_plugin(plugin: &Plugin) -> Self {
        Self {
            owner: format!("plugin '{}'", plugin.display_name()),
            reference: plugin.share_image.clone(),
            credentials: plugin.plugin_image.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MaterializeOutcome {
    /// Nothing to save; no archive was created.
    Skipped,
    /// All images were saved, in this order, to the destination archive.
    Saved { images: Vec<String> },
}

pub struct Materializer<'a> {
    client: &'a dyn ImageClient,
    timeout: Duration,
    cancel: CancelFlag,
}

impl<'a> Materializer<'a> {
    pub fn new(client: &'a dyn ImageClient) -> Self {
        Self {
            client,
            timeout: DEFAULT_PULL_TIMEOUT,
            cancel: CancelFlag::default(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Pull every source with a non-empty reference, then save the pulled
    /// images plus `dependent_images` into `destination` with one save call.
    ///
    /// The first failed pull aborts the whole set. An empty set creates no
    /// archive and is not an error.
    pub fn materialize_set(
        &self,
        sources: &[ImageSource],
        dependent_images: &[String],
        destination: &Path,
    ) -> Result<MaterializeOutcome> {
        let mut images = Vec::with_capacity(sources.len() + dependent_images.len());

        for source in sources.iter().filter(|s| !s.reference.is_empty()) {
            self.cancel
                .check(&format!("pulling image '{}'", source.reference))?;
            let local_name = self
                .client
                .pull(&source.reference, &source.credentials, self.timeout)
                .map_err(|err| ExportError::Pull {
                    owner: source.owner.clone(),
                    reference: source.reference.clone(),
                    source: err,
                })?;
            tracing::info!(owner = %source.owner, image = %local_name, "pulled image");
            images.push(local_name);
        }

        images.extend(
            dependent_images
                .iter()
                .filter(|image| !image.is_empty())
                .cloned(),
        );

        if images.is_empty() {
            tracing::warn!(
                destination = %destination.display(),
                "no images to save, skipping archive"
            );
            return Ok(MaterializeOutcome::Skipped);
        }

        self.cancel
            .check(&format!("saving images to '{}'", destination.display()))?;
        let start = Instant::now();
        self.client
            .save(destination, &images)
            .map_err(|err| ExportError::Save {
                destination: destination.to_path_buf(),
                images: images.clone(),
                source: err,
            })?;
        tracing::info!(
            destination = %destination.display(),
            count = images.len(),
            elapsed = ?start.elapsed(),
            "saved images"
        );

        Ok(MaterializeOutcome::Saved { images })
    }
}
