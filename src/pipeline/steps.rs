//! Staging steps that make up a cpk package.
//!
//! Resulting layout, for component key `web` at version `1.0`:
//!
//! ```text
//! application.yml
//! filelist
//! files/image.json
//! files/image/cpk.rbd.web_1.0.tar
//! icons/cpk.rbd.web.png
//! screenshots/cpk.rbd.web_1.png
//! package.json
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use super::{Pipeline, StagingStep};
use crate::cancel::CancelFlag;
use crate::config::{ExportConfig, VendorConfig};
use crate::error::{ManifestContext, Result};
use crate::image::{ImageClient, ImageSource, MaterializeOutcome, Materializer};
use crate::manifest::cpk::{self, AppIdLayout};
use crate::manifest::filelist::FileList;
use crate::model::Component;
use crate::staging;

pub const APPLICATION_MARKER: &str = "application.yml";
pub const IMAGE_MANIFEST: &str = "files/image.json";
pub const IMAGE_DIR: &str = "files/image";
pub const FILE_LIST: &str = "filelist";
pub const PACKAGE_JSON: &str = "package.json";

/// The cpk steps in package order.
pub fn default_pipeline(config: &ExportConfig, cancel: &CancelFlag) -> Pipeline {
    let prefix = config.namespace_prefix.clone();
    Pipeline::new()
        .step(ApplicationMarker)
        .step(ImageFiles {
            prefix: prefix.clone(),
            layout: config.app_id_layout,
            pull_timeout: config.pull_timeout(),
            cancel: cancel.clone(),
        })
        .step(Icons {
            prefix: prefix.clone(),
            source: config.icon_path.clone(),
        })
        .step(Screenshots {
            prefix: prefix.clone(),
            source: config.screenshot_path.clone(),
        })
        .step(PackageJson {
            prefix,
            vendor: config.vendor.clone(),
        })
}

/// Writes the fixed `application.yml` marker.
pub struct ApplicationMarker;

impl StagingStep for ApplicationMarker {
    fn name(&self) -> &str {
        "application-marker"
    }

    fn run(
        &self,
        staging_dir: &Path,
        _component: &Component,
        _images: &dyn ImageClient,
    ) -> Result<()> {
        staging::write_file(staging_dir, APPLICATION_MARKER, APPLICATION_MARKER)?;
        Ok(())
    }
}

/// Writes `files/image.json`, saves the component image under
/// `files/image/` and records both in `filelist`.
pub struct ImageFiles {
    pub prefix: String,
    pub layout: AppIdLayout,
    pub pull_timeout: Duration,
    pub cancel: CancelFlag,
}

impl StagingStep for ImageFiles {
    fn name(&self) -> &str {
        "image-files"
    }

    fn run(
        &self,
        staging_dir: &Path,
        component: &Component,
        images: &dyn ImageClient,
    ) -> Result<()> {
        let image_dir = staging::create_dir(staging_dir, IMAGE_DIR)?;

        let manifest = cpk::build_image_manifest(component, &self.prefix, self.layout);
        let json = serde_json::to_string_pretty(&manifest)
            .manifest_context(|| format!("serializing image manifest '{}'", manifest.id))?;
        let manifest_path = staging::write_file(staging_dir, IMAGE_MANIFEST, json)?;

        let mut filelist = FileList::new();
        filelist.push_file("/image.json", &manifest_path)?;

        let archive_name = cpk::image_archive_name(&self.prefix, component);
        let archive_path = image_dir.join(&archive_name);
        let outcome = Materializer::new(images)
            .with_timeout(self.pull_timeout)
            .with_cancel_flag(self.cancel.clone())
            .materialize_set(&[ImageSource::from_component(component)], &[], &archive_path)?;
        match outcome {
            MaterializeOutcome::Saved { .. } => {
                filelist.push_file(&format!("/image/{archive_name}"), &archive_path)?;
            }
            MaterializeOutcome::Skipped => {
                tracing::warn!(
                    component = %component.component_key,
                    "component has no image reference, package carries no image archive"
                );
            }
        }
        filelist.push_dir("/image");

        filelist.write_to(staging_dir, FILE_LIST)
    }
}

/// Creates `icons/` and copies the configured icon into it.
pub struct Icons {
    pub prefix: String,
    pub source: Option<PathBuf>,
}

impl StagingStep for Icons {
    fn name(&self) -> &str {
        "icons"
    }

    fn run(
        &self,
        staging_dir: &Path,
        component: &Component,
        _images: &dyn ImageClient,
    ) -> Result<()> {
        let dir = staging::create_dir(staging_dir, "icons")?;
        let Some(source) = &self.source else {
            return Ok(());
        };
        let name = format!("{}.png", cpk::package_id(&self.prefix, component));
        staging::copy_file(source, &dir.join(name))
    }
}

/// Creates `screenshots/` and copies the configured screenshot into it.
pub struct Screenshots {
    pub prefix: String,
    pub source: Option<PathBuf>,
}

impl StagingStep for Screenshots {
    fn name(&self) -> &str {
        "screenshots"
    }

    fn run(
        &self,
        staging_dir: &Path,
        component: &Component,
        _images: &dyn ImageClient,
    ) -> Result<()> {
        let dir = staging::create_dir(staging_dir, "screenshots")?;
        let Some(source) = &self.source else {
            return Ok(());
        };
        let name = format!("{}_1.png", cpk::package_id(&self.prefix, component));
        staging::copy_file(source, &dir.join(name))
    }
}

pub struct PackageJson {
    pub prefix: String,
    pub vendor: VendorConfig,
}

impl StagingStep for PackageJson {
    fn name(&self) -> &str {
        "package-json"
    }

    fn run(
        &self,
        staging_dir: &Path,
        component: &Component,
        _images: &dyn ImageClient,
    ) -> Result<()> {
        let pkg = cpk::build_package_json(component, &self.prefix, &self.vendor);
        let json = serde_json::to_string_pretty(&pkg)
            .manifest_context(|| format!("serializing package descriptor '{}'", pkg.id))?;
        staging::write_file(staging_dir, PACKAGE_JSON, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExportError;
    use crate::test_support::FakeImageClient;
    use std::fs;
    use tempfile::TempDir;

    fn component() -> Component {
        Component {
            component_key: "web".into(),
            share_image: "demo:1.0".into(),
            deploy_version: "1.0".into(),
            cpu: 1500,
            replicas: 1,
            ..Default::default()
        }
    }

    fn image_files() -> ImageFiles {
        ImageFiles {
            prefix: "cpk.rbd".into(),
            layout: AppIdLayout::Base,
            pull_timeout: Duration::from_secs(30),
            cancel: CancelFlag::new(),
        }
    }

    #[test]
    fn image_files_writes_manifest_archive_and_filelist() {
        let temp = TempDir::new().unwrap();
        let client = FakeImageClient::default();

        image_files().run(temp.path(), &component(), &client).unwrap();

        let archive = temp.path().join("files/image/cpk.rbd.web_1.0.tar");
        assert!(archive.is_file());
        assert_eq!(client.saves(), vec![(archive, vec!["demo:1.0".to_string()])]);

        let manifest: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(temp.path().join(IMAGE_MANIFEST)).unwrap())
                .unwrap();
        assert_eq!(manifest["id"], "/cpk.rbd.web-1.0");
        assert_eq!(manifest["apps"][0]["cpus"], 2.0);

        let list = fs::read_to_string(temp.path().join(FILE_LIST)).unwrap();
        let lines: Vec<_> = list.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("F,/image.json,"));
        // the fake client writes the image name as archive content
        assert!(lines[1].starts_with("F,/image/cpk.rbd.web_1.0.tar,8,0666,"));
        assert_eq!(lines[2], "D,/image,0,0777");
    }

    #[test]
    fn image_files_without_reference_lists_manifest_only() {
        let temp = TempDir::new().unwrap();
        let client = FakeImageClient::default();
        let mut c = component();
        c.share_image.clear();

        image_files().run(temp.path(), &c, &client).unwrap();

        let list = fs::read_to_string(temp.path().join(FILE_LIST)).unwrap();
        assert_eq!(list.matches("F,").count(), 1);
        assert!(client.saves().is_empty());
    }

    #[test]
    fn image_files_propagates_pull_failure() {
        let temp = TempDir::new().unwrap();
        let client = FakeImageClient::failing_on("demo:1.0");

        let err = image_files().run(temp.path(), &component(), &client).unwrap_err();

        assert!(matches!(err, ExportError::Pull { .. }));
        assert!(!temp.path().join(FILE_LIST).exists());
    }

    #[test]
    fn icons_and_screenshots_copy_configured_files() {
        let temp = TempDir::new().unwrap();
        let staging = temp.path().join("staging");
        let icon = temp.path().join("icon.png");
        fs::write(&icon, "icon").unwrap();
        let client = FakeImageClient::default();

        Icons {
            prefix: "cpk.rbd".into(),
            source: Some(icon.clone()),
        }
        .run(&staging, &component(), &client)
        .unwrap();
        Screenshots {
            prefix: "cpk.rbd".into(),
            source: Some(icon),
        }
        .run(&staging, &component(), &client)
        .unwrap();

        assert_eq!(fs::read_to_string(staging.join("icons/cpk.rbd.web.png")).unwrap(), "icon");
        assert!(staging.join("screenshots/cpk.rbd.web_1.png").is_file());
    }

    #[test]
    fn unconfigured_icons_leave_empty_dir() {
        let temp = TempDir::new().unwrap();

        Icons {
            prefix: "cpk.rbd".into(),
            source: None,
        }
        .run(temp.path(), &component(), &FakeImageClient::default())
        .unwrap();

        let icons = temp.path().join("icons");
        assert!(icons.is_dir());
        assert_eq!(fs::read_dir(icons).unwrap().count(), 0);
    }

    #[test]
    fn missing_configured_screenshot_fails() {
        let temp = TempDir::new().unwrap();

        let err = Screenshots {
            prefix: "cpk.rbd".into(),
            source: Some(temp.path().join("absent.png")),
        }
        .run(temp.path(), &component(), &FakeImageClient::default())
        .unwrap_err();

        assert!(matches!(err, ExportError::Staging { .. }));
    }

    #[test]
    fn default_pipeline_order() {
        let pipeline = default_pipeline(&ExportConfig::default(), &CancelFlag::new());
        assert_eq!(
            pipeline.names(),
            ["application-marker", "image-files", "icons", "screenshots", "package-json"]
        );
    }

    #[test]
    fn marker_and_package_json_are_written() {
        let temp = TempDir::new().unwrap();
        let client = FakeImageClient::default();

        ApplicationMarker.run(temp.path(), &component(), &client).unwrap();
        PackageJson {
            prefix: "cpk.rbd".into(),
            vendor: VendorConfig::default(),
        }
        .run(temp.path(), &component(), &client)
        .unwrap();

        assert_eq!(
            fs::read_to_string(temp.path().join(APPLICATION_MARKER)).unwrap(),
            "application.yml"
        );
        let pkg: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(temp.path().join(PACKAGE_JSON)).unwrap())
                .unwrap();
        assert_eq!(pkg["id"], "cpk.rbd.web");
        assert_eq!(pkg["version"], "1.0");
    }
}
