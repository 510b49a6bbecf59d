//! Export configuration.
//!
//! Loaded from TOML; every key is optional. Example:
//!
//! ```toml
//! namespace_prefix = "cpk.rbd"
//! pull_timeout_secs = 30
//! dependent_images = ["registry.example.com/base/runtime:1.0"]
//! icon_path = "/run/app-icon.png"
//!
//! [vendor]
//! name = "rbd"
//! homepage = "example.com"
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{ExportError, Result};
use crate::manifest::cpk::AppIdLayout;
use crate::naming::compose_name;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExportConfig {
    /// Prefix of cpk identifiers and file names (`<prefix>.<component>`).
    pub namespace_prefix: String,
    /// Extension of cpk packages.
    pub package_extension: String,
    /// Suffix of ram package names (`<app>-<version>-<suffix>.tar.gz`).
    pub ram_suffix: String,
    pub pull_timeout_secs: u64,
    /// Archiving executable; must accept tar-style `-c[zj]f`.
    pub archiver: PathBuf,
    /// Shared base images bundled with offline component images.
    pub dependent_images: Vec<String>,
    pub icon_path: Option<PathBuf>,
    pub screenshot_path: Option<PathBuf>,
    pub app_id_layout: AppIdLayout,
    pub vendor: VendorConfig,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            namespace_prefix: "cpk.rbd".to_string(),
            package_extension: "cpk".to_string(),
            ram_suffix: "ram".to_string(),
            pull_timeout_secs: 30,
            archiver: PathBuf::from("tar"),
            dependent_images: Vec::new(),
            icon_path: None,
            screenshot_path: None,
            app_id_layout: AppIdLayout::default(),
            vendor: VendorConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VendorConfig {
    pub name: String,
    pub homepage: String,
    pub email: String,
    pub telephone: String,
    /// Used for the package description, summary and news fields.
    pub summary: String,
}

impl Default for VendorConfig {
    fn default() -> Self {
        Self {
            name: "rbd".to_string(),
            homepage: "rainbond.com".to_string(),
            email: String::new(),
            telephone: String::new(),
            summary: "Exported by app-export".to_string(),
        }
    }
}

impl ExportConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|source| ExportError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&raw).map_err(|source| ExportError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.namespace_prefix.is_empty() {
            return Err(ExportError::Config("namespace_prefix must not be empty".into()));
        }
        if compose_name(&self.namespace_prefix) != self.namespace_prefix {
            return Err(ExportError::Config(format!(
                "namespace_prefix '{}' may only contain [a-zA-Z0-9._-]",
                self.namespace_prefix
            )));
        }
        for (field, value) in [
            ("package_extension", &self.package_extension),
            ("ram_suffix", &self.ram_suffix),
        ] {
            if value.is_empty() || compose_name(value) != *value {
                return Err(ExportError::Config(format!(
                    "{field} '{value}' must be a non-empty [a-zA-Z0-9._-] name"
                )));
            }
        }
        if self.pull_timeout_secs == 0 {
            return Err(ExportError::Config(
                "pull_timeout_secs must be greater than zero".into(),
            ));
        }
        if self.archiver.as_os_str().is_empty() {
            return Err(ExportError::Config("archiver must not be empty".into()));
        }
        Ok(())
    }

    pub fn pull_timeout(&self) -> Duration {
        Duration::from_secs(self.pull_timeout_secs)
    }
}
