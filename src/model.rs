//! Application descriptor consumed by the exporters.
//!
//! Field names are the stable names written into `metadata.json`; every field
//! is optional on input so partially filled descriptors deserialize.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::naming::decode_escapes;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationDescriptor {
    pub app_name: String,
    pub app_version: String,
    pub components: Vec<Component>,
    pub plugins: Vec<Plugin>,
    pub annotations: BTreeMap<String, String>,
}

/// Registry access for one image. Cleared before offline metadata is written.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageInfo {
    pub hub_url: String,
    pub hub_user: String,
    pub hub_password: String,
    pub namespace: String,
}

impl ImageInfo {
    pub fn is_empty(&self) -> bool {
        self.hub_url.is_empty()
            && self.hub_user.is_empty()
            && self.hub_password.is_empty()
            && self.namespace.is_empty()
    }

    pub fn has_login(&self) -> bool {
        !self.hub_user.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Component {
    pub component_key: String,
    pub service_cname: String,
    pub share_image: String,
    pub app_image: ImageInfo,
    /// CPU request in milli-units.
    pub cpu: u32,
    /// Memory in MiB.
    pub memory: u32,
    pub ports: Vec<Port>,
    pub volumes: Vec<Volume>,
    /// Ordered; duplicate names are kept.
    pub envs: Vec<EnvVar>,
    pub probes: Vec<Probe>,
    pub labels: BTreeMap<String, String>,
    pub cmd: String,
    pub arch: String,
    pub deploy_version: String,
    #[serde(default = "default_replicas")]
    pub replicas: u32,
}

fn default_replicas() -> u32 {
    1
}

impl Component {
    /// Display name with escape sequences decoded, for logs and errors.
    pub fn display_name(&self) -> String {
        let name = decode_escapes(&self.service_cname);
        if name.is_empty() {
            self.component_key.clone()
        } else {
            name
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Port {
    pub container_port: u16,
    pub protocol: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Volume {
    pub volume_mount_path: String,
    pub file_content: String,
    pub host_path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvVar {
    pub attr_name: String,
    pub attr_value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Probe {
    pub scheme: String,
    pub path: String,
    pub cmd: String,
    pub initial_delay_second: u32,
    pub period_second: u32,
    pub failure_threshold: u32,
    pub timeout_second: u32,
    pub port: u16,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Plugin {
    pub plugin_key: String,
    pub plugin_name: String,
    pub share_image: String,
    pub plugin_image: ImageInfo,
}

impl Plugin {
    pub fn display_name(&self) -> String {
        let name = decode_escapes(&self.plugin_name);
        if name.is_empty() {
            self.plugin_key.clone()
        } else {
            name
        }
    }
}

/// Online jobs ship metadata only; offline jobs also bundle images and must
/// not leak registry credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportMode {
    Online,
    Offline,
}

impl fmt::Display for ExportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportMode::Online => write!(f, "online"),
            ExportMode::Offline => write!(f, "offline"),
        }
    }
}

impl FromStr for ExportMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "online" => Ok(ExportMode::Online),
            "offline" => Ok(ExportMode::Offline),
            other => Err(format!(
                "unsupported export mode '{other}' (expected 'online' or 'offline')"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sparse_descriptor_deserializes_with_defaults() {
        let raw = r#"{
            "app_name": "demo",
            "app_version": "1.0",
            "components": [{ "component_key": "web", "share_image": "demo:1.0" }]
        }"#;
        let app: ApplicationDescriptor = serde_json::from_str(raw).unwrap();

        assert_eq!(app.components.len(), 1);
        let web = &app.components[0];
        assert_eq!(web.replicas, 1);
        assert_eq!(web.cpu, 0);
        assert!(web.ports.is_empty());
        assert!(web.app_image.is_empty());
        assert!(app.plugins.is_empty());
    }

    #[test]
    fn display_name_decodes_escapes_and_falls_back_to_key() {
        let mut component = Component {
            component_key: "gr123".into(),
            service_cname: "  \\u4e2d\\u6587 ".into(),
            ..Default::default()
        };
        assert_eq!(component.display_name(), "中文");

        component.service_cname.clear();
        assert_eq!(component.display_name(), "gr123");
    }

    #[test]
    fn export_mode_parses_case_insensitively() {
        assert_eq!("Offline".parse::<ExportMode>().unwrap(), ExportMode::Offline);
        assert_eq!(" online ".parse::<ExportMode>().unwrap(), ExportMode::Online);
        assert!("sometimes".parse::<ExportMode>().is_err());
    }
}
