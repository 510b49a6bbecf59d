//! Nested container manifest (`files/image.json`) and package descriptor
//! (`package.json`) for cpk packages.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{ExportContext, ExportFormat, FormatKind};
use crate::archive::Compression;
use crate::cancel::CancelFlag;
use crate::config::{ExportConfig, VendorConfig};
use crate::error::Result;
use crate::model::{ApplicationDescriptor, Component, Port, Probe};
use crate::pipeline::{default_pipeline, Pipeline};

const DEFAULT_PORT: u16 = 80;
const DEFAULT_PROTOCOL: &str = "tcp";
/// Placeholder start command that means "use the image entrypoint".
const PLACEHOLDER_CMD: &str = "start web";

/// How the inner application id is derived from the base identifier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppIdLayout {
    /// Inner app id equals the manifest id.
    #[default]
    Base,
    /// Inner app id is the base id written twice, for consumers that still
    /// expect the legacy layout.
    Doubled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageManifest {
    pub apps: Vec<App>,
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct App {
    pub cmd: String,
    pub constraints: Vec<Vec<String>>,
    pub container: Container,
    pub cpus: f64,
    pub dependencies: Vec<String>,
    pub disk: u32,
    pub health_checks: Vec<HealthCheck>,
    pub id: String,
    pub instances: u32,
    pub labels: BTreeMap<String, String>,
    pub env: BTreeMap<String, String>,
    pub mem: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Container {
    pub docker: Docker,
    #[serde(rename = "type")]
    pub kind: String,
    pub volumes: Vec<VolumeMapping>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Docker {
    pub force_pull_image: bool,
    pub image: String,
    pub network: String,
    pub parameters: Vec<Parameter>,
    pub port_mappings: Vec<PortMapping>,
    pub privileged: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortMapping {
    pub container_port: u16,
    pub host_port: u16,
    pub labels: BTreeMap<String, String>,
    pub name: String,
    pub protocol: String,
    pub service_port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeMapping {
    pub container_path: String,
    pub host_path: String,
    pub mode: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheck {
    pub grace_period_seconds: u32,
    #[serde(rename = "ignoreHttp1xx")]
    pub ignore_http1xx: bool,
    pub interval_seconds: u32,
    pub max_consecutive_failures: u32,
    pub path: String,
    pub port_index: u16,
    pub protocol: String,
    pub timeout_seconds: u32,
}

/// `<prefix>.<component_key>`, the package id and file-name stem.
pub fn package_id(prefix: &str, component: &Component) -> String {
    format!("{prefix}.{}", component.component_key)
}

/// `/<prefix>.<component_key>-<deploy_version>`, the manifest id.
pub fn manifest_id(prefix: &str, component: &Component) -> String {
    format!(
        "/{}-{}",
        package_id(prefix, component),
        component.deploy_version
    )
}

/// File name of the component image archive under `files/image/`.
pub fn image_archive_name(prefix: &str, component: &Component) -> String {
    format!(
        "{}_{}.tar",
        package_id(prefix, component),
        component.deploy_version
    )
}

/// Map one component onto the nested container manifest.
pub fn build_image_manifest(
    component: &Component,
    prefix: &str,
    layout: AppIdLayout,
) -> ImageManifest {
    let port_mappings = map_ports(&component.ports);
    let health_checks = map_probes(&component.probes, &port_mappings);
    let id = manifest_id(prefix, component);
    let app_id = match layout {
        AppIdLayout::Base => id.clone(),
        AppIdLayout::Doubled => format!("{id}{id}"),
    };
    let cmd = if component.cmd == PLACEHOLDER_CMD {
        String::new()
    } else {
        component.cmd.clone()
    };

    let app = App {
        cmd,
        constraints: Vec::new(),
        container: Container {
            docker: Docker {
                force_pull_image: false,
                image: component.share_image.clone(),
                network: "BRIDGE".to_string(),
                parameters: map_envs(component),
                port_mappings,
                privileged: false,
            },
            kind: "DOCKER".to_string(),
            volumes: map_volumes(component),
        },
        cpus: cpus(component.cpu),
        dependencies: Vec::new(),
        disk: 0,
        health_checks,
        id: app_id,
        instances: component.replicas.max(1),
        labels: component.labels.clone(),
        env: BTreeMap::new(),
        mem: component.memory,
    };

    ImageManifest {
        apps: vec![app],
        id,
    }
}

/// Whole CPUs for a milli-CPU request, never below one.
pub fn cpus(milli_cpu: u32) -> f64 {
    if milli_cpu == 0 {
        return 1.0;
    }
    (f64::from(milli_cpu) / 1000.0).ceil().max(1.0)
}

fn normalize_protocol(protocol: &str) -> &'static str {
    match protocol {
        "udp" => "udp",
        _ => DEFAULT_PROTOCOL,
    }
}

fn port_mapping(container_port: u16, protocol: &str) -> PortMapping {
    PortMapping {
        container_port,
        host_port: 0,
        labels: BTreeMap::new(),
        name: format!("app_{container_port}"),
        protocol: normalize_protocol(protocol).to_string(),
        service_port: 0,
    }
}

fn map_ports(ports: &[Port]) -> Vec<PortMapping> {
    if ports.is_empty() {
        return vec![port_mapping(DEFAULT_PORT, DEFAULT_PROTOCOL)];
    }
    ports
        .iter()
        .map(|port| port_mapping(port.container_port, &port.protocol))
        .collect()
}

fn map_envs(component: &Component) -> Vec<Parameter> {
    component
        .envs
        .iter()
        .map(|env| Parameter {
            key: env.attr_name.clone(),
            value: env.attr_value.clone(),
        })
        .collect()
}

fn map_probes(probes: &[Probe], ports: &[PortMapping]) -> Vec<HealthCheck> {
    if probes.is_empty() {
        let port_index = ports.first().map_or(DEFAULT_PORT, |p| p.container_port);
        return vec![HealthCheck {
            grace_period_seconds: 300,
            ignore_http1xx: false,
            interval_seconds: 60,
            max_consecutive_failures: 3,
            path: String::new(),
            port_index,
            protocol: "TCP".to_string(),
            timeout_seconds: 20,
        }];
    }

    probes
        .iter()
        .map(|probe| {
            let scheme = probe.scheme.to_uppercase();
            let (protocol, path) = if scheme == "CMD" {
                ("COMMAND".to_string(), probe.cmd.clone())
            } else {
                (scheme, probe.path.clone())
            };
            HealthCheck {
                grace_period_seconds: probe.initial_delay_second,
                ignore_http1xx: false,
                interval_seconds: probe.period_second,
                max_consecutive_failures: probe.failure_threshold,
                path,
                port_index: probe.port,
                protocol,
                timeout_seconds: probe.timeout_second,
            }
        })
        .collect()
}

fn map_volumes(component: &Component) -> Vec<VolumeMapping> {
    component
        .volumes
        .iter()
        .map(|volume| VolumeMapping {
            container_path: volume.volume_mount_path.clone(),
            host_path: join_host_path(&component.component_key, &volume.volume_mount_path),
            mode: "RW".to_string(),
        })
        .collect()
}

/// Join the component key and a mount path, then clean the result
/// lexically: empty and `.` segments dropped, `..` folded into its parent.
fn join_host_path(component_key: &str, mount_path: &str) -> String {
    let joined = [component_key, mount_path]
        .iter()
        .filter(|part| !part.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("/");
    if joined.is_empty() {
        return joined;
    }
    clean_path(&joined)
}

fn clean_path(path: &str) -> String {
    let rooted = path.starts_with('/');
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => match segments.last() {
                Some(&last) if last != ".." => {
                    segments.pop();
                }
                // `..` at the root stays at the root
                _ if rooted => {}
                _ => segments.push(".."),
            },
            other => segments.push(other),
        }
    }

    let body = segments.join("/");
    match (rooted, body.is_empty()) {
        (true, _) => format!("/{body}"),
        (false, true) => ".".to_string(),
        (false, false) => body,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageJson {
    pub architecture: String,
    pub browser: Browser,
    pub category: String,
    pub classification: String,
    pub count: u32,
    pub description: String,
    pub genericname: String,
    pub glibc: String,
    pub id: String,
    pub name: String,
    pub news: String,
    pub os: String,
    pub permission: Permission,
    pub runtime: String,
    pub scripts: Scripts,
    pub search: String,
    pub secret: String,
    pub size: String,
    pub start: String,
    pub summary: String,
    pub todo: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub vendor: Vendor,
    pub version: String,
    pub web: Web,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Browser {
    pub height: String,
    pub width: String,
    pub x: String,
    pub y: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub dbus: bool,
    pub display: bool,
    pub filesystem: String,
    pub ipc: bool,
    pub network: bool,
    pub root: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scripts {
    pub enter: String,
    pub postinst: String,
    pub postrm: String,
    pub postup: String,
    pub preinst: String,
    pub prerm: String,
    pub prestart: String,
    pub preup: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vendor {
    pub description: String,
    pub email: String,
    pub homepage: String,
    pub name: String,
    pub telephone: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Web {
    pub application: String,
    pub database: Database,
    pub middleware: WebLayer,
    pub runtime: WebLayer,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Database {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebLayer {
    pub extensions: String,
    pub name: String,
    pub version: String,
}

pub fn build_package_json(
    component: &Component,
    prefix: &str,
    vendor: &VendorConfig,
) -> PackageJson {
    PackageJson {
        architecture: component.arch.clone(),
        category: "application".to_string(),
        classification: "L0".to_string(),
        count: 5,
        description: vendor.summary.clone(),
        genericname: component.component_key.clone(),
        id: package_id(prefix, component),
        name: component.component_key.clone(),
        news: vendor.summary.clone(),
        os: "all".to_string(),
        start: "/".to_string(),
        summary: vendor.summary.clone(),
        kind: "web".to_string(),
        vendor: Vendor {
            homepage: vendor.homepage.clone(),
            name: vendor.name.clone(),
            email: vendor.email.clone(),
            telephone: vendor.telephone.clone(),
            description: String::new(),
        },
        version: component.deploy_version.clone(),
        ..Default::default()
    }
}

/// cpk packages: one component staged through a [`Pipeline`], bzip2
/// compressed.
pub struct CpkFormat {
    prefix: String,
    extension: String,
    pipeline: Pipeline,
}

impl CpkFormat {
    pub fn new(config: &ExportConfig, cancel: &CancelFlag) -> Self {
        Self::with_pipeline(config, default_pipeline(config, cancel))
    }

    /// Use a caller-built step list instead of the default one.
    pub fn with_pipeline(config: &ExportConfig, pipeline: Pipeline) -> Self {
        Self {
            prefix: config.namespace_prefix.clone(),
            extension: config.package_extension.clone(),
            pipeline,
        }
    }
}

impl ExportFormat for CpkFormat {
    fn kind(&self) -> FormatKind {
        FormatKind::Cpk
    }

    fn package_name(&self, app: &ApplicationDescriptor) -> String {
        match app.components.first() {
            Some(component) => format!(
                "{}_v{}_{}.{}",
                package_id(&self.prefix, component),
                app.app_version,
                component.arch,
                self.extension
            ),
            None => format!("null-app.{}", self.extension),
        }
    }

    fn compression(&self) -> Compression {
        Compression::Bzip2
    }

    fn bundles_offline_images(&self) -> bool {
        false
    }

    fn write_manifest(
        &self,
        ctx: &ExportContext<'_>,
        app: &mut ApplicationDescriptor,
    ) -> Result<()> {
        let Some(first) = app.components.first() else {
            tracing::warn!(
                app = %app.app_name,
                "application has no components, staging empty package"
            );
            return Ok(());
        };
        if app.components.len() > 1 {
            tracing::warn!(
                app = %app.app_name,
                skipped = app.components.len() - 1,
                "cpk packages carry only the first component"
            );
        }
        let mut component = first.clone();
        component.deploy_version = app.app_version.clone();

        self.pipeline
            .run(ctx.staging_dir, &component, ctx.image_client, ctx.cancel)
    }
}
