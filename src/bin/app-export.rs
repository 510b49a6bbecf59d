use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use app_export::{
    ApplicationDescriptor, DockerCli, ExportConfig, ExportJob, ExportMode, Exporter, FormatKind,
};
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "APP_EXPORT_LOG";

fn usage() -> &'static str {
    "Usage:
  app-export export <descriptor.json> <cpk|ram> <online|offline> <staging_dir> [config.toml]
  app-export check-config <config.toml>"
}

fn main() -> Result<()> {
    init_logging();
    let args: Vec<String> = std::env::args().skip(1).collect();

    match args.as_slice() {
        [cmd, descriptor, format, mode, staging_dir] if cmd == "export" => {
            export(Path::new(descriptor), format, mode, Path::new(staging_dir), None)
        }
        [cmd, descriptor, format, mode, staging_dir, config] if cmd == "export" => export(
            Path::new(descriptor),
            format,
            mode,
            Path::new(staging_dir),
            Some(Path::new(config)),
        ),
        [cmd, config] if cmd == "check-config" => check_config(Path::new(config)),
        _ => bail!(usage()),
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<ExportConfig> {
    match path {
        Some(path) => Ok(ExportConfig::load(path)?),
        None => Ok(ExportConfig::default()),
    }
}

fn check_config(path: &Path) -> Result<()> {
    let config = ExportConfig::load(path)
        .with_context(|| format!("checking export config '{}'", path.display()))?;
    println!(
        "config ok: prefix '{}', archiver '{}', pull timeout {}s",
        config.namespace_prefix,
        config.archiver.display(),
        config.pull_timeout_secs
    );
    Ok(())
}

fn export(
    descriptor: &Path,
    format: &str,
    mode: &str,
    staging_dir: &Path,
    config: Option<&Path>,
) -> Result<()> {
    let format: FormatKind = format.parse().map_err(anyhow::Error::msg)?;
    let mode: ExportMode = mode.parse().map_err(anyhow::Error::msg)?;
    let config = load_config(config)?;

    let raw = fs::read_to_string(descriptor)
        .with_context(|| format!("reading descriptor '{}'", descriptor.display()))?;
    let app: ApplicationDescriptor = serde_json::from_str(&raw)
        .with_context(|| format!("parsing descriptor '{}'", descriptor.display()))?;

    let docker = match DockerCli::detect() {
        Some(docker) => docker,
        None if mode == ExportMode::Offline || format == FormatKind::Cpk => {
            bail!("'docker' not found in PATH; it is required to save images")
        }
        None => DockerCli::new(),
    };

    let job = ExportJob::new(mode, staging_dir, format);
    let result = Exporter::new(job, config, &docker)
        .export(&app)
        .with_context(|| format!("exporting '{}' as {format} ({mode})", app.app_name))?;

    println!("{}", result.package_path.display());
    Ok(())
}
