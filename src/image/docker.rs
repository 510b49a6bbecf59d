//! [`ImageClient`] backed by the `docker` command line.
//!
//! Credentialed pulls log in against a throwaway `DOCKER_CONFIG` directory
//! owned by that one pull, so registry secrets never reach the user's
//! `~/.docker/config.json` and concurrent jobs never share a login.

use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tempfile::TempDir;

use super::{ImageClient, ImageClientError};
use crate::model::ImageInfo;

const POLL_INTERVAL: Duration = Duration::from_millis(50);
const DEFAULT_REGISTRY: &str = "docker.io";
const DOCKER_CONFIG_ENV: &str = "DOCKER_CONFIG";

#[derive(Debug, Clone)]
pub struct DockerCli {
    program: PathBuf,
}

impl Default for DockerCli {
    fn default() -> Self {
        Self {
            program: PathBuf::from("docker"),
        }
    }
}

impl DockerCli {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific binary instead of `docker` from PATH.
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Locate `docker` in PATH.
    pub fn detect() -> Option<Self> {
        which::which("docker").ok().map(Self::with_program)
    }

    fn command(&self, auth_dir: Option<&Path>) -> Command {
        let mut cmd = Command::new(&self.program);
        if let Some(dir) = auth_dir {
            cmd.env(DOCKER_CONFIG_ENV, dir);
        }
        cmd
    }
}

impl ImageClient for DockerCli {
    fn pull(
        &self,
        reference: &str,
        credentials: &ImageInfo,
        timeout: Duration,
    ) -> Result<String, ImageClientError> {
        let deadline = Deadline::new(timeout);

        // Dropped at the end of this call, taking the stored login with it.
        let auth_dir = if credentials.has_login() {
            let dir = tempfile::Builder::new()
                .prefix("app-export-docker-")
                .tempdir()
                .map_err(|source| ImageClientError::AuthDir { source })?;
            Some(dir)
        } else {
            None
        };
        let auth_path = auth_dir.as_ref().map(TempDir::path);

        if auth_path.is_some() {
            let registry = registry_host(reference, &credentials.hub_url);
            let mut cmd = self.command(auth_path);
            cmd.args(["login", "--username", &credentials.hub_user, "--password-stdin"])
                .arg(&registry);
            run_until(
                cmd,
                &format!("docker login {registry}"),
                Some(credentials.hub_password.as_bytes()),
                &deadline,
            )?;
        }

        let mut cmd = self.command(auth_path);
        cmd.args(["pull", reference]);
        run_until(cmd, &format!("docker pull {reference}"), None, &deadline)?;
        Ok(reference.to_string())
    }

    fn save(&self, destination: &Path, images: &[String]) -> Result<(), ImageClientError> {
        let label = format!("docker save -o {}", destination.display());
        let output = self
            .command(None)
            .arg("save")
            .arg("-o")
            .arg(destination)
            .args(images)
            .output()
            .map_err(|source| ImageClientError::Spawn {
                command: label.clone(),
                source,
            })?;
        check_status(&label, &output)
    }
}

/// One time budget shared by every command of a pull.
struct Deadline {
    at: Instant,
    budget: Duration,
}

impl Deadline {
    fn new(budget: Duration) -> Self {
        Self {
            at: Instant::now() + budget,
            budget,
        }
    }

    fn expired(&self) -> bool {
        Instant::now() >= self.at
    }
}

/// Registry host to log into for `reference`.
///
/// An explicit hub URL wins; otherwise the first path segment is a registry
/// when it looks like a host (`.`/`:` or `localhost`), else Docker Hub.
pub(crate) fn registry_host(reference: &str, hub_url: &str) -> String {
    let hub_url = hub_url.trim();
    if !hub_url.is_empty() {
        let host = hub_url
            .trim_start_matches("https://")
            .trim_start_matches("http://");
        return host.trim_end_matches('/').to_string();
    }
    match reference.split_once('/') {
        Some((first, _)) if first.contains('.') || first.contains(':') || first == "localhost" => {
            first.to_string()
        }
        _ => DEFAULT_REGISTRY.to_string(),
    }
}

/// Run `cmd` to completion or kill it once `deadline` passes.
///
/// Stderr is drained on a helper thread while the child runs, so a chatty
/// child never stalls on a full pipe.
fn run_until(
    mut cmd: Command,
    label: &str,
    stdin: Option<&[u8]>,
    deadline: &Deadline,
) -> Result<(), ImageClientError> {
    let spawn_err = |source| ImageClientError::Spawn {
        command: label.to_string(),
        source,
    };
    let timeout_err = || ImageClientError::Timeout {
        command: label.to_string(),
        timeout: deadline.budget,
    };

    if deadline.expired() {
        return Err(timeout_err());
    }

    let mut child = cmd
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(spawn_err)?;

    let stderr_reader = child.stderr.take().map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = String::new();
            let _ = pipe.read_to_string(&mut buf);
            buf
        })
    });

    if let (Some(data), Some(mut pipe)) = (stdin, child.stdin.take()) {
        // A child that exits without reading its input is judged by its
        // exit status, not by the broken pipe.
        if let Err(err) = pipe.write_all(data) {
            if err.kind() != io::ErrorKind::BrokenPipe {
                let _ = child.kill();
                let _ = child.wait();
                return Err(spawn_err(err));
            }
        }
    }

    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) if deadline.expired() => {
                let _ = child.kill();
                let _ = child.wait();
                // The reader thread is left to finish on its own; a killed
                // child's descendants may still hold the pipe open.
                return Err(timeout_err());
            }
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(source) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(spawn_err(source));
            }
        }
    };

    let stderr = stderr_reader
        .and_then(|reader| reader.join().ok())
        .unwrap_or_default();
    if status.success() {
        return Ok(());
    }
    Err(ImageClientError::Failed {
        command: label.to_string(),
        status: status.to_string(),
        stderr: stderr.trim().to_string(),
    })
}

fn check_status(label: &str, output: &Output) -> Result<(), ImageClientError> {
    if output.status.success() {
        return Ok(());
    }
    Err(ImageClientError::Failed {
        command: label.to_string(),
        status: output.status.to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::write_script;
    use std::fs;
    use tempfile::TempDir;

    fn fake_docker(dir: &Path, body: &str) -> PathBuf {
        write_script(dir, "docker", body)
    }

    fn robot() -> ImageInfo {
        ImageInfo {
            hub_user: "robot".into(),
            hub_password: "s3cret".into(),
            ..Default::default()
        }
    }

    #[test]
    fn registry_host_resolution() {
        assert_eq!(registry_host("nginx:1.25", ""), "docker.io");
        assert_eq!(registry_host("library/nginx", ""), "docker.io");
        assert_eq!(
            registry_host("registry.example.com/team/app:1", ""),
            "registry.example.com"
        );
        assert_eq!(registry_host("localhost:5000/app", ""), "localhost:5000");
        assert_eq!(registry_host("localhost/app", ""), "localhost");
        assert_eq!(
            registry_host("app:1", "https://hub.example.com/"),
            "hub.example.com"
        );
    }

    #[test]
    fn pull_returns_reference_on_success() {
        let temp = TempDir::new().unwrap();
        let docker = DockerCli::with_program(fake_docker(temp.path(), "exit 0"));

        let name = docker
            .pull("demo:1.0", &ImageInfo::default(), Duration::from_secs(5))
            .unwrap();
        assert_eq!(name, "demo:1.0");
    }

    #[test]
    fn pull_failure_captures_stderr() {
        let temp = TempDir::new().unwrap();
        let docker = DockerCli::with_program(fake_docker(
            temp.path(),
            "echo 'manifest unknown' >&2\nexit 1",
        ));

        let err = docker
            .pull("demo:missing", &ImageInfo::default(), Duration::from_secs(5))
            .unwrap_err();
        match err {
            ImageClientError::Failed { stderr, .. } => assert_eq!(stderr, "manifest unknown"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn pull_is_killed_after_timeout() {
        let temp = TempDir::new().unwrap();
        let docker = DockerCli::with_program(fake_docker(temp.path(), "sleep 5"));

        let started = Instant::now();
        let err = docker
            .pull("slow:1", &ImageInfo::default(), Duration::from_millis(200))
            .unwrap_err();
        assert!(matches!(err, ImageClientError::Timeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn slow_login_counts_against_pull_timeout() {
        let temp = TempDir::new().unwrap();
        let docker = DockerCli::with_program(fake_docker(
            temp.path(),
            "if [ \"$1\" = login ]; then sleep 4; fi",
        ));

        let started = Instant::now();
        let err = docker
            .pull(
                "registry.example.com/app:1",
                &robot(),
                Duration::from_millis(200),
            )
            .unwrap_err();

        match err {
            ImageClientError::Timeout { command, .. } => {
                assert_eq!(command, "docker login registry.example.com")
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[test]
    fn large_stderr_does_not_stall_pull() {
        let temp = TempDir::new().unwrap();
        let docker = DockerCli::with_program(fake_docker(
            temp.path(),
            "head -c 200000 /dev/zero | tr '\\0' x >&2\nexit 0",
        ));

        let name = docker
            .pull("app:1", &ImageInfo::default(), Duration::from_secs(3))
            .unwrap();
        assert_eq!(name, "app:1");
    }

    #[test]
    fn large_stderr_is_kept_on_failure() {
        let temp = TempDir::new().unwrap();
        let docker = DockerCli::with_program(fake_docker(
            temp.path(),
            "head -c 200000 /dev/zero | tr '\\0' x >&2\nexit 3",
        ));

        let err = docker
            .pull("app:1", &ImageInfo::default(), Duration::from_secs(3))
            .unwrap_err();
        match err {
            ImageClientError::Failed { stderr, .. } => assert_eq!(stderr.len(), 200_000),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn credentialed_pulls_use_private_config_dir() {
        let temp = TempDir::new().unwrap();
        let log = temp.path().join("calls.log");
        let docker = DockerCli::with_program(fake_docker(
            temp.path(),
            &format!(
                "[ -d \"$DOCKER_CONFIG\" ] || exit 9\n\
                 if [ \"$1\" = login ]; then\n\
                 read -r password\n\
                 echo \"login $DOCKER_CONFIG $password\" >> {log}\n\
                 else\n\
                 echo \"$1 $DOCKER_CONFIG\" >> {log}\n\
                 fi",
                log = log.display()
            ),
        ));

        docker
            .pull("hub.example.com/a:1", &robot(), Duration::from_secs(5))
            .unwrap();
        docker
            .pull("hub.example.com/b:1", &robot(), Duration::from_secs(5))
            .unwrap();

        let logged = fs::read_to_string(&log).unwrap();
        let lines: Vec<Vec<&str>> = logged
            .lines()
            .map(|l| l.split_whitespace().collect())
            .collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0][0], "login");
        assert_eq!(lines[0][2], "s3cret");
        assert_eq!(lines[1][0], "pull");

        let first = lines[0][1];
        let second = lines[2][1];
        // login and pull of one call share a directory; calls never do
        assert_eq!(lines[1][1], first);
        assert_eq!(lines[3][1], second);
        assert_ne!(first, second);
        // and it is gone once the pull returns
        assert!(!Path::new(first).exists());
        assert!(!Path::new(second).exists());
    }

    #[test]
    fn anonymous_pull_skips_login() {
        let temp = TempDir::new().unwrap();
        let log = temp.path().join("calls.log");
        let docker = DockerCli::with_program(fake_docker(
            temp.path(),
            &format!("echo \"$1\" >> {}", log.display()),
        ));

        docker
            .pull("app:1", &ImageInfo::default(), Duration::from_secs(5))
            .unwrap();

        assert_eq!(fs::read_to_string(&log).unwrap().trim(), "pull");
    }

    #[test]
    fn save_passes_all_images_in_one_call() {
        let temp = TempDir::new().unwrap();
        let log = temp.path().join("args.log");
        let docker = DockerCli::with_program(fake_docker(
            temp.path(),
            &format!("echo \"$@\" >> {}", log.display()),
        ));
        let dest = temp.path().join("images.tar");

        docker
            .save(&dest, &["a:1".to_string(), "b:2".to_string()])
            .unwrap();

        let logged = fs::read_to_string(&log).unwrap();
        assert_eq!(logged.trim(), format!("save -o {} a:1 b:2", dest.display()));
    }
}
