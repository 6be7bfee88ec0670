use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use hostpack_core::{Error, PackageId, PackageManifest, Result};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::fs_utils::remove_file_if_exists;
use crate::process::{run_with_timeout, ProcessOutput};

pub const DEFAULT_UNIT_DIR: &str = "/etc/systemd/system";
pub const SERVICE_COMMAND_TIMEOUT: Duration = Duration::from_secs(60);
const UNIT_PREFIX: &str = "hostpack-";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceStatus {
    Running,
    Stopped,
    Absent,
}

impl ServiceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Absent => "absent",
        }
    }
}

/// OS service definition declared by a package.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    #[serde(default)]
    pub description: Option<String>,
    pub exec_start: String,
    #[serde(default)]
    pub working_directory: Option<PathBuf>,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
    #[serde(default)]
    pub after: Vec<String>,
    #[serde(default)]
    pub restart: Option<String>,
}

impl ServiceConfig {
    /// `None` when the package declares no service.
    pub fn from_manifest(manifest: &PackageManifest) -> Result<Option<Self>> {
        let Some(raw) = &manifest.service_config else {
            return Ok(None);
        };
        let config = Self::deserialize(raw).map_err(|err| Error::Service {
            name: manifest.pkg_id.to_string(),
            message: format!("invalid service_config: {err}"),
        })?;
        if config.exec_start.trim().is_empty() {
            return Err(Error::Service {
                name: manifest.pkg_id.to_string(),
                message: "invalid service_config: exec_start is empty".to_string(),
            });
        }
        Ok(Some(config))
    }
}

/// Registration and control of package services.
///
/// `start` and `stop` succeed without action when the service already is in
/// the requested state.
pub trait ServiceManager {
    fn register(&self, pkg_id: &PackageId, config: &ServiceConfig) -> Result<()>;
    fn remove(&self, pkg_id: &PackageId) -> Result<()>;
    fn start(&self, pkg_id: &PackageId) -> Result<()>;
    fn stop(&self, pkg_id: &PackageId) -> Result<()>;
    fn status(&self, pkg_id: &PackageId) -> Result<ServiceStatus>;
}

/// systemd-backed service manager writing one unit file per package.
pub struct SystemdServiceManager<Run = fn(&mut Command) -> Result<ProcessOutput>> {
    unit_dir: PathBuf,
    run: Run,
}

impl SystemdServiceManager {
    pub fn new(unit_dir: impl Into<PathBuf>) -> Self {
        Self::with_runner(unit_dir, run_systemctl)
    }
}

impl<Run> SystemdServiceManager<Run>
where
    Run: Fn(&mut Command) -> Result<ProcessOutput>,
{
    pub fn with_runner(unit_dir: impl Into<PathBuf>, run: Run) -> Self {
        Self {
            unit_dir: unit_dir.into(),
            run,
        }
    }

    pub fn unit_name(pkg_id: &PackageId) -> String {
        format!("{UNIT_PREFIX}{}.service", pkg_id.name())
    }

    pub fn unit_path(&self, pkg_id: &PackageId) -> PathBuf {
        self.unit_dir.join(Self::unit_name(pkg_id))
    }

    fn systemctl(&self, pkg_id: &PackageId, args: &[&str]) -> Result<ProcessOutput> {
        let mut command = Command::new("systemctl");
        command.args(args);
        (self.run)(&mut command).map_err(|err| Error::Service {
            name: Self::unit_name(pkg_id),
            message: format!("systemctl {}: {err}", args.join(" ")),
        })
    }

    fn systemctl_checked(&self, pkg_id: &PackageId, args: &[&str]) -> Result<()> {
        let output = self.systemctl(pkg_id, args)?;
        if output.success() {
            return Ok(());
        }
        Err(Error::Service {
            name: Self::unit_name(pkg_id),
            message: format!(
                "systemctl {} failed with {}: stderr='{}'",
                args.join(" "),
                output.describe_status(),
                output.stderr.trim()
            ),
        })
    }
}

impl<Run> ServiceManager for SystemdServiceManager<Run>
where
    Run: Fn(&mut Command) -> Result<ProcessOutput>,
{
    fn register(&self, pkg_id: &PackageId, config: &ServiceConfig) -> Result<()> {
        let unit = Self::unit_name(pkg_id);
        let path = self.unit_path(pkg_id);
        fs::create_dir_all(&self.unit_dir)
            .map_err(|err| Error::storage("create directory", &self.unit_dir, err))?;
        fs::write(&path, render_unit(pkg_id, config))
            .map_err(|err| Error::storage("write service unit", &path, err))?;

        self.systemctl_checked(pkg_id, &["daemon-reload"])?;
        self.systemctl_checked(pkg_id, &["enable", &unit])?;
        info!(package = %pkg_id, %unit, "registered service");
        Ok(())
    }

    fn remove(&self, pkg_id: &PackageId) -> Result<()> {
        let unit = Self::unit_name(pkg_id);
        let path = self.unit_path(pkg_id);
        if !path.exists() {
            debug!(package = %pkg_id, %unit, "service not registered, nothing to remove");
            return Ok(());
        }

        self.systemctl_checked(pkg_id, &["disable", &unit])?;
        remove_file_if_exists(&path)
            .map_err(|err| Error::storage("remove service unit", &path, err))?;
        self.systemctl_checked(pkg_id, &["daemon-reload"])?;
        info!(package = %pkg_id, %unit, "removed service");
        Ok(())
    }

    fn start(&self, pkg_id: &PackageId) -> Result<()> {
        let unit = Self::unit_name(pkg_id);
        match self.status(pkg_id)? {
            ServiceStatus::Running => {
                warn!(package = %pkg_id, %unit, "service already running");
                Ok(())
            }
            ServiceStatus::Absent => Err(Error::Service {
                name: unit,
                message: "service is not registered".to_string(),
            }),
            ServiceStatus::Stopped => {
                self.systemctl_checked(pkg_id, &["start", &unit])?;
                let status = self.status(pkg_id)?;
                if status != ServiceStatus::Running {
                    return Err(Error::Service {
                        name: unit,
                        message: format!("service failed to start (status {})", status.as_str()),
                    });
                }
                info!(package = %pkg_id, %unit, "started service");
                Ok(())
            }
        }
    }

    fn stop(&self, pkg_id: &PackageId) -> Result<()> {
        let unit = Self::unit_name(pkg_id);
        match self.status(pkg_id)? {
            ServiceStatus::Running => {
                self.systemctl_checked(pkg_id, &["stop", &unit])?;
                info!(package = %pkg_id, %unit, "stopped service");
                Ok(())
            }
            status => {
                debug!(package = %pkg_id, %unit, status = status.as_str(), "service not running");
                Ok(())
            }
        }
    }

    fn status(&self, pkg_id: &PackageId) -> Result<ServiceStatus> {
        if !self.unit_path(pkg_id).exists() {
            return Ok(ServiceStatus::Absent);
        }
        let unit = Self::unit_name(pkg_id);
        let output = self.systemctl(pkg_id, &["is-active", &unit])?;
        Ok(match output.stdout.trim() {
            "active" | "activating" | "reloading" => ServiceStatus::Running,
            _ => ServiceStatus::Stopped,
        })
    }
}

fn run_systemctl(command: &mut Command) -> Result<ProcessOutput> {
    run_with_timeout(command, SERVICE_COMMAND_TIMEOUT).map_err(|err| Error::Service {
        name: "systemctl".to_string(),
        message: err.to_string(),
    })
}

pub(crate) fn render_unit(pkg_id: &PackageId, config: &ServiceConfig) -> String {
    let mut unit = String::from("[Unit]\n");
    let description = config
        .description
        .clone()
        .unwrap_or_else(|| format!("hostpack package {pkg_id}"));
    let _ = writeln!(unit, "Description={description}");
    if !config.after.is_empty() {
        let _ = writeln!(unit, "After={}", config.after.join(" "));
    }

    unit.push_str("\n[Service]\nType=simple\n");
    let _ = writeln!(unit, "ExecStart={}", config.exec_start);
    if let Some(dir) = &config.working_directory {
        let _ = writeln!(unit, "WorkingDirectory={}", dir.display());
    }
    for (key, value) in &config.environment {
        let _ = writeln!(unit, "Environment=\"{key}={value}\"");
    }
    let _ = writeln!(
        unit,
        "Restart={}",
        config.restart.as_deref().unwrap_or("on-failure")
    );

    unit.push_str("\n[Install]\nWantedBy=multi-user.target\n");
    unit
}
