use std::path::Path;
use std::time::Duration;

use hostpack_core::{Error, PackageManifest, Result};
use serde_json::Value;
use tracing::{debug, info};

use crate::process::{run_with_timeout, shell_command};
use crate::InstallationStorage;

pub const DEFAULT_HOOK_TIMEOUT: Duration = Duration::from_secs(90);
pub const EXEC_EXTERNAL_COMMANDS: &str = "exec_external_commands";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookPhase {
    Install,
    PostInstall,
    Uninstall,
    PostUninstall,
}

impl HookPhase {
    pub fn section(self) -> &'static str {
        match self {
            Self::Install => "install",
            Self::PostInstall => "post_install",
            Self::Uninstall => "uninstall",
            Self::PostUninstall => "post_uninstall",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookCommand {
    pub cmdline: String,
    pub timeout: Duration,
}

/// Runs the external commands a package declares in its `extra_config`.
#[derive(Debug, Clone, Copy)]
pub struct ExtrasManager<'a> {
    storage: &'a InstallationStorage,
}

impl<'a> ExtrasManager<'a> {
    pub fn new(storage: &'a InstallationStorage) -> Self {
        Self { storage }
    }

    pub fn handle_install_extras(&self, manifest: &PackageManifest) -> Result<()> {
        self.handle_extras(manifest, HookPhase::Install)
    }

    pub fn handle_post_install_extras(&self, manifest: &PackageManifest) -> Result<()> {
        self.handle_extras(manifest, HookPhase::PostInstall)
    }

    pub fn handle_uninstall_extras(&self, manifest: &PackageManifest) -> Result<()> {
        self.handle_extras(manifest, HookPhase::Uninstall)
    }

    pub fn handle_post_uninstall_extras(&self, manifest: &PackageManifest) -> Result<()> {
        self.handle_extras(manifest, HookPhase::PostUninstall)
    }

    pub fn handle_extras(&self, manifest: &PackageManifest, phase: HookPhase) -> Result<()> {
        let commands = hook_commands(manifest, phase)?;
        if commands.is_empty() {
            debug!(package = %manifest.pkg_id, phase = phase.section(), "no extras declared");
            return Ok(());
        }

        let package_dir = self.storage.package_dir(&manifest.pkg_id);
        for hook in &commands {
            run_hook(manifest, hook, phase, &package_dir)?;
        }
        Ok(())
    }
}

fn run_hook(
    manifest: &PackageManifest,
    hook: &HookCommand,
    phase: HookPhase,
    package_dir: &Path,
) -> Result<()> {
    info!(
        package = %manifest.pkg_id,
        phase = phase.section(),
        command = %hook.cmdline,
        "running extras command"
    );
    let failure = |reason: String| Error::ExtrasExecution {
        pkg_id: manifest.pkg_id.to_string(),
        command: hook.cmdline.clone(),
        reason,
    };

    let mut command = shell_command(&hook.cmdline);
    if package_dir.is_dir() {
        command.current_dir(package_dir);
    }
    let output = run_with_timeout(&mut command, hook.timeout)
        .map_err(|err| failure(err.to_string()))?;
    debug!(
        package = %manifest.pkg_id,
        stdout = %output.stdout.trim(),
        stderr = %output.stderr.trim(),
        "extras command finished"
    );
    if !output.success() {
        return Err(failure(format!(
            "{}: stdout='{}' stderr='{}'",
            output.describe_status(),
            output.stdout.trim(),
            output.stderr.trim()
        )));
    }
    Ok(())
}

/// Commands declared for `phase`; an absent config or section yields none.
pub fn hook_commands(manifest: &PackageManifest, phase: HookPhase) -> Result<Vec<HookCommand>> {
    let section_name = phase.section();
    let config_error = |reason: String| Error::ExtrasConfig {
        pkg_id: manifest.pkg_id.to_string(),
        reason,
    };

    let Some(extra) = &manifest.extra_config else {
        return Ok(Vec::new());
    };
    let Value::Object(sections) = extra else {
        return Err(config_error("extra_config is not a mapping".to_string()));
    };
    let Some(section) = sections.get(section_name) else {
        return Ok(Vec::new());
    };
    let Value::Object(section) = section else {
        return Err(config_error(format!("section '{section_name}' is not a mapping")));
    };
    let Some(commands) = section.get(EXEC_EXTERNAL_COMMANDS) else {
        return Err(config_error(format!(
            "section '{section_name}' has no '{EXEC_EXTERNAL_COMMANDS}' list"
        )));
    };
    let Value::Array(entries) = commands else {
        return Err(config_error(format!(
            "'{section_name}.{EXEC_EXTERNAL_COMMANDS}' is not a list"
        )));
    };

    entries
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            parse_hook_entry(entry).map_err(|reason| {
                config_error(format!(
                    "'{section_name}.{EXEC_EXTERNAL_COMMANDS}[{index}]': {reason}"
                ))
            })
        })
        .collect()
}

fn parse_hook_entry(entry: &Value) -> std::result::Result<HookCommand, String> {
    let (cmdline, timeout) = match entry {
        Value::String(cmdline) => (cmdline.as_str(), DEFAULT_HOOK_TIMEOUT),
        Value::Object(fields) => {
            let cmdline = fields
                .get("cmdline")
                .and_then(Value::as_str)
                .ok_or_else(|| "entry has no 'cmdline' string".to_string())?;
            let timeout = match fields.get("timeout") {
                None => DEFAULT_HOOK_TIMEOUT,
                Some(value) => match value.as_u64() {
                    Some(secs) if secs > 0 => Duration::from_secs(secs),
                    _ => return Err(format!("invalid timeout {value}")),
                },
            };
            (cmdline, timeout)
        }
        other => return Err(format!("expected a command line or mapping, found {other}")),
    };
    if cmdline.trim().is_empty() {
        return Err("command line is empty".to_string());
    }
    Ok(HookCommand {
        cmdline: cmdline.to_string(),
        timeout,
    })
}
