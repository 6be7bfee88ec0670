use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use hostpack_core::{Error, PackageManifest, Result};
use tracing::{debug, info};

use crate::fs_utils::{is_reserved_name, make_tmp_dir, remove_dir_if_exists};
use crate::template::{render_template, rendered_name};
use crate::{InstallationStorage, ResourceContext};

/// Deploys rendered package configuration into the shared config directory.
#[derive(Debug, Clone, Copy)]
pub struct ConfigManager<'a> {
    storage: &'a InstallationStorage,
}

impl<'a> ConfigManager<'a> {
    pub fn new(storage: &'a InstallationStorage) -> Self {
        Self { storage }
    }

    /// Renders every file of the package's `conf` source tree into
    /// `<cfg_dir>/<name>/`, returning the deployed paths.
    ///
    /// All files are rendered into a staging directory first, so a template
    /// error leaves the destination untouched.
    pub fn setup_conf(
        &self,
        manifest: &PackageManifest,
        context: &ResourceContext<'_>,
    ) -> Result<Vec<PathBuf>> {
        let pkg_id = &manifest.pkg_id;
        let source_dir = self.storage.package_conf_source_dir(pkg_id);
        validate_source_dir(&source_dir)?;

        let mut sources = Vec::new();
        collect_sources(&source_dir, Path::new(""), &mut sources)?;

        let plain_items = context.items(false);
        let json_items = context.items(true);
        let staging = make_tmp_dir(self.storage, &format!("conf-{}", pkg_id.name()))?;
        let rendered = render_all(&source_dir, &staging, &sources, |name| {
            if name.ends_with(".json") {
                &json_items
            } else {
                &plain_items
            }
        });
        let result = rendered.and_then(|outputs| {
            let destination = self.storage.package_config_dir(pkg_id.name());
            deploy(&staging, &destination, &outputs)
        });
        let _ = fs::remove_dir_all(&staging);

        let deployed = result?;
        info!(package = %pkg_id, files = deployed.len(), "deployed package configuration");
        Ok(deployed)
    }

    pub fn teardown_conf(&self, manifest: &PackageManifest) -> Result<()> {
        let dir = self.storage.package_config_dir(manifest.name());
        remove_dir_if_exists(&dir)
            .map_err(|err| Error::storage("remove package configuration", &dir, err))?;
        debug!(package = %manifest.pkg_id, dir = %dir.display(), "removed package configuration");
        Ok(())
    }
}

fn invalid(path: &Path, reason: impl Into<String>) -> Error {
    Error::PkgConfInvalid {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

/// Existence, then symlink, then reserved name, then directory type.
fn validate_source_dir(path: &Path) -> Result<()> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            return Err(invalid(path, "does not exist"));
        }
        Err(err) => return Err(invalid(path, err.to_string())),
    };
    if metadata.file_type().is_symlink() {
        return Err(invalid(path, "is a symbolic link"));
    }
    if is_reserved_name(path) {
        return Err(invalid(path, "is a reserved name"));
    }
    if !metadata.is_dir() {
        return Err(invalid(path, "is not a directory"));
    }
    Ok(())
}

fn collect_sources(root: &Path, rel: &Path, sources: &mut Vec<PathBuf>) -> Result<()> {
    let dir = root.join(rel);
    let mut entries = fs::read_dir(&dir)
        .map_err(|err| invalid(&dir, err.to_string()))?
        .collect::<io::Result<Vec<_>>>()
        .map_err(|err| invalid(&dir, err.to_string()))?;
    entries.sort_by_key(|entry| entry.file_name());

    for entry in entries {
        let path = entry.path();
        let rel_path = rel.join(entry.file_name());
        let file_type = entry
            .file_type()
            .map_err(|err| invalid(&path, err.to_string()))?;
        if file_type.is_symlink() {
            return Err(invalid(&path, "is a symbolic link"));
        }
        if is_reserved_name(&path) {
            return Err(invalid(&path, "is a reserved name"));
        }
        if file_type.is_dir() {
            collect_sources(root, &rel_path, sources)?;
        } else if file_type.is_file() {
            sources.push(rel_path);
        }
    }
    Ok(())
}

fn render_all<'i, F>(
    source_dir: &Path,
    staging: &Path,
    sources: &[PathBuf],
    items_for: F,
) -> Result<Vec<PathBuf>>
where
    F: Fn(&str) -> &'i crate::ContextItems,
{
    let mut outputs = Vec::with_capacity(sources.len());
    for rel in sources {
        let source_path = source_dir.join(rel);
        let raw = fs::read_to_string(&source_path)
            .map_err(|err| invalid(&source_path, format!("unreadable template: {err}")))?;

        let rel_name = rel.to_string_lossy().replace('\\', "/");
        let output_rel = PathBuf::from(rendered_name(&rel_name));
        let output_name = rendered_name(&rel_name).to_string();
        let rendered = render_template(&rel_name, &raw, items_for(&output_name))?;

        let staged = staging.join(&output_rel);
        if let Some(parent) = staged.parent() {
            fs::create_dir_all(parent)
                .map_err(|err| Error::storage("create directory", parent, err))?;
        }
        fs::write(&staged, rendered)
            .map_err(|err| Error::storage("write rendered configuration", &staged, err))?;
        debug!(template = %rel_name, output = %output_rel.display(), "rendered configuration file");
        outputs.push(output_rel);
    }
    Ok(outputs)
}

fn deploy(staging: &Path, destination: &Path, outputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut deployed = Vec::with_capacity(outputs.len());
    for rel in outputs {
        let target = destination.join(rel);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .map_err(|err| Error::storage("create directory", parent, err))?;
        }
        fs::copy(staging.join(rel), &target)
            .map_err(|err| Error::storage("deploy configuration file", &target, err))?;
        deployed.push(target);
    }
    if outputs.is_empty() {
        fs::create_dir_all(destination)
            .map_err(|err| Error::storage("create directory", destination, err))?;
    }
    Ok(deployed)
}
