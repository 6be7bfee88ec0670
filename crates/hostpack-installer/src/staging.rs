use std::fs;
use std::path::Path;

use hostpack_core::{Error, PackageId, PackageManifest, Result};
use hostpack_dstor::{fetch_package_with_retry, DistributionStorage, RetryPolicy};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::archive::unpack_archive;
use crate::fs_utils::{make_tmp_dir, move_dir_or_copy};
use crate::template::render_template;
use crate::{ClusterConfig, ContextItems, InstallationStorage, ResourceContext};

pub const PKGINFO_FILE: &str = "pkginfo.json";
pub const EXTRA_DESCRIPTOR: &str = "extra";
pub const SERVICE_DESCRIPTOR: &str = "svc";

#[derive(Debug, Default, Deserialize)]
struct PackageInfo {
    #[serde(default)]
    requires: Vec<String>,
}

/// Fetches, unpacks and records one package in the package repository.
pub fn stage_package(
    storage: &InstallationStorage,
    driver: &dyn DistributionStorage,
    retry: &RetryPolicy,
    pkg_id: &PackageId,
    cluster: Option<&ClusterConfig>,
) -> Result<PackageManifest> {
    let tmp = make_tmp_dir(storage, &format!("stage-{pkg_id}"))?;
    let result = stage_in(storage, driver, retry, pkg_id, cluster, &tmp);
    let _ = fs::remove_dir_all(&tmp);
    result
}

fn stage_in(
    storage: &InstallationStorage,
    driver: &dyn DistributionStorage,
    retry: &RetryPolicy,
    pkg_id: &PackageId,
    cluster: Option<&ClusterConfig>,
    tmp: &Path,
) -> Result<PackageManifest> {
    let archive = tmp.join(format!("{pkg_id}.tar.xz"));
    fetch_package_with_retry(driver, pkg_id, &archive, retry)?;
    debug!(package = %pkg_id, archive = %archive.display(), "fetched package");

    let extracted = tmp.join("extracted");
    unpack_archive(&archive, &extracted)?;
    let nested = extracted.join(pkg_id.to_string());
    let content_root = if nested.is_dir() { nested } else { extracted };

    storage.remove_package(pkg_id)?;
    move_dir_or_copy(&content_root, &storage.package_dir(pkg_id))?;
    storage.ensure_package_data_dirs(pkg_id.name())?;

    let manifest = build_manifest(storage, pkg_id, cluster)?;
    manifest.save(&storage.package_manifest_path(pkg_id))?;
    info!(package = %pkg_id, requires = ?manifest.requires, "staged package");
    Ok(manifest)
}

/// Builds the manifest from `pkginfo.json` and the `etc/<name>.{extra,svc}.j2`
/// descriptors of a staged package.
pub fn build_manifest(
    storage: &InstallationStorage,
    pkg_id: &PackageId,
    cluster: Option<&ClusterConfig>,
) -> Result<PackageManifest> {
    let mut manifest = PackageManifest::new(pkg_id.clone());

    let pkginfo_path = storage.package_dir(pkg_id).join(PKGINFO_FILE);
    if pkginfo_path.is_file() {
        let raw = fs::read_to_string(&pkginfo_path)
            .map_err(|err| Error::storage("read package info", &pkginfo_path, err))?;
        let info: PackageInfo =
            serde_json::from_str(&raw).map_err(|err| Error::ManifestInvalid {
                path: pkginfo_path.clone(),
                reason: err.to_string(),
            })?;
        manifest.requires = info.requires;
    }

    let mut context = ResourceContext::new(storage).with_package(pkg_id);
    if let Some(cluster) = cluster {
        context = context.with_cluster(cluster);
    }
    let items = context.items(false);
    let load_descriptor = |kind: &str| -> Result<Option<Value>> {
        let path = storage.package_descriptor_path(pkg_id, kind);
        if !path.is_file() {
            return Ok(None);
        }
        render_descriptor(&path, &items).map(Some)
    };
    manifest.extra_config = load_descriptor(EXTRA_DESCRIPTOR)?;
    manifest.service_config = load_descriptor(SERVICE_DESCRIPTOR)?;
    Ok(manifest)
}

fn render_descriptor(path: &Path, items: &ContextItems) -> Result<Value> {
    let raw = fs::read_to_string(path)
        .map_err(|err| Error::storage("read package descriptor", path, err))?;
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let rendered = render_template(&name, &raw, items)?;
    toml::from_str::<Value>(&rendered).map_err(|err| Error::ManifestInvalid {
        path: path.to_path_buf(),
        reason: err.to_string(),
    })
}
