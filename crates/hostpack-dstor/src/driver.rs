use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use hostpack_core::{Error, PackageId, Result};

use crate::EndpointOptions;

pub const PACKAGE_ARCHIVE_EXTENSION: &str = "tar.xz";

/// A source of package archives reachable through one URI scheme.
pub trait DistributionStorage: fmt::Debug {
    fn options(&self) -> &EndpointOptions;

    fn verify_options(&self) -> Result<()>;

    /// Retrieves `rel_path` relative to the endpoint root into `destination`.
    fn fetch_resource(&self, rel_path: &str, destination: &Path) -> Result<()>;

    fn fetch_package(&self, pkg_id: &PackageId, destination: &Path) -> Result<()> {
        self.fetch_resource(&package_rel_path(self.options(), pkg_id), destination)
    }
}

/// `<pkgrepopath>/<name>/<name>--<version>.tar.xz`
pub fn package_rel_path(options: &EndpointOptions, pkg_id: &PackageId) -> String {
    let file_name = format!("{pkg_id}.{PACKAGE_ARCHIVE_EXTENSION}");
    let repo = options.pkgrepopath.trim_matches('/');
    if repo.is_empty() {
        format!("{}/{file_name}", pkg_id.name())
    } else {
        format!("{repo}/{}/{file_name}", pkg_id.name())
    }
}

pub(crate) fn join_url(rooturl: &str, rel_path: &str) -> String {
    format!(
        "{}/{}",
        rooturl.trim_end_matches('/'),
        rel_path.trim_start_matches('/')
    )
}

/// Writes `destination` through a sibling `.part` file that is renamed into
/// place only after `write` succeeded.
pub(crate) fn write_via_part_file<F>(destination: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut fs::File) -> Result<()>,
{
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent)
            .map_err(|err| Error::storage("create directory", parent, err))?;
    }

    let part_path = part_path(destination);
    let result = fs::File::create(&part_path)
        .map_err(|err| Error::storage("create download file", &part_path, err))
        .and_then(|mut file| {
            write(&mut file)?;
            file.sync_all()
                .map_err(|err| Error::storage("sync download file", &part_path, err))
        });
    if let Err(err) = result {
        let _ = fs::remove_file(&part_path);
        return Err(err);
    }

    if destination.exists() {
        fs::remove_file(destination)
            .map_err(|err| Error::storage("replace download file", destination, err))?;
    }
    fs::rename(&part_path, destination)
        .map_err(|err| Error::storage("move download into place", destination, err))
}

fn part_path(destination: &Path) -> PathBuf {
    destination.with_file_name(format!(
        "{}.part",
        destination
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("download")
    ))
}
