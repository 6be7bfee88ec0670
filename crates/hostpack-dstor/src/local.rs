use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use hostpack_core::{Error, FetchErrorKind, Result};
use tracing::debug;
use url::Url;

use crate::driver::write_via_part_file;
use crate::{DistributionStorage, EndpointOptions};

/// Distribution storage backed by a local directory (`file:///srv/dist`).
///
/// Besides archive files, directories are accepted as already unpacked
/// packages and are copied as a tree.
#[derive(Debug)]
pub struct LocalDirDistStorage {
    options: EndpointOptions,
}

impl LocalDirDistStorage {
    pub fn new(options: &EndpointOptions) -> Self {
        Self {
            options: options.clone(),
        }
    }

    fn root(&self) -> Result<PathBuf> {
        let rooturl = self.options.rooturl.as_str();
        let root = if rooturl.starts_with("file:") {
            Url::parse(rooturl)
                .ok()
                .and_then(|url| url.to_file_path().ok())
                .ok_or_else(|| {
                    Error::InvalidEndpoint(format!("rooturl '{rooturl}' is not a file URL"))
                })?
        } else {
            PathBuf::from(rooturl)
        };
        if !root.is_absolute() {
            return Err(Error::InvalidEndpoint(format!(
                "rooturl '{rooturl}' must be an absolute path"
            )));
        }
        Ok(root)
    }
}

impl DistributionStorage for LocalDirDistStorage {
    fn options(&self) -> &EndpointOptions {
        &self.options
    }

    fn verify_options(&self) -> Result<()> {
        let root = self.root()?;
        if !root.is_dir() {
            return Err(Error::InvalidEndpoint(format!(
                "distribution directory does not exist: {}",
                root.display()
            )));
        }
        Ok(())
    }

    fn fetch_resource(&self, rel_path: &str, destination: &Path) -> Result<()> {
        let source = self.root()?.join(rel_path.trim_start_matches('/'));
        debug!(
            source = %source.display(),
            destination = %destination.display(),
            "fetching from local distribution directory"
        );

        let metadata = match fs::metadata(&source) {
            Ok(metadata) => metadata,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(Error::fetch(
                    source.display().to_string(),
                    FetchErrorKind::NotFound,
                    "no such file",
                ));
            }
            Err(err) => {
                return Err(Error::fetch(
                    source.display().to_string(),
                    FetchErrorKind::Transport,
                    err.to_string(),
                ));
            }
        };

        if metadata.is_dir() {
            if destination.exists() {
                fs::remove_dir_all(destination)
                    .map_err(|err| Error::storage("clear destination", destination, err))?;
            }
            return copy_tree(&source, destination);
        }

        write_via_part_file(destination, |file| {
            let mut reader = fs::File::open(&source)
                .map_err(|err| Error::storage("open distribution file", &source, err))?;
            io::copy(&mut reader, file)
                .map(|_| ())
                .map_err(|err| Error::storage("copy distribution file", &source, err))
        })
    }
}

fn copy_tree(src: &Path, dst: &Path) -> Result<()> {
    fs::create_dir_all(dst).map_err(|err| Error::storage("create directory", dst, err))?;
    let entries = fs::read_dir(src).map_err(|err| Error::storage("read directory", src, err))?;
    for entry in entries {
        let entry = entry.map_err(|err| Error::storage("read directory", src, err))?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());
        if src_path.is_dir() {
            copy_tree(&src_path, &dst_path)?;
        } else {
            fs::copy(&src_path, &dst_path)
                .map_err(|err| Error::storage("copy file", &src_path, err))?;
        }
    }
    Ok(())
}
