use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use hostpack_core::{Error, Result};

use crate::InstallationStorage;

const RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

pub fn remove_file_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}

pub fn remove_dir_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}

/// Device names that cannot be used as a path component on Windows hosts.
pub fn is_reserved_name(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
        return false;
    };
    let stem = name.split('.').next().unwrap_or(name);
    RESERVED_NAMES
        .iter()
        .any(|reserved| reserved.eq_ignore_ascii_case(stem))
}

pub fn unix_nanos() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos())
        .unwrap_or_default()
}

pub fn make_tmp_dir(storage: &InstallationStorage, prefix: &str) -> Result<PathBuf> {
    let dir = storage.tmp_dir().join(format!(
        "{}-{}-{}",
        prefix,
        std::process::id(),
        unix_nanos()
    ));
    fs::create_dir_all(&dir).map_err(|err| Error::storage("create tmp dir", &dir, err))?;
    Ok(dir)
}

pub fn copy_dir_recursive(src: &Path, dst: &Path) -> Result<()> {
    fs::create_dir_all(dst).map_err(|err| Error::storage("create directory", dst, err))?;
    let entries = fs::read_dir(src).map_err(|err| Error::storage("read directory", src, err))?;
    for entry in entries {
        let entry = entry.map_err(|err| Error::storage("read directory", src, err))?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());
        let metadata = fs::symlink_metadata(&src_path)
            .map_err(|err| Error::storage("stat", &src_path, err))?;
        if metadata.is_dir() {
            copy_dir_recursive(&src_path, &dst_path)?;
            continue;
        }

        #[cfg(unix)]
        if metadata.file_type().is_symlink() {
            let target = fs::read_link(&src_path)
                .map_err(|err| Error::storage("read symlink", &src_path, err))?;
            std::os::unix::fs::symlink(&target, &dst_path)
                .map_err(|err| Error::storage("create symlink", &dst_path, err))?;
            continue;
        }

        fs::copy(&src_path, &dst_path).map_err(|err| Error::storage("copy", &src_path, err))?;
    }
    Ok(())
}

pub fn move_dir_or_copy(src: &Path, dst: &Path) -> Result<()> {
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)
            .map_err(|err| Error::storage("create install parent", parent, err))?;
    }

    match fs::rename(src, dst) {
        Ok(()) => Ok(()),
        Err(_) => {
            copy_dir_recursive(src, dst)?;
            fs::remove_dir_all(src).map_err(|err| Error::storage("clean up staging dir", src, err))
        }
    }
}
