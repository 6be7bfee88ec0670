use std::fs;
use std::path::Path;
use std::process::Command;

use hostpack_core::{Error, Result};

use crate::fs_utils::move_dir_or_copy;

/// Unpacks a fetched package into `dst`.
///
/// A directory in place of an archive is taken as already unpacked content.
pub fn unpack_archive(archive_path: &Path, dst: &Path) -> Result<()> {
    if archive_path.is_dir() {
        return move_dir_or_copy(archive_path, dst);
    }
    fs::create_dir_all(dst).map_err(|err| Error::storage("create directory", dst, err))?;
    extract_tar(archive_path, dst)
}

fn extract_tar(archive_path: &Path, dst: &Path) -> Result<()> {
    run_command(
        Command::new("tar")
            .arg("-xf")
            .arg(archive_path)
            .arg("-C")
            .arg(dst),
        archive_path,
    )
}

fn run_command(command: &mut Command, archive_path: &Path) -> Result<()> {
    let output = command.output().map_err(|err| Error::Extract {
        archive: archive_path.to_path_buf(),
        message: format!("command failed to start: {err}"),
    })?;
    if output.status.success() {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = String::from_utf8_lossy(&output.stdout);
    Err(Error::Extract {
        archive: archive_path.to_path_buf(),
        message: format!(
            "status={} stdout='{}' stderr='{}'",
            output.status,
            stdout.trim(),
            stderr.trim()
        ),
    })
}
