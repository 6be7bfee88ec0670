use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use hostpack_core::{Error, Result};
use tracing::debug;

use crate::fs_utils::remove_file_if_exists;
use crate::InstallationStorage;

/// Persisted name of the step an interrupted command was in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandState {
    path: PathBuf,
}

impl CommandState {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn for_storage(storage: &InstallationStorage) -> Self {
        Self::new(storage.command_state_path())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the stored step verbatim, or `None` when no command is in flight.
    pub fn get_state(&self) -> Result<Option<String>> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(Error::storage("read command state", &self.path, err)),
        };
        if raw.is_empty() {
            return Ok(None);
        }
        Ok(Some(raw))
    }

    pub fn set_state(&self, state: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .map_err(|err| Error::storage("create directory", parent, err))?;
        }

        let tmp_path = self.path.with_extension("state.tmp");
        let write = || -> io::Result<()> {
            let mut file = fs::File::create(&tmp_path)?;
            file.write_all(state.as_bytes())?;
            file.sync_all()?;
            fs::rename(&tmp_path, &self.path)
        };
        if let Err(err) = write() {
            let _ = remove_file_if_exists(&tmp_path);
            return Err(Error::storage("write command state", &self.path, err));
        }
        debug!(state, path = %self.path.display(), "command state set");
        Ok(())
    }

    pub fn unset_state(&self) -> Result<()> {
        remove_file_if_exists(&self.path)
            .map_err(|err| Error::storage("clear command state", &self.path, err))?;
        debug!(path = %self.path.display(), "command state cleared");
        Ok(())
    }
}
