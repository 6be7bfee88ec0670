use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use hostpack_core::{Error, PackageId, PackageManifest, Result};
use tracing::{debug, info};

use crate::fs_utils::{is_reserved_name, remove_dir_if_exists, unix_nanos};

pub const CLUSTER_CONFIG_FILE: &str = "cluster.toml";
pub const CLUSTER_ID_FILE: &str = "cluster-id";
pub const COMMAND_STATE_FILE: &str = "command.state";
pub const CONSTRUCTED_MARKER_FILE: &str = ".constructed";
pub const PACKAGE_MANIFEST_FILE: &str = "manifest.json";
pub const PACKAGE_CONF_DIR: &str = "conf";
pub const PACKAGE_DESCRIPTOR_DIR: &str = "etc";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageState {
    Absent,
    HalfConstructed,
    Constructed,
}

impl StorageState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Absent => "absent",
            Self::HalfConstructed => "half-constructed",
            Self::Constructed => "constructed",
        }
    }
}

/// On-disk layout of one installation, derived from an absolute root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallationStorage {
    root: PathBuf,
}

impl InstallationStorage {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.is_absolute() {
            return Err(Error::Config(format!(
                "installation root must be an absolute path: {}",
                root.display()
            )));
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn cfg_dir(&self) -> PathBuf {
        self.root.join("conf")
    }

    pub fn pkgrepo_dir(&self) -> PathBuf {
        self.root.join("packages")
    }

    pub fn state_dir(&self) -> PathBuf {
        self.root.join("state")
    }

    pub fn var_dir(&self) -> PathBuf {
        self.root.join("var")
    }

    pub fn work_dir(&self) -> PathBuf {
        self.var_dir().join("opt")
    }

    pub fn run_dir(&self) -> PathBuf {
        self.var_dir().join("run")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.var_dir().join("log")
    }

    pub fn tmp_dir(&self) -> PathBuf {
        self.var_dir().join("tmp")
    }

    pub fn bin_dir(&self) -> PathBuf {
        self.root.join("bin")
    }

    pub fn lib_dir(&self) -> PathBuf {
        self.root.join("lib")
    }

    pub fn cluster_config_path(&self) -> PathBuf {
        self.cfg_dir().join(CLUSTER_CONFIG_FILE)
    }

    pub fn cluster_id_path(&self) -> PathBuf {
        self.state_dir().join(CLUSTER_ID_FILE)
    }

    pub fn command_state_path(&self) -> PathBuf {
        self.state_dir().join(COMMAND_STATE_FILE)
    }

    pub fn constructed_marker_path(&self) -> PathBuf {
        self.state_dir().join(CONSTRUCTED_MARKER_FILE)
    }

    pub fn package_dir(&self, pkg_id: &PackageId) -> PathBuf {
        self.pkgrepo_dir().join(pkg_id.to_string())
    }

    pub fn package_manifest_path(&self, pkg_id: &PackageId) -> PathBuf {
        self.package_dir(pkg_id).join(PACKAGE_MANIFEST_FILE)
    }

    pub fn package_conf_source_dir(&self, pkg_id: &PackageId) -> PathBuf {
        self.package_dir(pkg_id).join(PACKAGE_CONF_DIR)
    }

    pub fn package_descriptor_path(&self, pkg_id: &PackageId, kind: &str) -> PathBuf {
        self.package_dir(pkg_id)
            .join(PACKAGE_DESCRIPTOR_DIR)
            .join(format!("{}.{kind}.j2", pkg_id.name()))
    }

    pub fn package_config_dir(&self, name: &str) -> PathBuf {
        self.cfg_dir().join(name)
    }

    pub fn package_work_dir(&self, name: &str) -> PathBuf {
        self.work_dir().join(name)
    }

    pub fn package_run_dir(&self, name: &str) -> PathBuf {
        self.run_dir().join(name)
    }

    pub fn package_log_dir(&self, name: &str) -> PathBuf {
        self.log_dir().join(name)
    }

    /// Directories making up the layout, parents before children.
    pub fn base_dirs(&self) -> Vec<PathBuf> {
        vec![
            self.root.clone(),
            self.cfg_dir(),
            self.pkgrepo_dir(),
            self.state_dir(),
            self.var_dir(),
            self.work_dir(),
            self.run_dir(),
            self.log_dir(),
            self.tmp_dir(),
            self.bin_dir(),
            self.lib_dir(),
        ]
    }

    pub fn state(&self) -> StorageState {
        if !self.root.exists() {
            StorageState::Absent
        } else if self.constructed_marker_path().is_file() {
            StorageState::Constructed
        } else {
            StorageState::HalfConstructed
        }
    }

    /// Creates missing layout directories and writes the constructed marker.
    ///
    /// With `clean`, an existing root is removed first. Directories created by
    /// a failed call are removed again.
    pub fn construct(&self, clean: bool) -> Result<()> {
        if clean {
            self.destruct()?;
        }

        let mut created = Vec::new();
        if let Err(err) = self.construct_dirs(&mut created) {
            for dir in created.iter().rev() {
                let _ = fs::remove_dir_all(dir);
            }
            return Err(err);
        }

        let marker = self.constructed_marker_path();
        fs::write(&marker, b"")
            .map_err(|err| Error::storage("write construction marker", &marker, err))?;
        debug!(root = %self.root.display(), created = created.len(), "installation storage ready");
        Ok(())
    }

    fn construct_dirs(&self, created: &mut Vec<PathBuf>) -> Result<()> {
        for dir in self.base_dirs() {
            if is_reserved_name(&dir) {
                return Err(Error::storage(
                    "construct installation storage",
                    &dir,
                    io::Error::other("reserved name"),
                ));
            }
            match fs::symlink_metadata(&dir) {
                Ok(metadata) if metadata.file_type().is_symlink() => {
                    return Err(Error::storage(
                        "construct installation storage",
                        &dir,
                        io::Error::other("symbolic link is not allowed"),
                    ));
                }
                Ok(metadata) if metadata.is_dir() => continue,
                Ok(_) => {
                    fs::remove_file(&dir).map_err(|err| {
                        Error::storage("replace file with directory", &dir, err)
                    })?;
                }
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => {
                    return Err(Error::storage("inspect installation storage", &dir, err));
                }
            }
            fs::create_dir(&dir).map_err(|err| Error::storage("create directory", &dir, err))?;
            created.push(dir);
        }
        Ok(())
    }

    pub fn destruct(&self) -> Result<()> {
        info!(root = %self.root.display(), "removing installation storage");
        remove_dir_if_exists(&self.root)
            .map_err(|err| Error::storage("destruct installation storage", &self.root, err))
    }

    pub fn write_cluster_id(&self) -> Result<PathBuf> {
        let path = self.cluster_id_path();
        if path.is_file() {
            return Ok(path);
        }
        let id = format!("{:032x}{:08x}", unix_nanos(), std::process::id());
        fs::write(&path, format!("{id}\n"))
            .map_err(|err| Error::storage("write cluster identity", &path, err))?;
        Ok(path)
    }

    /// First file proving that an installation already lives under this root.
    pub fn find_install_marker(&self) -> Result<Option<PathBuf>> {
        let cluster_id = self.cluster_id_path();
        if cluster_id.exists() {
            return Ok(Some(cluster_id));
        }
        Ok(self.staged_manifest_paths()?.into_iter().next())
    }

    pub fn staged_manifest_paths(&self) -> Result<Vec<PathBuf>> {
        Ok(self
            .package_dirs()?
            .into_iter()
            .map(|dir| dir.join(PACKAGE_MANIFEST_FILE))
            .filter(|path| path.is_file())
            .collect())
    }

    pub fn staged_manifests(&self) -> Result<Vec<PackageManifest>> {
        self.staged_manifest_paths()?
            .iter()
            .map(|path| PackageManifest::load(path))
            .collect()
    }

    /// Entries of the package repository, sorted by name.
    pub fn package_dirs(&self) -> Result<Vec<PathBuf>> {
        let dir = self.pkgrepo_dir();
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(Error::storage("read package repository", &dir, err)),
        };

        let mut dirs = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| Error::storage("read package repository", &dir, err))?;
            let path = entry.path();
            if path.is_dir() {
                dirs.push(path);
            }
        }
        dirs.sort();
        Ok(dirs)
    }

    pub fn remove_package(&self, pkg_id: &PackageId) -> Result<()> {
        let dir = self.package_dir(pkg_id);
        remove_dir_if_exists(&dir).map_err(|err| Error::storage("remove package", &dir, err))
    }

    pub fn ensure_package_data_dirs(&self, name: &str) -> Result<()> {
        for dir in [
            self.package_work_dir(name),
            self.package_run_dir(name),
            self.package_log_dir(name),
        ] {
            fs::create_dir_all(&dir).map_err(|err| Error::storage("create directory", &dir, err))?;
        }
        Ok(())
    }
}
