use std::fs;
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Error, PackageId, Result};

/// Persisted descriptor of a staged package.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PackageManifest {
    pub pkg_id: PackageId,
    #[serde(default)]
    pub requires: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_config: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_config: Option<Value>,
}

impl PackageManifest {
    pub fn new(pkg_id: PackageId) -> Self {
        Self {
            pkg_id,
            requires: Vec::new(),
            extra_config: None,
            service_config: None,
        }
    }

    pub fn name(&self) -> &str {
        self.pkg_id.name()
    }

    pub fn from_json_str(input: &str, origin: &Path) -> Result<Self> {
        let manifest: Self =
            serde_json::from_str(input).map_err(|err| Error::ManifestInvalid {
                path: origin.to_path_buf(),
                reason: err.to_string(),
            })?;
        if manifest.requires.iter().any(|dep| dep == manifest.name()) {
            return Err(Error::ManifestInvalid {
                path: origin.to_path_buf(),
                reason: format!("package '{}' requires itself", manifest.name()),
            });
        }
        Ok(manifest)
    }

    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|err| {
            Error::Config(format!("failed to serialize manifest {}: {err}", self.pkg_id))
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| Error::storage("read package manifest", path, err))?;
        Self::from_json_str(&raw, path)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let rendered = self.to_json_string()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|err| Error::storage("create directory", parent, err))?;
        }
        let mut file = fs::File::create(path)
            .map_err(|err| Error::storage("create package manifest", path, err))?;
        file.write_all(rendered.as_bytes())
            .and_then(|_| file.sync_all())
            .map_err(|err| Error::storage("write package manifest", path, err))
    }
}
