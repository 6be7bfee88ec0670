use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

pub const ID_SEPARATOR: &str = "--";

/// Package identity in its canonical `name--version` form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PackageId {
    name: String,
    version: String,
}

impl PackageId {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let version = version.into();
        let id = Self::compose(&name, &version);
        validate_name(&name).map_err(|reason| invalid(&id, reason))?;
        validate_version(&version).map_err(|reason| invalid(&id, reason))?;
        Ok(Self { name, version })
    }

    pub fn parse(id: &str) -> Result<Self> {
        let occurrences = id.matches(ID_SEPARATOR).count();
        if occurrences != 1 {
            return Err(invalid(
                id,
                format!("expected exactly one '{ID_SEPARATOR}' separator, found {occurrences}"),
            ));
        }
        let Some((name, version)) = id.split_once(ID_SEPARATOR) else {
            return Err(invalid(id, "missing separator".to_string()));
        };
        Self::new(name, version)
    }

    pub fn compose(name: &str, version: &str) -> String {
        format!("{name}{ID_SEPARATOR}{version}")
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }
}

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{ID_SEPARATOR}{}", self.name, self.version)
    }
}

impl FromStr for PackageId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for PackageId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<PackageId> for String {
    fn from(value: PackageId) -> Self {
        value.to_string()
    }
}

fn invalid(id: &str, reason: String) -> Error {
    Error::InvalidId {
        id: id.to_string(),
        reason,
    }
}

fn validate_name(name: &str) -> std::result::Result<(), String> {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return Err("package name must not be empty".to_string());
    };
    if !(first.is_ascii_alphanumeric() || matches!(first, '@' | '_' | '+')) {
        return Err(format!("package name must not start with '{first}'"));
    }
    if let Some(bad) = chars.find(|ch| !(ch.is_ascii_alphanumeric() || "@._+-".contains(*ch))) {
        return Err(format!("package name contains invalid character '{bad}'"));
    }
    if name.contains(ID_SEPARATOR) || name.ends_with('-') {
        return Err(format!(
            "package name must not contain or end into the '{ID_SEPARATOR}' separator"
        ));
    }
    Ok(())
}

fn validate_version(version: &str) -> std::result::Result<(), String> {
    if version.is_empty() {
        return Err("package version must not be empty".to_string());
    }
    if let Some(bad) = version
        .chars()
        .find(|ch| !(ch.is_ascii_alphanumeric() || "@_+:.".contains(*ch)))
    {
        return Err(format!("package version contains invalid character '{bad}'"));
    }
    Ok(())
}
