use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 300;

/// Connection options of a distribution storage endpoint.
///
/// `scheme` selects the driver; the remaining fields are interpreted by the
/// driver (`resourceid` is the S3 bucket, `host` the S3 region).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointOptions {
    pub scheme: String,
    pub rooturl: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resourceid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accessid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    pub pkgrepopath: String,
    pub pkglistpath: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl EndpointOptions {
    /// Builds options from a root URL, taking the scheme from the URL itself.
    pub fn from_url(rooturl: &str) -> Self {
        let scheme = rooturl
            .split_once("://")
            .map(|(scheme, _)| scheme.to_ascii_lowercase())
            .unwrap_or_default();
        Self {
            scheme,
            rooturl: rooturl.to_string(),
            ..Self::default()
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.unwrap_or(DEFAULT_FETCH_TIMEOUT_SECS))
    }

    pub(crate) fn credentials(&self) -> Option<(&str, &str)> {
        match (self.accessid.as_deref(), self.secret.as_deref()) {
            (Some(id), Some(secret)) if !id.is_empty() => Some((id, secret)),
            _ => None,
        }
    }
}
