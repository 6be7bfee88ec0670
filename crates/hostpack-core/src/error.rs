use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Classification of a failed package retrieval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    NotFound,
    InvalidCredentials,
    RateLimited,
    ConnectionReset,
    Timeout,
    Transport,
}

impl FetchErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not-found",
            Self::InvalidCredentials => "invalid-credentials",
            Self::RateLimited => "rate-limited",
            Self::ConnectionReset => "connection-reset",
            Self::Timeout => "timeout",
            Self::Transport => "transport",
        }
    }

    /// Transient kinds are worth another attempt after a backoff.
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            Self::RateLimited | Self::ConnectionReset | Self::Timeout
        )
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid package id '{id}': {reason}")]
    InvalidId { id: String, reason: String },

    #[error("invalid package manifest {}: {reason}", path.display())]
    ManifestInvalid { path: PathBuf, reason: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid package configuration source {}: {reason}", path.display())]
    PkgConfInvalid { path: PathBuf, reason: String },

    #[error("invalid extras configuration for {pkg_id}: {reason}")]
    ExtrasConfig { pkg_id: String, reason: String },

    #[error("extras command failed for {pkg_id}: '{command}': {reason}")]
    ExtrasExecution {
        pkg_id: String,
        command: String,
        reason: String,
    },

    #[error("failed to {op} {}", path.display())]
    Storage {
        op: String,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("dependency cycle detected involving: {}", .0.join(", "))]
    CyclicDependency(Vec<String>),

    #[error("package '{package}' depends on unknown package '{dependency}'")]
    UnknownDependency { package: String, dependency: String },

    #[error("no distribution storage driver registered for scheme '{0}'")]
    UnknownScheme(String),

    #[error("invalid distribution storage endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("failed to fetch {resource} (reason={}): {message}", kind.as_str())]
    Fetch {
        resource: String,
        kind: FetchErrorKind,
        message: String,
    },

    #[error("failed to extract {}: {message}", archive.display())]
    Extract { archive: PathBuf, message: String },

    #[error("failed to render template '{name}': {message}")]
    Template { name: String, message: String },

    #[error("service {name}: {message}")]
    Service { name: String, message: String },

    #[error("{0}")]
    Installation(String),

    #[error("{step}: package {pkg_id}")]
    Step {
        step: String,
        pkg_id: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    pub fn storage(op: impl Into<String>, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Storage {
            op: op.into(),
            path: path.into(),
            source,
        }
    }

    pub fn fetch(
        resource: impl Into<String>,
        kind: FetchErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self::Fetch {
            resource: resource.into(),
            kind,
            message: message.into(),
        }
    }

    pub fn in_step(self, step: &str, pkg_id: impl ToString) -> Self {
        Self::Step {
            step: step.to_string(),
            pkg_id: pkg_id.to_string(),
            source: Box::new(self),
        }
    }

    /// Display of this error followed by each source, joined with `": "`.
    pub fn chain_message(&self) -> String {
        let mut message = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        message
    }

    /// Only transient fetch failures are retried.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Fetch { kind, .. } => kind.is_transient(),
            Self::Step { source, .. } => source.is_transient(),
            _ => false,
        }
    }
}
