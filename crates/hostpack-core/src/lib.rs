mod error;
mod manifest;
mod package_id;

pub use error::{Error, FetchErrorKind, Result};
pub use manifest::PackageManifest;
pub use package_id::{PackageId, ID_SEPARATOR};

#[cfg(test)]
mod tests;
