mod driver;
mod endpoint;
mod http;
mod local;
mod registry;
mod retry;
mod s3;

pub use driver::{package_rel_path, DistributionStorage};
pub use endpoint::EndpointOptions;
pub use http::HttpDistStorage;
pub use local::LocalDirDistStorage;
pub use registry::{DistStorageRegistry, DriverFactory};
pub use retry::{fetch_package_with_retry, fetch_resource_with_retry, RetryPolicy};
pub use s3::AwsS3DistStorage;
