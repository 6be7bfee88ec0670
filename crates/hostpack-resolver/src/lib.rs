mod order;

pub use order::{resolve_install_order, resolve_manifest_order};
