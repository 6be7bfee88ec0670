use hostpack_core::PackageId;
use serde_json::Value;

use crate::{ClusterConfig, InstallationStorage};

pub const DCOS_INST_DPATH: &str = "dcos_inst_dpath";
pub const DCOS_CFG_DPATH: &str = "dcos_cfg_dpath";
pub const DCOS_WORK_DPATH: &str = "dcos_work_dpath";
pub const DCOS_RUN_DPATH: &str = "dcos_run_dpath";
pub const DCOS_LOG_DPATH: &str = "dcos_log_dpath";
pub const DCOS_TMP_DPATH: &str = "dcos_tmp_dpath";
pub const DCOS_BIN_DPATH: &str = "dcos_bin_dpath";
pub const DCOS_LIB_DPATH: &str = "dcos_lib_dpath";

pub const MASTER_LOCATION: &str = "master_location";
pub const MASTER_PRIV_IPADDR: &str = "master_priv_ipaddr";
pub const LOCAL_PRIV_IPADDR: &str = "local_priv_ipaddr";
pub const ZK_CLIENT_PORT: &str = "zk_client_port";
pub const ZK_ADDRESS: &str = "zk_address";

pub const PKG_INST_DPATH: &str = "pkg_inst_dpath";
pub const PKG_LOG_DPATH: &str = "pkg_log_dpath";
pub const PKG_RTD_DPATH: &str = "pkg_rtd_dpath";
pub const PKG_WORK_DPATH: &str = "pkg_work_dpath";
pub const PKG_SHRCFG_DPATH: &str = "pkg_shrcfg_dpath";

/// Sources of the values available to configuration templates.
#[derive(Debug, Clone)]
pub struct ResourceContext<'a> {
    storage: &'a InstallationStorage,
    cluster: Option<&'a ClusterConfig>,
    pkg_id: Option<&'a PackageId>,
    extra_values: Vec<(String, Value)>,
}

impl<'a> ResourceContext<'a> {
    pub fn new(storage: &'a InstallationStorage) -> Self {
        Self {
            storage,
            cluster: None,
            pkg_id: None,
            extra_values: Vec::new(),
        }
    }

    pub fn with_cluster(mut self, cluster: &'a ClusterConfig) -> Self {
        self.cluster = Some(cluster);
        self
    }

    pub fn with_package(mut self, pkg_id: &'a PackageId) -> Self {
        self.pkg_id = Some(pkg_id);
        self
    }

    pub fn with_extra_value(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra_values.push((key.into(), value.into()));
        self
    }

    /// Storage items, then cluster items, then package items, then the extra
    /// values overlaid on top.
    pub fn items(&self, json_ready: bool) -> ContextItems {
        let mut items = ContextItems::default();
        let storage = self.storage;
        for (key, path) in [
            (DCOS_INST_DPATH, storage.root().to_path_buf()),
            (DCOS_CFG_DPATH, storage.cfg_dir()),
            (DCOS_WORK_DPATH, storage.work_dir()),
            (DCOS_RUN_DPATH, storage.run_dir()),
            (DCOS_LOG_DPATH, storage.log_dir()),
            (DCOS_TMP_DPATH, storage.tmp_dir()),
            (DCOS_BIN_DPATH, storage.bin_dir()),
            (DCOS_LIB_DPATH, storage.lib_dir()),
        ] {
            items.insert(key, path.display().to_string());
        }

        if let Some(cluster) = self.cluster {
            items.insert(MASTER_LOCATION, cluster.master_location());
            items.insert(MASTER_PRIV_IPADDR, cluster.master_priv_ipaddr());
            items.insert(LOCAL_PRIV_IPADDR, cluster.local_priv_ipaddr());
            items.insert(ZK_CLIENT_PORT, cluster.zk_client_port());
            items.insert(ZK_ADDRESS, cluster.zk_address());
        }

        if let Some(pkg_id) = self.pkg_id {
            let name = pkg_id.name();
            for (key, path) in [
                (PKG_INST_DPATH, storage.package_dir(pkg_id)),
                (PKG_LOG_DPATH, storage.package_log_dir(name)),
                (PKG_RTD_DPATH, storage.package_run_dir(name)),
                (PKG_WORK_DPATH, storage.package_work_dir(name)),
                (PKG_SHRCFG_DPATH, storage.package_config_dir(name)),
            ] {
                items.insert(key, path.display().to_string());
            }
        }

        for (key, value) in &self.extra_values {
            items.insert(key.clone(), value.clone());
        }

        if json_ready {
            items.escape_for_json();
        }
        items
    }
}

/// Ordered key/value pairs handed to the template engine.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContextItems {
    entries: Vec<(String, Value)>,
}

impl ContextItems {
    /// Replaces the value of an existing key in place or appends a new key.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == key) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(key, value)| (key.as_str(), value))
    }

    pub fn to_tera_context(&self) -> tera::Context {
        let mut context = tera::Context::new();
        for (key, value) in self.iter() {
            context.insert(key, value);
        }
        context
    }

    fn escape_for_json(&mut self) {
        for (_, value) in &mut self.entries {
            if let Value::String(raw) = value {
                let quoted = Value::String(std::mem::take(raw)).to_string();
                *raw = quoted[1..quoted.len() - 1].to_string();
            }
        }
    }
}
