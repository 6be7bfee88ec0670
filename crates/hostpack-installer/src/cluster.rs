use std::fs;
use std::path::Path;

use hostpack_core::{Error, Result};
use hostpack_dstor::EndpointOptions;
use serde::{Deserialize, Serialize};

pub const DEFAULT_IPADDR: &str = "127.0.0.1";
pub const DEFAULT_ZK_CLIENT_PORT: u16 = 2181;

/// Cluster-level settings of the node, loaded from `cluster.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    pub local: LocalNode,
    #[serde(rename = "master-node", skip_serializing_if = "Vec::is_empty")]
    pub master_nodes: Vec<MasterNode>,
    #[serde(rename = "distribution-storage", skip_serializing_if = "Option::is_none")]
    pub distribution_storage: Option<EndpointOptions>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalNode {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub privateipaddr: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasterNode {
    pub privateipaddr: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zookeeperclientport: Option<u16>,
}

impl MasterNode {
    /// Parses `ip` or `ip:port`.
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        let (addr, port) = match raw.rsplit_once(':') {
            Some((addr, port)) => {
                let port = port.parse::<u16>().map_err(|_| {
                    Error::Config(format!("invalid master node port in '{raw}'"))
                })?;
                (addr, Some(port))
            }
            None => (raw, None),
        };
        if addr.is_empty() {
            return Err(Error::Config(format!("invalid master node address '{raw}'")));
        }
        Ok(Self {
            privateipaddr: addr.to_string(),
            zookeeperclientport: port,
        })
    }

    pub fn zk_client_port(&self) -> u16 {
        self.zookeeperclientport.unwrap_or(DEFAULT_ZK_CLIENT_PORT)
    }

    pub fn location(&self) -> String {
        format!("{}:{}", self.privateipaddr, self.zk_client_port())
    }
}

impl ClusterConfig {
    pub fn from_toml_str(input: &str, origin: &Path) -> Result<Self> {
        toml::from_str(input).map_err(|err| {
            Error::Config(format!(
                "failed to parse cluster configuration {}: {err}",
                origin.display()
            ))
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| Error::storage("read cluster configuration", path, err))?;
        Self::from_toml_str(&raw, path)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string(self)
            .map_err(|err| Error::Config(format!("failed to serialize cluster configuration: {err}")))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let rendered = self.to_toml_string()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|err| Error::storage("create directory", parent, err))?;
        }
        fs::write(path, rendered)
            .map_err(|err| Error::storage("write cluster configuration", path, err))
    }

    pub fn endpoint(&self) -> Result<&EndpointOptions> {
        self.distribution_storage.as_ref().ok_or_else(|| {
            Error::Config("cluster configuration has no [distribution-storage] section".to_string())
        })
    }

    pub fn master_priv_ipaddr(&self) -> &str {
        self.master_nodes
            .first()
            .map(|node| node.privateipaddr.as_str())
            .unwrap_or(DEFAULT_IPADDR)
    }

    pub fn zk_client_port(&self) -> u16 {
        self.master_nodes
            .first()
            .map(MasterNode::zk_client_port)
            .unwrap_or(DEFAULT_ZK_CLIENT_PORT)
    }

    pub fn local_priv_ipaddr(&self) -> &str {
        self.local
            .privateipaddr
            .as_deref()
            .unwrap_or(DEFAULT_IPADDR)
    }

    pub fn master_location(&self) -> String {
        format!("{}:{}", self.master_priv_ipaddr(), self.zk_client_port())
    }

    /// Comma separated `ip:port` list of every master's ZooKeeper client endpoint.
    pub fn zk_address(&self) -> String {
        if self.master_nodes.is_empty() {
            return self.master_location();
        }
        self.master_nodes
            .iter()
            .map(MasterNode::location)
            .collect::<Vec<_>>()
            .join(",")
    }
}
