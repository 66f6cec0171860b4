//! Node and management network descriptions handed to runtimes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Network mode value that puts a container into the host namespace.
pub const HOST_NETWORK_MODE: &str = "host";

/// Everything a runtime needs to create the container for one topology node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Node name as written in the topology (e.g. `r1`).
    pub short_name: String,
    /// Fully qualified container name (e.g. `clab-lab-r1`).
    pub long_name: String,
    /// Image reference.
    pub image: String,
    /// Node kind (e.g. `linux`, `srl`).
    pub kind: String,
    /// Command arguments.
    pub cmd: Vec<String>,
    /// Entrypoint override.
    pub entrypoint: Vec<String>,
    /// Environment variables.
    pub env: BTreeMap<String, String>,
    /// Container labels.
    pub labels: BTreeMap<String, String>,
    /// Network mode (`bridge` when empty, `host`, `container:<name>`, ...).
    pub network_mode: String,
    /// Static management IPv4 address.
    pub mgmt_ipv4_address: Option<String>,
    /// Static management IPv6 address.
    pub mgmt_ipv6_address: Option<String>,
}

impl NodeConfig {
    /// Create a node with a short name and image; the container name equals
    /// the short name.
    #[must_use]
    pub fn new(short_name: impl Into<String>, image: impl Into<String>) -> Self {
        let short_name = short_name.into();
        Self {
            long_name: short_name.clone(),
            short_name,
            image: image.into(),
            ..Self::default()
        }
    }

    /// Set the fully qualified container name.
    #[must_use]
    pub fn with_long_name(mut self, long_name: impl Into<String>) -> Self {
        self.long_name = long_name.into();
        self
    }

    /// Add a label.
    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Set the network mode.
    #[must_use]
    pub fn with_network_mode(mut self, mode: impl Into<String>) -> Self {
        self.network_mode = mode.into();
        self
    }

    /// The name the container is created under.
    #[must_use]
    pub fn container_name(&self) -> &str {
        if self.long_name.is_empty() {
            &self.short_name
        } else {
            &self.long_name
        }
    }

    /// Whether the node shares the host network namespace.
    #[must_use]
    pub fn uses_host_network(&self) -> bool {
        self.network_mode == HOST_NETWORK_MODE
    }
}

/// The shared management network all nodes attach to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MgmtNet {
    /// Network name.
    pub network: String,
    /// Linux bridge backing the network.
    pub bridge: String,
    /// IPv4 subnet in CIDR form.
    pub ipv4_subnet: String,
    /// IPv6 subnet in CIDR form.
    pub ipv6_subnet: String,
    /// MTU.
    pub mtu: u32,
}

impl MgmtNet {
    /// Default management network name.
    pub const DEFAULT_NETWORK: &'static str = "clab";
    /// Default IPv4 subnet.
    pub const DEFAULT_IPV4_SUBNET: &'static str = "172.20.20.0/24";
    /// Default IPv6 subnet.
    pub const DEFAULT_IPV6_SUBNET: &'static str = "3fff:172:20:20::/64";
    /// Default MTU.
    pub const DEFAULT_MTU: u32 = 1500;

    /// Create a management network with default addressing.
    #[must_use]
    pub fn new(network: impl Into<String>) -> Self {
        Self {
            network: network.into(),
            ..Self::default()
        }
    }
}

impl Default for MgmtNet {
    fn default() -> Self {
        Self {
            network: Self::DEFAULT_NETWORK.to_string(),
            bridge: String::new(),
            ipv4_subnet: Self::DEFAULT_IPV4_SUBNET.to_string(),
            ipv6_subnet: Self::DEFAULT_IPV6_SUBNET.to_string(),
            mtu: Self::DEFAULT_MTU,
        }
    }
}
