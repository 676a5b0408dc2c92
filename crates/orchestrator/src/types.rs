//! Data model — `NetworkDescriptor` (declared, persisted) and `NodeInfo`
//! (runtime, registry-owned).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Resource quotas attached to a network, translated into container
/// resource limits by the container adapter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceQuotas {
    pub cpus: f64,
    pub memory_gb: f64,
    pub disk_gb: f64,
}

impl Default for ResourceQuotas {
    fn default() -> Self {
        Self { cpus: 1.0, memory_gb: 1.0, disk_gb: 1.0 }
    }
}

/// The three host ports assigned to one running node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ports {
    pub swarm: String,
    pub api: String,
    pub gateway: String,
}

impl Ports {
    /// True once all three ports have been assigned and are pairwise distinct.
    pub fn is_complete_and_distinct(&self) -> bool {
        !self.swarm.is_empty()
            && !self.api.is_empty()
            && !self.gateway.is_empty()
            && self.swarm != self.api
            && self.swarm != self.gateway
            && self.api != self.gateway
    }
}

/// The declared record of a network's configuration and ACL — persisted in
/// the Network Store. Network name is the immutable unique identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkDescriptor {
    pub name: String,
    /// Opaque swarm-key bytes; empty until first activation.
    #[serde(with = "hex_bytes")]
    pub swarm_key: Vec<u8>,
    pub authorized_users: Vec<String>,
    pub gateway_public: bool,
    /// Empty ⇒ wildcard (`*`).
    pub api_allowed_origin: String,
    pub bootstrap_peers: Vec<String>,
    pub resources: ResourceQuotas,
    /// Zero ⇒ inactive.
    pub activated_at: Option<DateTime<Utc>>,
    pub disabled: bool,
}

impl NetworkDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            swarm_key: Vec::new(),
            authorized_users: Vec::new(),
            gateway_public: false,
            api_allowed_origin: String::new(),
            bootstrap_peers: Vec::new(),
            resources: ResourceQuotas::default(),
            activated_at: None,
            disabled: false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.activated_at.is_some()
    }

    pub fn allowed_origin_header(&self) -> &str {
        if self.api_allowed_origin.is_empty() { "*" } else { &self.api_allowed_origin }
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        hex::decode(&s).map_err(serde::de::Error::custom)
    }
}

/// The runtime descriptor for one active network, owned exclusively by the
/// `NodeRegistry`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub network_id: String,
    pub container_id: String,
    pub ports: Ports,
    pub data_dir: String,
    pub resources: ResourceQuotas,
    pub bootstrap_peers: Vec<String>,
    /// Opaque correlation id for the lifecycle operation that created this node.
    pub job_id: String,
}

impl NodeInfo {
    pub fn container_name(network_id: &str) -> String {
        format!("ipfs-{network_id}")
    }

    pub fn new(network_id: impl Into<String>, job_id: impl Into<String>) -> Self {
        let network_id = network_id.into();
        Self {
            network_id,
            container_id: String::new(),
            ports: Ports { swarm: String::new(), api: String::new(), gateway: String::new() },
            data_dir: String::new(),
            resources: ResourceQuotas::default(),
            bootstrap_peers: Vec::new(),
            job_id: job_id.into(),
        }
    }
}

/// Container label keys, the canonical serialization of `NodeInfo` onto
/// containers.
pub mod labels {
    pub const NETWORK_ID: &str = "network_id";
    pub const JOB_ID: &str = "job_id";
    pub const BOOTSTRAP_PEERS: &str = "bootstrap_peers";
    pub const DATA_DIR: &str = "data_dir";
    pub const PORT_SWARM: &str = "ports.swarm";
    pub const PORT_API: &str = "ports.api";
    pub const PORT_GATEWAY: &str = "ports.gateway";
    pub const RESOURCES_DISK: &str = "resources.disk";
    pub const RESOURCES_MEMORY: &str = "resources.memory";
    pub const RESOURCES_CPUS: &str = "resources.cpus";
}

/// Encode a `NodeInfo` as the container label map.
pub fn encode_labels(node: &NodeInfo) -> HashMap<String, String> {
    let mut m = HashMap::new();
    m.insert(labels::NETWORK_ID.to_string(), node.network_id.clone());
    m.insert(labels::JOB_ID.to_string(), node.job_id.clone());
    m.insert(
        labels::BOOTSTRAP_PEERS.to_string(),
        serde_json::to_string(&node.bootstrap_peers).unwrap_or_else(|_| "[]".to_string()),
    );
    m.insert(labels::DATA_DIR.to_string(), node.data_dir.clone());
    m.insert(labels::PORT_SWARM.to_string(), node.ports.swarm.clone());
    m.insert(labels::PORT_API.to_string(), node.ports.api.clone());
    m.insert(labels::PORT_GATEWAY.to_string(), node.ports.gateway.clone());
    m.insert(labels::RESOURCES_DISK.to_string(), node.resources.disk_gb.to_string());
    m.insert(labels::RESOURCES_MEMORY.to_string(), node.resources.memory_gb.to_string());
    m.insert(labels::RESOURCES_CPUS.to_string(), node.resources.cpus.to_string());
    m
}

/// Decode a `NodeInfo` from a container's labels. Returns `None` if any
/// required key is missing or malformed — such containers are ignored by
/// the container adapter.
pub fn decode_labels(container_id: &str, labels: &HashMap<String, String>) -> Option<NodeInfo> {
    let network_id = labels.get(labels::NETWORK_ID)?.clone();
    let job_id = labels.get(labels::JOB_ID).cloned().unwrap_or_default();
    let bootstrap_peers: Vec<String> = labels
        .get(labels::BOOTSTRAP_PEERS)
        .and_then(|s| serde_json::from_str(s).ok())
        .unwrap_or_default();
    let data_dir = labels.get(labels::DATA_DIR)?.clone();
    let ports = Ports {
        swarm: labels.get(labels::PORT_SWARM)?.clone(),
        api: labels.get(labels::PORT_API)?.clone(),
        gateway: labels.get(labels::PORT_GATEWAY)?.clone(),
    };
    let resources = ResourceQuotas {
        disk_gb: labels.get(labels::RESOURCES_DISK)?.parse().ok()?,
        memory_gb: labels.get(labels::RESOURCES_MEMORY)?.parse().ok()?,
        cpus: labels.get(labels::RESOURCES_CPUS)?.parse().ok()?,
    };

    Some(NodeInfo {
        network_id,
        container_id: container_id.to_string(),
        ports,
        data_dir,
        resources,
        bootstrap_peers,
        job_id,
    })
}

/// A container is a managed node iff its name begins with `ipfs-`
/// (tolerating a leading `/`, as Docker reports container names).
pub fn is_managed_container_name(name: &str) -> bool {
    name.trim_start_matches('/').starts_with("ipfs-")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn managed_name_tolerates_leading_slash() {
        assert!(is_managed_container_name("/ipfs-alpha"));
        assert!(is_managed_container_name("ipfs-alpha"));
        assert!(!is_managed_container_name("other-alpha"));
    }

    #[test]
    fn label_round_trip() {
        let mut node = NodeInfo::new("alpha", "job-1");
        node.container_id = "c1".into();
        node.ports = Ports { swarm: "4001".into(), api: "5001".into(), gateway: "8001".into() };
        node.data_dir = "/data/ipfs/alpha".into();
        node.resources = ResourceQuotas { cpus: 2.0, memory_gb: 4.0, disk_gb: 10.0 };
        node.bootstrap_peers = vec!["/ip4/1.2.3.4/tcp/4001/p2p/Qm1".into()];

        let encoded = encode_labels(&node);
        let decoded = decode_labels(&node.container_id, &encoded).expect("decodes");
        assert_eq!(decoded, node);
    }

    #[test]
    fn decode_rejects_missing_keys() {
        let labels = HashMap::new();
        assert!(decode_labels("c1", &labels).is_none());
    }

    #[test]
    fn descriptor_allowed_origin_defaults_to_wildcard() {
        let d = NetworkDescriptor::new("alpha");
        assert_eq!(d.allowed_origin_header(), "*");
    }

    #[test]
    fn ports_distinctness_check() {
        let ports = Ports { swarm: "4001".into(), api: "5001".into(), gateway: "8001".into() };
        assert!(ports.is_complete_and_distinct());
        let bad = Ports { swarm: "4001".into(), api: "4001".into(), gateway: "8001".into() };
        assert!(!bad.is_complete_and_distinct());
    }
}
