//! Node registry — the single source of truth for which networks are
//! currently running, keyed by network id.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::error::{NexusError, NexusResult};
use crate::port_pool::PortPool;
use crate::types::{NodeInfo, Ports};

pub struct NodeRegistry {
    nodes: RwLock<HashMap<String, NodeInfo>>,
    swarm_pool: PortPool,
    api_pool: PortPool,
    gateway_pool: PortPool,
}

impl NodeRegistry {
    pub fn new(swarm_pool: PortPool, api_pool: PortPool, gateway_pool: PortPool) -> Self {
        Self { nodes: RwLock::new(HashMap::new()), swarm_pool, api_pool, gateway_pool }
    }

    /// Assigns ports on all three pools and inserts `node` keyed by its
    /// network id. The node is invisible to `get`/`list` until all three
    /// assignments and the insert have completed.
    pub fn register(&self, mut node: NodeInfo) -> NexusResult<NodeInfo> {
        if node.network_id.is_empty() {
            return Err(NexusError::Invalid("network id must not be empty".into()));
        }

        {
            let nodes = self.nodes.read();
            if nodes.contains_key(&node.network_id) {
                return Err(NexusError::Duplicate(node.network_id.clone()));
            }
        }

        let swarm = match self.swarm_pool.assign_port() {
            Ok(p) => p,
            Err(e) => return Err(e),
        };

        let api = match self.api_pool.assign_port() {
            Ok(p) => p,
            Err(e) => {
                self.swarm_pool.release(&swarm);
                return Err(e);
            }
        };

        let gateway = match self.gateway_pool.assign_port() {
            Ok(p) => p,
            Err(e) => {
                self.swarm_pool.release(&swarm);
                self.api_pool.release(&api);
                return Err(e);
            }
        };

        node.ports = Ports { swarm: swarm.clone(), api: api.clone(), gateway: gateway.clone() };

        let mut nodes = self.nodes.write();
        if nodes.contains_key(&node.network_id) {
            drop(nodes);
            self.swarm_pool.release(&swarm);
            self.api_pool.release(&api);
            self.gateway_pool.release(&gateway);
            return Err(NexusError::Duplicate(node.network_id.clone()));
        }
        nodes.insert(node.network_id.clone(), node.clone());
        Ok(node)
    }

    pub fn deregister(&self, network_id: &str) -> NexusResult<()> {
        let mut nodes = self.nodes.write();
        if nodes.remove(network_id).is_none() {
            return Err(NexusError::NotFound(network_id.to_string()));
        }
        Ok(())
    }

    pub fn get(&self, network_id: &str) -> NexusResult<NodeInfo> {
        self.nodes
            .read()
            .get(network_id)
            .cloned()
            .ok_or_else(|| NexusError::NotFound(network_id.to_string()))
    }

    pub fn list(&self) -> Vec<NodeInfo> {
        self.nodes.read().values().cloned().collect()
    }

    /// Replace an existing entry in place, used by the orchestrator after
    /// a config update that does not require re-registering ports.
    /// Stops the port pools' sweeper tasks.
    pub fn close(&self) {
        self.swarm_pool.close();
        self.api_pool.close();
        self.gateway_pool.close();
    }

    pub fn replace(&self, node: NodeInfo) -> NexusResult<()> {
        let mut nodes = self.nodes.write();
        if !nodes.contains_key(&node.network_id) {
            return Err(NexusError::NotFound(node.network_id.clone()));
        }
        nodes.insert(node.network_id.clone(), node);
        Ok(())
    }

    /// Inserts `node` directly with its already-assigned ports, instead of
    /// drawing fresh ones from the pools. Used at boot to adopt containers
    /// discovered already running via `ContainerAdapter::nodes`, so the
    /// registry reflects reality before `reconcile` starts bringing up
    /// declared-but-inactive networks.
    pub fn adopt(&self, node: NodeInfo) -> NexusResult<()> {
        if node.network_id.is_empty() {
            return Err(NexusError::Invalid("network id must not be empty".into()));
        }

        let mut nodes = self.nodes.write();
        if nodes.contains_key(&node.network_id) {
            return Err(NexusError::Duplicate(node.network_id.clone()));
        }

        self.swarm_pool.claim(&node.ports.swarm);
        self.api_pool.claim(&node.ports.api);
        self.gateway_pool.claim(&node.ports.gateway);

        nodes.insert(node.network_id.clone(), node);
        Ok(())
    }
}
