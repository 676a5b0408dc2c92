//! Orchestrator — the stateful controller that drives network lifecycle,
//! coordinating the Network Store, the Node Registry, and the Container
//! Adapter. Mirrors the teacher's `AppState`-style composition
//! root: a struct of `Arc`-wrapped collaborators plus a watch channel for
//! shutdown signaling.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::OrchestratorConfig;
use crate::container::script::{data_dir, generate_swarm_key};
use crate::container::{ContainerAdapter, ContainerEvent, ContainerStatus, CreateNodeOptions, NodeStats};
use crate::error::{NexusError, NexusResult};
use crate::jobs::new_job_id;
use crate::registry::NodeRegistry;
use crate::store::NetworkStore;
use crate::types::NodeInfo;

/// Result of a successful `NetworkUp`.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkUpResult {
    pub network_id: String,
    pub swarm_port: String,
    pub swarm_key_hex: String,
}

/// Result of `NetworkStatus`; the swarm key is never echoed back.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkStatusResult {
    pub network_id: String,
    pub swarm_port: String,
    pub swarm_key: &'static str,
    pub uptime_secs: u64,
    pub disk_bytes: u64,
}

/// Result of `NetworkDiagnostics`; stats are best-effort.
#[derive(Debug, Clone)]
pub struct NetworkDiagnosticsResult {
    pub node: NodeInfo,
    pub stats: Option<NodeStats>,
}

/// The stateful controller that owns network lifecycle. Holds no mutable state
/// of its own beyond what the registry and store already own.
pub struct Orchestrator {
    config: OrchestratorConfig,
    adapter: Arc<dyn ContainerAdapter>,
    store: Arc<dyn NetworkStore>,
    registry: Arc<NodeRegistry>,
    shutdown_tx: watch::Sender<bool>,
}

impl Orchestrator {
    pub fn new(
        config: OrchestratorConfig,
        adapter: Arc<dyn ContainerAdapter>,
        store: Arc<dyn NetworkStore>,
        registry: Arc<NodeRegistry>,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self { config, adapter, store, registry, shutdown_tx }
    }

    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn NetworkStore> {
        &self.store
    }

    fn require_network_id(network_id: &str) -> NexusResult<()> {
        if network_id.is_empty() {
            return Err(NexusError::Invalid("network id must not be empty".into()));
        }
        Ok(())
    }

    /// Brings a declared network online: loads it from the store, registers
    /// a node for it, creates its container, and persists the resulting
    /// swarm key and activation timestamp.
    pub async fn network_up(&self, network_id: &str) -> NexusResult<NetworkUpResult> {
        Self::require_network_id(network_id)?;
        let job_id = new_job_id();

        let mut descriptor = self.store.get(network_id).await?;

        let (swarm_key, swarm_key_is_new) = if descriptor.swarm_key.is_empty() {
            (generate_swarm_key(), true)
        } else {
            (descriptor.swarm_key.clone(), false)
        };

        let mut node = NodeInfo::new(network_id, job_id);
        node.resources = descriptor.resources;
        node.bootstrap_peers = descriptor.bootstrap_peers.clone();
        node.data_dir = data_dir(&self.config.ipfs.data_dir, network_id).to_string_lossy().into_owned();

        let node = self.registry.register(node)?;

        let opts = CreateNodeOptions { swarm_key: swarm_key.clone(), auto_remove: false };
        let container_id = match self.adapter.create_node(&node, &opts).await {
            Ok(id) => id,
            Err(e) => {
                let _ = self.registry.deregister(network_id);
                return Err(NexusError::CreateFailed(e.to_string()));
            }
        };

        let mut stored = node.clone();
        stored.container_id = container_id.clone();
        if self.registry.replace(stored.clone()).is_err() {
            warn!(network_id, "node vanished from registry between create and replace");
        }

        if swarm_key_is_new {
            descriptor.swarm_key = swarm_key.clone();
        }
        descriptor.activated_at = Some(Utc::now());

        if let Err(e) = self.store.save(&descriptor).await {
            let _ = self.registry.deregister(network_id);
            let _ = self.adapter.remove_node(&container_id).await;
            return Err(NexusError::PersistFailed(e.to_string()));
        }

        Ok(NetworkUpResult {
            network_id: network_id.to_string(),
            swarm_port: stored.ports.swarm,
            swarm_key_hex: hex::encode(&swarm_key),
        })
    }

    /// Applies a network's current declared quotas and bootstrap peers to
    /// its running node. Ports, container id, and data dir are preserved,
    /// so the registry entry is replaced atomically rather than torn down
    /// and rebuilt.
    pub async fn network_update(&self, network_id: &str) -> NexusResult<()> {
        Self::require_network_id(network_id)?;
        let existing = self.registry.get(network_id)?;
        let descriptor = self.store.get(network_id).await?;

        let mut updated = existing.clone();
        updated.job_id = new_job_id();
        updated.resources = descriptor.resources;
        updated.bootstrap_peers = descriptor.bootstrap_peers.clone();

        self.adapter.update_node(&existing.container_id, &updated.bootstrap_peers, &updated.resources).await?;
        self.registry.replace(updated)?;
        Ok(())
    }

    /// Stops a node's container and removes it from the registry. The
    /// stop is best-effort: a failure there is logged but does not stop
    /// deregistration, since the registry's view is authoritative for
    /// `Get`/`List` regardless of container runtime health.
    pub async fn network_down(&self, network_id: &str) -> NexusResult<()> {
        Self::require_network_id(network_id)?;
        let node = self.registry.get(network_id)?;

        if let Err(e) = self.adapter.stop_node(&node.container_id).await {
            warn!(network_id, error = %e, "stop_node failed during network_down");
        }
        let _ = self.registry.deregister(network_id);

        let mut descriptor = self.store.get(network_id).await?;
        descriptor.activated_at = None;
        self.store.save(&descriptor).await.map_err(|e| NexusError::PersistFailed(e.to_string()))?;
        Ok(())
    }

    /// Deletes a network's data directory. Refuses while the network is
    /// still registered, since removal is destructive and `NetworkDown`
    /// should have run first.
    pub async fn network_remove(&self, network_id: &str) -> NexusResult<()> {
        Self::require_network_id(network_id)?;
        if self.registry.get(network_id).is_ok() {
            return Err(NexusError::StillOnline);
        }
        self.adapter.remove_data_dir(network_id).await?;
        Ok(())
    }

    /// Projects a node's live stats, omitting the swarm key.
    pub async fn network_status(&self, network_id: &str) -> NexusResult<NetworkStatusResult> {
        Self::require_network_id(network_id)?;
        let node = self.registry.get(network_id)?;
        let stats = self.adapter.node_stats(&node).await?;
        Ok(NetworkStatusResult {
            network_id: network_id.to_string(),
            swarm_port: node.ports.swarm,
            swarm_key: "<OMITTED>",
            uptime_secs: stats.uptime_secs,
            disk_bytes: stats.disk_bytes,
        })
    }

    /// Returns the node plus a best-effort stats sample; a stats failure
    /// does not fail the call, since diagnostics should work even when a
    /// node is unhealthy.
    pub async fn network_diagnostics(&self, network_id: &str) -> NexusResult<NetworkDiagnosticsResult> {
        Self::require_network_id(network_id)?;
        let node = self.registry.get(network_id)?;
        let stats = self.adapter.node_stats(&node).await.ok();
        Ok(NetworkDiagnosticsResult { node, stats })
    }

    /// Adopts containers already running under the managed `ipfs-` naming
    /// convention into the registry, so a restart doesn't see an empty
    /// registry while their containers are still alive. Best-effort: an
    /// adoption failure for one node is logged and does not stop the
    /// others.
    async fn adopt_running_nodes(&self) {
        let nodes = match self.adapter.nodes().await {
            Ok(nodes) => nodes,
            Err(e) => {
                warn!(error = %e, "failed to enumerate running containers during boot reconciliation");
                return;
            }
        };

        for node in nodes {
            let network_id = node.network_id.clone();
            match self.registry.adopt(node) {
                Ok(()) => info!(network_id, "adopted already-running node into registry"),
                Err(e) => warn!(network_id, error = %e, "failed to adopt running node"),
            }
        }
    }

    /// Queries the store for declared networks that should be running but
    /// aren't, and brings each one up. Called once at boot and may be
    /// scheduled periodically thereafter. First adopts any containers
    /// already running so they aren't re-created under a colliding name.
    pub async fn reconcile(&self) -> NexusResult<()> {
        self.adopt_running_nodes().await;

        let pending = self.store.list_inactive_enabled().await?;
        for descriptor in pending {
            if self.registry.get(&descriptor.name).is_ok() {
                continue;
            }
            match self.network_up(&descriptor.name).await {
                Ok(_) => info!(network_id = %descriptor.name, "reconciled network up"),
                Err(e) => warn!(network_id = %descriptor.name, error = %e, "reconciliation failed"),
            }
        }
        Ok(())
    }

    /// Runs the container-event watcher until shutdown is signaled, then
    /// releases the registry's background sweepers.
    pub async fn run(&self) {
        let mut events = self.adapter.watch();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                event = futures_util::StreamExt::next(&mut events) => {
                    match event {
                        Some(Ok(ContainerEvent { status: ContainerStatus::Died { exit_code }, node, .. })) => {
                            warn!(network_id = %node.network_id, container_id = %node.container_id, ?exit_code, "managed container died");
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => warn!(error = %e, "container watch error"),
                        None => break,
                    }
                }
                _ = shutdown_rx.changed() => break,
            }
        }

        self.registry.close();
    }

    /// Signals `run` and any other shutdown-aware background task to stop.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::fake::FakeContainerAdapter;
    use crate::port_pool::PortPool;
    use crate::store::InMemoryNetworkStore;
    use crate::types::{NetworkDescriptor, ResourceQuotas};

    fn harness() -> (Orchestrator, Arc<FakeContainerAdapter>, Arc<InMemoryNetworkStore>) {
        let adapter = Arc::new(FakeContainerAdapter::new());
        let store = Arc::new(InMemoryNetworkStore::new());
        let registry = Arc::new(NodeRegistry::new(
            PortPool::new("127.0.0.1", &["4001-4010".to_string()]),
            PortPool::new("127.0.0.1", &["5001-5010".to_string()]),
            PortPool::new("127.0.0.1", &["8001-8010".to_string()]),
        ));
        let orchestrator =
            Orchestrator::new(OrchestratorConfig::default(), adapter.clone(), store.clone(), registry);
        (orchestrator, adapter, store)
    }

    #[tokio::test]
    async fn network_up_registers_creates_and_activates() {
        let (orch, _adapter, store) = harness();
        store.seed(NetworkDescriptor::new("alpha"));

        let result = orch.network_up("alpha").await.expect("brings network up");
        assert_eq!(result.network_id, "alpha");
        assert!(!result.swarm_key_hex.is_empty());

        let node = orch.registry().get("alpha").expect("registered");
        assert!(!node.container_id.is_empty());

        let descriptor = store.get("alpha").await.unwrap();
        assert!(descriptor.activated_at.is_some());
        assert!(!descriptor.swarm_key.is_empty());
    }

    #[tokio::test]
    async fn network_up_missing_descriptor_not_found() {
        let (orch, _adapter, _store) = harness();
        assert!(matches!(orch.network_up("missing").await, Err(NexusError::NotFound(_))));
    }

    #[tokio::test]
    async fn network_up_preserves_existing_swarm_key() {
        let (orch, _adapter, store) = harness();
        let mut descriptor = NetworkDescriptor::new("alpha");
        descriptor.swarm_key = b"existing-key".to_vec();
        store.seed(descriptor);

        let result = orch.network_up("alpha").await.unwrap();
        assert_eq!(result.swarm_key_hex, hex::encode(b"existing-key"));
    }

    #[tokio::test]
    async fn network_up_rolls_back_registry_on_create_failure() {
        let (orch, adapter, store) = harness();
        store.seed(NetworkDescriptor::new("alpha"));
        adapter.set_fail_create(true);

        let err = orch.network_up("alpha").await.unwrap_err();
        assert!(matches!(err, NexusError::CreateFailed(_)));
        assert!(orch.registry().get("alpha").is_err());
    }

    #[tokio::test]
    async fn network_down_deactivates_and_deregisters() {
        let (orch, _adapter, store) = harness();
        store.seed(NetworkDescriptor::new("alpha"));
        orch.network_up("alpha").await.unwrap();

        orch.network_down("alpha").await.unwrap();
        assert!(orch.registry().get("alpha").is_err());
        assert!(store.get("alpha").await.unwrap().activated_at.is_none());
    }

    #[tokio::test]
    async fn network_down_on_already_down_network_not_found() {
        let (orch, _adapter, _store) = harness();
        assert!(matches!(orch.network_down("alpha").await, Err(NexusError::NotFound(_))));
    }

    #[tokio::test]
    async fn network_remove_refuses_while_registered() {
        let (orch, _adapter, store) = harness();
        store.seed(NetworkDescriptor::new("alpha"));
        orch.network_up("alpha").await.unwrap();

        assert!(matches!(orch.network_remove("alpha").await, Err(NexusError::StillOnline)));
    }

    #[tokio::test]
    async fn network_remove_deletes_data_dir_once_down() {
        let (orch, adapter, store) = harness();
        store.seed(NetworkDescriptor::new("alpha"));
        orch.network_up("alpha").await.unwrap();
        orch.network_down("alpha").await.unwrap();

        orch.network_remove("alpha").await.unwrap();
        assert!(adapter.data_dir_removed("alpha"));
    }

    #[tokio::test]
    async fn network_status_omits_swarm_key() {
        let (orch, _adapter, store) = harness();
        store.seed(NetworkDescriptor::new("alpha"));
        orch.network_up("alpha").await.unwrap();

        let status = orch.network_status("alpha").await.unwrap();
        assert_eq!(status.swarm_key, "<OMITTED>");
    }

    #[tokio::test]
    async fn network_diagnostics_succeeds_even_without_stats() {
        let (orch, _adapter, store) = harness();
        store.seed(NetworkDescriptor::new("alpha"));
        orch.network_up("alpha").await.unwrap();

        let diagnostics = orch.network_diagnostics("alpha").await.unwrap();
        assert_eq!(diagnostics.node.network_id, "alpha");
    }

    #[tokio::test]
    async fn network_update_preserves_ports_and_container_id() {
        let (orch, _adapter, store) = harness();
        let mut descriptor = NetworkDescriptor::new("alpha");
        descriptor.resources = ResourceQuotas { cpus: 1.0, memory_gb: 1.0, disk_gb: 1.0 };
        store.seed(descriptor);
        orch.network_up("alpha").await.unwrap();
        let before = orch.registry().get("alpha").unwrap();

        let mut updated_descriptor = store.get("alpha").await.unwrap();
        updated_descriptor.resources = ResourceQuotas { cpus: 2.0, memory_gb: 2.0, disk_gb: 2.0 };
        store.save(&updated_descriptor).await.unwrap();

        orch.network_update("alpha").await.unwrap();
        let after = orch.registry().get("alpha").unwrap();
        assert_eq!(after.ports, before.ports);
        assert_eq!(after.container_id, before.container_id);
        assert_eq!(after.resources.cpus, 2.0);
    }

    #[tokio::test]
    async fn reconcile_adopts_already_running_containers_first() {
        let (orch, adapter, store) = harness();
        let mut running = NodeInfo::new("alpha", "job-0");
        running.container_id = "preexisting".to_string();
        running.ports.swarm = "4001".to_string();
        adapter.seed(running);
        store.seed(NetworkDescriptor::new("alpha"));

        orch.reconcile().await.unwrap();

        let node = orch.registry().get("alpha").expect("adopted");
        assert_eq!(node.container_id, "preexisting");
    }

    #[tokio::test]
    async fn reconcile_brings_up_inactive_enabled_networks() {
        let (orch, _adapter, store) = harness();
        store.seed(NetworkDescriptor::new("alpha"));
        let mut disabled = NetworkDescriptor::new("beta");
        disabled.disabled = true;
        store.seed(disabled);

        orch.reconcile().await.unwrap();
        assert!(orch.registry().get("alpha").is_ok());
        assert!(orch.registry().get("beta").is_err());
    }

    #[tokio::test]
    async fn empty_network_id_is_invalid_everywhere() {
        let (orch, _adapter, _store) = harness();
        assert!(matches!(orch.network_up("").await, Err(NexusError::Invalid(_))));
        assert!(matches!(orch.network_down("").await, Err(NexusError::Invalid(_))));
        assert!(matches!(orch.network_remove("").await, Err(NexusError::Invalid(_))));
    }
}
