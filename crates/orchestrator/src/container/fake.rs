//! Fake — deterministic in-memory test double for [`ContainerAdapter`],
//! used to exercise the orchestrator without a running container runtime.

use std::collections::HashMap;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::broadcast;

use super::{ContainerAdapter, ContainerError, ContainerEvent, ContainerStatus, CreateNodeOptions, NodeStats};
use crate::types::{NodeInfo, ResourceQuotas};

#[derive(Default)]
struct Inner {
    nodes: HashMap<String, NodeInfo>,
    next_id: u64,
    fail_create: bool,
    removed_data_dirs: Vec<String>,
}

/// In-memory [`ContainerAdapter`]. Every created node gets a synthetic
/// container id `fake-<n>`; `set_fail_create` lets tests exercise the
/// compensating-cleanup paths in the orchestrator.
pub struct FakeContainerAdapter {
    inner: Mutex<Inner>,
    events: broadcast::Sender<Result<ContainerEvent, String>>,
}

impl FakeContainerAdapter {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        Self { inner: Mutex::new(Inner::default()), events }
    }

    pub fn set_fail_create(&self, fail: bool) {
        self.inner.lock().fail_create = fail;
    }

    pub fn seed(&self, node: NodeInfo) {
        self.inner.lock().nodes.insert(node.network_id.clone(), node);
    }

    pub fn contains(&self, network_id: &str) -> bool {
        self.inner.lock().nodes.contains_key(network_id)
    }

    pub fn data_dir_removed(&self, network_id: &str) -> bool {
        self.inner.lock().removed_data_dirs.iter().any(|n| n == network_id)
    }
}

impl Default for FakeContainerAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl ContainerAdapter for FakeContainerAdapter {
    fn nodes(&self) -> super::BoxFuture<'_, Result<Vec<NodeInfo>, ContainerError>> {
        Box::pin(async move { Ok(self.inner.lock().nodes.values().cloned().collect()) })
    }

    fn create_node<'a>(
        &'a self,
        node: &'a NodeInfo,
        _opts: &'a CreateNodeOptions,
    ) -> super::BoxFuture<'a, Result<String, ContainerError>> {
        Box::pin(async move {
            let mut inner = self.inner.lock();
            if inner.fail_create {
                return Err(ContainerError::NotReady(node.network_id.clone()));
            }
            inner.next_id += 1;
            let id = format!("fake-{}", inner.next_id);
            let mut stored = node.clone();
            stored.container_id = id.clone();
            inner.nodes.insert(stored.network_id.clone(), stored.clone());
            let _ = self.events.send(Ok(ContainerEvent { time: Utc::now(), status: ContainerStatus::Started, node: stored }));
            Ok(id)
        })
    }

    fn update_node<'a>(
        &'a self,
        container_id: &'a str,
        bootstrap_peers: &'a [String],
        resources: &'a ResourceQuotas,
    ) -> super::BoxFuture<'a, Result<(), ContainerError>> {
        Box::pin(async move {
            let mut inner = self.inner.lock();
            let node = inner
                .nodes
                .values_mut()
                .find(|n| n.container_id == container_id)
                .ok_or_else(|| ContainerError::NotFound(container_id.to_string()))?;
            node.bootstrap_peers = bootstrap_peers.to_vec();
            node.resources = *resources;
            Ok(())
        })
    }

    fn stop_node<'a>(&'a self, container_id: &'a str) -> super::BoxFuture<'a, Result<(), ContainerError>> {
        Box::pin(async move {
            let node = self.inner.lock().nodes.values().find(|n| n.container_id == container_id).cloned();
            let Some(node) = node else {
                return Err(ContainerError::NotFound(container_id.to_string()));
            };
            let _ = self
                .events
                .send(Ok(ContainerEvent { time: Utc::now(), status: ContainerStatus::Died { exit_code: Some(0) }, node }));
            Ok(())
        })
    }

    fn remove_node<'a>(&'a self, container_id: &'a str) -> super::BoxFuture<'a, Result<(), ContainerError>> {
        Box::pin(async move {
            let mut inner = self.inner.lock();
            let entry = inner.nodes.iter().find(|(_, n)| n.container_id == container_id).map(|(k, n)| (k.clone(), n.clone()));
            if let Some((key, node)) = entry {
                inner.nodes.remove(&key);
                drop(inner);
                let _ = self.events.send(Ok(ContainerEvent { time: Utc::now(), status: ContainerStatus::Removed, node }));
            }
            Ok(())
        })
    }

    fn remove_data_dir<'a>(&'a self, network_id: &'a str) -> super::BoxFuture<'a, Result<(), ContainerError>> {
        Box::pin(async move {
            self.inner.lock().removed_data_dirs.push(network_id.to_string());
            Ok(())
        })
    }

    fn node_stats<'a>(&'a self, node: &'a NodeInfo) -> super::BoxFuture<'a, Result<NodeStats, ContainerError>> {
        Box::pin(async move {
            let found = self.inner.lock().nodes.values().any(|n| n.container_id == node.container_id);
            if !found {
                return Err(ContainerError::NotFound(node.container_id.clone()));
            }
            let disk_bytes = super::disk_usage(std::path::Path::new(&node.data_dir)).await;
            Ok(NodeStats { uptime_secs: 0, disk_bytes, cpu_percent: 0.0, memory_bytes: 0, memory_limit_bytes: 0 })
        })
    }

    fn watch(&self) -> super::BoxStream<'_, Result<ContainerEvent, ContainerError>> {
        let mut rx = self.events.subscribe();
        Box::pin(async_stream::stream! {
            loop {
                match rx.recv().await {
                    Ok(Ok(ev)) => yield Ok(ev),
                    Ok(Err(_)) | Err(broadcast::error::RecvError::Closed) => break,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_then_list_then_remove() {
        let adapter = FakeContainerAdapter::new();
        let node = NodeInfo::new("alpha", "job-1");
        let opts = CreateNodeOptions { swarm_key: vec![], auto_remove: false };
        let id = adapter.create_node(&node, &opts).await.expect("creates");
        assert!(adapter.contains("alpha"));

        let nodes = adapter.nodes().await.unwrap();
        assert_eq!(nodes.len(), 1);

        adapter.remove_node(&id).await.unwrap();
        assert!(!adapter.contains("alpha"));
    }

    #[tokio::test]
    async fn create_failure_leaves_no_trace() {
        let adapter = FakeContainerAdapter::new();
        adapter.set_fail_create(true);
        let node = NodeInfo::new("alpha", "job-1");
        let opts = CreateNodeOptions { swarm_key: vec![], auto_remove: false };
        assert!(adapter.create_node(&node, &opts).await.is_err());
        assert!(!adapter.contains("alpha"));
    }

    #[tokio::test]
    async fn update_unknown_container_not_found() {
        let adapter = FakeContainerAdapter::new();
        let err = adapter.update_node("missing", &[], &ResourceQuotas::default()).await.unwrap_err();
        assert!(matches!(err, ContainerError::NotFound(_)));
    }

    #[tokio::test]
    async fn watch_reports_node_on_lifecycle_events() {
        let adapter = FakeContainerAdapter::new();
        let mut events = adapter.watch();

        let node = NodeInfo::new("alpha", "job-1");
        let opts = CreateNodeOptions { swarm_key: vec![], auto_remove: false };
        let id = adapter.create_node(&node, &opts).await.expect("creates");

        let started = futures_util::StreamExt::next(&mut events).await.unwrap().unwrap();
        assert_eq!(started.status, ContainerStatus::Started);
        assert_eq!(started.node.network_id, "alpha");

        adapter.stop_node(&id).await.unwrap();
        let died = futures_util::StreamExt::next(&mut events).await.unwrap().unwrap();
        assert_eq!(died.status, ContainerStatus::Died { exit_code: Some(0) });
        assert_eq!(died.node.network_id, "alpha");
    }
}
