//! Container adapter — abstract interface over the container runtime.
//!
//! The orchestrator accesses containers exclusively through this trait.
//! `live.rs` provides the real Bollard-backed implementation, `fake.rs`
//! a test double. Mirrors the teacher's `DockerOps` split, narrowed to
//! the node lifecycle operations the orchestrator needs.

pub mod error;
pub mod fake;
pub mod live;
pub mod script;

use std::pin::Pin;

use chrono::{DateTime, Utc};

pub use error::ContainerError;

use crate::types::{NodeInfo, ResourceQuotas};

/// One sample of resource usage for a running node: uptime since the
/// container was created, disk usage of its data directory, and a raw
/// CPU/memory snapshot from the runtime.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeStats {
    pub uptime_secs: u64,
    pub disk_bytes: u64,
    pub cpu_percent: f64,
    pub memory_bytes: u64,
    pub memory_limit_bytes: u64,
}

/// A single observed lifecycle transition, emitted by `watch`. Carries the
/// full `NodeInfo` decoded from the container's labels rather than just its
/// id, so subscribers don't need a side lookup to know which network
/// changed.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerEvent {
    pub time: DateTime<Utc>,
    pub status: ContainerStatus,
    pub node: NodeInfo,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ContainerStatus {
    Started,
    Died { exit_code: Option<i64> },
    Removed,
}

/// Inputs to `create_node` beyond the node descriptor itself.
#[derive(Debug, Clone)]
pub struct CreateNodeOptions {
    pub swarm_key: Vec<u8>,
    pub auto_remove: bool,
}

type BoxFuture<'a, T> = Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;
type BoxStream<'a, T> = Pin<Box<dyn tokio_stream::Stream<Item = T> + Send + 'a>>;

/// Object-safe thanks to `Pin<Box<…>>` returns. Implementations must be
/// `Send + Sync` so they can live inside an `Arc<Orchestrator>`.
pub trait ContainerAdapter: Send + Sync {
    /// All containers currently labeled as managed nodes, decoded from
    /// their labels. The boot reconciliation source of truth for which
    /// networks are actually running.
    fn nodes(&self) -> BoxFuture<'_, Result<Vec<NodeInfo>, ContainerError>>;

    /// Create and start a new node container for `node`, writing the swarm
    /// key and config to its data directory first.
    fn create_node<'a>(
        &'a self,
        node: &'a NodeInfo,
        opts: &'a CreateNodeOptions,
    ) -> BoxFuture<'a, Result<String, ContainerError>>;

    /// Apply updated bootstrap peers / resource limits to a running node,
    /// restarting it if the runtime requires a restart to pick them up.
    fn update_node<'a>(
        &'a self,
        container_id: &'a str,
        bootstrap_peers: &'a [String],
        resources: &'a ResourceQuotas,
    ) -> BoxFuture<'a, Result<(), ContainerError>>;

    /// Gracefully stop a node's container without removing it.
    fn stop_node<'a>(&'a self, container_id: &'a str) -> BoxFuture<'a, Result<(), ContainerError>>;

    /// Stop (if needed) and remove a node's container.
    fn remove_node<'a>(&'a self, container_id: &'a str) -> BoxFuture<'a, Result<(), ContainerError>>;

    /// Delete the data directory for a network. Idempotent: a missing
    /// directory is not an error.
    fn remove_data_dir<'a>(&'a self, network_id: &'a str) -> BoxFuture<'a, Result<(), ContainerError>>;

    /// A single resource-usage sample for a running node: container
    /// stats and inspect, plus a walk of its data directory for disk
    /// usage. `node` must carry a populated `container_id` and `data_dir`.
    fn node_stats<'a>(&'a self, node: &'a NodeInfo) -> BoxFuture<'a, Result<NodeStats, ContainerError>>;

    /// Stream of lifecycle events for managed node containers, used to
    /// drive the node registry's liveness view outside of polling.
    fn watch(&self) -> BoxStream<'_, Result<ContainerEvent, ContainerError>>;
}

/// Recursively sums file sizes under `dir`. Missing directories count
/// as zero rather than erroring, since a node's data directory may not
/// exist yet on first boot.
pub async fn disk_usage(dir: &std::path::Path) -> u64 {
    let mut total = 0u64;
    let mut stack = vec![dir.to_path_buf()];
    while let Some(current) = stack.pop() {
        let Ok(mut entries) = tokio::fs::read_dir(&current).await else { continue };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let Ok(meta) = entry.metadata().await else { continue };
            if meta.is_dir() {
                stack.push(entry.path());
            } else {
                total += meta.len();
            }
        }
    }
    total
}
