//! Live — Bollard-backed [`ContainerAdapter`] implementation.

use std::collections::HashMap;

use bollard::Docker;
use chrono::{DateTime, Utc};
use bollard::models::{ContainerCreateBody, ContainerUpdateBody, HostConfig, PortBinding, RestartPolicy, RestartPolicyNameEnum};
use bollard::query_parameters::{
    CreateContainerOptions, InspectContainerOptions, ListContainersOptions, LogsOptions,
    RemoveContainerOptions, StatsOptions, StopContainerOptions,
};
use futures_util::stream::StreamExt;

use super::script::{data_dir, startup_script_path, swarm_key_path, write_node_files};
use super::{ContainerAdapter, ContainerError, ContainerEvent, ContainerStatus, CreateNodeOptions, NodeStats};
use crate::types::{decode_labels, encode_labels, is_managed_container_name, NodeInfo, ResourceQuotas};

const STOP_GRACE_SECS: u32 = 10;
const READY_MARKER: &str = "Daemon is ready";

fn host_config_resources(resources: &ResourceQuotas) -> (i64, i64, i64) {
    let memory = (resources.memory_gb * 1_073_741_824.0) as i64;
    let cpu_period = 100_000i64;
    let cpu_quota = (resources.cpus * 100_000.0) as i64;
    (memory, cpu_period, cpu_quota)
}

/// Bollard-backed container runtime client, configured with the host
/// paths and image version used to create IPFS node containers.
pub struct LiveContainerAdapter {
    client: Docker,
    data_root: String,
    perm_mode: u32,
    ipfs_version: String,
}

impl LiveContainerAdapter {
    pub fn new(client: Docker, data_root: impl Into<String>, perm_mode: u32, ipfs_version: impl Into<String>) -> Self {
        Self { client, data_root: data_root.into(), perm_mode, ipfs_version: ipfs_version.into() }
    }

    fn image(&self) -> String {
        format!("ipfs/go-ipfs:{}", self.ipfs_version)
    }

    async fn wait_ready(&self, container_id: &str) -> Result<(), ContainerError> {
        let options = LogsOptions {
            follow: true,
            stdout: true,
            stderr: true,
            tail: "all".to_string(),
            ..Default::default()
        };
        let mut stream = self.client.logs(container_id, Some(options));
        while let Some(chunk) = stream.next().await {
            let output = chunk.map_err(ContainerError::Daemon)?;
            let bytes = output.into_bytes();
            if bytes.windows(READY_MARKER.len()).any(|w| w == READY_MARKER.as_bytes()) {
                return Ok(());
            }
        }
        Err(ContainerError::NotReady(container_id.to_string()))
    }

    async fn apply_bootstrap_peers(&self, container_id: &str, peers: &[String]) -> Result<(), ContainerError> {
        if peers.is_empty() {
            return Ok(());
        }
        self.exec(container_id, vec!["ipfs".into(), "bootstrap".into(), "rm".into(), "--all".into()]).await?;
        let mut add_cmd = vec!["ipfs".to_string(), "bootstrap".to_string(), "add".to_string()];
        add_cmd.extend(peers.iter().cloned());
        self.exec(container_id, add_cmd).await?;
        Ok(())
    }

    async fn exec(&self, container_id: &str, cmd: Vec<String>) -> Result<(), ContainerError> {
        use bollard::exec::{CreateExecOptions, StartExecResults};

        let exec = self
            .client
            .create_exec(container_id, CreateExecOptions {
                cmd: Some(cmd),
                attach_stdout: Some(true),
                attach_stderr: Some(true),
                ..Default::default()
            })
            .await?;

        if let StartExecResults::Attached { mut output, .. } = self.client.start_exec(&exec.id, None).await? {
            while output.next().await.is_some() {}
        }
        Ok(())
    }
}

impl ContainerAdapter for LiveContainerAdapter {
    fn nodes(&self) -> super::BoxFuture<'_, Result<Vec<NodeInfo>, ContainerError>> {
        Box::pin(async move {
            let options = Some(ListContainersOptions { all: true, ..Default::default() });
            let containers = self.client.list_containers(options).await?;

            let mut out = Vec::new();
            for c in containers {
                let Some(names) = &c.names else { continue };
                let Some(name) = names.first() else { continue };
                if !is_managed_container_name(name) {
                    continue;
                }
                let Some(id) = &c.id else { continue };
                let Some(labels) = &c.labels else { continue };
                let Some(node) = decode_labels(id, labels) else { continue };

                let running = c.state == Some(bollard::models::ContainerSummaryStateEnum::RUNNING);
                if !running {
                    let opts = CreateNodeOptions { swarm_key: Vec::new(), auto_remove: false };
                    match self.create_node(&node, &opts).await {
                        Ok(_) => {}
                        Err(_) => {
                            let _ = self.remove_node(id).await;
                            continue;
                        }
                    }
                }
                out.push(node);
            }
            Ok(out)
        })
    }

    fn create_node<'a>(
        &'a self,
        node: &'a NodeInfo,
        opts: &'a CreateNodeOptions,
    ) -> super::BoxFuture<'a, Result<String, ContainerError>> {
        Box::pin(async move {
            let dir = write_node_files(
                &self.data_root,
                &node.network_id,
                &opts.swarm_key,
                node.resources.disk_gb,
                self.perm_mode,
            )
            .await?;

            let (memory, cpu_period, cpu_quota) = host_config_resources(&node.resources);

            let mut port_bindings = HashMap::new();
            port_bindings.insert(
                "4001/tcp".to_string(),
                Some(vec![PortBinding { host_ip: Some("0.0.0.0".into()), host_port: Some(node.ports.swarm.clone()) }]),
            );
            port_bindings.insert(
                "5001/tcp".to_string(),
                Some(vec![PortBinding { host_ip: Some("127.0.0.1".into()), host_port: Some(node.ports.api.clone()) }]),
            );
            port_bindings.insert(
                "8080/tcp".to_string(),
                Some(vec![PortBinding { host_ip: Some("127.0.0.1".into()), host_port: Some(node.ports.gateway.clone()) }]),
            );

            let data_mount = format!("{}:/data/ipfs", dir.display());
            let script_mount = format!("{}:/start.sh", startup_script_path(&dir).display());
            let _ = swarm_key_path(&dir);

            let host_config = HostConfig {
                memory: Some(memory),
                cpu_period: Some(cpu_period),
                cpu_quota: Some(cpu_quota),
                port_bindings: Some(port_bindings),
                binds: Some(vec![data_mount, script_mount]),
                restart_policy: if opts.auto_remove {
                    None
                } else {
                    Some(RestartPolicy { name: Some(RestartPolicyNameEnum::UNLESS_STOPPED), maximum_retry_count: None })
                },
                auto_remove: Some(opts.auto_remove),
                ..Default::default()
            };

            let body = ContainerCreateBody {
                image: Some(self.image()),
                cmd: Some(vec!["/start.sh".to_string()]),
                env: Some(vec!["LIBP2P_FORCE_PNET=1".to_string()]),
                labels: Some(encode_labels(node)),
                host_config: Some(host_config),
                ..Default::default()
            };

            let name = NodeInfo::container_name(&node.network_id);
            let options = CreateContainerOptions { name: Some(name), ..Default::default() };

            let created = match self.client.create_container(Some(options), body).await {
                Ok(c) => c,
                Err(e) => return Err(ContainerError::Daemon(e)),
            };

            if let Err(e) = self.client.start_container(&created.id, None::<bollard::query_parameters::StartContainerOptions>).await {
                let _ = self.remove_node(&created.id).await;
                return Err(ContainerError::Daemon(e));
            }

            if let Err(e) = self.wait_ready(&created.id).await {
                let _ = self.remove_node(&created.id).await;
                return Err(e);
            }

            if let Err(e) = self.apply_bootstrap_peers(&created.id, &node.bootstrap_peers).await {
                let _ = self.remove_node(&created.id).await;
                return Err(e);
            }

            Ok(created.id)
        })
    }

    fn update_node<'a>(
        &'a self,
        container_id: &'a str,
        bootstrap_peers: &'a [String],
        resources: &'a ResourceQuotas,
    ) -> super::BoxFuture<'a, Result<(), ContainerError>> {
        Box::pin(async move {
            let (memory, cpu_period, cpu_quota) = host_config_resources(resources);
            self.client
                .update_container(
                    container_id,
                    ContainerUpdateBody {
                        memory: Some(memory),
                        cpu_period: Some(cpu_period),
                        cpu_quota: Some(cpu_quota),
                        ..Default::default()
                    },
                )
                .await?;

            self.client
                .restart_container(container_id, None::<bollard::query_parameters::RestartContainerOptions>)
                .await?;

            self.wait_ready(container_id).await?;
            self.apply_bootstrap_peers(container_id, bootstrap_peers).await?;
            Ok(())
        })
    }

    fn stop_node<'a>(&'a self, container_id: &'a str) -> super::BoxFuture<'a, Result<(), ContainerError>> {
        Box::pin(async move {
            let stop_result = self
                .client
                .stop_container(container_id, Some(StopContainerOptions { t: Some(STOP_GRACE_SECS as i32), ..Default::default() }))
                .await;
            if let Err(e) = &stop_result {
                tracing::warn!(container_id, error = %e, "stop_container failed, removing anyway");
            }

            let remove_result = self
                .client
                .remove_container(container_id, Some(RemoveContainerOptions { force: true, v: true, ..Default::default() }))
                .await;
            if let Err(e) = &remove_result {
                tracing::warn!(container_id, error = %e, "remove_container failed");
            }

            if stop_result.is_err() && remove_result.is_err() {
                return Err(ContainerError::NotReady(container_id.to_string()));
            }
            Ok(())
        })
    }

    fn remove_node<'a>(&'a self, container_id: &'a str) -> super::BoxFuture<'a, Result<(), ContainerError>> {
        Box::pin(async move {
            self.client
                .remove_container(container_id, Some(RemoveContainerOptions { force: true, v: true, ..Default::default() }))
                .await
                .map_err(ContainerError::Daemon)?;
            Ok(())
        })
    }

    fn remove_data_dir<'a>(&'a self, network_id: &'a str) -> super::BoxFuture<'a, Result<(), ContainerError>> {
        Box::pin(async move {
            let dir = data_dir(&self.data_root, network_id);
            match tokio::fs::remove_dir_all(&dir).await {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(ContainerError::Io(e)),
            }
        })
    }

    fn node_stats<'a>(&'a self, node: &'a NodeInfo) -> super::BoxFuture<'a, Result<NodeStats, ContainerError>> {
        Box::pin(async move {
            let container_id = node.container_id.as_str();

            let inspect = self
                .client
                .inspect_container(container_id, None::<InspectContainerOptions>)
                .await?;
            let uptime_secs = inspect
                .state
                .as_ref()
                .and_then(|s| s.started_at.as_ref())
                .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
                .map(|started| (chrono::Utc::now() - started.with_timezone(&chrono::Utc)).num_seconds().max(0) as u64)
                .unwrap_or(0);

            let disk_bytes = super::disk_usage(std::path::Path::new(&node.data_dir)).await;

            let mut stream = self.client.stats(container_id, Some(StatsOptions { stream: false, ..Default::default() }));
            let sample = stream.next().await.ok_or_else(|| ContainerError::NotFound(container_id.to_string()))?;
            let sample = sample.map_err(ContainerError::Daemon)?;

            let cpu_percent = sample
                .cpu_stats
                .as_ref()
                .zip(sample.precpu_stats.as_ref())
                .and_then(|(cur, prev)| {
                    let cur_total = cur.cpu_usage.as_ref()?.total_usage? as f64;
                    let prev_total = prev.cpu_usage.as_ref()?.total_usage? as f64;
                    let cur_sys = cur.system_cpu_usage? as f64;
                    let prev_sys = prev.system_cpu_usage? as f64;
                    let cpu_delta = cur_total - prev_total;
                    let sys_delta = cur_sys - prev_sys;
                    if sys_delta > 0.0 {
                        Some((cpu_delta / sys_delta) * 100.0)
                    } else {
                        None
                    }
                })
                .unwrap_or(0.0);

            let memory_bytes = sample.memory_stats.as_ref().and_then(|m| m.usage).unwrap_or(0);
            let memory_limit_bytes = sample.memory_stats.as_ref().and_then(|m| m.limit).unwrap_or(0);

            Ok(NodeStats { uptime_secs, disk_bytes, cpu_percent, memory_bytes, memory_limit_bytes })
        })
    }

    fn watch(&self) -> super::BoxStream<'_, Result<ContainerEvent, ContainerError>> {
        let mut filters = HashMap::new();
        filters.insert("type".to_string(), vec!["container".to_string()]);
        filters.insert("event".to_string(), vec!["start".to_string(), "die".to_string(), "destroy".to_string()]);
        let options = bollard::query_parameters::EventsOptions { filters: Some(filters), ..Default::default() };
        let stream = self.client.events(Some(options));

        Box::pin(stream.filter_map(|ev| async move {
            let ev = match ev {
                Ok(ev) => ev,
                Err(e) => return Some(Err(ContainerError::Daemon(e))),
            };
            let actor = ev.actor?;
            let id = actor.id?;
            let attributes = actor.attributes.unwrap_or_default();
            // Docker merges a container's labels into the event actor's
            // attributes, so the node is decodable straight off the event
            // without a separate inspect call.
            let node = decode_labels(&id, &attributes)?;

            let time = ev.time.and_then(|secs| DateTime::from_timestamp(secs, 0)).unwrap_or_else(Utc::now);

            let status = match ev.action.as_deref() {
                Some("start") => ContainerStatus::Started,
                Some("die") => {
                    let exit_code = attributes.get("exitCode").and_then(|s| s.parse::<i64>().ok());
                    ContainerStatus::Died { exit_code }
                }
                Some("destroy") => ContainerStatus::Removed,
                _ => return None,
            };

            Some(Ok(ContainerEvent { time, status, node }))
        }))
    }
}

