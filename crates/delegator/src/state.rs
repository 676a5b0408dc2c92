//! Shared application state — mirrors the teacher's `AppState`: one
//! `Clone`-able handle threaded through the router, carrying everything
//! request handling needs plus the shutdown channel.

use std::sync::Arc;

use orchestrator::store::NetworkStore;
use orchestrator::NodeRegistry;
use tokio::sync::watch;

use crate::auth::NowFn;
use crate::config::DelegatorConfig;
use crate::proxy_cache::{new_proxy_cache, ProxyCache};
use crate::reverse_proxy::{new_client, ProxyClient};

#[derive(Clone)]
pub struct DelegatorState {
    pub config: Arc<DelegatorConfig>,
    pub registry: Arc<NodeRegistry>,
    pub store: Arc<dyn NetworkStore>,
    pub proxy_cache: Arc<ProxyCache>,
    pub client: ProxyClient,
    pub now_fn: NowFn,
    /// Watch channel for shutdown signaling. Unlike broadcast, watch never
    /// loses messages — receivers always see the latest value, even if
    /// they subscribe after the send.
    pub shutdown_tx: watch::Sender<bool>,
}

impl DelegatorState {
    pub fn new(config: DelegatorConfig, registry: Arc<NodeRegistry>, store: Arc<dyn NetworkStore>) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        let now_fn = if config.dev_mode { crate::auth::dev_now } else { crate::auth::system_now };
        Self {
            config: Arc::new(config),
            registry,
            store,
            proxy_cache: Arc::new(new_proxy_cache()),
            client: new_client(),
            now_fn,
            shutdown_tx,
        }
    }

    /// Signal shutdown to all components.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}
