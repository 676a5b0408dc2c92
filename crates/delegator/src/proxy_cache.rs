//! Proxy cache — memoizes the resolved upstream target for a
//! (network, feature) pair with a TTL. The upstream "reverse-proxy
//! handler" collapses to a resolved host/port pair here: the actual
//! forwarding is done by one shared HTTP client, so there is nothing
//! stateful left to cache beyond the lookup itself.

use std::time::Duration;

use orchestrator::cache::TtlCache;

const PROXY_CACHE_TTL: Duration = Duration::from_secs(300);
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyTarget {
    pub host: String,
    pub port: String,
}

pub type ProxyCache = TtlCache<ProxyTarget>;

pub fn new_proxy_cache() -> ProxyCache {
    TtlCache::new(PROXY_CACHE_TTL, SWEEP_INTERVAL)
}

pub fn cache_key(network_id: &str, feature: &str) -> String {
    format!("{network_id}-{feature}")
}
