//! Port allocation — three independent pools (swarm, api, gateway), each
//! probing OS-level bindability rather than holding a reservation.

use std::net::TcpListener;
use std::time::Duration;

use rand::seq::SliceRandom;

use crate::cache::TtlCache;
use crate::error::{NexusError, NexusResult};

const RECENT_TRY_TTL: Duration = Duration::from_secs(30);
const SWEEP_INTERVAL: Duration = Duration::from_secs(10);

/// Parses port-range strings of the form `"N"` or `"L-U"` into the set of
/// candidate ports they describe.
pub fn parse_port_ranges(ranges: &[String]) -> Vec<u16> {
    let mut ports = Vec::new();
    for r in ranges {
        match r.split_once('-') {
            Some((lo, hi)) => {
                let (Ok(lo), Ok(hi)) = (lo.parse::<u16>(), hi.parse::<u16>()) else { continue };
                if lo > hi {
                    continue;
                }
                ports.extend(lo..=hi);
            }
            None => {
                if let Ok(p) = r.parse::<u16>() {
                    ports.push(p);
                }
            }
        }
    }
    ports
}

/// A pool of candidate host ports bound to a single address (e.g. `0.0.0.0`
/// for the swarm pool, `127.0.0.1` for api/gateway).
pub struct PortPool {
    bind_addr: String,
    candidates: Vec<u16>,
    recent: TtlCache<()>,
}

impl PortPool {
    pub fn new(bind_addr: impl Into<String>, ranges: &[String]) -> Self {
        Self {
            bind_addr: bind_addr.into(),
            candidates: parse_port_ranges(ranges),
            recent: TtlCache::new(RECENT_TRY_TTL, SWEEP_INTERVAL),
        }
    }

    /// Returns a port string currently bindable on this pool's address, or
    /// `Exhausted` once every candidate has been tried within the TTL
    /// window. The bind probe is a liveness check only: the port is not
    /// held, the caller must claim it promptly.
    pub fn assign_port(&self) -> NexusResult<String> {
        if self.candidates.is_empty() {
            return Err(NexusError::Exhausted);
        }

        let mut rng = rand::thread_rng();
        let mut order = self.candidates.clone();
        order.shuffle(&mut rng);

        for port in order {
            let key = port.to_string();
            if self.recent.contains(&key) {
                continue;
            }
            self.recent.insert(key.clone(), ());
            if self.probe(port) {
                return Ok(key);
            }
            if self.recent.len() >= self.candidates.len() {
                break;
            }
        }

        Err(NexusError::Exhausted)
    }

    fn probe(&self, port: u16) -> bool {
        TcpListener::bind((self.bind_addr.as_str(), port)).is_ok()
    }

    pub fn pool_size(&self) -> usize {
        self.candidates.len()
    }

    /// Best-effort early release: drops `port` from the recent-tries
    /// cache so it is immediately eligible for `assign_port` again,
    /// instead of waiting out the TTL. Used when a registration that
    /// assigned this port fails before completing on another pool.
    pub fn release(&self, port: &str) {
        self.recent.remove(port);
    }

    /// Marks `port` as recently tried without probing it, so `assign_port`
    /// skips it for the rest of the TTL window. Used when adopting a node
    /// whose port is already held by a container the pool never bound
    /// itself; the bind probe would fail on it anyway, but claiming it
    /// avoids the wasted attempt.
    pub fn claim(&self, port: &str) {
        if !port.is_empty() {
            self.recent.insert(port.to_string(), ());
        }
    }

    /// Stops this pool's recent-tries sweeper task.
    pub fn close(&self) {
        self.recent.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_and_ranged_ports() {
        let ranges = vec!["8000".to_string(), "8002-8003".to_string()];
        assert_eq!(parse_port_ranges(&ranges), vec![8000, 8002, 8003]);
    }

    #[test]
    fn rejects_inverted_ranges() {
        let ranges = vec!["8000-7999".to_string()];
        assert!(parse_port_ranges(&ranges).is_empty());
    }

    #[test]
    fn assigns_a_bindable_port_from_a_small_pool() {
        let pool = PortPool::new("127.0.0.1", &["0".to_string()]);
        // port 0 asks the OS for an ephemeral port, always bindable.
        let port = pool.assign_port().expect("assigns");
        assert_eq!(port, "0");
    }

    #[test]
    fn exhausted_pool_is_empty() {
        let pool = PortPool::new("127.0.0.1", &[]);
        assert!(matches!(pool.assign_port(), Err(NexusError::Exhausted)));
    }
}
