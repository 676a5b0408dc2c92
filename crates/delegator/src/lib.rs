//! Delegator — the reverse-proxy front door. A library crate: the `nexus`
//! binary owns process wiring (config load, tracing init, graceful
//! shutdown) and calls into this crate to build the router and state that
//! the HTTP listener serves.

pub mod auth;
pub mod config;
pub mod error;
pub mod proxy_cache;
pub mod reverse_proxy;
pub mod routes;
pub mod state;
pub mod tls;

pub use config::DelegatorConfig;
pub use error::{DelegatorError, DelegatorResult};
pub use routes::build_router;
pub use state::DelegatorState;
