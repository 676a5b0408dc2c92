//! Orchestrator core — network lifecycle, node registry, port allocation,
//! and the container-adapter contract consumed by it.
//!
//! Mirrors the module split of the teacher crate's Docker domain (a small
//! set of focused modules, a `DockerOps`-style trait with a live and a fake
//! implementation) generalized from "drive a Docker daemon" to "drive the
//! lifecycle of one IPFS network per container".

pub mod cache;
pub mod config;
pub mod container;
pub mod error;
pub mod jobs;
pub mod orchestrator;
pub mod port_pool;
pub mod registry;
pub mod store;
pub mod types;

pub use config::OrchestratorConfig;
pub use error::{NexusError, NexusResult};
pub use orchestrator::Orchestrator;
pub use registry::NodeRegistry;
pub use types::{NetworkDescriptor, NodeInfo, Ports, ResourceQuotas};
