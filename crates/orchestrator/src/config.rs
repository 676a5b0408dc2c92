//! Orchestrator configuration — layered the way the teacher's
//! `ClusterConfig` is: compile-time defaults, then `orchestrator.toml`
//! at conventional paths, then `NEXUS__`-prefixed environment variables.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OrchestratorConfig {
    pub ipfs: IpfsConfig,
    pub postgres: PostgresConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IpfsConfig {
    pub version: String,
    pub data_dir: String,
    pub perm_mode: String,
    pub ports: IpfsPorts,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IpfsPorts {
    pub swarm: Vec<String>,
    pub api: Vec<String>,
    pub gateway: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PostgresConfig {
    pub url: String,
    pub port: u16,
    pub name: String,
    pub username: String,
    pub password: String,
}

impl PostgresConfig {
    pub fn connection_string(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.username, self.password, self.url, self.port, self.name
        )
    }
}

impl OrchestratorConfig {
    /// Loads configuration from `orchestrator.toml` (tried at a few
    /// conventional paths) layered over compile-time defaults, then
    /// overridden by `NEXUS__`-prefixed environment variables.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = config::Config::try_from(&OrchestratorConfig::default())
            .context("failed to serialize default orchestrator configuration")?;

        let mut builder = config::Config::builder().add_source(defaults);

        let config_paths = ["/etc/nexus/orchestrator", "config/orchestrator", "crates/orchestrator/config/orchestrator"];
        for path in config_paths {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("NEXUS")
                .separator("__")
                .try_parsing(true),
        );

        builder
            .build()
            .context("failed to build orchestrator configuration")?
            .try_deserialize()
            .context("failed to deserialize orchestrator configuration")
    }

    pub fn validate(&self) -> Result<()> {
        if self.ipfs.version.is_empty() {
            anyhow::bail!("ipfs.version must not be empty");
        }
        u32::from_str_radix(self.ipfs.perm_mode.trim_start_matches('0'), 8)
            .with_context(|| format!("invalid ipfs.perm_mode: {}", self.ipfs.perm_mode))?;
        Ok(())
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            ipfs: IpfsConfig {
                version: "v0.4.18".to_string(),
                data_dir: "/".to_string(),
                perm_mode: "0700".to_string(),
                ports: IpfsPorts {
                    swarm: vec!["4001-5000".to_string()],
                    api: vec!["5001-6000".to_string()],
                    gateway: vec!["8001-9000".to_string()],
                },
            },
            postgres: PostgresConfig {
                url: "localhost".to_string(),
                port: 5432,
                name: "nexus".to_string(),
                username: "nexus".to_string(),
                password: String::new(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(OrchestratorConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_empty_ipfs_version() {
        let mut cfg = OrchestratorConfig::default();
        cfg.ipfs.version = String::new();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn postgres_connection_string_is_well_formed() {
        let cfg = OrchestratorConfig::default();
        assert_eq!(cfg.postgres.connection_string(), "postgres://nexus:@localhost:5432/nexus");
    }
}
