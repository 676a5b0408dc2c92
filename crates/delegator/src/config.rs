//! Delegator configuration — layered the same way as the orchestrator's:
//! compile-time defaults, then `delegator.toml` at conventional paths,
//! then `DELEGATOR__`-prefixed environment variables.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DelegatorConfig {
    /// External hostname used to recognize subdomain-addressed requests
    /// (`{id}.{feature}.{address}`). Empty disables subdomain routing.
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub log_path: String,
    pub host: String,
    pub port: u16,
    pub jwt_key: String,
    /// Dev mode disables JWT expiry checks (the time function returns the
    /// zero instant, so `exp` is never in the past).
    #[serde(default)]
    pub dev_mode: bool,
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub tls: TlsConfig,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TlsConfig {
    pub cert: Option<String>,
    pub key: Option<String>,
}

impl DelegatorConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Loads configuration from `delegator.toml` (tried at a few
    /// conventional paths) layered over compile-time defaults, then
    /// overridden by `DELEGATOR__`-prefixed environment variables.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = config::Config::try_from(&DelegatorConfig::default())
            .context("failed to serialize default delegator configuration")?;

        let mut builder = config::Config::builder().add_source(defaults);

        let config_paths = ["/etc/nexus/delegator", "config/delegator", "crates/delegator/config/delegator"];
        for path in config_paths {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("DELEGATOR")
                .separator("__")
                .try_parsing(true),
        );

        builder
            .build()
            .context("failed to build delegator configuration")?
            .try_deserialize()
            .context("failed to deserialize delegator configuration")
    }

    pub fn validate(&self) -> Result<()> {
        self.bind_address().parse::<std::net::SocketAddr>().context("invalid host/port")?;
        if self.jwt_key.is_empty() {
            anyhow::bail!("jwt_key must not be empty");
        }
        Ok(())
    }
}

impl Default for DelegatorConfig {
    fn default() -> Self {
        Self {
            address: String::new(),
            log_path: String::new(),
            host: "0.0.0.0".to_string(),
            port: 9080,
            jwt_key: "change-me".to_string(),
            dev_mode: false,
            request_timeout_secs: 30,
            tls: TlsConfig::default(),
        }
    }
}
