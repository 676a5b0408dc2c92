//! Network store — persistence for `NetworkDescriptor` rows, the
//! ambient collaborator the orchestrator reads from and writes to
//! around each lifecycle operation.

use std::collections::HashMap;

use parking_lot::RwLock;
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool};

use crate::error::{NexusError, NexusResult};
use crate::types::{NetworkDescriptor, ResourceQuotas};

/// Storage contract for `NetworkDescriptor` rows.
#[async_trait::async_trait]
pub trait NetworkStore: Send + Sync {
    async fn get(&self, name: &str) -> NexusResult<NetworkDescriptor>;

    async fn save(&self, descriptor: &NetworkDescriptor) -> NexusResult<()>;

    /// Networks with a zero activation timestamp and `disabled = false`,
    /// the boot-reconciliation source set.
    async fn list_inactive_enabled(&self) -> NexusResult<Vec<NetworkDescriptor>>;
}

// ── Postgres-backed implementation ──────────────────────────────

#[derive(FromRow)]
struct NetworkRow {
    name: String,
    swarm_key: Vec<u8>,
    authorized_users: Vec<String>,
    gateway_public: bool,
    api_allowed_origin: String,
    bootstrap_peers: Vec<String>,
    cpus: f64,
    memory_gb: f64,
    disk_gb: f64,
    activated_at: Option<chrono::DateTime<chrono::Utc>>,
    disabled: bool,
}

impl From<NetworkRow> for NetworkDescriptor {
    fn from(r: NetworkRow) -> Self {
        NetworkDescriptor {
            name: r.name,
            swarm_key: r.swarm_key,
            authorized_users: r.authorized_users,
            gateway_public: r.gateway_public,
            api_allowed_origin: r.api_allowed_origin,
            bootstrap_peers: r.bootstrap_peers,
            resources: ResourceQuotas { cpus: r.cpus, memory_gb: r.memory_gb, disk_gb: r.disk_gb },
            activated_at: r.activated_at,
            disabled: r.disabled,
        }
    }
}

pub struct PostgresNetworkStore {
    pool: PgPool,
}

impl PostgresNetworkStore {
    pub async fn connect(connection_string: &str) -> NexusResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(connection_string)
            .await
            .map_err(|e| NexusError::Store(e.to_string()))?;
        Ok(Self { pool })
    }

    /// Creates the `networks` table if it does not already exist.
    pub async fn migrate(&self) -> NexusResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS networks (
                name TEXT PRIMARY KEY,
                swarm_key BYTEA NOT NULL DEFAULT ''::bytea,
                authorized_users TEXT[] NOT NULL DEFAULT '{}',
                gateway_public BOOLEAN NOT NULL DEFAULT FALSE,
                api_allowed_origin TEXT NOT NULL DEFAULT '',
                bootstrap_peers TEXT[] NOT NULL DEFAULT '{}',
                cpus DOUBLE PRECISION NOT NULL DEFAULT 1.0,
                memory_gb DOUBLE PRECISION NOT NULL DEFAULT 1.0,
                disk_gb DOUBLE PRECISION NOT NULL DEFAULT 1.0,
                activated_at TIMESTAMPTZ,
                disabled BOOLEAN NOT NULL DEFAULT FALSE
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| NexusError::Store(e.to_string()))?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl NetworkStore for PostgresNetworkStore {
    async fn get(&self, name: &str) -> NexusResult<NetworkDescriptor> {
        let row = sqlx::query_as::<_, NetworkRow>("SELECT * FROM networks WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| NexusError::Store(e.to_string()))?
            .ok_or_else(|| NexusError::NotFound(name.to_string()))?;
        Ok(row.into())
    }

    async fn save(&self, d: &NetworkDescriptor) -> NexusResult<()> {
        sqlx::query(
            r#"
            INSERT INTO networks (
                name, swarm_key, authorized_users, gateway_public, api_allowed_origin,
                bootstrap_peers, cpus, memory_gb, disk_gb, activated_at, disabled
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (name) DO UPDATE SET
                swarm_key = EXCLUDED.swarm_key,
                authorized_users = EXCLUDED.authorized_users,
                gateway_public = EXCLUDED.gateway_public,
                api_allowed_origin = EXCLUDED.api_allowed_origin,
                bootstrap_peers = EXCLUDED.bootstrap_peers,
                cpus = EXCLUDED.cpus,
                memory_gb = EXCLUDED.memory_gb,
                disk_gb = EXCLUDED.disk_gb,
                activated_at = EXCLUDED.activated_at,
                disabled = EXCLUDED.disabled
            "#,
        )
        .bind(&d.name)
        .bind(&d.swarm_key)
        .bind(&d.authorized_users)
        .bind(d.gateway_public)
        .bind(&d.api_allowed_origin)
        .bind(&d.bootstrap_peers)
        .bind(d.resources.cpus)
        .bind(d.resources.memory_gb)
        .bind(d.resources.disk_gb)
        .bind(d.activated_at)
        .bind(d.disabled)
        .execute(&self.pool)
        .await
        .map_err(|e| NexusError::Store(e.to_string()))?;
        Ok(())
    }

    async fn list_inactive_enabled(&self) -> NexusResult<Vec<NetworkDescriptor>> {
        let rows = sqlx::query_as::<_, NetworkRow>(
            "SELECT * FROM networks WHERE activated_at IS NULL AND disabled = FALSE",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| NexusError::Store(e.to_string()))?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}

// ── In-memory implementation, for tests ─────────────────────────

#[derive(Default)]
pub struct InMemoryNetworkStore {
    rows: RwLock<HashMap<String, NetworkDescriptor>>,
}

impl InMemoryNetworkStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, descriptor: NetworkDescriptor) {
        self.rows.write().insert(descriptor.name.clone(), descriptor);
    }
}

#[async_trait::async_trait]
impl NetworkStore for InMemoryNetworkStore {
    async fn get(&self, name: &str) -> NexusResult<NetworkDescriptor> {
        self.rows.read().get(name).cloned().ok_or_else(|| NexusError::NotFound(name.to_string()))
    }

    async fn save(&self, descriptor: &NetworkDescriptor) -> NexusResult<()> {
        self.rows.write().insert(descriptor.name.clone(), descriptor.clone());
        Ok(())
    }

    async fn list_inactive_enabled(&self) -> NexusResult<Vec<NetworkDescriptor>> {
        Ok(self.rows.read().values().filter(|d| d.activated_at.is_none() && !d.disabled).cloned().collect())
    }
}
