//! Local data-store emulator.

use std::sync::Arc;

use async_trait::async_trait;
use sandbox_core::{
    SandboxError, Subsystem, SubsystemConfig, SubsystemHandle, SubsystemStarter, TableSpec,
};
use sqlx::SqlitePool;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::pool::{create_pool, run_migrations, MEMORY_DATABASE_URL};
use crate::repositories::ItemRepository;

/// Points the store at a SQLite file instead of memory.
pub const DB_PATH_ENV: &str = "SANDBOX_DB_PATH";
pub const SESSION_TABLE_ENV: &str = "SESSION_TABLE_NAME";
const SESSION_PARTITION_KEY: &str = "_idx";

/// Where the running store publishes its pool for the other subsystems.
#[derive(Clone, Default)]
pub struct StoreSlot {
    inner: Arc<RwLock<Option<SqlitePool>>>,
}

impl StoreSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self) -> Option<SqlitePool> {
        self.inner.read().await.clone()
    }

    pub async fn is_available(&self) -> bool {
        self.inner.read().await.is_some()
    }

    async fn set(&self, pool: SqlitePool) {
        *self.inner.write().await = Some(pool);
    }

    async fn clear(&self) {
        self.inner.write().await.take();
    }
}

impl std::fmt::Debug for StoreSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreSlot").finish_non_exhaustive()
    }
}

/// Starts the SQLite-backed table store declared by the manifest.
pub struct DataStoreEmulator {
    slot: StoreSlot,
}

impl DataStoreEmulator {
    pub fn new(slot: StoreSlot) -> Self {
        Self { slot }
    }

    fn database_url(config: &SubsystemConfig) -> String {
        match config.env_var(DB_PATH_ENV) {
            Some(path) if !path.is_empty() => format!("sqlite:{path}"),
            _ => MEMORY_DATABASE_URL.to_string(),
        }
    }

    async fn provision(config: &SubsystemConfig) -> Result<SqlitePool, crate::DbError> {
        let database_url = Self::database_url(config);
        debug!(database_url = %database_url, "Opening data store");

        let pool = create_pool(&database_url).await?;
        run_migrations(&pool).await?;

        let repo = ItemRepository::new(pool.clone());
        for table in &config.manifest.tables {
            repo.create_table(table).await?;
        }
        if let Some(session_table) = config.env_var(SESSION_TABLE_ENV) {
            let mut table = TableSpec::new(session_table);
            table.partition_key = SESSION_PARTITION_KEY.to_string();
            repo.create_table(&table).await?;
        }

        Ok(pool)
    }
}

#[async_trait]
impl SubsystemStarter for DataStoreEmulator {
    fn subsystem(&self) -> Subsystem {
        Subsystem::DataStore
    }

    async fn start(
        &self,
        config: &SubsystemConfig,
    ) -> sandbox_core::Result<Box<dyn SubsystemHandle>> {
        let pool = Self::provision(config)
            .await
            .map_err(|e| SandboxError::start_failed(Subsystem::DataStore, e))?;

        self.slot.set(pool.clone()).await;
        info!(
            tables = config.manifest.tables.len(),
            "Tables created in local database"
        );

        Ok(Box::new(DataStoreHandle {
            pool,
            slot: self.slot.clone(),
            live: true,
        }))
    }
}

pub struct DataStoreHandle {
    pool: SqlitePool,
    slot: StoreSlot,
    live: bool,
}

#[async_trait]
impl SubsystemHandle for DataStoreHandle {
    fn subsystem(&self) -> Subsystem {
        Subsystem::DataStore
    }

    fn is_live(&self) -> bool {
        self.live && !self.pool.is_closed()
    }

    async fn close(&mut self) -> sandbox_core::Result<()> {
        if !self.live {
            return Ok(());
        }
        self.slot.clear().await;
        self.pool.close().await;
        self.live = false;
        debug!("Data store closed");
        Ok(())
    }
}
