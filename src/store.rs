use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tokio::time::sleep;
use tracing::{debug, instrument};

use crate::context::ExecutionContext;
use crate::import::{ImportOutcome, ImportTarget, import_sheet};
use crate::model::{City, Country, NewCity, NewCountry};
use crate::sheet::Sheet;
use crate::tables::Table;
use crate::{Error, Result};

const IMPORT_LOCK_NAME: &str = "worldcities.import";

/// The import pins one connection for its advisory lock and reads and writes
/// through the pool, so a smaller pool deadlocks until the acquire timeout.
pub const MIN_CONNECTIONS: u32 = 2;

fn advisory_lock_key(name: &str) -> i64 {
    const FNV_OFFSET_BASIS: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;

    let mut hash = FNV_OFFSET_BASIS;
    for byte in name.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }

    // Clamp to positive i64 so advisory locks stay within valid range.
    (hash & 0x7FFF_FFFF_FFFF_FFFF) as i64
}

#[derive(Clone)]
pub struct Store {
    pool: PgPool,
}

impl Store {
    pub async fn connect(url: &str) -> Result<Self> {
        Self::builder(url).build().await
    }

    pub fn builder(url: impl Into<String>) -> StoreBuilder {
        StoreBuilder::new(url)
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn countries(&self) -> Table<Country> {
        Table::new(self.pool.clone())
    }

    pub fn cities(&self) -> Table<City> {
        Table::new(self.pool.clone())
    }

    /// Applies the bundled schema. Safe to run repeatedly.
    pub async fn migrate(&self) -> Result<()> {
        crate::testing::migrate_core_schema(&self.pool).await
    }

    /// Lightweight liveness check for the connection pool.
    pub async fn ping(&self) -> Result<()> {
        let _: i32 = sqlx::query_scalar("select 1")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| Error::unavailable("database", e))?;
        Ok(())
    }

    /// Imports the CSV at `path` into this database.
    ///
    /// The capability is checked before the file is opened. The run holds a
    /// session advisory lock so imports from separate processes never overlap.
    /// The lock pins one pooled connection for the whole run, which is why
    /// pools are never smaller than [`MIN_CONNECTIONS`].
    #[instrument(skip_all, fields(environment = %ctx.environment))]
    pub async fn import(&self, ctx: &ExecutionContext, path: &Path) -> Result<ImportOutcome> {
        let capability = ctx.import_capability()?;
        let sheet = Sheet::from_csv_path(&ctx.resolve_path(path))?;

        let lock_key = advisory_lock_key(IMPORT_LOCK_NAME);
        let mut conn = self.pool.acquire().await?;
        let mut backoff = Duration::from_millis(50);

        loop {
            let acquired: bool = sqlx::query_scalar("select pg_try_advisory_lock($1)")
                .bind(lock_key)
                .fetch_one(&mut *conn)
                .await?;

            if acquired {
                break;
            }

            debug!(?backoff, "import lock held elsewhere, waiting");
            drop(conn);
            sleep(backoff).await;
            backoff = (backoff * 2).min(Duration::from_secs(2));
            conn = self.pool.acquire().await?;
        }

        let import_result = import_sheet(&capability, &sheet, self).await;

        let unlock_result = sqlx::query("select pg_advisory_unlock($1)")
            .bind(lock_key)
            .execute(&mut *conn)
            .await;

        drop(conn);

        let outcome = import_result?;
        unlock_result?;
        Ok(outcome)
    }
}

#[async_trait]
impl ImportTarget for Store {
    async fn load_countries(&self) -> Result<Vec<Country>> {
        self.countries().all().await
    }

    async fn insert_countries(&self, batch: Vec<NewCountry>) -> Result<Vec<Country>> {
        self.countries().insert_batch(batch).await
    }

    async fn load_cities(&self) -> Result<Vec<City>> {
        self.cities().all().await
    }

    async fn insert_cities(&self, batch: Vec<NewCity>) -> Result<Vec<City>> {
        self.cities().insert_batch(batch).await
    }
}

pub struct StoreBuilder {
    url: String,
    max_connections: Option<u32>,
    acquire_timeout: Option<Duration>,
}

impl StoreBuilder {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: None,
            acquire_timeout: None,
        }
    }

    /// Values below [`MIN_CONNECTIONS`] are raised to it.
    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = Some(max.max(MIN_CONNECTIONS));
        self
    }

    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = Some(timeout);
        self
    }

    /// Connects the pool. Connection failures surface as `SourceUnavailable`.
    pub async fn build(self) -> Result<Store> {
        let mut opts = PgPoolOptions::new();
        if let Some(max) = self.max_connections {
            opts = opts.max_connections(max);
        }
        if let Some(t) = self.acquire_timeout {
            opts = opts.acquire_timeout(t);
        }
        let pool = opts
            .connect(&self.url)
            .await
            .map_err(|e| Error::unavailable("database", e))?;
        Ok(Store { pool })
    }
}
