//! Database Connection and Record Store
//!
//! Connection pooling via deadpool-postgres and the PostgreSQL
//! implementation of [`RecordStore`]. The `products` and
//! `propagation_tasks` tables are created by [`PgRecordStore::migrate`];
//! prices are stored as `NUMERIC(10,2)` and converted to integer cents
//! inside SQL.

use std::time::Duration;

use async_trait::async_trait;
use deadpool_postgres::{Config, ManagerConfig, Pool, PoolError, RecyclingMethod, Runtime};
use tokio_postgres::error::SqlState;
use tokio_postgres::{NoTls, Row};
use vitrine_core::{
    CatalogRecord, LifecycleEvent, NewRecord, Price, RecordId, RecordPatch, RecordStatus,
    StorageError, VitrineError, VitrineResult,
};
use vitrine_storage::{Committed, RecordPage, RecordStore};

use crate::constants::*;

const MIGRATION_V1: &str = include_str!("../migrations/V1__products.sql");
const MIGRATION_V2: &str = include_str!("../migrations/V2__propagation_tasks.sql");

const RECORD_COLUMNS: &str = "id, sku, name, description, (price * 100)::BIGINT AS price_cents, \
     category, status, image_path, created_at, updated_at, deleted_at";

// ============================================================================
// DATABASE CONFIGURATION
// ============================================================================

/// Database connection configuration.
#[derive(Clone)]
pub struct DbConfig {
    /// PostgreSQL host
    pub host: String,
    /// PostgreSQL port
    pub port: u16,
    /// Database name
    pub dbname: String,
    /// Database user
    pub user: String,
    /// Database password
    pub password: String,
    /// Maximum pool size
    pub max_size: usize,
    /// Connection wait timeout
    pub timeout: Duration,
}

impl std::fmt::Debug for DbConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("dbname", &self.dbname)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("max_size", &self.max_size)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_DB_HOST.to_string(),
            port: DEFAULT_DB_PORT,
            dbname: DEFAULT_DB_NAME.to_string(),
            user: DEFAULT_DB_USER.to_string(),
            password: String::new(),
            max_size: DEFAULT_DB_POOL_SIZE,
            timeout: Duration::from_secs(DEFAULT_DB_TIMEOUT_SECS),
        }
    }
}

impl DbConfig {
    /// Create a new database configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("VITRINE_DB_HOST").unwrap_or_else(|_| DEFAULT_DB_HOST.to_string()),
            port: std::env::var("VITRINE_DB_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_DB_PORT),
            dbname: std::env::var("VITRINE_DB_NAME").unwrap_or_else(|_| DEFAULT_DB_NAME.to_string()),
            user: std::env::var("VITRINE_DB_USER").unwrap_or_else(|_| DEFAULT_DB_USER.to_string()),
            password: std::env::var("VITRINE_DB_PASSWORD").unwrap_or_default(),
            max_size: std::env::var("VITRINE_DB_POOL_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_DB_POOL_SIZE),
            timeout: Duration::from_secs(
                std::env::var("VITRINE_DB_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_DB_TIMEOUT_SECS),
            ),
        }
    }

    /// Create a connection pool from this configuration.
    pub fn create_pool(&self) -> VitrineResult<Pool> {
        let mut cfg = Config::new();
        cfg.host = Some(self.host.clone());
        cfg.port = Some(self.port);
        cfg.dbname = Some(self.dbname.clone());
        cfg.user = Some(self.user.clone());
        cfg.password = Some(self.password.clone());

        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });
        let mut pool_cfg = deadpool_postgres::PoolConfig::new(self.max_size);
        pool_cfg.timeouts.wait = Some(self.timeout);
        cfg.pool = Some(pool_cfg);

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| StorageError::Unavailable {
                reason: format!("Failed to create pool: {}", e),
            })?;

        Ok(pool)
    }
}

// ============================================================================
// ERROR MAPPING
// ============================================================================

fn pool_error(err: PoolError) -> VitrineError {
    tracing::error!("Connection pool error: {:?}", err);
    let reason = match err {
        PoolError::Timeout(_) => "connection pool exhausted".to_string(),
        PoolError::Closed => "connection pool is closed".to_string(),
        other => format!("failed to acquire connection: {}", other),
    };
    StorageError::Unavailable { reason }.into()
}

/// Map a driver error, recognising unique violations on the SKU column.
fn query_error(err: tokio_postgres::Error, sku: Option<&str>) -> VitrineError {
    if err.code() == Some(&SqlState::UNIQUE_VIOLATION) {
        if let Some(sku) = sku {
            return StorageError::DuplicateSku {
                sku: sku.to_string(),
            }
            .into();
        }
    }
    tracing::error!("Database error: {:?}", err);
    StorageError::Unavailable {
        reason: "database operation failed".to_string(),
    }
    .into()
}

fn record_from_row(row: &Row) -> VitrineResult<CatalogRecord> {
    let id = RecordId::new(row.get("id"));
    let status: String = row.get("status");
    let status: RecordStatus = status.parse()?;
    Ok(CatalogRecord {
        id,
        sku: row.get("sku"),
        name: row.get("name"),
        description: row.get("description"),
        price: Price::from_cents(row.get("price_cents"))?,
        category: row.get("category"),
        status,
        image_path: row.get("image_path"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        deleted_at: row.get("deleted_at"),
    })
}

// ============================================================================
// POSTGRES RECORD STORE
// ============================================================================

/// Record store backed by the `products` table.
#[derive(Clone)]
pub struct PgRecordStore {
    pool: Pool,
}

impl PgRecordStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub fn from_config(config: &DbConfig) -> VitrineResult<Self> {
        Ok(Self::new(config.create_pool()?))
    }

    /// Get the current pool size for observability.
    pub fn pool_size(&self) -> usize {
        self.pool.status().size
    }

    /// The underlying pool, shared with the propagation queue.
    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    async fn get_conn(&self) -> VitrineResult<deadpool_postgres::Object> {
        self.pool.get().await.map_err(pool_error)
    }

    /// Create the schema if it does not exist yet.
    pub async fn migrate(&self) -> VitrineResult<()> {
        let conn = self.get_conn().await?;
        for migration in [MIGRATION_V1, MIGRATION_V2] {
            conn.batch_execute(migration)
                .await
                .map_err(|e| query_error(e, None))?;
        }
        tracing::info!("catalog schema ready");
        Ok(())
    }
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn get(
        &self,
        id: RecordId,
        include_soft_deleted: bool,
    ) -> VitrineResult<Option<CatalogRecord>> {
        let conn = self.get_conn().await?;
        let sql = format!(
            "SELECT {} FROM products WHERE id = $1 AND ($2 OR deleted_at IS NULL)",
            RECORD_COLUMNS
        );
        let row = conn
            .query_opt(&sql, &[&id.get(), &include_soft_deleted])
            .await
            .map_err(|e| query_error(e, None))?;
        row.as_ref().map(record_from_row).transpose()
    }

    async fn insert(&self, new: NewRecord) -> VitrineResult<Committed<CatalogRecord>> {
        let conn = self.get_conn().await?;
        let sql = format!(
            "INSERT INTO products (sku, name, description, price, category, status, image_path) \
             VALUES ($1, $2, $3, ($4::BIGINT::NUMERIC / 100), $5, $6, $7) \
             RETURNING {}",
            RECORD_COLUMNS
        );
        let row = conn
            .query_one(
                &sql,
                &[
                    &new.sku,
                    &new.name,
                    &new.description,
                    &new.price.cents(),
                    &new.category,
                    &new.status.as_str(),
                    &new.image_path,
                ],
            )
            .await
            .map_err(|e| query_error(e, Some(&new.sku)))?;

        let record = record_from_row(&row)?;
        let event = LifecycleEvent::Created(record.id);
        Ok(Committed::new(record, event))
    }

    async fn update(
        &self,
        id: RecordId,
        patch: RecordPatch,
    ) -> VitrineResult<Committed<CatalogRecord>> {
        let mut conn = self.get_conn().await?;
        let tx = conn.transaction().await.map_err(|e| query_error(e, None))?;

        let select = format!("SELECT {} FROM products WHERE id = $1 FOR UPDATE", RECORD_COLUMNS);
        let current = tx
            .query_opt(&select, &[&id.get()])
            .await
            .map_err(|e| query_error(e, None))?
            .ok_or(StorageError::NotFound { id })?;
        let mut record = record_from_row(&current)?;
        patch.apply_to(&mut record);

        let update = format!(
            "UPDATE products SET sku = $2, name = $3, description = $4, \
             price = ($5::BIGINT::NUMERIC / 100), category = $6, status = $7, \
             image_path = $8, updated_at = now() \
             WHERE id = $1 RETURNING {}",
            RECORD_COLUMNS
        );
        let row = tx
            .query_one(
                &update,
                &[
                    &id.get(),
                    &record.sku,
                    &record.name,
                    &record.description,
                    &record.price.cents(),
                    &record.category,
                    &record.status.as_str(),
                    &record.image_path,
                ],
            )
            .await
            .map_err(|e| query_error(e, Some(&record.sku)))?;
        tx.commit().await.map_err(|e| query_error(e, None))?;

        Ok(Committed::new(record_from_row(&row)?, LifecycleEvent::Updated(id)))
    }

    async fn soft_delete(&self, id: RecordId) -> VitrineResult<Committed<CatalogRecord>> {
        let conn = self.get_conn().await?;
        let sql = format!(
            "UPDATE products SET deleted_at = now(), updated_at = now() \
             WHERE id = $1 AND deleted_at IS NULL RETURNING {}",
            RECORD_COLUMNS
        );
        let row = conn
            .query_opt(&sql, &[&id.get()])
            .await
            .map_err(|e| query_error(e, None))?
            .ok_or(StorageError::NotFound { id })?;
        Ok(Committed::new(record_from_row(&row)?, LifecycleEvent::SoftDeleted(id)))
    }

    async fn restore(&self, id: RecordId) -> VitrineResult<Committed<CatalogRecord>> {
        let conn = self.get_conn().await?;
        let sql = format!(
            "UPDATE products SET deleted_at = NULL, updated_at = now() \
             WHERE id = $1 AND deleted_at IS NOT NULL RETURNING {}",
            RECORD_COLUMNS
        );
        let row = conn
            .query_opt(&sql, &[&id.get()])
            .await
            .map_err(|e| query_error(e, None))?;

        match row {
            Some(row) => Ok(Committed::new(record_from_row(&row)?, LifecycleEvent::Restored(id))),
            None => {
                let exists = conn
                    .query_opt("SELECT 1 FROM products WHERE id = $1", &[&id.get()])
                    .await
                    .map_err(|e| query_error(e, None))?
                    .is_some();
                if exists {
                    Err(StorageError::InvalidState {
                        id,
                        action: "restored".to_string(),
                        reason: "record is not deleted".to_string(),
                    }
                    .into())
                } else {
                    Err(StorageError::NotFound { id }.into())
                }
            }
        }
    }

    async fn hard_delete(&self, id: RecordId) -> VitrineResult<Committed<RecordId>> {
        let conn = self.get_conn().await?;
        let removed = conn
            .execute("DELETE FROM products WHERE id = $1", &[&id.get()])
            .await
            .map_err(|e| query_error(e, None))?;
        if removed == 0 {
            return Err(StorageError::NotFound { id }.into());
        }
        Ok(Committed::new(id, LifecycleEvent::HardDeleted(id)))
    }

    async fn list(&self, page: u32, per_page: u32) -> VitrineResult<RecordPage> {
        let conn = self.get_conn().await?;
        let page = page.max(1);
        let offset = i64::from(page - 1) * i64::from(per_page);

        let total: i64 = conn
            .query_one("SELECT COUNT(*) FROM products WHERE deleted_at IS NULL", &[])
            .await
            .map_err(|e| query_error(e, None))?
            .get(0);

        let sql = format!(
            "SELECT {} FROM products WHERE deleted_at IS NULL ORDER BY id LIMIT $1 OFFSET $2",
            RECORD_COLUMNS
        );
        let rows = conn
            .query(&sql, &[&i64::from(per_page), &offset])
            .await
            .map_err(|e| query_error(e, None))?;
        let data = rows
            .iter()
            .map(record_from_row)
            .collect::<VitrineResult<Vec<_>>>()?;

        Ok(RecordPage {
            data,
            total: total.max(0) as u64,
            page,
            per_page,
        })
    }

    async fn live_ids_after(
        &self,
        after: Option<RecordId>,
        limit: usize,
    ) -> VitrineResult<Vec<RecordId>> {
        let conn = self.get_conn().await?;
        let after = after.map(RecordId::get).unwrap_or(0);
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = conn
            .query(
                "SELECT id FROM products WHERE deleted_at IS NULL AND id > $1 \
                 ORDER BY id LIMIT $2",
                &[&after, &limit],
            )
            .await
            .map_err(|e| query_error(e, None))?;
        Ok(rows.iter().map(|row| RecordId::new(row.get(0))).collect())
    }

    async fn ping(&self) -> VitrineResult<()> {
        let conn = self.get_conn().await?;
        conn.simple_query("SELECT 1")
            .await
            .map_err(|e| query_error(e, None))?;
        Ok(())
    }
}
