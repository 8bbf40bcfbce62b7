// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! SQL cache store (SQLite or MySQL through the sqlx `Any` driver).
//!
//! ## sqlx Any Driver Quirks
//!
//! - Drivers must be installed at runtime before the first connect.
//! - MySQL TEXT columns come back as bytes; [`ResultRow`](crate::query::ResultRow)
//!   decodes them as UTF-8.
//! - No native JSON/ENUM mapping, so every column is TEXT/VARCHAR/INTEGER.

use std::sync::{Arc, Once};
use std::time::Duration;

use sqlx::any::AnyPoolOptions;
use sqlx::AnyPool;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};

use super::scope::{AccessGuard, TxScope};
use super::{Dialect, TransactionalAccess};
use crate::config::DirectoryCacheConfig;
use crate::error::DirectoryError;
use crate::resilience::{retry, RetryConfig};

static INSTALL_DRIVERS: Once = Once::new();

fn install_drivers() {
    INSTALL_DRIVERS.call_once(|| {
        sqlx::any::install_default_drivers();
    });
}

/// Connection pool plus the reader/writer guard shared by every scope.
#[derive(Clone)]
pub struct SqlCacheStore {
    pool: AnyPool,
    dialect: Dialect,
    access: Arc<RwLock<()>>,
}

impl SqlCacheStore {
    /// Connect with startup-mode retry (fails fast if the URL is wrong) and
    /// create the schema if missing.
    #[instrument(skip_all)]
    pub async fn connect(config: &DirectoryCacheConfig) -> Result<Self, DirectoryError> {
        install_drivers();
        let dialect = Dialect::from_url(&config.sql_url)?;

        let pool = retry("sql_connect", &RetryConfig::startup(), || async {
            AnyPoolOptions::new()
                .max_connections(config.max_connections)
                .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
                .idle_timeout(Duration::from_secs(300))
                .connect(&config.sql_url)
                .await
                .map_err(DirectoryError::from)
        })
        .await?;

        let store = Self {
            pool,
            dialect,
            access: Arc::new(RwLock::new(())),
        };

        if dialect == Dialect::Sqlite {
            store.enable_wal_mode().await?;
        }
        store.init_schema().await?;

        info!(dialect = dialect.name(), "Cache store ready");
        Ok(store)
    }

    #[must_use]
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Get a clone of the connection pool.
    #[must_use]
    pub fn pool(&self) -> AnyPool {
        self.pool.clone()
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// WAL lets readers proceed while a sync primitive commits.
    async fn enable_wal_mode(&self) -> Result<(), DirectoryError> {
        sqlx::query("PRAGMA journal_mode = WAL")
            .execute(&self.pool)
            .await
            .map_err(|e| {
                DirectoryError::DirectoryAccessFailure(format!("Failed to enable WAL mode: {e}"))
            })?;

        sqlx::query("PRAGMA synchronous = NORMAL")
            .execute(&self.pool)
            .await
            .map_err(|e| {
                DirectoryError::DirectoryAccessFailure(format!(
                    "Failed to set synchronous mode: {e}"
                ))
            })?;

        Ok(())
    }

    async fn init_schema(&self) -> Result<(), DirectoryError> {
        for statement in self.dialect.schema() {
            retry("sql_init_schema", &RetryConfig::startup(), || async {
                sqlx::query(statement).execute(&self.pool).await?;
                Ok(())
            })
            .await?;
        }
        debug!(statements = self.dialect.schema().len(), "Schema initialized");
        Ok(())
    }
}

impl TransactionalAccess for SqlCacheStore {
    async fn read_scope(&self) -> Result<TxScope, DirectoryError> {
        let guard = self.access.clone().read_owned().await;
        let tx = self.pool.begin().await?;
        Ok(TxScope::new(tx, AccessGuard::Read(guard), self.dialect))
    }

    async fn write_scope(&self) -> Result<TxScope, DirectoryError> {
        let guard = self.access.clone().write_owned().await;
        let tx = self.pool.begin().await?;
        Ok(TxScope::new(tx, AccessGuard::Write(guard), self.dialect))
    }
}
