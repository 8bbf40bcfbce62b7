// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Cache store access.
//!
//! Everything that touches the store goes through a [`TxScope`] obtained from
//! a [`TransactionalAccess`] implementation. The closure helpers commit on
//! `Ok` and roll back on `Err`:
//!
//! ```rust,no_run
//! # use directory_cache::storage::{SqlCacheStore, TransactionalAccess};
//! # use directory_cache::query::clause;
//! # async fn demo(store: SqlCacheStore) -> Result<(), directory_cache::DirectoryError> {
//! let groups = store
//!     .with_read_access(|scope| {
//!         Box::pin(async move {
//!             let count = scope
//!                 .query_by_id(clause::ENTITY_COUNT)?
//!                 .on("entity_type", "GROUP")
//!                 .fetch_scalar(scope)
//!                 .await?;
//!             Ok(count.and_then(|value| value.as_integer()).unwrap_or(0))
//!         })
//!     })
//!     .await?;
//! # let _ = groups;
//! # Ok(())
//! # }
//! ```

mod dialect;
mod scope;
mod sql;

use std::future::Future;

use futures::future::BoxFuture;
use tracing::warn;

pub use dialect::{Dialect, MULTI_VALUE_SEPARATOR};
pub use scope::{Access, TxScope};
pub use sql::SqlCacheStore;

use crate::error::DirectoryError;

/// Source of read and write transaction scopes.
pub trait TransactionalAccess: Send + Sync {
    /// Shared scope; concurrent with other readers.
    fn read_scope(&self) -> impl Future<Output = Result<TxScope, DirectoryError>> + Send;

    /// Exclusive scope; waits for every open scope to finish.
    fn write_scope(&self) -> impl Future<Output = Result<TxScope, DirectoryError>> + Send;

    /// Run `block` under read access. The scope is released on every path.
    fn with_read_access<T, F>(
        &self,
        block: F,
    ) -> impl Future<Output = Result<T, DirectoryError>> + Send
    where
        T: Send,
        F: for<'s> FnOnce(&'s mut TxScope) -> BoxFuture<'s, Result<T, DirectoryError>> + Send,
    {
        async move {
            let scope = self.read_scope().await?;
            run_scoped(scope, block).await
        }
    }

    /// Run `block` under write access; committed only if it returns `Ok`.
    fn with_write_access<T, F>(
        &self,
        block: F,
    ) -> impl Future<Output = Result<T, DirectoryError>> + Send
    where
        T: Send,
        F: for<'s> FnOnce(&'s mut TxScope) -> BoxFuture<'s, Result<T, DirectoryError>> + Send,
    {
        async move {
            let scope = self.write_scope().await?;
            run_scoped(scope, block).await
        }
    }
}

async fn run_scoped<T, F>(mut scope: TxScope, block: F) -> Result<T, DirectoryError>
where
    F: for<'s> FnOnce(&'s mut TxScope) -> BoxFuture<'s, Result<T, DirectoryError>>,
{
    match block(&mut scope).await {
        Ok(value) => {
            scope.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = scope.rollback().await {
                warn!(error = %rollback_err, "Rollback failed after scoped block error");
            }
            Err(err)
        }
    }
}
