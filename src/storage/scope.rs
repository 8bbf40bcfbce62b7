// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Transaction scopes.
//!
//! A [`TxScope`] is one store transaction plus the in-process access guard it
//! was opened under. Read scopes share the guard; a write scope holds it
//! exclusively, so no reader observes a half-applied sync primitive.
//! Dropping a scope without [`TxScope::commit`] rolls the transaction back.
//! A commit hook, if one is attached, runs after the commit succeeded and
//! before the access guard is released.

use sqlx::{Any, AnyConnection, Transaction};
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard};

use super::Dialect;
use crate::error::DirectoryError;
use crate::query::QueryDef;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
}

pub(crate) enum AccessGuard {
    Read(OwnedRwLockReadGuard<()>),
    Write(OwnedRwLockWriteGuard<()>),
}

impl AccessGuard {
    fn access(&self) -> Access {
        match self {
            AccessGuard::Read(_) => Access::Read,
            AccessGuard::Write(_) => Access::Write,
        }
    }
}

type CommitHook = Box<dyn FnOnce() + Send + Sync>;

pub struct TxScope {
    // Declared first: the transaction is dropped (rolled back) before the
    // guard is released.
    tx: Transaction<'static, Any>,
    guard: AccessGuard,
    dialect: Dialect,
    on_commit: Option<CommitHook>,
}

impl TxScope {
    pub(crate) fn new(tx: Transaction<'static, Any>, guard: AccessGuard, dialect: Dialect) -> Self {
        Self {
            tx,
            guard,
            dialect,
            on_commit: None,
        }
    }

    /// Run `hook` once this scope commits. Replaces any earlier hook.
    #[must_use]
    pub(crate) fn on_commit(mut self, hook: impl FnOnce() + Send + Sync + 'static) -> Self {
        self.on_commit = Some(Box::new(hook));
        self
    }

    #[must_use]
    pub fn access(&self) -> Access {
        self.guard.access()
    }

    #[must_use]
    pub fn is_write(&self) -> bool {
        self.access() == Access::Write
    }

    #[must_use]
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Catalog clause for this scope's dialect.
    pub fn query_by_id(&self, clause_id: &str) -> Result<QueryDef, DirectoryError> {
        QueryDef::by_id(self.dialect, clause_id)
    }

    /// Ad-hoc statement.
    pub fn query(&self, sql: impl Into<String>) -> QueryDef {
        QueryDef::new(sql)
    }

    pub(crate) fn connection(&mut self) -> &mut AnyConnection {
        &mut *self.tx
    }

    pub async fn commit(self) -> Result<(), DirectoryError> {
        let TxScope {
            tx,
            guard,
            on_commit,
            ..
        } = self;
        tx.commit().await?;
        if let Some(hook) = on_commit {
            hook();
        }
        drop(guard);
        Ok(())
    }

    pub async fn rollback(self) -> Result<(), DirectoryError> {
        self.tx.rollback().await?;
        Ok(())
    }
}
