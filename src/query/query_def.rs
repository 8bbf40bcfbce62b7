// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Immutable parameterized statement.
//!
//! A [`QueryDef`] carries SQL text with `:name` and `?` placeholders plus the
//! values bound so far. Binding never mutates: [`QueryDef::on`] returns a new
//! definition, so a base definition can be shared and specialized freely.
//!
//! ```
//! use directory_cache::query::QueryDef;
//!
//! let base = QueryDef::new("SELECT id FROM cache_entities WHERE entity_type = :t AND id_key = :k");
//! let alice = base.on("t", "USER").on("k", "alice");
//! let compiled = alice.compile().unwrap();
//! assert_eq!(compiled.sql, "SELECT id FROM cache_entities WHERE entity_type = ? AND id_key = ?");
//! assert_eq!(compiled.params.len(), 2);
//! assert!(base.compile().is_err(), "base stays unbound");
//! ```

use std::sync::Arc;

use sqlx::any::AnyArguments;
use sqlx::query::Query;
use sqlx::Any;

use super::catalog;
use super::value::{ResultRow, ResultSet, SqlValue};
use crate::error::DirectoryError;
use crate::metrics::LatencyTimer;
use crate::storage::{Dialect, TxScope};

/// What the caller expects back from [`QueryDef::execute`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultKind {
    /// Affected row count
    Update,
    /// First column of the first row
    Scalar,
    /// First row
    Row,
    /// Every row
    Rows,
}

impl ResultKind {
    fn label(&self) -> &'static str {
        match self {
            ResultKind::Update => "update",
            ResultKind::Scalar => "scalar",
            ResultKind::Row => "row",
            ResultKind::Rows => "rows",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueryResult {
    Updated(u64),
    Scalar(Option<SqlValue>),
    Row(Option<ResultRow>),
    Rows(ResultSet),
}

impl QueryResult {
    pub fn into_updated(self) -> Result<u64, DirectoryError> {
        match self {
            QueryResult::Updated(count) => Ok(count),
            other => Err(mismatch("update count", &other)),
        }
    }

    pub fn into_scalar(self) -> Result<Option<SqlValue>, DirectoryError> {
        match self {
            QueryResult::Scalar(value) => Ok(value),
            other => Err(mismatch("scalar", &other)),
        }
    }

    pub fn into_row(self) -> Result<Option<ResultRow>, DirectoryError> {
        match self {
            QueryResult::Row(row) => Ok(row),
            other => Err(mismatch("row", &other)),
        }
    }

    pub fn into_rows(self) -> Result<ResultSet, DirectoryError> {
        match self {
            QueryResult::Rows(rows) => Ok(rows),
            other => Err(mismatch("row set", &other)),
        }
    }
}

fn mismatch(wanted: &str, got: &QueryResult) -> DirectoryError {
    DirectoryError::internal(format!("expected {wanted} result, got {got:?}"))
}

/// SQL with every placeholder rewritten to `?` and values in bind order.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

#[derive(Debug, Clone)]
pub struct QueryDef {
    sql: Arc<str>,
    named: Vec<(String, SqlValue)>,
    positional: Vec<SqlValue>,
}

impl QueryDef {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: Arc::from(sql.into()),
            named: Vec::new(),
            positional: Vec::new(),
        }
    }

    /// Look up a catalog clause for `dialect`.
    pub fn by_id(dialect: Dialect, clause_id: &str) -> Result<Self, DirectoryError> {
        catalog::sql(dialect, clause_id)
            .map(Self::new)
            .ok_or_else(|| DirectoryError::internal(format!("unknown query clause '{clause_id}'")))
    }

    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Bind `:key`. Binding the same key again replaces the earlier value.
    #[must_use]
    pub fn on(&self, key: &str, value: impl Into<SqlValue>) -> Self {
        let mut next = self.clone();
        next.named.retain(|(name, _)| name != key);
        next.named.push((key.to_string(), value.into()));
        next
    }

    /// Append values for the `?` placeholders, in order.
    #[must_use]
    pub fn on_all<I, V>(&self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<SqlValue>,
    {
        let mut next = self.clone();
        next.positional.extend(values.into_iter().map(Into::into));
        next
    }

    /// Rewrite placeholders and order the values. A placeholder without a
    /// value, or a positional value without a placeholder, is an error.
    pub fn compile(&self) -> Result<CompiledQuery, DirectoryError> {
        let mut sql = String::with_capacity(self.sql.len());
        let mut params = Vec::with_capacity(self.named.len() + self.positional.len());
        let mut positional = self.positional.iter();
        let mut chars = self.sql.chars().peekable();
        let mut in_literal = false;

        while let Some(c) = chars.next() {
            if in_literal {
                sql.push(c);
                if c == '\'' {
                    in_literal = false;
                }
                continue;
            }
            match c {
                '\'' => {
                    in_literal = true;
                    sql.push(c);
                }
                '?' => {
                    let value = positional.next().ok_or_else(|| {
                        DirectoryError::internal("positional placeholder without a bound value")
                    })?;
                    params.push(value.clone());
                    sql.push('?');
                }
                ':' if chars
                    .peek()
                    .is_some_and(|next| next.is_ascii_alphabetic() || *next == '_') =>
                {
                    let mut name = String::new();
                    while let Some(next) = chars.peek() {
                        if next.is_ascii_alphanumeric() || *next == '_' {
                            name.push(*next);
                            chars.next();
                        } else {
                            break;
                        }
                    }
                    let value = self
                        .named
                        .iter()
                        .find(|(key, _)| *key == name)
                        .map(|(_, value)| value.clone())
                        .ok_or_else(|| {
                            DirectoryError::internal(format!("no value bound for ':{name}'"))
                        })?;
                    params.push(value);
                    sql.push('?');
                }
                _ => sql.push(c),
            }
        }

        if positional.next().is_some() {
            return Err(DirectoryError::internal(
                "more positional values than placeholders",
            ));
        }
        Ok(CompiledQuery { sql, params })
    }

    /// Run against the scope's transaction.
    pub async fn execute(
        &self,
        scope: &mut TxScope,
        kind: ResultKind,
    ) -> Result<QueryResult, DirectoryError> {
        if kind == ResultKind::Update && !scope.is_write() {
            return Err(DirectoryError::internal(
                "update statement issued under read access",
            ));
        }
        let compiled = self.compile()?;
        let _timer = LatencyTimer::new("query", kind.label());
        let query = bind_all(&compiled.sql, &compiled.params);
        let conn = scope.connection();

        match kind {
            ResultKind::Update => Ok(QueryResult::Updated(
                query.execute(conn).await?.rows_affected(),
            )),
            ResultKind::Scalar => {
                let row = query.fetch_optional(conn).await?;
                Ok(QueryResult::Scalar(row.and_then(|row| {
                    ResultRow::from_any_row(&row).into_first_value()
                })))
            }
            ResultKind::Row => {
                let row = query.fetch_optional(conn).await?;
                Ok(QueryResult::Row(row.map(|row| ResultRow::from_any_row(&row))))
            }
            ResultKind::Rows => {
                let rows = query.fetch_all(conn).await?;
                Ok(QueryResult::Rows(ResultSet::new(
                    rows.iter().map(ResultRow::from_any_row).collect(),
                )))
            }
        }
    }

    pub async fn execute_update(&self, scope: &mut TxScope) -> Result<u64, DirectoryError> {
        self.execute(scope, ResultKind::Update).await?.into_updated()
    }

    pub async fn fetch_scalar(
        &self,
        scope: &mut TxScope,
    ) -> Result<Option<SqlValue>, DirectoryError> {
        self.execute(scope, ResultKind::Scalar).await?.into_scalar()
    }

    pub async fn fetch_optional(
        &self,
        scope: &mut TxScope,
    ) -> Result<Option<ResultRow>, DirectoryError> {
        self.execute(scope, ResultKind::Row).await?.into_row()
    }

    pub async fn fetch_all(&self, scope: &mut TxScope) -> Result<ResultSet, DirectoryError> {
        self.execute(scope, ResultKind::Rows).await?.into_rows()
    }
}

fn bind_all<'q>(sql: &'q str, params: &[SqlValue]) -> Query<'q, Any, AnyArguments<'q>> {
    params
        .iter()
        .fold(sqlx::query::<Any>(sql), |query, param| match param {
            SqlValue::Null => query.bind(None::<String>),
            SqlValue::Integer(value) => query.bind(*value),
            SqlValue::Text(value) => query.bind(value.clone()),
            SqlValue::Blob(value) => query.bind(value.clone()),
        })
}
