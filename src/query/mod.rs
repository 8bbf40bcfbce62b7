// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Query layer: statement definitions, the clause catalog and result values.
//!
//! # Architecture
//!
//! ```text
//! clause id ──▶ catalog::sql(dialect) ──▶ QueryDef ──on()/on_all()──▶ QueryDef
//!                                                    │
//!                                   compile(): `:name`/`?` → `?` + values
//!                                                    │
//!                                    execute(TxScope, ResultKind) ──▶ QueryResult
//! ```

pub mod catalog;
mod query_def;
mod value;

pub use catalog::clause;
pub use query_def::{CompiledQuery, QueryDef, QueryResult, ResultKind};
pub use value::{ResultRow, ResultSet, SqlValue};
