// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! SQL dialect differences between the supported cache stores.
//!
//! Schema (SQLite flavour):
//! ```sql
//! CREATE TABLE cache_entities (
//!   entity_type TEXT NOT NULL,     -- GROUP | USER
//!   id_key TEXT NOT NULL,          -- lower-cased id, identity
//!   id TEXT NOT NULL,              -- id as last seen upstream
//!   description TEXT, display_name TEXT, first_name TEXT,
//!   last_name TEXT, email TEXT, active INTEGER,
//!   description_key TEXT, display_name_key TEXT, -- folded copies,
//!   first_name_key TEXT, last_name_key TEXT,       -- compared by
//!   email_key TEXT,                                -- filters
//!   sync_version INTEGER NOT NULL DEFAULT 1,
//!   synced_at INTEGER NOT NULL,
//!   PRIMARY KEY (entity_type, id_key)
//! );
//! CREATE TABLE cache_memberships (
//!   group_key TEXT, member_type TEXT, member_key TEXT, synced_at INTEGER,
//!   PRIMARY KEY (group_key, member_type, member_key)
//! );
//! CREATE TABLE cache_meta (name TEXT PRIMARY KEY, value TEXT NOT NULL);
//! ```
//!
//! Folded copies are written with the same folding the filter converter
//! applies to values, so comparisons never depend on the engine's own
//! case rules. MySQL key columns use a binary collation for the same reason.
//!
//! Membership keys always reference an existing `cache_entities` row; the
//! sync primitives maintain that without foreign keys so the same statements
//! run on both engines.

use crate::error::DirectoryError;

/// Separator used when multi-valued columns are aggregated into one cell.
pub const MULTI_VALUE_SEPARATOR: char = '\u{1f}';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Sqlite,
    MySql,
}

const SQLITE_SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS cache_entities (
        entity_type TEXT NOT NULL,
        id_key TEXT NOT NULL,
        id TEXT NOT NULL,
        description TEXT,
        description_key TEXT,
        display_name TEXT,
        display_name_key TEXT,
        first_name TEXT,
        first_name_key TEXT,
        last_name TEXT,
        last_name_key TEXT,
        email TEXT,
        email_key TEXT,
        active INTEGER,
        sync_version INTEGER NOT NULL DEFAULT 1,
        synced_at INTEGER NOT NULL,
        PRIMARY KEY (entity_type, id_key)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS cache_memberships (
        group_key TEXT NOT NULL,
        member_type TEXT NOT NULL,
        member_key TEXT NOT NULL,
        synced_at INTEGER NOT NULL,
        PRIMARY KEY (group_key, member_type, member_key)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_cache_memberships_member ON cache_memberships (member_type, member_key)",
    r#"
    CREATE TABLE IF NOT EXISTS cache_meta (
        name TEXT PRIMARY KEY,
        value TEXT NOT NULL
    )
    "#,
];

// Any driver can't map MySQL JSON or ENUM, so everything stays VARCHAR/TEXT.
const MYSQL_SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS cache_entities (
        entity_type VARCHAR(32) NOT NULL,
        id_key VARCHAR(255) CHARACTER SET utf8mb4 COLLATE utf8mb4_bin NOT NULL,
        id VARCHAR(255) NOT NULL,
        description TEXT,
        description_key TEXT CHARACTER SET utf8mb4 COLLATE utf8mb4_bin,
        display_name VARCHAR(255),
        display_name_key VARCHAR(255) CHARACTER SET utf8mb4 COLLATE utf8mb4_bin,
        first_name VARCHAR(255),
        first_name_key VARCHAR(255) CHARACTER SET utf8mb4 COLLATE utf8mb4_bin,
        last_name VARCHAR(255),
        last_name_key VARCHAR(255) CHARACTER SET utf8mb4 COLLATE utf8mb4_bin,
        email VARCHAR(255),
        email_key VARCHAR(255) CHARACTER SET utf8mb4 COLLATE utf8mb4_bin,
        active TINYINT,
        sync_version BIGINT NOT NULL DEFAULT 1,
        synced_at BIGINT NOT NULL,
        PRIMARY KEY (entity_type, id_key)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS cache_memberships (
        group_key VARCHAR(255) CHARACTER SET utf8mb4 COLLATE utf8mb4_bin NOT NULL,
        member_type VARCHAR(32) NOT NULL,
        member_key VARCHAR(255) CHARACTER SET utf8mb4 COLLATE utf8mb4_bin NOT NULL,
        synced_at BIGINT NOT NULL,
        PRIMARY KEY (group_key, member_type, member_key),
        INDEX idx_cache_memberships_member (member_type, member_key)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS cache_meta (
        name VARCHAR(64) PRIMARY KEY,
        value TEXT NOT NULL
    )
    "#,
];

impl Dialect {
    /// Pick the dialect from a connection URL scheme.
    pub fn from_url(url: &str) -> Result<Self, DirectoryError> {
        let scheme = url.split(':').next().unwrap_or_default().to_ascii_lowercase();
        match scheme.as_str() {
            "sqlite" => Ok(Dialect::Sqlite),
            "mysql" | "mariadb" => Ok(Dialect::MySql),
            other => Err(DirectoryError::DirectoryAccessFailure(format!(
                "unsupported cache store scheme '{other}'"
            ))),
        }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Dialect::Sqlite => "sqlite",
            Dialect::MySql => "mysql",
        }
    }

    /// DDL statements, each idempotent.
    #[must_use]
    pub fn schema(&self) -> &'static [&'static str] {
        match self {
            Dialect::Sqlite => SQLITE_SCHEMA,
            Dialect::MySql => MYSQL_SCHEMA,
        }
    }

    /// Aggregate `expr` into one separator-joined cell, NULL when empty.
    #[must_use]
    pub fn group_concat(&self, expr: &str) -> String {
        match self {
            Dialect::Sqlite => format!("group_concat({expr}, '{MULTI_VALUE_SEPARATOR}')"),
            Dialect::MySql => format!(
                "GROUP_CONCAT({expr} ORDER BY {expr} SEPARATOR '{MULTI_VALUE_SEPARATOR}')"
            ),
        }
    }
}
