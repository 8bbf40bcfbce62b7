// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! # Directory Cache
//!
//! Core of a directory-protocol adapter: a local relational mirror of an
//! upstream user/group directory with nested groups, plus the query layer
//! that answers directory searches from it.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Search / Lookup                         │
//! │  • Filter tree → parameterized SQL (FilterTranslator)      │
//! │  • Results stream through an EntryCursor                   │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                NestedDirectoryBackend                       │
//! │  • CachedBackend: read/write scopes over the SQL store     │
//! │  • Nested-group closure memoized per store generation      │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                (DirectorySync primitives, one tx each)
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 SQLite / MySQL cache store                  │
//! │  • cache_entities, cache_memberships, cache_meta           │
//! │  • Reset flag gates every read transaction                 │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use directory_cache::backend::{CachedBackend, NestedDirectoryBackend, SearchRequest, StaticDirectory};
//! use directory_cache::cursor::drain;
//! use directory_cache::entity::{EntityType, GroupEntity};
//! use directory_cache::filter::Filter;
//! use directory_cache::{sync_driver, DirectoryCacheConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), directory_cache::DirectoryError> {
//!     let upstream = Arc::new(StaticDirectory::new());
//!     upstream.put_group(GroupEntity::new("admins"));
//!
//!     let config = DirectoryCacheConfig {
//!         sql_url: "sqlite://directory.db?mode=rwc".into(),
//!         ..Default::default()
//!     };
//!     let backend = CachedBackend::connect(&config, upstream.clone()).await?;
//!     sync_driver::resync(&backend, upstream.as_ref(), config.sync_page_size).await?;
//!
//!     let request = SearchRequest::new(EntityType::Group, Filter::starts_with("id", "adm"));
//!     let mut cursor = backend.search(&request).await?;
//!     for group in drain(cursor.as_mut()).await? {
//!         println!("{}", group.id());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`backend`]: backend protocol, sync primitives, cached and direct backends
//! - [`cache`]: bounded LRU/max-age map and the resolution cache
//! - [`entity`]: entity model and column metadata
//! - [`filter`]: filter tree, converter, SQL translation
//! - [`query`]: `QueryDef` builder and result shapes
//! - [`storage`]: SQL store, dialects, transaction scopes
//! - [`cursor`]: forward-only result cursors
//! - [`sync_driver`]: full resynchronization pass

pub mod backend;
pub mod cache;
pub mod config;
pub mod cursor;
pub mod entity;
pub mod error;
pub mod filter;
pub mod metrics;
pub mod query;
pub mod resilience;
pub mod storage;
pub mod sync_driver;

pub use backend::{CachedBackend, DirectBackend, DirectorySync, NestedDirectoryBackend};
pub use config::{DirectoryCacheConfig, NamespaceConfig};
pub use error::DirectoryError;
pub use metrics::LatencyTimer;
pub use resilience::retry::RetryConfig;
pub use storage::{SqlCacheStore, TransactionalAccess, TxScope};
pub use sync_driver::{resync, SyncReport};
