// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Cache-backed directory backend.
//!
//! Reads are answered from the SQL cache store; writes arrive through the
//! [`DirectorySync`] primitives, each in its own write transaction.
//!
//! # Reset state
//!
//! `cache_meta.reset_state` is `populated` after a completed full sync and
//! `reset` otherwise; a missing row (fresh store) also means a reset is
//! required. Every read scope checks it and fails with `ResetRequired`
//! until [`DirectorySync::mark_synchronized`] runs.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

use super::{DirectorySync, Namespace, NestedDirectoryBackend, Page, SearchRequest, UpstreamDirectory};
use crate::cache::{ResolutionCache, ResolutionCacheStats};
use crate::config::DirectoryCacheConfig;
use crate::cursor::{EntryCursor, ListCursor, StreamCursor};
use crate::entity::row::{
    entity_from_row, membership_from_row, now_millis, storable_key, EntityRow,
};
use crate::entity::{fold, Entity, EntityType, GroupEntity, MemberType, MembershipEntity, UserEntity};
use crate::error::DirectoryError;
use crate::filter::{Converter, DefaultConverter, FilterTranslator, SqlFragment};
use crate::metrics;
use crate::query::catalog::entity_projection;
use crate::query::{clause, QueryDef, ResultRow, SqlValue};
use crate::resilience::{retry, RetryConfig};
use crate::storage::{Dialect, SqlCacheStore, TransactionalAccess, TxScope};

const RESET_STATE: &str = "reset_state";
const STATE_POPULATED: &str = "populated";
const STATE_RESET: &str = "reset";

type ResolutionKey = (MemberType, String);

#[derive(Clone)]
pub struct CachedBackend {
    inner: Arc<Inner>,
}

struct Inner {
    store: SqlCacheStore,
    upstream: Arc<dyn UpstreamDirectory>,
    namespace: Namespace,
    converter: Arc<dyn Converter>,
    /// Effective-group closures, valid for one store generation
    resolutions: ResolutionCache<ResolutionKey, Arc<Vec<String>>>,
    /// Bumped after every committed write
    generation: AtomicU64,
    sync_page_size: usize,
    cursor_buffer: usize,
}

impl CachedBackend {
    /// Open the cache store described by `config`.
    pub async fn connect(
        config: &DirectoryCacheConfig,
        upstream: Arc<dyn UpstreamDirectory>,
    ) -> Result<Self, DirectoryError> {
        let store = SqlCacheStore::connect(config).await?;
        Ok(Self::new(store, upstream, config))
    }

    pub fn new(
        store: SqlCacheStore,
        upstream: Arc<dyn UpstreamDirectory>,
        config: &DirectoryCacheConfig,
    ) -> Self {
        Self::with_converter(store, upstream, config, Arc::new(DefaultConverter))
    }

    pub fn with_converter(
        store: SqlCacheStore,
        upstream: Arc<dyn UpstreamDirectory>,
        config: &DirectoryCacheConfig,
        converter: Arc<dyn Converter>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                upstream,
                namespace: Namespace::from_config(&config.namespace),
                converter,
                resolutions: ResolutionCache::new(
                    "effective_groups",
                    config.resolution_cache_max_entries,
                    Duration::from_secs(config.resolution_cache_max_age_secs),
                ),
                generation: AtomicU64::new(0),
                sync_page_size: config.sync_page_size.max(1),
                cursor_buffer: config.cursor_buffer,
            }),
        }
    }

    #[must_use]
    pub fn store(&self) -> &SqlCacheStore {
        &self.inner.store
    }

    /// Number of write transactions committed through this backend.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn resolution_stats(&self) -> ResolutionCacheStats {
        self.inner.resolutions.stats()
    }

    /// Cached rows of a persisted type.
    pub async fn count(&self, entity_type: EntityType) -> Result<u64, DirectoryError> {
        let mut scope = self.read_scope().await?;
        let count = scope
            .query_by_id(clause::ENTITY_COUNT)?
            .on("entity_type", entity_type.as_str())
            .fetch_scalar(&mut scope)
            .await?;
        scope.commit().await?;
        Ok(count
            .and_then(|value| value.as_integer())
            .and_then(|n| u64::try_from(n).ok())
            .unwrap_or(0))
    }

    async fn fetch_group(&self, id: &str) -> Result<GroupEntity, DirectoryError> {
        retry("upstream_group", &RetryConfig::query(), || {
            self.inner.upstream.group(id)
        })
        .await?
        .ok_or_else(|| DirectoryError::not_found(EntityType::Group, id))
    }

    async fn fetch_user(&self, id: &str) -> Result<UserEntity, DirectoryError> {
        retry("upstream_user", &RetryConfig::query(), || {
            self.inner.upstream.user(id)
        })
        .await?
        .ok_or_else(|| DirectoryError::not_found(EntityType::User, id))
    }

    async fn store_entity(&self, row: &EntityRow) -> Result<(), DirectoryError> {
        let mut scope = self.write_scope().await?;
        row.bind(&scope.query_by_id(clause::ENTITY_UPSERT)?)
            .execute_update(&mut scope)
            .await?;
        scope.commit().await?;
        Ok(())
    }

    /// Update the reset flag in its own transaction.
    async fn set_state(&self, state: &'static str) -> Result<(), DirectoryError> {
        self.with_write_access(|scope| Box::pin(put_state(scope, state)))
            .await?;
        metrics::set_reset_required(state != STATE_POPULATED);
        Ok(())
    }

    /// Run one page query in its own read scope.
    async fn read_page(&self, def: QueryDef) -> Result<Vec<ResultRow>, DirectoryError> {
        let mut scope = self.read_scope().await?;
        let rows = def.fetch_all(&mut scope).await?;
        scope.commit().await?;
        Ok(rows.into_rows())
    }

    /// Cursor over a keyset-ordered query, read `cursor_buffer` rows at a time.
    ///
    /// `page_query` builds the statement for the page after `last` (the final
    /// row of the previous page, `None` for the first one). Each page is read
    /// and its scope released before any row reaches the consumer, so writers
    /// may run while the cursor is open. The first page is read eagerly and
    /// its errors (including `ResetRequired`) are returned from here.
    async fn paged_cursor<T, Q, M>(
        &self,
        label: &'static str,
        window: Option<Page>,
        page_query: Q,
        map: M,
    ) -> Result<StreamCursor<T>, DirectoryError>
    where
        T: Send + 'static,
        Q: Fn(Dialect, Option<&ResultRow>, Page) -> Result<QueryDef, DirectoryError>
            + Send
            + Sync
            + 'static,
        M: Fn(&ResultRow) -> Result<T, DirectoryError> + Send + Sync + 'static,
    {
        let chunk = self.inner.cursor_buffer.max(1);
        let dialect = self.inner.store.dialect();
        let mut remaining = window.map(|window| window.limit);
        let mut limit = remaining.map_or(chunk, |left| left.min(chunk));
        let mut rows = if limit == 0 {
            Vec::new()
        } else {
            let first = Page {
                offset: window.map_or(0, |window| window.offset),
                limit,
            };
            self.read_page(page_query(dialect, None, first)?).await?
        };

        let backend = self.clone();
        Ok(StreamCursor::spawn(label, chunk, move |sender| async move {
            loop {
                for row in &rows {
                    let item = map(row);
                    let failed = item.is_err();
                    if sender.send(item).await.is_err() || failed {
                        return;
                    }
                }
                if rows.len() < limit {
                    return;
                }
                if let Some(left) = remaining.as_mut() {
                    *left -= rows.len();
                }
                limit = remaining.map_or(chunk, |left| left.min(chunk));
                if limit == 0 {
                    return;
                }
                let next = page_query(dialect, rows.last(), Page { offset: 0, limit });
                let fetched = match next {
                    Ok(def) => backend.read_page(def).await,
                    Err(err) => Err(err),
                };
                rows = match fetched {
                    Ok(rows) => rows,
                    Err(err) => {
                        debug!(cursor = label, error = %err, "Cursor page failed");
                        let _ = sender.send(Err(err)).await;
                        return;
                    }
                };
            }
        }))
    }
}

impl TransactionalAccess for CachedBackend {
    /// Store read scope, refused while a reset is pending.
    async fn read_scope(&self) -> Result<TxScope, DirectoryError> {
        let mut scope = self.inner.store.read_scope().await?;
        match reset_required(&mut scope).await {
            Ok(false) => Ok(scope),
            Ok(true) => {
                release(scope).await;
                Err(DirectoryError::ResetRequired)
            }
            Err(err) => {
                release(scope).await;
                Err(err)
            }
        }
    }

    /// Store write scope that bumps the generation when it commits.
    async fn write_scope(&self) -> Result<TxScope, DirectoryError> {
        let scope = self.inner.store.write_scope().await?;
        let inner = Arc::clone(&self.inner);
        Ok(scope.on_commit(move || {
            inner.generation.fetch_add(1, Ordering::AcqRel);
        }))
    }
}

async fn release(scope: TxScope) {
    if let Err(err) = scope.rollback().await {
        debug!(error = %err, "Read scope rollback failed");
    }
}

async fn reset_required(scope: &mut TxScope) -> Result<bool, DirectoryError> {
    let state = scope
        .query_by_id(clause::META_GET)?
        .on("name", RESET_STATE)
        .fetch_scalar(scope)
        .await?;
    Ok(state.as_ref().and_then(SqlValue::as_text) != Some(STATE_POPULATED))
}

async fn put_state(scope: &mut TxScope, state: &'static str) -> Result<(), DirectoryError> {
    scope
        .query_by_id(clause::META_PUT)?
        .on("name", RESET_STATE)
        .on("value", state)
        .execute_update(scope)
        .await?;
    Ok(())
}

async fn entity_exists(
    scope: &mut TxScope,
    entity_type: EntityType,
    key: &str,
) -> Result<bool, DirectoryError> {
    let count = scope
        .query_by_id(clause::ENTITY_EXISTS)?
        .on("entity_type", entity_type.as_str())
        .on("id_key", key)
        .fetch_scalar(scope)
        .await?;
    Ok(count.and_then(|value| value.as_integer()).unwrap_or(0) > 0)
}

fn row_count(affected: u64) -> Result<usize, DirectoryError> {
    usize::try_from(affected)
        .map_err(|_| DirectoryError::internal(format!("{affected} affected rows overflow usize")))
}

fn tracked<T>(kind: &'static str, operation: &'static str, result: Result<T, DirectoryError>) -> Result<T, DirectoryError> {
    match &result {
        Ok(_) => metrics::record_sync_operation(kind, operation, "success"),
        Err(err) => {
            warn!(kind, operation, error = %err, "Sync operation failed");
            metrics::record_sync_operation(kind, operation, "error");
        }
    }
    result
}

fn observed<T>(operation: &'static str, result: Result<T, DirectoryError>) -> Result<T, DirectoryError> {
    let status = if result.is_ok() { "success" } else { "error" };
    metrics::record_read(operation, status);
    result
}

/// One keyset page of a search, ordered by `id_key`.
fn search_page(
    dialect: Dialect,
    scope: EntityType,
    fragment: &SqlFragment,
    last: Option<&ResultRow>,
    page: Page,
) -> Result<QueryDef, DirectoryError> {
    let mut sql = format!(
        "{} WHERE e.entity_type = ? AND ({})",
        entity_projection(dialect),
        fragment.clause
    );
    let mut params = Vec::with_capacity(fragment.params.len() + 4);
    params.push(SqlValue::from(scope.as_str()));
    params.extend(fragment.params.iter().cloned());
    if let Some(key) = last.and_then(|row| row.text("id_key")) {
        sql.push_str(" AND e.id_key > ?");
        params.push(SqlValue::from(key));
    }
    sql.push_str(" ORDER BY e.id_key LIMIT ? OFFSET ?");
    params.push(SqlValue::from(page.limit));
    params.push(SqlValue::from(page.offset));
    Ok(QueryDef::new(sql).on_all(params))
}

/// One keyset page of `membership.page` / `membership.page_after`.
fn membership_page(
    dialect: Dialect,
    last: Option<&ResultRow>,
    page: Page,
) -> Result<QueryDef, DirectoryError> {
    let keys = last.and_then(|row| {
        Some((
            row.text("group_key")?,
            row.text("member_type")?,
            row.text("member_key")?,
        ))
    });
    let def = match keys {
        Some((group_key, member_type, member_key)) => {
            QueryDef::by_id(dialect, clause::MEMBERSHIP_PAGE_AFTER)?
                .on("group_key", group_key)
                .on("member_type", member_type)
                .on("member_key", member_key)
        }
        None => QueryDef::by_id(dialect, clause::MEMBERSHIP_PAGE)?,
    };
    Ok(def.on("limit", page.limit))
}

#[async_trait]
impl DirectorySync for CachedBackend {
    async fn require_reset(&self) -> Result<bool, DirectoryError> {
        let required = self
            .inner
            .store
            .with_read_access(|scope| Box::pin(reset_required(scope)))
            .await?;
        metrics::set_reset_required(required);
        Ok(required)
    }

    async fn mark_reset_required(&self) -> Result<(), DirectoryError> {
        tracked("state", "mark_reset_required", self.set_state(STATE_RESET).await)
    }

    #[instrument(skip(self))]
    async fn reset(&self) -> Result<(), DirectoryError> {
        let result = async {
            let mut scope = self.write_scope().await?;
            let memberships = scope
                .query_by_id(clause::MEMBERSHIP_DELETE_ALL)?
                .execute_update(&mut scope)
                .await?;
            let entities = scope
                .query_by_id(clause::ENTITY_DELETE_ALL)?
                .execute_update(&mut scope)
                .await?;
            put_state(&mut scope, STATE_RESET).await?;
            scope.commit().await?;
            Ok::<_, DirectoryError>((entities, memberships))
        }
        .await;

        if let Ok((entities, memberships)) = &result {
            self.inner.resolutions.clear();
            metrics::set_reset_required(true);
            info!(entities, memberships, "Cache store reset");
        }
        tracked("state", "reset", result.map(drop))
    }

    async fn mark_synchronized(&self) -> Result<(), DirectoryError> {
        let result = self.set_state(STATE_POPULATED).await;
        if result.is_ok() {
            info!(generation = self.generation(), "Cache store marked synchronized");
        }
        tracked("state", "mark_synchronized", result)
    }

    #[instrument(skip(self))]
    async fn upsert_group(&self, id: &str) -> Result<(), DirectoryError> {
        let result = async {
            let group = self.fetch_group(id).await?;
            self.store_entity(&EntityRow::group(&group)?).await
        }
        .await;
        tracked("group", "upsert", result)
    }

    #[instrument(skip(self))]
    async fn upsert_groups_page(&self, start: usize, max: usize) -> Result<usize, DirectoryError> {
        let result = async {
            if max == 0 {
                return Ok::<_, DirectoryError>(0);
            }
            let page = retry("upstream_groups", &RetryConfig::query(), || {
                self.inner.upstream.groups(start, max)
            })
            .await?;
            let mut written = 0;
            for group in page.iter().take(max) {
                self.store_entity(&EntityRow::group(group)?).await?;
                written += 1;
            }
            metrics::record_rows_synced("group", written);
            debug!(start, written, "Group page upserted");
            Ok(written)
        }
        .await;
        tracked("group", "upsert_page", result)
    }

    async fn upsert_all_groups(&self) -> Result<usize, DirectoryError> {
        let page_size = self.inner.sync_page_size;
        let mut start = 0;
        loop {
            let written = self.upsert_groups_page(start, page_size).await?;
            start += written;
            if written < page_size {
                break;
            }
        }
        info!(total = start, "All groups upserted");
        Ok(start)
    }

    #[instrument(skip(self))]
    async fn upsert_user(&self, id: &str) -> Result<(), DirectoryError> {
        let result = async {
            let user = self.fetch_user(id).await?;
            self.store_entity(&EntityRow::user(&user)?).await
        }
        .await;
        tracked("user", "upsert", result)
    }

    #[instrument(skip(self))]
    async fn upsert_user_copying_groups(&self, id: &str, copy_from: &str) -> Result<(), DirectoryError> {
        let result = async {
            let user = self.fetch_user(id).await?;
            let row = EntityRow::user(&user)?;
            let source_key = fold(copy_from);

            let mut scope = self.write_scope().await?;
            if !entity_exists(&mut scope, EntityType::User, &source_key).await? {
                return Err(DirectoryError::not_found(EntityType::User, copy_from));
            }
            row.bind(&scope.query_by_id(clause::ENTITY_UPSERT)?)
                .execute_update(&mut scope)
                .await?;
            let copied = scope
                .query_by_id(clause::MEMBERSHIP_COPY)?
                .on("target_key", row.id_key.as_str())
                .on("member_type", MemberType::User.as_str())
                .on("source_key", source_key)
                .on("synced_at", now_millis())
                .execute_update(&mut scope)
                .await?;
            scope.commit().await?;
            debug!(copied, "User upserted with copied memberships");
            Ok(())
        }
        .await;
        tracked("user", "upsert_copying_groups", result)
    }

    #[instrument(skip(self))]
    async fn upsert_users_page(&self, start: usize, max: usize) -> Result<usize, DirectoryError> {
        let result = async {
            if max == 0 {
                return Ok::<_, DirectoryError>(0);
            }
            let page = retry("upstream_users", &RetryConfig::query(), || {
                self.inner.upstream.users(start, max)
            })
            .await?;
            let mut written = 0;
            for user in page.iter().take(max) {
                self.store_entity(&EntityRow::user(user)?).await?;
                written += 1;
            }
            metrics::record_rows_synced("user", written);
            debug!(start, written, "User page upserted");
            Ok(written)
        }
        .await;
        tracked("user", "upsert_page", result)
    }

    async fn upsert_all_users(&self) -> Result<usize, DirectoryError> {
        let page_size = self.inner.sync_page_size;
        let mut start = 0;
        loop {
            let written = self.upsert_users_page(start, page_size).await?;
            start += written;
            if written < page_size {
                break;
            }
        }
        info!(total = start, "All users upserted");
        Ok(start)
    }

    #[instrument(skip(self))]
    async fn upsert_membership(&self, membership: &MembershipEntity) -> Result<(), DirectoryError> {
        let result = async {
            let group_key = storable_key(EntityType::Group, &membership.group_id)?;
            let member_entity_type = membership.member_type.entity_type();
            let member_key = storable_key(member_entity_type, &membership.member_id)?;

            let mut scope = self.write_scope().await?;
            if !entity_exists(&mut scope, EntityType::Group, &group_key).await? {
                return Err(DirectoryError::not_found(EntityType::Group, &membership.group_id));
            }
            if !entity_exists(&mut scope, member_entity_type, &member_key).await? {
                return Err(DirectoryError::not_found(member_entity_type, &membership.member_id));
            }
            scope
                .query_by_id(clause::MEMBERSHIP_UPSERT)?
                .on("group_key", group_key)
                .on("member_type", membership.member_type.as_str())
                .on("member_key", member_key)
                .on("synced_at", now_millis())
                .execute_update(&mut scope)
                .await?;
            scope.commit().await?;
            Ok(())
        }
        .await;
        tracked("membership", "upsert", result)
    }

    #[instrument(skip(self))]
    async fn drop_group(&self, id: &str) -> Result<(), DirectoryError> {
        let result = async {
            let key = fold(id);
            let mut scope = self.write_scope().await?;
            let contained = scope
                .query_by_id(clause::MEMBERSHIP_DELETE_GROUP)?
                .on("group_key", key.as_str())
                .execute_update(&mut scope)
                .await?;
            let parents = scope
                .query_by_id(clause::MEMBERSHIP_DELETE_MEMBER)?
                .on("member_type", MemberType::Group.as_str())
                .on("member_key", key.as_str())
                .execute_update(&mut scope)
                .await?;
            let removed = scope
                .query_by_id(clause::ENTITY_DELETE)?
                .on("entity_type", EntityType::Group.as_str())
                .on("id_key", key.as_str())
                .execute_update(&mut scope)
                .await?;
            scope.commit().await?;
            debug!(removed, edges = contained + parents, "Group dropped");
            Ok::<_, DirectoryError>(())
        }
        .await;
        tracked("group", "drop", result)
    }

    #[instrument(skip(self))]
    async fn drop_all_groups(&self) -> Result<usize, DirectoryError> {
        let result = async {
            let mut scope = self.write_scope().await?;
            // Every edge has a group at its parent end.
            scope
                .query_by_id(clause::MEMBERSHIP_DELETE_ALL)?
                .execute_update(&mut scope)
                .await?;
            let removed = scope
                .query_by_id(clause::ENTITY_DELETE_TYPE)?
                .on("entity_type", EntityType::Group.as_str())
                .execute_update(&mut scope)
                .await?;
            scope.commit().await?;
            info!(removed, "All groups dropped");
            Ok::<_, DirectoryError>(row_count(removed)?)
        }
        .await;
        tracked("group", "drop_all", result)
    }

    #[instrument(skip(self))]
    async fn drop_user(&self, id: &str) -> Result<(), DirectoryError> {
        let result = async {
            let key = fold(id);
            let mut scope = self.write_scope().await?;
            let edges = scope
                .query_by_id(clause::MEMBERSHIP_DELETE_MEMBER)?
                .on("member_type", MemberType::User.as_str())
                .on("member_key", key.as_str())
                .execute_update(&mut scope)
                .await?;
            let removed = scope
                .query_by_id(clause::ENTITY_DELETE)?
                .on("entity_type", EntityType::User.as_str())
                .on("id_key", key.as_str())
                .execute_update(&mut scope)
                .await?;
            scope.commit().await?;
            debug!(removed, edges, "User dropped");
            Ok::<_, DirectoryError>(())
        }
        .await;
        tracked("user", "drop", result)
    }

    #[instrument(skip(self))]
    async fn drop_all_users(&self) -> Result<usize, DirectoryError> {
        let result = async {
            let mut scope = self.write_scope().await?;
            scope
                .query_by_id(clause::MEMBERSHIP_DELETE_MEMBER_TYPE)?
                .on("member_type", MemberType::User.as_str())
                .execute_update(&mut scope)
                .await?;
            let removed = scope
                .query_by_id(clause::ENTITY_DELETE_TYPE)?
                .on("entity_type", EntityType::User.as_str())
                .execute_update(&mut scope)
                .await?;
            scope.commit().await?;
            info!(removed, "All users dropped");
            Ok::<_, DirectoryError>(row_count(removed)?)
        }
        .await;
        tracked("user", "drop_all", result)
    }

    #[instrument(skip(self))]
    async fn drop_membership(&self, membership: &MembershipEntity) -> Result<(), DirectoryError> {
        let result = async {
            let mut scope = self.write_scope().await?;
            scope
                .query_by_id(clause::MEMBERSHIP_DELETE)?
                .on("group_key", fold(&membership.group_id))
                .on("member_type", membership.member_type.as_str())
                .on("member_key", fold(&membership.member_id))
                .execute_update(&mut scope)
                .await?;
            scope.commit().await?;
            Ok::<_, DirectoryError>(())
        }
        .await;
        tracked("membership", "drop", result)
    }

    async fn memberships(&self) -> Result<Box<dyn EntryCursor<MembershipEntity>>, DirectoryError> {
        let cursor = self
            .paged_cursor("memberships", None, membership_page, membership_from_row)
            .await?;
        Ok(Box::new(cursor))
    }
}

#[async_trait]
impl NestedDirectoryBackend for CachedBackend {
    fn namespace(&self) -> &Namespace {
        &self.inner.namespace
    }

    fn sync(&self) -> &dyn DirectorySync {
        self
    }

    #[instrument(skip(self))]
    async fn lookup(&self, entity_type: EntityType, id: &str) -> Result<Entity, DirectoryError> {
        if !entity_type.is_persisted() {
            return observed("lookup", self.inner.namespace.lookup(entity_type, id));
        }
        let result = async {
            let mut scope = self.read_scope().await?;
            let row = scope
                .query_by_id(clause::ENTITY_SELECT)?
                .on("entity_type", entity_type.as_str())
                .on("id_key", fold(id))
                .fetch_optional(&mut scope)
                .await?;
            scope.commit().await?;
            let row = row.ok_or_else(|| DirectoryError::not_found(entity_type, id))?;
            entity_from_row(&row, self.inner.converter.as_ref())
        }
        .await;
        observed("lookup", result)
    }

    #[instrument(skip_all, fields(scope = %request.scope, filter = %request.filter))]
    async fn search(
        &self,
        request: &SearchRequest,
    ) -> Result<Box<dyn EntryCursor<Entity>>, DirectoryError> {
        if !request.scope.is_persisted() {
            let entries = self
                .inner
                .namespace
                .search(request, self.inner.converter.as_ref());
            return observed("search", entries)
                .map(|entries| Box::new(ListCursor::new("entities", entries)) as Box<dyn EntryCursor<Entity>>);
        }

        let result = async {
            // Translate before taking the read guard so a bad filter never waits.
            let fragment = FilterTranslator::new(self.inner.converter.as_ref())
                .translate(request.scope, &request.filter)?;
            let scope = request.scope;
            let converter = Arc::clone(&self.inner.converter);
            let cursor = self
                .paged_cursor(
                    "entities",
                    request.page,
                    move |dialect, last, page| search_page(dialect, scope, &fragment, last, page),
                    move |row: &ResultRow| entity_from_row(row, converter.as_ref()),
                )
                .await?;
            Ok::<_, DirectoryError>(Box::new(cursor) as Box<dyn EntryCursor<Entity>>)
        }
        .await;
        observed("search", result)
    }

    #[instrument(skip(self))]
    async fn effective_groups(
        &self,
        member_type: MemberType,
        id: &str,
    ) -> Result<Vec<String>, DirectoryError> {
        let key = (member_type, fold(id));
        let generation = self.generation();
        if let Some(groups) = self.inner.resolutions.get(&key, generation) {
            return Ok(groups.as_ref().clone());
        }

        let result = async {
            let mut scope = self.read_scope().await?;
            if !entity_exists(&mut scope, member_type.entity_type(), &key.1).await? {
                return Err(DirectoryError::not_found(member_type.entity_type(), id));
            }
            let rows = scope
                .query_by_id(clause::MEMBERSHIP_EFFECTIVE_GROUPS)?
                .on("member_type", member_type.as_str())
                .on("member_key", key.1.as_str())
                .fetch_all(&mut scope)
                .await?;
            scope.commit().await?;
            Ok(rows
                .iter()
                .filter_map(|row| row.text("id").map(str::to_string))
                .collect::<Vec<_>>())
        }
        .await;

        let groups = observed("effective_groups", result)?;
        self.inner
            .resolutions
            .insert(key, generation, Arc::new(groups.clone()));
        Ok(groups)
    }
}
