// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Uncached backend: every read goes to the upstream directory and filters
//! are evaluated in memory.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, instrument};

use super::{apply_page, DirectorySync, Namespace, NestedDirectoryBackend, NoopSync, SearchRequest, UpstreamDirectory};
use crate::cursor::{EntryCursor, ListCursor};
use crate::entity::{fold, Entity, EntityType, MemberType};
use crate::error::DirectoryError;
use crate::filter::{Converter, DefaultConverter};
use crate::resilience::{retry, RetryConfig};

const SCAN_PAGE: usize = 500;

pub struct DirectBackend {
    upstream: Arc<dyn UpstreamDirectory>,
    namespace: Namespace,
    converter: Arc<dyn Converter>,
}

impl DirectBackend {
    pub fn new(upstream: Arc<dyn UpstreamDirectory>, namespace: Namespace) -> Self {
        Self {
            upstream,
            namespace,
            converter: Arc::new(DefaultConverter),
        }
    }

    #[must_use]
    pub fn with_converter(mut self, converter: Arc<dyn Converter>) -> Self {
        self.converter = converter;
        self
    }

    async fn fetch(&self, entity_type: EntityType, id: &str) -> Result<Option<Entity>, DirectoryError> {
        let upstream = &self.upstream;
        match entity_type {
            EntityType::Group => Ok(retry("upstream_group", &RetryConfig::query(), || upstream.group(id))
                .await?
                .map(Entity::Group)),
            EntityType::User => Ok(retry("upstream_user", &RetryConfig::query(), || upstream.user(id))
                .await?
                .map(Entity::User)),
            _ => Ok(self.namespace.singleton(entity_type)),
        }
    }

    /// Every upstream entry of a persisted type, in upstream order.
    async fn scan(&self, entity_type: EntityType) -> Result<Vec<Entity>, DirectoryError> {
        let upstream = &self.upstream;
        let mut entries = Vec::new();
        loop {
            let start = entries.len();
            let page: Vec<Entity> = match entity_type {
                EntityType::Group => retry("upstream_groups", &RetryConfig::query(), || {
                    upstream.groups(start, SCAN_PAGE)
                })
                .await?
                .into_iter()
                .map(Entity::Group)
                .collect(),
                _ => retry("upstream_users", &RetryConfig::query(), || {
                    upstream.users(start, SCAN_PAGE)
                })
                .await?
                .into_iter()
                .map(Entity::User)
                .collect(),
            };
            let short = page.len() < SCAN_PAGE;
            entries.extend(page);
            if short {
                return Ok(entries);
            }
        }
    }
}

#[async_trait]
impl NestedDirectoryBackend for DirectBackend {
    fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    fn sync(&self) -> &dyn DirectorySync {
        &NoopSync
    }

    #[instrument(skip(self))]
    async fn lookup(&self, entity_type: EntityType, id: &str) -> Result<Entity, DirectoryError> {
        if !entity_type.is_persisted() {
            return self.namespace.lookup(entity_type, id);
        }
        self.fetch(entity_type, id)
            .await?
            .ok_or_else(|| DirectoryError::not_found(entity_type, id))
    }

    #[instrument(skip_all, fields(scope = %request.scope, filter = %request.filter))]
    async fn search(
        &self,
        request: &SearchRequest,
    ) -> Result<Box<dyn EntryCursor<Entity>>, DirectoryError> {
        let converter = self.converter.as_ref();
        if !request.scope.is_persisted() {
            let entries = self.namespace.search(request, converter)?;
            return Ok(Box::new(ListCursor::new("entities", entries)));
        }

        request.filter.check(request.scope, converter)?;
        let mut entries = self.scan(request.scope).await?;
        entries.retain(|entity| request.filter.evaluate(entity, converter));
        entries.sort_by_cached_key(|entity| fold(entity.id()));
        debug!(matched = entries.len(), "Upstream search evaluated");
        let page: Vec<Entity> = apply_page(entries.into_iter(), request.page).collect();
        Ok(Box::new(ListCursor::new("entities", page)))
    }

    /// Breadth-first walk of `member_of`, tolerating cycles.
    #[instrument(skip(self))]
    async fn effective_groups(
        &self,
        member_type: MemberType,
        id: &str,
    ) -> Result<Vec<String>, DirectoryError> {
        let start = self
            .fetch(member_type.entity_type(), id)
            .await?
            .ok_or_else(|| DirectoryError::not_found(member_type.entity_type(), id))?;

        let mut pending: VecDeque<String> = parents(&start).into();
        let mut seen: HashSet<String> = HashSet::new();
        let mut groups = Vec::new();
        while let Some(group_id) = pending.pop_front() {
            if !seen.insert(fold(&group_id)) {
                continue;
            }
            // Dangling parents are skipped; the edge outlived its group.
            if let Some(group) = self.fetch(EntityType::Group, &group_id).await? {
                pending.extend(parents(&group));
                groups.push(group.id().to_string());
            }
        }
        groups.sort_by_cached_key(|id| fold(id));
        Ok(groups)
    }
}

fn parents(entity: &Entity) -> Vec<String> {
    match entity {
        Entity::Group(group) => group.member_of.clone(),
        Entity::User(user) => user.member_of.clone(),
        _ => Vec::new(),
    }
}
