// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Nested directory backend.
//!
//! # Architecture
//!
//! ```text
//!          directory front end
//!                  │ lookup / search / effective_groups
//!                  ▼
//! ┌──────────────────────────────────┐      ┌───────────────────────┐
//! │ NestedDirectoryBackend           │      │ UpstreamDirectory     │
//! │  CachedBackend: SQL cache store  │◀─────│  authoritative source │
//! │  DirectBackend: upstream + eval  │ sync │  (paged)              │
//! └──────────────────────────────────┘      └───────────────────────┘
//!                  │
//!                  ▼ DirectorySync primitives (one transaction per row)
//!        cache_entities / cache_memberships / cache_meta
//! ```
//!
//! The cached backend refuses reads while the store is flagged for reset;
//! the sync driver clears the flag after a full resynchronization.

mod cached;
mod direct;
mod namespace;
mod upstream;

use async_trait::async_trait;

pub use cached::CachedBackend;
pub use direct::DirectBackend;
pub use namespace::Namespace;
pub use upstream::{StaticDirectory, UpstreamDirectory};

use crate::cursor::EntryCursor;
use crate::entity::{Entity, EntityType, MemberType, MembershipEntity};
use crate::error::DirectoryError;
use crate::filter::Filter;

/// Offset window over an id-ordered result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub offset: usize,
    /// Hard cap on returned entries
    pub limit: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub scope: EntityType,
    pub filter: Filter,
    pub page: Option<Page>,
}

impl SearchRequest {
    pub fn new(scope: EntityType, filter: Filter) -> Self {
        Self {
            scope,
            filter,
            page: None,
        }
    }

    #[must_use]
    pub fn with_page(mut self, offset: usize, limit: usize) -> Self {
        self.page = Some(Page { offset, limit });
        self
    }
}

pub(crate) fn apply_page<I: Iterator>(items: I, page: Option<Page>) -> impl Iterator<Item = I::Item> {
    let (offset, limit) = page.map_or((0, usize::MAX), |page| (page.offset, page.limit));
    items.skip(offset).take(limit)
}

/// Synchronization primitives that keep the cache store in step with the
/// upstream directory.
///
/// Every primitive commits on its own; a failed bulk call leaves the rows
/// already written in place, so re-running it resumes the work.
#[async_trait]
pub trait DirectorySync: Send + Sync {
    /// Whether the store must be reset and fully resynchronized. A store
    /// that has never been populated requires a reset.
    async fn require_reset(&self) -> Result<bool, DirectoryError>;

    async fn mark_reset_required(&self) -> Result<(), DirectoryError>;

    /// Delete every cached entity and membership and flag the store as
    /// needing a full sync.
    async fn reset(&self) -> Result<(), DirectoryError>;

    /// Record that a full sync completed; reads are served again.
    async fn mark_synchronized(&self) -> Result<(), DirectoryError>;

    /// Fetch one group upstream and upsert it. Fails with `EntityNotFound`
    /// when upstream does not know the id.
    async fn upsert_group(&self, id: &str) -> Result<(), DirectoryError>;

    /// Upsert up to `max` groups starting at upstream offset `start`.
    /// Returns how many were written.
    async fn upsert_groups_page(&self, start: usize, max: usize) -> Result<usize, DirectoryError>;

    async fn upsert_all_groups(&self) -> Result<usize, DirectoryError>;

    async fn upsert_user(&self, id: &str) -> Result<(), DirectoryError>;

    /// Upsert `id` and give it every group membership `copy_from` has.
    async fn upsert_user_copying_groups(&self, id: &str, copy_from: &str) -> Result<(), DirectoryError>;

    async fn upsert_users_page(&self, start: usize, max: usize) -> Result<usize, DirectoryError>;

    async fn upsert_all_users(&self) -> Result<usize, DirectoryError>;

    /// Both ends must already be cached.
    async fn upsert_membership(&self, membership: &MembershipEntity) -> Result<(), DirectoryError>;

    /// Remove a group with every edge that touches it. Idempotent.
    async fn drop_group(&self, id: &str) -> Result<(), DirectoryError>;

    async fn drop_all_groups(&self) -> Result<usize, DirectoryError>;

    async fn drop_user(&self, id: &str) -> Result<(), DirectoryError>;

    async fn drop_all_users(&self) -> Result<usize, DirectoryError>;

    async fn drop_membership(&self, membership: &MembershipEntity) -> Result<(), DirectoryError>;

    /// Every cached edge, ordered by group, member type then member.
    async fn memberships(&self) -> Result<Box<dyn EntryCursor<MembershipEntity>>, DirectoryError>;
}

/// Read access used by the directory front end.
#[async_trait]
pub trait NestedDirectoryBackend: Send + Sync {
    fn namespace(&self) -> &Namespace;

    fn sync(&self) -> &dyn DirectorySync;

    async fn lookup(&self, entity_type: EntityType, id: &str) -> Result<Entity, DirectoryError>;

    async fn search(
        &self,
        request: &SearchRequest,
    ) -> Result<Box<dyn EntryCursor<Entity>>, DirectoryError>;

    /// Ids of every group `id` belongs to, directly or through nesting,
    /// ordered case-insensitively.
    async fn effective_groups(
        &self,
        member_type: MemberType,
        id: &str,
    ) -> Result<Vec<String>, DirectoryError>;
}

/// Sync surface for backends without a local store: nothing to do, nothing
/// to reset.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSync;

#[async_trait]
impl DirectorySync for NoopSync {
    async fn require_reset(&self) -> Result<bool, DirectoryError> {
        Ok(false)
    }

    async fn mark_reset_required(&self) -> Result<(), DirectoryError> {
        Ok(())
    }

    async fn reset(&self) -> Result<(), DirectoryError> {
        Ok(())
    }

    async fn mark_synchronized(&self) -> Result<(), DirectoryError> {
        Ok(())
    }

    async fn upsert_group(&self, _id: &str) -> Result<(), DirectoryError> {
        Ok(())
    }

    async fn upsert_groups_page(&self, _start: usize, _max: usize) -> Result<usize, DirectoryError> {
        Ok(0)
    }

    async fn upsert_all_groups(&self) -> Result<usize, DirectoryError> {
        Ok(0)
    }

    async fn upsert_user(&self, _id: &str) -> Result<(), DirectoryError> {
        Ok(())
    }

    async fn upsert_user_copying_groups(&self, _id: &str, _copy_from: &str) -> Result<(), DirectoryError> {
        Ok(())
    }

    async fn upsert_users_page(&self, _start: usize, _max: usize) -> Result<usize, DirectoryError> {
        Ok(0)
    }

    async fn upsert_all_users(&self) -> Result<usize, DirectoryError> {
        Ok(0)
    }

    async fn upsert_membership(&self, _membership: &MembershipEntity) -> Result<(), DirectoryError> {
        Ok(())
    }

    async fn drop_group(&self, _id: &str) -> Result<(), DirectoryError> {
        Ok(())
    }

    async fn drop_all_groups(&self) -> Result<usize, DirectoryError> {
        Ok(0)
    }

    async fn drop_user(&self, _id: &str) -> Result<(), DirectoryError> {
        Ok(())
    }

    async fn drop_all_users(&self) -> Result<usize, DirectoryError> {
        Ok(0)
    }

    async fn drop_membership(&self, _membership: &MembershipEntity) -> Result<(), DirectoryError> {
        Ok(())
    }

    async fn memberships(&self) -> Result<Box<dyn EntryCursor<MembershipEntity>>, DirectoryError> {
        Ok(Box::new(crate::cursor::ListCursor::new("memberships", Vec::new())))
    }
}
