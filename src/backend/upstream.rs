// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Upstream directory source.
//!
//! The sync primitives pull authoritative records through
//! [`UpstreamDirectory`]. Paging is by offset over a stable, id-sorted
//! order; a page shorter than requested is the last one.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};

use crate::entity::{fold, GroupEntity, MemberType, MembershipEntity, UserEntity};
use crate::error::DirectoryError;

#[async_trait]
pub trait UpstreamDirectory: Send + Sync {
    async fn group(&self, id: &str) -> Result<Option<GroupEntity>, DirectoryError>;

    async fn groups(&self, start: usize, max: usize) -> Result<Vec<GroupEntity>, DirectoryError>;

    async fn user(&self, id: &str) -> Result<Option<UserEntity>, DirectoryError>;

    async fn users(&self, start: usize, max: usize) -> Result<Vec<UserEntity>, DirectoryError>;

    async fn memberships(
        &self,
        start: usize,
        max: usize,
    ) -> Result<Vec<MembershipEntity>, DirectoryError>;
}

/// In-memory upstream, keyed by folded id.
///
/// Records are returned with `member_of`/`members` derived from the stored
/// edges. Used for embedding and for tests; [`StaticDirectory::deny_access`]
/// simulates rejected upstream credentials.
#[derive(Default)]
pub struct StaticDirectory {
    groups: DashMap<String, GroupEntity>,
    users: DashMap<String, UserEntity>,
    memberships: DashSet<MembershipEntity>,
    denied: AtomicBool,
}

impl StaticDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_group(&self, group: GroupEntity) {
        self.groups.insert(fold(&group.id), group);
    }

    pub fn put_user(&self, user: UserEntity) {
        self.users.insert(fold(&user.id), user);
    }

    pub fn add_membership(&self, membership: MembershipEntity) {
        self.memberships.insert(membership);
    }

    pub fn remove_membership(&self, membership: &MembershipEntity) {
        self.memberships.remove(membership);
    }

    /// Remove a group and every edge touching it.
    pub fn remove_group(&self, id: &str) {
        let key = fold(id);
        self.groups.remove(&key);
        self.memberships.retain(|edge| {
            fold(&edge.group_id) != key
                && !(edge.member_type == MemberType::Group && fold(&edge.member_id) == key)
        });
    }

    pub fn remove_user(&self, id: &str) {
        let key = fold(id);
        self.users.remove(&key);
        self.memberships
            .retain(|edge| !(edge.member_type == MemberType::User && fold(&edge.member_id) == key));
    }

    /// Make every call fail with `SecurityProblem` while `denied` is set.
    pub fn deny_access(&self, denied: bool) {
        self.denied.store(denied, Ordering::SeqCst);
    }

    fn authorize(&self) -> Result<(), DirectoryError> {
        if self.denied.load(Ordering::SeqCst) {
            return Err(DirectoryError::SecurityProblem(
                "upstream rejected the configured credentials".into(),
            ));
        }
        Ok(())
    }

    fn parents_of(&self, member_type: MemberType, id: &str) -> Vec<String> {
        let key = fold(id);
        let mut parents: Vec<String> = self
            .memberships
            .iter()
            .filter(|edge| edge.member_type == member_type && fold(&edge.member_id) == key)
            .map(|edge| edge.group_id.clone())
            .collect();
        parents.sort_by_key(|id| fold(id));
        parents
    }

    fn members_of(&self, id: &str) -> Vec<String> {
        let key = fold(id);
        let mut members: Vec<String> = self
            .memberships
            .iter()
            .filter(|edge| fold(&edge.group_id) == key)
            .map(|edge| edge.member_id.clone())
            .collect();
        members.sort_by_key(|id| fold(id));
        members
    }

    fn enrich_group(&self, mut group: GroupEntity) -> GroupEntity {
        group.member_of = self.parents_of(MemberType::Group, &group.id);
        group.members = self.members_of(&group.id);
        group
    }

    fn enrich_user(&self, mut user: UserEntity) -> UserEntity {
        user.member_of = self.parents_of(MemberType::User, &user.id);
        user
    }
}

fn page_of<K: Ord + Clone, V: Clone>(map: &DashMap<K, V>, start: usize, max: usize) -> Vec<V>
where
    K: std::hash::Hash + Eq,
{
    let mut entries: Vec<(K, V)> = map
        .iter()
        .map(|entry| (entry.key().clone(), entry.value().clone()))
        .collect();
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    entries.into_iter().skip(start).take(max).map(|(_, v)| v).collect()
}

#[async_trait]
impl UpstreamDirectory for StaticDirectory {
    async fn group(&self, id: &str) -> Result<Option<GroupEntity>, DirectoryError> {
        self.authorize()?;
        let group = self.groups.get(&fold(id)).map(|entry| entry.value().clone());
        Ok(group.map(|group| self.enrich_group(group)))
    }

    async fn groups(&self, start: usize, max: usize) -> Result<Vec<GroupEntity>, DirectoryError> {
        self.authorize()?;
        Ok(page_of(&self.groups, start, max)
            .into_iter()
            .map(|group| self.enrich_group(group))
            .collect())
    }

    async fn user(&self, id: &str) -> Result<Option<UserEntity>, DirectoryError> {
        self.authorize()?;
        let user = self.users.get(&fold(id)).map(|entry| entry.value().clone());
        Ok(user.map(|user| self.enrich_user(user)))
    }

    async fn users(&self, start: usize, max: usize) -> Result<Vec<UserEntity>, DirectoryError> {
        self.authorize()?;
        Ok(page_of(&self.users, start, max)
            .into_iter()
            .map(|user| self.enrich_user(user))
            .collect())
    }

    async fn memberships(
        &self,
        start: usize,
        max: usize,
    ) -> Result<Vec<MembershipEntity>, DirectoryError> {
        self.authorize()?;
        let mut edges: Vec<MembershipEntity> =
            self.memberships.iter().map(|edge| edge.key().clone()).collect();
        edges.sort_by_key(|edge| {
            (
                fold(&edge.group_id),
                edge.member_type.as_str(),
                fold(&edge.member_id),
            )
        });
        Ok(edges.into_iter().skip(start).take(max).collect())
    }
}
