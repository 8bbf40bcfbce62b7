// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Full resynchronization pass.
//!
//! Drives the [`DirectorySync`] primitives from an [`UpstreamDirectory`]
//! when the store asks for a reset. Incremental passes are left to the
//! embedding application, which calls the per-entity primitives directly.

use std::time::Instant;

use tracing::{info, instrument, warn};

use crate::backend::{DirectorySync, UpstreamDirectory};
use crate::error::DirectoryError;
use crate::resilience::{retry, RetryConfig};

/// Outcome of one [`resync`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// False when the store did not need a reset and nothing ran.
    pub performed: bool,
    pub groups: usize,
    pub users: usize,
    pub memberships: usize,
    /// Edges whose group or member was missing from the store
    pub skipped_memberships: usize,
}

/// Rebuild the store from `upstream` if it requires a reset.
///
/// Groups and users are paged through the sync primitives; memberships are
/// paged from upstream and upserted one by one. The store is marked
/// synchronized only after every page succeeded, so a failed pass leaves it
/// flagged and the next call starts over.
#[instrument(skip(sync, upstream))]
pub async fn resync(
    sync: &dyn DirectorySync,
    upstream: &dyn UpstreamDirectory,
    page_size: usize,
) -> Result<SyncReport, DirectoryError> {
    if !sync.require_reset().await? {
        return Ok(SyncReport::default());
    }

    let started = Instant::now();
    let page_size = page_size.max(1);
    let mut report = SyncReport {
        performed: true,
        ..SyncReport::default()
    };

    sync.reset().await?;

    loop {
        let written = sync.upsert_groups_page(report.groups, page_size).await?;
        report.groups += written;
        if written < page_size {
            break;
        }
    }

    loop {
        let written = sync.upsert_users_page(report.users, page_size).await?;
        report.users += written;
        if written < page_size {
            break;
        }
    }

    let mut start = 0;
    loop {
        let page = retry("upstream_memberships", &RetryConfig::query(), || {
            upstream.memberships(start, page_size)
        })
        .await?;
        let fetched = page.len();
        for membership in &page {
            match sync.upsert_membership(membership).await {
                Ok(()) => report.memberships += 1,
                Err(DirectoryError::EntityNotFound { entity_type, id }) => {
                    warn!(
                        group = %membership.group_id,
                        member = %membership.member_id,
                        missing_type = %entity_type,
                        missing_id = %id,
                        "Skipping membership with a missing endpoint"
                    );
                    report.skipped_memberships += 1;
                }
                Err(err) => return Err(err),
            }
        }
        start += fetched;
        if fetched < page_size {
            break;
        }
    }

    sync.mark_synchronized().await?;
    info!(
        groups = report.groups,
        users = report.users,
        memberships = report.memberships,
        skipped = report.skipped_memberships,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Full resync complete"
    );
    Ok(report)
}
