//! Integration tests for the cache-backed directory backend.
//!
//! Every test opens its own file-backed SQLite store in the temp dir, so no
//! external services are needed.
//!
//! # Running Tests
//! ```bash
//! cargo test --test backend
//! ```
//!
//! # Test Organization
//! - `happy_*` - Normal operation: resync, lookups, searches, nested groups
//! - `failure_*` - Failure scenarios: reset gating, missing endpoints, upstream denial, rollback

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing_subscriber::EnvFilter;

use directory_cache::backend::{
    CachedBackend, DirectBackend, DirectorySync, Namespace, NestedDirectoryBackend,
    SearchRequest, StaticDirectory,
};
use directory_cache::cursor::drain;
use directory_cache::entity::{Entity, EntityType, GroupEntity, MemberType, MembershipEntity, UserEntity};
use directory_cache::filter::Filter;
use directory_cache::{resync, DirectoryCacheConfig, DirectoryError, TransactionalAccess};

// =============================================================================
// Fixtures
// =============================================================================

/// Removes the database files when the test ends.
struct TempDb {
    path: PathBuf,
}

impl TempDb {
    fn new() -> Self {
        let path = std::env::temp_dir().join(format!("directory-cache-{}.db", uuid::Uuid::new_v4()));
        Self { path }
    }

    fn url(&self) -> String {
        format!("sqlite://{}?mode=rwc", self.path.display())
    }
}

impl Drop for TempDb {
    fn drop(&mut self) {
        for suffix in ["", "-wal", "-shm"] {
            let mut file = self.path.clone().into_os_string();
            file.push(suffix);
            let _ = std::fs::remove_file(file);
        }
    }
}

/// Groups: Admins ⊂ staff ⊂ everyone ⊂ Admins (a cycle).
/// Users: alice and Bob in Admins, carol in everyone.
fn upstream() -> Arc<StaticDirectory> {
    let upstream = StaticDirectory::new();
    upstream.put_group(GroupEntity::new("Admins").with_description("Administrators"));
    upstream.put_group(GroupEntity::new("staff"));
    upstream.put_group(GroupEntity::new("everyone"));

    upstream.put_user(
        UserEntity::new("alice")
            .with_display_name("Alice Liddell")
            .with_names("Alice", "Liddell")
            .with_email("alice@example.org"),
    );
    upstream.put_user(UserEntity::new("Bob").with_email("bob@example.org").with_active(false));
    upstream.put_user(UserEntity::new("carol").with_display_name("Carol"));

    upstream.add_membership(MembershipEntity::user("admins", "alice"));
    upstream.add_membership(MembershipEntity::user("Admins", "bob"));
    upstream.add_membership(MembershipEntity::user("everyone", "carol"));
    upstream.add_membership(MembershipEntity::nested_group("staff", "admins"));
    upstream.add_membership(MembershipEntity::nested_group("everyone", "staff"));
    upstream.add_membership(MembershipEntity::nested_group("admins", "everyone"));
    Arc::new(upstream)
}

/// Log to the test writer; `RUST_LOG=directory_cache=debug` shows the sync trail.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_target(false)
        .compact()
        .with_test_writer()
        .try_init();
}

fn config(db: &TempDb) -> DirectoryCacheConfig {
    DirectoryCacheConfig {
        sql_url: db.url(),
        max_connections: 4,
        sync_page_size: 2,
        cursor_buffer: 4,
        ..Default::default()
    }
}

async fn open(db: &TempDb, upstream: Arc<StaticDirectory>) -> CachedBackend {
    init_tracing();
    CachedBackend::connect(&config(db), upstream)
        .await
        .expect("Failed to open cache store")
}

/// Open and fully synchronize a backend.
async fn synced(db: &TempDb) -> (CachedBackend, Arc<StaticDirectory>) {
    let upstream = upstream();
    let backend = open(db, upstream.clone()).await;
    resync(&backend, upstream.as_ref(), 2).await.expect("Resync failed");
    (backend, upstream)
}

async fn search_ids(
    backend: &dyn NestedDirectoryBackend,
    request: &SearchRequest,
) -> Result<Vec<String>, DirectoryError> {
    let mut cursor = backend.search(request).await?;
    Ok(drain(cursor.as_mut())
        .await?
        .iter()
        .map(|entity| entity.id().to_string())
        .collect())
}

fn user(entity: Entity) -> UserEntity {
    match entity {
        Entity::User(user) => user,
        other => panic!("expected a user, got {other:?}"),
    }
}

fn group(entity: Entity) -> GroupEntity {
    match entity {
        Entity::Group(group) => group,
        other => panic!("expected a group, got {other:?}"),
    }
}

// =============================================================================
// Reset gating
// =============================================================================

#[tokio::test]
async fn failure_reads_blocked_until_synchronized() {
    let db = TempDb::new();
    let upstream = upstream();
    let backend = open(&db, upstream.clone()).await;

    assert!(backend.require_reset().await.unwrap(), "fresh store needs a reset");
    assert!(matches!(
        backend.lookup(EntityType::Group, "admins").await,
        Err(DirectoryError::ResetRequired)
    ));
    let request = SearchRequest::new(EntityType::User, Filter::match_all());
    assert!(matches!(
        backend.search(&request).await.map(|_| ()),
        Err(DirectoryError::ResetRequired)
    ));
    let scoped = backend
        .with_read_access(|scope| {
            Box::pin(async move {
                scope
                    .query("SELECT COUNT(*) FROM cache_entities")
                    .fetch_scalar(scope)
                    .await
            })
        })
        .await;
    assert!(matches!(scoped, Err(DirectoryError::ResetRequired)));

    // Singletons are not cached and stay readable.
    assert!(backend.lookup(EntityType::Domain, "directory").await.is_ok());

    let report = resync(&backend, upstream.as_ref(), 2).await.unwrap();
    assert!(report.performed);
    assert!(!backend.require_reset().await.unwrap());
    assert!(backend.lookup(EntityType::Group, "admins").await.is_ok());

    backend.mark_reset_required().await.unwrap();
    assert!(matches!(
        backend.lookup(EntityType::Group, "admins").await,
        Err(DirectoryError::ResetRequired)
    ));
}

#[tokio::test]
async fn happy_reset_clears_the_store() {
    let db = TempDb::new();
    let (backend, _upstream) = synced(&db).await;

    backend.reset().await.unwrap();
    assert!(backend.require_reset().await.unwrap());
    backend.mark_synchronized().await.unwrap();
    assert_eq!(backend.count(EntityType::Group).await.unwrap(), 0);
    assert_eq!(backend.count(EntityType::User).await.unwrap(), 0);
    let mut edges = backend.memberships().await.unwrap();
    assert!(drain(edges.as_mut()).await.unwrap().is_empty());
}

// =============================================================================
// Synchronization
// =============================================================================

#[tokio::test]
async fn happy_resync_mirrors_upstream() {
    let db = TempDb::new();
    let upstream = upstream();
    let backend = open(&db, upstream.clone()).await;

    let report = resync(&backend, upstream.as_ref(), 2).await.unwrap();
    assert!(report.performed);
    assert_eq!(report.groups, 3);
    assert_eq!(report.users, 3);
    assert_eq!(report.memberships, 6);
    assert_eq!(report.skipped_memberships, 0);

    assert_eq!(backend.count(EntityType::Group).await.unwrap(), 3);
    assert_eq!(backend.count(EntityType::User).await.unwrap(), 3);

    let again = resync(&backend, upstream.as_ref(), 2).await.unwrap();
    assert!(!again.performed, "a populated store is left alone");
}

#[tokio::test]
async fn happy_page_variants_report_end_of_pagination() {
    let db = TempDb::new();
    let upstream = upstream();
    let backend = open(&db, upstream).await;

    assert_eq!(backend.upsert_groups_page(0, 2).await.unwrap(), 2);
    assert_eq!(backend.upsert_groups_page(2, 2).await.unwrap(), 1);
    assert_eq!(backend.upsert_groups_page(3, 2).await.unwrap(), 0);
    assert_eq!(backend.upsert_users_page(0, 0).await.unwrap(), 0);
    assert_eq!(backend.upsert_all_users().await.unwrap(), 3);

    backend.mark_synchronized().await.unwrap();
    assert_eq!(backend.count(EntityType::Group).await.unwrap(), 3);
}

#[tokio::test]
async fn happy_upsert_is_idempotent_and_picks_up_changes() {
    let db = TempDb::new();
    let (backend, upstream) = synced(&db).await;

    upstream.put_group(GroupEntity::new("Admins").with_description("Root operators"));
    backend.upsert_group("ADMINS").await.unwrap();
    backend.upsert_group("admins").await.unwrap();

    assert_eq!(backend.count(EntityType::Group).await.unwrap(), 3);
    let admins = group(backend.lookup(EntityType::Group, "Admins").await.unwrap());
    assert_eq!(admins.description.as_deref(), Some("Root operators"));
}

#[tokio::test]
async fn failure_upsert_of_unknown_id() {
    let db = TempDb::new();
    let (backend, _upstream) = synced(&db).await;

    assert!(matches!(
        backend.upsert_user("mallory").await,
        Err(DirectoryError::EntityNotFound { entity_type: EntityType::User, .. })
    ));
}

#[tokio::test]
async fn failure_blank_id_is_rejected() {
    let db = TempDb::new();
    let upstream = Arc::new(StaticDirectory::new());
    upstream.put_user(UserEntity::new("   "));
    let backend = open(&db, upstream).await;

    assert!(matches!(
        backend.upsert_users_page(0, 10).await,
        Err(DirectoryError::DirectoryAccessFailure(_))
    ));
    backend.mark_synchronized().await.unwrap();
    assert_eq!(backend.count(EntityType::User).await.unwrap(), 0);
}

#[tokio::test]
async fn failure_denied_upstream_surfaces_security_problem() {
    let db = TempDb::new();
    let (backend, upstream) = synced(&db).await;

    upstream.deny_access(true);
    assert!(matches!(
        backend.upsert_group("admins").await,
        Err(DirectoryError::SecurityProblem(_))
    ));
    assert!(matches!(
        backend.upsert_all_users().await,
        Err(DirectoryError::SecurityProblem(_))
    ));

    backend.mark_reset_required().await.unwrap();
    assert!(matches!(
        resync(&backend, upstream.as_ref(), 2).await,
        Err(DirectoryError::SecurityProblem(_))
    ));
    assert!(backend.require_reset().await.unwrap(), "a failed resync leaves the flag set");

    upstream.deny_access(false);
    let report = resync(&backend, upstream.as_ref(), 2).await.unwrap();
    assert!(report.performed);
    assert_eq!(report.users, 3);
    assert_eq!(backend.count(EntityType::User).await.unwrap(), 3);
}

#[tokio::test]
async fn happy_bulk_sync_resumes_after_failure() {
    let db = TempDb::new();
    let upstream = upstream();
    let backend = open(&db, upstream.clone()).await;

    assert_eq!(backend.upsert_groups_page(0, 2).await.unwrap(), 2);
    upstream.deny_access(true);
    assert!(backend.upsert_groups_page(2, 2).await.is_err());
    upstream.deny_access(false);

    backend.mark_synchronized().await.unwrap();
    assert_eq!(backend.count(EntityType::Group).await.unwrap(), 2);

    assert_eq!(backend.upsert_groups_page(2, 2).await.unwrap(), 1);
    assert_eq!(backend.count(EntityType::Group).await.unwrap(), 3);
}

// =============================================================================
// Lookup and search
// =============================================================================

#[tokio::test]
async fn happy_lookup_ignores_case() {
    let db = TempDb::new();
    let (backend, _upstream) = synced(&db).await;

    let alice = user(backend.lookup(EntityType::User, "ALICE").await.unwrap());
    assert_eq!(alice.id, "alice");
    assert_eq!(alice.display_name.as_deref(), Some("Alice Liddell"));
    assert_eq!(alice.email.as_deref(), Some("alice@example.org"));
    assert!(alice.active);
    assert_eq!(alice.member_of, vec!["Admins".to_string()]);

    let bob = user(backend.lookup(EntityType::User, "bob").await.unwrap());
    assert!(!bob.active);

    let admins = group(backend.lookup(EntityType::Group, "aDmInS").await.unwrap());
    assert_eq!(admins, GroupEntity::new("ADMINS"));
    assert_eq!(admins.members, vec!["alice".to_string(), "Bob".to_string(), "everyone".to_string()]);
    assert_eq!(admins.member_of, vec!["staff".to_string()]);

    assert!(matches!(
        backend.lookup(EntityType::Group, "alice").await,
        Err(DirectoryError::EntityNotFound { .. })
    ));
}

#[tokio::test]
async fn happy_search_filters() {
    let db = TempDb::new();
    let (backend, _upstream) = synced(&db).await;
    let users = |filter| SearchRequest::new(EntityType::User, filter);

    assert_eq!(
        search_ids(&backend, &users(Filter::eq("email", "ALICE@example.org"))).await.unwrap(),
        vec!["alice"]
    );
    assert_eq!(
        search_ids(&backend, &users(Filter::present("email").negate())).await.unwrap(),
        vec!["carol"]
    );
    assert_eq!(
        search_ids(&backend, &users(Filter::eq("active", "false"))).await.unwrap(),
        vec!["Bob"]
    );
    assert_eq!(
        search_ids(&backend, &users(Filter::ends_with("email", "@example.org"))).await.unwrap(),
        vec!["alice", "Bob"]
    );
    assert_eq!(
        search_ids(
            &backend,
            &users(Filter::eq("memberOf", "everyone").or(Filter::starts_with("displayName", "ali")))
        )
        .await
        .unwrap(),
        vec!["alice", "carol"]
    );

    let groups = SearchRequest::new(EntityType::Group, Filter::eq("memberOf", "STAFF"));
    assert_eq!(search_ids(&backend, &groups).await.unwrap(), vec!["Admins"]);

    let with_member = SearchRequest::new(EntityType::Group, Filter::eq("members", "carol"));
    assert_eq!(search_ids(&backend, &with_member).await.unwrap(), vec!["everyone"]);

    let empty_or = SearchRequest::new(EntityType::Group, Filter::any_of(Vec::new()));
    assert!(search_ids(&backend, &empty_or).await.unwrap().is_empty());
}

#[tokio::test]
async fn happy_search_pages_in_id_order() {
    let db = TempDb::new();
    let (backend, _upstream) = synced(&db).await;

    let all = SearchRequest::new(EntityType::User, Filter::match_all());
    assert_eq!(search_ids(&backend, &all).await.unwrap(), vec!["alice", "Bob", "carol"]);
    assert_eq!(
        search_ids(&backend, &all.clone().with_page(1, 1)).await.unwrap(),
        vec!["Bob"]
    );
    assert!(search_ids(&backend, &all.with_page(3, 10)).await.unwrap().is_empty());
}

#[tokio::test]
async fn happy_search_singletons() {
    let db = TempDb::new();
    let (backend, _upstream) = synced(&db).await;

    let domain = SearchRequest::new(EntityType::Domain, Filter::match_all());
    assert_eq!(search_ids(&backend, &domain).await.unwrap(), vec!["directory"]);
    let unit = SearchRequest::new(EntityType::UserUnit, Filter::eq("id", "USERS"));
    assert_eq!(search_ids(&backend, &unit).await.unwrap(), vec!["users"]);
}

#[tokio::test]
async fn failure_untranslatable_filters() {
    let db = TempDb::new();
    let (backend, _upstream) = synced(&db).await;

    let unknown = SearchRequest::new(EntityType::User, Filter::present("shoeSize"));
    assert!(matches!(
        search_ids(&backend, &unknown).await,
        Err(DirectoryError::UnknownColumn { .. })
    ));

    let range = SearchRequest::new(
        EntityType::User,
        Filter::GreaterOrEqual {
            attribute: "email".into(),
            value: "m".into(),
        },
    );
    assert!(matches!(
        search_ids(&backend, &range).await,
        Err(DirectoryError::UnsupportedQueryExpression(_))
    ));

    let members_of_user = SearchRequest::new(EntityType::User, Filter::present("members"));
    assert!(matches!(
        search_ids(&backend, &members_of_user).await,
        Err(DirectoryError::UnknownColumn { .. })
    ));
}

#[tokio::test]
async fn happy_direct_backend_agrees_with_cache() {
    let db = TempDb::new();
    let (backend, upstream) = synced(&db).await;
    let direct = DirectBackend::new(upstream, Namespace::default());

    let filters = [
        (EntityType::User, Filter::match_all()),
        (EntityType::User, Filter::contains("email", "EXAMPLE")),
        (EntityType::User, Filter::present("displayName").negate()),
        (EntityType::User, Filter::eq("memberOf", "admins").and(Filter::eq("active", "true"))),
        (EntityType::Group, Filter::eq("members", "staff")),
        (EntityType::Group, Filter::substring("id", Some("e".into()), vec!["r".into()], Some("e".into()))),
    ];
    for (scope, filter) in filters {
        let request = SearchRequest::new(scope, filter.clone());
        assert_eq!(
            search_ids(&backend, &request).await.unwrap(),
            search_ids(&direct, &request).await.unwrap(),
            "filter {filter}"
        );
    }

    assert_eq!(
        backend.effective_groups(MemberType::User, "carol").await.unwrap(),
        direct.effective_groups(MemberType::User, "carol").await.unwrap()
    );
}

#[tokio::test]
async fn happy_search_folds_non_ascii_text() {
    let db = TempDb::new();
    let (backend, upstream) = synced(&db).await;
    upstream.put_user(
        UserEntity::new("emile")
            .with_display_name("Émile")
            .with_names("Émile", "Øster")
            .with_email("ÉMILE@exemple.fr"),
    );
    backend.upsert_user("emile").await.unwrap();
    let direct = DirectBackend::new(upstream, Namespace::default());

    let hits = [
        Filter::eq("displayName", "Émile"),
        Filter::eq("displayName", "éMILE"),
        Filter::starts_with("lastName", "ø"),
        Filter::contains("email", "émile@"),
        Filter::eq("firstName", "ÉMILE").and(Filter::present("lastName")),
    ];
    for filter in hits {
        let request = SearchRequest::new(EntityType::User, filter.clone());
        assert_eq!(search_ids(&backend, &request).await.unwrap(), vec!["emile"], "filter {filter}");
        assert_eq!(search_ids(&direct, &request).await.unwrap(), vec!["emile"], "filter {filter}");
    }

    // Accents are significant; only case folds.
    let unaccented = SearchRequest::new(EntityType::User, Filter::eq("displayName", "Emile"));
    assert!(search_ids(&backend, &unaccented).await.unwrap().is_empty());
    assert!(search_ids(&direct, &unaccented).await.unwrap().is_empty());
}

#[tokio::test]
async fn happy_search_cursor_open_during_writes() {
    let db = TempDb::new();
    let upstream = upstream();
    init_tracing();
    let narrow = DirectoryCacheConfig {
        cursor_buffer: 1,
        ..config(&db)
    };
    let backend = CachedBackend::connect(&narrow, upstream.clone()).await.unwrap();
    resync(&backend, upstream.as_ref(), 2).await.unwrap();

    let all = SearchRequest::new(EntityType::User, Filter::match_all());
    let mut cursor = backend.search(&all).await.unwrap();
    assert!(cursor.next().await.unwrap());
    assert_eq!(cursor.get().unwrap().id(), "alice");

    upstream.put_user(UserEntity::new("dave"));
    timeout(Duration::from_secs(5), backend.upsert_user("dave"))
        .await
        .expect("write waited on an open search cursor")
        .unwrap();

    // Later pages continue after the last key read, so the new row shows up.
    let mut ids = vec!["alice".to_string()];
    while cursor.next().await.unwrap() {
        ids.push(cursor.get().unwrap().id().to_string());
    }
    assert_eq!(ids, vec!["alice", "Bob", "carol", "dave"]);

    // A window larger than one page still honours offset and limit.
    assert_eq!(
        search_ids(&backend, &all.with_page(1, 2)).await.unwrap(),
        vec!["Bob", "carol"]
    );
}

// =============================================================================
// Nested groups
// =============================================================================

#[tokio::test]
async fn happy_effective_groups_follow_nesting() {
    let db = TempDb::new();
    let (backend, _upstream) = synced(&db).await;

    let expected = vec!["Admins".to_string(), "everyone".to_string(), "staff".to_string()];
    assert_eq!(backend.effective_groups(MemberType::User, "ALICE").await.unwrap(), expected);
    assert_eq!(backend.effective_groups(MemberType::User, "alice").await.unwrap(), expected);
    assert_eq!(backend.resolution_stats().hits, 1);

    // Group closure includes the group itself through the cycle.
    assert_eq!(
        backend.effective_groups(MemberType::Group, "staff").await.unwrap(),
        expected
    );

    assert!(matches!(
        backend.effective_groups(MemberType::User, "nobody").await,
        Err(DirectoryError::EntityNotFound { .. })
    ));
}

#[tokio::test]
async fn happy_writes_invalidate_resolutions() {
    let db = TempDb::new();
    let (backend, _upstream) = synced(&db).await;

    assert_eq!(backend.effective_groups(MemberType::User, "alice").await.unwrap().len(), 3);
    let before = backend.generation();
    backend
        .drop_membership(&MembershipEntity::nested_group("STAFF", "admins"))
        .await
        .unwrap();
    assert!(backend.generation() > before);

    assert_eq!(
        backend.effective_groups(MemberType::User, "alice").await.unwrap(),
        vec!["Admins".to_string()]
    );
    assert_eq!(backend.resolution_stats().stale, 1);
}

#[tokio::test]
async fn happy_scoped_writes_invalidate_resolutions() {
    let db = TempDb::new();
    let (backend, _upstream) = synced(&db).await;

    let expected = vec!["Admins".to_string(), "everyone".to_string(), "staff".to_string()];
    assert_eq!(backend.effective_groups(MemberType::User, "carol").await.unwrap(), expected);

    let before = backend.generation();
    backend
        .with_write_access(|scope| {
            Box::pin(async move {
                scope
                    .query("DELETE FROM cache_memberships")
                    .execute_update(scope)
                    .await
            })
        })
        .await
        .unwrap();
    assert_eq!(backend.generation(), before + 1);

    assert!(backend
        .effective_groups(MemberType::User, "carol")
        .await
        .unwrap()
        .is_empty());
}

// =============================================================================
// Memberships
// =============================================================================

#[tokio::test]
async fn happy_memberships_cursor_streams_edges() {
    let db = TempDb::new();
    let (backend, _upstream) = synced(&db).await;

    let mut cursor = backend.memberships().await.unwrap();
    let edges = drain(cursor.as_mut()).await.unwrap();
    assert_eq!(edges.len(), 6);
    assert_eq!(edges[0].group_id, "Admins");
    assert!(edges.contains(&MembershipEntity::user("ADMINS", "ALICE")));
    assert!(edges.contains(&MembershipEntity::nested_group("everyone", "Staff")));

    assert!(cursor.is_closed());
    assert!(cursor.next().await.is_err());
    cursor.close();
}

#[tokio::test]
async fn happy_cursor_closed_early_releases_the_store() {
    let db = TempDb::new();
    let (backend, _upstream) = synced(&db).await;

    let mut cursor = backend.memberships().await.unwrap();
    assert!(cursor.next().await.unwrap());
    cursor.close();
    assert!(cursor.get().is_err());
    cursor.close();

    backend.drop_user("carol").await.unwrap();
    assert_eq!(backend.count(EntityType::User).await.unwrap(), 2);
}

#[tokio::test]
async fn happy_stale_edges_dropped_while_iterating() {
    let db = TempDb::new();
    let (backend, _upstream) = synced(&db).await;

    // Six edges against a four-row cursor buffer: the producer has more to
    // read while the consumer writes.
    let mut cursor = backend.memberships().await.unwrap();
    let mut dropped = Vec::new();
    while cursor.next().await.unwrap() {
        let edge = cursor.get().unwrap().clone();
        timeout(Duration::from_secs(5), backend.drop_membership(&edge))
            .await
            .expect("write waited on an open memberships cursor")
            .unwrap();
        dropped.push(edge);
    }
    assert_eq!(dropped.len(), 6);
    assert!(dropped.contains(&MembershipEntity::nested_group("admins", "everyone")));

    let mut remaining = backend.memberships().await.unwrap();
    assert!(drain(remaining.as_mut()).await.unwrap().is_empty());
}

#[tokio::test]
async fn failure_membership_requires_both_endpoints() {
    let db = TempDb::new();
    let (backend, _upstream) = synced(&db).await;

    assert!(matches!(
        backend.upsert_membership(&MembershipEntity::user("admins", "zed")).await,
        Err(DirectoryError::EntityNotFound { entity_type: EntityType::User, .. })
    ));
    assert!(matches!(
        backend.upsert_membership(&MembershipEntity::user("ghosts", "alice")).await,
        Err(DirectoryError::EntityNotFound { entity_type: EntityType::Group, .. })
    ));

    backend
        .upsert_membership(&MembershipEntity::user("STAFF", "Carol"))
        .await
        .unwrap();
    let carol = user(backend.lookup(EntityType::User, "carol").await.unwrap());
    assert_eq!(carol.member_of, vec!["everyone".to_string(), "staff".to_string()]);
}

#[tokio::test]
async fn happy_copy_groups_from_existing_user() {
    let db = TempDb::new();
    let (backend, upstream) = synced(&db).await;
    upstream.put_user(UserEntity::new("dave"));
    upstream.put_user(UserEntity::new("erin"));

    backend.upsert_user_copying_groups("dave", "ALICE").await.unwrap();
    let dave = user(backend.lookup(EntityType::User, "dave").await.unwrap());
    assert_eq!(dave.member_of, vec!["Admins".to_string()]);
    assert_eq!(
        backend.effective_groups(MemberType::User, "dave").await.unwrap().len(),
        3
    );

    assert!(matches!(
        backend.upsert_user_copying_groups("erin", "nobody").await,
        Err(DirectoryError::EntityNotFound { .. })
    ));
    assert!(matches!(
        backend.lookup(EntityType::User, "erin").await,
        Err(DirectoryError::EntityNotFound { .. })
    ));
}

#[tokio::test]
async fn happy_drop_cascades_edges() {
    let db = TempDb::new();
    let (backend, _upstream) = synced(&db).await;

    backend.drop_group("STAFF").await.unwrap();
    assert!(matches!(
        backend.lookup(EntityType::Group, "staff").await,
        Err(DirectoryError::EntityNotFound { .. })
    ));
    let mut cursor = backend.memberships().await.unwrap();
    let edges = drain(cursor.as_mut()).await.unwrap();
    assert_eq!(edges.len(), 4);
    assert!(edges
        .iter()
        .all(|edge| edge.group_id != "staff" && edge.member_id != "staff"));

    backend.drop_user("alice").await.unwrap();
    backend.drop_user("alice").await.unwrap();
    let admins = group(backend.lookup(EntityType::Group, "admins").await.unwrap());
    assert_eq!(admins.members, vec!["Bob".to_string(), "everyone".to_string()]);

    assert_eq!(backend.drop_all_users().await.unwrap(), 2);
    assert_eq!(backend.drop_all_groups().await.unwrap(), 2);
    let mut cursor = backend.memberships().await.unwrap();
    assert!(drain(cursor.as_mut()).await.unwrap().is_empty());
}

// =============================================================================
// Transactional access
// =============================================================================

#[tokio::test]
async fn failure_write_block_rolls_back() {
    let db = TempDb::new();
    let (backend, _upstream) = synced(&db).await;

    let generation = backend.generation();
    let result = backend
        .with_write_access(|scope| {
            Box::pin(async move {
                scope
                    .query("DELETE FROM cache_entities")
                    .execute_update(scope)
                    .await?;
                Err::<(), _>(DirectoryError::InternalServerError("abort".into()))
            })
        })
        .await;
    assert!(matches!(result, Err(DirectoryError::InternalServerError(_))));
    assert_eq!(backend.count(EntityType::Group).await.unwrap(), 3);
    assert_eq!(backend.generation(), generation, "rolled back writes leave the generation");

    let removed = backend
        .with_write_access(|scope| {
            Box::pin(async move {
                scope
                    .query("DELETE FROM cache_entities WHERE entity_type = :kind")
                    .on("kind", "USER")
                    .execute_update(scope)
                    .await
            })
        })
        .await
        .unwrap();
    assert_eq!(removed, 3);
    assert_eq!(backend.count(EntityType::User).await.unwrap(), 0);
}

#[tokio::test]
async fn failure_update_on_read_scope() {
    let db = TempDb::new();
    let (backend, _upstream) = synced(&db).await;

    let result = backend
        .with_read_access(|scope| {
            Box::pin(async move {
                scope
                    .query("DELETE FROM cache_entities")
                    .execute_update(scope)
                    .await
            })
        })
        .await;
    assert!(matches!(result, Err(DirectoryError::InternalServerError(_))));
    assert_eq!(backend.count(EntityType::Group).await.unwrap(), 3);
}
