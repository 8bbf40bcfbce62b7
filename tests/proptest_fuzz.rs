//! Property-based tests for the bounded cache and filter translation.
//!
//! Run with: cargo test --test proptest_fuzz
//!
//! These tests check that:
//! - The bounded cache never outgrows its capacity and evicts in LRU order
//! - SQL translation selects exactly the entries in-memory evaluation accepts,
//!   including non-ASCII text

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;
use proptest::test_runner::{Config, TestRunner};

use directory_cache::backend::{CachedBackend, NestedDirectoryBackend, SearchRequest, StaticDirectory};
use directory_cache::cache::BoundedCacheMap;
use directory_cache::cursor::drain;
use directory_cache::entity::{Entity, EntityType, GroupEntity, MembershipEntity, UserEntity};
use directory_cache::filter::Filter;
use directory_cache::{resync, DirectoryCacheConfig};

// =============================================================================
// Bounded cache
// =============================================================================

#[derive(Debug, Clone)]
enum CacheOp {
    Put(u8, u32),
    Get(u8),
}

fn cache_op_strategy() -> impl Strategy<Value = CacheOp> {
    prop_oneof![
        (0u8..12, any::<u32>()).prop_map(|(key, value)| CacheOp::Put(key, value)),
        (0u8..12).prop_map(CacheOp::Get),
    ]
}

/// Reference LRU: front is least recently used.
#[derive(Default)]
struct LruModel {
    entries: Vec<(u8, u32)>,
}

impl LruModel {
    fn put(&mut self, capacity: usize, key: u8, value: u32) {
        if capacity == 0 {
            return;
        }
        if let Some(index) = self.entries.iter().position(|(k, _)| *k == key) {
            self.entries.remove(index);
        } else {
            while self.entries.len() >= capacity {
                self.entries.remove(0);
            }
        }
        self.entries.push((key, value));
    }

    fn get(&mut self, key: u8) -> Option<u32> {
        let index = self.entries.iter().position(|(k, _)| *k == key)?;
        let entry = self.entries.remove(index);
        self.entries.push(entry);
        Some(entry.1)
    }

    fn keys(&self) -> Vec<u8> {
        self.entries.iter().map(|(k, _)| *k).collect()
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn prop_cache_never_exceeds_capacity(
        capacity in 0usize..8,
        ops in prop::collection::vec(cache_op_strategy(), 0..200)
    ) {
        let cache = BoundedCacheMap::new(capacity, Duration::from_secs(3600));
        for op in ops {
            match op {
                CacheOp::Put(key, value) => cache.put(key, value),
                CacheOp::Get(key) => {
                    cache.get(&key);
                }
            }
            prop_assert!(cache.len() <= capacity);
        }
    }

    #[test]
    fn prop_cache_evicts_least_recently_used(
        capacity in 1usize..8,
        ops in prop::collection::vec(cache_op_strategy(), 0..200)
    ) {
        let cache = BoundedCacheMap::new(capacity, Duration::from_secs(3600));
        let mut model = LruModel::default();
        for op in ops {
            match op {
                CacheOp::Put(key, value) => {
                    cache.put(key, value);
                    model.put(capacity, key, value);
                }
                CacheOp::Get(key) => {
                    prop_assert_eq!(cache.get(&key), model.get(key));
                }
            }
            prop_assert_eq!(cache.keys(), model.keys());
        }
    }
}

// =============================================================================
// Filter translation vs in-memory evaluation
// =============================================================================

const TEXT_ATTRIBUTES: &[&str] = &["id", "displayName", "firstName", "lastName", "email"];

fn fragment_strategy() -> impl Strategy<Value = String> {
    "[aAbBéÉ]{1,3}"
}

fn leaf_strategy() -> impl Strategy<Value = Filter> {
    let text_attribute = prop::sample::select(TEXT_ATTRIBUTES);
    let any_attribute = prop::sample::select(
        &["id", "displayName", "firstName", "lastName", "email", "active", "memberOf"][..],
    );
    prop_oneof![
        (text_attribute.clone(), fragment_strategy())
            .prop_map(|(attribute, value)| Filter::eq(attribute, value)),
        (
            text_attribute.clone(),
            prop::option::of(fragment_strategy()),
            prop::collection::vec(fragment_strategy(), 0..2),
            prop::option::of(fragment_strategy()),
        )
            .prop_map(|(attribute, initial, any, final_part)| {
                Filter::substring(attribute, initial, any, final_part)
            }),
        any_attribute.prop_map(Filter::present),
        prop::bool::ANY.prop_map(|flag| Filter::eq("active", flag.to_string())),
        prop::sample::select(&["ga", "GB", "gc", "GéA"][..]).prop_map(|group| Filter::eq("memberOf", group)),
        fragment_strategy().prop_map(|fragment| Filter::contains("memberOf", fragment)),
    ]
}

fn filter_strategy() -> impl Strategy<Value = Filter> {
    leaf_strategy().prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Filter::all),
            prop::collection::vec(inner.clone(), 0..4).prop_map(Filter::any_of),
            inner.prop_map(Filter::negate),
        ]
    })
}

struct TempDb {
    path: PathBuf,
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

fn seeded_upstream() -> Arc<StaticDirectory> {
    let upstream = StaticDirectory::new();
    for group in ["ga", "gb", "gab", "gÉa"] {
        upstream.put_group(GroupEntity::new(group));
    }
    let users = [
        UserEntity::new("ab").with_display_name("Abba").with_email("ab@b"),
        UserEntity::new("Ba").with_names("Bab", "Aa").with_active(false),
        UserEntity::new("aab").with_email("AAB@a").with_display_name("bAb"),
        UserEntity::new("bb"),
        UserEntity::new("b").with_names("A", "B").with_email("b@ab").with_active(false),
        UserEntity::new("aBa").with_display_name("a"),
        UserEntity::new("Éb").with_display_name("bÉa").with_names("É", "aé"),
    ];
    for user in users {
        upstream.put_user(user);
    }
    upstream.add_membership(MembershipEntity::user("ga", "ab"));
    upstream.add_membership(MembershipEntity::user("ga", "Ba"));
    upstream.add_membership(MembershipEntity::user("gb", "aab"));
    upstream.add_membership(MembershipEntity::user("gab", "b"));
    upstream.add_membership(MembershipEntity::user("gb", "ab"));
    upstream.add_membership(MembershipEntity::user("gÉa", "éb"));
    Arc::new(upstream)
}

async fn ids(backend: &CachedBackend, request: &SearchRequest) -> Vec<String> {
    let mut cursor = backend.search(request).await.expect("search failed");
    drain(cursor.as_mut())
        .await
        .expect("drain failed")
        .iter()
        .map(|entity| entity.id().to_string())
        .collect()
}

#[test]
fn prop_sql_translation_matches_in_memory_evaluation() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let db = TempDb {
        path: std::env::temp_dir().join(format!("directory-cache-prop-{}.db", uuid::Uuid::new_v4())),
    };
    let config = DirectoryCacheConfig {
        sql_url: format!("sqlite://{}?mode=rwc", db.path.display()),
        ..Default::default()
    };

    let (backend, users) = runtime.block_on(async {
        let upstream = seeded_upstream();
        let backend = CachedBackend::connect(&config, upstream.clone()).await.unwrap();
        resync(&backend, upstream.as_ref(), 4).await.unwrap();

        let all = SearchRequest::new(EntityType::User, Filter::match_all());
        let mut cursor = backend.search(&all).await.unwrap();
        let users: Vec<Entity> = drain(cursor.as_mut()).await.unwrap();
        (backend, users)
    });
    assert_eq!(users.len(), 7);

    let mut runner = TestRunner::new(Config::with_cases(128));
    runner
        .run(&filter_strategy(), |filter| {
            let request = SearchRequest::new(EntityType::User, filter.clone());
            let from_sql = runtime.block_on(ids(&backend, &request));
            let mut in_memory = Vec::new();
            for user in &users {
                if filter.matches(user).map_err(|err| TestCaseError::fail(err.to_string()))? {
                    in_memory.push(user.id().to_string());
                }
            }
            prop_assert_eq!(from_sql, in_memory, "filter {}", filter);
            Ok(())
        })
        .unwrap();

    runtime.block_on(backend.store().close());
}
