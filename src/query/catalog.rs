// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Named SQL clauses used by the sync primitives and lookups.
//!
//! Statements use `:name` placeholders; [`QueryDef`](super::QueryDef) binds
//! them. Only the upsert forms differ between dialects.

use crate::storage::Dialect;

/// Clause ids understood by [`sql`].
pub mod clause {
    pub const ENTITY_UPSERT: &str = "entity.upsert";
    pub const ENTITY_SELECT: &str = "entity.select";
    pub const ENTITY_EXISTS: &str = "entity.exists";
    pub const ENTITY_COUNT: &str = "entity.count";
    pub const ENTITY_DELETE: &str = "entity.delete";
    pub const ENTITY_DELETE_TYPE: &str = "entity.delete_type";
    pub const ENTITY_DELETE_ALL: &str = "entity.delete_all";

    pub const MEMBERSHIP_UPSERT: &str = "membership.upsert";
    pub const MEMBERSHIP_DELETE: &str = "membership.delete";
    pub const MEMBERSHIP_DELETE_MEMBER: &str = "membership.delete_member";
    pub const MEMBERSHIP_DELETE_GROUP: &str = "membership.delete_group";
    pub const MEMBERSHIP_DELETE_MEMBER_TYPE: &str = "membership.delete_member_type";
    pub const MEMBERSHIP_DELETE_ALL: &str = "membership.delete_all";
    pub const MEMBERSHIP_COPY: &str = "membership.copy";
    pub const MEMBERSHIP_PAGE: &str = "membership.page";
    pub const MEMBERSHIP_PAGE_AFTER: &str = "membership.page_after";
    pub const MEMBERSHIP_EFFECTIVE_GROUPS: &str = "membership.effective_groups";

    pub const META_GET: &str = "meta.get";
    pub const META_PUT: &str = "meta.put";
}

// Group and member keys are selected for keyset paging.
const MEMBERSHIP_PROJECTION: &str = "SELECT g.id AS group_id, m.member_type, x.id AS member_id, \
     m.group_key, m.member_key FROM cache_memberships m \
     JOIN cache_entities g ON g.entity_type = 'GROUP' AND g.id_key = m.group_key \
     JOIN cache_entities x ON x.entity_type = m.member_type AND x.id_key = m.member_key";

const MEMBERSHIP_ORDER: &str = "ORDER BY m.group_key, m.member_type, m.member_key LIMIT :limit";

/// Projection shared by lookups and searches; `e` aliases `cache_entities`.
///
/// `member_of` and `members` carry display ids aggregated with
/// [`Dialect::group_concat`].
#[must_use]
pub fn entity_projection(dialect: Dialect) -> String {
    format!(
        "SELECT e.entity_type, e.id_key, e.id, e.description, e.display_name, e.first_name, \
         e.last_name, e.email, e.active, e.sync_version, \
         (SELECT {member_of} FROM cache_memberships m \
          JOIN cache_entities g ON g.entity_type = 'GROUP' AND g.id_key = m.group_key \
          WHERE m.member_type = e.entity_type AND m.member_key = e.id_key) AS member_of, \
         (SELECT {members} FROM cache_memberships m \
          JOIN cache_entities x ON x.entity_type = m.member_type AND x.id_key = m.member_key \
          WHERE e.entity_type = 'GROUP' AND m.group_key = e.id_key) AS members \
         FROM cache_entities e",
        member_of = dialect.group_concat("g.id"),
        members = dialect.group_concat("x.id"),
    )
}

/// Resolve a clause id, `None` for an unknown id.
#[must_use]
pub fn sql(dialect: Dialect, clause_id: &str) -> Option<String> {
    use clause::*;

    let statement = match clause_id {
        ENTITY_UPSERT => match dialect {
            Dialect::Sqlite => {
                "INSERT INTO cache_entities (entity_type, id_key, id, description, description_key, \
                 display_name, display_name_key, first_name, first_name_key, last_name, \
                 last_name_key, email, email_key, active, sync_version, synced_at) \
                 VALUES (:entity_type, :id_key, :id, :description, :description_key, \
                 :display_name, :display_name_key, :first_name, :first_name_key, :last_name, \
                 :last_name_key, :email, :email_key, :active, 1, :synced_at) \
                 ON CONFLICT(entity_type, id_key) DO UPDATE SET \
                 id = excluded.id, description = excluded.description, \
                 description_key = excluded.description_key, \
                 display_name = excluded.display_name, display_name_key = excluded.display_name_key, \
                 first_name = excluded.first_name, first_name_key = excluded.first_name_key, \
                 last_name = excluded.last_name, last_name_key = excluded.last_name_key, \
                 email = excluded.email, email_key = excluded.email_key, \
                 active = excluded.active, sync_version = cache_entities.sync_version + 1, \
                 synced_at = excluded.synced_at"
            }
            Dialect::MySql => {
                "INSERT INTO cache_entities (entity_type, id_key, id, description, description_key, \
                 display_name, display_name_key, first_name, first_name_key, last_name, \
                 last_name_key, email, email_key, active, sync_version, synced_at) \
                 VALUES (:entity_type, :id_key, :id, :description, :description_key, \
                 :display_name, :display_name_key, :first_name, :first_name_key, :last_name, \
                 :last_name_key, :email, :email_key, :active, 1, :synced_at) \
                 ON DUPLICATE KEY UPDATE \
                 id = VALUES(id), description = VALUES(description), \
                 description_key = VALUES(description_key), \
                 display_name = VALUES(display_name), display_name_key = VALUES(display_name_key), \
                 first_name = VALUES(first_name), first_name_key = VALUES(first_name_key), \
                 last_name = VALUES(last_name), last_name_key = VALUES(last_name_key), \
                 email = VALUES(email), email_key = VALUES(email_key), \
                 active = VALUES(active), sync_version = sync_version + 1, \
                 synced_at = VALUES(synced_at)"
            }
        },
        ENTITY_SELECT => {
            return Some(format!(
                "{} WHERE e.entity_type = :entity_type AND e.id_key = :id_key",
                entity_projection(dialect)
            ))
        }
        ENTITY_EXISTS => {
            "SELECT COUNT(*) AS n FROM cache_entities \
             WHERE entity_type = :entity_type AND id_key = :id_key"
        }
        ENTITY_COUNT => "SELECT COUNT(*) AS n FROM cache_entities WHERE entity_type = :entity_type",
        ENTITY_DELETE => {
            "DELETE FROM cache_entities WHERE entity_type = :entity_type AND id_key = :id_key"
        }
        ENTITY_DELETE_TYPE => "DELETE FROM cache_entities WHERE entity_type = :entity_type",
        ENTITY_DELETE_ALL => "DELETE FROM cache_entities",

        MEMBERSHIP_UPSERT => match dialect {
            Dialect::Sqlite => {
                "INSERT INTO cache_memberships (group_key, member_type, member_key, synced_at) \
                 VALUES (:group_key, :member_type, :member_key, :synced_at) \
                 ON CONFLICT(group_key, member_type, member_key) DO UPDATE SET \
                 synced_at = excluded.synced_at"
            }
            Dialect::MySql => {
                "INSERT INTO cache_memberships (group_key, member_type, member_key, synced_at) \
                 VALUES (:group_key, :member_type, :member_key, :synced_at) \
                 ON DUPLICATE KEY UPDATE synced_at = VALUES(synced_at)"
            }
        },
        MEMBERSHIP_DELETE => {
            "DELETE FROM cache_memberships \
             WHERE group_key = :group_key AND member_type = :member_type AND member_key = :member_key"
        }
        MEMBERSHIP_DELETE_MEMBER => {
            "DELETE FROM cache_memberships WHERE member_type = :member_type AND member_key = :member_key"
        }
        MEMBERSHIP_DELETE_GROUP => "DELETE FROM cache_memberships WHERE group_key = :group_key",
        MEMBERSHIP_DELETE_MEMBER_TYPE => {
            "DELETE FROM cache_memberships WHERE member_type = :member_type"
        }
        MEMBERSHIP_DELETE_ALL => "DELETE FROM cache_memberships",
        MEMBERSHIP_COPY => match dialect {
            Dialect::Sqlite => {
                "INSERT INTO cache_memberships (group_key, member_type, member_key, synced_at) \
                 SELECT group_key, member_type, :target_key, :synced_at FROM cache_memberships \
                 WHERE member_type = :member_type AND member_key = :source_key \
                 ON CONFLICT DO NOTHING"
            }
            Dialect::MySql => {
                "INSERT IGNORE INTO cache_memberships (group_key, member_type, member_key, synced_at) \
                 SELECT group_key, member_type, :target_key, :synced_at FROM cache_memberships \
                 WHERE member_type = :member_type AND member_key = :source_key"
            }
        },
        MEMBERSHIP_PAGE => {
            return Some(format!("{MEMBERSHIP_PROJECTION} {MEMBERSHIP_ORDER}"));
        }
        // Row-value comparison spelled out; (a, b, c) > (?, ?, ?) is not
        // available on every supported engine version.
        MEMBERSHIP_PAGE_AFTER => {
            return Some(format!(
                "{MEMBERSHIP_PROJECTION} WHERE m.group_key > :group_key \
                 OR (m.group_key = :group_key AND (m.member_type > :member_type \
                 OR (m.member_type = :member_type AND m.member_key > :member_key))) \
                 {MEMBERSHIP_ORDER}"
            ));
        }
        // UNION (not UNION ALL) terminates on membership cycles.
        MEMBERSHIP_EFFECTIVE_GROUPS => {
            "WITH RECURSIVE ancestry (group_key) AS ( \
               SELECT m.group_key FROM cache_memberships m \
               WHERE m.member_type = :member_type AND m.member_key = :member_key \
               UNION \
               SELECT m.group_key FROM cache_memberships m \
               JOIN ancestry a ON m.member_type = 'GROUP' AND m.member_key = a.group_key \
             ) \
             SELECT g.id FROM ancestry a \
             JOIN cache_entities g ON g.entity_type = 'GROUP' AND g.id_key = a.group_key \
             ORDER BY g.id_key"
        }

        META_GET => "SELECT value FROM cache_meta WHERE name = :name",
        META_PUT => match dialect {
            Dialect::Sqlite => {
                "INSERT INTO cache_meta (name, value) VALUES (:name, :value) \
                 ON CONFLICT(name) DO UPDATE SET value = excluded.value"
            }
            Dialect::MySql => {
                "INSERT INTO cache_meta (name, value) VALUES (:name, :value) \
                 ON DUPLICATE KEY UPDATE value = VALUES(value)"
            }
        },
        _ => return None,
    };
    Some(statement.to_string())
}

#[cfg(test)]
mod tests {
    use super::clause::*;
    use super::*;

    const ALL_IDS: &[&str] = &[
        ENTITY_UPSERT,
        ENTITY_SELECT,
        ENTITY_EXISTS,
        ENTITY_COUNT,
        ENTITY_DELETE,
        ENTITY_DELETE_TYPE,
        ENTITY_DELETE_ALL,
        MEMBERSHIP_UPSERT,
        MEMBERSHIP_DELETE,
        MEMBERSHIP_DELETE_MEMBER,
        MEMBERSHIP_DELETE_GROUP,
        MEMBERSHIP_DELETE_MEMBER_TYPE,
        MEMBERSHIP_DELETE_ALL,
        MEMBERSHIP_COPY,
        MEMBERSHIP_PAGE,
        MEMBERSHIP_PAGE_AFTER,
        MEMBERSHIP_EFFECTIVE_GROUPS,
        META_GET,
        META_PUT,
    ];

    #[test]
    fn test_every_clause_resolves_in_both_dialects() {
        for dialect in [Dialect::Sqlite, Dialect::MySql] {
            for id in ALL_IDS {
                assert!(sql(dialect, id).is_some(), "{id} missing for {dialect:?}");
            }
        }
    }

    #[test]
    fn test_unknown_clause() {
        assert!(sql(Dialect::Sqlite, "entity.explode").is_none());
    }

    #[test]
    fn test_upserts_differ_by_dialect() {
        let sqlite = sql(Dialect::Sqlite, ENTITY_UPSERT).unwrap();
        let mysql = sql(Dialect::MySql, ENTITY_UPSERT).unwrap();
        assert!(sqlite.contains("ON CONFLICT"));
        assert!(mysql.contains("ON DUPLICATE KEY UPDATE"));
        assert!(sqlite.contains("sync_version = cache_entities.sync_version + 1"));
    }

    #[test]
    fn test_upsert_writes_folded_text_keys() {
        for dialect in [Dialect::Sqlite, Dialect::MySql] {
            let upsert = sql(dialect, ENTITY_UPSERT).unwrap();
            for key in ["description_key", "display_name_key", "first_name_key", "last_name_key", "email_key"] {
                assert!(upsert.contains(&format!(":{key}")), "{key} missing for {dialect:?}");
            }
        }
    }

    #[test]
    fn test_membership_pages_continue_after_last_key() {
        let first = sql(Dialect::Sqlite, MEMBERSHIP_PAGE).unwrap();
        let after = sql(Dialect::Sqlite, MEMBERSHIP_PAGE_AFTER).unwrap();
        assert!(!first.contains("WHERE"));
        assert!(after.contains("m.group_key > :group_key"));
        assert!(first.ends_with("LIMIT :limit"));
        assert!(after.ends_with("LIMIT :limit"));
    }

    #[test]
    fn test_projection_aggregates_memberships() {
        let projection = entity_projection(Dialect::Sqlite);
        assert!(projection.contains("AS member_of"));
        assert!(projection.contains("AS members"));
        assert!(projection.ends_with("FROM cache_entities e"));
    }
}
