// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Row mapping between entities and `cache_entities` / `cache_memberships`.

use std::time::{SystemTime, UNIX_EPOCH};

use super::{
    fold, AttributeValue, Column, Entity, EntityType, GroupEntity, MemberType, MembershipEntity,
    UserEntity,
};
use crate::error::DirectoryError;
use crate::filter::Converter;
use crate::query::{QueryDef, ResultRow};

/// Column values of one `cache_entities` row.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct EntityRow {
    pub entity_type: EntityType,
    pub id_key: String,
    pub id: String,
    pub description: Option<String>,
    pub display_name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub active: Option<bool>,
}

impl EntityRow {
    pub fn group(group: &GroupEntity) -> Result<Self, DirectoryError> {
        Ok(Self {
            entity_type: EntityType::Group,
            id_key: storable_key(EntityType::Group, &group.id)?,
            id: group.id.clone(),
            description: group.description.clone(),
            display_name: None,
            first_name: None,
            last_name: None,
            email: None,
            active: None,
        })
    }

    pub fn user(user: &UserEntity) -> Result<Self, DirectoryError> {
        Ok(Self {
            entity_type: EntityType::User,
            id_key: storable_key(EntityType::User, &user.id)?,
            id: user.id.clone(),
            description: None,
            display_name: user.display_name.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            email: user.email.clone(),
            active: Some(user.active),
        })
    }

    /// Bind every column onto an `entity.upsert` definition.
    pub fn bind(&self, def: &QueryDef) -> QueryDef {
        def.on("entity_type", self.entity_type.as_str())
            .on("id_key", self.id_key.as_str())
            .on("id", self.id.as_str())
            .on("description", self.description.clone())
            .on("description_key", folded(self.description.as_deref()))
            .on("display_name", self.display_name.clone())
            .on("display_name_key", folded(self.display_name.as_deref()))
            .on("first_name", self.first_name.clone())
            .on("first_name_key", folded(self.first_name.as_deref()))
            .on("last_name", self.last_name.clone())
            .on("last_name_key", folded(self.last_name.as_deref()))
            .on("email", self.email.clone())
            .on("email_key", folded(self.email.as_deref()))
            .on("active", self.active)
            .on("synced_at", now_millis())
    }
}

fn folded(value: Option<&str>) -> Option<String> {
    value.map(fold)
}

/// Folded key; an empty id can never be stored.
pub(crate) fn storable_key(entity_type: EntityType, id: &str) -> Result<String, DirectoryError> {
    if id.trim().is_empty() {
        return Err(DirectoryError::DirectoryAccessFailure(format!(
            "refusing to store {entity_type} with an empty id"
        )));
    }
    Ok(fold(id))
}

pub(crate) fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or_default()
}

/// Decode a row produced by the entity projection.
pub(crate) fn entity_from_row(
    row: &ResultRow,
    converter: &dyn Converter,
) -> Result<Entity, DirectoryError> {
    let read = |column: Column| {
        row.get(column.result_name())
            .and_then(|value| converter.from_store(column, value))
    };
    let text = |column: Column| match read(column) {
        Some(AttributeValue::Text(text)) => Some(text),
        _ => None,
    };
    let multi = |column: Column| match read(column) {
        Some(AttributeValue::Multi(values)) => values,
        _ => Vec::new(),
    };

    let entity_type = text(Column::Type)
        .and_then(|name| EntityType::parse(&name))
        .ok_or_else(|| DirectoryError::internal("entity row without a valid entity_type"))?;
    let id = text(Column::Id)
        .ok_or_else(|| DirectoryError::internal(format!("{entity_type} row without an id")))?;

    match entity_type {
        EntityType::Group => Ok(Entity::Group(GroupEntity {
            id,
            description: text(Column::Description),
            member_of: multi(Column::MemberOf),
            members: multi(Column::Members),
        })),
        EntityType::User => Ok(Entity::User(UserEntity {
            id,
            display_name: text(Column::DisplayName),
            first_name: text(Column::FirstName),
            last_name: text(Column::LastName),
            email: text(Column::Email),
            active: !matches!(read(Column::Active), Some(AttributeValue::Bool(false))),
            member_of: multi(Column::MemberOf),
        })),
        other => Err(DirectoryError::internal(format!(
            "{other} entries are never stored"
        ))),
    }
}

/// Decode a `membership.page` row.
pub(crate) fn membership_from_row(row: &ResultRow) -> Result<MembershipEntity, DirectoryError> {
    let field = |name: &str| {
        row.text(name)
            .map(str::to_string)
            .ok_or_else(|| DirectoryError::internal(format!("membership row without {name}")))
    };
    let member_type = row
        .text("member_type")
        .and_then(MemberType::parse)
        .ok_or_else(|| DirectoryError::internal("membership row without a valid member_type"))?;

    Ok(MembershipEntity {
        group_id: field("group_id")?,
        member_type,
        member_id: field("member_id")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::DefaultConverter;
    use crate::query::SqlValue;
    use crate::storage::MULTI_VALUE_SEPARATOR;

    fn text(value: &str) -> SqlValue {
        SqlValue::Text(value.to_string())
    }

    #[test]
    fn test_user_row_decodes() {
        let row = ResultRow::new(vec![
            ("entity_type".into(), text("USER")),
            ("id".into(), text("Alice")),
            ("description".into(), SqlValue::Null),
            ("display_name".into(), text("Alice Liddell")),
            ("first_name".into(), SqlValue::Null),
            ("last_name".into(), SqlValue::Null),
            ("email".into(), text("alice@example.com")),
            ("active".into(), SqlValue::Integer(0)),
            ("sync_version".into(), SqlValue::Integer(2)),
            ("member_of".into(), text(&format!("staff{MULTI_VALUE_SEPARATOR}admins"))),
            ("members".into(), SqlValue::Null),
        ]);

        let Entity::User(user) = entity_from_row(&row, &DefaultConverter).unwrap() else {
            panic!("expected a user");
        };
        assert_eq!(user.id, "Alice");
        assert_eq!(user.display_name.as_deref(), Some("Alice Liddell"));
        assert!(!user.active);
        assert_eq!(user.member_of, vec!["admins".to_string(), "staff".to_string()]);
    }

    #[test]
    fn test_group_row_without_memberships() {
        let row = ResultRow::new(vec![
            ("entity_type".into(), text("GROUP")),
            ("id".into(), text("Admins")),
            ("description".into(), text("Administrators")),
            ("member_of".into(), SqlValue::Null),
            ("members".into(), SqlValue::Null),
        ]);
        let entity = entity_from_row(&row, &DefaultConverter).unwrap();
        assert_eq!(entity, Entity::Group(GroupEntity::new("admins")));
        let Entity::Group(group) = entity else { unreachable!() };
        assert!(group.members.is_empty());
        assert_eq!(group.description.as_deref(), Some("Administrators"));
    }

    #[test]
    fn test_bad_rows_are_internal_errors() {
        let row = ResultRow::new(vec![("entity_type".into(), text("DOMAIN")), ("id".into(), text("x"))]);
        assert!(matches!(
            entity_from_row(&row, &DefaultConverter),
            Err(DirectoryError::InternalServerError(_))
        ));
        assert!(membership_from_row(&ResultRow::default()).is_err());
    }

    #[test]
    fn test_empty_ids_are_refused() {
        assert!(matches!(
            EntityRow::group(&GroupEntity::new("  ")),
            Err(DirectoryError::DirectoryAccessFailure(_))
        ));
        assert_eq!(EntityRow::user(&UserEntity::new("Bob")).unwrap().id_key, "bob");
    }

    #[test]
    fn test_bind_writes_folded_text_keys() {
        let user = UserEntity::new("emile")
            .with_display_name("Émile Zola")
            .with_email("EMILE@Example.org");
        let compiled = EntityRow::user(&user)
            .unwrap()
            .bind(&QueryDef::new("SELECT :display_name, :display_name_key, :email_key, :last_name_key"))
            .compile()
            .unwrap();
        assert_eq!(
            compiled.params,
            vec![
                text("Émile Zola"),
                text("émile zola"),
                text("emile@example.org"),
                SqlValue::Null,
            ]
        );
    }
}
