// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Entity model served by the directory.
//!
//! Entities are immutable values identified by `(EntityType, id)` where the id
//! compares case-insensitively. Each type exposes a closed set of
//! [`Column`]s; filters and query results are expressed against those columns.
//!
//! ```text
//! DOMAIN ─┬─ GROUP_UNIT ── GROUP*   (persisted in cache_entities)
//!         └─ USER_UNIT  ── USER*    (persisted in cache_entities)
//!                 GROUP ──member──▶ USER | GROUP   (cache_memberships)
//! ```

mod model;
pub(crate) mod row;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use model::{
    DomainEntity, Entity, GroupEntity, MemberType, MembershipEntity, UnitEntity, UserEntity,
};

/// Discriminator for every kind of entity the directory serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityType {
    Domain,
    GroupUnit,
    UserUnit,
    Group,
    User,
}

const SINGLETON_COLUMNS: &[Column] = &[Column::Type, Column::Id, Column::Description];

const GROUP_COLUMNS: &[Column] = &[
    Column::Type,
    Column::Id,
    Column::Description,
    Column::MemberOf,
    Column::Members,
];

const USER_COLUMNS: &[Column] = &[
    Column::Type,
    Column::Id,
    Column::DisplayName,
    Column::FirstName,
    Column::LastName,
    Column::Email,
    Column::Active,
    Column::MemberOf,
];

impl EntityType {
    pub const ALL: [EntityType; 5] = [
        EntityType::Domain,
        EntityType::GroupUnit,
        EntityType::UserUnit,
        EntityType::Group,
        EntityType::User,
    ];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Domain => "DOMAIN",
            EntityType::GroupUnit => "GROUP_UNIT",
            EntityType::UserUnit => "USER_UNIT",
            EntityType::Group => "GROUP",
            EntityType::User => "USER",
        }
    }

    /// Case-insensitive parse of the stored discriminator.
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|candidate| candidate.as_str().eq_ignore_ascii_case(name.trim()))
    }

    /// Group and user rows live in the cache store; the rest are singletons.
    #[must_use]
    pub fn is_persisted(&self) -> bool {
        matches!(self, EntityType::Group | EntityType::User)
    }

    /// The closed column set for this type.
    #[must_use]
    pub fn columns(&self) -> &'static [Column] {
        match self {
            EntityType::Domain | EntityType::GroupUnit | EntityType::UserUnit => SINGLETON_COLUMNS,
            EntityType::Group => GROUP_COLUMNS,
            EntityType::User => USER_COLUMNS,
        }
    }

    #[must_use]
    pub fn has_column(&self, column: Column) -> bool {
        self.columns().contains(&column)
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Every column any entity type can expose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Column {
    Type,
    Id,
    Description,
    DisplayName,
    FirstName,
    LastName,
    Email,
    Active,
    /// Groups the entity is a direct member of
    MemberOf,
    /// Direct members of a group (users and groups)
    Members,
}

/// How values of a column are compared and converted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Discriminator,
    /// Case-insensitive identity, stored folded
    Identifier,
    /// Free text, compared case-insensitively
    Text,
    Boolean,
    /// Derived from membership edges, holds identifiers
    MultiValued,
}

impl Column {
    pub const ALL: [Column; 10] = [
        Column::Type,
        Column::Id,
        Column::Description,
        Column::DisplayName,
        Column::FirstName,
        Column::LastName,
        Column::Email,
        Column::Active,
        Column::MemberOf,
        Column::Members,
    ];

    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Column::Type => "TYPE",
            Column::Id => "ID",
            Column::Description => "DESCRIPTION",
            Column::DisplayName => "DISPLAY_NAME",
            Column::FirstName => "FIRST_NAME",
            Column::LastName => "LAST_NAME",
            Column::Email => "EMAIL",
            Column::Active => "ACTIVE",
            Column::MemberOf => "MEMBER_OF",
            Column::Members => "MEMBERS",
        }
    }

    /// Resolve an attribute name: case-insensitive, `_` and `-` ignored,
    /// so `displayName`, `display_name` and `DISPLAY-NAME` are the same column.
    pub fn from_attribute(attribute: &str) -> Option<Self> {
        let wanted = normalize_attribute(attribute);
        Self::ALL
            .into_iter()
            .find(|column| normalize_attribute(column.name()) == wanted)
    }

    #[must_use]
    pub fn kind(&self) -> ColumnKind {
        match self {
            Column::Type => ColumnKind::Discriminator,
            Column::Id => ColumnKind::Identifier,
            Column::Description
            | Column::DisplayName
            | Column::FirstName
            | Column::LastName
            | Column::Email => ColumnKind::Text,
            Column::Active => ColumnKind::Boolean,
            Column::MemberOf | Column::Members => ColumnKind::MultiValued,
        }
    }

    /// Result-set column name this column is read back from.
    #[must_use]
    pub fn result_name(&self) -> &'static str {
        match self {
            Column::Type => "entity_type",
            Column::Id => "id",
            Column::Description => "description",
            Column::DisplayName => "display_name",
            Column::FirstName => "first_name",
            Column::LastName => "last_name",
            Column::Email => "email",
            Column::Active => "active",
            Column::MemberOf => "member_of",
            Column::Members => "members",
        }
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn normalize_attribute(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '_' && *c != '-')
        .flat_map(char::to_lowercase)
        .collect()
}

/// Case folding used for identifiers and case-insensitive comparison.
#[must_use]
pub fn fold(value: &str) -> String {
    value.to_lowercase()
}

/// A projected column value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeValue {
    Text(String),
    Bool(bool),
    Multi(Vec<String>),
}

impl AttributeValue {
    /// Individual textual values, for comparison.
    #[must_use]
    pub fn values(&self) -> Vec<String> {
        match self {
            AttributeValue::Text(text) => vec![text.clone()],
            AttributeValue::Bool(flag) => vec![flag.to_string()],
            AttributeValue::Multi(values) => values.clone(),
        }
    }
}
