// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Entity value objects.
//!
//! Equality is identity: same concrete kind and ids equal ignoring case.
//! Attribute differences never make two entities unequal; a changed upstream
//! record is a new value that replaces the cached row.

use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use super::{fold, AttributeValue, Column, EntityType};

macro_rules! identity_eq {
    ($ty:ty) => {
        impl PartialEq for $ty {
            fn eq(&self, other: &Self) -> bool {
                self.entity_type() == other.entity_type() && fold(&self.id) == fold(&other.id)
            }
        }

        impl Eq for $ty {}

        impl Hash for $ty {
            fn hash<H: Hasher>(&self, state: &mut H) {
                self.entity_type().hash(state);
                fold(&self.id).hash(state);
            }
        }
    };
}

/// Root of the served namespace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainEntity {
    pub id: String,
    pub description: String,
}

impl DomainEntity {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
        }
    }

    #[must_use]
    pub fn entity_type(&self) -> EntityType {
        EntityType::Domain
    }
}

/// Fixed organizational container, one per subtype.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitEntity {
    unit_type: EntityType,
    pub id: String,
    pub description: String,
}

impl UnitEntity {
    /// Container of all groups.
    pub fn groups(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            unit_type: EntityType::GroupUnit,
            id: id.into(),
            description: description.into(),
        }
    }

    /// Container of all users.
    pub fn users(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            unit_type: EntityType::UserUnit,
            id: id.into(),
            description: description.into(),
        }
    }

    #[must_use]
    pub fn entity_type(&self) -> EntityType {
        self.unit_type
    }
}

/// Upstream group record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GroupEntity {
    pub id: String,
    pub description: Option<String>,
    /// Groups this group is a direct member of
    #[serde(default)]
    pub member_of: Vec<String>,
    /// Direct members (user and group ids)
    #[serde(default)]
    pub members: Vec<String>,
}

impl GroupEntity {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn entity_type(&self) -> EntityType {
        EntityType::Group
    }
}

/// Upstream user record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserEntity {
    pub id: String,
    pub display_name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub active: bool,
    /// Groups this user is a direct member of
    #[serde(default)]
    pub member_of: Vec<String>,
}

impl UserEntity {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: None,
            first_name: None,
            last_name: None,
            email: None,
            active: true,
            member_of: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    #[must_use]
    pub fn with_names(mut self, first: impl Into<String>, last: impl Into<String>) -> Self {
        self.first_name = Some(first.into());
        self.last_name = Some(last.into());
        self
    }

    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    #[must_use]
    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    #[must_use]
    pub fn entity_type(&self) -> EntityType {
        EntityType::User
    }
}

identity_eq!(DomainEntity);
identity_eq!(UnitEntity);
identity_eq!(GroupEntity);
identity_eq!(UserEntity);

/// Any entity the directory can return.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Entity {
    Domain(DomainEntity),
    Unit(UnitEntity),
    Group(GroupEntity),
    User(UserEntity),
}

impl Entity {
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Entity::Domain(domain) => &domain.id,
            Entity::Unit(unit) => &unit.id,
            Entity::Group(group) => &group.id,
            Entity::User(user) => &user.id,
        }
    }

    #[must_use]
    pub fn entity_type(&self) -> EntityType {
        match self {
            Entity::Domain(domain) => domain.entity_type(),
            Entity::Unit(unit) => unit.entity_type(),
            Entity::Group(group) => group.entity_type(),
            Entity::User(user) => user.entity_type(),
        }
    }

    /// Column projection. `None` means the attribute is absent (or not part
    /// of this type's column set).
    #[must_use]
    pub fn attribute(&self, column: Column) -> Option<AttributeValue> {
        if !self.entity_type().has_column(column) {
            return None;
        }
        let text = |value: &Option<String>| value.clone().map(AttributeValue::Text);
        match (column, self) {
            (Column::Type, _) => Some(AttributeValue::Text(self.entity_type().as_str().to_string())),
            (Column::Id, _) => Some(AttributeValue::Text(self.id().to_string())),
            (Column::Description, Entity::Domain(domain)) => {
                Some(AttributeValue::Text(domain.description.clone()))
            }
            (Column::Description, Entity::Unit(unit)) => {
                Some(AttributeValue::Text(unit.description.clone()))
            }
            (Column::Description, Entity::Group(group)) => text(&group.description),
            (Column::DisplayName, Entity::User(user)) => text(&user.display_name),
            (Column::FirstName, Entity::User(user)) => text(&user.first_name),
            (Column::LastName, Entity::User(user)) => text(&user.last_name),
            (Column::Email, Entity::User(user)) => text(&user.email),
            (Column::Active, Entity::User(user)) => Some(AttributeValue::Bool(user.active)),
            (Column::MemberOf, Entity::Group(group)) => multi(&group.member_of),
            (Column::MemberOf, Entity::User(user)) => multi(&user.member_of),
            (Column::Members, Entity::Group(group)) => multi(&group.members),
            _ => None,
        }
    }
}

fn multi(values: &[String]) -> Option<AttributeValue> {
    if values.is_empty() {
        None
    } else {
        Some(AttributeValue::Multi(values.to_vec()))
    }
}

impl From<GroupEntity> for Entity {
    fn from(group: GroupEntity) -> Self {
        Entity::Group(group)
    }
}

impl From<UserEntity> for Entity {
    fn from(user: UserEntity) -> Self {
        Entity::User(user)
    }
}

/// Kind of the member end of a membership edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MemberType {
    User,
    Group,
}

impl MemberType {
    #[must_use]
    pub fn entity_type(&self) -> EntityType {
        match self {
            MemberType::User => EntityType::User,
            MemberType::Group => EntityType::Group,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        self.entity_type().as_str()
    }

    pub fn parse(name: &str) -> Option<Self> {
        match EntityType::parse(name)? {
            EntityType::User => Some(MemberType::User),
            EntityType::Group => Some(MemberType::Group),
            _ => None,
        }
    }
}

/// Directed edge: `group_id` directly contains `member_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MembershipEntity {
    pub group_id: String,
    pub member_type: MemberType,
    pub member_id: String,
}

impl MembershipEntity {
    pub fn user(group_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            group_id: group_id.into(),
            member_type: MemberType::User,
            member_id: user_id.into(),
        }
    }

    pub fn nested_group(group_id: impl Into<String>, member_group_id: impl Into<String>) -> Self {
        Self {
            group_id: group_id.into(),
            member_type: MemberType::Group,
            member_id: member_group_id.into(),
        }
    }
}

impl PartialEq for MembershipEntity {
    fn eq(&self, other: &Self) -> bool {
        self.member_type == other.member_type
            && fold(&self.group_id) == fold(&other.group_id)
            && fold(&self.member_id) == fold(&other.member_id)
    }
}

impl Eq for MembershipEntity {}

impl Hash for MembershipEntity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        fold(&self.group_id).hash(state);
        self.member_type.hash(state);
        fold(&self.member_id).hash(state);
    }
}
