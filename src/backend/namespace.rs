// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Fixed singleton entries: the domain root and the two unit containers.

use crate::config::NamespaceConfig;
use crate::entity::{fold, DomainEntity, Entity, EntityType, UnitEntity};
use crate::error::DirectoryError;
use crate::filter::Converter;

use super::{apply_page, SearchRequest};

#[derive(Debug, Clone)]
pub struct Namespace {
    domain: DomainEntity,
    group_unit: UnitEntity,
    user_unit: UnitEntity,
}

impl Namespace {
    pub fn new(domain: DomainEntity, group_unit: UnitEntity, user_unit: UnitEntity) -> Self {
        Self {
            domain,
            group_unit,
            user_unit,
        }
    }

    pub fn from_config(config: &NamespaceConfig) -> Self {
        Self::new(
            DomainEntity::new(&config.domain_id, &config.domain_description),
            UnitEntity::groups(&config.group_unit_id, &config.group_unit_description),
            UnitEntity::users(&config.user_unit_id, &config.user_unit_description),
        )
    }

    #[must_use]
    pub fn domain(&self) -> &DomainEntity {
        &self.domain
    }

    #[must_use]
    pub fn group_unit(&self) -> &UnitEntity {
        &self.group_unit
    }

    #[must_use]
    pub fn user_unit(&self) -> &UnitEntity {
        &self.user_unit
    }

    /// The singleton of `entity_type`, `None` for persisted types.
    #[must_use]
    pub fn singleton(&self, entity_type: EntityType) -> Option<Entity> {
        match entity_type {
            EntityType::Domain => Some(Entity::Domain(self.domain.clone())),
            EntityType::GroupUnit => Some(Entity::Unit(self.group_unit.clone())),
            EntityType::UserUnit => Some(Entity::Unit(self.user_unit.clone())),
            EntityType::Group | EntityType::User => None,
        }
    }

    /// Parent container of every entry of `entity_type`; the domain has none.
    #[must_use]
    pub fn container_of(&self, entity_type: EntityType) -> Option<Entity> {
        match entity_type {
            EntityType::Domain => None,
            EntityType::GroupUnit | EntityType::UserUnit => self.singleton(EntityType::Domain),
            EntityType::Group => self.singleton(EntityType::GroupUnit),
            EntityType::User => self.singleton(EntityType::UserUnit),
        }
    }

    /// Singleton lookup; the id must match case-insensitively.
    pub fn lookup(&self, entity_type: EntityType, id: &str) -> Result<Entity, DirectoryError> {
        self.singleton(entity_type)
            .filter(|entity| fold(entity.id()) == fold(id))
            .ok_or_else(|| DirectoryError::not_found(entity_type, id))
    }

    /// Filter the singleton of the requested type in memory.
    pub fn search(
        &self,
        request: &SearchRequest,
        converter: &dyn Converter,
    ) -> Result<Vec<Entity>, DirectoryError> {
        request.filter.check(request.scope, converter)?;
        let matching = self
            .singleton(request.scope)
            .into_iter()
            .filter(|entity| request.filter.evaluate(entity, converter));
        Ok(apply_page(matching, request.page).collect())
    }
}

impl Default for Namespace {
    fn default() -> Self {
        Self::from_config(&NamespaceConfig::default())
    }
}
