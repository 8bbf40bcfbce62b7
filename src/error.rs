// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Error taxonomy shared by every layer of the directory cache.
//!
//! Translation-time errors ([`DirectoryError::UnknownColumn`],
//! [`DirectoryError::UnsupportedQueryExpression`]) point at a caller bug or an
//! unrepresentable filter and are never retried. Only store and upstream I/O
//! failures ([`DirectoryError::DirectoryAccessFailure`]) are retryable.

use thiserror::Error;

use crate::entity::EntityType;

#[derive(Error, Debug)]
pub enum DirectoryError {
    #[error("Unknown column '{column}' for entity type {entity_type}")]
    UnknownColumn {
        entity_type: EntityType,
        column: String,
    },
    #[error("Unsupported query expression: {0}")]
    UnsupportedQueryExpression(String),
    #[error("Directory access failure: {0}")]
    DirectoryAccessFailure(String),
    #[error("{entity_type} '{id}' not found")]
    EntityNotFound { entity_type: EntityType, id: String },
    #[error("Internal server error: {0}")]
    InternalServerError(String),
    #[error("Security problem: {0}")]
    SecurityProblem(String),
    #[error("Directory cache must be reset and resynchronized before it can be read")]
    ResetRequired,
}

impl DirectoryError {
    /// Whether repeating the same call may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::DirectoryAccessFailure(_))
    }

    pub(crate) fn not_found(entity_type: EntityType, id: impl Into<String>) -> Self {
        Self::EntityNotFound {
            entity_type,
            id: id.into(),
        }
    }

    pub(crate) fn internal(message: impl Into<String>) -> Self {
        Self::InternalServerError(message.into())
    }

    pub(crate) fn unsupported(message: impl Into<String>) -> Self {
        Self::UnsupportedQueryExpression(message.into())
    }
}

impl From<sqlx::Error> for DirectoryError {
    fn from(err: sqlx::Error) -> Self {
        Self::DirectoryAccessFailure(err.to_string())
    }
}
