// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Value conversion between attribute values and stored column values.

use crate::entity::{fold, AttributeValue, Column, ColumnKind, EntityType};
use crate::query::SqlValue;
use crate::storage::MULTI_VALUE_SEPARATOR;

/// Converts attribute values to their stored form and back.
///
/// Returning `None` from [`Converter::to_store`] declines the value; filter
/// translation then fails with `UnsupportedQueryExpression`.
pub trait Converter: Send + Sync {
    fn to_store(&self, column: Column, value: &str) -> Option<SqlValue>;

    fn from_store(&self, column: Column, value: &SqlValue) -> Option<AttributeValue>;
}

/// Stock conversions: identifiers and text fold case, booleans are 0/1,
/// multi-valued cells split on [`MULTI_VALUE_SEPARATOR`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultConverter;

impl Converter for DefaultConverter {
    fn to_store(&self, column: Column, value: &str) -> Option<SqlValue> {
        match column.kind() {
            ColumnKind::Discriminator => {
                EntityType::parse(value).map(|entity_type| SqlValue::from(entity_type.as_str()))
            }
            ColumnKind::Identifier | ColumnKind::Text | ColumnKind::MultiValued => {
                Some(SqlValue::Text(fold(value)))
            }
            ColumnKind::Boolean => parse_bool(value).map(SqlValue::from),
        }
    }

    fn from_store(&self, column: Column, value: &SqlValue) -> Option<AttributeValue> {
        match (column.kind(), value) {
            (_, SqlValue::Null) => None,
            (ColumnKind::Discriminator, SqlValue::Text(text)) => EntityType::parse(text)
                .map(|entity_type| AttributeValue::Text(entity_type.as_str().to_string())),
            (ColumnKind::Boolean, SqlValue::Integer(flag)) => Some(AttributeValue::Bool(*flag != 0)),
            (ColumnKind::Boolean, SqlValue::Text(text)) => parse_bool(text).map(AttributeValue::Bool),
            (ColumnKind::MultiValued, SqlValue::Text(text)) => {
                let values = split_multi(text);
                (!values.is_empty()).then_some(AttributeValue::Multi(values))
            }
            (ColumnKind::Identifier | ColumnKind::Text, SqlValue::Text(text)) => {
                Some(AttributeValue::Text(text.clone()))
            }
            (ColumnKind::Identifier | ColumnKind::Text, SqlValue::Integer(number)) => {
                Some(AttributeValue::Text(number.to_string()))
            }
            _ => None,
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Split an aggregated cell, sorted case-insensitively for stable output.
fn split_multi(cell: &str) -> Vec<String> {
    let mut values: Vec<String> = cell
        .split(MULTI_VALUE_SEPARATOR)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .collect();
    values.sort_by_key(|value| fold(value));
    values
}
