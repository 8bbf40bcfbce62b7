// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Filter Translator
//!
//! Translates a [`Filter`] into a parameterized WHERE fragment over
//! `cache_entities e`. Every fragment is a self-contained predicate, so
//! composites can join children without extra precedence handling.
//!
//! # SQL Generated
//!
//! ```sql
//! e.id_key = ?                                               -- (id=alice)
//! (e.email_key IS NOT NULL AND e.email_key LIKE ? ESCAPE '!') -- (email=*@example.com)
//! e.display_name_key IS NOT NULL                             -- (displayName=*)
//! EXISTS (SELECT 1 FROM cache_memberships m
//!         WHERE m.member_type = e.entity_type
//!           AND m.member_key = e.id_key AND m.group_key = ?) -- (memberOf=admins)
//! (a AND b)   (a OR b)   NOT (a)   1=1 (empty AND)   1=0 (empty OR)
//! ```
//!
//! Text attributes are compared against the `*_key` columns, which hold the
//! value folded by [`fold`](crate::entity::fold) at write time. Bound values
//! go through the same folding, so no engine-side `LOWER()` is involved.

use super::converter::Converter;
use super::expr::{
    resolve_column, store_text, store_value, substring_column, unsupported_construct, Filter,
};
use crate::entity::{Column, ColumnKind, EntityType};
use crate::error::DirectoryError;
use crate::query::SqlValue;

/// Parameterized WHERE fragment (without the `WHERE` keyword).
#[derive(Debug, Clone, PartialEq)]
pub struct SqlFragment {
    pub clause: String,
    pub params: Vec<SqlValue>,
}

const MEMBER_OF_EXISTS: &str = "EXISTS (SELECT 1 FROM cache_memberships m \
     WHERE m.member_type = e.entity_type AND m.member_key = e.id_key";
/// `(members=x)` matches on the member key alone: a user and a nested group
/// sharing the id `x` both satisfy it, as in-memory evaluation does.
const MEMBERS_EXISTS: &str = "EXISTS (SELECT 1 FROM cache_memberships m WHERE m.group_key = e.id_key";

pub struct FilterTranslator<'c> {
    converter: &'c dyn Converter,
}

impl<'c> FilterTranslator<'c> {
    pub fn new(converter: &'c dyn Converter) -> Self {
        Self { converter }
    }

    /// Translate for a search over `scope`. Only persisted types can be
    /// translated; the fragment assumes `e.entity_type` is already fixed.
    pub fn translate(&self, scope: EntityType, filter: &Filter) -> Result<SqlFragment, DirectoryError> {
        if !scope.is_persisted() {
            return Err(DirectoryError::unsupported(format!(
                "{scope} entries are not stored and cannot be searched with SQL"
            )));
        }
        let mut params = Vec::new();
        let clause = self.translate_node(scope, filter, &mut params)?;
        Ok(SqlFragment { clause, params })
    }

    /// Translate with inline values.
    ///
    /// Warning: Only use for debugging and logs, never execute the result.
    pub fn translate_inline(&self, scope: EntityType, filter: &Filter) -> Result<String, DirectoryError> {
        let fragment = self.translate(scope, filter)?;
        let mut result = fragment.clause;
        for param in fragment.params {
            let value = match param {
                SqlValue::Null => "NULL".to_string(),
                SqlValue::Integer(n) => n.to_string(),
                SqlValue::Text(s) => format!("'{}'", s.replace('\'', "''")),
                SqlValue::Blob(bytes) => format!("<{} bytes>", bytes.len()),
            };
            result = result.replacen('?', &value, 1);
        }
        Ok(result)
    }

    fn translate_node(
        &self,
        scope: EntityType,
        filter: &Filter,
        params: &mut Vec<SqlValue>,
    ) -> Result<String, DirectoryError> {
        match filter {
            Filter::And(children) => self.join(scope, children, " AND ", "1=1", params),
            Filter::Or(children) => self.join(scope, children, " OR ", "1=0", params),
            Filter::Not(inner) => Ok(format!("NOT ({})", self.translate_node(scope, inner, params)?)),
            Filter::Equals { attribute, value } => {
                let column = resolve_column(scope, attribute)?;
                params.push(store_value(self.converter, column, value)?);
                Ok(equals_clause(column))
            }
            Filter::Substring {
                attribute,
                initial,
                any,
                final_part,
            } => {
                let column = resolve_column(scope, attribute)?;
                substring_column(column)?;
                let mut pattern = String::new();
                if let Some(initial) = initial {
                    pattern.push_str(&escape_like(&store_text(self.converter, column, initial)?));
                }
                pattern.push('%');
                for fragment in any {
                    pattern.push_str(&escape_like(&store_text(self.converter, column, fragment)?));
                    pattern.push('%');
                }
                if let Some(final_part) = final_part {
                    pattern.push_str(&escape_like(&store_text(self.converter, column, final_part)?));
                }
                params.push(SqlValue::Text(pattern));
                Ok(like_clause(column))
            }
            Filter::Present { attribute } => {
                let column = resolve_column(scope, attribute)?;
                Ok(present_clause(column))
            }
            other => Err(unsupported_construct(other)),
        }
    }

    fn join(
        &self,
        scope: EntityType,
        children: &[Filter],
        operator: &str,
        empty: &str,
        params: &mut Vec<SqlValue>,
    ) -> Result<String, DirectoryError> {
        let parts = children
            .iter()
            .map(|child| self.translate_node(scope, child, params))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(match parts.len() {
            0 => empty.to_string(),
            1 => parts.into_iter().next().unwrap_or_default(),
            _ => format!("({})", parts.join(operator)),
        })
    }
}

fn column_sql(column: Column) -> &'static str {
    match column {
        Column::Type => "e.entity_type",
        Column::Id => "e.id_key",
        Column::Description => "e.description_key",
        Column::DisplayName => "e.display_name_key",
        Column::FirstName => "e.first_name_key",
        Column::LastName => "e.last_name_key",
        Column::Email => "e.email_key",
        Column::Active => "e.active",
        Column::MemberOf => "m.group_key",
        Column::Members => "m.member_key",
    }
}

fn exists_prefix(column: Column) -> &'static str {
    if column == Column::MemberOf {
        MEMBER_OF_EXISTS
    } else {
        MEMBERS_EXISTS
    }
}

fn equals_clause(column: Column) -> String {
    let sql = column_sql(column);
    match column.kind() {
        ColumnKind::Discriminator | ColumnKind::Identifier => format!("{sql} = ?"),
        ColumnKind::Text => format!("({sql} IS NOT NULL AND {sql} = ?)"),
        ColumnKind::Boolean => format!("({sql} IS NOT NULL AND {sql} = ?)"),
        ColumnKind::MultiValued => format!("{} AND {sql} = ?)", exists_prefix(column)),
    }
}

fn like_clause(column: Column) -> String {
    let sql = column_sql(column);
    match column.kind() {
        ColumnKind::Text => format!("({sql} IS NOT NULL AND {sql} LIKE ? ESCAPE '!')"),
        ColumnKind::MultiValued => {
            format!("{} AND {sql} LIKE ? ESCAPE '!')", exists_prefix(column))
        }
        _ => format!("{sql} LIKE ? ESCAPE '!'"),
    }
}

fn present_clause(column: Column) -> String {
    match column.kind() {
        ColumnKind::Discriminator | ColumnKind::Identifier => "1=1".to_string(),
        ColumnKind::Text | ColumnKind::Boolean => format!("{} IS NOT NULL", column_sql(column)),
        ColumnKind::MultiValued => format!("{})", exists_prefix(column)),
    }
}

fn escape_like(fragment: &str) -> String {
    let mut escaped = String::with_capacity(fragment.len());
    for c in fragment.chars() {
        if matches!(c, '!' | '%' | '_') {
            escaped.push('!');
        }
        escaped.push(c);
    }
    escaped
}
