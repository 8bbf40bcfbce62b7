// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Filter expression tree.
//!
//! Mirrors the protocol's search filter: leaf predicates on one attribute,
//! combined with n-ary AND/OR and unary NOT. Equality is structural and
//! order-sensitive, so `a AND b` differs from `b AND a`.
//!
//! # Example
//!
//! ```rust
//! use directory_cache::filter::Filter;
//!
//! // (&(memberOf=admins)(|(email=*)(displayName=*ops*)))
//! let filter = Filter::eq("memberOf", "admins")
//!     .and(Filter::present("email").or(Filter::contains("displayName", "ops")));
//! assert_eq!(filter.to_string(), "(&(memberOf=admins)(|(email=*)(displayName=*ops*)))");
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use super::converter::{Converter, DefaultConverter};
use crate::entity::{Column, ColumnKind, Entity, EntityType};
use crate::error::DirectoryError;
use crate::query::SqlValue;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Filter {
    Equals {
        attribute: String,
        value: String,
    },
    /// `initial*any*...*final`; every part optional
    Substring {
        attribute: String,
        initial: Option<String>,
        #[serde(default)]
        any: Vec<String>,
        #[serde(rename = "final")]
        final_part: Option<String>,
    },
    Present {
        attribute: String,
    },
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    GreaterOrEqual {
        attribute: String,
        value: String,
    },
    LessOrEqual {
        attribute: String,
        value: String,
    },
    Approximate {
        attribute: String,
        value: String,
    },
    Extensible {
        rule: Option<String>,
        attribute: Option<String>,
        value: String,
    },
}

impl Filter {
    pub fn eq(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Filter::Equals {
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    pub fn present(attribute: impl Into<String>) -> Self {
        Filter::Present {
            attribute: attribute.into(),
        }
    }

    pub fn contains(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Filter::substring(attribute, None, vec![value.into()], None)
    }

    pub fn starts_with(attribute: impl Into<String>, prefix: impl Into<String>) -> Self {
        Filter::substring(attribute, Some(prefix.into()), Vec::new(), None)
    }

    pub fn ends_with(attribute: impl Into<String>, suffix: impl Into<String>) -> Self {
        Filter::substring(attribute, None, Vec::new(), Some(suffix.into()))
    }

    pub fn substring(
        attribute: impl Into<String>,
        initial: Option<String>,
        any: Vec<String>,
        final_part: Option<String>,
    ) -> Self {
        Filter::Substring {
            attribute: attribute.into(),
            initial,
            any,
            final_part,
        }
    }

    /// Matches every entry of the searched type.
    #[must_use]
    pub fn match_all() -> Self {
        Filter::And(Vec::new())
    }

    pub fn all(filters: Vec<Filter>) -> Self {
        Filter::And(filters)
    }

    pub fn any_of(filters: Vec<Filter>) -> Self {
        Filter::Or(filters)
    }

    #[must_use]
    pub fn and(self, other: Filter) -> Self {
        Filter::And(vec![self, other])
    }

    #[must_use]
    pub fn or(self, other: Filter) -> Self {
        Filter::Or(vec![self, other])
    }

    #[must_use]
    pub fn negate(self) -> Self {
        Filter::Not(Box::new(self))
    }

    /// Validate every leaf against `scope`'s columns and `converter`,
    /// failing the way SQL translation would.
    pub fn check(&self, scope: EntityType, converter: &dyn Converter) -> Result<(), DirectoryError> {
        match self {
            Filter::And(children) | Filter::Or(children) => children
                .iter()
                .try_for_each(|child| child.check(scope, converter)),
            Filter::Not(inner) => inner.check(scope, converter),
            Filter::Equals { attribute, value } => {
                let column = resolve_column(scope, attribute)?;
                store_value(converter, column, value).map(drop)
            }
            Filter::Substring {
                attribute,
                initial,
                any,
                final_part,
            } => {
                let column = resolve_column(scope, attribute)?;
                substring_column(column)?;
                initial
                    .iter()
                    .chain(any)
                    .chain(final_part.iter())
                    .try_for_each(|fragment| store_text(converter, column, fragment).map(drop))
            }
            Filter::Present { attribute } => resolve_column(scope, attribute).map(drop),
            other => Err(unsupported_construct(other)),
        }
    }

    /// In-memory evaluation with the stock converter.
    pub fn matches(&self, entity: &Entity) -> Result<bool, DirectoryError> {
        self.matches_with(entity, &DefaultConverter)
    }

    /// In-memory evaluation; agrees with the translated SQL for persisted
    /// types when `converter` folds text with [`fold`](crate::entity::fold).
    pub fn matches_with(
        &self,
        entity: &Entity,
        converter: &dyn Converter,
    ) -> Result<bool, DirectoryError> {
        self.check(entity.entity_type(), converter)?;
        Ok(self.evaluate(entity, converter))
    }

    /// Evaluate a filter that already passed [`Filter::check`].
    pub(crate) fn evaluate(&self, entity: &Entity, converter: &dyn Converter) -> bool {
        match self {
            Filter::And(children) => children.iter().all(|child| child.evaluate(entity, converter)),
            Filter::Or(children) => children.iter().any(|child| child.evaluate(entity, converter)),
            Filter::Not(inner) => !inner.evaluate(entity, converter),
            Filter::Equals { attribute, value } => {
                let Some(column) = Column::from_attribute(attribute) else {
                    return false;
                };
                let Some(wanted) = converter.to_store(column, value) else {
                    return false;
                };
                stored_values(entity, column, converter).any(|stored| stored == wanted)
            }
            Filter::Substring {
                attribute,
                initial,
                any,
                final_part,
            } => {
                let Some(column) = Column::from_attribute(attribute) else {
                    return false;
                };
                let fold = |fragment: &String| match converter.to_store(column, fragment) {
                    Some(SqlValue::Text(text)) => text,
                    _ => fragment.clone(),
                };
                let initial = initial.as_ref().map(fold);
                let any: Vec<String> = any.iter().map(fold).collect();
                let final_part = final_part.as_ref().map(fold);

                stored_values(entity, column, converter).any(|stored| match stored {
                    SqlValue::Text(text) => {
                        substring_matches(&text, initial.as_deref(), &any, final_part.as_deref())
                    }
                    _ => false,
                })
            }
            Filter::Present { attribute } => Column::from_attribute(attribute)
                .and_then(|column| entity.attribute(column))
                .is_some(),
            _ => false,
        }
    }
}

fn stored_values<'a>(
    entity: &Entity,
    column: Column,
    converter: &'a dyn Converter,
) -> impl Iterator<Item = SqlValue> + 'a {
    entity
        .attribute(column)
        .map(|attribute| attribute.values())
        .unwrap_or_default()
        .into_iter()
        .filter_map(move |value| converter.to_store(column, &value))
}

/// Same semantics as `LIKE 'initial%any1%any2%final'`.
fn substring_matches(value: &str, initial: Option<&str>, any: &[String], final_part: Option<&str>) -> bool {
    let mut rest = value;
    if let Some(initial) = initial {
        match rest.strip_prefix(initial) {
            Some(remaining) => rest = remaining,
            None => return false,
        }
    }
    for fragment in any {
        match rest.find(fragment.as_str()) {
            Some(position) => rest = &rest[position + fragment.len()..],
            None => return false,
        }
    }
    final_part.map_or(true, |suffix| rest.ends_with(suffix))
}

pub(crate) fn resolve_column(scope: EntityType, attribute: &str) -> Result<Column, DirectoryError> {
    Column::from_attribute(attribute)
        .filter(|column| scope.has_column(*column))
        .ok_or_else(|| DirectoryError::UnknownColumn {
            entity_type: scope,
            column: attribute.to_string(),
        })
}

pub(crate) fn store_value(
    converter: &dyn Converter,
    column: Column,
    value: &str,
) -> Result<SqlValue, DirectoryError> {
    converter.to_store(column, value).ok_or_else(|| {
        DirectoryError::unsupported(format!("value '{value}' cannot be compared with {column}"))
    })
}

pub(crate) fn store_text(
    converter: &dyn Converter,
    column: Column,
    fragment: &str,
) -> Result<String, DirectoryError> {
    match store_value(converter, column, fragment)? {
        SqlValue::Text(text) => Ok(text),
        _ => Err(DirectoryError::unsupported(format!(
            "substring match on non-text column {column}"
        ))),
    }
}

pub(crate) fn substring_column(column: Column) -> Result<(), DirectoryError> {
    match column.kind() {
        ColumnKind::Identifier | ColumnKind::Text | ColumnKind::MultiValued => Ok(()),
        ColumnKind::Discriminator | ColumnKind::Boolean => Err(DirectoryError::unsupported(
            format!("substring match on {column}"),
        )),
    }
}

pub(crate) fn unsupported_construct(filter: &Filter) -> DirectoryError {
    DirectoryError::unsupported(match filter {
        Filter::GreaterOrEqual { attribute, .. } | Filter::LessOrEqual { attribute, .. } => {
            format!("ordering match on '{attribute}'")
        }
        Filter::Approximate { attribute, .. } => format!("approximate match on '{attribute}'"),
        Filter::Extensible { rule, .. } => format!(
            "extensible match (rule {})",
            rule.as_deref().unwrap_or("none")
        ),
        other => format!("filter {other}"),
    })
}

fn escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '*' => escaped.push_str("\\2a"),
            '(' => escaped.push_str("\\28"),
            ')' => escaped.push_str("\\29"),
            '\\' => escaped.push_str("\\5c"),
            '\0' => escaped.push_str("\\00"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// String form of the filter
impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::Equals { attribute, value } => write!(f, "({attribute}={})", escape(value)),
            Filter::Substring {
                attribute,
                initial,
                any,
                final_part,
            } => {
                write!(f, "({attribute}=")?;
                if let Some(initial) = initial {
                    f.write_str(&escape(initial))?;
                }
                f.write_str("*")?;
                for fragment in any {
                    write!(f, "{}*", escape(fragment))?;
                }
                if let Some(final_part) = final_part {
                    f.write_str(&escape(final_part))?;
                }
                f.write_str(")")
            }
            Filter::Present { attribute } => write!(f, "({attribute}=*)"),
            Filter::And(children) => {
                f.write_str("(&")?;
                children.iter().try_for_each(|child| write!(f, "{child}"))?;
                f.write_str(")")
            }
            Filter::Or(children) => {
                f.write_str("(|")?;
                children.iter().try_for_each(|child| write!(f, "{child}"))?;
                f.write_str(")")
            }
            Filter::Not(inner) => write!(f, "(!{inner})"),
            Filter::GreaterOrEqual { attribute, value } => {
                write!(f, "({attribute}>={})", escape(value))
            }
            Filter::LessOrEqual { attribute, value } => write!(f, "({attribute}<={})", escape(value)),
            Filter::Approximate { attribute, value } => write!(f, "({attribute}~={})", escape(value)),
            Filter::Extensible {
                rule,
                attribute,
                value,
            } => {
                f.write_str("(")?;
                if let Some(attribute) = attribute {
                    f.write_str(attribute)?;
                }
                if let Some(rule) = rule {
                    write!(f, ":{rule}")?;
                }
                write!(f, ":={})", escape(value))
            }
        }
    }
}
