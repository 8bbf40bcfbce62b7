// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Search filters.
//!
//! - [`Filter`]: expression tree with in-memory evaluation
//! - [`FilterTranslator`]: filter to parameterized SQL fragment
//! - [`Converter`]: attribute value to stored value (and back)

mod converter;
mod expr;
mod translator;

pub use converter::{Converter, DefaultConverter};
pub use expr::Filter;
pub use translator::{FilterTranslator, SqlFragment};
