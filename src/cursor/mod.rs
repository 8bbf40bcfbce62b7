// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Forward-only entry cursors.
//!
//! A cursor starts *before* the first element; [`EntryCursor::next`] advances
//! and reports whether an element is available, [`EntryCursor::get`] returns
//! it. Random positioning is not supported. Closing is idempotent and after
//! it every access fails.
//!
//! - [`ListCursor`]: over an already materialized result
//! - [`StreamCursor`]: fed by a producer task that owns a read scope

mod list;
mod stream;

use async_trait::async_trait;

pub use list::ListCursor;
pub use stream::StreamCursor;

use crate::error::DirectoryError;

#[async_trait]
pub trait EntryCursor<T: Send + Sync>: Send {
    /// Advance. `Ok(false)` once exhausted.
    async fn next(&mut self) -> Result<bool, DirectoryError>;

    /// Element at the current position.
    fn get(&self) -> Result<&T, DirectoryError>;

    fn first(&mut self) -> Result<bool, DirectoryError> {
        Err(positioning("first"))
    }

    fn last(&mut self) -> Result<bool, DirectoryError> {
        Err(positioning("last"))
    }

    fn previous(&mut self) -> Result<bool, DirectoryError> {
        Err(positioning("previous"))
    }

    fn absolute(&mut self, _index: usize) -> Result<bool, DirectoryError> {
        Err(positioning("absolute"))
    }

    /// Release resources. Repeated calls are no-ops.
    fn close(&mut self);

    /// Close because of a failure; logged as such.
    fn close_with_cause(&mut self, cause: &DirectoryError);

    fn is_closed(&self) -> bool;
}

fn positioning(operation: &str) -> DirectoryError {
    DirectoryError::internal(format!("cursor does not support {operation}()"))
}

fn closed() -> DirectoryError {
    DirectoryError::internal("cursor is closed")
}

/// Current position of a cursor.
#[derive(Debug)]
enum Position<T> {
    Before,
    On(T),
    Exhausted,
    Closed,
}

impl<T> Position<T> {
    fn get(&self) -> Result<&T, DirectoryError> {
        match self {
            Position::On(item) => Ok(item),
            Position::Before => Err(DirectoryError::internal(
                "cursor is not positioned, call next() first",
            )),
            Position::Exhausted => Err(DirectoryError::internal("cursor is exhausted")),
            Position::Closed => Err(closed()),
        }
    }

    fn is_closed(&self) -> bool {
        matches!(self, Position::Closed)
    }
}

/// Collect every remaining element and close the cursor. On failure the
/// cursor is closed with the error as cause.
pub async fn drain<T>(cursor: &mut (dyn EntryCursor<T> + '_)) -> Result<Vec<T>, DirectoryError>
where
    T: Clone + Send + Sync,
{
    let mut items = Vec::new();
    loop {
        let step = match cursor.next().await {
            Ok(true) => cursor.get().map(|item| Some(item.clone())),
            Ok(false) => Ok(None),
            Err(err) => Err(err),
        };
        match step {
            Ok(Some(item)) => items.push(item),
            Ok(None) => break,
            Err(err) => {
                cursor.close_with_cause(&err);
                return Err(err);
            }
        }
    }
    cursor.close();
    Ok(items)
}
