// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use std::collections::VecDeque;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{closed, EntryCursor, Position};
use crate::error::DirectoryError;
use crate::metrics;

/// Cursor over an in-memory result.
pub struct ListCursor<T> {
    label: &'static str,
    remaining: VecDeque<T>,
    position: Position<T>,
}

impl<T> ListCursor<T> {
    pub fn new(label: &'static str, items: impl IntoIterator<Item = T>) -> Self {
        Self {
            label,
            remaining: items.into_iter().collect(),
            position: Position::Before,
        }
    }

    fn shut(&mut self) {
        self.remaining.clear();
        self.position = Position::Closed;
    }
}

#[async_trait]
impl<T: Send + Sync> EntryCursor<T> for ListCursor<T> {
    async fn next(&mut self) -> Result<bool, DirectoryError> {
        if self.position.is_closed() {
            return Err(closed());
        }
        match self.remaining.pop_front() {
            Some(item) => {
                self.position = Position::On(item);
                Ok(true)
            }
            None => {
                self.position = Position::Exhausted;
                Ok(false)
            }
        }
    }

    fn get(&self) -> Result<&T, DirectoryError> {
        self.position.get()
    }

    fn close(&mut self) {
        if self.position.is_closed() {
            return;
        }
        self.shut();
        debug!(cursor = self.label, "Cursor closed");
        metrics::record_cursor_closed(self.label, "clean");
    }

    fn close_with_cause(&mut self, cause: &DirectoryError) {
        if self.position.is_closed() {
            return;
        }
        self.shut();
        warn!(cursor = self.label, error = %cause, "Cursor closed after failure");
        metrics::record_cursor_closed(self.label, "failed");
    }

    fn is_closed(&self) -> bool {
        self.position.is_closed()
    }
}
