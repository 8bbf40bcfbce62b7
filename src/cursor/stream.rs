// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use std::future::Future;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{closed, EntryCursor, Position};
use crate::error::DirectoryError;
use crate::metrics;

/// Cursor fed through a bounded channel by a producer task.
///
/// The producer should not hold store access while it waits on the
/// channel: a consumer that writes between `next()` calls would wait on
/// it forever. Closing or dropping the cursor aborts the producer.
pub struct StreamCursor<T> {
    label: &'static str,
    receiver: Option<mpsc::Receiver<Result<T, DirectoryError>>>,
    producer: Option<JoinHandle<()>>,
    position: Position<T>,
}

impl<T: Send + 'static> StreamCursor<T> {
    /// Spawn `produce` with the sending half of a channel holding up to
    /// `buffer` elements.
    pub fn spawn<F, Fut>(label: &'static str, buffer: usize, produce: F) -> Self
    where
        F: FnOnce(mpsc::Sender<Result<T, DirectoryError>>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (sender, receiver) = mpsc::channel(buffer.max(1));
        let producer = tokio::spawn(produce(sender));
        Self {
            label,
            receiver: Some(receiver),
            producer: Some(producer),
            position: Position::Before,
        }
    }

    fn shut(&mut self) {
        if let Some(producer) = self.producer.take() {
            producer.abort();
        }
        self.receiver = None;
        self.position = Position::Closed;
    }
}

#[async_trait]
impl<T: Send + Sync + 'static> EntryCursor<T> for StreamCursor<T> {
    async fn next(&mut self) -> Result<bool, DirectoryError> {
        match self.position {
            Position::Closed => return Err(closed()),
            Position::Exhausted => return Ok(false),
            Position::Before | Position::On(_) => {}
        }
        let Some(receiver) = self.receiver.as_mut() else {
            self.position = Position::Exhausted;
            return Ok(false);
        };

        match receiver.recv().await {
            Some(Ok(item)) => {
                self.position = Position::On(item);
                Ok(true)
            }
            Some(Err(err)) => {
                self.receiver = None;
                self.position = Position::Exhausted;
                Err(err)
            }
            None => {
                self.receiver = None;
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

impl<T> Drop for StreamCursor<T> {
    fn drop(&mut self) {
        if let Some(producer) = self.producer.take() {
            producer.abort();
        }
    }
}
