//! The durable action queue.
//!
//! Multiple consumers may drain the queue concurrently, from separate
//! threads or separate processes. Delivery is at-most-once: a consumer
//! owns an action only after its targeted delete removed exactly one
//! row. Ordering is oldest-first, best effort; at-most-once is the
//! only hard guarantee.

use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use std::sync::Arc;

use super::Database;
use crate::action::Action;
use crate::error::StoreError;

/// SQLite-backed queue of pending [`Action`]s.
#[derive(Clone)]
pub struct ActionQueue {
    db: Arc<Database>,
}

impl ActionQueue {
    pub fn new(db: Arc<Database>) -> Self {
        ActionQueue { db }
    }

    /// Append an action to the queue.
    pub fn push(&self, action: &Action) -> Result<i64, StoreError> {
        let payload = serde_json::to_string(action)
            .map_err(|e| StoreError::Args(e.to_string()))?;
        let created = Utc::now().to_rfc3339();
        self.db.with(|conn| {
            conn.execute(
                "INSERT INTO action_queue (created_at, payload) VALUES (?1, ?2)",
                params![created, payload],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn len(&self) -> Result<usize, StoreError> {
        let n: i64 = self
            .db
            .with(|conn| conn.query_row("SELECT COUNT(*) FROM action_queue", [], |r| r.get(0)))?;
        Ok(n as usize)
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }

    /// Lazily claim up to `limit` actions, oldest first.
    ///
    /// Each candidate row is claimed by deleting it by id; only a
    /// delete that removed exactly one row yields the action. Rows
    /// lost to a concurrent consumer are skipped silently.
    pub fn drain(&self, limit: usize) -> Drain<'_> {
        Drain {
            queue: self,
            remaining: limit,
            cursor: 0,
        }
    }

    /// Claim the next action, or `None` when the queue is empty (or
    /// every candidate was claimed by someone else first).
    pub fn pop(&self) -> Result<Option<Action>, StoreError> {
        self.drain(1).next().transpose()
    }

    fn next_candidate(&self, after: i64) -> Result<Option<(i64, String)>, StoreError> {
        self.db.with(|conn| {
            conn.query_row(
                "SELECT id, payload FROM action_queue
                 WHERE id > ?1 ORDER BY created_at, id LIMIT 1",
                params![after],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
        })
    }

    fn try_claim(&self, id: i64) -> Result<bool, StoreError> {
        let n = self
            .db
            .with(|conn| conn.execute("DELETE FROM action_queue WHERE id = ?1", params![id]))?;
        Ok(n == 1)
    }
}

/// Lazy claiming iterator returned by [`ActionQueue::drain`].
pub struct Drain<'a> {
    queue: &'a ActionQueue,
    remaining: usize,
    cursor: i64,
}

impl Iterator for Drain<'_> {
    type Item = Result<Action, StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.remaining > 0 {
            let candidate = match self.queue.next_candidate(self.cursor) {
                Ok(Some(row)) => row,
                Ok(None) => return None,
                Err(e) => return Some(Err(e)),
            };
            let (id, payload) = candidate;
            self.cursor = id;
            match self.queue.try_claim(id) {
                Ok(true) => {
                    self.remaining -= 1;
                    return Some(
                        serde_json::from_str(&payload)
                            .map_err(|source| StoreError::Payload { id, source }),
                    );
                }
                Ok(false) => {
                    tracing::trace!("queue row {id} claimed elsewhere, skipping");
                    continue;
                }
                Err(e) => return Some(Err(e)),
            }
        }
        None
    }
}
