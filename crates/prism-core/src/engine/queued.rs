//! Queue-routing engine for asynchronous workers.

use std::sync::Arc;

use super::{Engine, InlineEngine};
use crate::action::Action;
use crate::error::Result;
use crate::hash;
use crate::options::VariantOptions;
use crate::storage::{Storage, DEFAULT_STORAGE};
use crate::store::{ActionQueue, VariantRecord};
use crate::types::ImageMeta;

/// Engine that enqueues actions for workers instead of transforming
/// in-process. `add` always returns `None`; callers treat the hashes
/// as processing until a worker completes them.
pub struct QueuedEngine {
    inner: InlineEngine,
    queue: ActionQueue,
}

impl QueuedEngine {
    pub fn new(inner: InlineEngine, queue: ActionQueue) -> Self {
        QueuedEngine { inner, queue }
    }

    /// The inline executor workers should run claimed actions through.
    pub fn executor(&self) -> &InlineEngine {
        &self.inner
    }
}

impl Engine for QueuedEngine {
    fn processing(&self, hash: &str) -> Result<bool> {
        self.inner.processing(hash)
    }

    fn processing_list(&self, hashes: &[String]) -> Result<Vec<bool>> {
        self.inner.processing_list(hashes)
    }

    fn add(&self, action: &Action) -> Result<Option<Vec<VariantRecord>>> {
        // Make the records visible immediately; the claim itself stays
        // with whichever worker picks the action up.
        for opts in &action.opts {
            let id = hash::record_id(&action.source, &opts.canonical());
            self.inner
                .records()
                .get_or_create(&id, DEFAULT_STORAGE, &action.source, opts)?;
        }
        let row = self.queue.push(action)?;
        tracing::debug!(
            "queued action {row} for {} ({} variant(s))",
            action.source,
            action.opts.len()
        );
        Ok(None)
    }

    fn build_meta(&self, record: &VariantRecord) -> ImageMeta {
        self.inner.build_meta(record)
    }

    fn generated_file(&self, source: &str, opts: &VariantOptions) -> Result<Option<Vec<u8>>> {
        self.inner.generated_file(source, opts)
    }

    fn generated_storage(&self, opts: &VariantOptions) -> Result<Arc<dyn Storage>> {
        self.inner.generated_storage(opts)
    }

    fn processing_url(
        &self,
        source: &str,
        opts: &VariantOptions,
        source_url: &str,
    ) -> String {
        self.inner.processing_url(source, opts, source_url)
    }
}
