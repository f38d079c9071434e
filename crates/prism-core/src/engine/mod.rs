//! Generation engines: turning actions into stored variant output.
//!
//! An engine is the trust boundary for "exists vs not yet vs in
//! progress". Callers never block on [`Engine::add`]: when an engine
//! cannot finish synchronously it returns `None` and callers poll
//! `processing`/`meta` until generation completes elsewhere.

pub(crate) mod inline;
mod queued;
pub mod transform;

pub use inline::InlineEngine;
pub use queued::QueuedEngine;

use std::sync::Arc;

use crate::action::Action;
use crate::error::Result;
use crate::options::VariantOptions;
use crate::storage::Storage;
use crate::store::VariantRecord;
use crate::types::ImageMeta;

/// The generation engine contract.
pub trait Engine: Send + Sync {
    /// Whether a generation is currently in flight for a combined
    /// hash. Read concurrently by many resolution requests.
    fn processing(&self, hash: &str) -> Result<bool>;

    /// Batched, order-preserving form of [`processing`](Engine::processing).
    fn processing_list(&self, hashes: &[String]) -> Result<Vec<bool>> {
        hashes.iter().map(|h| self.processing(h)).collect()
    }

    /// Submit an action for generation.
    ///
    /// Returns the generated records, one per opts entry in action
    /// order, when the engine completed synchronously; `None` when it
    /// could not (queued for later, or a claim was lost), in which
    /// case the caller treats the hashes as processing.
    fn add(&self, action: &Action) -> Result<Option<Vec<VariantRecord>>>;

    /// Project an engine result into the ledger's metadata shape.
    fn build_meta(&self, record: &VariantRecord) -> ImageMeta;

    /// Read the stored output for a variant, or `None` if not present.
    fn generated_file(&self, source: &str, opts: &VariantOptions) -> Result<Option<Vec<u8>>>;

    /// The storage backend a variant's output belongs in.
    fn generated_storage(&self, opts: &VariantOptions) -> Result<Arc<dyn Storage>>;

    /// A placeholder URL to serve while generation is pending, given
    /// the eventual target URL.
    fn processing_url(
        &self,
        source: &str,
        opts: &VariantOptions,
        source_url: &str,
    ) -> String;
}
