//! Prism Core - Deduplicated image variant generation.
//!
//! Prism coordinates on-demand image variants: each requested
//! (source, options) pair is canonicalized and hashed, generated at
//! most once, and resolved through a durable ledger afterwards. The
//! pixel work itself is a small, replaceable transform step; the value
//! is in the coordination around it.
//!
//! # Architecture
//!
//! ```text
//! Request → Canonical options → Combined hash → Ledger lookup
//!                                                │ hit: serve metadata/URL
//!                                                └ miss: Engine (claim once,
//!                                                  transform, store, record)
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use prism_core::{Config, Prism, VariantOptions};
//!
//! fn main() -> prism_core::Result<()> {
//!     let prism = Prism::new(Config::load()?)?;
//!     let mut batch = prism.batch();
//!     batch.add("photos/cat.jpg", VariantOptions::new().with("fit", (400u32, 300u32)));
//!     batch.generate(false)?;
//!     Ok(())
//! }
//! ```

// Module declarations
pub mod action;
pub mod batch;
pub mod config;
pub mod engine;
pub mod error;
pub mod filename;
pub mod hash;
pub mod ledger;
pub mod options;
pub mod storage;
pub mod store;
pub mod types;
pub mod variant;

// Re-exports for convenient access
pub use action::{build_action, Action};
pub use batch::VariantBatch;
pub use config::Config;
pub use engine::{Engine, InlineEngine, QueuedEngine};
pub use error::{ConfigError, OptionsError, PrismError, Result, StoreError};
pub use filename::FilenameInfo;
pub use ledger::{DbLedger, Ledger, LedgerKind};
pub use options::{OptionValue, VariantOptions};
pub use storage::{FsStorage, Storage, StorageRegistry};
pub use store::{ActionQueue, Database, RecordStore, VariantRecord};
pub use types::ImageMeta;
pub use variant::{ResolveState, Variant};

use std::sync::Arc;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prism instance - the main entry point.
///
/// Owns the database, storage backends, ledger and engine built from
/// one [`Config`], and hands out batches and variants wired to them.
/// Construct once at startup and share.
pub struct Prism {
    config: Config,
    db: Arc<Database>,
    queue: ActionQueue,
    ledger: Arc<dyn Ledger>,
    engine: Arc<dyn Engine>,
    executor: InlineEngine,
}

impl Prism {
    /// Build an instance from the given configuration.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        tracing::debug!("Initializing Prism v{}", VERSION);

        let db = Arc::new(Database::open(&config.database_path())?);
        let records = RecordStore::new(Arc::clone(&db));
        let queue = ActionQueue::new(Arc::clone(&db));

        let mut registry = StorageRegistry::new();
        for (name, backend) in &config.storage.backends {
            let storage =
                FsStorage::new(Config::backend_root(backend), backend.base_url.as_str());
            registry.insert(name, Arc::new(storage));
        }

        let output = Arc::new(config.output.clone());
        let executor = InlineEngine::new(
            records.clone(),
            Arc::new(registry),
            Arc::clone(&output),
        );
        let engine: Arc<dyn Engine> = if config.queue.queued {
            Arc::new(QueuedEngine::new(executor.clone(), queue.clone()))
        } else {
            Arc::new(executor.clone())
        };
        let ledger: Arc<dyn Ledger> = Arc::new(DbLedger::new(records, output));

        Ok(Prism {
            config,
            db,
            queue,
            ledger,
            engine,
            executor,
        })
    }

    /// Build an instance from the default configuration location.
    pub fn with_defaults() -> Result<Self> {
        Self::new(Config::load()?)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    pub fn queue(&self) -> &ActionQueue {
        &self.queue
    }

    pub fn ledger(&self) -> Arc<dyn Ledger> {
        Arc::clone(&self.ledger)
    }

    /// Resolve a ledger by its registry identifier.
    pub fn ledger_for(&self, kind: LedgerKind) -> Arc<dyn Ledger> {
        match kind {
            LedgerKind::Db => Arc::clone(&self.ledger),
        }
    }

    /// The engine requests go through: inline, or queue-routing when
    /// `queue.queued` is set.
    pub fn engine(&self) -> Arc<dyn Engine> {
        Arc::clone(&self.engine)
    }

    /// The inline executor. Workers run claimed actions through this
    /// regardless of how requests are routed.
    pub fn executor(&self) -> &InlineEngine {
        &self.executor
    }

    /// A new empty batch wired to this instance.
    pub fn batch(&self) -> VariantBatch {
        VariantBatch::new(self.ledger(), self.engine())
    }

    /// A single standalone variant.
    pub fn variant(&self, source: &str, opts: VariantOptions) -> Variant {
        Variant::new(source, opts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(dir: &tempfile::TempDir) -> Config {
        let mut config = Config::default();
        config.database.path = dir.path().join("prism.db").display().to_string();
        if let Some(backend) = config.storage.backends.get_mut("default") {
            backend.root = dir.path().join("media").display().to_string();
        }
        config
    }

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_prism_new() {
        let dir = tempfile::tempdir().unwrap();
        let prism = Prism::new(test_config(&dir)).unwrap();
        assert!(!prism.config().queue.queued);
        assert!(prism.queue().is_empty().unwrap());
        assert_eq!(prism.ledger().kind(), LedgerKind::Db);
    }

    #[test]
    fn test_prism_rejects_invalid_config() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(&dir);
        config.output.quality = 0;
        assert!(Prism::new(config).is_err());
    }

    #[test]
    fn test_queued_config_routes_through_queue() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(&dir);
        config.queue.queued = true;
        let prism = Prism::new(config).unwrap();

        let opts = VariantOptions::new().with("fit", (8u32, 8u32));
        let action = build_action("a/b.jpg", &[opts], prism.ledger().as_ref(), false);
        assert!(prism.engine().add(&action).unwrap().is_none());
        assert_eq!(prism.queue().len().unwrap(), 1);
    }

    #[test]
    fn test_batch_wiring_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let prism = Prism::new(test_config(&dir)).unwrap();

        // Seed a source through the default backend.
        let media = FsStorage::new(dir.path().join("media"), "/media/");
        let png = engine::transform::encode(
            "src.png",
            &image::DynamicImage::new_rgb8(64, 32),
            ".png",
            85,
        )
        .unwrap();
        media.save("photos/src.png", &png).unwrap();

        let mut batch = prism.batch();
        let idx = batch.add(
            "photos/src.png",
            VariantOptions::new().with("fit", (16u32, 16u32)),
        );
        batch.generate(false).unwrap();
        let meta = batch.results().unwrap()[idx].state().meta().cloned().unwrap();
        assert_eq!(meta.width, Some(16));
        assert_eq!(meta.height, Some(8));
    }
}
