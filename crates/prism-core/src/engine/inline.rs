//! Synchronous in-process generation.

use std::sync::Arc;

use super::{transform, Engine};
use crate::action::Action;
use crate::config::OutputConfig;
use crate::error::Result;
use crate::hash;
use crate::options::{VariantOptions, FILENAME, FILENAME_TRANSPARENT};
use crate::storage::{Storage, StorageRegistry, DEFAULT_STORAGE};
use crate::store::{RecordStore, VariantRecord};
use crate::types::ImageMeta;

/// Engine that claims, transforms and stores within the calling
/// process. Also the executor workers run queued actions through.
#[derive(Clone)]
pub struct InlineEngine {
    records: RecordStore,
    storages: Arc<StorageRegistry>,
    output: Arc<OutputConfig>,
}

impl InlineEngine {
    pub fn new(
        records: RecordStore,
        storages: Arc<StorageRegistry>,
        output: Arc<OutputConfig>,
    ) -> Self {
        InlineEngine {
            records,
            storages,
            output,
        }
    }

    pub fn records(&self) -> &RecordStore {
        &self.records
    }

    /// Generate a single variant.
    ///
    /// Returns the complete record, or `None` when another actor
    /// holds the claim. A transform or storage failure propagates and
    /// leaves the claim marker set; regeneration then requires
    /// `force`.
    pub fn generate_one(
        &self,
        source: &str,
        opts: &VariantOptions,
        force: bool,
    ) -> Result<Option<VariantRecord>> {
        let canonical = opts.canonical();
        let id = hash::record_id(source, &canonical);
        let record = self
            .records
            .get_or_create(&id, DEFAULT_STORAGE, source, opts)?;

        if record.is_complete() && !force {
            return Ok(Some(record));
        }
        let claimed = if force {
            self.records.force_claim(&id)?
        } else {
            self.records.claim(&id)?
        };
        if !claimed {
            tracing::debug!("variant {} already claimed elsewhere", hex(&id));
            return Ok(None);
        }

        tracing::debug!("generating {source} [{canonical}]");
        let source_storage = self.storages.get(&record.storage)?;
        let bytes = source_storage.open(source)?;
        let decoded = transform::decode(source, &bytes)?;
        let out = transform::apply(&decoded, opts);

        let ext = if out.transparent {
            &self.output.transparent_extension
        } else {
            &self.output.opaque_extension
        };
        let name = self.output_name(source, opts, &canonical, ext, out.transparent);
        let quality = opts
            .get_int("quality")
            .and_then(|q| u8::try_from(q).ok())
            .unwrap_or(self.output.quality);
        let blob = transform::encode(&name, &out.image, ext, quality)?;
        let stored = self.generated_storage(opts)?.save(&name, &blob)?;
        self.records.complete(&id, &stored, out.width, out.height)?;
        tracing::info!(
            "generated {stored} ({}x{}, {} bytes)",
            out.width,
            out.height,
            blob.len()
        );

        let record = self.records.get(&id)?.ok_or_else(|| {
            crate::error::StoreError::Args("record vanished after completion".to_string())
        })?;
        Ok(Some(record))
    }

    /// The stored blob name: the precomputed filename annotation when
    /// the action carries one, else a hash-derived fallback.
    fn output_name(
        &self,
        source: &str,
        opts: &VariantOptions,
        canonical: &str,
        ext: &str,
        transparent: bool,
    ) -> String {
        let annotated = if transparent {
            opts.get_str(FILENAME_TRANSPARENT).or(opts.get_str(FILENAME))
        } else {
            opts.get_str(FILENAME)
        };
        if let Some(name) = annotated {
            return name.to_string();
        }
        let infix = opts
            .highres()
            .map(|f| self.output.highres_infix.replace("{highres}", &f.to_string()))
            .unwrap_or_default();
        format!("{}{infix}{ext}", hash::combined_hash(source, canonical))
    }
}

fn hex(id: &hash::RecordId) -> String {
    id.iter().map(|b| format!("{b:02x}")).collect()
}

impl Engine for InlineEngine {
    fn processing(&self, hash: &str) -> Result<bool> {
        match hash::record_id_from_hash(hash) {
            Some(id) => Ok(self.records.processing(&id)?),
            None => Ok(false),
        }
    }

    fn processing_list(&self, hashes: &[String]) -> Result<Vec<bool>> {
        let ids: Vec<_> = hashes
            .iter()
            .map(|h| hash::record_id_from_hash(h))
            .collect();
        // Unparseable hashes can never be processing; batch the rest.
        let valid: Vec<_> = ids.iter().filter_map(|id| *id).collect();
        let mut flags = self.records.processing_many(&valid)?.into_iter();
        Ok(ids
            .iter()
            .map(|id| match id {
                Some(_) => flags.next().unwrap_or(false),
                None => false,
            })
            .collect())
    }

    fn add(&self, action: &Action) -> Result<Option<Vec<VariantRecord>>> {
        let mut records = Vec::with_capacity(action.opts.len());
        for opts in &action.opts {
            match self.generate_one(&action.source, opts, action.force)? {
                Some(record) => records.push(record),
                // One in-flight entry degrades the whole action to the
                // processing path.
                None => return Ok(None),
            }
        }
        Ok(Some(records))
    }

    fn build_meta(&self, record: &VariantRecord) -> ImageMeta {
        record
            .meta(&self.output.transparent_extension)
            .unwrap_or_default()
    }

    fn generated_file(&self, source: &str, opts: &VariantOptions) -> Result<Option<Vec<u8>>> {
        let id = hash::record_id(source, &opts.canonical());
        let Some(record) = self.records.get(&id)? else {
            return Ok(None);
        };
        let Some(image) = record.image.as_deref() else {
            return Ok(None);
        };
        Ok(Some(self.generated_storage(opts)?.open(image)?))
    }

    fn generated_storage(&self, opts: &VariantOptions) -> Result<Arc<dyn Storage>> {
        Ok(self.storages.generated(opts.storage_name())?)
    }

    fn processing_url(
        &self,
        _source: &str,
        _opts: &VariantOptions,
        source_url: &str,
    ) -> String {
        self.output
            .placeholder_url
            .clone()
            .unwrap_or_else(|| source_url.to_string())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::action::build_action;
    use crate::filename::FilenameInfo;
    use crate::ledger::{DbLedger, Ledger};
    use crate::storage::FsStorage;
    use crate::store::Database;
    use image::DynamicImage;

    pub(crate) struct Fixture {
        pub dir: tempfile::TempDir,
        pub db: Arc<Database>,
        pub engine: InlineEngine,
        pub ledger: DbLedger,
    }

    /// A media tree with one opaque source at `photos/src.png`
    /// (64x32) and one transparent source at `photos/alpha.png`.
    pub(crate) fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(Database::open(&dir.path().join("prism.db")).unwrap());
        let records = RecordStore::new(Arc::clone(&db));
        let storage = FsStorage::new(dir.path().join("media"), "/media/");
        let opaque = transform::encode(
            "src.png",
            &DynamicImage::new_rgb8(64, 32),
            ".png",
            85,
        )
        .unwrap();
        storage.save("photos/src.png", &opaque).unwrap();
        let alpha = transform::encode(
            "alpha.png",
            &DynamicImage::new_rgba8(32, 32),
            ".png",
            85,
        )
        .unwrap();
        storage.save("photos/alpha.png", &alpha).unwrap();

        let mut registry = StorageRegistry::new();
        registry.insert(DEFAULT_STORAGE, Arc::new(storage));
        let output = Arc::new(OutputConfig::default());
        let engine = InlineEngine::new(records.clone(), Arc::new(registry), Arc::clone(&output));
        let ledger = DbLedger::new(records, output);
        Fixture {
            dir,
            db,
            engine,
            ledger,
        }
    }

    fn fit_opts() -> VariantOptions {
        VariantOptions::new().with("fit", (16u32, 16u32))
    }

    #[test]
    fn test_generate_one_end_to_end() {
        let fx = fixture();
        let record = fx
            .engine
            .generate_one("photos/src.png", &fit_opts(), false)
            .unwrap()
            .unwrap();
        assert!(record.is_complete());
        // 64x32 fit into 16x16 keeps aspect.
        assert_eq!(record.width, Some(16));
        assert_eq!(record.height, Some(8));

        let meta = fx.ledger.meta("photos/src.png", &fit_opts()).unwrap().unwrap();
        assert_eq!(meta.width, Some(16));
        assert!(!meta.transparent);

        // The blob is readable back through the engine.
        let blob = fx
            .engine
            .generated_file("photos/src.png", &fit_opts())
            .unwrap()
            .unwrap();
        assert!(!blob.is_empty());
    }

    #[test]
    fn test_second_generate_returns_existing() {
        let fx = fixture();
        let first = fx
            .engine
            .generate_one("photos/src.png", &fit_opts(), false)
            .unwrap()
            .unwrap();
        let second = fx
            .engine
            .generate_one("photos/src.png", &fit_opts(), false)
            .unwrap()
            .unwrap();
        assert_eq!(first.image, second.image);
        assert_eq!(first.started_generating, second.started_generating);
    }

    #[test]
    fn test_lost_claim_returns_none() {
        let fx = fixture();
        let id = hash::record_id("photos/src.png", &fit_opts().canonical());
        fx.engine
            .records()
            .get_or_create(&id, DEFAULT_STORAGE, "photos/src.png", &fit_opts())
            .unwrap();
        fx.engine.records().claim(&id).unwrap();

        let result = fx
            .engine
            .generate_one("photos/src.png", &fit_opts(), false)
            .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_force_regenerates_after_failed_claim() {
        let fx = fixture();
        let id = hash::record_id("photos/src.png", &fit_opts().canonical());
        fx.engine
            .records()
            .get_or_create(&id, DEFAULT_STORAGE, "photos/src.png", &fit_opts())
            .unwrap();
        fx.engine.records().claim(&id).unwrap();

        let record = fx
            .engine
            .generate_one("photos/src.png", &fit_opts(), true)
            .unwrap()
            .unwrap();
        assert!(record.is_complete());
    }

    #[test]
    fn test_concurrent_adds_single_transform() {
        let fx = fixture();
        let action = build_action("photos/src.png", &[fit_opts()], &fx.ledger, false);

        let barrier = Arc::new(std::sync::Barrier::new(2));
        let mut handles = Vec::new();
        for _ in 0..2 {
            let engine = fx.engine.clone();
            let action = action.clone();
            let barrier = Arc::clone(&barrier);
            handles.push(std::thread::spawn(move || {
                barrier.wait();
                engine.add(&action).unwrap()
            }));
        }
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let winners = results.iter().filter(|r| r.is_some()).count();
        assert_eq!(winners, 1);
    }

    #[test]
    fn test_transparent_source_gets_transparent_extension() {
        let fx = fixture();
        let record = fx
            .engine
            .generate_one("photos/alpha.png", &fit_opts(), false)
            .unwrap()
            .unwrap();
        assert!(record.image.as_deref().unwrap().ends_with(".png"));
        let meta = fx.engine.build_meta(&record);
        assert!(meta.transparent);
    }

    #[test]
    fn test_add_uses_annotated_filenames() {
        let fx = fixture();
        let action = build_action("photos/src.png", &[fit_opts()], &fx.ledger, false);
        let records = fx.engine.add(&action).unwrap().unwrap();
        let info = FilenameInfo::new("photos/src.png", &fit_opts());
        assert_eq!(
            records[0].image.as_deref(),
            Some(format!("photos/{}.jpg", info.hash()).as_str())
        );
    }

    #[test]
    fn test_add_multiple_opts_preserves_order() {
        let fx = fixture();
        let small = fit_opts();
        let large = VariantOptions::new().with("fit", (32u32, 32u32));
        let action = build_action(
            "photos/src.png",
            &[small.clone(), large.clone()],
            &fx.ledger,
            false,
        );
        let records = fx.engine.add(&action).unwrap().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].width, Some(16));
        assert_eq!(records[1].width, Some(32));
    }

    #[test]
    fn test_processing_reporting() {
        let fx = fixture();
        let info = FilenameInfo::new("photos/src.png", &fit_opts());
        let hash_str = info.hash().to_string();
        assert!(!fx.engine.processing(&hash_str).unwrap());

        let id = hash::record_id("photos/src.png", &fit_opts().canonical());
        fx.engine
            .records()
            .get_or_create(&id, DEFAULT_STORAGE, "photos/src.png", &fit_opts())
            .unwrap();
        fx.engine.records().claim(&id).unwrap();
        assert!(fx.engine.processing(&hash_str).unwrap());

        let flags = fx
            .engine
            .processing_list(&[hash_str.clone(), "not-a-hash".to_string()])
            .unwrap();
        assert_eq!(flags, vec![true, false]);
    }

    #[test]
    fn test_missing_source_propagates_and_keeps_claim() {
        let fx = fixture();
        let opts = fit_opts();
        let err = fx.engine.generate_one("photos/missing.png", &opts, false);
        assert!(err.is_err());

        // The claim stays set: a retry without force backs off.
        let retry = fx
            .engine
            .generate_one("photos/missing.png", &opts, false)
            .unwrap();
        assert!(retry.is_none());
    }

    #[test]
    fn test_processing_url_placeholder() {
        let fx = fixture();
        assert_eq!(
            fx.engine
                .processing_url("photos/src.png", &fit_opts(), "/media/x.jpg"),
            "/media/x.jpg"
        );
    }
}
