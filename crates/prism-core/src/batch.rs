//! Batched variant resolution.
//!
//! Rendering a page usually needs dozens of variants. The batch
//! collects them first, then resolves every pending one with a single
//! processing check and a single ledger lookup, instead of two queries
//! per variant. Indices handed out by [`VariantBatch::add`] stay valid
//! for the life of the batch.

use std::sync::Arc;

use crate::action::build_action;
use crate::engine::Engine;
use crate::error::Result;
use crate::ledger::Ledger;
use crate::options::VariantOptions;
use crate::variant::{ResolveState, Variant};

/// An ordered collection of variants resolved and generated together.
pub struct VariantBatch {
    ledger: Arc<dyn Ledger>,
    engine: Arc<dyn Engine>,
    variants: Vec<Variant>,
    // Everything below this index has been through resolution at
    // least once.
    loaded: usize,
}

impl VariantBatch {
    pub fn new(ledger: Arc<dyn Ledger>, engine: Arc<dyn Engine>) -> Self {
        VariantBatch {
            ledger,
            engine,
            variants: Vec::new(),
            loaded: 0,
        }
    }

    /// Register a variant; returns its stable index within the batch.
    pub fn add(&mut self, source: &str, opts: VariantOptions) -> usize {
        self.variants.push(Variant::new(source, opts));
        self.variants.len() - 1
    }

    /// Register several variants of one source; returns their indices.
    pub fn add_all(&mut self, source: &str, opts_list: &[VariantOptions]) -> Vec<usize> {
        opts_list
            .iter()
            .map(|opts| self.add(source, opts.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.variants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Variant> {
        self.variants.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Variant> {
        self.variants.get_mut(index)
    }

    /// Find a variant by its combined hash.
    pub fn find(&self, hash: &str) -> Option<&Variant> {
        self.variants.iter().find(|v| v.hash() == hash)
    }

    /// Resolve every unresolved variant with one processing check and
    /// one batched ledger lookup.
    ///
    /// Variants whose generation is in flight are left unresolved;
    /// calling again later re-checks them. Everything else ends up
    /// resolved or confirmed absent.
    pub fn resolve_pending(&mut self) -> Result<()> {
        let pending: Vec<usize> = self
            .variants
            .iter()
            .enumerate()
            .filter(|(_, v)| v.state().is_unresolved())
            .map(|(i, _)| i)
            .collect();
        self.loaded = self.variants.len();
        if pending.is_empty() {
            return Ok(());
        }

        let hashes: Vec<String> = pending
            .iter()
            .map(|&i| self.variants[i].hash().to_string())
            .collect();
        let processing = self.engine.processing_list(&hashes)?;

        let lookup: Vec<usize> = pending
            .iter()
            .zip(&processing)
            .filter(|(_, in_flight)| !**in_flight)
            .map(|(&i, _)| i)
            .collect();
        if lookup.is_empty() {
            return Ok(());
        }

        let pairs: Vec<(String, VariantOptions)> = lookup
            .iter()
            .map(|&i| {
                let v = &self.variants[i];
                (v.source().to_string(), v.opts().clone())
            })
            .collect();
        let metas = self.ledger.meta_list(&pairs)?;
        for (&i, meta) in lookup.iter().zip(metas) {
            // None confirms absence; in-flight entries were excluded
            // above so absence here is real.
            self.variants[i].set_meta(meta);
        }
        Ok(())
    }

    /// Resolve anything added since the last resolution, then expose
    /// the variants in registration order.
    pub fn results(&mut self) -> Result<&[Variant]> {
        if self.loaded < self.variants.len() {
            self.resolve_pending()?;
        }
        Ok(&self.variants)
    }

    /// Generate every variant that is missing (or every variant, with
    /// `force`), one action per distinct source.
    ///
    /// Synchronous completions resolve their variants in place;
    /// deferred ones are left for a later [`resolve_pending`]
    /// (they report as processing in the meantime).
    ///
    /// [`resolve_pending`]: VariantBatch::resolve_pending
    pub fn generate(&mut self, force: bool) -> Result<()> {
        self.resolve_pending()?;

        let wanted: Vec<usize> = self
            .variants
            .iter()
            .enumerate()
            .filter(|(_, v)| {
                force
                    || matches!(
                        v.state(),
                        ResolveState::ConfirmedAbsent | ResolveState::Unresolved
                    )
            })
            .map(|(i, _)| i)
            .collect();
        if wanted.is_empty() {
            return Ok(());
        }

        // Unresolved survivors of resolve_pending are already in
        // flight; without force they need no new action.
        let wanted: Vec<usize> = if force {
            wanted
        } else {
            wanted
                .into_iter()
                .filter(|&i| !self.variants[i].state().is_unresolved())
                .collect()
        };

        // One action per distinct source, in first-seen order.
        let mut groups: Vec<(String, Vec<usize>)> = Vec::new();
        for &i in &wanted {
            let source = self.variants[i].source();
            match groups.iter_mut().find(|(s, _)| s.as_str() == source) {
                Some((_, indices)) => indices.push(i),
                None => groups.push((source.to_string(), vec![i])),
            }
        }

        for (source, indices) in groups {
            let opts_list: Vec<VariantOptions> = indices
                .iter()
                .map(|&i| self.variants[i].opts().clone())
                .collect();
            let action = build_action(&source, &opts_list, self.ledger.as_ref(), force);
            match self.engine.add(&action)? {
                Some(records) => {
                    for (&i, record) in indices.iter().zip(&records) {
                        let meta = self.engine.build_meta(record);
                        self.variants[i].set_meta(Some(meta));
                    }
                }
                None => {
                    for &i in &indices {
                        self.variants[i].invalidate();
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::inline::tests::{fixture, Fixture};
    use crate::engine::InlineEngine;
    use crate::hash;
    use crate::ledger::DbLedger;
    use crate::storage::DEFAULT_STORAGE;

    fn batch_for(fx: &Fixture) -> VariantBatch {
        let ledger: Arc<dyn Ledger> = Arc::new(DbLedger::new(
            fx.engine.records().clone(),
            Arc::new(crate::config::OutputConfig::default()),
        ));
        let engine: Arc<dyn Engine> = Arc::new(fx.engine.clone());
        VariantBatch::new(ledger, engine)
    }

    fn fit_opts() -> VariantOptions {
        VariantOptions::new().with("fit", (16u32, 16u32))
    }

    fn big_opts() -> VariantOptions {
        VariantOptions::new().with("fit", (32u32, 32u32))
    }

    #[test]
    fn test_resolve_pending_mixed_states() {
        let fx = fixture();
        fx.engine
            .generate_one("photos/src.png", &fit_opts(), false)
            .unwrap();

        let mut batch = batch_for(&fx);
        let generated = batch.add("photos/src.png", fit_opts());
        let missing = batch.add("photos/src.png", big_opts());
        batch.resolve_pending().unwrap();

        let resolved = batch.get(generated).unwrap();
        assert_eq!(resolved.state().meta().unwrap().width, Some(16));
        assert_eq!(
            batch.get(missing).unwrap().state(),
            &ResolveState::ConfirmedAbsent
        );
    }

    #[test]
    fn test_in_flight_variants_stay_unresolved() {
        let fx = fixture();
        let id = hash::record_id("photos/src.png", &fit_opts().canonical());
        fx.engine
            .records()
            .get_or_create(&id, DEFAULT_STORAGE, "photos/src.png", &fit_opts())
            .unwrap();
        fx.engine.records().claim(&id).unwrap();

        let mut batch = batch_for(&fx);
        let idx = batch.add("photos/src.png", fit_opts());
        batch.resolve_pending().unwrap();
        assert!(batch.get(idx).unwrap().state().is_unresolved());

        // The claim completes elsewhere; the next resolve picks it up.
        fx.engine.records().complete(&id, "gen/x.jpg", 16, 8).unwrap();
        batch.resolve_pending().unwrap();
        assert!(!batch.get(idx).unwrap().state().is_unresolved());
    }

    #[test]
    fn test_results_resolves_new_additions_only_once() {
        let fx = fixture();
        let mut batch = batch_for(&fx);
        batch.add("photos/src.png", fit_opts());
        assert_eq!(batch.results().unwrap().len(), 1);

        // No new variants: results() must not re-query.
        let before = batch.get(0).unwrap().state().clone();
        assert_eq!(batch.results().unwrap().len(), 1);
        assert_eq!(batch.get(0).unwrap().state(), &before);

        batch.add("photos/alpha.png", fit_opts());
        let states: Vec<_> = batch
            .results()
            .unwrap()
            .iter()
            .map(|v| v.state().clone())
            .collect();
        assert_eq!(states.len(), 2);
        assert!(states.iter().all(|s| !s.is_unresolved()));
    }

    #[test]
    fn test_generate_fills_missing_variants() {
        let fx = fixture();
        let mut batch = batch_for(&fx);
        let indices = batch.add_all("photos/src.png", &[fit_opts(), big_opts()]);
        batch.add("photos/alpha.png", fit_opts());
        batch.generate(false).unwrap();

        let results = batch.results().unwrap();
        assert_eq!(results.len(), 3);
        for variant in results {
            assert!(variant.state().meta().is_some());
        }
        assert_eq!(
            results[indices[0]].state().meta().unwrap().width,
            Some(16)
        );
        assert_eq!(
            results[indices[1]].state().meta().unwrap().width,
            Some(32)
        );
        assert!(results[2].state().meta().unwrap().transparent);
    }

    #[test]
    fn test_generate_skips_existing_without_force() {
        let fx = fixture();
        let first = fx
            .engine
            .generate_one("photos/src.png", &fit_opts(), false)
            .unwrap()
            .unwrap();

        let mut batch = batch_for(&fx);
        batch.add("photos/src.png", fit_opts());
        batch.generate(false).unwrap();

        let record = fx
            .engine
            .records()
            .get(&hash::record_id("photos/src.png", &fit_opts().canonical()))
            .unwrap()
            .unwrap();
        assert_eq!(record.started_generating, first.started_generating);
    }

    #[test]
    fn test_generate_force_reclaims() {
        let fx = fixture();
        let first = fx
            .engine
            .generate_one("photos/src.png", &fit_opts(), false)
            .unwrap()
            .unwrap();

        let mut batch = batch_for(&fx);
        batch.add("photos/src.png", fit_opts());
        batch.generate(true).unwrap();

        let record = fx
            .engine
            .records()
            .get(&hash::record_id("photos/src.png", &fit_opts().canonical()))
            .unwrap()
            .unwrap();
        assert!(record.started_generating >= first.started_generating);
        assert!(record.is_complete());
    }

    #[test]
    fn test_find_by_hash() {
        let fx = fixture();
        let mut batch = batch_for(&fx);
        batch.add("photos/src.png", fit_opts());
        batch.add("photos/alpha.png", fit_opts());

        let hash = batch.get(1).unwrap().hash().to_string();
        let found = batch.find(&hash).unwrap();
        assert_eq!(found.source(), "photos/alpha.png");
        assert!(batch.find("missing").is_none());
    }

    #[test]
    fn test_generate_skips_in_flight_without_force() {
        let fx = fixture();
        let id = hash::record_id("photos/src.png", &fit_opts().canonical());
        fx.engine
            .records()
            .get_or_create(&id, DEFAULT_STORAGE, "photos/src.png", &fit_opts())
            .unwrap();
        fx.engine.records().claim(&id).unwrap();

        let mut batch = batch_for(&fx);
        let idx = batch.add("photos/src.png", fit_opts());
        batch.generate(false).unwrap();

        // No action was issued: the claim holder still owns it and no
        // output appeared.
        let record = fx.engine.records().get(&id).unwrap().unwrap();
        assert!(!record.is_complete());
        assert!(batch.get(idx).unwrap().state().is_unresolved());
    }

    #[test]
    fn test_batch_with_trait_objects() {
        // The batch holds its collaborators as trait objects, so it
        // also works over the queueing engine.
        let fx = fixture();
        let queue = crate::store::ActionQueue::new(Arc::clone(&fx.db));
        let inline: InlineEngine = fx.engine.clone();
        let queued = crate::engine::QueuedEngine::new(inline, queue.clone());

        let ledger: Arc<dyn Ledger> = Arc::new(DbLedger::new(
            fx.engine.records().clone(),
            Arc::new(crate::config::OutputConfig::default()),
        ));
        let mut batch = VariantBatch::new(ledger, Arc::new(queued));
        let idx = batch.add("photos/src.png", fit_opts());
        batch.generate(false).unwrap();

        // Deferred: the action sits in the queue, the variant pending.
        assert_eq!(queue.len().unwrap(), 1);
        assert!(batch.get(idx).unwrap().state().is_unresolved());
    }
}
