//! A single requested variant and its resolution lifecycle.
//!
//! A variant starts out unresolved. Resolution is explicit and
//! tri-state: either the generated output exists (with metadata), or
//! its absence has been confirmed, or nobody has asked yet. Callers
//! that batch lookups write results back in with [`Variant::set_meta`];
//! callers that don't can resolve lazily through [`Variant::meta`].

use std::cell::OnceCell;

use crate::engine::Engine;
use crate::error::Result;
use crate::hash;
use crate::ledger::Ledger;
use crate::options::VariantOptions;
use crate::types::ImageMeta;

/// What we currently know about a variant's existence.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum ResolveState {
    /// No lookup has happened yet.
    #[default]
    Unresolved,
    /// The variant exists; metadata decoded from the ledger.
    Resolved(ImageMeta),
    /// The ledger was asked and had nothing.
    ConfirmedAbsent,
}

impl ResolveState {
    pub fn is_unresolved(&self) -> bool {
        matches!(self, ResolveState::Unresolved)
    }

    pub fn meta(&self) -> Option<&ImageMeta> {
        match self {
            ResolveState::Resolved(meta) => Some(meta),
            _ => None,
        }
    }
}

/// One (source, options) pair moving through resolution and, when
/// needed, generation.
pub struct Variant {
    source: String,
    opts: VariantOptions,
    state: ResolveState,
    hash: OnceCell<String>,
}

impl Variant {
    pub fn new(source: &str, opts: VariantOptions) -> Self {
        Variant {
            source: source.to_string(),
            opts,
            state: ResolveState::Unresolved,
            hash: OnceCell::new(),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn opts(&self) -> &VariantOptions {
        &self.opts
    }

    pub fn state(&self) -> &ResolveState {
        &self.state
    }

    /// The combined hash identifying this variant, computed once.
    pub fn hash(&self) -> &str {
        self.hash
            .get_or_init(|| hash::combined_hash(&self.source, &self.opts.canonical()))
    }

    /// Record a lookup result: `Some` resolves, `None` confirms
    /// absence. Either way the variant stops being pending.
    pub fn set_meta(&mut self, meta: Option<ImageMeta>) {
        self.state = match meta {
            Some(meta) => ResolveState::Resolved(meta),
            None => ResolveState::ConfirmedAbsent,
        };
    }

    /// Forget the resolution result, forcing the next access to ask
    /// the ledger again. Called after generation changes the facts.
    pub fn invalidate(&mut self) {
        self.state = ResolveState::Unresolved;
    }

    /// Metadata for this variant, resolving through the ledger on
    /// first access. `None` means confirmed absent.
    pub fn meta(&mut self, ledger: &dyn Ledger) -> Result<Option<&ImageMeta>> {
        if self.state.is_unresolved() {
            let meta = ledger.meta(&self.source, &self.opts)?;
            self.set_meta(meta);
        }
        Ok(self.state.meta())
    }

    pub fn exists(&mut self, ledger: &dyn Ledger) -> Result<bool> {
        Ok(self.meta(ledger)?.is_some())
    }

    pub fn width(&mut self, ledger: &dyn Ledger) -> Result<Option<u32>> {
        Ok(self.meta(ledger)?.and_then(|m| m.width))
    }

    pub fn height(&mut self, ledger: &dyn Ledger) -> Result<Option<u32>> {
        Ok(self.meta(ledger)?.and_then(|m| m.height))
    }

    /// Whether a generation for this variant is currently in flight.
    pub fn processing(&self, engine: &dyn Engine) -> Result<bool> {
        engine.processing(self.hash())
    }

    /// The output filename this variant resolves to. Uses resolved
    /// metadata when present so no extra ledger lookup happens.
    pub fn filename(&self, ledger: &dyn Ledger) -> String {
        ledger.build_filename(&self.source, &self.opts, self.state.meta(), None)
    }

    /// The URL to serve for this variant right now.
    ///
    /// A missing variant is submitted for generation on the spot; if
    /// that completes synchronously the real URL comes back, otherwise
    /// the engine's processing URL (placeholder, or `source_url`) is
    /// served while the work happens elsewhere.
    pub fn url(
        &mut self,
        ledger: &dyn Ledger,
        engine: &dyn Engine,
        source_url: &str,
    ) -> Result<String> {
        if self.meta(ledger)?.is_none() {
            self.generate(ledger, engine, false)?;
        }
        if self.state.meta().is_some() {
            let name = self.filename(ledger);
            return Ok(engine.generated_storage(&self.opts)?.url(&name));
        }
        Ok(engine.processing_url(&self.source, &self.opts, source_url))
    }

    /// Generate this variant now.
    ///
    /// Returns `true` when generation completed synchronously (the
    /// state is then resolved from the fresh record), `false` when the
    /// engine deferred or lost the claim.
    pub fn generate(
        &mut self,
        ledger: &dyn Ledger,
        engine: &dyn Engine,
        force: bool,
    ) -> Result<bool> {
        let action =
            crate::action::build_action(&self.source, &[self.opts.clone()], ledger, force);
        match engine.add(&action)? {
            Some(records) => {
                let meta = records.first().map(|r| engine.build_meta(r));
                self.set_meta(meta);
                Ok(true)
            }
            None => {
                self.invalidate();
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::inline::tests::fixture;
    use crate::hash::HASH_LEN;
    use crate::ledger::tests::StubLedger;

    fn fit_opts() -> VariantOptions {
        VariantOptions::new().with("fit", (16u32, 16u32))
    }

    #[test]
    fn test_starts_unresolved() {
        let variant = Variant::new("a/b.jpg", fit_opts());
        assert!(variant.state().is_unresolved());
        assert_eq!(variant.hash().len(), HASH_LEN);
    }

    #[test]
    fn test_set_meta_resolves_and_confirms_absence() {
        let mut variant = Variant::new("a/b.jpg", fit_opts());
        variant.set_meta(Some(ImageMeta::transparent()));
        assert!(matches!(variant.state(), ResolveState::Resolved(_)));

        variant.set_meta(None);
        assert_eq!(variant.state(), &ResolveState::ConfirmedAbsent);
        assert!(!variant.state().is_unresolved());

        variant.invalidate();
        assert!(variant.state().is_unresolved());
    }

    #[test]
    fn test_meta_resolves_lazily_and_once() {
        let ledger = StubLedger::with_meta(".jpg", Some(ImageMeta::default()));
        let mut variant = Variant::new("a/b.jpg", fit_opts());
        assert!(variant.meta(&ledger).unwrap().is_some());
        assert!(variant.exists(&ledger).unwrap());
        assert_eq!(ledger.meta_calls(), 1);
    }

    #[test]
    fn test_confirmed_absence_is_not_requeried() {
        let ledger = StubLedger::with_meta(".jpg", None);
        let mut variant = Variant::new("a/b.jpg", fit_opts());
        assert!(!variant.exists(&ledger).unwrap());
        assert!(!variant.exists(&ledger).unwrap());
        assert_eq!(ledger.meta_calls(), 1);

        variant.invalidate();
        variant.exists(&ledger).unwrap();
        assert_eq!(ledger.meta_calls(), 2);
    }

    #[test]
    fn test_generate_resolves_state() {
        let fx = fixture();
        let mut variant = Variant::new("photos/src.png", fit_opts());
        assert!(variant.generate(&fx.ledger, &fx.engine, false).unwrap());

        assert_eq!(variant.width(&fx.ledger).unwrap(), Some(16));
        assert_eq!(variant.height(&fx.ledger).unwrap(), Some(8));
        assert!(!variant.processing(&fx.engine).unwrap());
    }

    #[test]
    fn test_generate_lost_claim_stays_pending() {
        let fx = fixture();
        let mut variant = Variant::new("photos/src.png", fit_opts());
        let id = hash::record_id("photos/src.png", &fit_opts().canonical());
        fx.engine
            .records()
            .get_or_create(&id, crate::storage::DEFAULT_STORAGE, "photos/src.png", &fit_opts())
            .unwrap();
        fx.engine.records().claim(&id).unwrap();

        assert!(!variant.generate(&fx.ledger, &fx.engine, false).unwrap());
        assert!(variant.state().is_unresolved());
        assert!(variant.processing(&fx.engine).unwrap());
    }

    #[test]
    fn test_url_generates_on_demand() {
        let fx = fixture();
        let mut variant = Variant::new("photos/src.png", fit_opts());
        let url = variant
            .url(&fx.ledger, &fx.engine, "/media/photos/src.png")
            .unwrap();
        assert_eq!(url, format!("/media/photos/{}.jpg", variant.hash()));
        assert!(variant.exists(&fx.ledger).unwrap());
    }

    #[test]
    fn test_url_in_flight_falls_back_to_source() {
        let fx = fixture();
        let mut variant = Variant::new("photos/src.png", fit_opts());
        let id = hash::record_id("photos/src.png", &fit_opts().canonical());
        fx.engine
            .records()
            .get_or_create(&id, crate::storage::DEFAULT_STORAGE, "photos/src.png", &fit_opts())
            .unwrap();
        fx.engine.records().claim(&id).unwrap();

        // Someone else holds the claim: serve the source while we wait.
        let url = variant
            .url(&fx.ledger, &fx.engine, "/media/photos/src.png")
            .unwrap();
        assert_eq!(url, "/media/photos/src.png");
    }

    #[test]
    fn test_filename_uses_resolved_meta() {
        let ledger = StubLedger::new(".jpg");
        let mut variant = Variant::new("a/b.gif", fit_opts());
        variant.set_meta(Some(ImageMeta::transparent()));
        assert!(variant.filename(&ledger).ends_with(".png"));
        // The resolved meta answered the extension question.
        assert_eq!(ledger.meta_calls(), 0);
    }
}
