//! The ledger: mapping (source, options) pairs to filenames and
//! metadata.
//!
//! A ledger is pure/query-only. It never performs transforms; it asks
//! collaborators for format decisions and reads generation results
//! back out of durable storage. Implementations may vary naming policy
//! but all expose the same capability set.

mod db;

pub use db::DbLedger;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::filename::FilenameInfo;
use crate::options::{VariantOptions, FILENAME_FORMAT};
use crate::types::ImageMeta;

/// Stable identifiers for the known ledger implementations.
///
/// Serialized into queued actions so workers can resolve the right
/// ledger through a lookup table instead of dynamic name resolution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerKind {
    /// The SQLite-backed default ledger.
    #[default]
    Db,
}

impl LedgerKind {
    pub fn as_str(self) -> &'static str {
        match self {
            LedgerKind::Db => "db",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "db" => Some(LedgerKind::Db),
            _ => None,
        }
    }
}

/// The ledger contract.
pub trait Ledger: Send + Sync {
    /// The registry identifier of this implementation.
    fn kind(&self) -> LedgerKind;

    /// Decoded metadata for an already-generated variant, or `None`
    /// if it does not exist. Idempotent and side-effect free.
    fn meta(&self, source: &str, opts: &VariantOptions) -> Result<Option<ImageMeta>>;

    /// Batched form of [`meta`](Ledger::meta).
    ///
    /// Always returns exactly one result per input, in input order,
    /// with `None` for missing entries. The default maps `meta` over
    /// the list; implementations exist to do better.
    fn meta_list(
        &self,
        pairs: &[(String, VariantOptions)],
    ) -> Result<Vec<Option<ImageMeta>>> {
        pairs
            .iter()
            .map(|(source, opts)| self.meta(source, opts))
            .collect()
    }

    /// Construct filename info, or return the supplied one unchanged.
    fn filename_info(
        &self,
        source: &str,
        opts: &VariantOptions,
        precomputed: Option<FilenameInfo>,
    ) -> FilenameInfo {
        precomputed.unwrap_or_else(|| FilenameInfo::new(source, opts))
    }

    /// The extension used for opaque output.
    fn opaque_extension(&self) -> &str {
        ".jpg"
    }

    /// The extension used for transparent output.
    fn transparent_extension(&self) -> &str {
        ".png"
    }

    /// Infix template applied before the extension for high-resolution
    /// variants; `{highres}` is replaced with the multiplier.
    fn highres_infix(&self) -> &str {
        "@{highres}x"
    }

    /// Decide the output extension.
    ///
    /// Primarily driven by source transparency: transparent sources
    /// keep an alpha-capable extension, everything else gets the
    /// opaque default. When `meta` is not supplied it is fetched once
    /// via [`meta`](Ledger::meta); a fetch failure falls back to the
    /// opaque extension after logging.
    fn output_extension(
        &self,
        meta: Option<&ImageMeta>,
        source: &str,
        opts: &VariantOptions,
    ) -> String {
        let fetched;
        let meta = match meta {
            Some(meta) => Some(meta),
            None => {
                fetched = self.meta(source, opts).unwrap_or_else(|e| {
                    tracing::warn!("meta lookup failed for {source}: {e}");
                    None
                });
                fetched.as_ref()
            }
        };
        if meta.is_some_and(|m| m.transparent) {
            self.transparent_extension().to_string()
        } else {
            self.opaque_extension().to_string()
        }
    }

    /// Assemble the output filename: `{src_dir}{alias-or-hash}{ext}`,
    /// unless the options carry a `FILENAME_FORMAT` template, which is
    /// then rendered with the filename info as context.
    fn build_filename(
        &self,
        source: &str,
        opts: &VariantOptions,
        meta: Option<&ImageMeta>,
        processed_ext: Option<&str>,
    ) -> String {
        let info = FilenameInfo::with_parts(
            source,
            opts,
            meta.cloned(),
            processed_ext.map(str::to_string),
        );
        if let Some(template) = opts.get_str(FILENAME_FORMAT) {
            return render_template(template, &info, self);
        }
        format!("{}{}{}", info.src_dir(), info.alias_or_hash(), info.ext(self))
    }
}

/// Render a `FILENAME_FORMAT` template.
///
/// Tokens may be written bare (`{hash}`) or prefixed (`{info.hash}`).
/// Supported: `src_dir`, `src_name`, `src_ext`, `hash`, `src_hash`,
/// `opts_hash`, `alias`, `ext`, `unique_ext`.
pub fn render_template<L: Ledger + ?Sized>(
    template: &str,
    info: &FilenameInfo,
    ledger: &L,
) -> String {
    fn wants(out: &str, token: &str) -> bool {
        out.contains(&format!("{{{token}}}")) || out.contains(&format!("{{info.{token}}}"))
    }
    fn substitute(out: String, token: &str, value: &str) -> String {
        out.replace(&format!("{{{token}}}"), value)
            .replace(&format!("{{info.{token}}}"), value)
    }

    let mut out = template.to_string();
    let simple: [(&str, String); 7] = [
        ("src_dir", info.src_dir()),
        ("src_name", info.src_name().to_string()),
        ("src_ext", info.src_ext().to_string()),
        ("hash", info.hash().to_string()),
        ("src_hash", info.src_hash()),
        ("opts_hash", info.opts_hash()),
        ("alias", info.alias_or_hash()),
    ];
    for (token, value) in simple {
        if wants(&out, token) {
            out = substitute(out, token, &value);
        }
    }
    // Extension tokens last: they may trigger the one cached meta fetch.
    if wants(&out, "ext") {
        out = substitute(out, "ext", info.ext(ledger));
    }
    if wants(&out, "unique_ext") {
        out = substitute(out, "unique_ext", info.unique_ext(ledger));
    }
    out
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::options::{ALIAS, FILENAME_FORMAT};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counting ledger stub shared by the ledger and filename tests.
    pub(crate) struct StubLedger {
        opaque_ext: String,
        meta_result: Option<ImageMeta>,
        meta_calls: AtomicUsize,
    }

    impl StubLedger {
        pub(crate) fn new(opaque_ext: &str) -> Self {
            StubLedger {
                opaque_ext: opaque_ext.to_string(),
                meta_result: Some(ImageMeta::default()),
                meta_calls: AtomicUsize::new(0),
            }
        }

        pub(crate) fn with_meta(opaque_ext: &str, meta: Option<ImageMeta>) -> Self {
            StubLedger {
                opaque_ext: opaque_ext.to_string(),
                meta_result: meta,
                meta_calls: AtomicUsize::new(0),
            }
        }

        pub(crate) fn meta_calls(&self) -> usize {
            self.meta_calls.load(Ordering::SeqCst)
        }
    }

    impl Ledger for StubLedger {
        fn kind(&self) -> LedgerKind {
            LedgerKind::Db
        }

        fn opaque_extension(&self) -> &str {
            &self.opaque_ext
        }

        fn meta(&self, _source: &str, _opts: &VariantOptions) -> Result<Option<ImageMeta>> {
            self.meta_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.meta_result.clone())
        }
    }

    fn fit_opts() -> VariantOptions {
        VariantOptions::new().with("fit", (128u32, 128u32))
    }

    #[test]
    fn test_output_extension_default() {
        let ledger = StubLedger::new(".jpg");
        let ext = ledger.output_extension(
            Some(&ImageMeta::default()),
            "gallery/fake.gif",
            &fit_opts(),
        );
        assert_eq!(ext, ".jpg");
    }

    #[test]
    fn test_output_extension_transparent() {
        let ledger = StubLedger::new(".jpg");
        let ext = ledger.output_extension(
            Some(&ImageMeta::transparent()),
            "gallery/fake.gif",
            &fit_opts(),
        );
        assert_eq!(ext, ".png");
    }

    #[test]
    fn test_output_extension_supplied_meta_skips_lookup() {
        let ledger = StubLedger::new(".jpg");
        ledger.output_extension(Some(&ImageMeta::default()), "gallery/fake.gif", &fit_opts());
        assert_eq!(ledger.meta_calls(), 0);
    }

    #[test]
    fn test_output_extension_lazy_lookup() {
        let ledger = StubLedger::with_meta(".jpg", Some(ImageMeta::transparent()));
        let ext = ledger.output_extension(None, "a/b.gif", &fit_opts());
        assert_eq!(ext, ".png");
        assert_eq!(ledger.meta_calls(), 1);
    }

    #[test]
    fn test_output_extension_absent_meta_is_opaque() {
        let ledger = StubLedger::with_meta(".jpg", None);
        let ext = ledger.output_extension(None, "a/b.gif", &fit_opts());
        assert_eq!(ext, ".jpg");
    }

    #[test]
    fn test_build_filename_default() {
        let ledger = StubLedger::new(".ext");
        let source = "adir/fake.gif";
        let filename = ledger.build_filename(source, &fit_opts(), None, None);
        let info = FilenameInfo::new(source, &fit_opts());
        assert_eq!(filename, format!("adir/{}.ext", info.hash()));
    }

    #[test]
    fn test_build_filename_alias() {
        let ledger = StubLedger::new(".ext");
        let opts = fit_opts().with(ALIAS, "hero");
        let filename = ledger.build_filename("adir/fake.gif", &opts, None, None);
        assert_eq!(filename, "adir/hero.ext");
    }

    #[test]
    fn test_build_filename_custom_template() {
        let ledger = StubLedger::new(".ext");
        let opts = fit_opts().with(FILENAME_FORMAT, "{hash}{ext}");
        let filename = ledger.build_filename("adir/fake.gif", &opts, None, None);
        let info = FilenameInfo::new("adir/fake.gif", &fit_opts());
        // Directory omitted by the template.
        assert_eq!(filename, format!("{}.ext", info.hash()));
    }

    #[test]
    fn test_build_filename_prefixed_tokens() {
        let ledger = StubLedger::new(".ext");
        let opts = fit_opts().with(FILENAME_FORMAT, "{info.hash}{info.ext}");
        let filename = ledger.build_filename("adir/fake.gif", &opts, None, None);
        let info = FilenameInfo::new("adir/fake.gif", &fit_opts());
        assert_eq!(filename, format!("{}.ext", info.hash()));
    }

    #[test]
    fn test_build_filename_template_tokens() {
        let ledger = StubLedger::new(".ext");
        let opts = fit_opts().with(FILENAME_FORMAT, "{src_dir}{src_name}-{opts_hash}{ext}");
        let filename = ledger.build_filename("adir/fake.gif", &opts, None, None);
        let info = FilenameInfo::new("adir/fake.gif", &fit_opts());
        assert_eq!(filename, format!("adir/fake-{}.ext", info.opts_hash()));
    }

    #[test]
    fn test_build_filename_processed_ext() {
        let ledger = StubLedger::new(".jpg");
        let filename =
            ledger.build_filename("adir/fake.gif", &fit_opts(), None, Some(".png"));
        assert!(filename.ends_with(".png"));
        assert_eq!(ledger.meta_calls(), 0);
    }

    #[test]
    fn test_meta_list_preserves_order_and_arity() {
        let ledger = StubLedger::with_meta(".jpg", None);
        let pairs = vec![
            ("a/1.jpg".to_string(), fit_opts()),
            ("b/2.jpg".to_string(), fit_opts()),
            ("c/3.jpg".to_string(), fit_opts()),
        ];
        let metas = ledger.meta_list(&pairs).unwrap();
        assert_eq!(metas.len(), 3);
        assert!(metas.iter().all(Option::is_none));
        assert_eq!(ledger.meta_calls(), 3);
    }

    #[test]
    fn test_filename_info_short_circuit() {
        let ledger = StubLedger::new(".jpg");
        let supplied = FilenameInfo::new("x/y.jpg", &fit_opts());
        let hash = supplied.hash().to_string();
        let info = ledger.filename_info("other/z.jpg", &fit_opts(), Some(supplied));
        assert_eq!(info.hash(), hash);
        assert_eq!(info.source(), "x/y.jpg");
    }

    #[test]
    fn test_ledger_kind_registry() {
        assert_eq!(LedgerKind::parse("db"), Some(LedgerKind::Db));
        assert_eq!(LedgerKind::parse("nope"), None);
        assert_eq!(LedgerKind::Db.as_str(), "db");
        let json = serde_json::to_string(&LedgerKind::Db).unwrap();
        assert_eq!(json, "\"db\"");
    }
}
