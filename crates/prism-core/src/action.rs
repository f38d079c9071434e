//! Queued generation work units.
//!
//! An action covers one source and every variant of it that needs
//! generating. Option sets are annotated up front with their combined
//! hash and output filename(s) so a worker never recomputes naming
//! decisions made at request time.

use serde::{Deserialize, Serialize};

use crate::ledger::{Ledger, LedgerKind};
use crate::options::{
    OptionValue, VariantOptions, FILENAME, FILENAME_TRANSPARENT, KEY,
};
use crate::types::ImageMeta;

/// A unit of queued generation work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    /// Source path/key within its storage backend
    pub source: String,

    /// One annotated option set per requested variant, in request order
    pub opts: Vec<VariantOptions>,

    /// Ledger to resolve naming through, when not the default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ledger: Option<LedgerKind>,

    /// Regenerate even where output already exists
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub force: bool,
}

/// Build an action for `source`, annotating each option set with its
/// precomputed `KEY` and `FILENAME` (plus `FILENAME_TRANSPARENT` when
/// the transparent extension differs from the opaque one).
pub fn build_action(
    source: &str,
    opts_list: &[VariantOptions],
    ledger: &dyn Ledger,
    force: bool,
) -> Action {
    let kind = ledger.kind();
    let mut annotated = Vec::with_capacity(opts_list.len());
    for opts in opts_list {
        let mut opts = opts.clone();
        if !opts.contains(KEY) {
            let info = ledger.filename_info(source, &opts, None);
            let _ = opts.set(KEY, OptionValue::Str(info.hash().to_string()));
        }
        if !opts.contains(FILENAME) {
            let opaque_ext =
                ledger.output_extension(Some(&ImageMeta::default()), source, &opts);
            let filename = ledger.build_filename(source, &opts, None, Some(&opaque_ext));
            let _ = opts.set(FILENAME, OptionValue::Str(filename));

            let transparent_ext =
                ledger.output_extension(Some(&ImageMeta::transparent()), source, &opts);
            if transparent_ext != opaque_ext {
                let filename =
                    ledger.build_filename(source, &opts, None, Some(&transparent_ext));
                let _ = opts.set(FILENAME_TRANSPARENT, OptionValue::Str(filename));
            }
        }
        annotated.push(opts);
    }
    Action {
        source: source.to_string(),
        opts: annotated,
        ledger: (kind != LedgerKind::default()).then_some(kind),
        force,
    }
}
