//! Derived filename information for a (source, options) pair.
//!
//! Every field is a pure function of the inputs; two instances built
//! from equal pairs always agree. The one collaborator-dependent
//! decision (does this variant need a transparent extension) is asked
//! of the ledger at most once and cached for the life of the instance.

use std::cell::OnceCell;

use crate::hash;
use crate::ledger::Ledger;
use crate::options::VariantOptions;
use crate::types::ImageMeta;

/// Cached-on-first-access view of the naming-relevant facts about a
/// (source, options) pair.
pub struct FilenameInfo {
    source: String,
    opts: VariantOptions,
    meta: Option<ImageMeta>,
    processed_ext: Option<String>,
    canonical: OnceCell<String>,
    combined: OnceCell<String>,
    ext: OnceCell<String>,
}

impl FilenameInfo {
    pub fn new(source: &str, opts: &VariantOptions) -> Self {
        Self::with_parts(source, opts, None, None)
    }

    /// Construct with already-known metadata and/or a predetermined
    /// output extension, short-circuiting the ledger lookup.
    pub fn with_parts(
        source: &str,
        opts: &VariantOptions,
        meta: Option<ImageMeta>,
        processed_ext: Option<String>,
    ) -> Self {
        FilenameInfo {
            source: source.to_string(),
            opts: opts.clone(),
            meta,
            processed_ext,
            canonical: OnceCell::new(),
            combined: OnceCell::new(),
            ext: OnceCell::new(),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn opts(&self) -> &VariantOptions {
        &self.opts
    }

    /// The relative directory of the source, with a trailing slash
    /// when non-empty.
    pub fn src_dir(&self) -> String {
        match self.source.rsplit_once('/') {
            Some((dir, _)) if !dir.is_empty() => format!("{dir}/"),
            _ => String::new(),
        }
    }

    /// The source basename without its extension.
    pub fn src_name(&self) -> &str {
        let base = self
            .source
            .rsplit_once('/')
            .map_or(self.source.as_str(), |(_, name)| name);
        match base.rfind('.') {
            Some(idx) if idx > 0 => &base[..idx],
            _ => base,
        }
    }

    /// The source extension including the dot, or `""`.
    pub fn src_ext(&self) -> &str {
        let base = self
            .source
            .rsplit_once('/')
            .map_or(self.source.as_str(), |(_, name)| name);
        match base.rfind('.') {
            Some(idx) if idx > 0 => &base[idx..],
            _ => "",
        }
    }

    /// Canonical options string, computed once per instance.
    pub fn canonical_opts(&self) -> &str {
        self.canonical.get_or_init(|| self.opts.canonical())
    }

    /// 27-character hash of the source path.
    pub fn src_hash(&self) -> String {
        hash::source_hash(&self.source)
    }

    /// 27-character hash of the canonical options string.
    pub fn opts_hash(&self) -> String {
        hash::options_hash(self.canonical_opts())
    }

    /// The combined hash: the canonical identity of this variant.
    pub fn hash(&self) -> &str {
        self.combined
            .get_or_init(|| hash::combined_hash(&self.source, self.canonical_opts()))
    }

    /// The alias (namespaced if an app name is set), falling back to
    /// the combined hash. This is the hash portion of the default
    /// filename.
    pub fn alias_or_hash(&self) -> String {
        match self.opts.alias() {
            Some(alias) => alias,
            None => self.hash().to_string(),
        }
    }

    /// The output extension, including any highres infix.
    ///
    /// Resolution order: the predetermined extension if one was
    /// supplied, else the ledger's decision from the supplied or
    /// lazily-fetched metadata. Computed at most once.
    pub fn ext<L: Ledger + ?Sized>(&self, ledger: &L) -> &str {
        self.ext.get_or_init(|| {
            let base = match &self.processed_ext {
                Some(ext) => ext.clone(),
                None => {
                    ledger.output_extension(self.meta.as_ref(), &self.source, &self.opts)
                }
            };
            match self.opts.highres() {
                Some(factor) => {
                    let infix = ledger
                        .highres_infix()
                        .replace("{highres}", &factor.to_string());
                    format!("{infix}{base}")
                }
                None => base,
            }
        })
    }

    /// The output extension, unless identical to the source extension
    /// (in which case `""`).
    pub fn unique_ext<L: Ledger + ?Sized>(&self, ledger: &L) -> &str {
        let ext = self.ext(ledger);
        if ext == self.src_ext() {
            ""
        } else {
            ext
        }
    }
}
