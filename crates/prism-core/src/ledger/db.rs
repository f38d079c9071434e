//! The SQLite-backed default ledger.

use std::sync::Arc;

use super::{Ledger, LedgerKind};
use crate::config::OutputConfig;
use crate::error::Result;
use crate::hash;
use crate::options::VariantOptions;
use crate::store::RecordStore;
use crate::types::ImageMeta;

/// Ledger reading variant metadata out of the record store.
///
/// Its batched `meta_list` resolves any number of pairs with a single
/// prepared statement over one connection, which is the whole point of
/// the batch contract.
pub struct DbLedger {
    records: RecordStore,
    output: Arc<OutputConfig>,
}

impl DbLedger {
    pub fn new(records: RecordStore, output: Arc<OutputConfig>) -> Self {
        DbLedger { records, output }
    }

    fn id_for(source: &str, opts: &VariantOptions) -> crate::hash::RecordId {
        hash::record_id(source, &opts.canonical())
    }
}

impl Ledger for DbLedger {
    fn kind(&self) -> LedgerKind {
        LedgerKind::Db
    }

    fn opaque_extension(&self) -> &str {
        &self.output.opaque_extension
    }

    fn transparent_extension(&self) -> &str {
        &self.output.transparent_extension
    }

    fn highres_infix(&self) -> &str {
        &self.output.highres_infix
    }

    fn meta(&self, source: &str, opts: &VariantOptions) -> Result<Option<ImageMeta>> {
        let record = self.records.get(&Self::id_for(source, opts))?;
        Ok(record.and_then(|r| r.meta(self.transparent_extension())))
    }

    fn meta_list(
        &self,
        pairs: &[(String, VariantOptions)],
    ) -> Result<Vec<Option<ImageMeta>>> {
        let ids: Vec<_> = pairs
            .iter()
            .map(|(source, opts)| Self::id_for(source, opts))
            .collect();
        let records = self.records.get_many(&ids)?;
        Ok(records
            .into_iter()
            .map(|record| record.and_then(|r| r.meta(self.transparent_extension())))
            .collect())
    }
}
