//! Variant record rows and the claim-once generation protocol.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use std::sync::Arc;

use super::Database;
use crate::error::StoreError;
use crate::hash::RecordId;
use crate::options::VariantOptions;
use crate::types::ImageMeta;

/// A durable record for one generated variant, keyed by the truncated
/// combined hash.
///
/// Lifecycle: inserted unclaimed the first time any caller resolves
/// the hash, claimed when a generator sets `started_generating`, and
/// complete once `image` points at the stored output blob.
#[derive(Debug, Clone)]
pub struct VariantRecord {
    pub id: RecordId,
    pub created_at: DateTime<Utc>,
    pub started_generating: Option<DateTime<Utc>>,
    /// Logical storage backend holding the source
    pub storage: String,
    /// Source name within that backend
    pub name: String,
    /// The option set this variant was requested with
    pub args: VariantOptions,
    /// Stored output blob name, set on completion
    pub image: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl VariantRecord {
    pub fn is_complete(&self) -> bool {
        self.image.is_some()
    }

    /// Claimed but not yet complete.
    pub fn is_processing(&self) -> bool {
        self.started_generating.is_some() && self.image.is_none()
    }

    /// Project a complete record into the ledger's metadata shape.
    /// `None` until the output blob exists.
    pub fn meta(&self, transparent_ext: &str) -> Option<ImageMeta> {
        let image = self.image.as_deref()?;
        let ext = image.rfind('.').map(|i| &image[i..]).unwrap_or("");
        Some(ImageMeta {
            width: self.width,
            height: self.height,
            transparent: ext == transparent_ext,
            mime: crate::types::mime_for_extension(ext).map(String::from),
        })
    }
}

fn parse_ts(text: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Timestamp(format!("{text}: {e}")))
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<(Vec<u8>, String, Option<String>, String, String, String, Option<String>, Option<u32>, Option<u32>)> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
    ))
}

fn build_record(
    raw: (Vec<u8>, String, Option<String>, String, String, String, Option<String>, Option<u32>, Option<u32>),
) -> Result<VariantRecord, StoreError> {
    let (id_bytes, created, started, storage, name, args, image, width, height) = raw;
    let id: RecordId = id_bytes
        .try_into()
        .map_err(|_| StoreError::Args("record id is not 16 bytes".to_string()))?;
    Ok(VariantRecord {
        id,
        created_at: parse_ts(&created)?,
        started_generating: started.as_deref().map(parse_ts).transpose()?,
        storage,
        name,
        args: serde_json::from_str(&args).map_err(|e| StoreError::Args(e.to_string()))?,
        image,
        width,
        height,
    })
}

const SELECT_COLS: &str =
    "id, created_at, started_generating, storage, name, args, image, width, height";

/// Store for variant records.
#[derive(Clone)]
pub struct RecordStore {
    db: Arc<Database>,
}

impl RecordStore {
    pub fn new(db: Arc<Database>) -> Self {
        RecordStore { db }
    }

    /// Fetch a record by id.
    pub fn get(&self, id: &RecordId) -> Result<Option<VariantRecord>, StoreError> {
        let raw = self.db.with(|conn| {
            conn.query_row(
                &format!("SELECT {SELECT_COLS} FROM variant_records WHERE id = ?1"),
                params![id.as_slice()],
                record_from_row,
            )
            .optional()
        })?;
        raw.map(build_record).transpose()
    }

    /// Fetch many records, one result per input id, in input order.
    pub fn get_many(&self, ids: &[RecordId]) -> Result<Vec<Option<VariantRecord>>, StoreError> {
        let rows = self.db.with(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SELECT_COLS} FROM variant_records WHERE id = ?1"
            ))?;
            let mut out = Vec::with_capacity(ids.len());
            for id in ids {
                out.push(
                    stmt.query_row(params![id.as_slice()], record_from_row)
                        .optional()?,
                );
            }
            Ok(out)
        })?;
        rows.into_iter()
            .map(|raw| raw.map(build_record).transpose())
            .collect()
    }

    /// Insert an unclaimed record if none exists, then return the
    /// current row.
    pub fn get_or_create(
        &self,
        id: &RecordId,
        storage: &str,
        name: &str,
        args: &VariantOptions,
    ) -> Result<VariantRecord, StoreError> {
        let created = Utc::now().to_rfc3339();
        let args_json = serde_json::to_string(args)
            .map_err(|e| StoreError::Args(e.to_string()))?;
        self.db.with(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO variant_records
                 (id, created_at, storage, name, args) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id.as_slice(), created, storage, name, args_json],
            )
        })?;
        self.get(id)?.ok_or_else(|| {
            StoreError::Args("record vanished between insert and fetch".to_string())
        })
    }

    /// Attempt to claim generation of a variant.
    ///
    /// The conditional update succeeds only when the claim marker is
    /// unset; a `false` return means another actor holds the claim
    /// (or the variant is already complete) and the caller must back
    /// off.
    pub fn claim(&self, id: &RecordId) -> Result<bool, StoreError> {
        let now = Utc::now().to_rfc3339();
        let n = self.db.with(|conn| {
            conn.execute(
                "UPDATE variant_records SET started_generating = ?1
                 WHERE id = ?2 AND started_generating IS NULL",
                params![now, id.as_slice()],
            )
        })?;
        Ok(n == 1)
    }

    /// Unconditionally reset the claim marker to now.
    ///
    /// The only recovery path for a claimed-but-never-completed
    /// generation; there is no automatic timeout or requeue.
    pub fn force_claim(&self, id: &RecordId) -> Result<bool, StoreError> {
        let now = Utc::now().to_rfc3339();
        let n = self.db.with(|conn| {
            conn.execute(
                "UPDATE variant_records SET started_generating = ?1 WHERE id = ?2",
                params![now, id.as_slice()],
            )
        })?;
        Ok(n == 1)
    }

    /// Record a finished generation.
    pub fn complete(
        &self,
        id: &RecordId,
        image: &str,
        width: u32,
        height: u32,
    ) -> Result<(), StoreError> {
        self.db.with(|conn| {
            conn.execute(
                "UPDATE variant_records SET image = ?1, width = ?2, height = ?3
                 WHERE id = ?4",
                params![image, width, height, id.as_slice()],
            )
        })?;
        Ok(())
    }

    /// Whether a generation is currently in flight for this id.
    pub fn processing(&self, id: &RecordId) -> Result<bool, StoreError> {
        let n: i64 = self.db.with(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM variant_records
                 WHERE id = ?1 AND started_generating IS NOT NULL AND image IS NULL",
                params![id.as_slice()],
                |row| row.get(0),
            )
        })?;
        Ok(n == 1)
    }

    /// Batched, order-preserving form of [`processing`](Self::processing).
    pub fn processing_many(&self, ids: &[RecordId]) -> Result<Vec<bool>, StoreError> {
        self.db.with(|conn| {
            let mut stmt = conn.prepare(
                "SELECT COUNT(*) FROM variant_records
                 WHERE id = ?1 AND started_generating IS NOT NULL AND image IS NULL",
            )?;
            let mut out = Vec::with_capacity(ids.len());
            for id in ids {
                let n: i64 = stmt.query_row(params![id.as_slice()], |row| row.get(0))?;
                out.push(n == 1);
            }
            Ok(out)
        })
    }

    /// Records claimed before `cutoff` that never completed.
    /// Surfaced for operators; Prism never requeues them itself.
    pub fn stale_claims(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<VariantRecord>, StoreError> {
        let raws = self.db.with(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SELECT_COLS} FROM variant_records
                 WHERE started_generating IS NOT NULL
                   AND started_generating < ?1
                   AND image IS NULL
                 ORDER BY started_generating"
            ))?;
            let rows = stmt.query_map(params![cutoff.to_rfc3339()], record_from_row)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
        })?;
        raws.into_iter().map(build_record).collect()
    }

    /// (total, complete, processing) counts for status reporting.
    pub fn counts(&self) -> Result<(usize, usize, usize), StoreError> {
        self.db.with(|conn| {
            let total: i64 =
                conn.query_row("SELECT COUNT(*) FROM variant_records", [], |r| r.get(0))?;
            let complete: i64 = conn.query_row(
                "SELECT COUNT(*) FROM variant_records WHERE image IS NOT NULL",
                [],
                |r| r.get(0),
            )?;
            let processing: i64 = conn.query_row(
                "SELECT COUNT(*) FROM variant_records
                 WHERE started_generating IS NOT NULL AND image IS NULL",
                [],
                |r| r.get(0),
            )?;
            Ok((total as usize, complete as usize, processing as usize))
        })
    }
}
