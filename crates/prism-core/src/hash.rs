//! Content-addressed hashing for (source, options) pairs.
//!
//! Every hash flavor is the same primitive over different input text:
//! a 160-bit SHA-1 digest, base64url-encoded with the trailing `=`
//! padding stripped, which always yields exactly 27 characters. Record
//! ids truncate the digest to its first 16 bytes; the collision risk
//! of the truncation is accepted as cryptographically negligible.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use sha1::{Digest, Sha1};

/// Length of every encoded hash string.
pub const HASH_LEN: usize = 27;

/// Byte width of a truncated record id.
pub const RECORD_ID_LEN: usize = 16;

/// A truncated combined digest, used as the durable record key.
pub type RecordId = [u8; RECORD_ID_LEN];

fn digest(text: &str) -> [u8; 20] {
    let mut hasher = Sha1::new();
    hasher.update(text.as_bytes());
    hasher.finalize().into()
}

/// Hash arbitrary text into a 27-character url-safe string.
///
/// Deterministic across processes and machines: no randomness and no
/// locale dependence.
pub fn hash_text(text: &str) -> String {
    URL_SAFE_NO_PAD.encode(digest(text))
}

/// Hash of the source reference alone.
pub fn source_hash(source: &str) -> String {
    hash_text(source)
}

/// Hash of a canonical options string alone.
pub fn options_hash(canonical: &str) -> String {
    hash_text(canonical)
}

/// The combined hash identifying a generated variant: source and
/// canonical options joined with `:`.
pub fn combined_hash(source: &str, canonical: &str) -> String {
    hash_text(&combined_input(source, canonical))
}

/// The 128-bit record id for a (source, canonical options) pair.
pub fn record_id(source: &str, canonical: &str) -> RecordId {
    let full = digest(&combined_input(source, canonical));
    let mut id = [0u8; RECORD_ID_LEN];
    id.copy_from_slice(&full[..RECORD_ID_LEN]);
    id
}

/// Recover a record id from an encoded combined hash.
///
/// Returns `None` for strings that are not valid 27-character hashes.
pub fn record_id_from_hash(hash: &str) -> Option<RecordId> {
    let bytes = URL_SAFE_NO_PAD.decode(hash).ok()?;
    if bytes.len() != 20 {
        return None;
    }
    let mut id = [0u8; RECORD_ID_LEN];
    id.copy_from_slice(&bytes[..RECORD_ID_LEN]);
    Some(id)
}

fn combined_input(source: &str, canonical: &str) -> String {
    format!("{source}:{canonical}")
}
