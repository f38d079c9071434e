//! Variant option sets and their canonical text encoding.
//!
//! An option set maps option names to values. Lower-case keys are
//! *transform keys*: they change the pixel output and take part in
//! hashing. Upper-case keys are *control keys*: they steer naming and
//! routing (aliases, precomputed filenames, storage selection) and are
//! excluded from the canonical string.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::OptionsError;

/// Precomputed combined hash, attached when building queue actions.
pub const KEY: &str = "KEY";
/// Precomputed output filename (opaque variant).
pub const FILENAME: &str = "FILENAME";
/// Precomputed output filename for a transparent source.
pub const FILENAME_TRANSPARENT: &str = "FILENAME_TRANSPARENT";
/// Custom filename template rendered with the filename info.
pub const FILENAME_FORMAT: &str = "FILENAME_FORMAT";
/// Human-readable override for the hash portion of the filename.
pub const ALIAS: &str = "ALIAS";
/// Optional namespace prefix for `ALIAS`.
pub const ALIAS_APP_NAME: &str = "ALIAS_APP_NAME";
/// High-resolution multiplier (e.g. 2 for a @2x variant).
pub const HIGHRES: &str = "HIGHRES";
/// Logical storage backend override.
pub const STORAGE: &str = "STORAGE";

/// A single option value.
///
/// Lists must be flat lists of scalars; nesting is rejected at
/// construction so canonicalization can never fail later.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Bool(bool),
    Int(i64),
    Str(String),
    List(Vec<OptionValue>),
}

impl OptionValue {
    /// A `(width, height)` pair, the most common list value.
    pub fn size(width: u32, height: u32) -> Self {
        OptionValue::List(vec![
            OptionValue::Int(i64::from(width)),
            OptionValue::Int(i64::from(height)),
        ])
    }

    fn validate(&self, key: &str) -> Result<(), OptionsError> {
        if let OptionValue::List(items) = self {
            for item in items {
                if matches!(item, OptionValue::List(_)) {
                    return Err(OptionsError::NestedList {
                        key: key.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// The canonical token for a scalar value. `None` for `false`
    /// (dropped) and `Some("")` is never produced for valid values.
    fn token(&self) -> String {
        match self {
            OptionValue::Bool(b) => b.to_string(),
            OptionValue::Int(i) => i.to_string(),
            OptionValue::Str(s) => s.clone(),
            OptionValue::List(items) => {
                let parts: Vec<String> = items.iter().map(OptionValue::token).collect();
                parts.join(",")
            }
        }
    }
}

impl From<bool> for OptionValue {
    fn from(v: bool) -> Self {
        OptionValue::Bool(v)
    }
}

impl From<i64> for OptionValue {
    fn from(v: i64) -> Self {
        OptionValue::Int(v)
    }
}

impl From<u32> for OptionValue {
    fn from(v: u32) -> Self {
        OptionValue::Int(i64::from(v))
    }
}

impl From<&str> for OptionValue {
    fn from(v: &str) -> Self {
        OptionValue::Str(v.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(v: String) -> Self {
        OptionValue::Str(v)
    }
}

impl From<(u32, u32)> for OptionValue {
    fn from((w, h): (u32, u32)) -> Self {
        OptionValue::size(w, h)
    }
}

/// Whether a key is a control key (upper-case by convention).
pub fn is_control_key(key: &str) -> bool {
    key == key.to_uppercase()
}

/// An immutable-once-attached set of processing options.
///
/// Backed by a `BTreeMap` so iteration order is always the sorted key
/// order required by canonicalization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<String, OptionValue>")]
pub struct VariantOptions(BTreeMap<String, OptionValue>);

impl TryFrom<BTreeMap<String, OptionValue>> for VariantOptions {
    type Error = OptionsError;

    fn try_from(map: BTreeMap<String, OptionValue>) -> Result<Self, Self::Error> {
        for (key, value) in &map {
            value.validate(key)?;
        }
        Ok(VariantOptions(map))
    }
}

impl VariantOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a validated option. Builder-style for literals in tests
    /// and call sites.
    pub fn with(mut self, key: &str, value: impl Into<OptionValue>) -> Self {
        // Panics only on nested lists, which no `Into` conversion here
        // can produce.
        self.set(key, value.into())
            .unwrap_or_else(|e| panic!("invalid option: {e}"));
        self
    }

    /// Insert a validated option value.
    pub fn set(&mut self, key: &str, value: OptionValue) -> Result<(), OptionsError> {
        value.validate(key)?;
        self.0.insert(key.to_string(), value);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&OptionValue> {
        self.0.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &OptionValue)> {
        self.0.iter()
    }

    /// String value of a key, if it is a string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        match self.0.get(key) {
            Some(OptionValue::Str(s)) => Some(s),
            _ => None,
        }
    }

    /// Integer value of a key, if it is an integer.
    pub fn get_int(&self, key: &str) -> Option<i64> {
        match self.0.get(key) {
            Some(OptionValue::Int(i)) => Some(*i),
            _ => None,
        }
    }

    /// A `(width, height)` pair from a two-element integer list.
    pub fn get_size(&self, key: &str) -> Option<(u32, u32)> {
        match self.0.get(key) {
            Some(OptionValue::List(items)) if items.len() == 2 => {
                match (&items[0], &items[1]) {
                    (OptionValue::Int(w), OptionValue::Int(h)) if *w >= 0 && *h >= 0 => {
                        Some((*w as u32, *h as u32))
                    }
                    _ => None,
                }
            }
            _ => None,
        }
    }

    /// The high-resolution multiplier, if requested.
    pub fn highres(&self) -> Option<u32> {
        self.get_int(HIGHRES).and_then(|v| u32::try_from(v).ok())
    }

    /// The logical storage backend override, if any.
    pub fn storage_name(&self) -> Option<&str> {
        self.get_str(STORAGE)
    }

    /// The alias for the filename hash portion, namespaced when an
    /// app name is also set.
    pub fn alias(&self) -> Option<String> {
        let alias = self.get_str(ALIAS)?;
        match self.get_str(ALIAS_APP_NAME) {
            Some(app) => Some(format!("{app}-{alias}")),
            None => Some(alias.to_string()),
        }
    }

    /// The canonical, order-independent text encoding of the
    /// transform keys.
    ///
    /// Keys are iterated in sorted order; `true` contributes the bare
    /// key, `false` contributes nothing, lists join with `,`, other
    /// values append as `key-value`, and tokens join with `_`. Control
    /// keys never take part. An empty set canonicalizes to `""`.
    pub fn canonical(&self) -> String {
        let mut parts = Vec::new();
        for (key, value) in &self.0 {
            if is_control_key(key) {
                continue;
            }
            match value {
                OptionValue::Bool(false) => continue,
                OptionValue::Bool(true) => parts.push(key.clone()),
                other => parts.push(format!("{key}-{}", other.token())),
            }
        }
        parts.join("_")
    }
}

impl FromIterator<(String, OptionValue)> for VariantOptions {
    fn from_iter<T: IntoIterator<Item = (String, OptionValue)>>(iter: T) -> Self {
        let mut opts = VariantOptions::new();
        for (key, value) in iter {
            opts.set(&key, value)
                .unwrap_or_else(|e| panic!("invalid option: {e}"));
        }
        opts
    }
}
