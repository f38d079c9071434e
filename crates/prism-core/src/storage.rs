//! Storage backends for source images and generated output.
//!
//! Backends are addressed by logical name through a registry, so one
//! deployment can route different applications (or the generated
//! output itself) to different roots.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::StorageError;

/// The registry name used when nothing more specific applies.
pub const DEFAULT_STORAGE: &str = "default";

/// The preferred backend name for generated output, when configured.
pub const GENERATED_STORAGE: &str = "generated";

/// A blob store addressed by relative names.
pub trait Storage: Send + Sync {
    /// Read a blob in full.
    fn open(&self, name: &str) -> Result<Vec<u8>, StorageError>;

    /// Write a blob, returning the name it was stored under.
    fn save(&self, name: &str, data: &[u8]) -> Result<String, StorageError>;

    /// Public URL for a stored blob.
    fn url(&self, name: &str) -> String;

    fn exists(&self, name: &str) -> bool;
}

/// Filesystem-backed storage rooted at a directory.
pub struct FsStorage {
    root: PathBuf,
    base_url: String,
}

impl FsStorage {
    pub fn new(root: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        FsStorage {
            root: root.into(),
            base_url: base_url.into(),
        }
    }

    fn resolve(&self, name: &str) -> PathBuf {
        // Keep names inside the root: strip any leading slashes and
        // parent-dir segments.
        let clean: PathBuf = Path::new(name)
            .components()
            .filter(|c| matches!(c, std::path::Component::Normal(_)))
            .collect();
        self.root.join(clean)
    }
}

impl Storage for FsStorage {
    fn open(&self, name: &str) -> Result<Vec<u8>, StorageError> {
        fs::read(self.resolve(name)).map_err(|source| StorageError::Io {
            name: name.to_string(),
            source,
        })
    }

    fn save(&self, name: &str, data: &[u8]) -> Result<String, StorageError> {
        let path = self.resolve(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| StorageError::Io {
                name: name.to_string(),
                source,
            })?;
        }
        fs::write(&path, data).map_err(|source| StorageError::Io {
            name: name.to_string(),
            source,
        })?;
        Ok(name.to_string())
    }

    fn url(&self, name: &str) -> String {
        format!("{}{}", self.base_url, name)
    }

    fn exists(&self, name: &str) -> bool {
        self.resolve(name).exists()
    }
}

/// Named storage backends for a deployment.
pub struct StorageRegistry {
    backends: HashMap<String, Arc<dyn Storage>>,
}

impl StorageRegistry {
    pub fn new() -> Self {
        StorageRegistry {
            backends: HashMap::new(),
        }
    }

    pub fn insert(&mut self, name: &str, storage: Arc<dyn Storage>) {
        self.backends.insert(name.to_string(), storage);
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Storage>, StorageError> {
        self.backends
            .get(name)
            .cloned()
            .ok_or_else(|| StorageError::UnknownBackend(name.to_string()))
    }

    /// The backend for `name`, falling back to the default.
    pub fn get_or_default(&self, name: Option<&str>) -> Result<Arc<dyn Storage>, StorageError> {
        match name {
            Some(name) => self.get(name),
            None => self.get(DEFAULT_STORAGE),
        }
    }

    /// The backend generated output lands in: an explicit override,
    /// else the `generated` backend when configured, else the default.
    pub fn generated(&self, name: Option<&str>) -> Result<Arc<dyn Storage>, StorageError> {
        if let Some(name) = name {
            return self.get(name);
        }
        if let Ok(storage) = self.get(GENERATED_STORAGE) {
            return Ok(storage);
        }
        self.get(DEFAULT_STORAGE)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.backends.keys().map(String::as_str)
    }
}

impl Default for StorageRegistry {
    fn default() -> Self {
        Self::new()
    }
}
