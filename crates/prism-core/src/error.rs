//! Error types for the Prism variant-derivation engine.
//!
//! Two situations are deliberately *not* errors and never appear here:
//! a variant that does not exist yet (`None`), and a claim or dequeue
//! attempt that loses a race (`false` / empty). Callers treat both as
//! ordinary negative results.

use thiserror::Error;

/// Top-level error type for Prism operations.
#[derive(Error, Debug)]
pub enum PrismError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Option sets that cannot be canonicalized
    #[error("Malformed options: {0}")]
    Options(#[from] OptionsError),

    /// Record store / work queue errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Decode/scale/encode failures in the transform step
    #[error("Transform error: {0}")]
    Transform(#[from] TransformError),

    /// Storage backend I/O errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// General I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the config file from disk
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse TOML configuration
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Configuration values are invalid
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Option values that cannot be canonicalized.
///
/// These are programmer errors and are surfaced at the construction or
/// deserialization boundary, never retried.
#[derive(Error, Debug)]
pub enum OptionsError {
    /// List values must be flat lists of scalars
    #[error("Option {key:?} contains a nested list")]
    NestedList { key: String },

    /// A value that has no canonical text form
    #[error("Option {key:?} has an invalid value: {message}")]
    InvalidValue { key: String, message: String },
}

/// Errors from the durable record store and action queue.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Underlying SQLite error
    #[error("Database error: {0}")]
    Sql(#[from] rusqlite::Error),

    /// Filesystem errors creating or opening the database
    #[error("Database I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A queue row carried a payload that could not be decoded.
    /// The row has already been claimed (deleted) when this surfaces.
    #[error("Undecodable action payload in queue row {id}: {source}")]
    Payload {
        id: i64,
        #[source]
        source: serde_json::Error,
    },

    /// A stored timestamp failed to parse
    #[error("Corrupt timestamp in record: {0}")]
    Timestamp(String),

    /// A record's serialized option set failed to parse
    #[error("Corrupt options in record: {0}")]
    Args(String),
}

/// Errors from the opaque transform/encode step.
///
/// A failed transform leaves the claim marker set; regeneration
/// requires an explicit force.
#[derive(Error, Debug)]
pub enum TransformError {
    /// Source bytes could not be decoded as an image
    #[error("Decode error for {name}: {message}")]
    Decode { name: String, message: String },

    /// Encoding the processed image failed
    #[error("Encode error for {name}: {message}")]
    Encode { name: String, message: String },

    /// No encoder for the requested output extension
    #[error("Unsupported output extension: {ext}")]
    UnsupportedExtension { ext: String },
}

/// Storage backend errors.
#[derive(Error, Debug)]
pub enum StorageError {
    /// I/O failure reading or writing a named blob
    #[error("Storage I/O error for {name}: {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// A logical storage name with no configured backend
    #[error("Unknown storage backend: {0}")]
    UnknownBackend(String),
}

/// Convenience type alias for Prism results.
pub type Result<T> = std::result::Result<T, PrismError>;
