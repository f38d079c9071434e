//! Shared data types for the variant coordination layer.

use serde::{Deserialize, Serialize};

/// Decoded metadata for a generated variant.
///
/// `ImageMeta::default()` is the "empty meta" shape: nothing known,
/// assumed opaque.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageMeta {
    /// Pixel width, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,

    /// Pixel height, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,

    /// Whether the output carries transparency
    #[serde(default)]
    pub transparent: bool,

    /// Output mime type, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime: Option<String>,
}

impl ImageMeta {
    /// Meta asserting only transparency, used for extension decisions.
    pub fn transparent() -> Self {
        ImageMeta {
            transparent: true,
            ..Default::default()
        }
    }
}

/// Mime type for a known output extension.
pub fn mime_for_extension(ext: &str) -> Option<&'static str> {
    match ext {
        ".jpg" | ".jpeg" => Some("image/jpeg"),
        ".png" => Some("image/png"),
        ".webp" => Some("image/webp"),
        ".gif" => Some("image/gif"),
        ".avif" => Some("image/avif"),
        _ => None,
    }
}
