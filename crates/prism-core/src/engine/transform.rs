//! The pixel transform primitive.
//!
//! The coordination layer treats this as an opaque CPU-bound step:
//! decode, scale according to the transform keys, encode. Supported
//! keys: `fit` (bound within WxH, aspect preserved), `crop` (fill WxH,
//! window positioned by the optional `focus` percentages), `flip`
//! (horizontal mirror), `quality` (lossy encode override). The
//! `HIGHRES` control key multiplies the target dimensions.

use image::{imageops::FilterType, DynamicImage, GenericImageView};
use std::io::Cursor;

use crate::error::TransformError;
use crate::options::VariantOptions;

/// Result of applying the transform keys to a decoded source.
pub struct TransformOutput {
    pub image: DynamicImage,
    pub width: u32,
    pub height: u32,
    pub transparent: bool,
}

/// Decode source bytes, detecting the format from content.
pub fn decode(name: &str, bytes: &[u8]) -> Result<DynamicImage, TransformError> {
    let reader = image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| TransformError::Decode {
            name: name.to_string(),
            message: format!("cannot detect image format: {e}"),
        })?;
    reader.decode().map_err(|e| TransformError::Decode {
        name: name.to_string(),
        message: e.to_string(),
    })
}

/// Apply the transform keys of `opts` to a decoded source.
pub fn apply(source: &DynamicImage, opts: &VariantOptions) -> TransformOutput {
    let factor = opts.highres().unwrap_or(1).max(1);
    let mut image = if let Some((w, h)) = opts.get_size("crop") {
        let (w, h) = (w.max(1) * factor, h.max(1) * factor);
        let focus = opts
            .get_size("focus")
            .map(|(x, y)| (x.min(100), y.min(100)))
            .unwrap_or((50, 50));
        crop_to(source, w, h, focus)
    } else if let Some((w, h)) = opts.get_size("fit") {
        source.thumbnail(w.max(1) * factor, h.max(1) * factor)
    } else {
        source.clone()
    };

    if matches!(opts.get("flip"), Some(crate::options::OptionValue::Bool(true))) {
        image = image.fliph();
    }

    let (width, height) = image.dimensions();
    let transparent = image.color().has_alpha();
    TransformOutput {
        image,
        width,
        height,
        transparent,
    }
}

/// Scale to cover WxH, then cut the window whose center sits at the
/// focal percentages.
fn crop_to(source: &DynamicImage, w: u32, h: u32, focus: (u32, u32)) -> DynamicImage {
    let (sw, sh) = source.dimensions();
    if sw == 0 || sh == 0 {
        return source.clone();
    }
    // Cover: scale so both target dimensions are filled.
    let scale = f64::max(f64::from(w) / f64::from(sw), f64::from(h) / f64::from(sh));
    let scaled_w = (f64::from(sw) * scale).round().max(1.0) as u32;
    let scaled_h = (f64::from(sh) * scale).round().max(1.0) as u32;
    let scaled = source.resize_exact(scaled_w, scaled_h, FilterType::Lanczos3);

    let max_x = scaled_w.saturating_sub(w);
    let max_y = scaled_h.saturating_sub(h);
    let x = (u64::from(max_x) * u64::from(focus.0) / 100) as u32;
    let y = (u64::from(max_y) * u64::from(focus.1) / 100) as u32;
    scaled.crop_imm(x, y, w.min(scaled_w), h.min(scaled_h))
}

/// Encode a processed image for the given output extension.
pub fn encode(
    name: &str,
    image: &DynamicImage,
    ext: &str,
    quality: u8,
) -> Result<Vec<u8>, TransformError> {
    let mut buffer = Cursor::new(Vec::new());
    match ext {
        ".jpg" | ".jpeg" => {
            let encoder =
                image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buffer, quality);
            // JPEG carries no alpha.
            image
                .to_rgb8()
                .write_with_encoder(encoder)
                .map_err(|e| encode_error(name, e))?;
        }
        ".png" => {
            image
                .write_to(&mut buffer, image::ImageFormat::Png)
                .map_err(|e| encode_error(name, e))?;
        }
        ".webp" => {
            image
                .write_to(&mut buffer, image::ImageFormat::WebP)
                .map_err(|e| encode_error(name, e))?;
        }
        other => {
            return Err(TransformError::UnsupportedExtension {
                ext: other.to_string(),
            });
        }
    }
    Ok(buffer.into_inner())
}

fn encode_error(name: &str, e: image::ImageError) -> TransformError {
    TransformError::Encode {
        name: name.to_string(),
        message: e.to_string(),
    }
}
