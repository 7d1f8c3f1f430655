use crate::error::{AggregatorError, Result};
use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::webp::WebPEncoder;
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// Images at or below this size skip compression entirely.
pub const PASS_THROUGH_BYTES: usize = 5 * 1024;

/// Header images may be larger than in-body ones.
pub const HEADER_MAX_DIMENSION: u32 = 1200;
pub const BODY_MAX_DIMENSION: u32 = 600;

pub const JPEG_QUALITY: u8 = 65;

#[derive(Debug, Clone)]
pub struct CompressedImage {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

impl CompressedImage {
    pub fn to_data_uri(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.content_type,
            base64::engine::general_purpose::STANDARD.encode(&self.bytes)
        )
    }
}

/// Compress raw image bytes for embedding.
///
/// Header mode targets ≤1200×1200 and WebP output (PNG when the source
/// carries alpha); body mode targets ≤600×600 JPEG. Images are never
/// upscaled, tiny images pass through untouched, and the re-encoded
/// buffer only replaces the input when it is actually smaller.
pub fn compress_image(bytes: &[u8], content_type: Option<&str>, is_header: bool) -> Result<CompressedImage> {
    if looks_like_svg(bytes, content_type) {
        return Ok(CompressedImage {
            bytes: bytes.to_vec(),
            content_type: "image/svg+xml".to_string(),
        });
    }

    if bytes.len() <= PASS_THROUGH_BYTES {
        return Ok(CompressedImage {
            bytes: bytes.to_vec(),
            content_type: content_type.map(normalize_content_type).unwrap_or_else(|| "image/png".to_string()),
        });
    }

    let img = image::load_from_memory(bytes)?;
    let max = if is_header { HEADER_MAX_DIMENSION } else { BODY_MAX_DIMENSION };

    let needs_resize = img.width() > max || img.height() > max;
    let resized = if needs_resize { img.thumbnail(max, max) } else { img };

    let has_alpha = resized.color().has_alpha() && carries_transparency(&resized);

    let (encoded, encoded_type) = if is_header {
        if has_alpha {
            encode_png(&resized)?
        } else {
            encode_webp(&resized)?
        }
    } else if has_alpha {
        encode_png(&resized)?
    } else {
        encode_jpeg(&resized)?
    };

    // A re-encode that grew the file is only worth keeping when the
    // dimensions actually changed.
    if !needs_resize && encoded.len() >= bytes.len() {
        debug!(original = bytes.len(), encoded = encoded.len(), "keeping original image bytes");
        return Ok(CompressedImage {
            bytes: bytes.to_vec(),
            content_type: content_type.map(normalize_content_type).unwrap_or_else(|| sniff_content_type(bytes)),
        });
    }

    Ok(CompressedImage { bytes: encoded, content_type: encoded_type.to_string() })
}

fn encode_webp(img: &DynamicImage) -> Result<(Vec<u8>, &'static str)> {
    let mut out = Vec::new();
    let rgba = DynamicImage::ImageRgba8(img.to_rgba8());
    rgba.write_with_encoder(WebPEncoder::new_lossless(Cursor::new(&mut out)))?;
    Ok((out, "image/webp"))
}

fn encode_png(img: &DynamicImage) -> Result<(Vec<u8>, &'static str)> {
    let mut out = Vec::new();
    img.write_to(&mut Cursor::new(&mut out), image::ImageFormat::Png)?;
    Ok((out, "image/png"))
}

fn encode_jpeg(img: &DynamicImage) -> Result<(Vec<u8>, &'static str)> {
    let mut out = Vec::new();
    let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
    rgb.write_with_encoder(JpegEncoder::new_with_quality(Cursor::new(&mut out), JPEG_QUALITY))?;
    Ok((out, "image/jpeg"))
}

/// Alpha channels are common in decoded output even for fully opaque
/// sources; only treat the image as transparent when a pixel says so.
fn carries_transparency(img: &DynamicImage) -> bool {
    let rgba = img.to_rgba8();
    rgba.pixels().any(|p| p.0[3] < 255)
}

fn looks_like_svg(bytes: &[u8], content_type: Option<&str>) -> bool {
    if content_type.is_some_and(|c| c.contains("svg")) {
        return true;
    }
    let head = &bytes[..bytes.len().min(512)];
    let Ok(text) = std::str::from_utf8(head) else {
        return false;
    };
    let trimmed = text.trim_start();
    trimmed.starts_with("<svg") || (trimmed.starts_with("<?xml") && text.contains("<svg"))
}

fn normalize_content_type(raw: &str) -> String {
    raw.split(';').next().unwrap_or(raw).trim().to_ascii_lowercase()
}

fn sniff_content_type(bytes: &[u8]) -> String {
    match image::guess_format(bytes) {
        Ok(image::ImageFormat::Png) => "image/png".to_string(),
        Ok(image::ImageFormat::Jpeg) => "image/jpeg".to_string(),
        Ok(image::ImageFormat::Gif) => "image/gif".to_string(),
        Ok(image::ImageFormat::WebP) => "image/webp".to_string(),
        Ok(image::ImageFormat::Bmp) => "image/bmp".to_string(),
        _ => "application/octet-stream".to_string(),
    }
}

/// Decode a `data:` URI into bytes + content type.
pub fn decode_data_uri(uri: &str) -> Result<(Vec<u8>, String)> {
    let rest = uri
        .strip_prefix("data:")
        .ok_or_else(|| AggregatorError::Image("not a data URI".to_string()))?;
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| AggregatorError::Image("malformed data URI".to_string()))?;

    let content_type = meta.split(';').next().unwrap_or("").to_string();
    let bytes = if meta.ends_with(";base64") {
        base64::engine::general_purpose::STANDARD
            .decode(payload)
            .map_err(|e| AggregatorError::Image(format!("data URI base64: {e}")))?
    } else {
        payload.as_bytes().to_vec()
    };
    Ok((bytes, content_type))
}
