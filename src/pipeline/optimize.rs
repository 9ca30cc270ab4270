//! Image re-encoding for e-ink readers.
//!
//! Every raster image ends up as a baseline JPEG no wider than
//! `max_width`, optionally 8-bit grayscale. Formats that JPEG would harm or
//! that we cannot decode (SVG, AVIF, animated GIF) pass through untouched.
//!
//! All functions here are synchronous and CPU-bound; async callers run them
//! inside `tokio::task::spawn_blocking`.

use std::io::Cursor;

use base64::{
    engine::general_purpose::{STANDARD, STANDARD_NO_PAD},
    Engine as _,
};
use image::codecs::gif::GifDecoder;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{AnimationDecoder, DynamicImage, RgbImage};
use tracing::{debug, warn};

use crate::config::OptimizeOptions;
use crate::error::DeckleError;

/// A re-encoded image.
#[derive(Debug, Clone)]
pub struct Optimized {
    /// `data:image/jpeg;base64,…`
    pub data_uri: String,
    /// Size of the JPEG bytes (before base64).
    pub jpeg_len: usize,
}

/// Running totals for the "Optimized N images" summary.
#[derive(Debug, Clone, Copy, Default)]
pub struct OptimizeStats {
    pub count: usize,
    pub original_bytes: u64,
    pub optimized_bytes: u64,
}

impl OptimizeStats {
    pub fn record(&mut self, original: usize, optimized: usize) {
        self.count += 1;
        self.original_bytes += original as u64;
        self.optimized_bytes += optimized as u64;
    }

    pub fn merge(&mut self, other: OptimizeStats) {
        self.count += other.count;
        self.original_bytes += other.original_bytes;
        self.optimized_bytes += other.optimized_bytes;
    }
}

/// True when this MIME type is passed through without decoding.
pub fn is_passthrough(mime: &str, data: &[u8]) -> bool {
    mime.contains("svg") || mime.contains("avif") || (mime.contains("gif") && is_animated_gif(data))
}

/// More than one frame in a GIF.
pub fn is_animated_gif(data: &[u8]) -> bool {
    match GifDecoder::new(Cursor::new(data)) {
        Ok(decoder) => decoder.into_frames().take(2).count() > 1,
        Err(_) => false,
    }
}

/// Decode base64 as padded standard, then unpadded standard.
pub fn decode_base64(s: &str) -> Result<Vec<u8>, base64::DecodeError> {
    STANDARD.decode(s).or_else(|_| STANDARD_NO_PAD.decode(s))
}

/// Re-encode `data` as JPEG.
///
/// Returns `Ok(None)` for pass-through formats. Decode and encode errors
/// are returned so the caller can log them and keep the original.
pub fn optimize_image(
    data: &[u8],
    mime: &str,
    opts: &OptimizeOptions,
) -> Result<Option<Optimized>, DeckleError> {
    if is_passthrough(mime, data) {
        debug!(mime, "passing image through");
        return Ok(None);
    }

    let img = image::load_from_memory(data).map_err(|e| DeckleError::DecodeFailure {
        mime: mime.to_string(),
        reason: e.to_string(),
    })?;

    let mut rgb = flatten_on_white(&img);

    let (w, h) = rgb.dimensions();
    let max_w = opts.max_width.max(1);
    if w > max_w {
        let new_h = ((h as f64) * (max_w as f64) / (w as f64)).round().max(1.0) as u32;
        rgb = image::imageops::resize(&rgb, max_w, new_h, FilterType::Triangle);
    }

    let out = if opts.grayscale {
        DynamicImage::ImageLuma8(image::imageops::grayscale(&rgb))
    } else {
        DynamicImage::ImageRgb8(rgb)
    };

    let jpeg = encode_jpeg(&out, opts.quality)?;
    Ok(Some(Optimized {
        data_uri: format!("data:image/jpeg;base64,{}", STANDARD.encode(&jpeg)),
        jpeg_len: jpeg.len(),
    }))
}

/// Decode a base64 payload and optimize it, logging soft failures.
///
/// `None` means "leave the original in place".
pub fn optimize_data_uri(
    mime: &str,
    b64: &str,
    opts: &OptimizeOptions,
    stats: &mut OptimizeStats,
) -> Option<String> {
    let raw = match decode_base64(b64) {
        Ok(raw) => raw,
        Err(e) => {
            warn!("invalid base64, skipping: {e}");
            return None;
        }
    };
    match optimize_image(&raw, mime, opts) {
        Ok(Some(o)) => {
            stats.record(raw.len(), o.jpeg_len);
            Some(o.data_uri)
        }
        Ok(None) => None,
        Err(e) => {
            warn!("{e}");
            None
        }
    }
}

/// Composite onto an opaque white background.
fn flatten_on_white(img: &DynamicImage) -> RgbImage {
    let rgba = img.to_rgba8();
    let (w, h) = rgba.dimensions();
    RgbImage::from_fn(w, h, |x, y| {
        let p = rgba.get_pixel(x, y).0;
        let a = p[3] as u32;
        let blend = |c: u8| ((c as u32 * a + 255 * (255 - a) + 127) / 255) as u8;
        image::Rgb([blend(p[0]), blend(p[1]), blend(p[2])])
    })
}

fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Vec<u8>, DeckleError> {
    let mut buf = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100));
    img.write_with_encoder(encoder)
        .map_err(|e| DeckleError::EncodeFailure {
            reason: format!("JPEG encode failed: {e}"),
        })?;
    Ok(buf)
}
