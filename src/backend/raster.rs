// SPDX-License-Identifier: MPL-2.0
//! In-memory raster backend for common web-safe static formats.
//!
//! Decodes the asset into a bitmap, draws it onto an off-screen surface
//! (SVG sources are rasterized through resvg) and re-encodes to the
//! target format. Decode and surface-allocation failures are fatal for
//! this backend; fallback to another backend happens before an attempt
//! starts, never after.

use std::io::Cursor;
use std::sync::Arc;

use image_rs::codecs::jpeg::JpegEncoder;
use image_rs::{DynamicImage, GenericImageView, ImageFormat};
use resvg::usvg;

use crate::error::{Error, Result};
use crate::format::SupportedFormat;
use crate::session::{CancellationToken, LogSink};

use super::{ensure_live, ensure_nonempty, ImagePayload};

/// Formats this backend can decode.
pub const SOURCES: &[SupportedFormat] = &[
    SupportedFormat::Png,
    SupportedFormat::Jpeg,
    SupportedFormat::Gif,
    SupportedFormat::Webp,
    SupportedFormat::Bmp,
    SupportedFormat::Tiff,
    SupportedFormat::Ico,
    SupportedFormat::Svg,
];

/// Formats this backend can encode.
pub const TARGETS: &[SupportedFormat] = &[
    SupportedFormat::Png,
    SupportedFormat::Jpeg,
    SupportedFormat::Webp,
    SupportedFormat::Bmp,
    SupportedFormat::Gif,
    SupportedFormat::Tiff,
];

#[must_use]
pub fn supports_source(format: SupportedFormat) -> bool {
    SOURCES.contains(&format)
}

#[must_use]
pub fn supports_target(format: SupportedFormat) -> bool {
    TARGETS.contains(&format)
}

/// True when both ends of the conversion are within this backend's set.
#[must_use]
pub fn supports(source: SupportedFormat, target: SupportedFormat) -> bool {
    supports_source(source) && supports_target(target)
}

/// Re-encodes `bytes` from `source` to `target`.
///
/// Runs on a blocking worker; the token is observed before decoding and
/// again between decode and encode.
pub async fn convert(
    token: &CancellationToken,
    bytes: Arc<Vec<u8>>,
    source: SupportedFormat,
    target: SupportedFormat,
    jpeg_quality: u8,
    log: &LogSink,
) -> Result<ImagePayload> {
    if !supports(source, target) {
        return Err(Error::UnsupportedFormat(format!(
            "raster backend cannot convert {source} to {target}"
        )));
    }
    ensure_live(token)?;
    log(&format!("Re-encoding {source} as {target}"));

    let worker_token = Arc::clone(token);
    let encoded = tokio::task::spawn_blocking(move || -> Result<Vec<u8>> {
        ensure_live(&worker_token)?;
        let image = decode(&bytes, source)?;
        ensure_live(&worker_token)?;
        encode(&image, target, jpeg_quality)
    })
    .await
    .map_err(|e| Error::Resource(format!("raster worker failed: {e}")))??;

    let encoded = ensure_nonempty(encoded, "raster re-encode")?;
    log(&format!("Re-encoded to {target} ({} bytes)", encoded.len()));
    Ok(ImagePayload::new(encoded, target))
}

/// Decodes the pixel dimensions of an encoded raster image.
pub fn probe_dimensions(bytes: &[u8]) -> Result<(u32, u32)> {
    let image = image_rs::load_from_memory(bytes)
        .map_err(|e| Error::Backend(format!("failed to decode image: {e}")))?;
    Ok(image.dimensions())
}

fn decode(bytes: &[u8], source: SupportedFormat) -> Result<DynamicImage> {
    if source == SupportedFormat::Svg {
        return rasterize_svg(bytes);
    }
    image_rs::load_from_memory(bytes)
        .map_err(|e| Error::Backend(format!("failed to decode {source} image: {e}")))
}

/// Rasterizes an SVG onto an off-screen surface sized to its natural
/// dimensions.
fn rasterize_svg(bytes: &[u8]) -> Result<DynamicImage> {
    let tree = usvg::Tree::from_data(bytes, &usvg::Options::default())
        .map_err(|e| Error::Backend(format!("failed to parse SVG: {e}")))?;

    let pixmap_size = tree.size().to_int_size();
    let width = pixmap_size.width();
    let height = pixmap_size.height();
    if width == 0 || height == 0 {
        return Err(Error::Backend("SVG has empty dimensions".into()));
    }

    let mut pixmap = tiny_skia::Pixmap::new(width, height)
        .ok_or_else(|| Error::Resource("failed to allocate SVG surface".into()))?;

    resvg::render(&tree, tiny_skia::Transform::default(), &mut pixmap.as_mut());

    let rgba = pixmap.take();
    let buffer = image_rs::RgbaImage::from_raw(width, height, rgba)
        .ok_or_else(|| Error::Backend("rasterized SVG buffer has unexpected size".into()))?;
    Ok(DynamicImage::ImageRgba8(buffer))
}

fn encode(image: &DynamicImage, target: SupportedFormat, jpeg_quality: u8) -> Result<Vec<u8>> {
    let mut out = Cursor::new(Vec::new());
    match target {
        // JPEG has no alpha channel; flatten to RGB before encoding.
        SupportedFormat::Jpeg => {
            let rgb = image.to_rgb8();
            let mut encoder = JpegEncoder::new_with_quality(&mut out, jpeg_quality);
            encoder
                .encode_image(&rgb)
                .map_err(|e| Error::Backend(format!("failed to encode JPEG: {e}")))?;
        }
        SupportedFormat::Png => write_with_format(image, &mut out, ImageFormat::Png)?,
        SupportedFormat::Webp => write_with_format(image, &mut out, ImageFormat::WebP)?,
        SupportedFormat::Bmp => write_with_format(image, &mut out, ImageFormat::Bmp)?,
        SupportedFormat::Gif => write_with_format(image, &mut out, ImageFormat::Gif)?,
        SupportedFormat::Tiff => write_with_format(image, &mut out, ImageFormat::Tiff)?,
        other => {
            return Err(Error::UnsupportedFormat(format!(
                "raster backend has no encoder for {other}"
            )))
        }
    }
    Ok(out.into_inner())
}

fn write_with_format(
    image: &DynamicImage,
    out: &mut Cursor<Vec<u8>>,
    format: ImageFormat,
) -> Result<()> {
    image
        .write_to(out, format)
        .map_err(|e| Error::Backend(format!("failed to encode {format:?}: {e}")))
}
