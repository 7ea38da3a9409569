// SPDX-License-Identifier: MPL-2.0
//! Extended static decoder: JPEG XL to PNG.
//!
//! Single-purpose worker path with the same one-request-per-worker,
//! log-relay and cleanup discipline as the codec backend.

use std::io::Cursor;
use std::sync::Arc;

use jxl_oxide::JxlImage;
use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::format::SupportedFormat;
use crate::session::{CancellationToken, LogSink};

use super::{ensure_live, ImagePayload};

/// The one format this backend decodes.
pub const SOURCES: &[SupportedFormat] = &[SupportedFormat::Jxl];

#[must_use]
pub fn supports(format: SupportedFormat) -> bool {
    SOURCES.contains(&format)
}

#[derive(Debug)]
enum DecodeResponse {
    Log(String),
    Finished(Vec<u8>),
    Failed(String),
    Aborted,
}

/// Decodes a JPEG XL buffer into a PNG payload.
pub async fn decode(
    token: &CancellationToken,
    bytes: Arc<Vec<u8>>,
    source: SupportedFormat,
    log: &LogSink,
) -> Result<ImagePayload> {
    if !supports(source) {
        return Err(Error::UnsupportedFormat(format!(
            "extended decoder cannot decode {source}"
        )));
    }
    ensure_live(token)?;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let worker_token = Arc::clone(token);
    tokio::task::spawn_blocking(move || {
        let terminal = match decode_blocking(&worker_token, &bytes, &tx) {
            Ok(png) => DecodeResponse::Finished(png),
            Err(Error::Aborted) => DecodeResponse::Aborted,
            Err(e) => DecodeResponse::Failed(e.to_string()),
        };
        let _ = tx.send(terminal);
    });

    while let Some(message) = rx.recv().await {
        match message {
            DecodeResponse::Log(line) => log(&line),
            DecodeResponse::Finished(png) => {
                return Ok(ImagePayload::new(png, SupportedFormat::Png))
            }
            DecodeResponse::Failed(message) => return Err(Error::Backend(message)),
            DecodeResponse::Aborted => return Err(Error::Aborted),
        }
    }
    Err(Error::Resource(
        "extended decoder worker exited without a terminal response".into(),
    ))
}

fn decode_blocking(
    token: &CancellationToken,
    bytes: &[u8],
    tx: &mpsc::UnboundedSender<DecodeResponse>,
) -> Result<Vec<u8>> {
    let _ = tx.send(DecodeResponse::Log("Decoding JPEG XL image".to_string()));

    let image = JxlImage::builder()
        .read(Cursor::new(bytes))
        .map_err(|e| Error::Backend(format!("failed to open JPEG XL stream: {e}")))?;
    ensure_live(token)?;

    let render = image
        .render_frame(0)
        .map_err(|e| Error::Backend(format!("failed to render JPEG XL frame: {e}")))?;
    let frame = render.image_all_channels();
    let (width, height) = (frame.width() as u32, frame.height() as u32);
    ensure_live(token)?;

    let rgba = to_rgba8(frame.buf(), frame.channels())?;
    let buffer = image_rs::RgbaImage::from_raw(width, height, rgba)
        .ok_or_else(|| Error::Backend("decoded JPEG XL buffer has unexpected size".into()))?;

    let mut out = Cursor::new(Vec::new());
    image_rs::DynamicImage::ImageRgba8(buffer)
        .write_to(&mut out, image_rs::ImageFormat::Png)
        .map_err(|e| Error::Backend(format!("failed to encode PNG: {e}")))?;

    let _ = tx.send(DecodeResponse::Log(format!(
        "Decoded {width}x{height} JPEG XL image"
    )));
    Ok(out.into_inner())
}

/// Expands normalized samples (gray, gray+alpha, RGB or RGBA) to RGBA8.
fn to_rgba8(samples: &[f32], channels: usize) -> Result<Vec<u8>> {
    let quantize = |v: f32| -> u8 { (v.clamp(0.0, 1.0) * 255.0 + 0.5) as u8 };

    let mut rgba = Vec::with_capacity(samples.len() / channels.max(1) * 4);
    match channels {
        1 => {
            for px in samples.chunks_exact(1) {
                let g = quantize(px[0]);
                rgba.extend_from_slice(&[g, g, g, 255]);
            }
        }
        2 => {
            for px in samples.chunks_exact(2) {
                let g = quantize(px[0]);
                rgba.extend_from_slice(&[g, g, g, quantize(px[1])]);
            }
        }
        3 => {
            for px in samples.chunks_exact(3) {
                rgba.extend_from_slice(&[quantize(px[0]), quantize(px[1]), quantize(px[2]), 255]);
            }
        }
        4 => {
            for px in samples.chunks_exact(4) {
                rgba.extend_from_slice(&[
                    quantize(px[0]),
                    quantize(px[1]),
                    quantize(px[2]),
                    quantize(px[3]),
                ]);
            }
        }
        other => {
            return Err(Error::Backend(format!(
                "unexpected JPEG XL channel count: {other}"
            )))
        }
    }
    Ok(rgba)
}
