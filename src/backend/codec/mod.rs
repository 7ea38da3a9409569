// SPDX-License-Identifier: MPL-2.0
//! Codec backend: specialized decode/animate/detect operations for a
//! narrow set of formats, executed one request per isolated worker.
//!
//! Capabilities: content-based animation detection for ambiguous
//! formats, animated re-encode between GIF/WebP/APNG, first-frame
//! extraction, and flattening of layered Photoshop documents.

pub mod frames;
pub mod worker;

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::format::SupportedFormat;
use crate::session::{CancellationToken, LogSink};

use super::{AnimatedOutput, ImagePayload};
use worker::{CodecPayload, CodecRequest};

/// Ambiguous formats this backend can content-inspect.
pub const DETECT_INPUTS: &[SupportedFormat] = &[
    SupportedFormat::Png,
    SupportedFormat::Apng,
    SupportedFormat::Gif,
    SupportedFormat::Webp,
];

/// Animated formats the worker can decode at all (a `.png` carrying
/// APNG chunks included). Animated WebP is decodable, but only as the
/// transcoder's normalization stage — see [`ANIMATED_INPUTS`].
pub const ANIMATED_DECODE_INPUTS: &[SupportedFormat] = &[
    SupportedFormat::Gif,
    SupportedFormat::Webp,
    SupportedFormat::Apng,
    SupportedFormat::Png,
];

/// Direct animated-conversion input set exposed to the router.
pub const ANIMATED_INPUTS: &[SupportedFormat] = &[
    SupportedFormat::Gif,
    SupportedFormat::Apng,
    SupportedFormat::Png,
];

/// Animated output formats. Smaller than the decode set.
pub const ANIMATED_OUTPUTS: &[SupportedFormat] = &[
    SupportedFormat::Gif,
    SupportedFormat::Apng,
    SupportedFormat::Webp,
];

/// Layered-document formats decodable to a flat still.
pub const LAYERED_INPUTS: &[SupportedFormat] = &[SupportedFormat::Psd];

#[must_use]
pub fn supports_detection(format: SupportedFormat) -> bool {
    DETECT_INPUTS.contains(&format)
}

#[must_use]
pub fn supports_animated(source: SupportedFormat, target: SupportedFormat) -> bool {
    ANIMATED_INPUTS.contains(&source) && ANIMATED_OUTPUTS.contains(&target)
}

/// Decodability predicate used by the normalization stage.
#[must_use]
pub fn supports_animated_decode(source: SupportedFormat, target: SupportedFormat) -> bool {
    ANIMATED_DECODE_INPUTS.contains(&source) && ANIMATED_OUTPUTS.contains(&target)
}

#[must_use]
pub fn supports_first_frame(format: SupportedFormat) -> bool {
    ANIMATED_DECODE_INPUTS.contains(&format)
}

#[must_use]
pub fn supports_layered_decode(format: SupportedFormat) -> bool {
    LAYERED_INPUTS.contains(&format)
}

/// Content-inspects the buffer for animation (frame count > 1 or an
/// animation chunk in the container header).
pub async fn detect_animation(
    token: &CancellationToken,
    bytes: Arc<Vec<u8>>,
    source: SupportedFormat,
    log: &LogSink,
) -> Result<bool> {
    if !supports_detection(source) {
        return Err(Error::UnsupportedFormat(format!(
            "{source} is not supported for animation detection"
        )));
    }
    match worker::run(token, CodecRequest::DetectAnimation { bytes, source }, log).await? {
        CodecPayload::Detected(animated) => Ok(animated),
        other => Err(Error::Backend(format!(
            "unexpected codec payload for detection: {other:?}"
        ))),
    }
}

/// Re-encodes an animated asset. Always yields the first frame as a PNG
/// alongside the converted animation.
pub async fn convert_animated(
    token: &CancellationToken,
    bytes: Arc<Vec<u8>>,
    source: SupportedFormat,
    target: SupportedFormat,
    log: &LogSink,
) -> Result<AnimatedOutput> {
    if !supports_animated_decode(source, target) {
        return Err(Error::UnsupportedFormat(format!(
            "codec backend cannot convert animated {source} to {target}"
        )));
    }
    let request = CodecRequest::ConvertAnimated {
        bytes,
        source,
        target,
    };
    match worker::run(token, request, log).await? {
        CodecPayload::Converted {
            converted,
            target,
            first_frame,
        } => Ok(AnimatedOutput::ConvertedWithFirstFrame {
            converted: ImagePayload::new(converted, target),
            first_frame: ImagePayload::new(first_frame, SupportedFormat::Png),
        }),
        other => Err(Error::Backend(format!(
            "unexpected codec payload for conversion: {other:?}"
        ))),
    }
}

/// Extracts the first frame of an animated/container asset as PNG.
pub async fn extract_first_frame(
    token: &CancellationToken,
    bytes: Arc<Vec<u8>>,
    source: SupportedFormat,
    log: &LogSink,
) -> Result<ImagePayload> {
    if !supports_first_frame(source) {
        return Err(Error::UnsupportedFormat(format!(
            "codec backend cannot extract a frame from {source}"
        )));
    }
    match worker::run(token, CodecRequest::ExtractFirstFrame { bytes, source }, log).await? {
        CodecPayload::FirstFrame(frame) => Ok(ImagePayload::new(frame, SupportedFormat::Png)),
        other => Err(Error::Backend(format!(
            "unexpected codec payload for extraction: {other:?}"
        ))),
    }
}

/// Flattens a layered document into a PNG still.
pub async fn decode_layered(
    token: &CancellationToken,
    bytes: Arc<Vec<u8>>,
    source: SupportedFormat,
    log: &LogSink,
) -> Result<ImagePayload> {
    if !supports_layered_decode(source) {
        return Err(Error::UnsupportedFormat(format!(
            "{source} is not a layered-document format"
        )));
    }
    match worker::run(token, CodecRequest::DecodeLayered { bytes }, log).await? {
        CodecPayload::Decoded(png) => Ok(ImagePayload::new(png, SupportedFormat::Png)),
        other => Err(Error::Backend(format!(
            "unexpected codec payload for layered decode: {other:?}"
        ))),
    }
}
