// SPDX-License-Identifier: MPL-2.0
//! The converter facade: capability-based routing over the backends.
//!
//! Route order is data, not control flow: every operation owns an
//! ordered route list evaluated top-to-bottom, and the first backend
//! whose capability predicate matches wins. The order encodes a
//! preference for cheap in-process work over the heavyweight engine.
//! Once a backend has been selected and started there is no automatic
//! retry with another one.

use std::sync::Arc;

use crate::asset::SourceAsset;
use crate::backend::transcoder::PreprocessedAnimation;
use crate::backend::{codec, jxl, raster, transcoder, AnimatedOutput, ImagePayload};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::format::SupportedFormat;
use crate::session::{CancellationToken, LogSink, TranscodeLogBus};

/// Backends able to serve a static conversion, in preference order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaticRoute {
    /// In-memory re-encode.
    Raster,
    /// Flatten a layered document to PNG, then continue from there.
    LayeredDecode,
    /// Decode the niche static format to PNG, then continue from there.
    ExtendedDecode,
    /// Run the transcoder engine.
    Engine,
}

impl StaticRoute {
    #[must_use]
    pub fn supports(self, source: SupportedFormat, target: SupportedFormat) -> bool {
        match self {
            StaticRoute::Raster => raster::supports(source, target),
            StaticRoute::LayeredDecode => codec::supports_layered_decode(source),
            StaticRoute::ExtendedDecode => jxl::supports(source),
            StaticRoute::Engine => transcoder::supports_target(target),
        }
    }
}

/// Static-conversion fallback order.
pub const STATIC_ROUTES: &[StaticRoute] = &[
    StaticRoute::Raster,
    StaticRoute::LayeredDecode,
    StaticRoute::ExtendedDecode,
    StaticRoute::Engine,
];

/// Picks the first static route whose predicate matches.
#[must_use]
pub fn select_static_route(
    source: SupportedFormat,
    target: SupportedFormat,
) -> Option<StaticRoute> {
    STATIC_ROUTES
        .iter()
        .copied()
        .find(|route| route.supports(source, target))
}

/// Backends able to serve an animated conversion, in preference order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnimatedRoute {
    Codec,
    Engine,
}

impl AnimatedRoute {
    #[must_use]
    pub fn supports(self, source: SupportedFormat, target: SupportedFormat) -> bool {
        match self {
            AnimatedRoute::Codec => codec::supports_animated(source, target),
            AnimatedRoute::Engine => transcoder::supports_target(target),
        }
    }
}

/// Animated-conversion fallback order.
pub const ANIMATED_ROUTES: &[AnimatedRoute] = &[AnimatedRoute::Codec, AnimatedRoute::Engine];

/// Picks the first animated route whose predicate matches.
#[must_use]
pub fn select_animated_route(
    source: SupportedFormat,
    target: SupportedFormat,
) -> Option<AnimatedRoute> {
    ANIMATED_ROUTES
        .iter()
        .copied()
        .find(|route| route.supports(source, target))
}

/// The universally previewable still format.
pub const PREVIEW_FORMAT: SupportedFormat = SupportedFormat::Png;

/// Adds operation context to backend failures while leaving abort and
/// unsupported-format errors untouched.
fn with_context(err: Error, context: &str) -> Error {
    match err {
        Error::Backend(msg) => Error::Backend(format!("{context}: {msg}")),
        other => other,
    }
}

/// The routing decision layer. Holds configuration only — no session
/// state — and is safe to invoke concurrently for independent files.
#[derive(Debug, Clone, Default)]
pub struct Converter {
    config: Config,
}

impl Converter {
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Converts a static asset to `target`, inferring the source format
    /// first. Unknown formats fail immediately, never retry.
    pub async fn convert_static_image(
        &self,
        token: &CancellationToken,
        asset: &SourceAsset,
        target: SupportedFormat,
        log: &LogSink,
    ) -> Result<ImagePayload> {
        let descriptor = asset.infer().ok_or_else(|| {
            Error::UnsupportedFormat(format!(
                "cannot infer a format for '{}' ({})",
                asset.file_name, asset.mime_type
            ))
        })?;
        self.convert_static_bytes(token, Arc::clone(&asset.bytes), descriptor.name, target, log)
            .await
    }

    /// Static conversion from already-inferred bytes. Decode-then-recurse
    /// routes loop with the decoded intermediate, short-circuiting when
    /// the decoded format already equals the target.
    pub async fn convert_static_bytes(
        &self,
        token: &CancellationToken,
        bytes: Arc<Vec<u8>>,
        source: SupportedFormat,
        target: SupportedFormat,
        log: &LogSink,
    ) -> Result<ImagePayload> {
        let mut bytes = bytes;
        let mut source = source;
        loop {
            let route = select_static_route(source, target).ok_or_else(|| {
                Error::UnsupportedFormat(format!(
                    "{target} is not supported for static conversion from {source}"
                ))
            })?;

            match route {
                StaticRoute::Raster => {
                    return raster::convert(
                        token,
                        bytes,
                        source,
                        target,
                        self.config.jpeg_quality(),
                        log,
                    )
                    .await
                    .map_err(|e| with_context(e, "static conversion failed"));
                }
                StaticRoute::LayeredDecode => {
                    let decoded = codec::decode_layered(token, bytes, source, log)
                        .await
                        .map_err(|e| with_context(e, "layered decode failed"))?;
                    if decoded.format == target {
                        return Ok(decoded);
                    }
                    bytes = decoded.bytes;
                    source = decoded.format;
                }
                StaticRoute::ExtendedDecode => {
                    let decoded = jxl::decode(token, bytes, source, log)
                        .await
                        .map_err(|e| with_context(e, "extended decode failed"))?;
                    if decoded.format == target {
                        return Ok(decoded);
                    }
                    bytes = decoded.bytes;
                    source = decoded.format;
                }
                StaticRoute::Engine => {
                    let output = transcoder::convert(
                        token,
                        self.config.engine_binary(),
                        bytes,
                        source,
                        target,
                        false,
                        log,
                    )
                    .await
                    .map_err(|e| with_context(e, "engine conversion failed"))?;
                    return Ok(output.converted().clone());
                }
            }
        }
    }

    /// Convenience wrapper over the animation detector.
    pub async fn detect_animation(
        &self,
        bus: &TranscodeLogBus,
        asset: &SourceAsset,
        known_format: SupportedFormat,
    ) -> Result<bool> {
        crate::detect::detect_animation(bus, Arc::clone(&asset.bytes), known_format).await
    }

    /// Normalizes an animated source when the direct codec path cannot
    /// reach `target`. `None` means no preprocessing is needed.
    pub async fn preprocess_animation(
        &self,
        token: &CancellationToken,
        bytes: Arc<Vec<u8>>,
        source: SupportedFormat,
        target: SupportedFormat,
        log: &LogSink,
    ) -> Result<Option<PreprocessedAnimation>> {
        if codec::supports_animated(source, target) {
            return Ok(None);
        }
        if transcoder::supports_target(target) {
            return transcoder::preprocess(token, bytes, source, log)
                .await
                .map_err(|e| with_context(e, "animation preprocessing failed"));
        }
        Err(Error::UnsupportedFormat(format!(
            "{target} is not supported for animated conversion"
        )))
    }

    /// Converts an animated asset. A same-format request is a
    /// pass-through; the codec path always returns a first frame and
    /// ignores `extract_first_frame`; the engine path honors it.
    pub async fn convert_animated_image(
        &self,
        token: &CancellationToken,
        bytes: Arc<Vec<u8>>,
        source: SupportedFormat,
        target: SupportedFormat,
        extract_first_frame: bool,
        log: &LogSink,
    ) -> Result<AnimatedOutput> {
        if source == target {
            log(&format!("{source} already matches the target, passing through"));
            return Ok(AnimatedOutput::ConvertedOnly(ImagePayload::shared(
                bytes, source,
            )));
        }

        let route = select_animated_route(source, target).ok_or_else(|| {
            Error::UnsupportedFormat(format!(
                "{target} is not supported for animated conversion from {source}"
            ))
        })?;

        match route {
            AnimatedRoute::Codec => codec::convert_animated(token, bytes, source, target, log)
                .await
                .map_err(|e| with_context(e, "animated conversion failed")),
            AnimatedRoute::Engine => transcoder::convert(
                token,
                self.config.engine_binary(),
                bytes,
                source,
                target,
                extract_first_frame,
                log,
            )
            .await
            .map_err(|e| with_context(e, "engine conversion failed")),
        }
    }

    /// Returns the asset unchanged when it is already previewable,
    /// otherwise converts it to PNG.
    pub async fn generate_static_image_preview(
        &self,
        token: &CancellationToken,
        asset: &SourceAsset,
        log: &LogSink,
    ) -> Result<ImagePayload> {
        let descriptor = asset.infer().ok_or_else(|| {
            Error::UnsupportedFormat(format!(
                "cannot infer a format for '{}' ({})",
                asset.file_name, asset.mime_type
            ))
        })?;

        if descriptor.name == PREVIEW_FORMAT {
            // Identity: the payload shares the original buffer.
            return Ok(ImagePayload::shared(
                Arc::clone(&asset.bytes),
                PREVIEW_FORMAT,
            ));
        }
        self.convert_static_bytes(
            token,
            Arc::clone(&asset.bytes),
            descriptor.name,
            PREVIEW_FORMAT,
            log,
        )
        .await
    }

    /// Extracts a representative first frame from an animated asset,
    /// preferring the codec backend over the engine.
    pub async fn generate_animated_image_preview(
        &self,
        token: &CancellationToken,
        bytes: Arc<Vec<u8>>,
        source: SupportedFormat,
        log: &LogSink,
    ) -> Result<ImagePayload> {
        if codec::supports_first_frame(source) {
            codec::extract_first_frame(token, bytes, source, log)
                .await
                .map_err(|e| with_context(e, "first-frame extraction failed"))
        } else {
            transcoder::extract_first_frame(token, self.config.engine_binary(), bytes, source, log)
                .await
                .map_err(|e| with_context(e, "engine frame extraction failed"))
        }
    }
}
