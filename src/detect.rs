// SPDX-License-Identifier: MPL-2.0
//! Animation detection.
//!
//! Known-format classification answers without touching the bytes; only
//! ambiguous formats are content-inspected, inside a short-lived
//! session on the caller's log bus.

use std::sync::Arc;

use crate::backend::codec;
use crate::error::{Error, Result};
use crate::format::SupportedFormat;
use crate::session::TranscodeLogBus;

/// Formats that are single-frame by definition.
pub const ALWAYS_STATIC: &[SupportedFormat] = &[
    SupportedFormat::Jpeg,
    SupportedFormat::Bmp,
    SupportedFormat::Tiff,
    SupportedFormat::Ico,
    SupportedFormat::Svg,
    SupportedFormat::Psd,
    SupportedFormat::Jxl,
];

/// Container/video formats that are motion content by definition.
pub const ALWAYS_MOTION: &[SupportedFormat] = &[
    SupportedFormat::Mp4,
    SupportedFormat::Webm,
    SupportedFormat::Mov,
    SupportedFormat::Mkv,
];

/// Outcome of classifying a format without reading content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatClass {
    Static,
    Motion,
    /// May or may not carry multiple frames; requires content inspection.
    Ambiguous,
}

#[must_use]
pub fn classify(format: SupportedFormat) -> FormatClass {
    if ALWAYS_STATIC.contains(&format) {
        FormatClass::Static
    } else if ALWAYS_MOTION.contains(&format) {
        FormatClass::Motion
    } else {
        FormatClass::Ambiguous
    }
}

/// Decides whether the asset is animated.
///
/// Closed-set formats answer immediately with no I/O and no session.
/// Ambiguous formats open one session on `bus` for the inspection only;
/// the session is released before returning, on success and failure.
pub async fn detect_animation(
    bus: &TranscodeLogBus,
    bytes: Arc<Vec<u8>>,
    format: SupportedFormat,
) -> Result<bool> {
    match classify(format) {
        FormatClass::Static => Ok(false),
        FormatClass::Motion => Ok(true),
        FormatClass::Ambiguous => {
            if !codec::supports_detection(format) {
                return Err(Error::UnsupportedFormat(format!(
                    "{format} is not supported for animation detection"
                )));
            }

            let session = bus.open_session();
            let token = session.token();
            let log = session.log_sink();

            let outcome = codec::detect_animation(&token, bytes, format, &log).await;
            if outcome.is_ok() {
                session.complete();
            }
            session.release();
            outcome
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::codec::frames;
    use crate::format::REGISTRY;

    fn frame(value: u8) -> frames::RgbaFrame {
        frames::RgbaFrame {
            rgba: vec![value; 4 * 4 * 4],
            width: 4,
            height: 4,
            delay_ms: 40,
        }
    }

    #[test]
    fn every_format_is_classified() {
        for desc in REGISTRY {
            // Classification is total over the closed set.
            let _ = classify(desc.name);
        }
    }

    #[test]
    fn closed_sets_do_not_overlap() {
        for format in ALWAYS_STATIC {
            assert!(!ALWAYS_MOTION.contains(format));
        }
    }

    #[tokio::test]
    async fn static_formats_answer_without_a_session() {
        let bus = TranscodeLogBus::new();
        let bytes = Arc::new(vec![0u8; 4]);

        for format in ALWAYS_STATIC {
            let animated = detect_animation(&bus, Arc::clone(&bytes), *format)
                .await
                .expect("static classification should not fail");
            assert!(!animated);
        }
        assert_eq!(bus.session_count(), 0, "no session may be opened");
        assert!(bus.transcript().is_empty());
    }

    #[tokio::test]
    async fn motion_formats_answer_without_a_session() {
        let bus = TranscodeLogBus::new();
        let bytes = Arc::new(vec![0u8; 4]);

        for format in ALWAYS_MOTION {
            let animated = detect_animation(&bus, Arc::clone(&bytes), *format)
                .await
                .expect("motion classification should not fail");
            assert!(animated);
        }
        assert_eq!(bus.session_count(), 0);
    }

    #[tokio::test]
    async fn single_frame_gif_detects_as_static() {
        let bus = TranscodeLogBus::new();
        let gif = frames::encode_frames(&[frame(1)], SupportedFormat::Gif).expect("gif encode");

        let animated = detect_animation(&bus, Arc::new(gif), SupportedFormat::Gif)
            .await
            .expect("detection should succeed");

        assert!(!animated);
        assert_eq!(bus.session_count(), 0, "session is released afterwards");
    }

    #[tokio::test]
    async fn multi_frame_gif_detects_as_animated() {
        let bus = TranscodeLogBus::new();
        let gif = frames::encode_frames(&[frame(1), frame(2)], SupportedFormat::Gif)
            .expect("gif encode");

        let animated = detect_animation(&bus, Arc::new(gif), SupportedFormat::Gif)
            .await
            .expect("detection should succeed");

        assert!(animated);
        assert!(
            !bus.transcript().is_empty(),
            "content inspection logs progress lines"
        );
    }

    #[tokio::test]
    async fn multi_frame_webp_detects_as_animated() {
        let bus = TranscodeLogBus::new();
        let webp = frames::encode_frames(&[frame(1), frame(2)], SupportedFormat::Webp)
            .expect("webp encode");

        let animated = detect_animation(&bus, Arc::new(webp), SupportedFormat::Webp)
            .await
            .expect("detection should succeed");
        assert!(animated);
    }

    #[tokio::test]
    async fn failed_inspection_still_releases_the_session() {
        let bus = TranscodeLogBus::new();
        let result = detect_animation(&bus, Arc::new(b"junk".to_vec()), SupportedFormat::Gif).await;

        assert!(result.is_err());
        assert_eq!(bus.session_count(), 0);
    }
}
