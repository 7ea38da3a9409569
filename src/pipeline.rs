// SPDX-License-Identifier: MPL-2.0
//! The file-selection pipeline: the end-to-end contract for one
//! user-selected file.
//!
//! Infers the format (failing fast on unknown input), detects
//! animation, routes through the converter and reconciles the results
//! into one [`ImageFile`]: `processed` is set exactly when the original
//! bytes were not acceptable to the destination, `preview` carries a
//! representative still. The pipeline is the top-level error boundary:
//! on failure it aborts every still-open session and drops all partial
//! state.

use std::sync::Arc;

use crate::asset::{ImageFile, SourceAsset, UploadTarget};
use crate::backend::{raster, AnimatedOutput, ImagePayload};
use crate::convert::Converter;
use crate::detect;
use crate::error::{Error, Result};
use crate::session::{SessionHandle, TranscodeLogBus};

/// Byte-size comparison between the original and the converted output,
/// surfaced to the caller as a user-facing notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeChange {
    pub original_bytes: usize,
    pub processed_bytes: usize,
}

/// Outcome of one pipeline run.
#[derive(Debug)]
pub struct ProcessedUpload {
    pub image: ImageFile,
    /// Present when conversion changed the byte size; the caller shows
    /// a notice and clears the transcript on dismissal.
    pub size_notice: Option<SizeChange>,
}

/// Completes the session on success and releases it either way.
fn finish_session<T>(session: SessionHandle, outcome: &Result<T>) {
    if outcome.is_ok() {
        session.complete();
    }
    session.release();
}

/// Processes one selected file against the destination's capabilities.
///
/// The transcript is cleared automatically only when no size-change
/// notice is to be shown; on failure the open sessions are aborted and
/// removed while the transcript stays for the error view.
pub async fn process_selected_file(
    converter: &Converter,
    bus: &TranscodeLogBus,
    asset: SourceAsset,
    target: &UploadTarget,
) -> Result<ProcessedUpload> {
    match run(converter, bus, asset, target).await {
        Ok(upload) => {
            if upload.size_notice.is_none() {
                bus.clear();
            }
            Ok(upload)
        }
        Err(err) => {
            if !err.is_abort() {
                bus.append(&format!("Conversion failed: {err}"));
            }
            bus.abort_sessions();
            Err(err)
        }
    }
}

async fn run(
    converter: &Converter,
    bus: &TranscodeLogBus,
    asset: SourceAsset,
    target: &UploadTarget,
) -> Result<ProcessedUpload> {
    // Fail fast before any backend is touched.
    let descriptor = asset.infer().ok_or_else(|| {
        Error::UnsupportedFormat(format!(
            "cannot infer a format for '{}' ({})",
            asset.file_name, asset.mime_type
        ))
    })?;
    let format = descriptor.name;

    let animated = detect::detect_animation(bus, Arc::clone(&asset.bytes), format).await?;
    let mut image = ImageFile::new(asset, format);

    if animated {
        process_animated(converter, bus, &mut image, target).await?;
    } else {
        process_static(converter, bus, &mut image, target).await?;
    }

    // The preview is always a decodable still; take dimensions from it.
    if let Some(preview) = image.preview() {
        if let Ok((width, height)) = raster::probe_dimensions(&preview.bytes) {
            image.set_dimensions(width, height);
        }
    }

    let original_bytes = image.original().len();
    let size_notice = image.processed().and_then(|processed| {
        (processed.len() != original_bytes).then_some(SizeChange {
            original_bytes,
            processed_bytes: processed.len(),
        })
    });

    Ok(ProcessedUpload { image, size_notice })
}

async fn process_animated(
    converter: &Converter,
    bus: &TranscodeLogBus,
    image: &mut ImageFile,
    target: &UploadTarget,
) -> Result<()> {
    let format = image.original_format();
    let bytes = Arc::clone(&image.original().bytes);

    if target.accepts_animation(format) {
        // The destination takes the animation as-is; only a preview
        // frame is produced, the full asset is never transcoded.
        let session = bus.open_session();
        let outcome = converter
            .generate_animated_image_preview(&session.token(), bytes, format, &session.log_sink())
            .await;
        finish_session(session, &outcome);
        image.set_preview(outcome?);
        return Ok(());
    }

    let fallback = target.animation_fallback().ok_or_else(|| {
        Error::UnsupportedFormat(format!("{} accepts no animated formats", target.name))
    })?;

    let session = bus.open_session();
    let outcome = converter
        .preprocess_animation(
            &session.token(),
            Arc::clone(&bytes),
            format,
            fallback,
            &session.log_sink(),
        )
        .await;
    finish_session(session, &outcome);

    match outcome? {
        Some(preprocessed) => {
            // The normalization already yielded a first frame; reuse it
            // and never extract a second time.
            let session = bus.open_session();
            let converted = converter
                .convert_animated_image(
                    &session.token(),
                    Arc::clone(&preprocessed.intermediate.bytes),
                    preprocessed.intermediate.format,
                    fallback,
                    false,
                    &session.log_sink(),
                )
                .await;
            finish_session(session, &converted);

            image.set_processed(converted?.converted().clone());
            image.set_preview(preprocessed.first_frame);
        }
        None => {
            let session = bus.open_session();
            let converted = converter
                .convert_animated_image(
                    &session.token(),
                    bytes,
                    format,
                    fallback,
                    true,
                    &session.log_sink(),
                )
                .await;
            finish_session(session, &converted);

            match converted? {
                AnimatedOutput::ConvertedWithFirstFrame {
                    converted,
                    first_frame,
                } => {
                    image.set_processed(converted);
                    image.set_preview(first_frame);
                }
                AnimatedOutput::ConvertedOnly(converted) => {
                    image.set_processed(converted);
                }
            }
        }
    }
    Ok(())
}

async fn process_static(
    converter: &Converter,
    bus: &TranscodeLogBus,
    image: &mut ImageFile,
    target: &UploadTarget,
) -> Result<()> {
    let format = image.original_format();

    if target.accepts_static(format) {
        let session = bus.open_session();
        let outcome = converter
            .generate_static_image_preview(&session.token(), image.original(), &session.log_sink())
            .await;
        finish_session(session, &outcome);
        image.set_preview(outcome?);
        return Ok(());
    }

    let fallback = target.static_fallback().ok_or_else(|| {
        Error::UnsupportedFormat(format!("{} accepts no static formats", target.name))
    })?;

    // Conversion and preview run concurrently on independent sessions;
    // aborting one must not abort the other.
    let convert_session = bus.open_session();
    let preview_session = bus.open_session();
    let convert_token = convert_session.token();
    let convert_log_sink = convert_session.log_sink();
    let preview_token = preview_session.token();
    let preview_log_sink = preview_session.log_sink();
    let (converted, preview): (Result<ImagePayload>, Result<ImagePayload>) = tokio::join!(
        converter.convert_static_image(
            &convert_token,
            image.original(),
            fallback,
            &convert_log_sink,
        ),
        converter.generate_static_image_preview(
            &preview_token,
            image.original(),
            &preview_log_sink,
        ),
    );
    finish_session(convert_session, &converted);
    finish_session(preview_session, &preview);

    image.set_processed(converted?);
    image.set_preview(preview?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::SupportedFormat;
    use image_rs::{DynamicImage, ImageFormat, Rgba, RgbaImage};
    use std::io::Cursor;

    fn encoded(format: ImageFormat) -> Vec<u8> {
        let image = RgbaImage::from_pixel(6, 4, Rgba([20, 40, 60, 255]));
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(image)
            .write_to(&mut out, format)
            .expect("failed to encode fixture");
        out.into_inner()
    }

    fn webp_only_target() -> UploadTarget {
        UploadTarget {
            name: "host".into(),
            supported_static_formats: vec![SupportedFormat::Webp, SupportedFormat::Png],
            supported_animation_formats: vec![SupportedFormat::Apng],
        }
    }

    #[tokio::test]
    async fn unknown_format_fails_fast_without_backends() {
        let converter = Converter::default();
        let bus = TranscodeLogBus::new();
        let asset = SourceAsset::new(vec![0u8; 16], "file.xyz", "application/octet-stream");

        let result = process_selected_file(&converter, &bus, asset, &webp_only_target()).await;

        assert!(matches!(result, Err(Error::UnsupportedFormat(_))));
        assert_eq!(bus.session_count(), 0, "no backend session was opened");
    }

    #[tokio::test]
    async fn accepted_static_format_gets_preview_only() {
        let converter = Converter::default();
        let bus = TranscodeLogBus::new();
        let asset = SourceAsset::new(encoded(ImageFormat::WebP), "pic.webp", "image/webp");

        let upload = process_selected_file(&converter, &bus, asset, &webp_only_target())
            .await
            .expect("pipeline should succeed");

        assert!(upload.image.processed().is_none(), "original is acceptable");
        let preview = upload.image.preview().expect("preview must be set");
        assert_eq!(preview.format, SupportedFormat::Png);
        assert!(upload.size_notice.is_none());
        assert!(
            bus.transcript().is_empty(),
            "no notice shown, logs are cleared automatically"
        );
    }

    #[tokio::test]
    async fn unaccepted_static_format_converts_and_previews() {
        let converter = Converter::default();
        let bus = TranscodeLogBus::new();
        let asset = SourceAsset::new(encoded(ImageFormat::Bmp), "photo.bmp", "image/bmp");

        let upload = process_selected_file(&converter, &bus, asset, &webp_only_target())
            .await
            .expect("pipeline should succeed");

        let processed = upload.image.processed().expect("conversion must happen");
        assert_eq!(processed.format, SupportedFormat::Webp);
        let preview = upload.image.preview().expect("preview must be set");
        assert_eq!(preview.format, SupportedFormat::Png);
        assert_eq!(upload.image.dimensions(), Some((6, 4)));
        assert_eq!(bus.session_count(), 0, "all sessions were released");
    }

    #[tokio::test]
    async fn size_notice_keeps_the_transcript() {
        let converter = Converter::default();
        let bus = TranscodeLogBus::new();
        let asset = SourceAsset::new(encoded(ImageFormat::Bmp), "photo.bmp", "image/bmp");

        let upload = process_selected_file(&converter, &bus, asset, &webp_only_target())
            .await
            .expect("pipeline should succeed");

        // BMP to WebP always changes the byte size for this fixture.
        assert!(upload.size_notice.is_some());
        assert!(
            !bus.transcript().is_empty(),
            "transcript stays until the notice is dismissed"
        );
    }

    #[tokio::test]
    async fn failure_aborts_and_removes_open_sessions() {
        let converter = Converter::default();
        let bus = TranscodeLogBus::new();
        // Valid name/MIME but garbage bytes: decode fails inside the backend.
        let asset = SourceAsset::new(b"garbage".to_vec(), "photo.bmp", "image/bmp");

        let result = process_selected_file(&converter, &bus, asset, &webp_only_target()).await;

        assert!(matches!(result, Err(Error::Backend(_))));
        assert_eq!(bus.session_count(), 0);
        assert!(
            bus.transcript().iter().any(|l| l.contains("failed")),
            "failure is logged for the error view"
        );
    }
}
