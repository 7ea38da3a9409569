// SPDX-License-Identifier: MPL-2.0
//! Frame-level codec primitives: animated decode/encode for GIF, WebP
//! and APNG, marker-based animation detection, and single-frame PNG
//! encoding.

use std::io::Cursor;

use image_rs::codecs::gif::{GifDecoder, GifEncoder, Repeat};
use image_rs::codecs::png::PngDecoder;
use image_rs::{AnimationDecoder, Delay, DynamicImage, Frame, GenericImageView};

use crate::error::{Error, Result};
use crate::format::SupportedFormat;

/// Number of leading bytes scanned for animation chunk markers. The
/// relevant chunks (`ANMF`, `acTL`) sit in the container header region.
const MARKER_SCAN_LEN: usize = 1024;

/// Fallback frame delay when the container carries none.
const DEFAULT_DELAY_MS: u32 = 100;

/// One decoded full-canvas RGBA frame.
#[derive(Debug, Clone)]
pub struct RgbaFrame {
    pub rgba: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Display duration of this frame in milliseconds.
    pub delay_ms: u32,
}

/// Detects whether a WebP buffer is animated by scanning for the `ANMF`
/// (Animation Frame) chunk marker. Only the header region is read.
#[must_use]
pub fn has_webp_animation_marker(bytes: &[u8]) -> bool {
    let scan = &bytes[..bytes.len().min(MARKER_SCAN_LEN)];
    scan.windows(4).any(|window| window == b"ANMF")
}

/// Detects whether a PNG buffer is an APNG by scanning for the `acTL`
/// (animation control) chunk, which precedes the first image data chunk.
#[must_use]
pub fn has_apng_marker(bytes: &[u8]) -> bool {
    let scan = &bytes[..bytes.len().min(MARKER_SCAN_LEN)];
    scan.windows(4).any(|window| window == b"acTL")
}

/// Counts the frames of a GIF buffer.
pub fn count_gif_frames(bytes: &[u8]) -> Result<usize> {
    let decoder = GifDecoder::new(Cursor::new(bytes))
        .map_err(|e| Error::Backend(format!("failed to open GIF: {e}")))?;
    Ok(decoder.into_frames().count())
}

/// Content-inspects an ambiguous buffer for animation.
pub fn is_animated(bytes: &[u8], format: SupportedFormat) -> Result<bool> {
    match format {
        SupportedFormat::Gif => Ok(count_gif_frames(bytes)? > 1),
        SupportedFormat::Webp => Ok(has_webp_animation_marker(bytes)),
        SupportedFormat::Png | SupportedFormat::Apng => Ok(has_apng_marker(bytes)),
        other => Err(Error::UnsupportedFormat(format!(
            "{other} is not supported for animation detection"
        ))),
    }
}

/// Decodes every frame of an animated buffer into full-canvas RGBA.
pub fn decode_frames(bytes: &[u8], source: SupportedFormat) -> Result<Vec<RgbaFrame>> {
    let frames = match source {
        SupportedFormat::Webp => decode_webp_frames(bytes)?,
        SupportedFormat::Gif => decode_image_frames(
            GifDecoder::new(Cursor::new(bytes))
                .map_err(|e| Error::Backend(format!("failed to open GIF: {e}")))?,
        )?,
        SupportedFormat::Png | SupportedFormat::Apng => decode_png_frames(bytes)?,
        other => {
            return Err(Error::UnsupportedFormat(format!(
                "{other} is not an animated input format"
            )))
        }
    };

    if frames.is_empty() {
        return Err(Error::Backend("no frames found in animated input".into()));
    }
    let (width, height) = (frames[0].width, frames[0].height);
    if frames.iter().any(|f| f.width != width || f.height != height) {
        return Err(Error::Backend(
            "animated input has frames of differing sizes".into(),
        ));
    }
    Ok(frames)
}

fn decode_webp_frames(bytes: &[u8]) -> Result<Vec<RgbaFrame>> {
    let decoder = webp_animation::Decoder::new(bytes)
        .map_err(|e| Error::Backend(format!("failed to decode WebP: {e:?}")))?;
    let (width, height) = decoder.dimensions();

    // timestamp(i) is when frame i ends; duration = timestamp delta.
    let mut frames = Vec::new();
    let mut prev_timestamp = 0i32;
    for frame in decoder {
        let delay = (frame.timestamp() - prev_timestamp).max(1);
        prev_timestamp = frame.timestamp();
        frames.push(RgbaFrame {
            rgba: frame.data().to_vec(),
            width,
            height,
            delay_ms: u32::try_from(delay).unwrap_or(DEFAULT_DELAY_MS),
        });
    }
    Ok(frames)
}

fn decode_image_frames<'a, D: AnimationDecoder<'a>>(decoder: D) -> Result<Vec<RgbaFrame>> {
    let frames = decoder
        .into_frames()
        .collect_frames()
        .map_err(|e| Error::Backend(format!("failed to decode animation frames: {e}")))?;

    Ok(frames
        .into_iter()
        .map(|frame| {
            let (numerator, denominator) = frame.delay().numer_denom_ms();
            let delay_ms = (numerator / denominator.max(1)).max(1);
            let buffer = frame.into_buffer();
            RgbaFrame {
                width: buffer.width(),
                height: buffer.height(),
                rgba: buffer.into_raw(),
                delay_ms,
            }
        })
        .collect())
}

fn decode_png_frames(bytes: &[u8]) -> Result<Vec<RgbaFrame>> {
    let decoder = PngDecoder::new(Cursor::new(bytes))
        .map_err(|e| Error::Backend(format!("failed to open PNG: {e}")))?;
    let is_apng = decoder
        .is_apng()
        .map_err(|e| Error::Backend(format!("failed to probe APNG: {e}")))?;

    if is_apng {
        let apng = decoder
            .apng()
            .map_err(|e| Error::Backend(format!("failed to open APNG stream: {e}")))?;
        return decode_image_frames(apng);
    }

    // Single-frame PNG: one full-canvas frame with the default delay.
    let image = image_rs::load_from_memory(bytes)
        .map_err(|e| Error::Backend(format!("failed to decode PNG: {e}")))?;
    let (width, height) = image.dimensions();
    Ok(vec![RgbaFrame {
        rgba: image.to_rgba8().into_raw(),
        width,
        height,
        delay_ms: DEFAULT_DELAY_MS,
    }])
}

/// Re-encodes decoded frames into the target animated format.
pub fn encode_frames(frames: &[RgbaFrame], target: SupportedFormat) -> Result<Vec<u8>> {
    match target {
        SupportedFormat::Gif => encode_gif(frames),
        SupportedFormat::Apng => encode_apng(frames),
        SupportedFormat::Webp => encode_webp(frames),
        other => Err(Error::UnsupportedFormat(format!(
            "{other} is not an animated output format"
        ))),
    }
}

fn encode_gif(frames: &[RgbaFrame]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    {
        let mut encoder = GifEncoder::new(&mut out);
        encoder
            .set_repeat(Repeat::Infinite)
            .map_err(|e| Error::Backend(format!("failed to set GIF repeat: {e}")))?;
        for frame in frames {
            let buffer =
                image_rs::RgbaImage::from_raw(frame.width, frame.height, frame.rgba.clone())
                    .ok_or_else(|| Error::Backend("frame buffer has unexpected size".into()))?;
            let delay = Delay::from_numer_denom_ms(frame.delay_ms, 1);
            encoder
                .encode_frame(Frame::from_parts(buffer, 0, 0, delay))
                .map_err(|e| Error::Backend(format!("failed to encode GIF frame: {e}")))?;
        }
    }
    Ok(out)
}

fn encode_apng(frames: &[RgbaFrame]) -> Result<Vec<u8>> {
    let (width, height) = (frames[0].width, frames[0].height);
    // Uniform pacing: the png writer sets the delay ahead of the frame
    // stream, so the first frame's delay applies to the animation.
    let delay_ms = u16::try_from(frames[0].delay_ms).unwrap_or(u16::MAX);
    let frame_count = u32::try_from(frames.len())
        .map_err(|_| Error::Backend("too many frames for APNG".into()))?;

    let mut out = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut out, width, height);
        encoder.set_color(png::ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);
        encoder
            .set_animated(frame_count, 0)
            .map_err(|e| Error::Backend(format!("failed to mark PNG as animated: {e}")))?;
        encoder
            .set_frame_delay(delay_ms, 1000)
            .map_err(|e| Error::Backend(format!("failed to set APNG delay: {e}")))?;

        let mut writer = encoder
            .write_header()
            .map_err(|e| Error::Backend(format!("failed to write APNG header: {e}")))?;
        for frame in frames {
            writer
                .write_image_data(&frame.rgba)
                .map_err(|e| Error::Backend(format!("failed to write APNG frame: {e}")))?;
        }
        writer
            .finish()
            .map_err(|e| Error::Backend(format!("failed to finish APNG: {e}")))?;
    }
    Ok(out)
}

fn encode_webp(frames: &[RgbaFrame]) -> Result<Vec<u8>> {
    let (width, height) = (frames[0].width, frames[0].height);
    let mut encoder = webp_animation::Encoder::new((width, height))
        .map_err(|e| Error::Backend(format!("failed to create WebP encoder: {e:?}")))?;

    let mut timestamp = 0i32;
    for frame in frames {
        encoder
            .add_frame(&frame.rgba, timestamp)
            .map_err(|e| Error::Backend(format!("failed to add WebP frame: {e:?}")))?;
        timestamp += i32::try_from(frame.delay_ms).unwrap_or(i32::from(u16::MAX));
    }
    let data = encoder
        .finalize(timestamp)
        .map_err(|e| Error::Backend(format!("failed to finalize WebP: {e:?}")))?;
    Ok(data.to_vec())
}

/// Encodes one frame as PNG, the universally previewable format.
pub fn encode_frame_png(frame: &RgbaFrame) -> Result<Vec<u8>> {
    let buffer = image_rs::RgbaImage::from_raw(frame.width, frame.height, frame.rgba.clone())
        .ok_or_else(|| Error::Backend("frame buffer has unexpected size".into()))?;
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(buffer)
        .write_to(&mut out, image_rs::ImageFormat::Png)
        .map_err(|e| Error::Backend(format!("failed to encode PNG frame: {e}")))?;
    Ok(out.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid_frame(delay_ms: u32, value: u8) -> RgbaFrame {
        RgbaFrame {
            rgba: vec![value; 4 * 4 * 4],
            width: 4,
            height: 4,
            delay_ms,
        }
    }

    #[test]
    fn gif_round_trip_preserves_frame_count() {
        let frames = vec![solid_frame(40, 10), solid_frame(40, 200)];
        let encoded = encode_frames(&frames, SupportedFormat::Gif).expect("gif encode");

        assert_eq!(count_gif_frames(&encoded).expect("gif count"), 2);
        let decoded = decode_frames(&encoded, SupportedFormat::Gif).expect("gif decode");
        assert_eq!(decoded.len(), 2);
        assert_eq!((decoded[0].width, decoded[0].height), (4, 4));
    }

    #[test]
    fn apng_encode_carries_animation_marker() {
        let frames = vec![solid_frame(50, 0), solid_frame(50, 255)];
        let encoded = encode_frames(&frames, SupportedFormat::Apng).expect("apng encode");

        assert!(has_apng_marker(&encoded));
        assert!(is_animated(&encoded, SupportedFormat::Apng).expect("apng detect"));

        let decoded = decode_frames(&encoded, SupportedFormat::Apng).expect("apng decode");
        assert_eq!(decoded.len(), 2);
    }

    #[test]
    fn webp_encode_carries_animation_marker() {
        let frames = vec![solid_frame(50, 0), solid_frame(50, 255)];
        let encoded = encode_frames(&frames, SupportedFormat::Webp).expect("webp encode");

        assert!(has_webp_animation_marker(&encoded));
        let decoded = decode_frames(&encoded, SupportedFormat::Webp).expect("webp decode");
        assert_eq!(decoded.len(), 2);
    }

    #[test]
    fn single_frame_png_decodes_to_one_frame() {
        let encoded = encode_frame_png(&solid_frame(10, 128)).expect("png encode");
        assert!(!has_apng_marker(&encoded));
        assert!(!is_animated(&encoded, SupportedFormat::Png).expect("png detect"));

        let frames = decode_frames(&encoded, SupportedFormat::Png).expect("png decode");
        assert_eq!(frames.len(), 1);
    }

    #[test]
    fn static_webp_has_no_marker() {
        // A plain lossless WebP written by the raster path has no ANMF chunk.
        let buffer = image_rs::RgbaImage::from_pixel(4, 4, image_rs::Rgba([1, 2, 3, 255]));
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(buffer)
            .write_to(&mut out, image_rs::ImageFormat::WebP)
            .expect("webp encode");
        assert!(!has_webp_animation_marker(out.get_ref()));
    }

    #[test]
    fn unsupported_detection_input_errors() {
        let result = is_animated(&[0u8; 8], SupportedFormat::Jpeg);
        assert!(matches!(result, Err(Error::UnsupportedFormat(_))));
    }

    #[test]
    fn malformed_gif_is_a_backend_error() {
        let result = decode_frames(b"GIF89a-but-not-really", SupportedFormat::Gif);
        assert!(result.is_err());
    }
}
