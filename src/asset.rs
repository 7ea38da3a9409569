// SPDX-License-Identifier: MPL-2.0
//! Input assets, the working aggregate and upload-target capabilities.

use std::sync::Arc;

use crate::backend::ImagePayload;
use crate::format::{infer_format, FormatDescriptor, SupportedFormat};

/// The raw user-selected input: bytes plus the name and MIME type the
/// originating environment reported (not necessarily accurate).
///
/// Immutable for its whole lifetime; the pipeline only reads it.
#[derive(Debug, Clone)]
pub struct SourceAsset {
    pub bytes: Arc<Vec<u8>>,
    pub file_name: String,
    pub mime_type: String,
}

impl SourceAsset {
    #[must_use]
    pub fn new(bytes: Vec<u8>, file_name: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes: Arc::new(bytes),
            file_name: file_name.into(),
            mime_type: mime_type.into(),
        }
    }

    /// Infers the asset's format from its declared MIME type and name.
    #[must_use]
    pub fn infer(&self) -> Option<&'static FormatDescriptor> {
        infer_format(&self.mime_type, &self.file_name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// The pipeline's working aggregate and output contract.
///
/// `original` is set at construction and never changes. `preview` and
/// `processed` are set by the pipeline; a later set overwrites. The
/// aggregate is owned exclusively by the caller that constructed it.
#[derive(Debug, Clone)]
pub struct ImageFile {
    original: SourceAsset,
    original_format: SupportedFormat,
    preview: Option<ImagePayload>,
    processed: Option<ImagePayload>,
    pub title: String,
    pub description: String,
    dimensions: Option<(u32, u32)>,
}

impl ImageFile {
    #[must_use]
    pub fn new(original: SourceAsset, original_format: SupportedFormat) -> Self {
        Self {
            original,
            original_format,
            preview: None,
            processed: None,
            title: String::new(),
            description: String::new(),
            dimensions: None,
        }
    }

    #[must_use]
    pub fn original(&self) -> &SourceAsset {
        &self.original
    }

    #[must_use]
    pub fn original_format(&self) -> SupportedFormat {
        self.original_format
    }

    /// Lightweight representative frame for UI preview.
    #[must_use]
    pub fn preview(&self) -> Option<&ImagePayload> {
        self.preview.as_ref()
    }

    /// Final converted output. Absent means the original is acceptable
    /// as-is.
    #[must_use]
    pub fn processed(&self) -> Option<&ImagePayload> {
        self.processed.as_ref()
    }

    pub fn set_preview(&mut self, preview: ImagePayload) {
        self.preview = Some(preview);
    }

    pub fn set_processed(&mut self, processed: ImagePayload) {
        self.processed = Some(processed);
    }

    /// Records pixel dimensions once they are known.
    pub fn set_dimensions(&mut self, width: u32, height: u32) {
        self.dimensions = Some((width, height));
    }

    #[must_use]
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.dimensions
    }
}

/// Capability descriptor of an upload destination.
///
/// The format lists are ordered: the first entry is the preferred
/// fallback target when conversion is needed.
#[derive(Debug, Clone)]
pub struct UploadTarget {
    pub name: String,
    pub supported_static_formats: Vec<SupportedFormat>,
    pub supported_animation_formats: Vec<SupportedFormat>,
}

impl UploadTarget {
    #[must_use]
    pub fn accepts_static(&self, format: SupportedFormat) -> bool {
        self.supported_static_formats.contains(&format)
    }

    #[must_use]
    pub fn accepts_animation(&self, format: SupportedFormat) -> bool {
        self.supported_animation_formats.contains(&format)
    }

    #[must_use]
    pub fn static_fallback(&self) -> Option<SupportedFormat> {
        self.supported_static_formats.first().copied()
    }

    #[must_use]
    pub fn animation_fallback(&self) -> Option<SupportedFormat> {
        self.supported_animation_formats.first().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn asset_inference_uses_mime_then_extension() {
        let asset = SourceAsset::new(vec![1, 2, 3], "photo.xyz", "image/bmp");
        assert_eq!(asset.infer().map(|d| d.name), Some(SupportedFormat::Bmp));

        let asset = SourceAsset::new(vec![1, 2, 3], "photo.bmp", "application/octet-stream");
        assert_eq!(asset.infer().map(|d| d.name), Some(SupportedFormat::Bmp));

        let asset = SourceAsset::new(vec![1, 2, 3], "file.xyz", "application/octet-stream");
        assert!(asset.infer().is_none());
    }

    #[test]
    fn image_file_setters_overwrite() {
        let asset = SourceAsset::new(vec![0u8; 8], "a.png", "image/png");
        let mut image = ImageFile::new(asset, SupportedFormat::Png);
        assert!(image.preview().is_none());
        assert!(image.processed().is_none());

        image.set_preview(ImagePayload::new(vec![1], SupportedFormat::Png));
        image.set_preview(ImagePayload::new(vec![2], SupportedFormat::Png));
        assert_eq!(image.preview().map(|p| p.bytes[0]), Some(2));

        image.set_dimensions(640, 480);
        assert_eq!(image.dimensions(), Some((640, 480)));
    }

    #[test]
    fn upload_target_fallback_is_the_first_entry() {
        let target = UploadTarget {
            name: "host".into(),
            supported_static_formats: vec![SupportedFormat::Webp, SupportedFormat::Png],
            supported_animation_formats: vec![SupportedFormat::Apng],
        };

        assert!(target.accepts_static(SupportedFormat::Png));
        assert!(!target.accepts_static(SupportedFormat::Bmp));
        assert_eq!(target.static_fallback(), Some(SupportedFormat::Webp));
        assert_eq!(target.animation_fallback(), Some(SupportedFormat::Apng));
        assert!(!target.accepts_animation(SupportedFormat::Webp));
    }
}
