// SPDX-License-Identifier: MPL-2.0
//! Format registry and inference.
//!
//! The set of supported formats is closed and defined at process start.
//! Inference matches the declared MIME type first and falls back to the
//! file name extension.

use std::fmt;

/// The closed set of formats the pipeline knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SupportedFormat {
    Jpeg,
    Png,
    Apng,
    Gif,
    Webp,
    Bmp,
    Tiff,
    Ico,
    Svg,
    Psd,
    Jxl,
    Mp4,
    Webm,
    Mov,
    Mkv,
}

impl fmt::Display for SupportedFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SupportedFormat::Jpeg => "JPEG",
            SupportedFormat::Png => "PNG",
            SupportedFormat::Apng => "APNG",
            SupportedFormat::Gif => "GIF",
            SupportedFormat::Webp => "WebP",
            SupportedFormat::Bmp => "BMP",
            SupportedFormat::Tiff => "TIFF",
            SupportedFormat::Ico => "ICO",
            SupportedFormat::Svg => "SVG",
            SupportedFormat::Psd => "PSD",
            SupportedFormat::Jxl => "JPEG XL",
            SupportedFormat::Mp4 => "MP4",
            SupportedFormat::Webm => "WebM",
            SupportedFormat::Mov => "QuickTime",
            SupportedFormat::Mkv => "Matroska",
        };
        write!(f, "{name}")
    }
}

/// One registry entry: a format name paired with its MIME type and the
/// file extensions it is recognized by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatDescriptor {
    pub name: SupportedFormat,
    pub mime_type: &'static str,
    pub extensions: &'static [&'static str],
}

/// The registry. Order matters: inference returns the first match, so
/// `Png` precedes `Apng` and plain `.png` files infer as PNG.
pub const REGISTRY: &[FormatDescriptor] = &[
    FormatDescriptor {
        name: SupportedFormat::Jpeg,
        mime_type: "image/jpeg",
        extensions: &[".jpg", ".jpeg"],
    },
    FormatDescriptor {
        name: SupportedFormat::Png,
        mime_type: "image/png",
        extensions: &[".png"],
    },
    FormatDescriptor {
        name: SupportedFormat::Apng,
        mime_type: "image/apng",
        extensions: &[".apng"],
    },
    FormatDescriptor {
        name: SupportedFormat::Gif,
        mime_type: "image/gif",
        extensions: &[".gif"],
    },
    FormatDescriptor {
        name: SupportedFormat::Webp,
        mime_type: "image/webp",
        extensions: &[".webp"],
    },
    FormatDescriptor {
        name: SupportedFormat::Bmp,
        mime_type: "image/bmp",
        extensions: &[".bmp"],
    },
    FormatDescriptor {
        name: SupportedFormat::Tiff,
        mime_type: "image/tiff",
        extensions: &[".tiff", ".tif"],
    },
    FormatDescriptor {
        name: SupportedFormat::Ico,
        mime_type: "image/x-icon",
        extensions: &[".ico"],
    },
    FormatDescriptor {
        name: SupportedFormat::Svg,
        mime_type: "image/svg+xml",
        extensions: &[".svg"],
    },
    FormatDescriptor {
        name: SupportedFormat::Psd,
        mime_type: "image/vnd.adobe.photoshop",
        extensions: &[".psd"],
    },
    FormatDescriptor {
        name: SupportedFormat::Jxl,
        mime_type: "image/jxl",
        extensions: &[".jxl"],
    },
    FormatDescriptor {
        name: SupportedFormat::Mp4,
        mime_type: "video/mp4",
        extensions: &[".mp4", ".m4v"],
    },
    FormatDescriptor {
        name: SupportedFormat::Webm,
        mime_type: "video/webm",
        extensions: &[".webm"],
    },
    FormatDescriptor {
        name: SupportedFormat::Mov,
        mime_type: "video/quicktime",
        extensions: &[".mov"],
    },
    FormatDescriptor {
        name: SupportedFormat::Mkv,
        mime_type: "video/x-matroska",
        extensions: &[".mkv"],
    },
];

/// Returns the registry entry for a format name.
#[must_use]
pub fn descriptor(format: SupportedFormat) -> &'static FormatDescriptor {
    REGISTRY
        .iter()
        .find(|d| d.name == format)
        .unwrap_or_else(|| unreachable!("every SupportedFormat has a registry entry"))
}

/// Infers a format from a declared MIME type and a file name.
///
/// The MIME type wins when it is recognized, regardless of the file name.
/// Otherwise the first descriptor with a matching extension suffix wins.
/// Both inputs are compared case-insensitively.
#[must_use]
pub fn infer_format(mime_type: &str, file_name: &str) -> Option<&'static FormatDescriptor> {
    let mime = mime_type.to_lowercase();
    let name = file_name.to_lowercase();

    if let Some(desc) = REGISTRY.iter().find(|d| d.mime_type == mime) {
        return Some(desc);
    }

    REGISTRY
        .iter()
        .find(|d| d.extensions.iter().any(|ext| name.ends_with(ext)))
}
