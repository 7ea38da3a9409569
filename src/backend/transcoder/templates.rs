// SPDX-License-Identifier: MPL-2.0
//! Command templates for the transcoder engine.
//!
//! One template per supported target format, as an argument string with
//! `%input%` / `%output%` placeholders substituted with concrete paths
//! inside the operation's working directory. A missing template means
//! the target is unsupported — a contract violation, not a transient
//! error.

use std::path::Path;

use crate::format::{descriptor, SupportedFormat};

/// One engine invocation recipe for a target format.
#[derive(Debug, Clone, Copy)]
pub struct CommandTemplate {
    pub target: SupportedFormat,
    pub args: &'static str,
}

/// The conversion command matrix. Filter expressions are written without
/// spaces so the templates split on whitespace.
pub const CONVERT_TEMPLATES: &[CommandTemplate] = &[
    CommandTemplate {
        target: SupportedFormat::Gif,
        args: "-i %input% -filter_complex [0:v]split[s0][s1];[s0]palettegen[p];[s1][p]paletteuse -loop 0 %output%",
    },
    CommandTemplate {
        target: SupportedFormat::Apng,
        args: "-i %input% -f apng -plays 0 %output%",
    },
    CommandTemplate {
        target: SupportedFormat::Webp,
        args: "-i %input% -c:v libwebp_anim -lossless 0 -q:v 80 -loop 0 %output%",
    },
    CommandTemplate {
        target: SupportedFormat::Mp4,
        args: "-i %input% -c:v libx264 -pix_fmt yuv420p -vf scale=trunc(iw/2)*2:trunc(ih/2)*2 -movflags +faststart -an %output%",
    },
    CommandTemplate {
        target: SupportedFormat::Webm,
        args: "-i %input% -c:v libvpx-vp9 -pix_fmt yuva420p -b:v 0 -crf 32 -an %output%",
    },
    CommandTemplate {
        target: SupportedFormat::Png,
        args: "-i %input% -frames:v 1 %output%",
    },
    CommandTemplate {
        target: SupportedFormat::Jpeg,
        args: "-i %input% -frames:v 1 -q:v 2 %output%",
    },
];

/// Single-frame extraction command, always producing a PNG.
pub const EXTRACT_TEMPLATE: &str = "-i %input% -frames:v 1 -f image2 -c:v png %output%";

/// Returns the conversion template for a target, if one exists.
#[must_use]
pub fn template_for(target: SupportedFormat) -> Option<&'static str> {
    CONVERT_TEMPLATES
        .iter()
        .find(|t| t.target == target)
        .map(|t| t.args)
}

/// True when the command matrix covers the target.
#[must_use]
pub fn supports_target(target: SupportedFormat) -> bool {
    template_for(target).is_some()
}

/// The on-disk file extension (without the dot) used for a format
/// inside the engine's working directory.
#[must_use]
pub fn working_extension(format: SupportedFormat) -> &'static str {
    descriptor(format).extensions[0].trim_start_matches('.')
}

/// Substitutes the placeholders and splits the template into arguments.
#[must_use]
pub fn substitute(template: &str, input: &Path, output: &Path) -> Vec<String> {
    template
        .split_whitespace()
        .map(|arg| {
            arg.replace("%input%", &input.to_string_lossy())
                .replace("%output%", &output.to_string_lossy())
        })
        .collect()
}
