// SPDX-License-Identifier: MPL-2.0
//! Pipeline configuration: engine location and encoder quality knobs,
//! persisted as a `transcode.toml` file next to the host application's
//! other settings.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const DEFAULT_ENGINE_BINARY: &str = "ffmpeg";
pub const DEFAULT_JPEG_QUALITY: u8 = 90;
pub const DEFAULT_TRANSCRIPT_CAPACITY: usize = 500;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path or name of the transcoder engine binary.
    #[serde(default)]
    pub engine_binary: Option<String>,
    /// JPEG re-encode quality (1-100).
    #[serde(default)]
    pub jpeg_quality: Option<u8>,
    /// Maximum number of retained transcript lines.
    #[serde(default)]
    pub transcript_capacity: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            engine_binary: Some(DEFAULT_ENGINE_BINARY.to_string()),
            jpeg_quality: Some(DEFAULT_JPEG_QUALITY),
            transcript_capacity: Some(DEFAULT_TRANSCRIPT_CAPACITY),
        }
    }
}

impl Config {
    /// Effective engine binary, falling back to the default name.
    #[must_use]
    pub fn engine_binary(&self) -> &str {
        self.engine_binary.as_deref().unwrap_or(DEFAULT_ENGINE_BINARY)
    }

    /// Effective JPEG quality, clamped to 1-100.
    #[must_use]
    pub fn jpeg_quality(&self) -> u8 {
        self.jpeg_quality.unwrap_or(DEFAULT_JPEG_QUALITY).clamp(1, 100)
    }

    /// Effective transcript capacity (at least 1).
    #[must_use]
    pub fn transcript_capacity(&self) -> usize {
        self.transcript_capacity
            .unwrap_or(DEFAULT_TRANSCRIPT_CAPACITY)
            .max(1)
    }
}

pub fn load_from_path(path: &Path) -> Result<Config> {
    let content = fs::read_to_string(path)?;
    Ok(toml::from_str(&content).unwrap_or_default())
}

pub fn save_to_path(config: &Config, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(config)?;
    fs::write(path, content)?;
    Ok(())
}
