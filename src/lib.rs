// SPDX-License-Identifier: MPL-2.0
//! `picforge` is the image format conversion and animation-processing
//! pipeline behind a gallery upload flow.
//!
//! It infers a file's format, detects whether it is animated, routes it
//! through one of several interchangeable conversion backends and
//! reconciles the results (processed file plus an optional preview
//! frame) into a single output contract, with cooperative cancellation
//! and an ordered progress transcript throughout.

#![doc(html_root_url = "https://docs.rs/picforge/0.3.0")]

pub mod asset;
pub mod backend;
pub mod config;
pub mod convert;
pub mod detect;
pub mod error;
pub mod format;
pub mod pipeline;
pub mod session;

// Re-export the types most callers touch.
pub use asset::{ImageFile, SourceAsset, UploadTarget};
pub use backend::{AnimatedOutput, ImagePayload};
pub use config::Config;
pub use convert::Converter;
pub use error::{Error, Result};
pub use format::{infer_format, FormatDescriptor, SupportedFormat};
pub use pipeline::{process_selected_file, ProcessedUpload, SizeChange};
pub use session::{CancellationToken, LogSink, TranscodeLogBus};
