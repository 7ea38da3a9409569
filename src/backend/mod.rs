// SPDX-License-Identifier: MPL-2.0
//! Conversion backends and their common contract.
//!
//! Four interchangeable backends exist: the in-memory raster backend,
//! the worker-per-call codec backend, the engine-per-call transcoder and
//! the extended JPEG XL decoder. Each exposes pure, synchronous
//! capability predicates plus asynchronous operations taking a
//! cancellation token and a log sink. Operations reject with
//! [`Error::Aborted`](crate::error::Error::Aborted) once the token fires
//! and release every temporary resource on all exit paths.

pub mod codec;
pub mod jxl;
pub mod raster;
pub mod transcoder;

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::format::SupportedFormat;
use crate::session::{is_cancelled, CancellationToken};

/// Converted bytes paired with the format they are encoded in.
///
/// Bytes are reference counted so identity pass-throughs can share the
/// original buffer without copying.
#[derive(Debug, Clone)]
pub struct ImagePayload {
    pub bytes: Arc<Vec<u8>>,
    pub format: SupportedFormat,
}

impl ImagePayload {
    #[must_use]
    pub fn new(bytes: Vec<u8>, format: SupportedFormat) -> Self {
        Self {
            bytes: Arc::new(bytes),
            format,
        }
    }

    /// Wraps an already-shared buffer without copying.
    #[must_use]
    pub fn shared(bytes: Arc<Vec<u8>>, format: SupportedFormat) -> Self {
        Self { bytes, format }
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

/// Result of an animated conversion.
///
/// The two shapes are explicit variants so callers handle the presence
/// of a first frame by matching, never by probing an optional field.
#[derive(Debug, Clone)]
pub enum AnimatedOutput {
    ConvertedOnly(ImagePayload),
    ConvertedWithFirstFrame {
        converted: ImagePayload,
        first_frame: ImagePayload,
    },
}

impl AnimatedOutput {
    #[must_use]
    pub fn converted(&self) -> &ImagePayload {
        match self {
            AnimatedOutput::ConvertedOnly(converted)
            | AnimatedOutput::ConvertedWithFirstFrame { converted, .. } => converted,
        }
    }

    #[must_use]
    pub fn first_frame(&self) -> Option<&ImagePayload> {
        match self {
            AnimatedOutput::ConvertedOnly(_) => None,
            AnimatedOutput::ConvertedWithFirstFrame { first_frame, .. } => Some(first_frame),
        }
    }
}

/// Bails out with `Error::Aborted` once the token has fired.
pub(crate) fn ensure_live(token: &CancellationToken) -> Result<()> {
    if is_cancelled(token) {
        return Err(Error::Aborted);
    }
    Ok(())
}

/// A zero-byte output is always a failure, even when the producing
/// engine reported success.
pub(crate) fn ensure_nonempty(bytes: Vec<u8>, context: &str) -> Result<Vec<u8>> {
    if bytes.is_empty() {
        return Err(Error::Backend(format!("{context} produced an empty output")));
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{new_token, signal};

    #[test]
    fn animated_output_exposes_converted_for_both_shapes() {
        let converted = ImagePayload::new(vec![1, 2, 3], SupportedFormat::Gif);
        let only = AnimatedOutput::ConvertedOnly(converted.clone());
        assert_eq!(only.converted().format, SupportedFormat::Gif);
        assert!(only.first_frame().is_none());

        let with_frame = AnimatedOutput::ConvertedWithFirstFrame {
            converted,
            first_frame: ImagePayload::new(vec![9], SupportedFormat::Png),
        };
        assert_eq!(
            with_frame.first_frame().map(|f| f.format),
            Some(SupportedFormat::Png)
        );
    }

    #[test]
    fn ensure_live_rejects_after_signal() {
        let token = new_token();
        assert!(ensure_live(&token).is_ok());
        signal(&token);
        assert!(matches!(ensure_live(&token), Err(Error::Aborted)));
    }

    #[test]
    fn ensure_nonempty_rejects_empty_output() {
        let err = ensure_nonempty(Vec::new(), "engine").unwrap_err();
        assert!(matches!(err, Error::Backend(_)));
        assert!(ensure_nonempty(vec![0], "engine").is_ok());
    }

    #[test]
    fn shared_payload_does_not_copy() {
        let bytes = Arc::new(vec![5u8; 16]);
        let payload = ImagePayload::shared(Arc::clone(&bytes), SupportedFormat::Png);
        assert!(Arc::ptr_eq(&payload.bytes, &bytes));
    }
}
