// SPDX-License-Identifier: MPL-2.0
//! Worker protocol for the codec backend.
//!
//! Every request spawns exactly one blocking worker. The worker streams
//! [`CodecResponse::Log`] lines over an mpsc channel, posts one terminal
//! message (`Finished`, `Failed` or `Aborted`) and exits — it is never
//! reused across requests. The caller forwards log lines to its sink in
//! arrival order before consuming the terminal message.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::format::SupportedFormat;
use crate::session::{CancellationToken, LogSink};

use super::super::ensure_live;
use super::frames;

/// One request processed by one worker.
#[derive(Debug, Clone)]
pub enum CodecRequest {
    DetectAnimation {
        bytes: Arc<Vec<u8>>,
        source: SupportedFormat,
    },
    ConvertAnimated {
        bytes: Arc<Vec<u8>>,
        source: SupportedFormat,
        target: SupportedFormat,
    },
    ExtractFirstFrame {
        bytes: Arc<Vec<u8>>,
        source: SupportedFormat,
    },
    DecodeLayered {
        bytes: Arc<Vec<u8>>,
    },
}

/// Successful outcome of a request, tagged by operation.
#[derive(Debug)]
pub enum CodecPayload {
    Detected(bool),
    Converted {
        converted: Vec<u8>,
        target: SupportedFormat,
        first_frame: Vec<u8>,
    },
    FirstFrame(Vec<u8>),
    /// Layered document flattened and re-encoded as PNG.
    Decoded(Vec<u8>),
}

/// Messages posted by the worker. `Log` lines interleave with the work;
/// the other three are terminal.
#[derive(Debug)]
enum CodecResponse {
    Log(String),
    Finished(CodecPayload),
    Failed(String),
    Aborted,
}

/// Runs one request on a fresh worker and awaits its terminal message.
pub async fn run(
    token: &CancellationToken,
    request: CodecRequest,
    log: &LogSink,
) -> Result<CodecPayload> {
    ensure_live(token)?;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let worker_token = Arc::clone(token);
    tokio::task::spawn_blocking(move || {
        let outcome = execute(&worker_token, request, &tx);
        let terminal = match outcome {
            Ok(payload) => CodecResponse::Finished(payload),
            Err(Error::Aborted) => CodecResponse::Aborted,
            Err(e) => CodecResponse::Failed(e.to_string()),
        };
        // Receiver may already be gone when the caller was dropped.
        let _ = tx.send(terminal);
    });

    while let Some(message) = rx.recv().await {
        match message {
            CodecResponse::Log(line) => log(&line),
            CodecResponse::Finished(payload) => return Ok(payload),
            CodecResponse::Failed(message) => return Err(Error::Backend(message)),
            CodecResponse::Aborted => return Err(Error::Aborted),
        }
    }
    Err(Error::Resource(
        "codec worker exited without a terminal response".into(),
    ))
}

fn execute(
    token: &CancellationToken,
    request: CodecRequest,
    tx: &mpsc::UnboundedSender<CodecResponse>,
) -> Result<CodecPayload> {
    let relay = |line: String| {
        let _ = tx.send(CodecResponse::Log(line));
    };

    ensure_live(token)?;
    match request {
        CodecRequest::DetectAnimation { bytes, source } => {
            relay(format!("Inspecting {source} content for animation"));
            let animated = frames::is_animated(&bytes, source)?;
            relay(format!(
                "Detection finished: {}",
                if animated { "animated" } else { "static" }
            ));
            Ok(CodecPayload::Detected(animated))
        }
        CodecRequest::ConvertAnimated {
            bytes,
            source,
            target,
        } => {
            relay(format!("Decoding animated {source}"));
            let decoded = frames::decode_frames(&bytes, source)?;
            relay(format!("Decoded {} frames", decoded.len()));
            ensure_live(token)?;

            let converted = frames::encode_frames(&decoded, target)?;
            relay(format!("Encoded {target} ({} bytes)", converted.len()));
            ensure_live(token)?;

            let first_frame = frames::encode_frame_png(&decoded[0])?;
            Ok(CodecPayload::Converted {
                converted,
                target,
                first_frame,
            })
        }
        CodecRequest::ExtractFirstFrame { bytes, source } => {
            relay(format!("Extracting first frame from {source}"));
            let decoded = frames::decode_frames(&bytes, source)?;
            ensure_live(token)?;
            let first_frame = frames::encode_frame_png(&decoded[0])?;
            relay(format!("First frame ready ({} bytes)", first_frame.len()));
            Ok(CodecPayload::FirstFrame(first_frame))
        }
        CodecRequest::DecodeLayered { bytes } => {
            relay("Flattening layered document".to_string());
            let document = psd::Psd::from_bytes(&bytes)
                .map_err(|e| Error::Backend(format!("failed to parse PSD: {e:?}")))?;
            ensure_live(token)?;

            let frame = frames::RgbaFrame {
                rgba: document.rgba(),
                width: document.width(),
                height: document.height(),
                delay_ms: 0,
            };
            let png = frames::encode_frame_png(&frame)?;
            relay(format!("Flattened composite ready ({} bytes)", png.len()));
            Ok(CodecPayload::Decoded(png))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{new_token, signal};
    use std::sync::Mutex;

    fn collecting_sink() -> (LogSink, Arc<Mutex<Vec<String>>>) {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let captured = Arc::clone(&lines);
        let sink: LogSink = Arc::new(move |line: &str| {
            captured.lock().unwrap().push(line.to_string());
        });
        (sink, lines)
    }

    fn animated_gif() -> Arc<Vec<u8>> {
        let frames = vec![
            frames::RgbaFrame {
                rgba: vec![0; 4 * 4 * 4],
                width: 4,
                height: 4,
                delay_ms: 40,
            },
            frames::RgbaFrame {
                rgba: vec![255; 4 * 4 * 4],
                width: 4,
                height: 4,
                delay_ms: 40,
            },
        ];
        Arc::new(frames::encode_frames(&frames, SupportedFormat::Gif).expect("gif encode"))
    }

    #[tokio::test]
    async fn detection_request_round_trips() {
        let (sink, lines) = collecting_sink();
        let payload = run(
            &new_token(),
            CodecRequest::DetectAnimation {
                bytes: animated_gif(),
                source: SupportedFormat::Gif,
            },
            &sink,
        )
        .await
        .expect("detection should succeed");

        assert!(matches!(payload, CodecPayload::Detected(true)));
        let lines = lines.lock().unwrap();
        assert!(!lines.is_empty(), "log lines are relayed before the result");
    }

    #[tokio::test]
    async fn conversion_always_returns_a_first_frame() {
        let payload = run(
            &new_token(),
            CodecRequest::ConvertAnimated {
                bytes: animated_gif(),
                source: SupportedFormat::Gif,
                target: SupportedFormat::Apng,
            },
            &crate::session::null_sink(),
        )
        .await
        .expect("conversion should succeed");

        match payload {
            CodecPayload::Converted {
                converted,
                target,
                first_frame,
            } => {
                assert_eq!(target, SupportedFormat::Apng);
                assert!(frames::has_apng_marker(&converted));
                assert!(!first_frame.is_empty());
            }
            other => panic!("expected Converted payload, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn pre_signalled_token_aborts() {
        let token = new_token();
        signal(&token);
        let result = run(
            &token,
            CodecRequest::ExtractFirstFrame {
                bytes: animated_gif(),
                source: SupportedFormat::Gif,
            },
            &crate::session::null_sink(),
        )
        .await;
        assert!(matches!(result, Err(Error::Aborted)));
    }

    #[tokio::test]
    async fn malformed_input_surfaces_a_backend_error() {
        let result = run(
            &new_token(),
            CodecRequest::ConvertAnimated {
                bytes: Arc::new(b"junk".to_vec()),
                source: SupportedFormat::Gif,
                target: SupportedFormat::Apng,
            },
            &crate::session::null_sink(),
        )
        .await;
        assert!(matches!(result, Err(Error::Backend(_))));
    }
}
