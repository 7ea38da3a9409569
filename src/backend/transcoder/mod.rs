// SPDX-License-Identifier: MPL-2.0
//! General transcoder backend: the system `ffmpeg` engine, spawned once
//! per operation inside a fresh temp directory and never reused.
//!
//! Each target format maps to one command template (see [`templates`]).
//! Abort kills the engine process before the operation settles; the
//! working directory is removed on every exit path.

pub mod templates;

use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::Command;

use crate::error::{Error, Result};
use crate::format::SupportedFormat;
use crate::session::{is_cancelled, CancellationToken, LogSink};

use super::codec;
use super::{ensure_live, ensure_nonempty, AnimatedOutput, ImagePayload};

pub use templates::supports_target;

/// How often an in-flight engine run polls its cancellation token.
const ABORT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Source formats the engine cannot read directly; they are normalized
/// to APNG by the codec backend before the command matrix applies.
pub const PREPROCESS_SOURCES: &[SupportedFormat] = &[SupportedFormat::Webp];

#[must_use]
pub fn needs_preprocessing(source: SupportedFormat) -> bool {
    PREPROCESS_SOURCES.contains(&source)
}

/// Output of the normalization stage: the intermediate animation plus
/// the first frame the normalization naturally produced.
#[derive(Debug, Clone)]
pub struct PreprocessedAnimation {
    pub intermediate: ImagePayload,
    pub first_frame: ImagePayload,
}

/// Probes whether the engine binary can be invoked.
#[must_use]
pub fn is_engine_available(binary: &str) -> bool {
    std::process::Command::new(binary)
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Normalizes a source the engine cannot read into an intermediate
/// animated format. Returns `None` when no normalization is needed.
///
/// The normalization itself runs on the codec backend, which also
/// yields the first frame; callers reuse that frame instead of issuing
/// a second extraction.
pub async fn preprocess(
    token: &CancellationToken,
    bytes: Arc<Vec<u8>>,
    source: SupportedFormat,
    log: &LogSink,
) -> Result<Option<PreprocessedAnimation>> {
    if !needs_preprocessing(source) {
        return Ok(None);
    }
    log(&format!("Normalizing {source} for the transcoder engine"));

    match codec::convert_animated(token, bytes, source, SupportedFormat::Apng, log).await? {
        AnimatedOutput::ConvertedWithFirstFrame {
            converted,
            first_frame,
        } => Ok(Some(PreprocessedAnimation {
            intermediate: converted,
            first_frame,
        })),
        AnimatedOutput::ConvertedOnly(converted) => {
            // Codec conversions always carry a first frame; tolerate the
            // other shape by treating the frame as unavailable.
            Err(Error::Backend(format!(
                "normalization of {} returned no first frame",
                converted.format
            )))
        }
    }
}

/// Runs the target's command template against `bytes`, optionally
/// running the first-frame extraction command concurrently against the
/// same input.
pub async fn convert(
    token: &CancellationToken,
    engine_binary: &str,
    bytes: Arc<Vec<u8>>,
    source: SupportedFormat,
    target: SupportedFormat,
    extract_first_frame: bool,
    log: &LogSink,
) -> Result<AnimatedOutput> {
    let template = templates::template_for(target).ok_or_else(|| {
        Error::UnsupportedFormat(format!("no engine template for target {target}"))
    })?;
    ensure_live(token)?;

    // Removed on drop: success, failure and abort all clean up.
    let workdir = tempfile::tempdir()
        .map_err(|e| Error::Resource(format!("failed to create engine workspace: {e}")))?;

    let input_path = workdir
        .path()
        .join(format!("input.{}", templates::working_extension(source)));
    let output_path = workdir
        .path()
        .join(format!("output.{}", templates::working_extension(target)));

    tokio::fs::write(&input_path, bytes.as_slice())
        .await
        .map_err(|e| Error::Io(format!("failed to stage engine input: {e}")))?;

    let convert_args = templates::substitute(template, &input_path, &output_path);

    if extract_first_frame {
        let frame_path = workdir.path().join("frame.png");
        let extract_args = templates::substitute(templates::EXTRACT_TEMPLATE, &input_path, &frame_path);

        log(&format!("Running engine: {target} conversion + frame extraction"));
        tokio::try_join!(
            run_engine(engine_binary, &convert_args, token, log),
            run_engine(engine_binary, &extract_args, token, log),
        )?;

        let converted = read_output(&output_path, "engine conversion").await?;
        let first_frame = read_output(&frame_path, "engine frame extraction").await?;
        Ok(AnimatedOutput::ConvertedWithFirstFrame {
            converted: ImagePayload::new(converted, target),
            first_frame: ImagePayload::new(first_frame, SupportedFormat::Png),
        })
    } else {
        log(&format!("Running engine: {target} conversion"));
        run_engine(engine_binary, &convert_args, token, log).await?;

        let converted = read_output(&output_path, "engine conversion").await?;
        Ok(AnimatedOutput::ConvertedOnly(ImagePayload::new(
            converted, target,
        )))
    }
}

/// Extracts a single PNG frame without converting the full asset.
pub async fn extract_first_frame(
    token: &CancellationToken,
    engine_binary: &str,
    bytes: Arc<Vec<u8>>,
    source: SupportedFormat,
    log: &LogSink,
) -> Result<ImagePayload> {
    ensure_live(token)?;

    let workdir = tempfile::tempdir()
        .map_err(|e| Error::Resource(format!("failed to create engine workspace: {e}")))?;
    let input_path = workdir
        .path()
        .join(format!("input.{}", templates::working_extension(source)));
    let frame_path = workdir.path().join("frame.png");

    tokio::fs::write(&input_path, bytes.as_slice())
        .await
        .map_err(|e| Error::Io(format!("failed to stage engine input: {e}")))?;

    let args = templates::substitute(templates::EXTRACT_TEMPLATE, &input_path, &frame_path);
    log("Running engine: frame extraction");
    run_engine(engine_binary, &args, token, log).await?;

    let frame = read_output(&frame_path, "engine frame extraction").await?;
    Ok(ImagePayload::new(frame, SupportedFormat::Png))
}

async fn read_output(path: &Path, context: &str) -> Result<Vec<u8>> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|_| Error::Backend(format!("{context} produced no output file")))?;
    ensure_nonempty(bytes, context)
}

/// Spawns one engine process and waits for it, killing it as soon as
/// the token fires. Stderr is drained and surfaced on failure.
async fn run_engine(
    binary: &str,
    args: &[String],
    token: &CancellationToken,
    log: &LogSink,
) -> Result<()> {
    log(&format!("engine {}", args.join(" ")));

    let mut child = Command::new(binary)
        .args(["-hide_banner", "-loglevel", "error", "-y"])
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| {
            Error::Resource(format!(
                "failed to spawn transcoder engine (is it installed and on PATH?): {e}"
            ))
        })?;

    let mut stderr = child
        .stderr
        .take()
        .ok_or_else(|| Error::Resource("failed to open engine stderr".into()))?;
    let drain = tokio::spawn(async move {
        let mut buffer = String::new();
        let _ = stderr.read_to_string(&mut buffer).await;
        buffer
    });

    let status = tokio::select! {
        status = child.wait() => {
            status.map_err(|e| Error::Resource(format!("failed to wait for engine: {e}")))?
        }
        () = watch_abort(token) => {
            // Terminate the engine before this operation settles.
            let _ = child.start_kill();
            let _ = child.wait().await;
            drain.abort();
            return Err(Error::Aborted);
        }
    };

    let stderr_text = drain.await.unwrap_or_default();
    if !status.success() {
        return Err(Error::Backend(format!(
            "engine exited with status {}: {}",
            status,
            stderr_text.trim()
        )));
    }
    Ok(())
}

async fn watch_abort(token: &CancellationToken) {
    loop {
        if is_cancelled(token) {
            return;
        }
        tokio::time::sleep(ABORT_POLL_INTERVAL).await;
    }
}
