//! ffmpeg invocation for the delivery transcode and the poster frame.
//!
//! The two invocations are independent external-process calls; either can
//! fail on its own. The exit status is surfaced verbatim; stderr is not
//! parsed.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;

#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("{program} exited with {status}")]
    Failed { program: String, status: ExitStatus },
}

pub type TranscodeResult<T> = Result<T, TranscodeError>;

/// Produces delivery artifacts from a local input file. Output paths land
/// next to the input, so a scratch directory cleans up everything at once.
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Transcode to the delivery format; returns the output path.
    async fn transcode(&self, input: &Path) -> TranscodeResult<PathBuf>;

    /// Extract a poster JPEG from the first frame; returns the output path.
    async fn extract_poster(&self, input: &Path) -> TranscodeResult<PathBuf>;
}

/// H.264/AAC progressive MP4 with fast-start metadata, plus a 480-wide
/// first-frame JPEG.
pub struct FfmpegTranscoder {
    ffmpeg_path: String,
    /// Advisory encoder thread count, defaulting to the host CPU count.
    threads: usize,
}

impl FfmpegTranscoder {
    pub fn new(ffmpeg_path: impl Into<String>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            threads: num_cpus::get(),
        }
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    async fn run(&self, args: Vec<String>) -> TranscodeResult<()> {
        let status = Command::new(&self.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|source| TranscodeError::Spawn {
                program: self.ffmpeg_path.clone(),
                source,
            })?;

        if !status.success() {
            return Err(TranscodeError::Failed {
                program: self.ffmpeg_path.clone(),
                status,
            });
        }
        Ok(())
    }
}

fn compressed_output_path(input: &Path) -> PathBuf {
    let mut name = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "video".to_string());
    name.push_str("-compressed.mp4");
    input.with_file_name(name)
}

fn poster_output_path(input: &Path) -> PathBuf {
    input.with_extension("jpg")
}

fn transcode_args(input: &Path, output: &Path, threads: usize) -> Vec<String> {
    vec![
        "-y".into(),
        "-i".into(),
        input.to_string_lossy().into_owned(),
        "-c:v".into(),
        "libx264".into(),
        "-preset".into(),
        "medium".into(),
        "-crf".into(),
        "23".into(),
        "-profile:v".into(),
        "high".into(),
        "-level".into(),
        "4.0".into(),
        "-movflags".into(),
        "+faststart".into(),
        "-c:a".into(),
        "aac".into(),
        "-b:a".into(),
        "128k".into(),
        "-ar".into(),
        "48000".into(),
        "-threads".into(),
        threads.to_string(),
        output.to_string_lossy().into_owned(),
    ]
}

fn poster_args(input: &Path, output: &Path) -> Vec<String> {
    vec![
        "-y".into(),
        "-i".into(),
        input.to_string_lossy().into_owned(),
        "-vf".into(),
        "select=eq(n\\,0),scale=480:-1".into(),
        "-frames:v".into(),
        "1".into(),
        "-q:v".into(),
        "2".into(),
        output.to_string_lossy().into_owned(),
    ]
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn transcode(&self, input: &Path) -> TranscodeResult<PathBuf> {
        let output = compressed_output_path(input);
        tracing::debug!(input = %input.display(), output = %output.display(), "transcoding");
        self.run(transcode_args(input, &output, self.threads)).await?;
        Ok(output)
    }

    async fn extract_poster(&self, input: &Path) -> TranscodeResult<PathBuf> {
        let output = poster_output_path(input);
        self.run(poster_args(input, &output)).await?;
        Ok(output)
    }
}
