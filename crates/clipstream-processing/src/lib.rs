//! Transcoder driver: turns a raw upload into a delivery-ready MP4 and a
//! poster frame by driving an external ffmpeg process.

pub mod transcoder;

pub use transcoder::{FfmpegTranscoder, TranscodeError, TranscodeResult, Transcoder};
