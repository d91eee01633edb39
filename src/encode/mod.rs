//! Encoding sinks.
//!
//! Sinks consume composed frames in timeline order and are driven by the
//! export pipeline.

/// `ffmpeg`-based sinks (MP4/WebM output via system `ffmpeg`).
pub mod ffmpeg;
/// Generic frame sink trait and built-in sinks.
pub mod sink;
