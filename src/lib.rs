//! Slidecast composes still-image slideshows into narrated videos.
//!
//! A [`Storyboard`] names an audio track, an ordered image deck, an optional
//! watermark, and a timed word-caption track. The narration audio is the
//! clock: images split its duration evenly, and captions light up over their
//! `[start, end)` windows. One compositor draws both the interactive preview
//! and the offline export, so what you scrub is what you ship.
//!
//! - Load and validate a [`Storyboard`]
//! - Drive a [`PlaybackController`] for interactive preview
//! - Run an [`Exporter`] to encode the whole show through the system `ffmpeg`
#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod foundation;

/// Asset loading and decoding (deck images, watermark, narration audio).
pub mod assets;
/// Encoding sinks.
pub mod encode;
/// Offline export pipeline.
pub mod export;
/// Interactive playback control.
pub mod playback;
/// CPU frame composition.
pub mod render;
/// Storyboard and caption boundary model.
pub mod scene;
/// Time-to-content mapping.
pub mod timeline;

pub use crate::foundation::core::{Affine, Canvas, Fps, FrameIndex, Rect, Rgba8Premul};
pub use crate::foundation::error::{SlidecastError, SlidecastResult};

pub use crate::assets::store::{AssetLoader, LoadTicket, LoadedAssets, WatermarkAsset};
pub use crate::encode::ffmpeg::{CodecChoice, EncoderCaps, FfmpegSink, FfmpegSinkOpts};
pub use crate::encode::sink::{AudioInputConfig, FrameSink, InMemorySink, SinkConfig};
pub use crate::export::{ExportOpts, ExportPhase, ExportStats, Exporter};
pub use crate::playback::{
    ManualTimeSource, PlaybackController, PlaybackSnapshot, PlaybackState, SystemTimeSource,
    TimeSource,
};
pub use crate::render::compositor::{Compositor, CompositorOpts, FrameRGBA};
pub use crate::scene::captions::CaptionWord;
pub use crate::scene::storyboard::{CaptionSource, ExportSettings, FitPolicy, Storyboard};
pub use crate::timeline::{RenderState, Timeline, active_word_at, image_index_at};
