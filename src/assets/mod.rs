//! Asset loading and decoding.
//!
//! Everything here runs before compositing: batches decode to premultiplied RGBA8 or
//! parsed SVG trees so the frame loop stays IO-free.

/// Image and SVG decoding to prepared forms.
pub mod decode;
/// Narration probing and PCM decode through `ffprobe`/`ffmpeg`.
pub mod media;
/// Batched, generation-tracked asset loading.
pub mod store;
/// SVG tree rasterization.
pub mod svg_raster;
