use crate::scene::captions::CaptionWord;

/// Timeline shape for one session: total audio duration and image count.
///
/// Each image occupies an even split of the total duration, so the slideshow
/// always covers the full audio regardless of image count.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Timeline {
    /// Total duration in seconds (the audio duration).
    pub total_duration: f64,
    /// Number of slideshow images.
    pub image_count: usize,
}

/// Map playback time to the background image index.
///
/// Even-split policy: slot length is `total_duration / image_count`, the
/// result is floored and clamped to `[0, image_count - 1]`. Degenerate
/// inputs (`image_count == 0`, non-positive or non-finite duration) map
/// to `0`.
pub fn image_index_at(t: f64, image_count: usize, total_duration: f64) -> usize {
    if image_count == 0 || !(total_duration > 0.0) {
        return 0;
    }
    let slot = total_duration / image_count as f64;
    let idx = (t / slot).floor();
    if !(idx > 0.0) {
        return 0;
    }
    (idx as usize).min(image_count - 1)
}

/// Find the caption word active at `t`, if any.
///
/// A word is active iff `start <= t < end`. Input may be unordered and
/// overlapping; among simultaneous matches the earliest-starting word wins,
/// with ties resolving to list order.
pub fn active_word_at(t: f64, words: &[CaptionWord]) -> Option<&CaptionWord> {
    words
        .iter()
        .filter(|w| w.start <= t && t < w.end)
        .min_by(|a, b| a.start.total_cmp(&b.start))
}

/// Everything needed to draw one frame, derived freshly from time.
///
/// Never cached across ticks: both the interactive controller and the export
/// loop recompute this from their own time source so the two paths cannot
/// drift.
#[derive(Clone, Copy, Debug)]
pub struct RenderState<'a> {
    /// Playback time in seconds.
    pub time: f64,
    /// Background image index.
    pub image_index: usize,
    /// Active caption word, if any.
    pub active_word: Option<&'a CaptionWord>,
}

impl<'a> RenderState<'a> {
    /// Derive the render state for time `t`.
    pub fn at(t: f64, timeline: Timeline, words: &'a [CaptionWord]) -> Self {
        Self {
            time: t,
            image_index: image_index_at(t, timeline.image_count, timeline.total_duration),
            active_word: active_word_at(t, words),
        }
    }
}
