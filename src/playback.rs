use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::foundation::error::{SlidecastError, SlidecastResult};
use crate::scene::captions::CaptionWord;
use crate::timeline::{RenderState, Timeline, active_word_at, image_index_at};

/// Monotonic clock driving interactive playback.
///
/// Stands in for the narration element's position readout: the controller never keeps
/// its own derived image/caption state, it recomputes from this clock on every tick.
pub trait TimeSource {
    /// Seconds elapsed from an arbitrary fixed origin.
    fn monotonic_secs(&self) -> f64;
}

/// Wall-clock time source backed by [`Instant`].
pub struct SystemTimeSource {
    origin: Instant,
}

impl SystemTimeSource {
    /// Create a source with its origin at construction time.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for SystemTimeSource {
    fn monotonic_secs(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// Hand-stepped time source for tests and scripted drivers.
///
/// Clones share one clock, so a copy kept outside the controller can advance it.
#[derive(Clone, Default)]
pub struct ManualTimeSource {
    now_bits: Arc<AtomicU64>,
}

impl ManualTimeSource {
    /// Create a source at zero seconds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the clock to `secs`.
    pub fn set(&self, secs: f64) {
        self.now_bits.store(secs.to_bits(), Ordering::SeqCst);
    }

    /// Move the clock forward by `secs`.
    pub fn advance(&self, secs: f64) {
        self.set(self.monotonic_secs() + secs);
    }
}

impl TimeSource for ManualTimeSource {
    fn monotonic_secs(&self) -> f64 {
        f64::from_bits(self.now_bits.load(Ordering::SeqCst))
    }
}

/// Interactive playback states.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaybackState {
    /// Never started; position is wherever the last seek left it.
    Stopped,
    /// Position advances with the time source.
    Playing,
    /// Position frozen where pause left it.
    Paused,
    /// Natural end of the narration reached; progress pinned to 100%.
    Ended,
}

/// One observed playback instant, ready for display.
#[derive(Clone, Debug, PartialEq)]
pub struct PlaybackSnapshot {
    /// Current state.
    pub state: PlaybackState,
    /// Position in seconds, clamped to the timeline.
    pub time: f64,
    /// Position as a percentage of the full show, 0 to 100.
    pub progress_percent: f64,
    /// Deck image shown at this instant.
    pub image_index: usize,
    /// Caption word spoken at this instant, empty at the end of the show.
    pub caption: Option<String>,
}

/// Drives interactive preview position through the playback state machine.
///
/// The controller owns no drawing surface; callers take [`PlaybackController::render_state`]
/// to the compositor at whatever cadence the host refreshes.
pub struct PlaybackController {
    timeline: Timeline,
    words: Vec<CaptionWord>,
    clock: Box<dyn TimeSource>,
    state: PlaybackState,
    position: f64,
    play_started_at: f64,
}

impl PlaybackController {
    /// Create a stopped controller over `timeline` and its caption track.
    pub fn new(
        timeline: Timeline,
        words: Vec<CaptionWord>,
        clock: Box<dyn TimeSource>,
    ) -> SlidecastResult<Self> {
        if !(timeline.total_duration > 0.0) || !timeline.total_duration.is_finite() {
            return Err(SlidecastError::validation(
                "playback requires a positive finite duration",
            ));
        }
        Ok(Self {
            timeline,
            words,
            clock,
            state: PlaybackState::Stopped,
            position: 0.0,
            play_started_at: 0.0,
        })
    }

    /// Current state.
    pub fn state(&self) -> PlaybackState {
        self.state
    }

    /// Begin advancing. At or past the end of the show, the position resets to zero
    /// first; when already playing this is a no-op.
    pub fn play(&mut self) {
        if self.state == PlaybackState::Playing {
            return;
        }
        if self.position >= self.timeline.total_duration {
            self.position = 0.0;
        }
        self.play_started_at = self.clock.monotonic_secs();
        self.state = PlaybackState::Playing;
    }

    /// Stop advancing, retaining the current position. A no-op unless playing.
    pub fn pause(&mut self) {
        if self.state != PlaybackState::Playing {
            return;
        }
        self.position = self.current_position();
        self.state = PlaybackState::Paused;
    }

    /// Jump to `fraction` of the show, clamped to `[0, 1]`, and recompute the
    /// snapshot immediately rather than waiting for the next tick.
    ///
    /// Seeking never starts or stops advancement, except that seeking an ended show
    /// away from its end demotes it to paused so progress can report honestly again.
    pub fn seek(&mut self, fraction: f64) -> PlaybackSnapshot {
        let f = if fraction.is_finite() {
            fraction.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self.position = f * self.timeline.total_duration;
        match self.state {
            PlaybackState::Playing => {
                self.play_started_at = self.clock.monotonic_secs();
            }
            PlaybackState::Ended if self.position < self.timeline.total_duration => {
                self.state = PlaybackState::Paused;
            }
            _ => {}
        }
        self.snapshot()
    }

    /// Observe the clock, apply the natural-end transition if the narration has run
    /// out, and return the instant to display.
    pub fn tick(&mut self) -> PlaybackSnapshot {
        if self.state == PlaybackState::Playing {
            let t = self.current_position();
            if t >= self.timeline.total_duration {
                self.position = self.timeline.total_duration;
                self.state = PlaybackState::Ended;
            }
        }
        self.snapshot()
    }

    /// The displayed instant without advancing any transitions.
    pub fn snapshot(&self) -> PlaybackSnapshot {
        let duration = self.timeline.total_duration;
        let time = self.current_position().clamp(0.0, duration);
        let caption = match self.state {
            PlaybackState::Ended => None,
            _ => active_word_at(time, &self.words).map(|w| w.word.clone()),
        };
        let progress_percent = if self.state == PlaybackState::Ended {
            100.0
        } else {
            (time / duration * 100.0).clamp(0.0, 100.0)
        };
        PlaybackSnapshot {
            state: self.state,
            time,
            progress_percent,
            image_index: image_index_at(time, self.timeline.image_count, duration),
            caption,
        }
    }

    /// Render state for the compositor at the displayed instant.
    pub fn render_state(&self) -> RenderState<'_> {
        let time = self
            .current_position()
            .clamp(0.0, self.timeline.total_duration);
        let mut state = RenderState::at(time, self.timeline, &self.words);
        if self.state == PlaybackState::Ended {
            state.active_word = None;
        }
        state
    }

    fn current_position(&self) -> f64 {
        match self.state {
            PlaybackState::Playing => {
                self.position + (self.clock.monotonic_secs() - self.play_started_at)
            }
            _ => self.position,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words() -> Vec<CaptionWord> {
        vec![
            CaptionWord {
                word: "first".to_string(),
                start: 0.0,
                end: 4.0,
            },
            CaptionWord {
                word: "last".to_string(),
                start: 4.0,
                end: 9.0,
            },
        ]
    }

    fn controller(clock: &ManualTimeSource) -> PlaybackController {
        let timeline = Timeline {
            total_duration: 9.0,
            image_count: 3,
        };
        PlaybackController::new(timeline, words(), Box::new(clock.clone())).unwrap()
    }

    #[test]
    fn play_advances_with_the_clock() {
        let clock = ManualTimeSource::new();
        let mut pc = controller(&clock);
        pc.play();
        clock.advance(4.5);
        let snap = pc.tick();
        assert_eq!(snap.state, PlaybackState::Playing);
        assert!((snap.time - 4.5).abs() < 1e-9);
        assert_eq!(snap.image_index, 1);
        assert_eq!(snap.caption.as_deref(), Some("last"));
    }

    #[test]
    fn pause_freezes_position() {
        let clock = ManualTimeSource::new();
        let mut pc = controller(&clock);
        pc.play();
        clock.advance(2.0);
        pc.pause();
        clock.advance(5.0);
        let snap = pc.tick();
        assert_eq!(snap.state, PlaybackState::Paused);
        assert!((snap.time - 2.0).abs() < 1e-9);
    }

    #[test]
    fn natural_end_pins_progress_and_clears_caption() {
        let clock = ManualTimeSource::new();
        let mut pc = controller(&clock);
        pc.play();
        clock.advance(20.0);
        let snap = pc.tick();
        assert_eq!(snap.state, PlaybackState::Ended);
        assert_eq!(snap.progress_percent, 100.0);
        assert_eq!(snap.caption, None);
        assert_eq!(snap.image_index, 2);
    }

    #[test]
    fn play_after_end_restarts_from_zero() {
        let clock = ManualTimeSource::new();
        let mut pc = controller(&clock);
        pc.play();
        clock.advance(20.0);
        pc.tick();
        pc.play();
        let snap = pc.tick();
        assert_eq!(snap.state, PlaybackState::Playing);
        assert!(snap.time < 1e-9);
        assert_eq!(snap.image_index, 0);
    }

    #[test]
    fn seek_recomputes_without_waiting_for_a_tick() {
        let clock = ManualTimeSource::new();
        let mut pc = controller(&clock);
        let snap = pc.seek(0.5);
        assert_eq!(snap.state, PlaybackState::Stopped);
        assert!((snap.time - 4.5).abs() < 1e-9);
        assert_eq!(snap.image_index, 1);
        assert_eq!(snap.caption.as_deref(), Some("last"));
    }

    #[test]
    fn seek_clamps_out_of_range_fractions() {
        let clock = ManualTimeSource::new();
        let mut pc = controller(&clock);
        assert!((pc.seek(1.5).time - 9.0).abs() < 1e-9);
        assert!(pc.seek(-0.25).time.abs() < 1e-9);
    }

    #[test]
    fn seeking_an_ended_show_demotes_to_paused() {
        let clock = ManualTimeSource::new();
        let mut pc = controller(&clock);
        pc.play();
        clock.advance(20.0);
        pc.tick();
        let snap = pc.seek(0.25);
        assert_eq!(snap.state, PlaybackState::Paused);
        assert!((snap.time - 2.25).abs() < 1e-9);
        assert!(snap.progress_percent < 100.0);
    }

    #[test]
    fn seek_while_playing_keeps_playing_from_the_new_position() {
        let clock = ManualTimeSource::new();
        let mut pc = controller(&clock);
        pc.play();
        clock.advance(1.0);
        pc.seek(0.8);
        clock.advance(0.5);
        let snap = pc.tick();
        assert_eq!(snap.state, PlaybackState::Playing);
        assert!((snap.time - (7.2 + 0.5)).abs() < 1e-9);
    }

    #[test]
    fn zero_duration_timeline_is_rejected() {
        let timeline = Timeline {
            total_duration: 0.0,
            image_count: 1,
        };
        let res = PlaybackController::new(timeline, vec![], Box::new(ManualTimeSource::new()));
        assert!(res.is_err());
    }
}
