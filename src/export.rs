//! Offline export: compose every frame of a storyboard and stream it into an
//! encoding sink.
//!
//! Export never samples a live clock. The decoded narration track fixes the
//! duration, and each frame's timestamp is derived from its index, so the same
//! storyboard always produces the same video regardless of host load.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use crate::assets::media::{self, MIX_SAMPLE_RATE};
use crate::assets::store::AssetLoader;
use crate::encode::ffmpeg::{CodecChoice, EncoderCaps, FfmpegSink, FfmpegSinkOpts};
use crate::encode::sink::{AudioInputConfig, FrameSink, SinkConfig};
use crate::foundation::core::{Canvas, Fps, FrameIndex};
use crate::foundation::error::{SlidecastError, SlidecastResult};
use crate::render::compositor::{Compositor, CompositorOpts};
use crate::scene::storyboard::{Storyboard, normalize_rel_path};
use crate::timeline::{RenderState, Timeline};

/// Base name of the exported file; the extension follows the negotiated container.
pub const EXPORT_FILE_STEM: &str = "slideshow";

/// Observable lifecycle of an export run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportPhase {
    /// No export has started.
    Idle,
    /// Loading assets, decoding audio, staging inputs.
    Preparing,
    /// Sink is open and frames are streaming.
    Recording,
    /// All frames pushed; waiting for the sink to finish.
    Finalizing,
    /// Last run finished successfully.
    Complete,
    /// Last run failed.
    Failed,
}

impl ExportPhase {
    fn as_u8(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Preparing => 1,
            Self::Recording => 2,
            Self::Finalizing => 3,
            Self::Complete => 4,
            Self::Failed => 5,
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Idle,
            1 => Self::Preparing,
            2 => Self::Recording,
            3 => Self::Finalizing,
            4 => Self::Complete,
            _ => Self::Failed,
        }
    }
}

/// Options for [`Exporter::export`].
#[derive(Clone, Debug)]
pub struct ExportOpts {
    /// Directory the output file is written into.
    pub out_dir: PathBuf,
    /// Overwrite the output file if it already exists.
    pub overwrite: bool,
    /// Background color used to flatten alpha for the encoder.
    pub bg_rgba: [u8; 4],
}

impl ExportOpts {
    /// Create options writing into `out_dir`.
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
            overwrite: true,
            bg_rgba: [0, 0, 0, 255],
        }
    }
}

/// Result of a finished export run.
#[derive(Clone, Debug)]
pub struct ExportStats {
    /// Frames pushed into the sink.
    pub frames: u64,
    /// Show duration in seconds (decoded narration length).
    pub duration_secs: f64,
    /// Path of the written file.
    pub out_path: PathBuf,
    /// Container/codec pair the run negotiated.
    pub codec: CodecChoice,
}

/// Runs storyboard exports, one at a time.
///
/// The exporter is a lifecycle gate, not a cache: each run loads assets and a
/// compositor of its own, and concurrent [`Exporter::export`] calls beyond the
/// first fail with a recording-state error instead of queueing.
pub struct Exporter {
    phase: AtomicU8,
    in_flight: AtomicBool,
}

impl Default for Exporter {
    fn default() -> Self {
        Self::new()
    }
}

impl Exporter {
    /// Create an idle exporter.
    pub fn new() -> Self {
        Self {
            phase: AtomicU8::new(ExportPhase::Idle.as_u8()),
            in_flight: AtomicBool::new(false),
        }
    }

    /// Current phase. Terminal phases persist until the next run starts.
    pub fn phase(&self) -> ExportPhase {
        ExportPhase::from_u8(self.phase.load(Ordering::SeqCst))
    }

    #[tracing::instrument(skip(self, board))]
    /// Export `board` to `<out_dir>/slideshow.<ext>` using the system `ffmpeg`.
    ///
    /// The container is negotiated from the local `ffmpeg` build: MP4 when
    /// `libx264`+`aac` are present, WebM when only `libvpx-vp9`+`libopus` are.
    /// Asset paths in `board` resolve relative to `root`.
    pub fn export(
        &self,
        board: &Storyboard,
        root: &Path,
        opts: &ExportOpts,
    ) -> SlidecastResult<ExportStats> {
        let _flight = self.begin_flight()?;
        self.set_phase(ExportPhase::Preparing);
        let result = self.export_locked(board, root, opts);
        self.set_phase(match result {
            Ok(_) => ExportPhase::Complete,
            Err(_) => ExportPhase::Failed,
        });
        result
    }

    /// Drive one export into a caller-provided sink.
    ///
    /// `duration_secs` stands in for the decoded narration length and `audio`
    /// is passed through to the sink untouched. Same lifecycle gating and
    /// phase reporting as [`Exporter::export`].
    pub fn export_with_sink(
        &self,
        board: &Storyboard,
        root: &Path,
        duration_secs: f64,
        audio: Option<AudioInputConfig>,
        sink: &mut dyn FrameSink,
    ) -> SlidecastResult<u64> {
        let _flight = self.begin_flight()?;
        self.set_phase(ExportPhase::Preparing);
        let result = self.record(board, root, duration_secs, audio, sink);
        self.set_phase(match result {
            Ok(_) => ExportPhase::Complete,
            Err(_) => ExportPhase::Failed,
        });
        result
    }

    fn export_locked(
        &self,
        board: &Storyboard,
        root: &Path,
        opts: &ExportOpts,
    ) -> SlidecastResult<ExportStats> {
        board.validate()?;

        let codec = CodecChoice::negotiate(EncoderCaps::probe()?)?;
        let out_path = opts
            .out_dir
            .join(format!("{EXPORT_FILE_STEM}.{}", codec.container_ext()));

        // The narration is the clock: its decoded length is the show length.
        let audio_rel = normalize_rel_path(&board.audio)?;
        let audio_path = root.join(Path::new(&audio_rel));
        let pcm = media::decode_audio_f32_stereo(&audio_path, MIX_SAMPLE_RATE)?;
        let duration_secs = pcm.duration_secs();
        if !(duration_secs > 0.0) {
            return Err(SlidecastError::asset_load(format!(
                "audio '{}' decoded to zero duration",
                audio_path.display()
            )));
        }

        // Stage the decoded PCM as a temp file so ffmpeg muxes the exact samples
        // the timeline was measured from.
        let mut audio_tmp = TempFileGuard(None);
        let staged = std::env::temp_dir().join(format!(
            "slidecast_audio_{}_{}.f32le",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_nanos())
                .unwrap_or(0)
        ));
        media::write_pcm_f32le(&pcm, &staged)?;
        audio_tmp.0 = Some(staged.clone());
        let audio_cfg = AudioInputConfig {
            path: staged,
            sample_rate: pcm.sample_rate,
            channels: pcm.channels,
        };

        let mut sink = FfmpegSink::new(FfmpegSinkOpts {
            out_path: out_path.clone(),
            codec,
            overwrite: opts.overwrite,
            bg_rgba: opts.bg_rgba,
        });
        let frames = self.record(board, root, duration_secs, Some(audio_cfg), &mut sink)?;

        drop(audio_tmp);
        tracing::info!(
            frames,
            duration_secs,
            out = %out_path.display(),
            "export finished"
        );
        Ok(ExportStats {
            frames,
            duration_secs,
            out_path,
            codec,
        })
    }

    fn record(
        &self,
        board: &Storyboard,
        root: &Path,
        duration_secs: f64,
        audio: Option<AudioInputConfig>,
        sink: &mut dyn FrameSink,
    ) -> SlidecastResult<u64> {
        board.validate()?;
        if !(duration_secs > 0.0) || !duration_secs.is_finite() {
            return Err(SlidecastError::validation(
                "export duration must be positive and finite",
            ));
        }

        let assets = AssetLoader::new(root).load_current(board)?;
        let words = board.load_captions(root)?;
        let timeline = Timeline {
            total_duration: duration_secs,
            image_count: assets.images.len(),
        };

        let canvas = Canvas {
            width: board.export.width,
            height: board.export.height,
        };
        let fps = Fps::new(board.export.fps, 1)?;
        let frames_total = fps.secs_to_frames_ceil(duration_secs);

        let fontdb = crate::assets::decode::build_fontdb(Some(root));
        let mut compositor = Compositor::new(
            CompositorOpts {
                fit: board.fit,
                ..Default::default()
            },
            fontdb,
        );

        self.set_phase(ExportPhase::Recording);
        sink.begin(SinkConfig {
            width: canvas.width,
            height: canvas.height,
            fps,
            audio,
        })?;

        let mut frame_err = None;
        for f in 0..frames_total {
            let t = fps.frames_to_secs(f);
            let state = RenderState::at(t, timeline, &words);
            match compositor.compose(&state, &assets, canvas) {
                Ok(frame) => {
                    if let Err(e) = sink.push_frame(FrameIndex(f), &frame) {
                        frame_err = Some(e);
                        break;
                    }
                }
                Err(e) => {
                    frame_err = Some(e);
                    break;
                }
            }
        }
        if let Some(e) = frame_err {
            // Tear the encoder down before surfacing the frame error.
            let _ = sink.end();
            return Err(e);
        }

        self.set_phase(ExportPhase::Finalizing);
        sink.end()?;
        Ok(frames_total)
    }

    fn begin_flight(&self) -> SlidecastResult<FlightGuard<'_>> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(SlidecastError::recording_state(
                "an export is already running",
            ));
        }
        Ok(FlightGuard(&self.in_flight))
    }

    fn set_phase(&self, phase: ExportPhase) {
        self.phase.store(phase.as_u8(), Ordering::SeqCst);
    }
}

struct FlightGuard<'a>(&'a AtomicBool);

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

struct TempFileGuard(Option<PathBuf>);

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        if let Some(path) = self.0.take() {
            let _ = std::fs::remove_file(path);
        }
    }
}
