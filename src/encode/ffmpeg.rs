use crate::encode::sink::{FrameSink, SinkConfig};
use crate::foundation::core::{Fps, FrameIndex};
use crate::foundation::error::{SlidecastError, SlidecastResult};
use crate::render::compositor::FrameRGBA;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};

/// Encoders reported by the local `ffmpeg` build.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EncoderCaps {
    /// `libx264` is available.
    pub h264: bool,
    /// `aac` is available.
    pub aac: bool,
    /// `libvpx-vp9` is available.
    pub vp9: bool,
    /// `libopus` is available.
    pub opus: bool,
}

impl EncoderCaps {
    /// Query `ffmpeg -encoders` and collect the codecs we care about.
    pub fn probe() -> SlidecastResult<Self> {
        let out = Command::new("ffmpeg")
            .args(["-hide_banner", "-encoders"])
            .stdin(Stdio::null())
            .output()
            .map_err(|e| {
                SlidecastError::encoder(format!(
                    "failed to run `ffmpeg -encoders` (is it installed and on PATH?): {e}"
                ))
            })?;
        if !out.status.success() {
            return Err(SlidecastError::encoder(format!(
                "`ffmpeg -encoders` exited with status {}",
                out.status
            )));
        }
        Ok(Self::from_encoder_listing(&String::from_utf8_lossy(
            &out.stdout,
        )))
    }

    /// Parse an `ffmpeg -encoders` listing.
    ///
    /// Each encoder line is `<flags> <name> <description>`; header and legend
    /// lines never carry a known encoder name in the second column.
    pub fn from_encoder_listing(listing: &str) -> Self {
        let mut caps = Self::default();
        for line in listing.lines() {
            let Some(name) = line.split_whitespace().nth(1) else {
                continue;
            };
            match name {
                "libx264" => caps.h264 = true,
                "aac" => caps.aac = true,
                "libvpx-vp9" => caps.vp9 = true,
                "libopus" => caps.opus = true,
                _ => {}
            }
        }
        caps
    }
}

/// Container and codec pair used for one export run.
///
/// MP4 (H.264 + AAC) is preferred for compatibility; WebM (VP9 + Opus) is the
/// fallback when the local `ffmpeg` build lacks either MP4 encoder.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CodecChoice {
    /// `.mp4` with `libx264` video and `aac` audio.
    Mp4H264Aac,
    /// `.webm` with `libvpx-vp9` video and `libopus` audio.
    WebmVp9Opus,
}

impl CodecChoice {
    /// Pick the best supported pair, or fail when neither is complete.
    pub fn negotiate(caps: EncoderCaps) -> SlidecastResult<Self> {
        if caps.h264 && caps.aac {
            return Ok(Self::Mp4H264Aac);
        }
        if caps.vp9 && caps.opus {
            return Ok(Self::WebmVp9Opus);
        }
        Err(SlidecastError::encoder(
            "no supported encoder pair in this ffmpeg build (need libx264+aac for mp4, or libvpx-vp9+libopus for webm)",
        ))
    }

    /// File extension of the chosen container.
    pub fn container_ext(self) -> &'static str {
        match self {
            Self::Mp4H264Aac => "mp4",
            Self::WebmVp9Opus => "webm",
        }
    }

    fn video_codec(self) -> &'static str {
        match self {
            Self::Mp4H264Aac => "libx264",
            Self::WebmVp9Opus => "libvpx-vp9",
        }
    }

    fn audio_codec(self) -> &'static str {
        match self {
            Self::Mp4H264Aac => "aac",
            Self::WebmVp9Opus => "libopus",
        }
    }
}

/// Options for [`FfmpegSink`] output.
#[derive(Clone, Debug)]
pub struct FfmpegSinkOpts {
    /// Output file path. The extension should match `codec.container_ext()`.
    pub out_path: PathBuf,
    /// Container/codec pair, normally obtained from [`CodecChoice::negotiate`].
    pub codec: CodecChoice,
    /// Overwrite output file if it already exists.
    pub overwrite: bool,
    /// Background color used to flatten alpha (RGBA8, straight alpha).
    pub bg_rgba: [u8; 4],
}

impl FfmpegSinkOpts {
    /// Create options for writing `out_path` with the given codec pair.
    pub fn new(out_path: impl Into<PathBuf>, codec: CodecChoice) -> Self {
        Self {
            out_path: out_path.into(),
            codec,
            overwrite: true,
            bg_rgba: [0, 0, 0, 255],
        }
    }
}

/// Sink that spawns the system `ffmpeg` and streams raw frames to its stdin.
///
/// Audio is optional and provided through `SinkConfig.audio`.
pub struct FfmpegSink {
    opts: FfmpegSinkOpts,

    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stderr_drain: Option<std::thread::JoinHandle<std::io::Result<Vec<u8>>>>,

    scratch: Vec<u8>,
    cfg: Option<SinkConfig>,
    last_idx: Option<FrameIndex>,
}

impl FfmpegSink {
    /// Create a new sink that streams into `ffmpeg`.
    pub fn new(opts: FfmpegSinkOpts) -> Self {
        Self {
            opts,
            child: None,
            stdin: None,
            stderr_drain: None,
            scratch: Vec::new(),
            cfg: None,
            last_idx: None,
        }
    }
}

impl FrameSink for FfmpegSink {
    fn begin(&mut self, cfg: SinkConfig) -> SlidecastResult<()> {
        if self.child.is_some() {
            return Err(SlidecastError::recording_state(
                "ffmpeg sink is already started",
            ));
        }
        if cfg.fps.num == 0 || cfg.fps.den == 0 {
            return Err(SlidecastError::validation("fps must be non-zero"));
        }
        if cfg.width == 0 || cfg.height == 0 {
            return Err(SlidecastError::validation(
                "ffmpeg sink width/height must be non-zero",
            ));
        }
        if !cfg.width.is_multiple_of(2) || !cfg.height.is_multiple_of(2) {
            return Err(SlidecastError::validation(
                "ffmpeg sink width/height must be even (required for yuv420p output)",
            ));
        }

        ensure_parent_dir(&self.opts.out_path)?;
        if !self.opts.overwrite && self.opts.out_path.exists() {
            return Err(SlidecastError::validation(format!(
                "output file '{}' already exists",
                self.opts.out_path.display()
            )));
        }

        if !is_ffmpeg_on_path() {
            return Err(SlidecastError::encoder(
                "ffmpeg is required for video export, but was not found on PATH",
            ));
        }

        let mut cmd = Command::new("ffmpeg");
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        if self.opts.overwrite {
            cmd.arg("-y");
        } else {
            cmd.arg("-n");
        }

        // Input: raw premultiplied RGBA8 frames. `ffmpeg` does not understand premul, so we
        // flatten alpha before writing to stdin (push_frame).
        cmd.args([
            "-loglevel",
            "error",
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgba",
            "-s",
            &format!("{}x{}", cfg.width, cfg.height),
        ]);
        push_input_fps(&mut cmd, cfg.fps);
        cmd.args(["-i", "pipe:0"]);

        if let Some(audio) = cfg.audio.as_ref() {
            if audio.sample_rate == 0 {
                return Err(SlidecastError::validation(
                    "audio sample_rate must be non-zero when audio is enabled",
                ));
            }
            if audio.channels == 0 {
                return Err(SlidecastError::validation(
                    "audio channels must be non-zero when audio is enabled",
                ));
            }
            cmd.args([
                "-f",
                "f32le",
                "-ar",
                &audio.sample_rate.to_string(),
                "-ac",
                &audio.channels.to_string(),
                "-i",
            ])
            .arg(&audio.path)
            .args([
                "-c:v",
                self.opts.codec.video_codec(),
                "-pix_fmt",
                "yuv420p",
                "-c:a",
                self.opts.codec.audio_codec(),
                "-shortest",
            ]);
        } else {
            cmd.args([
                "-an",
                "-c:v",
                self.opts.codec.video_codec(),
                "-pix_fmt",
                "yuv420p",
            ]);
        }
        if self.opts.codec == CodecChoice::Mp4H264Aac {
            cmd.args(["-movflags", "+faststart"]);
        }
        cmd.arg(&self.opts.out_path);

        let mut child = cmd.spawn().map_err(|e| {
            SlidecastError::encoder(format!(
                "failed to spawn ffmpeg (is it installed and on PATH?): {e}"
            ))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| SlidecastError::encoder("failed to open ffmpeg stdin (unexpected)"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| SlidecastError::encoder("failed to open ffmpeg stderr (unexpected)"))?;
        let stderr_drain = std::thread::spawn(move || {
            let mut stderr_bytes = Vec::new();
            stderr.read_to_end(&mut stderr_bytes)?;
            Ok(stderr_bytes)
        });

        self.scratch = vec![0u8; (cfg.width * cfg.height * 4) as usize];
        self.child = Some(child);
        self.stdin = Some(stdin);
        self.stderr_drain = Some(stderr_drain);
        self.cfg = Some(cfg);
        self.last_idx = None;
        Ok(())
    }

    fn push_frame(&mut self, idx: FrameIndex, frame: &FrameRGBA) -> SlidecastResult<()> {
        let cfg = self
            .cfg
            .as_ref()
            .ok_or_else(|| SlidecastError::recording_state("ffmpeg sink not started"))?;
        if let Some(last) = self.last_idx
            && idx.0 <= last.0
        {
            return Err(SlidecastError::recording_state(
                "ffmpeg sink received out-of-order frame index",
            ));
        }
        self.last_idx = Some(idx);

        if frame.width != cfg.width || frame.height != cfg.height {
            return Err(SlidecastError::validation(format!(
                "frame size mismatch: got {}x{}, expected {}x{}",
                frame.width, frame.height, cfg.width, cfg.height
            )));
        }
        if frame.data.len() != self.scratch.len() {
            return Err(SlidecastError::validation(
                "frame.data size mismatch with width*height*4",
            ));
        }

        // Flatten premultiplied RGBA8 over the configured background.
        flatten_premul_over_bg_to_opaque_rgba8(&mut self.scratch, &frame.data, self.opts.bg_rgba)?;

        let Some(stdin) = self.stdin.as_mut() else {
            return Err(SlidecastError::recording_state(
                "ffmpeg sink is already finalized",
            ));
        };

        use std::io::Write as _;
        stdin.write_all(&self.scratch).map_err(|e| {
            SlidecastError::encoder(format!("failed to write frame to ffmpeg stdin: {e}"))
        })?;
        Ok(())
    }

    fn end(&mut self) -> SlidecastResult<()> {
        drop(self.stdin.take());
        let mut child = self
            .child
            .take()
            .ok_or_else(|| SlidecastError::recording_state("ffmpeg sink not started"))?;

        let status = child.wait().map_err(|e| {
            SlidecastError::encoder(format!("failed to wait for ffmpeg to finish: {e}"))
        })?;
        let stderr_bytes = match self.stderr_drain.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| SlidecastError::encoder("ffmpeg stderr drain thread panicked"))?
                .map_err(|e| SlidecastError::encoder(format!("ffmpeg stderr read failed: {e}")))?,
            None => Vec::new(),
        };

        if !status.success() {
            let stderr = String::from_utf8_lossy(&stderr_bytes);
            return Err(SlidecastError::encoder(format!(
                "ffmpeg exited with status {}: {}",
                status,
                stderr.trim()
            )));
        }

        self.cfg = None;
        Ok(())
    }
}

fn push_input_fps(cmd: &mut Command, fps: Fps) {
    // For rawvideo input, use `-r` before `-i` to specify the input framerate.
    //
    // Accept rational FPS as `num/den`.
    cmd.args(["-r", &format!("{}/{}", fps.num, fps.den)]);
}

fn flatten_premul_over_bg_to_opaque_rgba8(
    dst: &mut [u8],
    src_premul: &[u8],
    bg_rgba: [u8; 4],
) -> SlidecastResult<()> {
    if dst.len() != src_premul.len() || !dst.len().is_multiple_of(4) {
        return Err(SlidecastError::validation(
            "flatten_premul_over_bg_to_opaque_rgba8 expects equal-length rgba8 buffers",
        ));
    }

    let bg_r = bg_rgba[0] as u16;
    let bg_g = bg_rgba[1] as u16;
    let bg_b = bg_rgba[2] as u16;

    for (d, s) in dst.chunks_exact_mut(4).zip(src_premul.chunks_exact(4)) {
        let a = s[3] as u16;
        if a == 255 {
            d.copy_from_slice(s);
            d[3] = 255;
            continue;
        }

        let inv = 255u16 - a;
        let r = s[0] as u16 + mul_div255(bg_r, inv);
        let g = s[1] as u16 + mul_div255(bg_g, inv);
        let b = s[2] as u16 + mul_div255(bg_b, inv);

        d[0] = r.min(255) as u8;
        d[1] = g.min(255) as u8;
        d[2] = b.min(255) as u8;
        d[3] = 255;
    }

    Ok(())
}

fn mul_div255(x: u16, y: u16) -> u16 {
    (((u32::from(x) * u32::from(y)) + 127) / 255) as u16
}

/// Ensure the parent directory of `path` exists.
pub fn ensure_parent_dir(path: &Path) -> SlidecastResult<()> {
    if let Some(parent) = path.parent() {
        use anyhow::Context as _;
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output directory '{}'", parent.display()))?;
    }
    Ok(())
}

/// Return `true` when `ffmpeg` can be invoked from `PATH`.
pub fn is_ffmpeg_on_path() -> bool {
    std::process::Command::new("ffmpeg")
        .arg("-version")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flatten_premul_alpha_0_returns_bg() {
        let src = vec![0u8, 0, 0, 0];
        let mut dst = vec![0u8; 4];
        flatten_premul_over_bg_to_opaque_rgba8(&mut dst, &src, [10, 20, 30, 255]).unwrap();
        assert_eq!(dst, vec![10, 20, 30, 255]);
    }

    #[test]
    fn flatten_premul_alpha_255_is_identity() {
        let src = vec![1u8, 2, 3, 255];
        let mut dst = vec![0u8; 4];
        flatten_premul_over_bg_to_opaque_rgba8(&mut dst, &src, [10, 20, 30, 255]).unwrap();
        assert_eq!(dst, src);
    }

    #[test]
    fn encoder_listing_reads_the_name_column() {
        let listing = "Encoders:\n\
                       V..... = Video\n\
                       ------\n\
                       V....D libx264              libx264 H.264 / AVC\n\
                       A....D aac                  AAC (Advanced Audio Coding)\n\
                       V....D libaom-av1           libaom AV1\n";
        let caps = EncoderCaps::from_encoder_listing(listing);
        assert!(caps.h264);
        assert!(caps.aac);
        assert!(!caps.vp9);
        assert!(!caps.opus);
    }

    #[test]
    fn negotiation_prefers_mp4() {
        let caps = EncoderCaps {
            h264: true,
            aac: true,
            vp9: true,
            opus: true,
        };
        assert_eq!(
            CodecChoice::negotiate(caps).unwrap(),
            CodecChoice::Mp4H264Aac
        );
    }

    #[test]
    fn negotiation_falls_back_to_webm() {
        let caps = EncoderCaps {
            h264: false,
            aac: true,
            vp9: true,
            opus: true,
        };
        let choice = CodecChoice::negotiate(caps).unwrap();
        assert_eq!(choice, CodecChoice::WebmVp9Opus);
        assert_eq!(choice.container_ext(), "webm");
    }

    #[test]
    fn negotiation_without_a_complete_pair_fails() {
        let caps = EncoderCaps {
            h264: true,
            aac: false,
            vp9: false,
            opus: true,
        };
        let err = CodecChoice::negotiate(caps).unwrap_err();
        assert!(matches!(err, SlidecastError::Encoder(_)));
    }

    #[test]
    fn frames_before_begin_are_a_state_error() {
        let mut sink = FfmpegSink::new(FfmpegSinkOpts::new(
            std::env::temp_dir().join("slidecast_never_written.mp4"),
            CodecChoice::Mp4H264Aac,
        ));
        let frame = FrameRGBA {
            width: 2,
            height: 2,
            data: vec![0; 16],
            premultiplied: true,
        };
        let err = sink.push_frame(FrameIndex(0), &frame).unwrap_err();
        assert!(matches!(err, SlidecastError::RecordingState(_)));
    }

    #[test]
    fn odd_dimensions_are_rejected_before_spawn() {
        let mut sink = FfmpegSink::new(FfmpegSinkOpts::new(
            std::env::temp_dir().join("slidecast_never_written.mp4"),
            CodecChoice::Mp4H264Aac,
        ));
        let err = sink
            .begin(SinkConfig {
                width: 31,
                height: 30,
                fps: Fps::new(30, 1).unwrap(),
                audio: None,
            })
            .unwrap_err();
        assert!(matches!(err, SlidecastError::Validation(_)));
    }
}
