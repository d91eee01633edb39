use std::path::Path;

use anyhow::Context as _;

use crate::{
    foundation::core::Canvas,
    foundation::error::{SlidecastError, SlidecastResult},
    scene::captions::{self, CaptionWord},
};

/// One slideshow session: the audio track, the ordered image list, the
/// watermark, the caption track, and output geometry.
///
/// All asset paths are relative to the storyboard's directory.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct Storyboard {
    /// Audio file driving the timeline.
    pub audio: String,
    /// Slideshow images in display order.
    pub images: Vec<String>,
    /// Watermark file; falls back to the built-in badge when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub watermark: Option<String>,
    /// Background image placement policy.
    #[serde(default)]
    pub fit: FitPolicy,
    /// Caption track, inline or by transcript path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub captions: Option<CaptionSource>,
    /// Preview surface geometry.
    #[serde(default = "default_canvas")]
    pub canvas: Canvas,
    /// Export surface geometry and frame rate.
    #[serde(default)]
    pub export: ExportSettings,
}

/// Background image placement policy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FitPolicy {
    /// Fill the canvas, center-cropping overflow.
    #[default]
    Cover,
    /// Fit inside the canvas, letterboxing one axis.
    Contain,
}

/// Caption track source: inline words or a transcript JSON file.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum CaptionSource {
    /// Words written directly into the storyboard.
    Inline(Vec<CaptionWord>),
    /// Storyboard-relative path to a transcript JSON file.
    Path(String),
}

/// Export surface geometry and frame rate.
#[derive(Clone, Copy, Debug, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ExportSettings {
    /// Output width in pixels.
    pub width: u32,
    /// Output height in pixels.
    pub height: u32,
    /// Output frames per second.
    pub fps: u32,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            width: 1080,
            height: 1920,
            fps: 30,
        }
    }
}

fn default_canvas() -> Canvas {
    Canvas {
        width: 540,
        height: 960,
    }
}

impl Storyboard {
    /// Read, parse, and validate a storyboard JSON file.
    pub fn from_path(path: &Path) -> SlidecastResult<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read storyboard '{}'", path.display()))
            .map_err(SlidecastError::from)?;
        let board: Storyboard = serde_json::from_str(&text)
            .map_err(|e| SlidecastError::validation(format!("parse storyboard JSON: {e}")))?;
        board.validate()?;
        Ok(board)
    }

    /// Check structural invariants (non-empty sources, positive geometry).
    pub fn validate(&self) -> SlidecastResult<()> {
        if self.audio.trim().is_empty() {
            return Err(SlidecastError::validation("audio source must be non-empty"));
        }
        if self.images.is_empty() {
            return Err(SlidecastError::validation(
                "storyboard needs at least one image",
            ));
        }
        for (i, img) in self.images.iter().enumerate() {
            if img.trim().is_empty() {
                return Err(SlidecastError::validation(format!(
                    "image {i} has an empty source path"
                )));
            }
        }
        if self.canvas.width == 0 || self.canvas.height == 0 {
            return Err(SlidecastError::validation(
                "canvas width/height must be > 0",
            ));
        }
        if self.export.width == 0 || self.export.height == 0 {
            return Err(SlidecastError::validation(
                "export width/height must be > 0",
            ));
        }
        if self.export.fps == 0 {
            return Err(SlidecastError::validation("export fps must be > 0"));
        }
        if let Some(CaptionSource::Inline(words)) = &self.captions {
            captions::validate_words(words)?;
        }

        Ok(())
    }

    /// Resolve the caption track: inline words, a transcript file, or empty.
    ///
    /// A malformed transcript file is a hard [`SlidecastError::CaptionFormat`];
    /// only an absent `captions` field yields an empty track.
    pub fn load_captions(&self, root: &Path) -> SlidecastResult<Vec<CaptionWord>> {
        match &self.captions {
            None => Ok(Vec::new()),
            Some(CaptionSource::Inline(words)) => {
                captions::validate_words(words)?;
                Ok(words.clone())
            }
            Some(CaptionSource::Path(rel)) => {
                let norm = normalize_rel_path(rel)?;
                let path = root.join(Path::new(&norm));
                let text = std::fs::read_to_string(&path)
                    .with_context(|| format!("read transcript '{}'", path.display()))
                    .map_err(SlidecastError::from)?;
                captions::parse_transcript_str(&text)
            }
        }
    }
}

/// Normalize and validate storyboard-relative asset paths.
///
/// The normalized result uses `/` separators, removes `.` segments, and
/// rejects absolute paths or parent traversals (`..`).
pub fn normalize_rel_path(source: &str) -> SlidecastResult<String> {
    let s = source.replace('\\', "/");
    if s.starts_with('/') {
        return Err(SlidecastError::validation("asset paths must be relative"));
    }
    if s.is_empty() {
        return Err(SlidecastError::validation("asset path must be non-empty"));
    }

    let mut out = Vec::<&str>::new();
    for part in s.split('/') {
        if part.is_empty() || part == "." {
            continue;
        }
        if part == ".." {
            return Err(SlidecastError::validation(
                "asset paths must not contain '..'",
            ));
        }
        out.push(part);
    }

    if out.is_empty() {
        return Err(SlidecastError::validation(
            "asset path must contain a file name",
        ));
    }

    Ok(out.join("/"))
}
