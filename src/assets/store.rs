use std::{
    path::{Path, PathBuf},
    sync::Arc,
    sync::atomic::{AtomicU64, Ordering},
};

use crate::{
    assets::decode::{self, PreparedImage, PreparedSvg},
    foundation::error::{SlidecastError, SlidecastResult},
    scene::storyboard::{Storyboard, normalize_rel_path},
};

/// Badge drawn in the watermark corner when the storyboard names no watermark file.
///
/// Pure shapes only, so it rasterizes identically on hosts with no fonts installed.
const BUILTIN_BADGE_SVG: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" width="256" height="96" viewBox="0 0 256 96">
  <rect x="4" y="4" width="248" height="88" rx="20" fill="#101014" fill-opacity="0.85" stroke="#ffffff" stroke-width="4"/>
  <polygon points="36,28 36,68 72,48" fill="#ffffff"/>
  <rect x="92" y="40" width="128" height="12" rx="6" fill="#ffffff"/>
  <rect x="92" y="60" width="88" height="10" rx="5" fill="#9a9aa2"/>
</svg>"##;

#[derive(Clone, Debug)]
/// Watermark asset in whichever form the source file dictates.
///
/// Vector watermarks stay unrasterized here so each output surface can raster them at
/// its own corner height instead of upscaling a preview-sized bitmap.
pub enum WatermarkAsset {
    /// Decoded bitmap watermark.
    Raster(PreparedImage),
    /// Parsed vector watermark.
    Vector(PreparedSvg),
}

#[derive(Clone, Debug)]
/// One atomically installed batch of decoded slideshow assets.
pub struct LoadedAssets {
    /// Generation of the load batch that produced this set.
    pub generation: u64,
    /// Deck images in storyboard order, premultiplied RGBA8.
    pub images: Vec<PreparedImage>,
    /// Watermark asset for the corner badge.
    pub watermark: WatermarkAsset,
}

impl LoadedAssets {
    /// Borrow the deck image at `idx`.
    pub fn image(&self, idx: usize) -> SlidecastResult<&PreparedImage> {
        self.images.get(idx).ok_or_else(|| {
            SlidecastError::validation(format!(
                "image index {idx} out of range ({} loaded)",
                self.images.len()
            ))
        })
    }
}

/// Ticket identifying one load batch. A batch commits only while its ticket is still the
/// newest one handed out by the loader.
#[derive(Debug)]
pub struct LoadTicket {
    generation: u64,
}

impl LoadTicket {
    /// Generation this ticket was issued for.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Loads storyboard assets in fail-fast batches keyed by a monotonic generation.
///
/// Beginning a new batch supersedes every earlier in-flight ticket; superseded batches
/// abort instead of installing, so callers never observe a mix of two decks.
pub struct AssetLoader {
    root: PathBuf,
    generation: AtomicU64,
}

impl AssetLoader {
    /// Create a loader resolving relative asset paths against `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            generation: AtomicU64::new(0),
        }
    }

    /// Root directory used when resolving relative asset paths.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Start a new load batch, invalidating all earlier tickets.
    pub fn begin(&self) -> LoadTicket {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        LoadTicket { generation }
    }

    /// Decode every asset named by `board` under `ticket`.
    ///
    /// Any read or decode failure aborts the whole batch. Each step re-checks the ticket
    /// so a superseded batch stops early rather than finishing work nobody will install.
    pub fn load(&self, ticket: &LoadTicket, board: &Storyboard) -> SlidecastResult<LoadedAssets> {
        let mut images = Vec::with_capacity(board.images.len());
        for source in &board.images {
            self.ensure_current(ticket)?;
            let bytes = self.read_bytes(source)?;
            images.push(decode::decode_image(&bytes)?);
        }

        self.ensure_current(ticket)?;
        let watermark = match board.watermark.as_deref() {
            Some(source) => {
                let bytes = self.read_bytes(source)?;
                if has_svg_extension(source) {
                    let fontdb = decode::build_fontdb(Some(&self.root));
                    WatermarkAsset::Vector(decode::parse_svg(&bytes, fontdb)?)
                } else {
                    WatermarkAsset::Raster(decode::decode_image(&bytes)?)
                }
            }
            None => WatermarkAsset::Vector(decode::parse_svg(
                BUILTIN_BADGE_SVG.as_bytes(),
                Arc::new(usvg::fontdb::Database::new()),
            )?),
        };

        self.ensure_current(ticket)?;
        Ok(LoadedAssets {
            generation: ticket.generation,
            images,
            watermark,
        })
    }

    /// Begin and run a batch in one call.
    pub fn load_current(&self, board: &Storyboard) -> SlidecastResult<LoadedAssets> {
        let ticket = self.begin();
        self.load(&ticket, board)
    }

    fn ensure_current(&self, ticket: &LoadTicket) -> SlidecastResult<()> {
        if self.generation.load(Ordering::SeqCst) != ticket.generation {
            return Err(SlidecastError::asset_load(
                "load batch superseded by a newer request",
            ));
        }
        Ok(())
    }

    fn read_bytes(&self, source: &str) -> SlidecastResult<Vec<u8>> {
        let norm = normalize_rel_path(source)?;
        let path = self.root.join(Path::new(&norm));
        std::fs::read(&path).map_err(|e| {
            SlidecastError::asset_load(format!("read '{}': {e}", path.display()))
        })
    }
}

fn has_svg_extension(source: &str) -> bool {
    Path::new(source)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("svg"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::core::Canvas;
    use crate::scene::storyboard::{ExportSettings, FitPolicy};

    fn temp_root(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "slidecast_store_{tag}_{}_{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_nanos())
                .unwrap_or(0)
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn write_png(path: &Path, rgba: [u8; 4]) {
        let mut img = image::RgbaImage::new(2, 2);
        for p in img.pixels_mut() {
            *p = image::Rgba(rgba);
        }
        img.save(path).unwrap();
    }

    fn board_with_images(images: Vec<String>) -> Storyboard {
        Storyboard {
            audio: "voice.m4a".to_string(),
            images,
            watermark: None,
            fit: FitPolicy::Cover,
            captions: None,
            canvas: Canvas {
                width: 540,
                height: 960,
            },
            export: ExportSettings::default(),
        }
    }

    #[test]
    fn batch_loads_deck_in_storyboard_order() {
        let root = temp_root("order");
        write_png(&root.join("a.png"), [255, 0, 0, 255]);
        write_png(&root.join("b.png"), [0, 255, 0, 255]);

        let loader = AssetLoader::new(&root);
        let board = board_with_images(vec!["a.png".to_string(), "b.png".to_string()]);
        let loaded = loader.load_current(&board).unwrap();

        assert_eq!(loaded.images.len(), 2);
        assert_eq!(loaded.images[0].rgba8_premul[0], 255);
        assert_eq!(loaded.images[1].rgba8_premul[1], 255);
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn one_missing_image_fails_the_whole_batch() {
        let root = temp_root("failfast");
        write_png(&root.join("a.png"), [255, 0, 0, 255]);

        let loader = AssetLoader::new(&root);
        let board = board_with_images(vec!["a.png".to_string(), "missing.png".to_string()]);
        let err = loader.load_current(&board).unwrap_err();
        assert!(err.to_string().contains("asset load error"));
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn superseded_ticket_does_not_install() {
        let root = temp_root("stale");
        write_png(&root.join("a.png"), [255, 0, 0, 255]);

        let loader = AssetLoader::new(&root);
        let board = board_with_images(vec!["a.png".to_string()]);

        let stale = loader.begin();
        let fresh = loader.begin();
        assert!(loader.load(&stale, &board).is_err());
        let loaded = loader.load(&fresh, &board).unwrap();
        assert_eq!(loaded.generation, fresh.generation());
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn generations_are_strictly_increasing() {
        let loader = AssetLoader::new(".");
        let a = loader.begin();
        let b = loader.begin();
        assert!(b.generation() > a.generation());
    }

    #[test]
    fn builtin_badge_parses_without_fonts() {
        let tree = decode::parse_svg(
            BUILTIN_BADGE_SVG.as_bytes(),
            Arc::new(usvg::fontdb::Database::new()),
        )
        .unwrap();
        let size = tree.tree.size();
        assert!(size.width() > 0.0 && size.height() > 0.0);
    }
}
