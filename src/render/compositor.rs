use std::sync::Arc;

use crate::assets::store::{LoadedAssets, WatermarkAsset};
use crate::assets::svg_raster;
use crate::foundation::core::{Affine, Canvas};
use crate::foundation::error::{SlidecastError, SlidecastResult};
use crate::render::caption::{CaptionEngine, CaptionStyle};
use crate::render::fit::fit_rect;
use crate::scene::storyboard::FitPolicy;
use crate::timeline::RenderState;

// Overlay metrics are authored against a 1920px-tall surface and scaled linearly with
// the output height, so preview and export canvases place overlays identically.
const STYLE_REFERENCE_HEIGHT: f64 = 1920.0;
const WATERMARK_MARGIN_PX: f64 = 48.0;
const WATERMARK_HEIGHT_PX: f64 = 160.0;
const WATERMARK_OPACITY: f32 = 0.8;
const CAPTION_BASE_PX: f64 = 112.0;
const CAPTION_MIN_PX: f64 = 36.0;
const CAPTION_STEP_PX: f64 = 4.0;
const CAPTION_MARGIN_X_PX: f64 = 96.0;
const CAPTION_MARGIN_TOP_PX: f64 = 240.0;
const CAPTION_MARGIN_BOTTOM_PX: f64 = 320.0;
const CAPTION_FILL_RGBA: [u8; 4] = [255, 255, 255, 255];
const CAPTION_STROKE_RGBA: [u8; 4] = [0, 0, 0, 255];
const CAPTION_STROKE_RATIO: f64 = 1.0 / 14.0;

/// A composed frame as RGBA8 pixels.
///
/// Frames are premultiplied alpha throughout the pipeline; the flag makes this explicit
/// at API boundaries.
#[derive(Clone, Debug)]
pub struct FrameRGBA {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// RGBA8 bytes, tightly packed, row-major.
    pub data: Vec<u8>,
    /// Whether `data` is premultiplied alpha.
    pub premultiplied: bool,
}

/// Options for [`Compositor`].
#[derive(Clone, Debug)]
pub struct CompositorOpts {
    /// Fit policy applied when drawing deck images.
    pub fit: FitPolicy,
    /// Straight RGBA color the canvas is cleared to before drawing.
    pub clear_rgba: [u8; 4],
    /// Font family requested for caption text.
    pub caption_family: String,
}

impl Default for CompositorOpts {
    fn default() -> Self {
        Self {
            fit: FitPolicy::Cover,
            clear_rgba: [0, 0, 0, 255],
            caption_family: "sans-serif".to_string(),
        }
    }
}

#[derive(Clone)]
struct ImagePaint {
    paint: vello_cpu::Image,
    w: u32,
    h: u32,
}

#[derive(Default)]
struct PaintCache {
    generation: u64,
    slides: Vec<Option<ImagePaint>>,
    // Keyed by raster height for vector watermarks, 0 for bitmap ones.
    watermark: Option<(u32, ImagePaint)>,
}

/// Deterministic frame compositor.
///
/// Draws clear color, the active deck image under the fit policy, the watermark in the
/// top-right corner, and the active caption word, in that order. Equal inputs produce
/// byte-identical frames, so both live preview and offline export run through here.
pub struct Compositor {
    opts: CompositorOpts,
    ctx: Option<vello_cpu::RenderContext>,
    captions: CaptionEngine,
    paints: PaintCache,
}

impl Compositor {
    /// Create a compositor drawing caption text with faces from `fontdb`.
    pub fn new(opts: CompositorOpts, fontdb: Arc<usvg::fontdb::Database>) -> Self {
        Self {
            opts,
            ctx: None,
            captions: CaptionEngine::new(fontdb),
            paints: PaintCache::default(),
        }
    }

    /// `true` when caption text can be drawn on this host.
    pub fn has_caption_fonts(&self) -> bool {
        self.captions.has_fonts()
    }

    /// Compose one frame of `state` over `assets` at `canvas` resolution.
    pub fn compose(
        &mut self,
        state: &RenderState<'_>,
        assets: &LoadedAssets,
        canvas: Canvas,
    ) -> SlidecastResult<FrameRGBA> {
        if canvas.width == 0 || canvas.height == 0 {
            return Err(SlidecastError::validation(
                "compose canvas dimensions must be non-zero",
            ));
        }
        let w16: u16 = canvas
            .width
            .try_into()
            .map_err(|_| SlidecastError::validation("compose canvas width exceeds u16"))?;
        let h16: u16 = canvas
            .height
            .try_into()
            .map_err(|_| SlidecastError::validation("compose canvas height exceeds u16"))?;

        self.ensure_generation(assets);
        let slide = self.slide_paint(assets, state.image_index)?;
        let (watermark, watermark_scale) = self.watermark_paint(assets, canvas)?;
        let caption = match state.active_word {
            Some(word) => {
                let style = self.caption_style(canvas);
                self.captions.caption_raster(&word.word, &style)?
            }
            None => None,
        };

        let fit = self.opts.fit;
        let clear = self.opts.clear_rgba;
        let style_scale = style_scale(canvas);
        let cw = f64::from(canvas.width);
        let ch = f64::from(canvas.height);

        let mut dst = vello_cpu::Pixmap::new(w16, h16);
        self.with_ctx_mut(w16, h16, |ctx| {
            ctx.set_blend_mode(vello_cpu::peniko::BlendMode::default());
            ctx.set_paint_transform(vello_cpu::kurbo::Affine::IDENTITY);

            // Clear color under everything, covering the whole canvas even when the fit
            // policy leaves bars.
            ctx.set_transform(vello_cpu::kurbo::Affine::IDENTITY);
            ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(
                clear[0], clear[1], clear[2], clear[3],
            ));
            ctx.fill_rect(&vello_cpu::kurbo::Rect::new(0.0, 0.0, cw, ch));

            // Active deck image.
            let dest = fit_rect(fit, slide.w, slide.h, canvas.width, canvas.height);
            if dest.width() > 0.0 && dest.height() > 0.0 {
                let scale = dest.width() / f64::from(slide.w);
                let tr = Affine::translate((dest.x0, dest.y0)) * Affine::scale(scale);
                ctx.set_transform(affine_to_cpu(tr));
                ctx.set_paint(slide.paint.clone());
                ctx.fill_rect(&vello_cpu::kurbo::Rect::new(
                    0.0,
                    0.0,
                    f64::from(slide.w),
                    f64::from(slide.h),
                ));
            }

            // Watermark pinned to the top-right corner.
            let margin = WATERMARK_MARGIN_PX * style_scale;
            let wm_w = f64::from(watermark.w) * watermark_scale;
            let tr = Affine::translate((cw - margin - wm_w, margin))
                * Affine::scale(watermark_scale);
            ctx.set_transform(affine_to_cpu(tr));
            ctx.set_paint(watermark.paint.clone());
            ctx.push_opacity_layer(WATERMARK_OPACITY);
            ctx.fill_rect(&vello_cpu::kurbo::Rect::new(
                0.0,
                0.0,
                f64::from(watermark.w),
                f64::from(watermark.h),
            ));
            ctx.pop_layer();

            // Caption word centered on the canvas. The margins only bound its size; the
            // ink box itself is mid-screen on both axes.
            if let Some(c) = &caption {
                let cx = (cw - f64::from(c.width)) * 0.5;
                let cy = (ch - f64::from(c.height)) * 0.5;
                ctx.set_transform(affine_to_cpu(Affine::translate((cx, cy))));
                ctx.set_paint(c.image.clone());
                ctx.fill_rect(&vello_cpu::kurbo::Rect::new(
                    0.0,
                    0.0,
                    f64::from(c.width),
                    f64::from(c.height),
                ));
            }

            ctx.flush();
            ctx.render_to_pixmap(&mut dst);
            Ok(())
        })?;

        Ok(FrameRGBA {
            width: canvas.width,
            height: canvas.height,
            data: dst.data_as_u8_slice().to_vec(),
            premultiplied: true,
        })
    }

    fn with_ctx_mut<R>(
        &mut self,
        width: u16,
        height: u16,
        f: impl FnOnce(&mut vello_cpu::RenderContext) -> SlidecastResult<R>,
    ) -> SlidecastResult<R> {
        let mut ctx = match self.ctx.take() {
            None => vello_cpu::RenderContext::new(width, height),
            Some(ctx) if ctx.width() == width && ctx.height() == height => ctx,
            Some(_) => vello_cpu::RenderContext::new(width, height),
        };
        ctx.reset();
        let out = f(&mut ctx)?;
        self.ctx = Some(ctx);
        Ok(out)
    }

    fn ensure_generation(&mut self, assets: &LoadedAssets) {
        if self.paints.generation == assets.generation
            && self.paints.slides.len() == assets.images.len()
        {
            return;
        }
        self.paints.generation = assets.generation;
        self.paints.slides.clear();
        self.paints.slides.resize_with(assets.images.len(), || None);
        self.paints.watermark = None;
    }

    fn slide_paint(&mut self, assets: &LoadedAssets, idx: usize) -> SlidecastResult<ImagePaint> {
        if let Some(p) = self.paints.slides.get(idx).and_then(|x| x.clone()) {
            return Ok(p);
        }
        let prepared = assets.image(idx)?;
        let out = ImagePaint {
            paint: rgba_premul_to_image(&prepared.rgba8_premul, prepared.width, prepared.height)?,
            w: prepared.width,
            h: prepared.height,
        };
        if let Some(slot) = self.paints.slides.get_mut(idx) {
            *slot = Some(out.clone());
        }
        Ok(out)
    }

    /// Watermark paint plus the uniform scale that brings it to its corner height.
    ///
    /// Vector watermarks are rastered directly at the target height (scale 1.0); bitmap
    /// watermarks keep their decoded pixels and scale at draw time.
    fn watermark_paint(
        &mut self,
        assets: &LoadedAssets,
        canvas: Canvas,
    ) -> SlidecastResult<(ImagePaint, f64)> {
        let target_h = (WATERMARK_HEIGHT_PX * style_scale(canvas)).round().max(1.0) as u32;
        let cache_key = match &assets.watermark {
            WatermarkAsset::Raster(_) => 0,
            WatermarkAsset::Vector(_) => target_h,
        };
        if let Some((key, p)) = &self.paints.watermark
            && *key == cache_key
        {
            let scale = match &assets.watermark {
                WatermarkAsset::Raster(_) => f64::from(target_h) / f64::from(p.h.max(1)),
                WatermarkAsset::Vector(_) => 1.0,
            };
            return Ok((p.clone(), scale));
        }

        let (paint, scale) = match &assets.watermark {
            WatermarkAsset::Raster(img) => {
                let p = ImagePaint {
                    paint: rgba_premul_to_image(&img.rgba8_premul, img.width, img.height)?,
                    w: img.width,
                    h: img.height,
                };
                let s = f64::from(target_h) / f64::from(img.height.max(1));
                (p, s)
            }
            WatermarkAsset::Vector(svg) => {
                let (w, h) = svg_raster::raster_size_for_height(&svg.tree, target_h)?;
                let bytes = svg_raster::rasterize_svg_to_premul_rgba8(&svg.tree, w, h)?;
                let p = ImagePaint {
                    paint: rgba_premul_to_image(&bytes, w, h)?,
                    w,
                    h,
                };
                (p, 1.0)
            }
        };
        self.paints.watermark = Some((cache_key, paint.clone()));
        Ok((paint, scale))
    }

    fn caption_style(&self, canvas: Canvas) -> CaptionStyle {
        let s = style_scale(canvas);
        CaptionStyle {
            family: self.opts.caption_family.clone(),
            base_px: CAPTION_BASE_PX * s,
            min_px: CAPTION_MIN_PX * s,
            step_px: CAPTION_STEP_PX * s,
            max_width: (f64::from(canvas.width) - 2.0 * CAPTION_MARGIN_X_PX * s).max(1.0),
            max_height: (f64::from(canvas.height)
                - (CAPTION_MARGIN_TOP_PX + CAPTION_MARGIN_BOTTOM_PX) * s)
                .max(1.0),
            fill_rgba: CAPTION_FILL_RGBA,
            stroke_rgba: CAPTION_STROKE_RGBA,
            stroke_ratio: CAPTION_STROKE_RATIO,
        }
    }
}

fn style_scale(canvas: Canvas) -> f64 {
    f64::from(canvas.height) / STYLE_REFERENCE_HEIGHT
}

fn affine_to_cpu(a: Affine) -> vello_cpu::kurbo::Affine {
    vello_cpu::kurbo::Affine::new(a.as_coeffs())
}

fn pixmap_from_premul_bytes(
    bytes: &[u8],
    width: u32,
    height: u32,
) -> SlidecastResult<vello_cpu::Pixmap> {
    let w: u16 = width
        .try_into()
        .map_err(|_| SlidecastError::validation("pixmap width exceeds u16"))?;
    let h: u16 = height
        .try_into()
        .map_err(|_| SlidecastError::validation("pixmap height exceeds u16"))?;
    if bytes.len()
        != (width as usize)
            .saturating_mul(height as usize)
            .saturating_mul(4)
    {
        return Err(SlidecastError::validation("pixmap byte len mismatch"));
    }
    // Pixmap stores PremulRgba8; our bytes are already premultiplied.
    let mut pixels = Vec::<vello_cpu::peniko::color::PremulRgba8>::with_capacity(
        (width as usize) * (height as usize),
    );
    for px in bytes.chunks_exact(4) {
        pixels.push(vello_cpu::peniko::color::PremulRgba8::from_u8_array([
            px[0], px[1], px[2], px[3],
        ]));
    }
    Ok(vello_cpu::Pixmap::from_parts_with_opacity(
        pixels, w, h, true,
    ))
}

pub(crate) fn rgba_premul_to_image(
    bytes_premul: &[u8],
    width: u32,
    height: u32,
) -> SlidecastResult<vello_cpu::Image> {
    let pixmap = pixmap_from_premul_bytes(bytes_premul, width, height)?;
    Ok(vello_cpu::Image {
        image: vello_cpu::ImageSource::Pixmap(Arc::new(pixmap)),
        sampler: vello_cpu::peniko::ImageSampler::default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::decode::{self, PreparedImage};
    use crate::scene::captions::CaptionWord;
    use crate::timeline::RenderState;

    const SQUARE_RED_SVG: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" width="10" height="10"><rect width="10" height="10" fill="#ff0000"/></svg>"##;

    fn solid_image(w: u32, h: u32, rgba: [u8; 4]) -> PreparedImage {
        let mut data = Vec::with_capacity((w * h * 4) as usize);
        for _ in 0..(w * h) {
            data.extend_from_slice(&rgba);
        }
        PreparedImage {
            width: w,
            height: h,
            rgba8_premul: Arc::new(data),
        }
    }

    fn test_assets(images: Vec<PreparedImage>) -> LoadedAssets {
        let badge = decode::parse_svg(
            SQUARE_RED_SVG.as_bytes(),
            Arc::new(usvg::fontdb::Database::new()),
        )
        .unwrap();
        LoadedAssets {
            generation: 1,
            images,
            watermark: WatermarkAsset::Vector(badge),
        }
    }

    fn state_at(image_index: usize) -> RenderState<'static> {
        RenderState {
            time: 0.0,
            image_index,
            active_word: None,
        }
    }

    fn fontless_compositor(fit: FitPolicy) -> Compositor {
        let opts = CompositorOpts {
            fit,
            ..CompositorOpts::default()
        };
        Compositor::new(opts, Arc::new(usvg::fontdb::Database::new()))
    }

    fn px(frame: &FrameRGBA, x: u32, y: u32) -> [u8; 4] {
        let i = ((y * frame.width + x) * 4) as usize;
        [
            frame.data[i],
            frame.data[i + 1],
            frame.data[i + 2],
            frame.data[i + 3],
        ]
    }

    #[test]
    fn cover_slide_fills_canvas_and_watermark_sits_top_right() {
        let mut comp = fontless_compositor(FitPolicy::Cover);
        let assets = test_assets(vec![solid_image(4, 4, [0, 0, 255, 255])]);
        let canvas = Canvas {
            width: 64,
            height: 128,
        };
        let frame = comp.compose(&state_at(0), &assets, canvas).unwrap();

        assert_eq!((frame.width, frame.height), (64, 128));
        assert!(frame.premultiplied);
        // Cover leaves no bars: bottom-left is slide blue.
        assert_eq!(px(&frame, 2, 120), [0, 0, 255, 255]);

        // Watermark ink appears somewhere in the top-right quadrant, nowhere bottom-left.
        let red_in = |x0: u32, x1: u32, y0: u32, y1: u32| {
            (y0..y1).any(|y| (x0..x1).any(|x| {
                let p = px(&frame, x, y);
                p[0] > 100 && p[2] < 100
            }))
        };
        assert!(red_in(32, 64, 0, 32));
        assert!(!red_in(0, 32, 96, 128));
    }

    #[test]
    fn contain_letterboxes_to_clear_color() {
        let mut comp = fontless_compositor(FitPolicy::Contain);
        let assets = test_assets(vec![solid_image(16, 32, [0, 0, 255, 255])]);
        let canvas = Canvas {
            width: 64,
            height: 64,
        };
        let frame = comp.compose(&state_at(0), &assets, canvas).unwrap();

        // 16x32 contained in 64x64 scales to 32x64, leaving 16px pillars.
        assert_eq!(px(&frame, 4, 32), [0, 0, 0, 255]);
        assert_eq!(px(&frame, 32, 32), [0, 0, 255, 255]);
    }

    #[test]
    fn equal_inputs_compose_byte_identical_frames() {
        let mut comp = fontless_compositor(FitPolicy::Cover);
        let assets = test_assets(vec![solid_image(4, 4, [10, 200, 30, 255])]);
        let canvas = Canvas {
            width: 32,
            height: 64,
        };
        let a = comp.compose(&state_at(0), &assets, canvas).unwrap();
        let b = comp.compose(&state_at(0), &assets, canvas).unwrap();
        assert_eq!(a.data, b.data);
    }

    #[test]
    fn active_word_changes_the_composed_frame() {
        let mut comp = Compositor::new(CompositorOpts::default(), decode::build_fontdb(None));
        if !comp.has_caption_fonts() {
            return;
        }
        let assets = test_assets(vec![solid_image(4, 4, [0, 0, 255, 255])]);
        let canvas = Canvas {
            width: 270,
            height: 480,
        };
        let silent = comp.compose(&state_at(0), &assets, canvas).unwrap();

        let word = CaptionWord {
            word: "HI".to_string(),
            start: 0.0,
            end: 1.0,
        };
        let state = RenderState {
            time: 0.5,
            image_index: 0,
            active_word: Some(&word),
        };
        let spoken = comp.compose(&state, &assets, canvas).unwrap();
        assert_ne!(silent.data, spoken.data);
    }

    #[test]
    fn out_of_range_image_index_is_an_error() {
        let mut comp = fontless_compositor(FitPolicy::Cover);
        let assets = test_assets(vec![solid_image(4, 4, [0, 0, 255, 255])]);
        let canvas = Canvas {
            width: 32,
            height: 32,
        };
        assert!(comp.compose(&state_at(5), &assets, canvas).is_err());
    }

    #[test]
    fn canvas_beyond_u16_is_rejected() {
        let mut comp = fontless_compositor(FitPolicy::Cover);
        let assets = test_assets(vec![solid_image(4, 4, [0, 0, 255, 255])]);
        let canvas = Canvas {
            width: 70_000,
            height: 32,
        };
        assert!(comp.compose(&state_at(0), &assets, canvas).is_err());
    }
}
