use std::collections::HashMap;
use std::sync::Arc;

use crate::assets::{decode, svg_raster};
use crate::foundation::error::{SlidecastError, SlidecastResult};
use crate::render::compositor::rgba_premul_to_image;

/// Caption styling in output-surface pixels.
#[derive(Clone, Debug)]
pub struct CaptionStyle {
    /// Font family requested from the host font database.
    pub family: String,
    /// Font size tried first.
    pub base_px: f64,
    /// Smallest font size the shrink loop may reach.
    pub min_px: f64,
    /// Size decrement applied while the word overflows its box.
    pub step_px: f64,
    /// Widest ink the caption may span.
    pub max_width: f64,
    /// Tallest ink the caption may span.
    pub max_height: f64,
    /// Fill color, straight RGBA.
    pub fill_rgba: [u8; 4],
    /// Outline color, straight RGBA.
    pub stroke_rgba: [u8; 4],
    /// Outline width as a fraction of the font size.
    pub stroke_ratio: f64,
}

#[derive(Clone)]
/// One rasterized caption word, cropped to its ink box.
pub struct CaptionRaster {
    /// Paint ready for the render context.
    pub image: vello_cpu::Image,
    /// Ink width in pixels.
    pub width: u32,
    /// Ink height in pixels.
    pub height: u32,
}

#[derive(Clone, PartialEq, Eq, Hash)]
struct CaptionKey {
    text: String,
    max_width_bits: u64,
    base_bits: u64,
}

/// Rasterizes caption words through the SVG text pipeline.
///
/// Each word is drawn twice, an outline pass under a fill pass, then cropped to its ink
/// box so the compositor can center it exactly. Results are cached per word and style.
pub struct CaptionEngine {
    fontdb: Arc<usvg::fontdb::Database>,
    cache: HashMap<CaptionKey, Option<CaptionRaster>>,
}

impl CaptionEngine {
    /// Create an engine drawing text with faces from `fontdb`.
    pub fn new(fontdb: Arc<usvg::fontdb::Database>) -> Self {
        if fontdb.faces().next().is_none() {
            tracing::warn!("font database has no faces; captions will not be drawn");
        }
        Self {
            fontdb,
            cache: HashMap::new(),
        }
    }

    /// `true` when at least one font face is available for caption text.
    pub fn has_fonts(&self) -> bool {
        self.fontdb.faces().next().is_some()
    }

    /// Raster for `text` under `style`, or `None` when the word produces no ink
    /// (whitespace-only input or a fontless host).
    pub fn caption_raster(
        &mut self,
        text: &str,
        style: &CaptionStyle,
    ) -> SlidecastResult<Option<CaptionRaster>> {
        if !(style.step_px > 0.0) || !(style.min_px > 0.0) || style.min_px > style.base_px {
            return Err(SlidecastError::validation(
                "caption style requires 0 < min_px <= base_px and step_px > 0",
            ));
        }
        if !self.has_fonts() {
            return Ok(None);
        }

        let key = CaptionKey {
            text: text.to_string(),
            max_width_bits: style.max_width.to_bits(),
            base_bits: style.base_px.to_bits(),
        };
        if let Some(hit) = self.cache.get(&key) {
            return Ok(hit.clone());
        }

        let out = self.fit_and_raster(text, style)?;
        self.cache.insert(key, out.clone());
        Ok(out)
    }

    /// Shrink from `base_px` in `step_px` decrements until the ink fits the
    /// `max_width` x `max_height` box, stopping at `min_px` even if the word still
    /// overflows.
    fn fit_and_raster(
        &self,
        text: &str,
        style: &CaptionStyle,
    ) -> SlidecastResult<Option<CaptionRaster>> {
        let mut px = style.base_px.max(style.min_px);
        loop {
            let Some((bytes, w, h)) = self.raster_word_at(text, px, style)? else {
                return Ok(None);
            };
            let fits =
                f64::from(w) <= style.max_width && f64::from(h) <= style.max_height;
            if fits || px <= style.min_px {
                let image = rgba_premul_to_image(&bytes, w, h)?;
                return Ok(Some(CaptionRaster {
                    image,
                    width: w,
                    height: h,
                }));
            }
            px = (px - style.step_px).max(style.min_px);
        }
    }

    fn raster_word_at(
        &self,
        text: &str,
        px: f64,
        style: &CaptionStyle,
    ) -> SlidecastResult<Option<(Vec<u8>, u32, u32)>> {
        // The document is wider than the allowed ink so an overflowing word still
        // measures as too wide instead of being clipped down to a passing size.
        let doc_w = (style.max_width + 2.0 * px).ceil().max(1.0) as u32;
        let doc_h = (px * 3.0).ceil().max(1.0) as u32;

        let escaped = escape_xml(text);
        let stroke_w = px * style.stroke_ratio;
        let svg = format!(
            r##"<svg xmlns="http://www.w3.org/2000/svg" width="{doc_w}" height="{doc_h}">
<text x="50%" y="50%" text-anchor="middle" dominant-baseline="central" font-family="{family}" font-size="{px}" font-weight="700" fill="none" stroke="{stroke}" stroke-opacity="{stroke_a:.3}" stroke-width="{stroke_w}" stroke-linejoin="round">{escaped}</text>
<text x="50%" y="50%" text-anchor="middle" dominant-baseline="central" font-family="{family}" font-size="{px}" font-weight="700" fill="{fill}" fill-opacity="{fill_a:.3}">{escaped}</text>
</svg>"##,
            family = escape_xml(&style.family),
            stroke = hex_rgb(style.stroke_rgba),
            stroke_a = f64::from(style.stroke_rgba[3]) / 255.0,
            fill = hex_rgb(style.fill_rgba),
            fill_a = f64::from(style.fill_rgba[3]) / 255.0,
        );

        let prepared = decode::parse_svg(svg.as_bytes(), Arc::clone(&self.fontdb))?;
        let raster = svg_raster::rasterize_svg_to_premul_rgba8(&prepared.tree, doc_w, doc_h)?;
        Ok(tight_crop_premul(&raster, doc_w, doc_h))
    }
}

/// Crop premultiplied RGBA8 pixels to the smallest box containing non-zero alpha.
fn tight_crop_premul(data: &[u8], w: u32, h: u32) -> Option<(Vec<u8>, u32, u32)> {
    let mut min_x = w;
    let mut min_y = h;
    let mut max_x = 0u32;
    let mut max_y = 0u32;
    let mut any = false;
    for y in 0..h {
        for x in 0..w {
            let a = data[((y * w + x) * 4 + 3) as usize];
            if a != 0 {
                any = true;
                min_x = min_x.min(x);
                min_y = min_y.min(y);
                max_x = max_x.max(x);
                max_y = max_y.max(y);
            }
        }
    }
    if !any {
        return None;
    }

    let out_w = max_x - min_x + 1;
    let out_h = max_y - min_y + 1;
    let mut out = Vec::with_capacity((out_w * out_h * 4) as usize);
    for y in min_y..=max_y {
        let start = ((y * w + min_x) * 4) as usize;
        let end = start + (out_w * 4) as usize;
        out.extend_from_slice(&data[start..end]);
    }
    Some((out, out_w, out_h))
}

fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

fn hex_rgb(rgba: [u8; 4]) -> String {
    format!("#{:02x}{:02x}{:02x}", rgba[0], rgba[1], rgba[2])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn style(base_px: f64, max_width: f64) -> CaptionStyle {
        CaptionStyle {
            family: "sans-serif".to_string(),
            base_px,
            min_px: 8.0,
            step_px: 4.0,
            max_width,
            max_height: 400.0,
            fill_rgba: [255, 255, 255, 255],
            stroke_rgba: [0, 0, 0, 255],
            stroke_ratio: 1.0 / 14.0,
        }
    }

    fn system_engine() -> CaptionEngine {
        CaptionEngine::new(decode::build_fontdb(None))
    }

    #[test]
    fn xml_metacharacters_are_escaped() {
        assert_eq!(escape_xml("a&b<c>\"d'"), "a&amp;b&lt;c&gt;&quot;d&apos;");
    }

    #[test]
    fn fontless_host_yields_no_caption() {
        let mut engine = CaptionEngine::new(Arc::new(usvg::fontdb::Database::new()));
        let out = engine.caption_raster("HELLO", &style(64.0, 400.0)).unwrap();
        assert!(out.is_none());
    }

    #[test]
    fn whitespace_word_has_no_ink() {
        let mut engine = system_engine();
        if !engine.has_fonts() {
            return;
        }
        let out = engine.caption_raster("   ", &style(64.0, 400.0)).unwrap();
        assert!(out.is_none());
    }

    #[test]
    fn wide_word_shrinks_until_it_fits() {
        let mut engine = system_engine();
        if !engine.has_fonts() {
            return;
        }
        let ra = engine
            .caption_raster("UNMISTAKABLY", &style(64.0, 120.0))
            .unwrap()
            .expect("ink expected with fonts available");
        assert!(ra.width <= 120);
        assert!(ra.height > 0);
    }

    #[test]
    fn repeated_words_share_one_raster() {
        let mut engine = system_engine();
        if !engine.has_fonts() {
            return;
        }
        let s = style(48.0, 400.0);
        let a = engine.caption_raster("echo", &s).unwrap().unwrap();
        let b = engine.caption_raster("echo", &s).unwrap().unwrap();
        let vello_cpu::ImageSource::Pixmap(pa) = &a.image.image else {
            panic!("expected pixmap paint");
        };
        let vello_cpu::ImageSource::Pixmap(pb) = &b.image.image else {
            panic!("expected pixmap paint");
        };
        assert!(Arc::ptr_eq(pa, pb));
    }

    #[test]
    fn invalid_shrink_parameters_are_rejected() {
        let mut engine = CaptionEngine::new(Arc::new(usvg::fontdb::Database::new()));
        let mut bad = style(64.0, 400.0);
        bad.step_px = 0.0;
        assert!(engine.caption_raster("x", &bad).is_err());
    }
}
